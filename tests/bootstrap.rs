//! A smoke test against the published API surface only (`doeff_core::*`), the way a downstream
//! crate would actually consume this one — no access to anything `pub(crate)`.

use doeff_core::{
    from_effect, fail, flat_map, pure, recover, run, run_bare, then, with_handler, Effect, Error,
    Handler, Value,
};
use std::collections::HashMap;

#[test]
fn a_pure_program_runs_to_completion_with_no_handlers_at_all() {
    let result = run_bare(pure(1i64));
    match result.value {
        Ok(Value::Int(v)) => assert_eq!(v, 1),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn installing_a_handler_and_reading_the_log_works_end_to_end() {
    let handler = Handler::new("answer", |effect, k| match effect {
        Effect::Ask(_) => from_effect(Effect::Resume(k, Box::new(Value::Int(9)))),
        _ => from_effect(Effect::Delegate),
    });
    let program = with_handler(
        handler,
        flat_map(from_effect(Effect::Ask("ignored".into())), |v| {
            then(from_effect(Effect::Tell(v.clone())), pure(v))
        }),
    );

    let result = run(program, Vec::new(), HashMap::new());
    match result.value {
        Ok(Value::Int(v)) => assert_eq!(v, 9),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(result.log.len(), 1);
}

#[test]
fn recover_catches_a_failure_raised_from_outside_the_crate() {
    let program = recover(fail(Error::domain("boom")), |_| pure(Value::from("caught")));
    let result = run_bare(program);
    match result.value {
        Ok(Value::Str(s)) => assert_eq!(&*s, "caught"),
        other => panic!("unexpected {other:?}"),
    }
}
