//! S1–S3, Property 9 (determinism), `run_bare`'s bare-bones posture, `retry`, the rest of the
//! default handler bundle (`state`, `lazy_ask`, `result_safe`), and bridging a host `Future`
//! through `Runtime::await_host_future`.

use super::*;
use assert2::let_assert;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// S1 — the simplest possible program: a pure value, no effects, completes immediately.
#[test]
fn s1_trivial_pure_program_completes_immediately() {
    let result = run_bare(pure(5i64));
    let_assert!(Ok(Value::Int(v)) = result.value);
    assert!(v == 5);
}

/// S2 — `Ask` then `Tell` under the default `reader`/`writer` bundle: the value read comes back
/// out, and the same value lands in the log exactly once.
#[test]
fn s2_ask_then_tell_produces_value_and_log() {
    let program = flat_map(from_effect(Effect::Ask("x".into())), |v| {
        then(from_effect(Effect::Tell(v.clone())), pure(v))
    });
    let env = make_env(&[("x", Value::Int(10))]);
    let result = run(program, Vec::new(), env);
    let_assert!(Ok(Value::Int(v)) = result.value);
    assert!(v == 10);
    assert!(result.log.len() == 1);
    let_assert!(Some(Value::Int(logged)) = result.log.first().cloned());
    assert!(logged == 10);
}

/// S3 — `recover` turns a raised `DomainError` into an ordinary value instead of propagating it.
#[test]
fn s3_recover_converts_a_domain_error_into_a_value() {
    let program = recover(fail(Error::domain("boom")), |_e| pure(Value::from("recovered")));
    let result = run_bare(program);
    let_assert!(Ok(Value::Str(s)) = result.value);
    assert!(&*s == "recovered");
}

/// Property 9 — determinism: the same program, handlers, and env produce the same value and the
/// same log on two separate runs.
#[test]
fn running_the_same_program_twice_yields_the_same_observable_result() {
    let make_program = || {
        flat_map(from_effect(Effect::Ask("x".into())), |v| {
            then(from_effect(Effect::Tell(v.clone())), pure(v))
        })
    };
    let a = run(make_program(), Vec::new(), make_env(&[("x", Value::Int(7))]));
    let b = run(make_program(), Vec::new(), make_env(&[("x", Value::Int(7))]));
    let_assert!(Ok(Value::Int(x)) = a.value);
    let_assert!(Ok(Value::Int(y)) = b.value);
    assert!(x == y);
    assert!(a.log.len() == b.log.len());
}

/// `run_bare` installs no default bundle: an `Ask` with nothing handling it surfaces as
/// `UnhandledEffect` rather than being silently served.
#[test]
fn run_bare_surfaces_unhandled_ask_as_an_error() {
    let result = run_bare(from_effect(Effect::Ask("x".into())));
    let_assert!(Err(Error::UnhandledEffect { kind }) = result.value);
    assert!(kind.as_ref() == "Ask");
}

/// `retry` under `FixedDelay` re-runs the body, sleeping between attempts, until it either
/// succeeds or exhausts `max_attempts`; here it succeeds on the third attempt.
#[test]
fn retry_recovers_after_enough_attempts() {
    let attempts = Rc::new(RefCell::new(0u32));
    let attempts_for_body = attempts.clone();
    let body = flat_map(pure(Value::Unit), move |_| {
        let mut n = attempts_for_body.borrow_mut();
        *n += 1;
        if *n < 3 {
            fail(Error::domain("not yet"))
        } else {
            pure(Value::from("done"))
        }
    });

    let program = retry(
        body,
        RetryPolicy::FixedDelay {
            interval: Duration::from_millis(1),
            max_attempts: 5,
        },
    );
    let result = run_bare(program);
    let_assert!(Ok(Value::Str(s)) = result.value);
    assert!(&*s == "done");
    assert!(*attempts.borrow() == 3);
}

/// `retry` gives up once `max_attempts` is exhausted, surfacing the last failure.
#[test]
fn retry_gives_up_after_max_attempts() {
    let body = fail(Error::domain("always fails"));
    let program = retry(
        body,
        RetryPolicy::FixedDelay {
            interval: Duration::from_millis(1),
            max_attempts: 2,
        },
    );
    let result = run_bare(program);
    let_assert!(Err(Error::DomainError { .. }) = result.value);
}

/// `Runtime::new` stores whatever `EngineOptions` it was built with, readable back through
/// `Runtime::engine_options`.
#[test]
fn runtime_exposes_the_engine_options_it_was_constructed_with() {
    let options = EngineOptions {
        fail_on_concurrent_await: false,
    };
    let runtime = Runtime::new(Vec::new(), HashMap::new(), &SchedulerOptions::default(), &options);
    assert!(!runtime.engine_options().fail_on_concurrent_await);
}

/// `GetState`/`SetState` under the default bundle read and write a shared cell that comes back
/// out as `RunResult.state` once the run finishes.
#[test]
fn set_state_then_get_state_round_trips_through_the_default_bundle() {
    let program = then(
        from_effect(Effect::SetState("k".into(), Value::Int(5))),
        from_effect(Effect::GetState("k".into())),
    );
    let result = run(program, Vec::new(), HashMap::new());
    let_assert!(Ok(Value::Int(v)) = result.value);
    assert!(v == 5);
    let_assert!(Some(Value::Int(stored)) = result.state.get("k").cloned());
    assert!(stored == 5);
}

/// `lazy_ask` evaluates each source program at most once: the second `Ask` for the same key
/// returns the cached value instead of re-running the program that produced it.
#[test]
fn lazy_ask_memoises_each_key_after_its_first_evaluation() {
    let evaluations = Rc::new(RefCell::new(0u32));
    let evaluations_for_source = evaluations.clone();
    let source = flat_map(pure(Value::Unit), move |_| {
        *evaluations_for_source.borrow_mut() += 1;
        pure(Value::Int(99))
    });

    let mut sources = HashMap::new();
    sources.insert("x".to_string(), source);

    let program = with_handler(
        lazy_ask(sources),
        then(
            from_effect(Effect::Ask("x".into())),
            from_effect(Effect::Ask("x".into())),
        ),
    );
    let result = run_bare(program);
    let_assert!(Ok(Value::Int(v)) = result.value);
    assert!(v == 99);
    assert!(*evaluations.borrow() == 1);
}

/// `result_safe` turns a raised failure into an `Outcome` value rather than propagating it —
/// exactly `try_`, under the name the default bundle documents it as.
#[test]
fn result_safe_converts_a_failure_into_an_outcome_value() {
    let result = run_bare(result_safe(fail(Error::domain("boom"))));
    let_assert!(Ok(Value::List(items)) = result.value);
    let_assert!(Some(Value::Str(tag)) = items.first());
    assert!(&**tag == "err");
}

/// A host `Future` bridged through `Runtime::await_host_future` resolves through `run_async`,
/// driven to completion with the no-op-waker `block_on` helper above.
#[test]
fn await_host_future_bridges_an_already_ready_future_through_run_async() {
    let runtime = Runtime::new(
        Vec::new(),
        HashMap::new(),
        &SchedulerOptions::default(),
        &EngineOptions::default(),
    );
    let program = runtime.await_host_future(async { Ok(Value::Int(42)) });
    let result = block_on(runtime.run_async(program));
    let_assert!(Ok(Value::List(items)) = result.value);
    let_assert!(Some(Value::Str(tag)) = items.first());
    assert!(&**tag == "ok");
    let_assert!(Some(Value::Int(v)) = items.get(1).cloned());
    assert!(v == 42);
}
