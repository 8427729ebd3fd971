//! Handler ordering, `Pass`/`Delegate`, `Intercept`, and nested-handler invocation counting.

use super::*;
use assert2::let_assert;
use std::cell::RefCell;
use std::rc::Rc;

/// Property: handler ordering — `with_handler(outer, with_handler(inner, effect))` invokes `inner`
/// first; `inner` delegating reaches `outer`.
#[test]
fn inner_handler_runs_before_outer_and_delegate_reaches_it() {
    let calls = Rc::new(RefCell::new(Vec::new()));

    let calls_inner = calls.clone();
    let inner = Handler::new("inner", move |_effect, _k| {
        calls_inner.borrow_mut().push("inner");
        from_effect(Effect::Delegate)
    });

    let calls_outer = calls.clone();
    let outer = Handler::new("outer", move |effect, k| {
        calls_outer.borrow_mut().push("outer");
        match effect {
            Effect::Ask(_) => from_effect(Effect::Resume(k, Box::new(Value::Int(42)))),
            _ => from_effect(Effect::Delegate),
        }
    });

    let program = with_handler(outer, with_handler(inner, from_effect(Effect::Ask("x".into()))));
    let result = run_bare(program);
    let_assert!(Ok(Value::Int(v)) = result.value);
    assert!(v == 42);
    assert!(*calls.borrow() == vec!["inner", "outer"]);
}

/// Property: `Pass` vs. `Delegate`. This crate's `Pass` advances dispatch to the next handler
/// candidate exactly like `Delegate` (see `DESIGN.md`'s Open Question 4 for why the stronger
/// "escape the whole dynamic extent in one shot" semantic implied by `Effect::Pass`'s doc comment
/// was not adopted): a handler that always calls `Pass` still reaches the outer default once
/// dispatch walks past it, one candidate at a time.
#[test]
fn pass_advances_to_next_handler_same_as_delegate() {
    let inner = Handler::new("inner", |_effect, _k| from_effect(Effect::Pass));
    let outer = Handler::new("outer", |effect, k| match effect {
        Effect::Ask(_) => from_effect(Effect::Resume(k, Box::new(Value::Int(7)))),
        _ => from_effect(Effect::Delegate),
    });

    let program = with_handler(outer, with_handler(inner, from_effect(Effect::Ask("x".into()))));
    let result = run_bare(program);
    let_assert!(Ok(Value::Int(v)) = result.value);
    assert!(v == 7);
}

/// A handler that neither resumes, delegates, nor passes — it just returns a plain value — ends
/// the effect site with that value directly; the continuation captured at the effect site (the
/// rest of the program that would have run after the effect) is discarded rather than resumed.
#[test]
fn handler_body_that_falls_through_without_resuming_becomes_the_effect_site_value() {
    let handler = Handler::new("never_resumes", |_effect, _k| pure(Value::from("fell through")));
    let program = then(from_effect(Effect::Ask("x".into())), pure(Value::from("unreachable")));
    let result = run_bare(with_handler(handler, program));
    let_assert!(Ok(Value::Str(s)) = result.value);
    assert!(&*s == "fell through");
}

/// `Effect::Defer` is the one way a handler body can legitimately suspend: unlike plain
/// fall-through, it leaves the task parked rather than finishing the effect site with a value.
#[test]
fn handler_body_that_defers_parks_the_task_instead_of_finishing() {
    let handler = Handler::new("never_resumes", |_effect, _k| from_effect(Effect::Defer));
    let program = with_handler(handler, from_effect(Effect::Ask("x".into())));
    let result = run_bare(program);
    // The root task never finishes because nothing ever resumes it; `run_bare` reports this as a
    // domain error ("every task is blocked with nothing left to advance") rather than hanging.
    let_assert!(Err(Error::DomainError { .. }) = result.value);
}

/// S5 — `Intercept` rewrites an effect before it reaches dispatch.
#[test]
fn intercept_rewrites_effect_before_dispatch() {
    let program = intercept(from_effect(Effect::Ask("k".into())), |effect| match effect {
        Effect::Ask(key) if key == "k" => Effect::Ask("k2".into()),
        other => other,
    });
    let env = make_env(&[("k2", Value::Int(99))]);
    let result = run(program, Vec::new(), env);
    let_assert!(Ok(Value::Int(v)) = result.value);
    assert!(v == 99);
}

/// S6 — nested `with_handler` for the same effect kind: the outer handler's invocation count
/// equals the number of times the inner handler delegated.
#[test]
fn outer_invocation_count_matches_inner_delegate_calls() {
    let count = Rc::new(RefCell::new(0u32));
    let count_for_outer = count.clone();
    let outer = Handler::new("outer", move |effect, k| {
        *count_for_outer.borrow_mut() += 1;
        match effect {
            Effect::Ask(_) => from_effect(Effect::Resume(k, Box::new(Value::Int(1)))),
            _ => from_effect(Effect::Delegate),
        }
    });
    let inner = Handler::new("inner", |_effect, _k| from_effect(Effect::Delegate));

    let program = with_handler(outer, with_handler(inner, from_effect(Effect::Ask("x".into()))));
    let result = run_bare(program);
    let_assert!(Ok(Value::Int(_)) = result.value);
    assert!(*count.borrow() == 1);
}

/// `GetHandlers` called from inside a handler body reports the remaining candidates a nested
/// `Delegate` from that body would see — not the full kont-wide handler stack including the
/// handler currently running.
#[test]
fn get_handlers_reports_remaining_candidates_for_delegation() {
    let observed: Rc<RefCell<Option<usize>>> = Rc::new(RefCell::new(None));
    let observed_for_probe = observed.clone();
    let probe = Handler::new("probe", move |effect, _k| match effect {
        Effect::Ask(_) => {
            let observed = observed_for_probe.clone();
            flat_map(from_effect(Effect::GetHandlers), move |v| {
                let_assert!(Value::Handlers(stack) = v);
                *observed.borrow_mut() = Some(stack.len());
                from_effect(Effect::Delegate)
            })
        }
        _ => from_effect(Effect::Delegate),
    });
    let other = Handler::new("other", |effect, k| match effect {
        Effect::Ask(_) => from_effect(Effect::Resume(k, Box::new(Value::Int(1)))),
        _ => from_effect(Effect::Delegate),
    });

    let program = with_handler(other, with_handler(probe, from_effect(Effect::Ask("x".into()))));
    let result = run_bare(program);
    let_assert!(Ok(Value::Int(_)) = result.value);
    assert!(*observed.borrow() == Some(1));
}
