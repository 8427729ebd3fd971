//! Purity of the `Program` algebra (monad laws) and the list/choice combinators built on top of
//! `flat_map`. Asserted via structural execution — running both sides and comparing results —
//! since `Program` itself has no `PartialEq`.

use super::*;
use assert2::let_assert;
use std::cell::RefCell;
use std::rc::Rc;

/// Property: purity of the algebra — left identity, `flat_map(pure(v), f) ≡ f(v)`.
#[test]
fn flat_map_pure_is_left_identity() {
    let f = |v: Value| match v {
        Value::Int(i) => pure(i * 2),
        other => panic!("unexpected {other:?}"),
    };
    let lhs = run_bare(flat_map(pure(21i64), f));
    let rhs = run_bare(f(Value::Int(21)));
    let_assert!(Ok(Value::Int(a)) = lhs.value);
    let_assert!(Ok(Value::Int(b)) = rhs.value);
    assert!(a == b && a == 42);
}

/// Property: purity of the algebra — right identity, `flat_map(p, pure) ≡ p`, checked against
/// a program that actually performs effects (not just a bare `pure` value).
#[test]
fn flat_map_pure_is_right_identity() {
    let make_program = || {
        flat_map(from_effect(Effect::Ask("k".into())), |v| {
            then(from_effect(Effect::Tell(v)), pure(()))
        })
    };
    let env = make_env(&[("k", Value::Int(10))]);
    let lhs = run(flat_map(make_program(), |v| pure(v)), Vec::new(), env.clone());
    let rhs = run(make_program(), Vec::new(), env);
    let_assert!(Ok(Value::Unit) = lhs.value);
    let_assert!(Ok(Value::Unit) = rhs.value);
    assert!(lhs.log.len() == rhs.log.len());
}

/// Property: purity of the algebra — associativity,
/// `flat_map(flat_map(p,f),g) ≡ flat_map(p, v -> flat_map(f(v),g))`.
#[test]
fn flat_map_is_associative() {
    fn f(v: Value) -> Program {
        match v {
            Value::Int(i) => pure(i + 1),
            other => panic!("unexpected {other:?}"),
        }
    }
    fn g(v: Value) -> Program {
        match v {
            Value::Int(i) => pure(i * 10),
            other => panic!("unexpected {other:?}"),
        }
    }

    let p = || pure(7i64);
    let lhs = flat_map(flat_map(p(), f), g);
    let rhs = flat_map(p(), |v| flat_map(f(v), g));

    let a = run_bare(lhs);
    let b = run_bare(rhs);
    let_assert!(Ok(Value::Int(x)) = a.value);
    let_assert!(Ok(Value::Int(y)) = b.value);
    assert!(x == y && x == 80);
}

/// `sequence`/`traverse` preserve order and collect every result.
#[test]
fn sequence_collects_results_in_order() {
    let program = sequence(vec![pure(1i64), pure(2i64), pure(3i64)]);
    let result = run_bare(program);
    let_assert!(Ok(Value::List(items)) = result.value);
    let nums: Vec<i64> = items
        .into_iter()
        .map(|v| match v {
            Value::Int(i) => i,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert!(nums == vec![1, 2, 3]);
}

#[test]
fn traverse_maps_then_sequences() {
    let program = traverse(vec![1i64, 2, 3], |i| pure(i * i));
    let result = run_bare(program);
    let_assert!(Ok(Value::List(items)) = result.value);
    let nums: Vec<i64> = items
        .into_iter()
        .map(|v| match v {
            Value::Int(i) => i,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert!(nums == vec![1, 4, 9]);
}

/// `list`/`tuple` run their component programs (not just collect already-pure values) — an effect
/// raised by one of them actually happens, in order.
#[test]
fn list_runs_its_component_programs_and_their_effects() {
    let program = list(vec![
        then(from_effect(Effect::Tell(Value::from("a"))), pure(1i64)),
        then(from_effect(Effect::Tell(Value::from("b"))), pure(2i64)),
    ]);
    let result = run(program, Vec::new(), HashMap::new());
    let_assert!(Ok(Value::List(items)) = result.value);
    let nums: Vec<i64> = items
        .into_iter()
        .map(|v| match v {
            Value::Int(i) => i,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert!(nums == vec![1, 2]);
    let logged: Vec<String> = result
        .log
        .into_iter()
        .map(|v| match v {
            Value::Str(s) => s.to_string(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert!(logged == vec!["a".to_string(), "b".to_string()]);
}

/// `dict` evaluates each value program in key order, in the dictionary `dict` returns.
#[test]
fn dict_runs_each_value_program_in_key_order() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let order_a = order.clone();
    let order_b = order.clone();
    let program = dict(vec![
        (
            "a".to_string(),
            flat_map(pure(Value::Unit), move |_| {
                order_a.borrow_mut().push("a");
                pure(1i64)
            }),
        ),
        (
            "b".to_string(),
            flat_map(pure(Value::Unit), move |_| {
                order_b.borrow_mut().push("b");
                pure(2i64)
            }),
        ),
    ]);
    let result = run_bare(program);
    let_assert!(Ok(Value::Dict(map)) = result.value);
    let_assert!(Some(Value::Int(a)) = map.get("a").cloned());
    let_assert!(Some(Value::Int(b)) = map.get("b").cloned());
    assert!(a == 1 && b == 2);
    assert!(*order.borrow() == vec!["a", "b"]);
}

/// `first_success` returns the first non-failing program's value, skipping failures.
#[test]
fn first_success_skips_failures() {
    let program = first_success(vec![
        fail(Error::domain("first attempt failed")),
        fail(Error::domain("second attempt failed")),
        pure(99i64),
    ]);
    let result = run_bare(program);
    let_assert!(Ok(Value::Int(v)) = result.value);
    assert!(v == 99);
}

#[test]
fn first_success_propagates_the_last_failure_when_all_fail() {
    let program = first_success(vec![
        fail(Error::domain("a")),
        fail(Error::domain("b")),
    ]);
    let result = run_bare(program);
    let_assert!(Err(Error::DomainError { message, .. }) = result.value);
    assert!(message.as_ref() == "b");
}

/// `first_some` returns the first `some`-tagged result, or `none` if every candidate is `none`.
#[test]
fn first_some_returns_first_some_value() {
    let program = first_some(vec![pure(none_value()), pure(some_value(Value::Int(5))), pure(none_value())]);
    let result = run_bare(program);
    let_assert!(Ok(Value::List(items)) = result.value);
    let_assert!(Some(Value::Str(tag)) = items.first());
    assert!(&**tag == "some");
}

#[test]
fn first_some_returns_none_when_every_candidate_is_none() {
    let program = first_some(vec![pure(none_value()), pure(none_value())]);
    let result = run_bare(program);
    let_assert!(Ok(Value::List(items)) = result.value);
    let_assert!(Some(Value::Str(tag)) = items.first());
    assert!(&**tag == "none");
}
