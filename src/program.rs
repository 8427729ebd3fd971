//! `Program`: the effect algebra itself.
//!
//! A `Program` is a description of a computation, not the computation running — evaluating one is
//! the kernel's job ([`crate::vm`]). Every combinator in this module just builds a `Program` value;
//! none of them touch a store, a scheduler, or a handler. Recursive variants hold `Rc<Program>`
//! instead of `Box<Program>` so `Program` stays cheaply `Clone`-able (needed because the same
//! sub-program can legitimately be reused — e.g. `retry` evaluates the same `Program` repeatedly).

use crate::coroutine::Routine;
use crate::effect::{Effect, GatherOptions, RaceOptions, SpawnRequest};
use crate::error::Error;
use crate::handler::Handler;
use crate::retry::RetryPolicy;
use crate::value::Value;
use std::rc::Rc;

/// The effect algebra. See module docs for the combinators built on top of it.
#[derive(Clone)]
pub enum Program {
    Pure(Value),
    Bind(Rc<Program>, Rc<dyn Fn(Value) -> Program>),
    Effect(Effect),
    Intercept(Rc<Program>, Rc<dyn Fn(Effect) -> Effect>),
    WithHandler(Handler, Rc<Program>),
    Raise(Error),
    Try(Rc<Program>),
    Recover(Rc<Program>, Rc<dyn Fn(Error) -> Program>),
    FromRoutine(Rc<dyn Fn() -> Box<dyn Routine>>),
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Program::Pure(v) => f.debug_tuple("Pure").field(v).finish(),
            Program::Bind(p, _) => f.debug_tuple("Bind").field(p).field(&"<fn>").finish(),
            Program::Effect(e) => f.debug_tuple("Effect").field(e).finish(),
            Program::Intercept(p, _) => f.debug_tuple("Intercept").field(p).field(&"<fn>").finish(),
            Program::WithHandler(h, p) => f.debug_tuple("WithHandler").field(h).field(p).finish(),
            Program::Raise(e) => f.debug_tuple("Raise").field(e).finish(),
            Program::Try(p) => f.debug_tuple("Try").field(p).finish(),
            Program::Recover(p, _) => f.debug_tuple("Recover").field(p).field(&"<fn>").finish(),
            Program::FromRoutine(_) => f.debug_tuple("FromRoutine").field(&"<fn>").finish(),
        }
    }
}

/// A program that immediately produces `value` without performing any effect.
pub fn pure(value: impl Into<Value>) -> Program {
    Program::Pure(value.into())
}

/// A program that immediately fails with `error`.
pub fn fail(error: Error) -> Program {
    Program::Raise(error)
}

/// Lift a bare effect into a program whose value is whatever the installed handler resumes it
/// with.
pub fn from_effect(effect: Effect) -> Program {
    Program::Effect(effect)
}

/// Sequence `p` with `k`, feeding `p`'s result into `k`.
pub fn flat_map(p: Program, k: impl Fn(Value) -> Program + 'static) -> Program {
    Program::Bind(Rc::new(p), Rc::new(k))
}

/// Transform `p`'s result with a pure function.
pub fn map(p: Program, f: impl Fn(Value) -> Value + 'static) -> Program {
    flat_map(p, move |v| Program::Pure(f(v)))
}

/// Run `p`, discard its result, then run `q`.
pub fn then(p: Program, q: Program) -> Program {
    flat_map(p, move |_| q.clone())
}

/// Install `transform` on every effect raised by `p` (and programs nested inside it), inside-out
/// with any enclosing `intercept` scope.
pub fn intercept(p: Program, transform: impl Fn(Effect) -> Effect + 'static) -> Program {
    Program::Intercept(Rc::new(p), Rc::new(transform))
}

/// Run `p` with `handler` installed innermost.
pub fn with_handler(handler: Handler, p: Program) -> Program {
    Program::WithHandler(handler, Rc::new(p))
}

/// Run `p`; if it fails, return the failure as an `Outcome` value instead of propagating it.
pub fn try_(p: Program) -> Program {
    Program::Try(Rc::new(p))
}

/// Run `p`; if it fails, run `recovery(error)` instead of propagating the failure.
pub fn recover(p: Program, recovery: impl Fn(Error) -> Program + 'static) -> Program {
    Program::Recover(Rc::new(p), Rc::new(recovery))
}

/// Alias for [`pure`], read as "lift this value into the algebra".
pub fn lift(value: impl Into<Value>) -> Program {
    pure(value)
}

/// Wrap a host coroutine factory as a program. Re-invoked from scratch on every evaluation, so
/// `factory` must be side-effect free until actually driven.
pub fn from_routine(factory: impl Fn() -> Box<dyn Routine> + 'static) -> Program {
    Program::FromRoutine(Rc::new(factory))
}

/// Run every program in order, collecting their results into a `Value::List`. Builds an
/// iteratively-folded `Bind` chain — O(n) to construct, and evaluated by the kernel's trampoline
/// rather than native recursion, so there is no practical limit on `programs.len()`.
pub fn sequence(programs: Vec<Program>) -> Program {
    let mut iter = programs.into_iter().rev();
    let mut acc = match iter.next() {
        Some(last) => map(last, |v| Value::List(vec![v])),
        None => return pure(Value::List(Vec::new())),
    };
    for p in iter {
        let rest = acc;
        acc = flat_map(p, move |head| {
            let rest = rest.clone();
            map(rest, move |tail| match tail {
                Value::List(mut items) => {
                    items.insert(0, head.clone());
                    Value::List(items)
                }
                other => Value::List(vec![head.clone(), other]),
            })
        });
    }
    acc
}

/// Apply `f` to every item, then `sequence` the resulting programs.
pub fn traverse<T: 'static>(items: Vec<T>, f: impl Fn(T) -> Program + 'static) -> Program {
    sequence(items.into_iter().map(f).collect())
}

/// Run every program in order, collecting their results into a `Value::List`. Exactly `sequence`
/// under a name read naturally at a list-literal call site.
pub fn list(programs: Vec<Program>) -> Program {
    sequence(programs)
}

/// Run every program in order, collecting their results into a `Value::List` treated as a
/// fixed-arity tuple; same representation as `list`, kept as a distinct name for call-site clarity.
pub fn tuple(programs: Vec<Program>) -> Program {
    list(programs)
}

/// Run each value program in key order and collect the results into a `Value::Dict`.
pub fn dict(entries: Vec<(String, Program)>) -> Program {
    let (keys, programs): (Vec<String>, Vec<Program>) = entries.into_iter().unzip();
    map(sequence(programs), move |values| {
        let values = match values {
            Value::List(items) => items,
            other => vec![other],
        };
        Value::Dict(std::sync::Arc::new(
            keys.iter().cloned().zip(values).collect(),
        ))
    })
}

/// Run `programs` left to right, returning the first successful `Outcome`, or the last failure if
/// every one of them fails.
pub fn first_success(programs: Vec<Program>) -> Program {
    let mut iter = programs.into_iter();
    match iter.next() {
        None => fail(Error::domain("first_success: no programs given")),
        Some(first) => iter.fold(first, |acc, next| {
            recover(acc, move |_| next.clone())
        }),
    }
}

/// Run `programs` left to right, returning the first one whose `Outcome` is `Some` (by convention,
/// a `Value::List([Value::Str("some"), v])` / `Value::List([Value::Str("none")])` tagged sum), or
/// `none` if every one of them is `none`.
pub fn first_some(programs: Vec<Program>) -> Program {
    let mut iter = programs.into_iter();
    match iter.next() {
        None => pure(none_value()),
        Some(first) => iter.fold(first, |acc, next| {
            flat_map(acc, move |v| {
                if is_some_value(&v) {
                    pure(v)
                } else {
                    next.clone()
                }
            })
        }),
    }
}

pub fn some_value(v: Value) -> Value {
    Value::List(vec![Value::from("some"), v])
}

pub fn none_value() -> Value {
    Value::List(vec![Value::from("none")])
}

fn is_some_value(v: &Value) -> bool {
    matches!(v, Value::List(items) if matches!(items.first(), Some(Value::Str(tag)) if &**tag == "some"))
}

/// Spawn `p` as a sibling task and return its `TaskId` immediately (does not wait for `p`).
pub fn spawn(p: Program, request: SpawnRequest) -> Program {
    from_effect(Effect::Spawn(Box::new(p), request))
}

/// Spawn every program, then wait for all of them. Returns a `Value::List` of
/// outcomes in the same order as `programs`.
pub fn gather(programs: Vec<Program>, options: GatherOptions) -> Program {
    let requests: Vec<(Program, SpawnRequest)> = programs
        .into_iter()
        .map(|p| (p, SpawnRequest::default()))
        .collect();
    flat_map(spawn_all(requests), move |handles_value| {
        let handles = extract_futures(handles_value);
        from_effect(Effect::Gather(handles, options))
    })
}

/// Spawn every program, then wait for the first to complete, cancelling the rest by default.
pub fn race(programs: Vec<Program>, options: RaceOptions) -> Program {
    let requests: Vec<(Program, SpawnRequest)> = programs
        .into_iter()
        .map(|p| (p, SpawnRequest::default()))
        .collect();
    flat_map(spawn_all(requests), move |handles_value| {
        let handles = extract_futures(handles_value);
        from_effect(Effect::Race(handles, options))
    })
}

fn spawn_all(requests: Vec<(Program, SpawnRequest)>) -> Program {
    sequence(
        requests
            .into_iter()
            .map(|(p, req)| from_effect(Effect::Spawn(Box::new(p), req)))
            .collect(),
    )
}

fn extract_futures(v: Value) -> Vec<crate::scheduler::FutureHandle> {
    match v {
        Value::List(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::TaskId(id) => Some(crate::scheduler::FutureHandle(id.0)),
                Value::Future(h) => Some(h),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Run `p`, retrying on failure per `policy`, sleeping between attempts.
pub fn retry(p: Program, policy: RetryPolicy) -> Program {
    retry_attempt(p, policy, 0)
}

fn retry_attempt(p: Program, policy: RetryPolicy, attempt: u32) -> Program {
    // `try_` converts failure into an Outcome value instead of propagating it, so this can inspect
    // the result and decide whether to retry instead of `recover` re-raising immediately.
    let p2 = p.clone();
    flat_map(try_(p.clone()), move |outcome| match outcome {
        Value::List(items) if matches!(items.first(), Some(Value::Str(tag)) if &**tag == "ok") => {
            pure(items.into_iter().nth(1).unwrap_or(Value::Unit))
        }
        Value::List(items) => {
            let message = items
                .get(1)
                .map(|v| format!("{v:?}"))
                .unwrap_or_default();
            match policy.next_delay(attempt) {
                Some(delay) => then(
                    from_effect(Effect::Sleep(delay)),
                    retry_attempt(p2.clone(), policy, attempt + 1),
                ),
                None => fail(Error::domain(format!("retry exhausted: {message}"))),
            }
        }
        other => pure(other),
    })
}
