//! The convenience handler bundle `Runtime::run`/`run_async` install underneath whatever handlers
//! the caller supplies: `reader`/`lazy_ask` (serve `Ask`), `writer` (serve `Tell`), `state` (serve
//! `GetState`/`SetState`), and `await_handler` (bridge a host `Future` into the algebra). None of
//! these are privileged — they are ordinary [`crate::handler::Handler`]s a program could install
//! itself via `with_handler`; `run_bare` simply skips installing them.
//!
//! `Spawn`/`Gather`/`Race`/`CreatePromise`/`CompletePromise`/`AwaitFuture`/`Cancel`/`Sleep` are
//! *not* here: the kernel serves them directly from `scheduler` state inside `vm::step_effect`,
//! since nothing about their interpretation is ever meant to be user-overridable (see `DESIGN.md`).
//!
//! Grounded on the teacher crate's `Context` cell-based state bookkeeping
//! (`examples/restatedev-sdk-shared-core/src/vm/context.rs`): a small `Rc<RefCell<_>>` cell per
//! piece of ambient state, mutated from otherwise-`Fn` closures the same way the teacher's journal
//! cursor is mutated from methods that only ever see `&self`.

use crate::effect::Effect;
use crate::error::Error;
use crate::handler::Handler;
use crate::program::{self, Program};
use crate::value::Value;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Serve `Ask(key)` by looking `key` up in a fixed environment map. Raises `MissingEnvKey` for an
/// absent key rather than delegating, since an absent key is a program authoring error, not
/// something an outer handler is likely to know how to answer either.
pub fn reader(env: HashMap<String, Value>) -> Handler {
    let env = Rc::new(env);
    Handler::new("reader", move |effect, k| match effect {
        Effect::Ask(key) => match env.get(&key) {
            Some(value) => program::from_effect(Effect::Resume(k, Box::new(value.clone()))),
            None => program::fail(Error::missing_env_key(key)),
        },
        _ => program::from_effect(Effect::Delegate),
    })
}

/// Like `reader`, but each entry is a `Program` evaluated at most once: the first `Ask` for a key
/// runs its program and memoises the result; every later `Ask` for the same key returns the cached
/// value without re-running it.
pub fn lazy_ask(sources: HashMap<String, Program>) -> Handler {
    let sources = Rc::new(sources);
    let cache: Rc<RefCell<HashMap<String, Value>>> = Rc::new(RefCell::new(HashMap::new()));
    Handler::new("lazy_ask", move |effect, k| match effect {
        Effect::Ask(key) => {
            if let Some(value) = cache.borrow().get(&key) {
                return program::from_effect(Effect::Resume(k, Box::new(value.clone())));
            }
            match sources.get(&key) {
                Some(source) => {
                    let cache = cache.clone();
                    let key = key.clone();
                    program::flat_map(source.clone(), move |value| {
                        cache.borrow_mut().insert(key.clone(), value.clone());
                        program::from_effect(Effect::Resume(k.clone(), Box::new(value)))
                    })
                }
                None => program::fail(Error::missing_env_key(key)),
            }
        }
        _ => program::from_effect(Effect::Delegate),
    })
}

/// Serve `Tell(v)` by appending to a shared log, read back afterwards as `RunResult.log`.
pub fn writer(log: Rc<RefCell<Vec<Value>>>) -> Handler {
    Handler::new("writer", move |effect, k| match effect {
        Effect::Tell(value) => {
            log.borrow_mut().push(value);
            program::from_effect(Effect::Resume(k, Box::new(Value::Unit)))
        }
        _ => program::from_effect(Effect::Delegate),
    })
}

/// Serve `GetState`/`SetState` against a shared cell, read back afterwards as `RunResult.state`.
/// Deliberately distinct from the kernel's per-task `Store` (which backs isolated-spawn
/// snapshotting and is never exposed to handlers): this is a convenience binding built on top,
/// shared by every task under one `Runtime` unless a program installs its own `state` handler
/// innermost for a narrower scope.
pub fn state(cell: Rc<RefCell<HashMap<String, Value>>>) -> Handler {
    Handler::new("state", move |effect, k| match effect {
        Effect::GetState(key) => {
            let value = cell.borrow().get(&key).cloned().unwrap_or(Value::Unit);
            program::from_effect(Effect::Resume(k, Box::new(value)))
        }
        Effect::SetState(key, value) => {
            cell.borrow_mut().insert(key, value);
            program::from_effect(Effect::Resume(k, Box::new(Value::Unit)))
        }
        _ => program::from_effect(Effect::Delegate),
    })
}

/// Wrap `body` so a failure surfaces as an `Outcome` value (`["ok", v]` / `["err", message]`)
/// instead of aborting the run. A combinator, not a handler — `Try` is part of the program algebra
/// itself, so this just applies it; it is grouped with the rest of the default bundle because the
/// specification names it alongside `reader`/`writer`/`state` as ambient convenience.
pub fn result_safe(body: Program) -> Program {
    program::try_(body)
}

/// The stable discriminator for the domain effect `await_handler` recognises; see
/// `crate::runtime::Runtime::await_host_future`, the only supported way to raise one.
pub(crate) const AWAIT_HOST_FUTURE: &str = "doeff.await_host_future";

/// Bridge a host `Future` into the algebra. A program raises the `AWAIT_HOST_FUTURE` domain effect
/// carrying a `HostFutureId` (see `crate::runtime`); this handler registers that id against the
/// calling task and defers it. `Runtime::run_async`'s own poll loop is what actually drives the
/// registered future and resumes the deferred task once it resolves — this handler only performs
/// the registration, since a `Handler` body is a synchronous `Fn` with no access to a `Context`.
pub fn await_handler(register: Rc<dyn Fn(u64, crate::continuation::Continuation)>) -> Handler {
    Handler::new("await_handler", move |effect, k| match effect {
        Effect::Domain { kind, payload } if kind == AWAIT_HOST_FUTURE => {
            match payload.downcast_ref::<u64>() {
                Some(id) => {
                    register(*id, k);
                    // This task stays parked until `Runtime::run_async` observes the registered
                    // future resolve and spawns a fresh task that resumes `k` with the outcome;
                    // `Effect::Defer` tells the kernel to leave the task deferred rather than treat
                    // this handler's return as the effect site's value.
                    program::from_effect(Effect::Defer)
                }
                None => program::fail(Error::domain("await_handler: malformed host future id")),
            }
        }
        _ => program::from_effect(Effect::Delegate),
    })
}
