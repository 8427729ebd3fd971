//! Handlers: the functions that interpret effects.
//!
//! A handler is morally `Fn(Effect, Continuation) -> Program`: given the effect a program raised
//! and a one-shot [`Continuation`] standing for "the rest of that program", it returns a new
//! `Program` describing how to respond (typically ending in `Effect::Resume`). Wrapped in `Rc` so
//! `with_handler`/`HandlerStack` can clone it cheaply, the way the teacher crate's `Context` clones
//! `Rc`-held journal state rather than copying it (`examples/restatedev-sdk-shared-core/src/vm/context.rs`).

use crate::continuation::Continuation;
use crate::effect::Effect;
use crate::program::Program;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

thread_local! {
    static NEXT_HANDLER_ID: Cell<u64> = Cell::new(0);
}

fn next_id() -> u64 {
    NEXT_HANDLER_ID.with(|c| {
        let id = c.get();
        c.set(id + 1);
        id
    })
}

/// A single effect interpreter, installed via `with_handler` or carried in the default bundle.
#[derive(Clone)]
pub struct Handler {
    id: u64,
    label: &'static str,
    body: Rc<dyn Fn(Effect, Continuation) -> Program>,
}

impl Handler {
    /// `label` is purely diagnostic (surfaced in tracing spans and `Debug`); it does not
    /// participate in dispatch or equality.
    pub fn new(label: &'static str, body: impl Fn(Effect, Continuation) -> Program + 'static) -> Self {
        Handler {
            id: next_id(),
            label,
            body: Rc::new(body),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn invoke(&self, effect: Effect, k: Continuation) -> Program {
        (self.body)(effect, k)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

/// A snapshot of the handlers visible at some point in a program, innermost first. Returned by
/// `GetHandlers`, consumed by `SetHandlers`, and used by `run`/`spawn` to install the default
/// bundle underneath whatever the caller installs explicitly.
#[derive(Clone, Debug, Default)]
pub struct HandlerStack {
    /// Innermost first.
    innermost_first: Rc<Vec<Handler>>,
}

impl HandlerStack {
    pub fn empty() -> Self {
        HandlerStack {
            innermost_first: Rc::new(Vec::new()),
        }
    }

    pub(crate) fn from_innermost_first(handlers: Vec<Handler>) -> Self {
        HandlerStack {
            innermost_first: Rc::new(handlers),
        }
    }

    /// Build a stack from handlers listed outermost first (the natural order to read off a
    /// `with_handler(a, with_handler(b, ...))` nest from the outside in).
    pub fn from_outermost_first(handlers: Vec<Handler>) -> Self {
        let mut innermost_first = handlers;
        innermost_first.reverse();
        HandlerStack::from_innermost_first(innermost_first)
    }

    pub(crate) fn get(&self, idx: usize) -> Option<&Handler> {
        self.innermost_first.get(idx)
    }

    pub fn len(&self) -> usize {
        self.innermost_first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.innermost_first.is_empty()
    }

    /// Append `other` below `self` (i.e. `self`'s handlers stay innermost). Used to layer the
    /// default handler bundle underneath a run's explicit stack.
    pub(crate) fn chain(&self, other: &HandlerStack) -> HandlerStack {
        let mut combined = (*self.innermost_first).clone();
        combined.extend(other.innermost_first.iter().cloned());
        HandlerStack::from_innermost_first(combined)
    }
}
