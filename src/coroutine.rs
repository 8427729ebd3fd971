//! The host-coroutine bridge: lets generator-style state machines participate in the algebra via
//! `Program::FromRoutine` without the kernel depending on any particular coroutine library.
//!
//! Sealed — rejects anything that merely duck-types the coroutine protocol — so the only
//! way to get a [`Routine`] is through [`from_fn`], which wraps a plain closure-driven state
//! machine — the same "closed trait, one blessed constructor" shape the teacher crate uses for its
//! `VM` trait object boundary (`examples/restatedev-sdk-shared-core/src/lib.rs`).

use crate::effect::Effect;
use crate::error::Error;
use crate::value::Value;

mod private {
    pub trait Sealed {}
}

/// What a routine does in response to being driven one step.
pub enum RoutineStep {
    /// Suspend at `effect`; the result of dispatching it will be fed back via `send`.
    Yield(Effect),
    /// The routine is finished.
    Done(Value),
    /// The routine raised an error instead of finishing normally.
    Failed(Error),
}

/// A host coroutine: something that can be driven forward with a value, thrown into with an
/// error, and closed early. Sealed — implement via [`from_fn`], not directly.
pub trait Routine: private::Sealed {
    fn send(&mut self, value: Value) -> RoutineStep;
    fn throw(&mut self, error: Error) -> RoutineStep;
    fn close(&mut self);
}

/// The state machine backing every [`Routine`] built by this crate. A routine is just a function
/// from "the value or error being fed in" to the next step, closed over whatever local state the
/// author's generator needs — the same shape the teacher crate uses internally to turn its
/// `do_transition` dispatch into a flat function rather than a native recursive descent.
struct FnRoutine<F> {
    step: Option<F>,
    closed: bool,
}

pub enum Input {
    Send(Value),
    Throw(Error),
}

impl<F> private::Sealed for FnRoutine<F> {}

impl<F> Routine for FnRoutine<F>
where
    F: FnMut(Input) -> (RoutineStep, Option<F>),
{
    fn send(&mut self, value: Value) -> RoutineStep {
        self.drive(Input::Send(value))
    }

    fn throw(&mut self, error: Error) -> RoutineStep {
        self.drive(Input::Throw(error))
    }

    fn close(&mut self) {
        self.closed = true;
        self.step = None;
    }
}

impl<F> FnRoutine<F>
where
    F: FnMut(Input) -> (RoutineStep, Option<F>),
{
    fn drive(&mut self, input: Input) -> RoutineStep {
        if self.closed {
            return RoutineStep::Failed(Error::invalid_routine("routine driven after close()"));
        }
        match self.step.take() {
            Some(mut f) => {
                let (step, next) = f(input);
                self.step = next;
                if self.step.is_none() {
                    self.closed = true;
                }
                step
            }
            None => RoutineStep::Failed(Error::invalid_routine("routine driven after completion")),
        }
    }
}

/// Build a [`Routine`] from a step function: given the value or error fed in, produce the next
/// [`RoutineStep`] and, unless the routine is finished, the function to call for the step after
/// that. This is the only supported way to satisfy [`Routine`] — the sealed trait rejects any
/// other implementation at compile time, and a routine built any other way than through this
/// constructor simply cannot exist.
pub fn from_fn<F>(first: F) -> impl Routine
where
    F: FnMut(Input) -> (RoutineStep, Option<F>) + 'static,
{
    FnRoutine {
        step: Some(first),
        closed: false,
    }
}

pub use Input as RoutineInput;
