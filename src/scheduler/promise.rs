//! Promises: write-once result cells. A `Future` is just the read side of a `Promise` plus the
//! implicit one backing every `spawn`ed task (a task's `FutureHandle` shares numeric space with its
//! `TaskId`, resolved automatically when the task finishes — see `Scheduler::finish_task`).
//!
//! Waiters are not tracked here; `Scheduler::collect_waiters_on` scans tasks directly for whichever
//! `FutureHandle` they're blocked on, so a promise needs only remember whether it's been completed.

use crate::error::Error;
use crate::value::Value;

pub(crate) enum PromiseState {
    Pending,
    Completed(Result<Value, Error>),
}

pub(crate) struct Promise {
    pub(crate) state: PromiseState,
}

impl Promise {
    pub(crate) fn pending() -> Self {
        Promise {
            state: PromiseState::Pending,
        }
    }
}
