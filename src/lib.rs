//! An algebraic-effects runtime: a CESK abstract machine, a handler protocol for interpreting
//! effects, and a cooperative scheduler for running many [`Program`]s concurrently on one thread.
//!
//! ```text
//! program::Program   — what to compute: pure values, effects, and combinators over them
//! handler::Handler   — how to interpret an effect a program raised
//! vm                 — the kernel that evaluates a Program against a handler stack
//! scheduler          — cooperative concurrency: spawn, gather, race, sleep, promises
//! runtime            — the public entry points: `run`, `run_async`, `run_bare`
//! ```
//!
//! Grounded on the teacher crate's module layout
//! (`examples/restatedev-sdk-shared-core/src/lib.rs`): a small, dependency-light kernel module tree
//! with the public surface gathered at the crate root, re-exporting just the types a caller needs
//! to build and run a program without reaching into `vm`/`scheduler` internals.

mod continuation;
mod coroutine;
mod default_handlers;
mod effect;
mod error;
mod handler;
mod program;
mod retry;
mod runtime;
mod scheduler;
mod value;
mod vm;

pub use continuation::Continuation;
pub use coroutine::{from_fn, Routine, RoutineInput, RoutineStep};
pub use default_handlers::{lazy_ask, reader, result_safe, state, writer};
pub use effect::{Effect, GatherOptions, Priority, RaceOptions, SpawnRequest};
pub use error::{Error, ErrorCode, VMResult};
pub use handler::{Handler, HandlerStack};
pub use program::{
    dict, fail, first_some, first_success, flat_map, from_effect, from_routine, gather, intercept,
    lift, list, map, none_value, pure, race, recover, retry, sequence, some_value, spawn, then,
    traverse, try_, tuple, with_handler, Program,
};
pub use retry::RetryPolicy;
pub use runtime::{run, run_async, run_bare, EngineOptions, Runtime, RunAsync, RunResult, SchedulerOptions};
pub use scheduler::{FutureHandle, PromiseId, TaskId};
pub use value::{DomainPayload, Outcome, Value};

#[cfg(test)]
mod tests;
