//! The effect registry: core, kernel-recognised effect kinds plus the capability hook that lets
//! domain code add its own without the kernel ever depending on it.
//!
//! Grounded on the teacher crate's closed `MessageType`/`CommandType` discriminant style
//! (`examples/restatedev-sdk-shared-core/src/vm/errors.rs`, `src/error.rs`): a small, stable,
//! `strum`-derived enum of kinds, with everything the kernel doesn't own pushed into a single
//! open variant.

use crate::continuation::Continuation;
use crate::handler::HandlerStack;
use crate::scheduler::FutureHandle;
use crate::value::{DomainPayload, Value};
use std::time::Duration;
use strum::IntoStaticStr;

/// Total order for task scheduling. Resolves the "exact priority levels" Open Question from the
/// spec: five levels, compared as a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, IntoStaticStr)]
#[repr(u8)]
pub enum Priority {
    Idle = 0,
    Background = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Options for [`Effect::Gather`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GatherOptions {
    /// If false (the default), the first failure cancels the rest and propagates. If true, every
    /// future's outcome (value or failure) is returned in order.
    pub return_exceptions: bool,
}

/// Options for [`Effect::Race`].
#[derive(Debug, Clone, Copy)]
pub struct RaceOptions {
    /// If true (the default), losing futures' tasks are cancelled once the winner is known.
    pub cancel_losers: bool,
}

impl Default for RaceOptions {
    fn default() -> Self {
        RaceOptions {
            cancel_losers: true,
        }
    }
}

/// A request to spawn a sibling task (see `Effect::Spawn`).
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub priority: Priority,
    /// If true, the child receives a copy-on-write snapshot of the parent store (isolated spawn).
    /// If false, the child shares the parent's store (co-task spawn).
    pub isolated: bool,
}

impl Default for SpawnRequest {
    fn default() -> Self {
        SpawnRequest {
            priority: Priority::Normal,
            isolated: true,
        }
    }
}

/// A tagged, immutable request whose interpretation is deferred to handlers.
///
/// `Resume`/`Delegate`/`Pass`/`SetHandlers`/`GetHandlers`/`Defer` are only ever produced from
/// inside a handler body (see [`crate::handler`]); the kernel special-cases them in dispatch
/// rather than forwarding them to a user handler.
#[derive(Debug, Clone, IntoStaticStr)]
pub enum Effect {
    // --- core, kernel-interpreted kinds -----------------------------------------------------
    /// Resume continuation `k` with value `v`. Only valid as the return of a handler body.
    Resume(Continuation, Box<Value>),
    /// Decline to interpret the current effect; re-dispatch to the next handler in this scope.
    Delegate,
    /// Escape every handler frame installed by `with_handler` in the current dynamic extent and
    /// re-dispatch to the outer scope.
    Pass,
    /// Replace the visible handler stack for the duration of the handler's own program.
    SetHandlers(HandlerStack),
    /// Read the currently visible handler stack.
    GetHandlers,
    /// End the handler body without resuming, delegating, or passing, and without the usual
    /// fall-through rule (return value becomes the effect site's value) applying either: the task
    /// stays parked until something external resumes the captured continuation directly. The only
    /// way a handler body can legitimately suspend, since `Sleep`/`AwaitFuture`/`Gather`/`Race` are
    /// kernel-native effects a handler body is never allowed to raise.
    Defer,

    /// Schedule a sibling task running `program`.
    Spawn(Box<crate::program::Program>, SpawnRequest),
    /// Create a fresh promise/future pair.
    CreatePromise,
    /// Complete a previously-created promise with a terminal outcome.
    CompletePromise(crate::scheduler::PromiseId, Box<Result<Value, crate::error::Error>>),
    /// Suspend until the given future resolves.
    AwaitFuture(FutureHandle),
    /// Wait for every future to complete.
    Gather(Vec<FutureHandle>, GatherOptions),
    /// Wait for the first future to complete.
    Race(Vec<FutureHandle>, RaceOptions),
    /// Cancel a task (and, transitively, the children of a `Race` it lost).
    Cancel(crate::scheduler::TaskId),
    /// Suspend the current task until virtual (or wall, if a wall-clock handler is installed)
    /// time advances by `Duration`.
    Sleep(Duration),

    /// An effect a default handler interprets (`Ask`, `Tell`, `GetState`, `SetState`) — kept as a
    /// closed variant because `run`'s convenience handler bundle (§4.7) needs to recognise them,
    /// but nothing in the kernel itself does.
    Ask(String),
    Tell(Value),
    GetState(String),
    SetState(String, Value),

    /// The capability hook: any effect kind a domain package defines. `kind` is a stable,
    /// case-sensitive discriminator; `payload` is opaque to the kernel.
    Domain {
        kind: &'static str,
        payload: DomainPayload,
    },
}

impl Effect {
    pub fn domain(kind: &'static str, payload: DomainPayload) -> Self {
        Effect::Domain { kind, payload }
    }

    /// The stable, case-sensitive discriminator used in `UnhandledEffect` diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Effect::Domain { kind, .. } => kind,
            other => other.into(),
        }
    }
}
