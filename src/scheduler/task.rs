//! Task bookkeeping: what the scheduler keeps per concurrently-running `Program`.

use crate::effect::Priority;
use crate::error::Error;
use crate::program::Program;
use crate::scheduler::{FutureHandle, TaskId};
use crate::value::Value;
use crate::vm::kont::Kont;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A task-local key/value store, the backing for the default `state` handler. Isolated spawns get
/// a snapshot copy (`Task::snapshot_store`); co-task spawns share the `Rc`.
pub(crate) type Store = Rc<RefCell<HashMap<String, Value>>>;

/// Where a task's CESK machine is, between scheduler turns.
pub(crate) enum Resumption {
    Eval { control: Program, kont: Kont },
    Apply { value: Value, kont: Kont },
    Fail { error: Error, kont: Kont },
}

/// Why a task is not in the ready queue.
pub(crate) enum WaitReason {
    Future(FutureHandle),
    SleepUntil(u64),
    Gather(GatherState),
    Race(RaceState),
    /// Suspended indefinitely until some handler resumes its captured continuation out of band
    /// (the deferred-resume pattern, see `crate::vm`).
    Deferred,
}

pub(crate) struct GatherState {
    /// Original `gather` order, kept fixed so the combined result lines up with the caller's list.
    pub(crate) order: Vec<FutureHandle>,
    pub(crate) remaining: Vec<FutureHandle>,
    pub(crate) collected: HashMap<FutureHandle, Result<Value, Error>>,
    pub(crate) return_exceptions: bool,
}

pub(crate) struct RaceState {
    pub(crate) remaining: Vec<FutureHandle>,
    pub(crate) cancel_losers: bool,
}

pub(crate) enum TaskState {
    Ready(Resumption),
    Running,
    Waiting(WaitReason, Resumption),
    Cancelled,
    Finished(Result<Value, Error>),
}

pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) priority: Priority,
    pub(crate) store: Store,
    pub(crate) state: TaskState,
    /// Tasks that spawned this one with `gather`/`race` and need to be told when it finishes, even
    /// if it is not itself the direct subject of the combinator (children cancelled by a losing
    /// race still need their cancellation to propagate to their own children).
    pub(crate) children: Vec<TaskId>,
}

impl Task {
    pub(crate) fn new(id: TaskId, priority: Priority, store: Store, control: Program) -> Self {
        Task {
            id,
            priority,
            store,
            state: TaskState::Ready(Resumption::Eval {
                control,
                kont: Kont::empty(),
            }),
            children: Vec::new(),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(self.state, TaskState::Finished(_) | TaskState::Cancelled)
    }
}

pub(crate) fn snapshot_store(store: &Store) -> Store {
    Rc::new(RefCell::new(store.borrow().clone()))
}
