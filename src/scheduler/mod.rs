//! The cooperative scheduler: a single-OS-thread, priority-ordered run loop over `Task`s.
//!
//! Grounded on the teacher crate's single-threaded `CoreVM::do_transition` dispatch loop
//! (`examples/restatedev-sdk-shared-core/src/vm/mod.rs`) generalised from "one state machine" to
//! "many cooperatively-scheduled state machines" — same idea of popping one unit of work, driving
//! it until it can't make progress without external input, and looping.

mod ids;
pub(crate) mod promise;
pub(crate) mod task;

pub use ids::{FutureHandle, PromiseId, TaskId};

use crate::continuation::ContinuationRegistry;
use crate::effect::Priority;
use crate::error::Error;
use crate::handler::HandlerStack;
use crate::program::Program;
use crate::value::Value;
use promise::{Promise, PromiseState};
use std::collections::{BinaryHeap, HashMap};
use task::{GatherState, RaceState, Resumption, Store, Task, TaskState, WaitReason};

/// A sleeper, ordered by wake tick (min-heap via `Reverse`).
struct Sleeper {
    wake_at: u64,
    task: TaskId,
}

impl PartialEq for Sleeper {
    fn eq(&self, other: &Self) -> bool {
        self.wake_at == other.wake_at
    }
}
impl Eq for Sleeper {}
impl PartialOrd for Sleeper {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Sleeper {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse so `BinaryHeap` (a max-heap) pops the earliest wake tick first.
        other.wake_at.cmp(&self.wake_at)
    }
}

pub(crate) struct Scheduler {
    tasks: HashMap<TaskId, Task>,
    promises: HashMap<PromiseId, Promise>,
    /// `FutureHandle`s backed by a task's own completion share numeric space with `TaskId`;
    /// `FutureHandle`s created via `CreatePromise` share it with `PromiseId`. This records which.
    future_sources: HashMap<FutureHandle, FutureSource>,
    /// Tasks parked on a given handle, in registration order — what `collect_waiters_on` hands
    /// back, so wake order is priority-then-FIFO rather than a `tasks` hash-iteration artifact.
    waiters: HashMap<FutureHandle, Vec<TaskId>>,
    ready: [Vec<TaskId>; 5],
    sleepers: BinaryHeap<Sleeper>,
    next_task_id: u64,
    next_promise_id: u64,
    now: u64,
    root: Option<TaskId>,
}

#[derive(Clone, Copy)]
enum FutureSource {
    Task(TaskId),
    Promise(PromiseId),
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Scheduler {
            tasks: HashMap::new(),
            promises: HashMap::new(),
            future_sources: HashMap::new(),
            waiters: HashMap::new(),
            ready: Default::default(),
            sleepers: BinaryHeap::new(),
            next_task_id: 0,
            next_promise_id: 0,
            now: 0,
            root: None,
        }
    }

    pub(crate) fn now(&self) -> u64 {
        self.now
    }

    /// Advance the virtual clock directly (used by `run`'s synchronous virtual-clock mode).
    pub(crate) fn advance_clock_to(&mut self, tick: u64) {
        if tick > self.now {
            self.now = tick;
        }
    }

    pub(crate) fn spawn_root(&mut self, program: Program) -> TaskId {
        let id = self.spawn(program, Priority::Normal, None, Store::default());
        self.root = Some(id);
        id
    }

    pub(crate) fn task_store(&self, task_id: TaskId) -> Store {
        self.tasks
            .get(&task_id)
            .map(|t| t.store.clone())
            .unwrap_or_default()
    }

    /// Take the `Resumption` out of a task currently `Ready`, marking it `Running` while its step
    /// executes. Panics if the task isn't `Ready` — callers only invoke this right after popping
    /// the task from the ready queue.
    pub(crate) fn take_ready_resumption(&mut self, task_id: TaskId) -> Resumption {
        let task = self.tasks.get_mut(&task_id).expect("ready task must exist");
        match std::mem::replace(&mut task.state, TaskState::Running) {
            TaskState::Ready(resumption) => resumption,
            other => {
                task.state = other;
                panic!("task {task_id:?} popped from ready queue but was not Ready")
            }
        }
    }

    pub(crate) fn spawn(
        &mut self,
        program: Program,
        priority: Priority,
        parent: Option<TaskId>,
        store: Store,
    ) -> TaskId {
        let id = TaskId::next(&mut self.next_task_id);
        let task = Task::new(id, priority, store, program);
        self.tasks.insert(id, task);
        self.future_sources
            .insert(FutureHandle(id.0), FutureSource::Task(id));
        self.enqueue_ready(id);
        if let Some(parent_id) = parent {
            if let Some(parent_task) = self.tasks.get_mut(&parent_id) {
                parent_task.children.push(id);
            }
        }
        id
    }

    fn enqueue_ready(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get(&id) {
            self.ready[task.priority as usize].push(id);
        }
    }

    /// Pop the next ready task, highest priority first, FIFO within a level.
    fn pop_ready(&mut self) -> Option<TaskId> {
        for level in (0..self.ready.len()).rev() {
            if !self.ready[level].is_empty() {
                return Some(self.ready[level].remove(0));
            }
        }
        None
    }

    fn has_ready(&self) -> bool {
        self.ready.iter().any(|q| !q.is_empty())
    }

    pub(crate) fn create_promise(&mut self) -> (PromiseId, FutureHandle) {
        let id = PromiseId::next(&mut self.next_promise_id);
        self.promises.insert(id, Promise::pending());
        let handle = FutureHandle(u64::MAX / 2 + id.0);
        self.future_sources.insert(handle, FutureSource::Promise(id));
        (id, handle)
    }

    pub(crate) fn complete_promise(&mut self, id: PromiseId, result: Result<Value, Error>) -> Result<(), Error> {
        let p = self
            .promises
            .get_mut(&id)
            .ok_or_else(|| Error::domain("complete_promise: unknown promise id"))?;
        match &p.state {
            PromiseState::Completed(_) => return Err(Error::PromiseAlreadyCompleted),
            PromiseState::Pending => {}
        }
        p.state = PromiseState::Completed(result.clone());
        let handle = FutureHandle(u64::MAX / 2 + id.0);
        for waiter in self.collect_waiters_on(handle) {
            self.wake_future(handle, result.clone(), waiter);
        }
        Ok(())
    }

    /// Mark `task`'s task-level wait on `handle` resolved with `result`, re-enqueueing it (or
    /// progressing its pending combinator) as appropriate.
    fn wake_future(&mut self, handle: FutureHandle, result: Result<Value, Error>, task_id: TaskId) {
        let task = match self.tasks.get_mut(&task_id) {
            Some(t) => t,
            None => return,
        };
        let (reason, resumption) = match std::mem::replace(&mut task.state, TaskState::Running) {
            TaskState::Waiting(reason, resumption) => (reason, resumption),
            other => {
                task.state = other;
                return;
            }
        };
        match reason {
            WaitReason::Future(expected) if expected == handle => {
                let resumption = apply_outcome(resumption, result);
                task.state = TaskState::Ready(resumption);
                self.enqueue_ready(task_id);
            }
            WaitReason::Gather(mut gather) => {
                let failed = result.is_err() && !gather.return_exceptions;
                gather.collected.insert(handle, result);
                gather.remaining.retain(|h| *h != handle);
                if failed {
                    for other in gather.remaining.clone() {
                        self.cancel_by_future(other);
                    }
                    let err = match gather.collected.remove(&handle) {
                        Some(Err(e)) => e,
                        _ => Error::domain("gather: constituent future failed"),
                    };
                    let resumption = apply_outcome(resumption, Err(err));
                    self.tasks.get_mut(&task_id).unwrap().state = TaskState::Ready(resumption);
                    self.enqueue_ready(task_id);
                } else if gather.remaining.is_empty() {
                    let value = finish_gather(gather);
                    let resumption = apply_outcome(resumption, Ok(value));
                    self.tasks.get_mut(&task_id).unwrap().state = TaskState::Ready(resumption);
                    self.enqueue_ready(task_id);
                } else {
                    self.tasks.get_mut(&task_id).unwrap().state =
                        TaskState::Waiting(WaitReason::Gather(gather), resumption);
                }
            }
            WaitReason::Race(mut race) => {
                if race.remaining.contains(&handle) {
                    if race.cancel_losers {
                        for other in race.remaining.iter().filter(|h| **h != handle) {
                            self.cancel_by_future(*other);
                        }
                    }
                    let resumption = apply_outcome(resumption, result);
                    self.tasks.get_mut(&task_id).unwrap().state = TaskState::Ready(resumption);
                    self.enqueue_ready(task_id);
                } else {
                    self.tasks.get_mut(&task_id).unwrap().state =
                        TaskState::Waiting(WaitReason::Race(race), resumption);
                }
            }
            other => {
                self.tasks.get_mut(&task_id).unwrap().state = TaskState::Waiting(other, resumption);
            }
        }
    }

    fn cancel_by_future(&mut self, handle: FutureHandle) {
        if let Some(FutureSource::Task(task_id)) = self.future_sources.get(&handle).copied() {
            self.cancel_task(task_id);
        }
    }

    pub(crate) fn cancel_task(&mut self, task_id: TaskId) {
        let children = match self.tasks.get_mut(&task_id) {
            Some(task) if !task.is_finished() => {
                task.state = TaskState::Cancelled;
                task.children.clone()
            }
            _ => return,
        };
        self.ready.iter_mut().for_each(|q| q.retain(|id| *id != task_id));
        for child in children {
            self.cancel_task(child);
        }
        self.finish_task(task_id, Err(Error::Cancelled));
    }

    pub(crate) fn finish_task(&mut self, task_id: TaskId, result: Result<Value, Error>) {
        let handle = FutureHandle(task_id.0);
        let waiters = self.collect_waiters_on(handle);
        if let Some(task) = self.tasks.get_mut(&task_id) {
            if !matches!(task.state, TaskState::Cancelled) {
                task.state = TaskState::Finished(result.clone());
            }
        }
        for waiter in waiters {
            self.wake_future(handle, result.clone(), waiter);
        }
    }

    /// Record that `task_id` is now parked on `handle`, in the order this is called — `handle`
    /// resolves at most once, so this entry is taken (not merely read) the one time that happens.
    fn register_waiter(&mut self, handle: FutureHandle, task_id: TaskId) {
        self.waiters.entry(handle).or_default().push(task_id);
    }

    fn collect_waiters_on(&mut self, handle: FutureHandle) -> Vec<TaskId> {
        self.waiters.remove(&handle).unwrap_or_default()
    }

    pub(crate) fn sleep(&mut self, task_id: TaskId, wake_at: u64, resumption: Resumption) {
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.state = TaskState::Waiting(WaitReason::SleepUntil(wake_at), resumption);
        }
        self.sleepers.push(Sleeper { wake_at, task: task_id });
    }

    pub(crate) fn await_future(&mut self, task_id: TaskId, handle: FutureHandle, resumption: Resumption) {
        if let Some(result) = self.try_read_future(handle) {
            let resumption = apply_outcome(resumption, result);
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.state = TaskState::Ready(resumption);
            }
            self.enqueue_ready(task_id);
        } else {
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.state = TaskState::Waiting(WaitReason::Future(handle), resumption);
            }
            self.register_waiter(handle, task_id);
        }
    }

    pub(crate) fn gather(
        &mut self,
        task_id: TaskId,
        handles: Vec<FutureHandle>,
        return_exceptions: bool,
        resumption: Resumption,
    ) {
        let order = handles.clone();
        let mut collected = HashMap::new();
        let mut remaining = Vec::new();
        let mut early_failure = None;
        for h in handles {
            match self.try_read_future(h) {
                Some(Err(e)) if !return_exceptions => {
                    early_failure = Some(e);
                    break;
                }
                Some(result) => {
                    collected.insert(h, result);
                }
                None => remaining.push(h),
            }
        }
        if let Some(err) = early_failure {
            for h in remaining {
                self.cancel_by_future(h);
            }
            let resumption = apply_outcome(resumption, Err(err));
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.state = TaskState::Ready(resumption);
            }
            self.enqueue_ready(task_id);
        } else if remaining.is_empty() {
            let value = finish_gather(GatherState {
                order,
                remaining,
                collected,
                return_exceptions,
            });
            let resumption = apply_outcome(resumption, Ok(value));
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.state = TaskState::Ready(resumption);
            }
            self.enqueue_ready(task_id);
        } else {
            for h in &remaining {
                self.register_waiter(*h, task_id);
            }
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.state = TaskState::Waiting(
                    WaitReason::Gather(GatherState {
                        order,
                        remaining,
                        collected,
                        return_exceptions,
                    }),
                    resumption,
                );
            }
        }
    }

    pub(crate) fn race(
        &mut self,
        task_id: TaskId,
        handles: Vec<FutureHandle>,
        cancel_losers: bool,
        resumption: Resumption,
    ) {
        for h in &handles {
            if let Some(result) = self.try_read_future(*h) {
                if cancel_losers {
                    for other in handles.iter().filter(|x| *x != h) {
                        self.cancel_by_future(*other);
                    }
                }
                let resumption = apply_outcome(resumption, result);
                if let Some(task) = self.tasks.get_mut(&task_id) {
                    task.state = TaskState::Ready(resumption);
                }
                self.enqueue_ready(task_id);
                return;
            }
        }
        for h in &handles {
            self.register_waiter(*h, task_id);
        }
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.state = TaskState::Waiting(
                WaitReason::Race(RaceState {
                    remaining: handles,
                    cancel_losers,
                }),
                resumption,
            );
        }
    }

    pub(crate) fn defer(&mut self, task_id: TaskId, resumption: Resumption) {
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.state = TaskState::Waiting(WaitReason::Deferred, resumption);
        }
    }

    fn try_read_future(&self, handle: FutureHandle) -> Option<Result<Value, Error>> {
        match self.future_sources.get(&handle)? {
            FutureSource::Task(id) => match &self.tasks.get(id)?.state {
                TaskState::Finished(r) => Some(r.clone()),
                TaskState::Cancelled => Some(Err(Error::Cancelled)),
                _ => None,
            },
            FutureSource::Promise(id) => match &self.promises.get(id)?.state {
                PromiseState::Completed(r) => Some(r.clone()),
                PromiseState::Pending => None,
            },
        }
    }

    /// Step the whole machine until no task can make progress without either an already-queued
    /// wakeup or (in the synchronous case) a virtual-clock advance. Returns the root task's
    /// result, or a suspension reason if the root is itself blocked on something this scheduler
    /// cannot resolve internally (e.g. a wall-clock sleep under `run_async`).
    pub(crate) fn drive_until_root_finished<F>(
        &mut self,
        continuations: &mut ContinuationRegistry,
        default_handlers: &HandlerStack,
        mut on_idle: F,
    ) -> Option<Result<Value, Error>>
    where
        F: FnMut(&mut Scheduler) -> IdleAction,
    {
        loop {
            while let Some(task_id) = self.pop_ready() {
                crate::vm::drive_task(self, continuations, default_handlers, task_id);
                if let Some(root) = self.root {
                    if let Some(task) = self.tasks.get(&root) {
                        if let TaskState::Finished(r) = &task.state {
                            return Some(r.clone());
                        }
                        if matches!(task.state, TaskState::Cancelled) {
                            return Some(Err(Error::Cancelled));
                        }
                    }
                }
            }
            if self.has_ready() {
                continue;
            }
            match on_idle(self) {
                IdleAction::Advanced => continue,
                IdleAction::Stuck => return None,
            }
        }
    }

    /// Pop the earliest sleeper (if its wake tick has arrived) and make its task ready again.
    pub(crate) fn wake_due_sleepers(&mut self) -> bool {
        let mut woke_any = false;
        while let Some(top) = self.sleepers.peek() {
            if top.wake_at > self.now {
                break;
            }
            let Sleeper { task: task_id, .. } = self.sleepers.pop().unwrap();
            if let Some(task) = self.tasks.get_mut(&task_id) {
                if let TaskState::Waiting(WaitReason::SleepUntil(_), resumption) =
                    std::mem::replace(&mut task.state, TaskState::Running)
                {
                    task.state = TaskState::Ready(apply_outcome(resumption, Ok(Value::Unit)));
                    self.enqueue_ready(task_id);
                    woke_any = true;
                }
            }
        }
        woke_any
    }

    pub(crate) fn earliest_sleeper_tick(&self) -> Option<u64> {
        self.sleepers.peek().map(|s| s.wake_at)
    }
}

pub(crate) enum IdleAction {
    Advanced,
    Stuck,
}

fn apply_outcome(resumption: Resumption, result: Result<Value, Error>) -> Resumption {
    match resumption {
        Resumption::Eval { kont, .. } | Resumption::Apply { kont, .. } | Resumption::Fail { kont, .. } => {
            match result {
                Ok(value) => Resumption::Apply { value, kont },
                Err(error) => Resumption::Fail { error, kont },
            }
        }
    }
}

fn finish_gather(mut gather: GatherState) -> Value {
    let ordered: Vec<Result<Value, Error>> = gather
        .order
        .iter()
        .filter_map(|h| gather.collected.remove(h))
        .collect();
    if gather.return_exceptions {
        Value::List(
            ordered
                .into_iter()
                .map(|r| match r {
                    Ok(v) => Value::List(vec![Value::from("ok"), v]),
                    Err(e) => Value::List(vec![Value::from("err"), Value::from(e.to_string())]),
                })
                .collect(),
        )
    } else {
        Value::List(
            ordered
                .into_iter()
                .map(|r| r.unwrap_or(Value::Unit))
                .collect(),
        )
    }
}
