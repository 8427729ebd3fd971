//! The public runtime facade: `Runtime`, `run`/`run_async`/`run_bare`, and the `RunResult` they
//! return.
//!
//! Grounded on the teacher crate's `CoreVM`/`VMOptions` entry-point shape
//! (`examples/restatedev-sdk-shared-core/src/vm/mod.rs`, `src/lib.rs`): a single struct owns every
//! piece of mutable state (here: the `Scheduler`, the `ContinuationRegistry`, the default handler
//! bundle) behind one surface, configured through small `*Options` structs instead of loose
//! constructor arguments.

use crate::continuation::{Continuation, ContinuationRegistry};
use crate::default_handlers;
use crate::effect::{Effect, Priority};
use crate::error::Error;
use crate::handler::{Handler, HandlerStack};
use crate::program::{self, Program};
use crate::scheduler::task::Store;
use crate::scheduler::{IdleAction, Scheduler};
use crate::value::{Outcome, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::instrument;

/// Strictness knobs for the kernel that aren't expressed as effects. Grounded on the teacher
/// crate's `VMOptions`.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Kept for parity with the teacher's `VMOptions.fail_on_concurrent_await`. The CESK model's
    /// one-continuation-per-task discipline already rules out the scenario it guards against: a
    /// task cannot issue a second `AwaitFuture` on the same handle before the first resolves,
    /// because there is no second `Bind` to evaluate until the first one returns.
    pub fail_on_concurrent_await: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            fail_on_concurrent_await: true,
        }
    }
}

/// Scheduler-level configuration passed to `Runtime::new`.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub initial_clock: u64,
    pub default_priority: Priority,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        SchedulerOptions {
            initial_clock: 0,
            default_priority: Priority::Normal,
        }
    }
}

/// The outcome of a `run`/`run_async` call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunResult {
    pub value: Result<Value, Error>,
    pub log: Vec<Value>,
    pub warnings: Vec<String>,
    pub state: HashMap<String, Value>,
}

/// A fully configured engine: the scheduler, the continuation registry, and the default handler
/// bundle (`reader`/`writer`/`state`/`await_handler`) layered underneath whatever handlers the
/// caller installed. Build one with `Runtime::new`, optionally call `await_host_future` while
/// constructing the program to run (the returned id-carrying program is only meaningful against
/// the `Runtime` that produced it), then hand the finished program to `run` or `run_async`.
pub struct Runtime {
    scheduler: Scheduler,
    continuations: ContinuationRegistry,
    default_handlers: HandlerStack,
    log: Rc<RefCell<Vec<Value>>>,
    state: Rc<RefCell<HashMap<String, Value>>>,
    host_futures: Rc<RefCell<HashMap<u64, Pin<Box<dyn Future<Output = Result<Value, Error>>>>>>>,
    pending_resumptions: Rc<RefCell<HashMap<u64, Continuation>>>,
    next_host_future_id: Rc<Cell<u64>>,
    engine_options: EngineOptions,
}

impl Runtime {
    pub fn new(
        handlers: Vec<Handler>,
        env: HashMap<String, Value>,
        scheduler_options: &SchedulerOptions,
        engine_options: &EngineOptions,
    ) -> Self {
        let log = Rc::new(RefCell::new(Vec::new()));
        let state = Rc::new(RefCell::new(HashMap::new()));
        let pending_resumptions: Rc<RefCell<HashMap<u64, Continuation>>> = Rc::new(RefCell::new(HashMap::new()));
        let registrar = {
            let pending_resumptions = pending_resumptions.clone();
            Rc::new(move |id: u64, k: Continuation| {
                pending_resumptions.borrow_mut().insert(id, k);
            })
        };

        let mut bundle = handlers;
        bundle.push(default_handlers::reader(env));
        bundle.push(default_handlers::writer(log.clone()));
        bundle.push(default_handlers::state(state.clone()));
        bundle.push(default_handlers::await_handler(registrar));
        let default_handlers = HandlerStack::from_outermost_first(bundle);

        let mut scheduler = Scheduler::new();
        scheduler.advance_clock_to(scheduler_options.initial_clock);

        Runtime {
            scheduler,
            continuations: ContinuationRegistry::default(),
            default_handlers,
            log,
            state,
            host_futures: Rc::new(RefCell::new(HashMap::new())),
            pending_resumptions,
            next_host_future_id: Rc::new(Cell::new(0)),
            engine_options: engine_options.clone(),
        }
    }

    /// The strictness knobs this runtime was constructed with.
    pub fn engine_options(&self) -> &EngineOptions {
        &self.engine_options
    }

    /// Register `future` and return the program that bridges it through `await_handler`. The
    /// resumed value is an `Outcome` (`["ok", v]` / `["err", message]`), the same tagged shape
    /// `Try` produces, since `Effect::Resume` can only carry a value and a host future's failure
    /// has to travel to the caller somehow.
    pub fn await_host_future(&self, future: impl Future<Output = Result<Value, Error>> + 'static) -> Program {
        let id = self.next_host_future_id.get();
        self.next_host_future_id.set(id + 1);
        self.host_futures.borrow_mut().insert(id, Box::pin(future));
        let payload: Arc<u64> = Arc::new(id);
        program::from_effect(Effect::domain(default_handlers::AWAIT_HOST_FUTURE, payload))
    }

    fn into_result(self, value: Result<Value, Error>) -> RunResult {
        RunResult {
            value,
            log: Rc::try_unwrap(self.log).map(RefCell::into_inner).unwrap_or_default(),
            warnings: Vec::new(),
            state: Rc::try_unwrap(self.state).map(RefCell::into_inner).unwrap_or_default(),
        }
    }

    /// Run `program` to completion on the synchronous, virtual-clock scheduler. Blocks the
    /// calling thread until every task finishes; `Sleep` advances the virtual clock directly
    /// rather than waiting on a real timer.
    #[instrument(level = "trace", skip_all)]
    pub fn run(mut self, program: Program) -> RunResult {
        self.scheduler.spawn_root(program);
        let value = self
            .drive_virtual()
            .unwrap_or_else(|| Err(Error::domain("run: every task is blocked with nothing left to advance")));
        self.into_result(value)
    }

    /// Run `program` cooperatively on the host's async executor: yields (`Poll::Pending`) at
    /// every suspension point instead of blocking the calling thread.
    pub fn run_async(mut self, program: Program) -> RunAsync {
        self.scheduler.spawn_root(program);
        RunAsync {
            runtime: Some(self),
            wall_clock: None,
        }
    }

    fn drive_virtual(&mut self) -> Option<Result<Value, Error>> {
        self.scheduler
            .drive_until_root_finished(&mut self.continuations, &self.default_handlers, idle_action)
    }

    fn drive_to_idle(&mut self) -> Option<Result<Value, Error>> {
        self.scheduler
            .drive_until_root_finished(&mut self.continuations, &self.default_handlers, |_| IdleAction::Stuck)
    }

    /// Poll every registered host future once against `cx`, spawning a resumption task for each
    /// that completes. Returns whether any did (a hint the caller should drive the scheduler
    /// again before reporting `Poll::Pending`).
    fn poll_host_futures(&mut self, cx: &mut Context<'_>) -> bool {
        let ids: Vec<u64> = self.host_futures.borrow().keys().copied().collect();
        let mut any_ready = false;
        for id in ids {
            let mut future = match self.host_futures.borrow_mut().remove(&id) {
                Some(f) => f,
                None => continue,
            };
            match future.as_mut().poll(cx) {
                Poll::Ready(result) => {
                    any_ready = true;
                    if let Some(k) = self.pending_resumptions.borrow_mut().remove(&id) {
                        let outcome_value = match result {
                            Ok(v) => Outcome::Ok(Box::new(v)).into_value(),
                            Err(e) => Outcome::Err(e).into_value(),
                        };
                        self.scheduler.spawn(
                            program::from_effect(Effect::Resume(k, Box::new(outcome_value))),
                            Priority::Normal,
                            None,
                            Store::default(),
                        );
                    }
                }
                Poll::Pending => {
                    self.host_futures.borrow_mut().insert(id, future);
                }
            }
        }
        any_ready
    }
}

fn idle_action(scheduler: &mut Scheduler) -> IdleAction {
    if scheduler.wake_due_sleepers() {
        return IdleAction::Advanced;
    }
    match scheduler.earliest_sleeper_tick() {
        Some(tick) => {
            scheduler.advance_clock_to(tick);
            IdleAction::Advanced
        }
        None => IdleAction::Stuck,
    }
}

/// Run `program` to completion with `handlers` installed above the default bundle
/// (`reader`/`writer`/`state`/`await_handler`) and `env` backing `reader`. Shorthand for
/// `Runtime::new(handlers, env, &Default::default(), &Default::default()).run(program)`; use
/// `Runtime` directly when the program needs `await_host_future` or non-default engine options.
pub fn run(program: Program, handlers: Vec<Handler>, env: HashMap<String, Value>) -> RunResult {
    Runtime::new(handlers, env, &SchedulerOptions::default(), &EngineOptions::default()).run(program)
}

/// Like `run`, cooperating with the host's async executor instead of blocking the calling thread.
pub fn run_async(program: Program, handlers: Vec<Handler>, env: HashMap<String, Value>) -> RunAsync {
    Runtime::new(handlers, env, &SchedulerOptions::default(), &EngineOptions::default()).run_async(program)
}

/// Run `program` with only the kernel-native effects served — no `reader`/`writer`/`state`/
/// `await_handler` bundle. `Ask`/`Tell`/`GetState`/`SetState` surface as `UnhandledEffect` instead
/// of being silently served, which is the point: tests that want to assert that error don't have
/// to fight the convenience bundle to get it.
pub fn run_bare(program: Program) -> RunResult {
    let mut scheduler = Scheduler::new();
    let mut continuations = ContinuationRegistry::default();
    let default_handlers = HandlerStack::empty();
    scheduler.spawn_root(program);
    let value = scheduler
        .drive_until_root_finished(&mut continuations, &default_handlers, idle_action)
        .unwrap_or_else(|| Err(Error::domain("run_bare: every task is blocked with nothing left to advance")));
    RunResult {
        value,
        log: Vec::new(),
        warnings: Vec::new(),
        state: HashMap::new(),
    }
}

/// A `Runtime::run_async` call in progress. Implements `std::future::Future` by hand — the same
/// "no async runtime dependency, drive it yourself" posture as the rest of this crate's
/// cooperative scheduler.
pub struct RunAsync {
    runtime: Option<Runtime>,
    wall_clock: Option<Rc<dyn Fn() -> u64>>,
}

impl RunAsync {
    /// Install a wall-clock source (ticks, e.g. milliseconds since an arbitrary epoch) consulted
    /// on every poll to catch the virtual clock up to real time and wake due sleepers. Without
    /// one, `Sleep` only resolves once something else (a host future, another task) causes this
    /// future to be polled again after the wake tick has passed — `run_async` does not own a
    /// timer of its own.
    pub fn with_wall_clock(mut self, source: impl Fn() -> u64 + 'static) -> Self {
        self.wall_clock = Some(Rc::new(source));
        self
    }
}

impl Future for RunAsync {
    type Output = RunResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let wall_clock = self.wall_clock.clone();
        let runtime = self.runtime.as_mut().expect("RunAsync polled after completion");

        if let Some(source) = &wall_clock {
            runtime.scheduler.advance_clock_to(source());
            runtime.scheduler.wake_due_sleepers();
        }

        loop {
            if let Some(value) = runtime.drive_to_idle() {
                let runtime = self.runtime.take().expect("runtime present");
                return Poll::Ready(runtime.into_result(value));
            }
            if !runtime.poll_host_futures(cx) {
                return Poll::Pending;
            }
        }
    }
}
