//! The kernel: a CESK machine that evaluates one [`crate::program::Program`] at a time, trampolined
//! so arbitrarily long `Bind` chains never grow the native call stack.
//!
//! Grounded on the teacher crate's `do_transition` dispatch loop
//! (`examples/restatedev-sdk-shared-core/src/vm/mod.rs` and `src/vm/transitions/mod.rs`): pop one
//! frame, apply one transition, loop — generalised from "apply a wire-protocol transition" to
//! "apply a CESK transition", and from a single `State` enum to the `Ctrl`/`Kont` split a real
//! interpreter needs.

pub(crate) mod dispatch;
pub(crate) mod kont;

use crate::continuation::ContinuationRegistry;
use crate::coroutine::RoutineStep;
use crate::effect::Effect;
use crate::error::Error;
use crate::handler::HandlerStack;
use crate::program::Program;
use crate::scheduler::task::{snapshot_store, Resumption};
use crate::scheduler::{Scheduler, TaskId};
use crate::value::{Outcome, Value};
use dispatch::DispatchResult;
use kont::{Frame, Kont};
use std::ops::ControlFlow;
use std::rc::Rc;
use tracing::instrument;

/// What the machine is doing right now, independent of the pending frames.
pub(crate) enum Ctrl {
    Eval(Program),
    Apply(Value),
    Fail(Error),
}

/// What a `run()` invocation concluded with.
pub(crate) enum StepOutcome {
    /// The local `kont` emptied out: either the whole task is done (top-level call) or a handler
    /// body fell through without resuming (nested call, `in_dispatch == true`).
    Finished(Result<Value, Error>),
    /// The evaluated program issued `Effect::Resume`, handed back to whichever call evaluated it.
    Resumed { value: Value, kont: Kont },
    /// The evaluated program issued `Effect::Delegate`. Only produced when `in_dispatch`.
    Delegate,
    /// The evaluated program issued `Effect::Pass`. Only produced when `in_dispatch`.
    Pass,
    /// The evaluated program issued `Effect::Defer`. Only produced when `in_dispatch`.
    Deferred,
    /// A kernel-native suspending effect (`Sleep`/`AwaitFuture`/`Gather`/`Race`) parked the task;
    /// the caller's loop ends here.
    Yielded,
}

/// Drive `control`/`kont` forward. `task_id` is whichever task's execution this belongs to
/// (needed for `Spawn`'s parent link and the suspending kernel-native effects). `active_handlers`
/// overrides the dynamically-computed-from-`kont` candidate list — `Some` for handler-body
/// evaluation (see `dispatch::dispatch`) or after `SetHandlers`, `None` to derive it fresh from
/// `kont` each time. `in_dispatch` is true exactly when this call is evaluating a handler body;
/// it gates which effects are legal (`Resume`/`Delegate`/`Pass` only inside, suspending effects
/// only outside).
#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    scheduler: &mut Scheduler,
    continuations: &mut ContinuationRegistry,
    default_handlers: &HandlerStack,
    task_id: TaskId,
    control: Ctrl,
    kont: Kont,
    mut active_handlers: Option<HandlerStack>,
    in_dispatch: bool,
) -> Result<StepOutcome, Error> {
    let mut control = control;
    let mut kont = kont;
    let suspend_allowed = !in_dispatch;

    loop {
        control = match control {
            Ctrl::Eval(program) => match program {
                Program::Pure(v) => Ctrl::Apply(v),
                Program::Raise(e) => Ctrl::Fail(e),
                Program::Bind(p, k) => {
                    kont = kont.push(Frame::Bind(k));
                    Ctrl::Eval(unwrap_rc(p))
                }
                Program::Intercept(p, t) => {
                    kont = kont.push(Frame::Intercept(t));
                    Ctrl::Eval(unwrap_rc(p))
                }
                Program::WithHandler(h, p) => {
                    kont = kont.push(Frame::Handler(h));
                    Ctrl::Eval(unwrap_rc(p))
                }
                Program::Try(p) => {
                    kont = kont.push(Frame::Try);
                    Ctrl::Eval(unwrap_rc(p))
                }
                Program::Recover(p, f) => {
                    kont = kont.push(Frame::Recover(f));
                    Ctrl::Eval(unwrap_rc(p))
                }
                Program::FromRoutine(factory) => {
                    let mut routine = factory();
                    match routine.send(Value::Unit) {
                        RoutineStep::Yield(effect) => {
                            kont = kont.push(Frame::Routine(Rc::new(std::cell::RefCell::new(routine))));
                            Ctrl::Eval(Program::Effect(effect))
                        }
                        RoutineStep::Done(v) => Ctrl::Apply(v),
                        RoutineStep::Failed(e) => Ctrl::Fail(e),
                    }
                }
                Program::Effect(effect) => match step_effect(
                    scheduler,
                    continuations,
                    default_handlers,
                    task_id,
                    &mut kont,
                    &mut active_handlers,
                    suspend_allowed,
                    in_dispatch,
                    effect,
                )? {
                    ControlFlow::Continue(next) => next,
                    ControlFlow::Break(outcome) => return Ok(outcome),
                },
            },
            Ctrl::Apply(value) => match kont.pop() {
                None => return Ok(StepOutcome::Finished(Ok(value))),
                Some((Frame::Bind(k), tail)) => {
                    let k = k.clone();
                    kont = tail;
                    Ctrl::Eval(k(value))
                }
                Some((Frame::Handler(_), tail)) | Some((Frame::Intercept(_), tail)) => {
                    kont = tail;
                    Ctrl::Apply(value)
                }
                Some((Frame::Try, tail)) => {
                    kont = tail;
                    Ctrl::Apply(Outcome::Ok(Box::new(value)).into_value())
                }
                Some((Frame::Recover(_), tail)) => {
                    kont = tail;
                    Ctrl::Apply(value)
                }
                Some((Frame::Routine(routine), tail)) => {
                    let step = routine.borrow_mut().send(value);
                    match step {
                        RoutineStep::Yield(effect) => {
                            kont = tail.push(Frame::Routine(routine.clone()));
                            Ctrl::Eval(Program::Effect(effect))
                        }
                        RoutineStep::Done(v) => {
                            kont = tail;
                            Ctrl::Apply(v)
                        }
                        RoutineStep::Failed(e) => {
                            kont = tail;
                            Ctrl::Fail(e)
                        }
                    }
                }
            },
            Ctrl::Fail(error) => match kont.pop() {
                None => return Ok(StepOutcome::Finished(Err(error))),
                Some((Frame::Try, tail)) => {
                    kont = tail;
                    Ctrl::Apply(Outcome::Err(error).into_value())
                }
                Some((Frame::Recover(f), tail)) => {
                    let f = f.clone();
                    kont = tail;
                    Ctrl::Eval(f(error))
                }
                Some((Frame::Routine(routine), tail)) => {
                    let step = routine.borrow_mut().throw(error);
                    match step {
                        RoutineStep::Yield(effect) => {
                            kont = tail.push(Frame::Routine(routine.clone()));
                            Ctrl::Eval(Program::Effect(effect))
                        }
                        RoutineStep::Done(v) => {
                            kont = tail;
                            Ctrl::Apply(v)
                        }
                        RoutineStep::Failed(e) => {
                            kont = tail;
                            Ctrl::Fail(e)
                        }
                    }
                }
                Some((Frame::Bind(_), tail)) | Some((Frame::Handler(_), tail)) | Some((Frame::Intercept(_), tail)) => {
                    kont = tail;
                    Ctrl::Fail(error)
                }
            },
        };
    }
}

fn unwrap_rc(p: Rc<Program>) -> Program {
    Rc::try_unwrap(p).unwrap_or_else(|rc| (*rc).clone())
}

/// The handlers visible right now: an explicit `SetHandlers`/handler-body override if present,
/// otherwise whatever `with_handler` scopes enclose this point in `kont`, with the default bundle
/// underneath.
fn effective_handlers(kont: &Kont, active_handlers: &Option<HandlerStack>, default_handlers: &HandlerStack) -> HandlerStack {
    match active_handlers {
        Some(stack) => stack.clone(),
        None => kont.visible_handlers().chain(default_handlers),
    }
}

/// Evaluate a single `Program::Effect`. `Continue` carries the next `Ctrl` for `run`'s loop;
/// `Break` carries the `StepOutcome` `run` should return immediately.
#[allow(clippy::too_many_arguments)]
#[instrument(level = "trace", skip_all, fields(kind = effect.kind_name()))]
fn step_effect(
    scheduler: &mut Scheduler,
    continuations: &mut ContinuationRegistry,
    default_handlers: &HandlerStack,
    task_id: TaskId,
    kont: &mut Kont,
    active_handlers: &mut Option<HandlerStack>,
    suspend_allowed: bool,
    in_dispatch: bool,
    effect: Effect,
) -> Result<ControlFlow<StepOutcome, Ctrl>, Error> {
    use ControlFlow::{Break, Continue};

    match effect {
        // --- handler-protocol meta-effects, special-cased rather than dispatched ------------
        Effect::Resume(continuation, value) => {
            continuations.consume(&continuation)?;
            Ok(Break(StepOutcome::Resumed {
                value: *value,
                kont: continuation.kont,
            }))
        }
        Effect::Delegate => {
            if !in_dispatch {
                return Err(Error::handler_returned_invalid_program(
                    "Delegate issued outside a handler body",
                ));
            }
            Ok(Break(StepOutcome::Delegate))
        }
        Effect::Pass => {
            if !in_dispatch {
                return Err(Error::handler_returned_invalid_program(
                    "Pass issued outside a handler body",
                ));
            }
            Ok(Break(StepOutcome::Pass))
        }
        Effect::Defer => {
            if !in_dispatch {
                return Err(Error::handler_returned_invalid_program(
                    "Defer issued outside a handler body",
                ));
            }
            Ok(Break(StepOutcome::Deferred))
        }
        Effect::SetHandlers(stack) => {
            *active_handlers = Some(stack);
            Ok(Continue(Ctrl::Apply(Value::Unit)))
        }
        Effect::GetHandlers => Ok(Continue(Ctrl::Apply(Value::Handlers(effective_handlers(
            kont,
            active_handlers,
            default_handlers,
        ))))),

        // --- kernel-native concurrency effects, served directly from `scheduler` ------------
        Effect::Spawn(program, request) => {
            let parent_store = scheduler.task_store(task_id);
            let store = if request.isolated {
                snapshot_store(&parent_store)
            } else {
                parent_store
            };
            let child = scheduler.spawn(*program, request.priority, Some(task_id), store);
            Ok(Continue(Ctrl::Apply(Value::TaskId(child))))
        }
        Effect::CreatePromise => {
            let (id, handle) = scheduler.create_promise();
            Ok(Continue(Ctrl::Apply(Value::Promise(id, handle))))
        }
        Effect::CompletePromise(id, result) => {
            scheduler.complete_promise(id, *result)?;
            Ok(Continue(Ctrl::Apply(Value::Unit)))
        }
        Effect::Cancel(victim) => {
            scheduler.cancel_task(victim);
            Ok(Continue(Ctrl::Apply(Value::Unit)))
        }
        Effect::AwaitFuture(handle) => {
            if !suspend_allowed {
                return Err(Error::domain("a handler body cannot await a future"));
            }
            scheduler.await_future(task_id, handle, parked_resumption(kont));
            Ok(Break(StepOutcome::Yielded))
        }
        Effect::Sleep(duration) => {
            if !suspend_allowed {
                return Err(Error::domain("a handler body cannot sleep"));
            }
            let wake_at = scheduler.now() + duration.as_millis() as u64;
            scheduler.sleep(task_id, wake_at, parked_resumption(kont));
            Ok(Break(StepOutcome::Yielded))
        }
        Effect::Gather(handles, options) => {
            if !suspend_allowed {
                return Err(Error::domain("a handler body cannot gather futures"));
            }
            scheduler.gather(task_id, handles, options.return_exceptions, parked_resumption(kont));
            Ok(Break(StepOutcome::Yielded))
        }
        Effect::Race(handles, options) => {
            if !suspend_allowed {
                return Err(Error::domain("a handler body cannot race futures"));
            }
            scheduler.race(task_id, handles, options.cancel_losers, parked_resumption(kont));
            Ok(Break(StepOutcome::Yielded))
        }

        // --- everything else goes through ordinary dispatch ---------------------------------
        other => {
            let transformed = kont
                .intercept_transforms()
                .into_iter()
                .fold(other, |e, transform| transform(e));
            let candidates = effective_handlers(kont, active_handlers, default_handlers);
            let snapshot = kont.clone();
            match dispatch::dispatch(
                scheduler,
                continuations,
                default_handlers,
                task_id,
                transformed,
                &snapshot,
                &candidates,
                0,
            )? {
                DispatchResult::Applied { value, kont: new_kont } => {
                    *kont = new_kont;
                    Ok(Continue(Ctrl::Apply(value)))
                }
                DispatchResult::Deferred => {
                    if suspend_allowed {
                        scheduler.defer(task_id, parked_resumption(kont));
                        Ok(Break(StepOutcome::Yielded))
                    } else {
                        // A nested handler explicitly deferred; bubble the same signal out to the
                        // dispatch() call evaluating the enclosing handler body rather than treating
                        // it as if that handler body had itself returned a value.
                        Ok(Break(StepOutcome::Deferred))
                    }
                }
            }
        }
    }
}

/// Build a placeholder `Resumption` carrying `kont`, for scheduler calls that only need the
/// continuation (the value/error is supplied later, when the wait actually resolves).
fn parked_resumption(kont: &Kont) -> Resumption {
    Resumption::Apply {
        value: Value::Unit,
        kont: kont.clone(),
    }
}

/// Pop a task's resumption and drive it until it finishes, yields, or errors. Called by
/// `Scheduler::drive_until_root_finished` for every task popped off the ready queue.
///
/// Loops on `StepOutcome::Resumed`: `Effect::Resume` always terminates the `run()` call that
/// evaluated it (see module docs), even when that call is this function's own top-level one, so
/// driving a task to completion after a self-resume means re-entering `run()` with the resumed
/// `(value, kont)` pair rather than treating `Resumed` as a final answer.
pub(crate) fn drive_task(
    scheduler: &mut Scheduler,
    continuations: &mut ContinuationRegistry,
    default_handlers: &HandlerStack,
    task_id: TaskId,
) {
    let resumption = scheduler.take_ready_resumption(task_id);
    let (mut control, mut kont) = match resumption {
        Resumption::Eval { control, kont } => (Ctrl::Eval(control), kont),
        Resumption::Apply { value, kont } => (Ctrl::Apply(value), kont),
        Resumption::Fail { error, kont } => (Ctrl::Fail(error), kont),
    };

    loop {
        let outcome = run(scheduler, continuations, default_handlers, task_id, control, kont, None, false);
        match outcome {
            Ok(StepOutcome::Finished(result)) => {
                scheduler.finish_task(task_id, result);
                return;
            }
            Ok(StepOutcome::Resumed { value, kont: resumed_kont }) => {
                control = Ctrl::Apply(value);
                kont = resumed_kont;
            }
            Ok(StepOutcome::Yielded) => return,
            Ok(StepOutcome::Delegate) | Ok(StepOutcome::Pass) => {
                scheduler.finish_task(
                    task_id,
                    Err(Error::handler_returned_invalid_program(
                        "Delegate/Pass escaped to the top level",
                    )),
                );
                return;
            }
            Ok(StepOutcome::Deferred) => {
                // `in_dispatch` is always `false` here, so `step_effect` never produces this for a
                // top-level call; kept only so this match stays exhaustive as the variant grows.
                scheduler.finish_task(
                    task_id,
                    Err(Error::handler_returned_invalid_program(
                        "Defer escaped to the top level",
                    )),
                );
                return;
            }
            Err(e) => {
                scheduler.finish_task(task_id, Err(e));
                return;
            }
        }
    }
}
