//! Effect dispatch: apply intercepts, find a handler, run its
//! body, act on what it does).
//!
//! Grounded on the teacher crate's `SysTryCompleteCombinator`/`do_transition` dispatch shape
//! (`examples/restatedev-sdk-shared-core/src/vm/transitions/combinators.rs`): try the current
//! candidate, and only on an explicit "not yet" signal move to the next one — generalised here from
//! "is this async result ready" to "does this handler want to interpret this effect".

use crate::continuation::ContinuationRegistry;
use crate::effect::Effect;
use crate::error::Error;
use crate::handler::HandlerStack;
use crate::scheduler::{Scheduler, TaskId};
use crate::value::Value;
use crate::vm::kont::Kont;
use crate::vm::{run, Ctrl, StepOutcome};

pub(crate) enum DispatchResult {
    Applied { value: Value, kont: Kont },
    Deferred,
}

/// Resolve `effect` against `candidates`, starting at `start`. `kont` is the continuation each
/// candidate's handler body receives (the rest of the program at the effect site).
pub(crate) fn dispatch(
    scheduler: &mut Scheduler,
    continuations: &mut ContinuationRegistry,
    default_handlers: &HandlerStack,
    task_id: TaskId,
    effect: Effect,
    kont: &Kont,
    candidates: &HandlerStack,
    start: usize,
) -> Result<DispatchResult, Error> {
    let mut idx = start;
    loop {
        let handler = match candidates.get(idx) {
            Some(h) => h,
            None => return Err(Error::unhandled_effect(effect.kind_name())),
        };
        tracing::trace!(handler = handler.label(), idx, "dispatching effect to handler");
        let k = continuations.capture(kont.clone());
        let body = handler.invoke(effect.clone(), k);

        // The next candidates a nested `Delegate`/`GetHandlers` inside this body should see: every
        // candidate after the one currently running.
        let remaining = HandlerStack::from_innermost_first(
            (idx + 1..candidates.len())
                .filter_map(|i| candidates.get(i).cloned())
                .collect(),
        );

        match run(
            scheduler,
            continuations,
            default_handlers,
            task_id,
            Ctrl::Eval(body),
            Kont::empty(),
            Some(remaining),
            true,
        )? {
            // The handler body fell through without resuming: its own return value becomes the
            // value of the effect site, and the captured continuation (`kont`, the rest of the
            // program at the effect site) is discarded rather than applied.
            StepOutcome::Finished(Ok(value)) => {
                return Ok(DispatchResult::Applied {
                    value,
                    kont: Kont::empty(),
                })
            }
            StepOutcome::Finished(Err(e)) => return Err(e),
            StepOutcome::Resumed { value, kont } => return Ok(DispatchResult::Applied { value, kont }),
            StepOutcome::Deferred => return Ok(DispatchResult::Deferred),
            StepOutcome::Delegate | StepOutcome::Pass => {
                idx += 1;
                continue;
            }
            StepOutcome::Yielded => {
                return Err(Error::domain(
                    "handler body attempted to suspend (sleep/await/gather/race); unsupported",
                ));
            }
        }
    }
}
