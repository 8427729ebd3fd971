//! One-shot continuations: what a handler receives as "the rest of the program".
//!
//! A `Continuation` is an opaque capture of a [`crate::vm::kont::Kont`] tail plus a fresh id used
//! to enforce the one-shot invariant: resuming the same continuation twice is an error. Its `kont`
//! field is `pub(crate)`, so only the kernel can turn one back into a `Kont`; handler authors only
//! ever see it as an inert value to hand to `Effect::Resume`.

use crate::vm::kont::Kont;
use std::fmt;

#[derive(Clone)]
pub struct Continuation {
    id: u64,
    pub(crate) kont: Kont,
}

impl Continuation {
    pub(crate) fn new(id: u64, kont: Kont) -> Self {
        Continuation { id, kont }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation").field("id", &self.id).finish()
    }
}

/// Tracks which continuation ids have already been resumed, per run. Grounded on the teacher
/// crate's `AsyncResultsState` bookkeeping of already-consumed handles
/// (`examples/restatedev-sdk-shared-core/src/vm/context.rs`) — same "a handle is good for exactly
/// one use" discipline, applied to continuations instead of async result handles.
#[derive(Default)]
pub(crate) struct ContinuationRegistry {
    next_id: u64,
    used: std::collections::HashSet<u64>,
}

impl ContinuationRegistry {
    pub(crate) fn capture(&mut self, kont: Kont) -> Continuation {
        let id = self.next_id;
        self.next_id += 1;
        Continuation::new(id, kont)
    }

    /// Mark `k` as consumed, returning an error if it already was.
    pub(crate) fn consume(&mut self, k: &Continuation) -> Result<(), crate::error::Error> {
        if !self.used.insert(k.id()) {
            return Err(crate::error::Error::ContinuationReused);
        }
        Ok(())
    }
}
