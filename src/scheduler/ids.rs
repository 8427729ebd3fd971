//! Identifier newtypes shared across the scheduler, the kernel, and the public facade.
//!
//! Grounded on the teacher crate's `AsyncResultHandle`/`SendHandle` newtypes
//! (`examples/restatedev-sdk-shared-core/src/lib.rs`): a `u32`/`u64` wrapped so handles from
//! different domains (tasks vs. promises vs. futures) can never be confused at the type level.

use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u64);

        impl $name {
            pub(crate) fn next(counter: &mut u64) -> Self {
                let id = *counter;
                *counter += 1;
                $name(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

id_type!(TaskId);
id_type!(PromiseId);
id_type!(FutureHandle);
