//! Test infrastructure shared across the scenario files below, mirroring the teacher crate's
//! `src/tests/mod.rs`: one `mod` per concern, plus a handful of builders used everywhere.

mod algebra;
mod handlers;
mod runtime;
mod stack_safety;

use crate::*;
use std::collections::HashMap;

/// Build an env map for `reader`/`lazy_ask` from `(key, value)` pairs.
fn make_env(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Drive a `Future` to completion on the current thread with a no-op waker. Every future this
/// crate's own test suite bridges through `Runtime::await_host_future` resolves on its first poll,
/// so this never actually needs to park — it exists so `RunAsync` can be tested without pulling in
/// an async runtime dependency, the same "drive it yourself" posture `RunAsync` itself takes.
pub(crate) fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    use std::sync::Arc;
    use std::task::{Context, Poll, Wake, Waker};

    struct NoopWake;
    impl Wake for NoopWake {
        fn wake(self: Arc<Self>) {}
    }

    let waker = Waker::from(Arc::new(NoopWake));
    let mut cx = Context::from_waker(&waker);
    let mut fut = Box::pin(fut);
    loop {
        if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
            return v;
        }
        std::thread::yield_now();
    }
}
