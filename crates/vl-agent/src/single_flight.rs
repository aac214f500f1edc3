//! Deduplication guard for concurrent invocations of one async operation.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

/// Guards one logical async operation (auto-connect, a collection cycle)
/// against re-entrant starts.
///
/// While an invocation is in flight, `run` joins it instead of starting a
/// second one; every joiner observes the identical settled result,
/// failures included. The in-flight slot clears unconditionally on
/// settlement, so the next call after that starts fresh.
pub struct SingleFlight<T: Clone + Send + Sync + 'static> {
    slot: Arc<Mutex<Option<Shared<BoxFuture<'static, T>>>>>,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `op`, or join the invocation already in flight.
    pub async fn run<F, Fut>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut slot = self.slot.lock().unwrap();
            if let Some(inflight) = slot.as_ref() {
                inflight.clone()
            } else {
                // Spawned so the operation settles even if every caller
                // is dropped mid-wait.
                let task = tokio::spawn(op());
                let slot_ref = Arc::clone(&self.slot);
                let fut = async move {
                    let result = match task.await {
                        Ok(value) => value,
                        Err(err) if err.is_panic() => {
                            std::panic::resume_unwind(err.into_panic())
                        }
                        Err(_) => unreachable!("single-flight task is never aborted"),
                    };
                    slot_ref.lock().unwrap().take();
                    result
                }
                .boxed()
                .shared();
                *slot = Some(fut.clone());
                fut
            }
        };
        shared.await
    }

    /// Whether an invocation is currently in flight.
    pub fn is_inflight(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
