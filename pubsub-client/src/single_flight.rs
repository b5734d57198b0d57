//! At most one in-flight operation of a kind.
//!
//! The first caller of [`SingleFlight::run`] starts the operation; callers
//! arriving while it is still running await the same future and receive a
//! clone of its output. Once it completes the slot is empty again and the
//! next call starts a fresh operation.

use {
    futures_util::future::{BoxFuture, FutureExt, Shared},
    std::{
        future::Future,
        sync::{
            atomic::{AtomicU64, Ordering},
            Mutex, MutexGuard, PoisonError,
        },
    },
};

type InFlight<T> = Option<(u64, Shared<BoxFuture<'static, T>>)>;

pub struct SingleFlight<T> {
    in_flight: Mutex<InFlight<T>>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the running operation, or starts `make()` if none is running.
    pub async fn run<F, Fut>(&self, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (id, operation) = {
            let mut in_flight = self.lock();
            match in_flight.as_ref() {
                Some((id, operation)) if operation.peek().is_none() => (*id, operation.clone()),
                _ => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let operation = make().boxed().shared();
                    *in_flight = Some((id, operation.clone()));
                    (id, operation)
                }
            }
        };
        let output = operation.await;
        self.clear(id);
        output
    }

    /// Awaits the running operation, if any, without starting one.
    pub async fn join(&self) -> Option<T> {
        let running = self
            .lock()
            .as_ref()
            .map(|(id, operation)| (*id, operation.clone()));
        let (id, operation) = running?;
        let output = operation.await;
        self.clear(id);
        Some(output)
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|(_, operation)| operation.peek().is_none())
    }

    fn clear(&self, id: u64) {
        let mut in_flight = self.lock();
        if in_flight.as_ref().is_some_and(|(current, _)| *current == id) {
            *in_flight = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, InFlight<T>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
