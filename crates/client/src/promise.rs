//! Single-assignment cell bridging reactor callbacks to waiting callers.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use futures::future::poll_fn;

use crate::error::PromiseError;

/// A value delivered exactly once and observed by any number of waiters.
///
/// Clones share the same cell. Waiting never affects the operation that will deliver the value:
/// a timed out or interrupted waiter leaves the promise pending for everybody else.
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    value: OnceLock<T>,
    state: Mutex<WaitState>,
    ready: Condvar,
}

#[derive(Default)]
struct WaitState {
    // bumped by `interrupt_waiters`; a waiter fails once it sees a newer generation
    generation: u64,
    wakers: Vec<Waker>,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self { inner: Arc::new(Inner { value: OnceLock::new(), state: Mutex::default(), ready: Condvar::new() }) }
    }

    fn lock(&self) -> MutexGuard<'_, WaitState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fulfills the promise and wakes every waiter.
    ///
    /// A second delivery is rejected and the first value is kept.
    pub fn deliver(&self, value: T) -> Result<(), PromiseError> {
        let mut state = self.lock();
        if self.inner.value.set(value).is_err() {
            return Err(PromiseError::AlreadyDelivered);
        }
        self.inner.ready.notify_all();
        state.wakers.drain(..).for_each(Waker::wake);
        Ok(())
    }

    pub fn is_delivered(&self) -> bool {
        self.inner.value.get().is_some()
    }

    /// The delivered value, without waiting.
    pub fn peek(&self) -> Option<&T> {
        self.inner.value.get()
    }

    /// Fails every waiter currently blocked in [`wait`](Self::wait), [`wait_timeout`](Self::wait_timeout)
    /// or [`wait_async`](Self::wait_async) with [`PromiseError::InterruptedWait`].
    ///
    /// The promise itself stays pending and later waits behave normally.
    pub fn interrupt_waiters(&self) {
        let mut state = self.lock();
        state.generation += 1;
        self.inner.ready.notify_all();
        state.wakers.drain(..).for_each(Waker::wake);
    }
}

impl<T: Clone> Promise<T> {
    /// Blocks the current thread until a value is delivered.
    pub fn wait(&self) -> Result<T, PromiseError> {
        let mut state = self.lock();
        let generation = state.generation;
        loop {
            if let Some(value) = self.inner.value.get() {
                return Ok(value.clone());
            }
            if state.generation != generation {
                return Err(PromiseError::InterruptedWait);
            }
            state = self.inner.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, PromiseError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        let generation = state.generation;
        loop {
            if let Some(value) = self.inner.value.get() {
                return Ok(value.clone());
            }
            if state.generation != generation {
                return Err(PromiseError::InterruptedWait);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PromiseError::WaitTimeout(timeout));
            }
            state = self.inner.ready.wait_timeout(state, deadline - now).unwrap_or_else(PoisonError::into_inner).0;
        }
    }

    /// Waits for the value without blocking the executor.
    pub async fn wait_async(&self) -> Result<T, PromiseError> {
        let mut generation = None;
        poll_fn(|cx| self.poll_wait(cx, &mut generation)).await
    }

    fn poll_wait(&self, cx: &mut Context<'_>, generation: &mut Option<u64>) -> Poll<Result<T, PromiseError>> {
        let mut state = self.lock();
        let generation = *generation.get_or_insert(state.generation);
        if let Some(value) = self.inner.value.get() {
            return Poll::Ready(Ok(value.clone()));
        }
        if state.generation != generation {
            return Poll::Ready(Err(PromiseError::InterruptedWait));
        }
        let waker = cx.waker();
        if !state.wakers.iter().any(|w| w.will_wake(waker)) {
            state.wakers.push(waker.clone());
        }
        Poll::Pending
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: fmt::Debug> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").field("value", &self.inner.value.get()).finish()
    }
}
