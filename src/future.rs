//! Single-assignment future/promise handoff of a [`Result`](crate::error::Result), the only
//! asynchrony primitive the runtime exposes to module authors.
use std::time::Duration;

use crate::error::{Error, Result};
use crate::fatal;

/// Outcome of [`Future::wait_for`]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PollStatus {
    /// The future was resolved (value or error)
    Ready,
    /// The wait duration elapsed with no result available yet
    Timeout,
}

enum State<T> {
    Pending(oneshot::Receiver<Result<T>>),
    Ready(Result<T>),
    Consumed,
}

/// Producer side of a [`Future`]. Single assignment: calling `set_value`/`set_error` a second
/// time is a programming error and aborts the process, the same as an empty
/// [`crate::handle::Owned`] dereference.
pub struct Promise<T> {
    tx: Option<oneshot::Sender<Result<T>>>,
}

impl<T> Promise<T> {
    /// Creates a linked promise/future pair
    pub fn new() -> (Self, Future<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, Future::pending(rx))
    }
    /// Resolves the future with a value
    pub fn set_value(mut self, value: T) {
        self.set(Ok(value));
    }
    /// Resolves the future with an error
    pub fn set_error(mut self, error: Error) {
        self.set(Err(error));
    }
    fn set(&mut self, result: Result<T>) {
        let Some(tx) = self.tx.take() else {
            fatal("promise set twice");
        };
        // the receiver may already be gone (future dropped); that is not a promise misuse
        let _r = tx.send(result);
    }
}

/// Consumer side of a [`Promise`]. Move-only: a future cannot be cloned, mirroring the
/// single-waiter contract of the source system.
pub struct Future<T> {
    state: State<T>,
}

impl<T> Future<T> {
    fn pending(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            state: State::Pending(rx),
        }
    }
    /// A future that is already resolved, used by synchronous providers (e.g. the in-process
    /// channel's `invoke`) which never actually suspend
    pub fn ready(result: Result<T>) -> Self {
        Self {
            state: State::Ready(result),
        }
    }
    /// True while the future has not yet been consumed by [`Future::get`]/[`Future::get_result`]
    pub fn valid(&self) -> bool {
        !matches!(self.state, State::Consumed)
    }
    /// Polls for readiness, blocking up to `timeout`. A zero timeout never blocks.
    pub fn wait_for(&mut self, timeout: Duration) -> PollStatus {
        if matches!(self.state, State::Ready(_)) {
            return PollStatus::Ready;
        }
        let State::Pending(rx) = &self.state else {
            return PollStatus::Ready;
        };
        match rx.recv_timeout(timeout) {
            Ok(result) => {
                self.state = State::Ready(result);
                PollStatus::Ready
            }
            Err(oneshot::RecvTimeoutError::Timeout) => PollStatus::Timeout,
            Err(oneshot::RecvTimeoutError::Disconnected) => {
                self.state = State::Ready(Err(Error::not_ok("no handler registered")));
                PollStatus::Ready
            }
        }
    }
    /// Shorthand for `wait_for(Duration::ZERO) == Ready`
    pub fn is_ready(&mut self) -> bool {
        self.wait_for(Duration::ZERO) == PollStatus::Ready
    }
    /// Blocks until the promise is set, consuming the future and returning the raw result
    pub fn get_result(mut self) -> Result<T> {
        self.wait_for_forever();
        match std::mem::replace(&mut self.state, State::Consumed) {
            State::Ready(result) => result,
            _ => unreachable!("wait_for_forever always reaches Ready"),
        }
    }
    /// Blocks until the promise is set. On an error-valued result, logs a fatal diagnostic and
    /// aborts the process: callers who want to handle errors must use [`Future::get_result`]
    /// instead.
    pub fn get(self) -> T {
        match self.get_result() {
            Ok(value) => value,
            Err(e) => fatal(&format!("future resolved with error: {e}")),
        }
    }
    fn wait_for_forever(&mut self) {
        while self.wait_for(Duration::from_secs(3600)) == PollStatus::Timeout {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_value_roundtrip() {
        let (promise, mut future) = Promise::new();
        assert!(!future.is_ready());
        promise.set_value(42);
        assert!(future.is_ready());
        assert_eq!(future.get(), 42);
    }

    #[test]
    fn test_error_roundtrip() {
        let (promise, future) = Promise::<i32>::new();
        promise.set_error(Error::not_ok("boom"));
        let result = future.get_result();
        assert!(result.is_err());
    }

    #[test]
    fn test_no_handler_errors_future() {
        let (promise, future) = Promise::<i32>::new();
        drop(promise);
        assert!(future.get_result().is_err());
    }

    #[test]
    fn test_timeout() {
        let (_promise, mut future) = Promise::<i32>::new();
        assert_eq!(future.wait_for(Duration::from_millis(5)), PollStatus::Timeout);
    }
}
