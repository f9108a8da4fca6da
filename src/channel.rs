//! An in-process module implementing both provider and consumer facades of one interface, doing
//! publish/subscribe fan-out with no copy of the payload and per-subscriber activation gating.
//!
//! `set` clones the subscriber list and the active-owners set out from under the lock before
//! invoking any handler, so a handler that re-enters `set` only ever affects the *next*
//! publication.
use std::collections::HashSet;
use std::sync::Arc;

use crate::locking::Mutex;

use crate::contract::{Consumer, OperationConsumer, OperationProvider, Provider};
use crate::error::{Error, Result};
use crate::future::Future;
use crate::handle::{Owned, Shared};

struct Subscriber<T> {
    owner: Arc<str>,
    handler: Arc<dyn Fn(Shared<T>) + Send + Sync>,
}

struct ChannelInner<T> {
    sample: Option<Shared<T>>,
    subscribers: Vec<Subscriber<T>>,
    active_owners: HashSet<Arc<str>>,
}

/// An in-process data element channel: one named provider/consumer pair.
pub struct Channel<T> {
    inner: Arc<Mutex<ChannelInner<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelInner {
                sample: None,
                subscribers: Vec::new(),
                active_owners: HashSet::new(),
            })),
        }
    }
}

impl<T> Channel<T> {
    /// Creates a new, empty channel.
    pub fn new() -> Self {
        Self::default()
    }
    /// Marks `module` active: every handler tagged with that owner name starts receiving
    /// publications, and `module` is added to the active-owners set.
    pub fn start_event_handler_for_module(&self, module: &str) {
        self.inner.lock().active_owners.insert(module.into());
    }
    /// The dual of [`Channel::start_event_handler_for_module`].
    pub fn stop_event_handler_for_module(&self, module: &str) {
        self.inner.lock().active_owners.remove(module);
    }
    fn publish(&self, sample: Shared<T>) {
        let (subscribers, active): (Vec<Subscriber<T>>, HashSet<Arc<str>>) = {
            let mut inner = self.inner.lock();
            inner.sample = Some(sample.clone());
            (
                inner
                    .subscribers
                    .iter()
                    .map(|s| Subscriber {
                        owner: s.owner.clone(),
                        handler: s.handler.clone(),
                    })
                    .collect(),
                inner.active_owners.clone(),
            )
        };
        for subscriber in subscribers {
            if active.contains(&subscriber.owner) {
                (subscriber.handler)(sample.clone());
            }
        }
    }
}

impl<T: Clone + Default> Provider<T> for Channel<T> {
    fn allocate(&self) -> Result<Owned<T>> {
        Ok(Owned::default())
    }
    fn set_allocated(&self, value: Owned<T>) {
        self.publish(value.into_shared());
    }
    fn set(&self, value: T) {
        self.publish(Shared::new(value));
    }
}

impl<T> Consumer<T> for Channel<T> {
    fn get_allocated(&self) -> Result<Shared<T>> {
        self.inner
            .lock()
            .sample
            .clone()
            .ok_or_else(|| Error::not_ok("no sample available"))
    }
    fn get(&self) -> T
    where
        T: Clone + Default,
    {
        self.inner
            .lock()
            .sample
            .as_deref()
            .cloned()
            .unwrap_or_default()
    }
    fn register_data_element_handler<F>(&self, owner_module: &str, handler: F)
    where
        F: Fn(Shared<T>) + Send + Sync + 'static,
    {
        self.inner.lock().subscribers.push(Subscriber {
            owner: owner_module.into(),
            handler: Arc::new(handler),
        });
    }
}

/// An in-process operation: handler registration plus synchronous invocation.
pub struct Operation<In, Out> {
    handler: Arc<Mutex<Option<Arc<dyn Fn(In) -> Out + Send + Sync>>>>,
}

impl<In, Out> Clone for Operation<In, Out> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<In, Out> Default for Operation<In, Out> {
    fn default() -> Self {
        Self {
            handler: Arc::new(Mutex::new(None)),
        }
    }
}

impl<In, Out> Operation<In, Out> {
    /// Creates a new operation with no handler registered.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<In, Out> OperationProvider<In, Out> for Operation<In, Out> {
    fn register_operation_handler<F>(&self, handler: F)
    where
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Arc::new(handler));
    }
    fn clear_operation_handler(&self) {
        *self.handler.lock() = None;
    }
}

impl<In, Out> OperationConsumer<In, Out> for Operation<In, Out> {
    fn invoke(&self, input: In) -> Future<Out> {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => Future::ready(Ok(handler(input))),
            None => Future::ready(Err(Error::not_ok("no handler registered for operation"))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_set_then_get_roundtrip() {
        let channel: Channel<i32> = Channel::new();
        channel.set(42);
        assert_eq!(channel.get(), 42);
        assert_eq!(*channel.get_allocated().unwrap(), 42);
    }

    #[test]
    fn test_get_before_publish_is_default() {
        let channel: Channel<i32> = Channel::new();
        assert_eq!(channel.get(), 0);
        assert!(channel.get_allocated().is_err());
    }

    #[test]
    fn test_subscriber_gating() {
        let channel: Channel<i32> = Channel::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        channel.register_data_element_handler("X", move |value| {
            s.store(*value as usize, Ordering::SeqCst);
        });
        channel.set(1); // X not active yet
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        channel.start_event_handler_for_module("X");
        channel.set(2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_late_subscriber_sees_next_value_not_history() {
        let channel: Channel<i32> = Channel::new();
        channel.start_event_handler_for_module("X");
        channel.set(1);
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        channel.register_data_element_handler("X", move |value| {
            s.store(*value as usize, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        channel.set(2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_operation_round_trip() {
        let op: Operation<(i32, i32), i32> = Operation::new();
        op.register_operation_handler(|(a, b)| a + b);
        let future = op.invoke((2, 3));
        assert_eq!(future.get(), 5);
    }

    #[test]
    fn test_operation_no_handler_errors() {
        let op: Operation<(i32, i32), i32> = Operation::new();
        let future = op.invoke((2, 3));
        assert!(future.get_result().is_err());
    }
}
