//! Provider/consumer contract: the two halves of a typed interface for data elements and
//! operations. Module authors implement these against a concrete [`crate::channel::Channel`] (for
//! data elements) or [`crate::channel::Operation`] (for operations); generated per-interface
//! facades would be thin renames of these generic methods.
use crate::error::Result;
use crate::future::Future;
use crate::handle::{Owned, Shared};

/// Provider half of a data element: allocate/set/publish.
pub trait Provider<T> {
    /// Hands back a fresh, exclusively-owned buffer for the caller to fill in place.
    fn allocate(&self) -> Result<Owned<T>>;
    /// Publishes an already-filled buffer, transferring ownership and fanning out to subscribers.
    fn set_allocated(&self, value: Owned<T>);
    /// Copy-publishes a value, fanning out to subscribers.
    fn set(&self, value: T);
}

/// Consumer half of a data element: read the latest sample, subscribe to changes.
pub trait Consumer<T> {
    /// Returns the latest sample as a shared, read-only handle, or a "no sample available" error
    /// if the element has never been published.
    fn get_allocated(&self) -> Result<Shared<T>>;
    /// Returns a value-copy of the latest sample, or a default-constructed value if none.
    fn get(&self) -> T
    where
        T: Clone + Default;
    /// Registers a change handler bound to an owner module name. The handler's initial active
    /// state follows whether `owner_module` is currently in the active-modules set.
    fn register_data_element_handler<F>(&self, owner_module: &str, handler: F)
    where
        F: Fn(Shared<T>) + Send + Sync + 'static;
}

/// Provider half of an operation: install the handler that answers invocations.
pub trait OperationProvider<In, Out> {
    /// Installs the operation handler. A second registration replaces the first.
    fn register_operation_handler<F>(&self, handler: F)
    where
        F: Fn(In) -> Out + Send + Sync + 'static;
    /// Removes any registered handler; subsequent invocations fail with "no handler".
    fn clear_operation_handler(&self);
}

/// Consumer half of an operation: call it, get a future back.
pub trait OperationConsumer<In, Out> {
    /// Invokes the operation. The returned future resolves as soon as the provider-side handler
    /// runs (synchronously, on the caller's thread, for the in-process implementation) or is
    /// immediately errored if no handler is registered.
    fn invoke(&self, input: In) -> Future<Out>;
}
