//! Optional host-supplied hooks bracketing each lifecycle phase, plus the global error sink.
use crate::error::Error;

/// User-controller hooks. Every method has a no-op default. The controller, not this trait,
/// guarantees that a critical error always ends the run (by initiating shutdown) regardless of
/// what `on_error` does; the default here only logs.
pub trait UserController: Send {
    /// Runs before any module's `init` is called.
    fn pre_initialize(&mut self) {}
    /// Runs after every module's `init` has returned successfully.
    fn post_initialize(&mut self) {}
    /// Runs before the controller starts admitting modules whose dependencies are satisfied.
    fn pre_start(&mut self) {}
    /// Runs once every module has reached `Operational`.
    fn post_start(&mut self) {}
    /// Runs before `stop`/`deinit` are called on any module.
    fn pre_shutdown(&mut self) {}
    /// Runs after every module has been stopped and deinitialized.
    fn post_shutdown(&mut self) {}
    /// Runs for every error reported against a module, critical or not.
    fn on_error(&mut self, error: &Error, module_name: &str, critical: bool) {
        tracing::error!(module = module_name, critical, error = %error, "module error");
    }
}

/// A [`UserController`] with every hook at its default.
#[derive(Default)]
pub struct NoopUserController;

impl UserController for NoopUserController {}
