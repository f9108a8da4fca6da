//! Module control interface and the lifecycle state machine every registered module is driven
//! through.
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::executor::ModuleExecutor;

/// One module's position in the lifecycle state machine. Terminal state is `Shutdown`; a module
/// never revisits a state once it has left it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ModuleState {
    /// Constructed and registered, `init` not yet called
    NotInitialized,
    /// `init` succeeded; waiting for declared dependencies to become operational
    NotOperational,
    /// `start` has been called; waiting for `reportOperational`/`skipStartingOfModule`
    Starting,
    /// Tasks are admitted, data handlers are eligible for activation
    Operational,
    /// `stop`/`deInit` have run; terminal
    Shutdown,
}

pub(crate) enum ModuleEvent {
    Operational(Arc<str>),
    Error {
        module: Arc<str>,
        error: Error,
        critical: bool,
    },
    SkipStarting(Arc<str>),
}

/// The callback handle given to a module's lifecycle methods. Mirrors the controller's own
/// `Context` in spirit: modules report back through it instead of reaching into the controller
/// directly, so the controller can outlive every module without a back-reference cycle.
#[derive(Clone)]
pub struct ModuleContext {
    module_name: Arc<str>,
    executor: ModuleExecutor,
    events: Sender<ModuleEvent>,
}

impl ModuleContext {
    pub(crate) fn new(module_name: Arc<str>, executor: ModuleExecutor, events: Sender<ModuleEvent>) -> Self {
        Self {
            module_name,
            executor,
            events,
        }
    }
    /// This module's registered name
    pub fn module_name(&self) -> &str {
        &self.module_name
    }
    /// The per-module facade over the scheduler, used to register periodic tasks
    pub fn module_executor(&self) -> &ModuleExecutor {
        &self.executor
    }
    /// Reports that the module has finished starting: the controller admits its tasks and
    /// notifies dependent peers that this module's data handlers may now activate.
    pub fn report_operational(&self) {
        let _ = self.events.send(ModuleEvent::Operational(self.module_name.clone()));
    }
    /// Reports a runtime error. `critical` escalates to a controller-wide shutdown after the
    /// user-controller's `on_error` hook runs.
    pub fn report_error(&self, error: Error, critical: bool) {
        let _ = self.events.send(ModuleEvent::Error {
            module: self.module_name.clone(),
            error,
            critical,
        });
    }
    /// Used by modules with no tasks of their own: transitions straight to operational without
    /// ever calling `reportOperational`.
    pub fn skip_starting_of_module(&self) {
        let _ = self.events.send(ModuleEvent::SkipStarting(self.module_name.clone()));
    }
}

/// The abstract interface every module implements. `init`/`start`/`stop`/`deinit`/`on_error` are
/// the lifecycle call-ins driven by the controller; `start_event_handler_for_module` and its dual
/// forward activation state into whatever [`crate::channel::Channel`]s the module composes (a
/// module with no data elements has nothing to forward and can leave the defaults).
pub trait ModuleControl: Send {
    /// Runs once, in dependency order, before any module starts. Failure is fatal configuration
    /// error and escalates via `on_error` with `critical = true`.
    fn init(&mut self, ctx: &ModuleContext) -> Result<()>;
    /// Runs once all declared dependencies are operational. Must eventually call
    /// `ctx.report_operational()` or `ctx.skip_starting_of_module()` — possibly asynchronously,
    /// from a task registered during `init`.
    fn start(&mut self, ctx: &ModuleContext) -> Result<()>;
    /// Runs once, during shutdown, before `deinit`.
    fn stop(&mut self, ctx: &ModuleContext);
    /// Runs once, during shutdown, after `stop`.
    fn deinit(&mut self, ctx: &ModuleContext);
    /// Runs when the controller forwards a non-critical error reported against this module.
    fn on_error(&mut self, ctx: &ModuleContext, error: Error);
    /// Forwarded to this module's channels when `module` (a dependency of this one) becomes
    /// operational.
    fn start_event_handler_for_module(&self, _module: &str) {}
    /// The dual of [`ModuleControl::start_event_handler_for_module`].
    fn stop_event_handler_for_module(&self, _module: &str) {}
}
