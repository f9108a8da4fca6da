//! Per-module facade over the scheduler.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::task::{TaskHandle, TaskSpec};

/// A per-module handle to the shared [`Scheduler`]. Registrations performed before the module has
/// started remain dormant (inserted but inactive) until the controller admits the module;
/// registrations performed after start activate immediately.
#[derive(Clone)]
pub struct ModuleExecutor {
    scheduler: Arc<Scheduler>,
    module_name: Arc<str>,
    dependencies: Vec<String>,
    default_budget: Duration,
    started: Arc<AtomicBool>,
}

impl ModuleExecutor {
    pub(crate) fn new(
        scheduler: Arc<Scheduler>,
        module_name: &str,
        dependencies: Vec<String>,
        default_budget: Duration,
    ) -> Self {
        Self {
            scheduler,
            module_name: module_name.into(),
            dependencies,
            default_budget,
            started: Arc::new(AtomicBool::new(false)),
        }
    }
    /// Registers a periodic task owned by this module. `run_after_peers` names sibling tasks
    /// within this same module that must not be overtaken; the module's declared dependencies
    /// are automatically used as the run-after-modules constraint. `budget` of `None` falls back
    /// to the controller's configured default task budget.
    pub fn run_periodic<F>(
        &self,
        name: &str,
        period_ticks: u64,
        callable: F,
        run_after_peers: Vec<String>,
        offset_ticks: u64,
        budget: Option<Duration>,
    ) -> Result<TaskHandle>
    where
        F: FnMut() + Send + 'static,
    {
        let spec = TaskSpec::new(
            name,
            &self.module_name,
            period_ticks,
            offset_ticks,
            self.dependencies.clone(),
            run_after_peers,
            budget.unwrap_or(self.default_budget),
        )?;
        let active = self.started.load(Ordering::Acquire);
        self.scheduler.add_task(spec, active, callable)
    }
    /// Called by the controller once the module transitions to operational: tasks registered
    /// before this point activate, and any later registration activates immediately too.
    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
        self.scheduler.resume_module(&self.module_name);
    }
    /// Called by the controller when pausing a module (e.g. during shutdown)
    pub(crate) fn pause(&self) {
        self.scheduler.pause_module(&self.module_name);
    }
}
