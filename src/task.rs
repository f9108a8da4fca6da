//! Immutable description of one periodic task, plus the active flag the scheduler flips as the
//! owning module moves in and out of the operational state.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// Immutable task description, owned by the scheduler for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub(crate) name: Arc<str>,
    pub(crate) owner: Arc<str>,
    pub(crate) period: u64,
    pub(crate) offset: u64,
    pub(crate) run_after_modules: Vec<Arc<str>>,
    pub(crate) run_after_tasks: Vec<Arc<str>>,
    pub(crate) budget: Duration,
}

impl TaskSpec {
    /// Builds and validates a task spec. `period` and `offset` are expressed in scheduler ticks.
    pub fn new(
        name: &str,
        owner: &str,
        period: u64,
        offset: u64,
        run_after_modules: Vec<String>,
        run_after_tasks: Vec<String>,
        budget: Duration,
    ) -> Result<Self> {
        if period == 0 {
            return Err(Error::InvalidTaskSchedule(
                name.to_owned(),
                "period must be at least one tick".into(),
            ));
        }
        if offset >= period {
            return Err(Error::InvalidTaskSchedule(
                name.to_owned(),
                "offset must be less than period".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            owner: owner.into(),
            period,
            offset,
            run_after_modules: run_after_modules.into_iter().map(Into::into).collect(),
            run_after_tasks: run_after_tasks.into_iter().map(Into::into).collect(),
            budget,
        })
    }
    /// The task's name, unique within its owning module
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The owning module's name
    pub fn owner(&self) -> &str {
        &self.owner
    }
    /// True if tick `t` is an eligible firing tick for this task, per its period/offset
    pub fn fires_on(&self, tick: u64) -> bool {
        tick % self.period == self.offset
    }
}

/// A handle to a registered task: the immutable spec plus a live active flag.
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) spec: Arc<TaskSpec>,
    pub(crate) active: Arc<AtomicBool>,
}

impl TaskHandle {
    pub(crate) fn new(spec: TaskSpec, active: bool) -> Self {
        Self {
            spec: Arc::new(spec),
            active: Arc::new(AtomicBool::new(active)),
        }
    }
    /// The task's immutable spec
    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }
    /// True while the task is admitted for execution (its owner is operational and scheduler
    /// admission for the owner is currently enabled)
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}
