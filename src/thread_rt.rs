//! Real-time thread spawning for the runtime's two fixed threads (the scheduler's tick thread and
//! the signal-handling thread). Thin wrapper around [`rtsc::thread_rt`]; unlike the worker-pool
//! version this framework is not built around, there is no task supervisor here because the
//! runtime never spawns more than these two threads.
use std::thread::{self, JoinHandle};

pub use rtsc::thread_rt::Scheduling;

/// Real-time scheduling parameters for one of the runtime's threads
#[derive(Default, Clone)]
pub struct RtParams {
    priority: Option<i32>,
    scheduling: Scheduling,
    cpu_ids: Vec<usize>,
}

impl RtParams {
    /// Creates a new, unset parameter set (falls back to the platform default scheduler)
    pub fn new() -> Self {
        Self::default()
    }
    /// Sets the scheduler priority
    pub fn set_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
    /// Sets the scheduling policy
    pub fn set_scheduling(mut self, scheduling: Scheduling) -> Self {
        self.scheduling = scheduling;
        self
    }
    /// Pins the thread to the given CPU ids
    pub fn set_cpu_ids(mut self, cpu_ids: &[usize]) -> Self {
        self.cpu_ids = cpu_ids.to_vec();
        self
    }
    fn as_rtsc(&self) -> rtsc::thread_rt::Params {
        rtsc::thread_rt::Params::new()
            .with_priority(self.priority)
            .with_scheduling(self.scheduling)
            .with_cpu_ids(&self.cpu_ids)
    }
}

/// Spawns a named thread, optionally applying real-time scheduling parameters from inside the
/// new thread. Real-time application failures (e.g. missing `CAP_SYS_NICE`, or running outside
/// Linux) are logged and otherwise ignored: the thread still runs, just without RT guarantees.
pub fn spawn<F>(name: &str, rt_params: Option<RtParams>, f: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let thread_name = name.to_owned();
    thread::Builder::new().name(thread_name.clone()).spawn(move || {
        if let Some(params) = rt_params {
            if let Err(e) = rtsc::thread_rt::apply_for_current(&params.as_rtsc()) {
                tracing::warn!(thread = %thread_name, error = %e, "unable to apply real-time scheduling, continuing without it");
            }
        }
        f();
    })
}
