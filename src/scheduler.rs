//! Single tick thread; maintains an ordered task list; invokes eligible tasks per tick; enforces
//! ordering, offsets and budgets.
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::locking::Mutex;
use crate::task::{TaskHandle, TaskSpec};
use crate::thread_rt::{self, RtParams, Scheduling};
use crate::time::Interval;

type TaskFn = Box<dyn FnMut() + Send>;

struct TaskEntry {
    handle: TaskHandle,
    callable: TaskFn,
}

struct Inner {
    tasks: Mutex<Vec<TaskEntry>>,
    tick_period: Duration,
    tick: AtomicU64,
    cancel: AtomicBool,
    error_sink: Box<dyn Fn(&str, Error) + Send + Sync>,
    tick_thread: Mutex<Option<JoinHandle<()>>>,
}

/// The periodic scheduler: a single tick thread driving an ordered list of tasks.
///
/// Insertion keeps the list in a legal topological order with respect to each task's declared
/// "run-after module" and "run-after peer task" constraints, so eligibility per tick reduces to
/// "process the list in order": a predecessor, if eligible this tick, has already run by the time
/// a dependent's turn comes up.
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Creates a new scheduler with the given tick period. `error_sink` receives `(owner_module,
    /// error)` whenever a task callable panics; the controller wires this to
    /// [`crate::controller::ExecutableController::report_error_of_module`].
    pub fn new<F>(tick_period: Duration, error_sink: F) -> Self
    where
        F: Fn(&str, Error) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(Vec::new()),
                tick_period,
                tick: AtomicU64::new(0),
                cancel: AtomicBool::new(false),
                error_sink: Box::new(error_sink),
                tick_thread: Mutex::new(None),
            }),
        }
    }
    /// The configured tick period
    pub fn tick_period(&self) -> Duration {
        self.inner.tick_period
    }
    /// The current tick index (monotonic, starts at zero)
    pub fn current_tick(&self) -> u64 {
        self.inner.tick.load(Ordering::Acquire)
    }
    /// Registers a new task, inserting it at the earliest position in the list that does not
    /// place it before any task owned by one of its run-after modules, nor before any named
    /// run-after peer task within its own owner module. O(N), no rebalancing afterwards.
    pub fn add_task<F>(&self, spec: TaskSpec, active: bool, callable: F) -> Result<TaskHandle>
    where
        F: FnMut() + Send + 'static,
    {
        let mut tasks = self.inner.tasks.lock();
        if tasks
            .iter()
            .any(|t| t.handle.spec.owner == spec.owner && t.handle.spec.name == spec.name)
        {
            return Err(Error::DuplicateTask(spec.owner.to_string(), spec.name.to_string()));
        }
        let handle = TaskHandle::new(spec, active);
        let position = Self::insertion_index(&tasks, &handle.spec);
        let entry = TaskEntry {
            handle: handle.clone(),
            callable: Box::new(callable),
        };
        tasks.insert(position, entry);
        Ok(handle)
    }
    fn insertion_index(tasks: &[TaskEntry], spec: &TaskSpec) -> usize {
        let mut position = 0;
        for (i, entry) in tasks.iter().enumerate() {
            let is_predecessor = spec
                .run_after_modules
                .iter()
                .any(|m| *entry.handle.spec.owner == **m)
                || (entry.handle.spec.owner == spec.owner
                    && spec
                        .run_after_tasks
                        .iter()
                        .any(|t| *entry.handle.spec.name == **t));
            if is_predecessor {
                position = i + 1;
            }
        }
        position
    }
    /// Clears the active flag of every task owned by `module`; skipped tasks stay in the list.
    pub fn pause_module(&self, module: &str) {
        let tasks = self.inner.tasks.lock();
        for entry in tasks.iter().filter(|t| &*t.handle.spec.owner == module) {
            entry.handle.set_active(false);
        }
    }
    /// Sets the active flag of every task owned by `module`.
    pub fn resume_module(&self, module: &str) {
        let tasks = self.inner.tasks.lock();
        for entry in tasks.iter().filter(|t| &*t.handle.spec.owner == module) {
            entry.handle.set_active(true);
        }
    }
    /// Spawns the tick thread. `rt_params` optionally applies real-time scheduling to it.
    pub fn start(&self, rt_params: Option<RtParams>) -> std::io::Result<()> {
        let inner = self.inner.clone();
        let handle = thread_rt::spawn("vaf-tick", rt_params, move || tick_loop(&inner))?;
        *self.inner.tick_thread.lock() = Some(handle);
        Ok(())
    }
    /// Signals the tick thread to exit after completing its current tick, and joins it.
    pub fn shutdown(&self) {
        self.inner.cancel.store(true, Ordering::Release);
        if let Some(handle) = self.inner.tick_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn tick_loop(inner: &Inner) {
    let mut interval = Interval::new(inner.tick_period);
    while !inner.cancel.load(Ordering::Acquire) {
        interval.tick();
        let tick = inner.tick.fetch_add(1, Ordering::AcqRel);
        run_tick(inner, tick);
    }
}

fn run_tick(inner: &Inner, tick: u64) {
    let mut tasks = inner.tasks.lock();
    for entry in tasks.iter_mut() {
        if !entry.handle.is_active() || !entry.handle.spec.fires_on(tick) {
            continue;
        }
        let started = Instant::now();
        let callable = &mut entry.callable;
        let result = panic::catch_unwind(AssertUnwindSafe(callable));
        let elapsed = started.elapsed();
        let budget = entry.handle.spec.budget;
        if !budget.is_zero() && elapsed > budget {
            tracing::warn!(
                task = %entry.handle.spec.name,
                owner = %entry.handle.spec.owner,
                budget_ms = budget.as_millis(),
                elapsed_ms = elapsed.as_millis(),
                "task exceeded its budget"
            );
        }
        if let Err(panic) = result {
            let message = panic_message(&*panic);
            if message.starts_with(crate::FATAL_PANIC_PREFIX) {
                panic::resume_unwind(panic);
            }
            (inner.error_sink)(&entry.handle.spec.owner, Error::not_ok(message));
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_owned()
    }
}

/// Runs the module's tasks on a real-time scheduling policy if `priority` is set; a convenience
/// for building [`RtParams`] for [`Scheduler::start`] the way the source controller pins its tick
/// thread to a dedicated CPU.
pub fn fifo_rt_params(priority: i32, cpu_id: usize) -> RtParams {
    RtParams::new()
        .set_priority(priority)
        .set_scheduling(Scheduling::FIFO)
        .set_cpu_ids(&[cpu_id])
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn spec(name: &str, owner: &str, period: u64, offset: u64, run_after_modules: &[&str]) -> TaskSpec {
        TaskSpec::new(
            name,
            owner,
            period,
            offset,
            run_after_modules.iter().map(|s| s.to_string()).collect(),
            vec![],
            Duration::ZERO,
        )
        .unwrap()
    }

    #[test]
    fn test_insertion_respects_module_order() {
        let scheduler = Scheduler::new(Duration::from_millis(1), |_, _| {});
        scheduler
            .add_task(spec("tb", "B", 1, 0, &["A"]), true, || {})
            .unwrap();
        scheduler
            .add_task(spec("ta", "A", 1, 0, &[]), true, || {})
            .unwrap();
        let tasks = scheduler.inner.tasks.lock();
        let owners: Vec<&str> = tasks.iter().map(|t| &*t.handle.spec.owner).collect();
        assert_eq!(owners, vec!["A", "B"]);
    }

    #[test]
    fn test_offsets_never_collide() {
        let scheduler = Scheduler::new(Duration::from_millis(1), |_, _| {});
        let hits1 = Arc::new(StdMutex::new(Vec::new()));
        let hits2 = Arc::new(StdMutex::new(Vec::new()));
        let h1 = hits1.clone();
        let h2 = hits2.clone();
        scheduler
            .add_task(spec("t1", "M", 20, 0, &[]), true, move || {
                h1.lock().unwrap().push(());
            })
            .unwrap();
        scheduler
            .add_task(spec("t2", "M", 20, 1, &[]), true, move || {
                h2.lock().unwrap().push(());
            })
            .unwrap();
        for tick in 0..60 {
            run_tick(&scheduler.inner, tick);
        }
        assert_eq!(hits1.lock().unwrap().len(), 3);
        assert_eq!(hits2.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_panic_reported_and_scheduler_continues() {
        let reported = Arc::new(AtomicUsize::new(0));
        let r = reported.clone();
        let scheduler = Scheduler::new(Duration::from_millis(1), move |_owner, _err| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let runs = Arc::new(AtomicUsize::new(0));
        let rr = runs.clone();
        scheduler
            .add_task(spec("boom", "M", 1, 0, &[]), true, move || {
                rr.fetch_add(1, Ordering::SeqCst);
                panic!("boom");
            })
            .unwrap();
        run_tick(&scheduler.inner, 0);
        run_tick(&scheduler.inner, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(reported.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_budget_overrun_task_still_runs_next_tick() {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let scheduler = Scheduler::new(Duration::from_millis(1), |_, _| {});
        scheduler
            .add_task(
                TaskSpec::new("slow", "M", 1, 0, vec![], vec![], Duration::from_micros(1)).unwrap(),
                true,
                move || {
                    std::thread::sleep(Duration::from_millis(2));
                    r.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        run_tick(&scheduler.inner, 0);
        run_tick(&scheduler.inner, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[should_panic(expected = "vaf-rt fatal: boom")]
    fn test_fatal_panic_reabsorbs_instead_of_reporting() {
        let reported = Arc::new(AtomicUsize::new(0));
        let r = reported.clone();
        let scheduler = Scheduler::new(Duration::from_millis(1), move |_owner, _err| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        scheduler
            .add_task(spec("fatal", "M", 1, 0, &[]), true, || {
                crate::fatal("boom");
            })
            .unwrap();
        run_tick(&scheduler.inner, 0);
    }

    #[test]
    fn test_deterministic_schedule_trace_snapshot() {
        let scheduler = Scheduler::new(Duration::from_millis(1), |_, _| {});
        let trace = Arc::new(StdMutex::new(Vec::new()));
        let ta = trace.clone();
        let tb = trace.clone();
        scheduler
            .add_task(spec("a", "A", 2, 0, &[]), true, move || {
                ta.lock().unwrap().push("a".to_owned());
            })
            .unwrap();
        scheduler
            .add_task(spec("b", "B", 2, 0, &["A"]), true, move || {
                tb.lock().unwrap().push("b".to_owned());
            })
            .unwrap();
        for tick in 0..4 {
            run_tick(&scheduler.inner, tick);
        }
        let trace = trace.lock().unwrap().clone();
        insta::assert_debug_snapshot!(trace);
    }

    #[test]
    fn test_pause_resume() {
        let scheduler = Scheduler::new(Duration::from_millis(1), |_, _| {});
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        scheduler
            .add_task(spec("t", "M", 1, 0, &[]), true, move || {
                r.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        scheduler.pause_module("M");
        run_tick(&scheduler.inner, 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        scheduler.resume_module("M");
        run_tick(&scheduler.inner, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
