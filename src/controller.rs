//! The executable controller: module registry, lifecycle state machine, startup/shutdown
//! orchestration and the error-reporting pipeline.
//!
//! Signal handling uses a dedicated thread that blocks on a fixed signal set and does no other
//! work; catching a signal just flips an atomic flag that the Operate-phase poll loop observes at
//! the next wakeup.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::executor::ModuleExecutor;
use crate::hooks::{NoopUserController, UserController};
use crate::lifecycle::{ModuleContext, ModuleControl, ModuleEvent, ModuleState};
use crate::scheduler::Scheduler;

#[cfg(unix)]
fn signal_by_name(name: &str) -> Result<std::os::raw::c_int> {
    match name {
        "SIGINT" => Ok(signal_hook::consts::SIGINT),
        "SIGTERM" => Ok(signal_hook::consts::SIGTERM),
        "SIGHUP" => Ok(signal_hook::consts::SIGHUP),
        "SIGQUIT" => Ok(signal_hook::consts::SIGQUIT),
        other => Err(Error::Config(format!("unknown shutdown signal: {other}"))),
    }
}

struct ModuleEntry {
    name: Arc<str>,
    description: Option<String>,
    dependencies: Vec<String>,
    module: Box<dyn ModuleControl>,
    context: ModuleContext,
    state: ModuleState,
    starting_checks: u32,
}

/// Registers modules, drives them through the lifecycle state machine, and orchestrates
/// signal-driven shutdown. Construct one, [`ExecutableController::register_module`] every module,
/// then call [`ExecutableController::run`].
pub struct ExecutableController {
    modules: Vec<ModuleEntry>,
    scheduler: Arc<Scheduler>,
    config: RuntimeConfig,
    shutdown: Arc<AtomicBool>,
    events_tx: Sender<ModuleEvent>,
    events_rx: Receiver<ModuleEvent>,
    user_controller: Box<dyn UserController>,
    running: bool,
}

impl ExecutableController {
    /// Creates a new controller with the given configuration and a no-op user controller.
    pub fn new(config: RuntimeConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let error_tx = events_tx.clone();
        let scheduler = Arc::new(Scheduler::new(config.tick_period(), move |owner, error| {
            let _ = error_tx.send(ModuleEvent::Error {
                module: owner.into(),
                error,
                critical: false,
            });
        }));
        Self {
            modules: Vec::new(),
            scheduler,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx,
            user_controller: Box::new(NoopUserController),
            running: false,
        }
    }
    /// Installs a custom set of user-controller hooks, replacing the no-op default.
    pub fn with_user_controller<U: UserController + 'static>(mut self, user_controller: U) -> Self {
        self.user_controller = Box::new(user_controller);
        self
    }
    /// Registers a module with its declared dependencies (other module names that must reach
    /// `Operational` before this module may `start`). `description` is an optional human-readable
    /// label surfaced only in diagnostics, never consulted for control flow. Must be called
    /// before [`Self::run`]; duplicate names are fatal.
    pub fn register_module<M: ModuleControl + 'static>(
        &mut self,
        name: &str,
        description: Option<&str>,
        dependencies: Vec<String>,
        module: M,
    ) -> Result<()> {
        if self.running {
            return Err(Error::AlreadyRunning);
        }
        if name.is_empty() || self.modules.iter().any(|m| &*m.name == name) {
            return Err(Error::DuplicateModule(name.to_owned()));
        }
        let executor = ModuleExecutor::new(
            self.scheduler.clone(),
            name,
            dependencies.clone(),
            self.config.default_task_budget(),
        );
        let context = ModuleContext::new(name.into(), executor, self.events_tx.clone());
        self.modules.push(ModuleEntry {
            name: name.into(),
            description: description.map(ToOwned::to_owned),
            dependencies,
            module: Box::new(module),
            context,
            state: ModuleState::NotInitialized,
            starting_checks: 0,
        });
        Ok(())
    }
    fn index_of(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| &*m.name == name)
    }
    fn topological_order(&self) -> Result<Vec<usize>> {
        let n = self.modules.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, m) in self.modules.iter().enumerate() {
            for dep in &m.dependencies {
                let di = self
                    .index_of(dep)
                    .ok_or_else(|| Error::UnknownDependency(m.name.to_string(), dep.clone()))?;
                dependents[di].push(i);
                in_degree[i] += 1;
            }
        }
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &next in &dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        if order.len() != n {
            let stuck = (0..n).find(|&i| in_degree[i] > 0).expect("short order implies a stuck node");
            return Err(Error::DependencyCycle(self.modules[stuck].name.to_string()));
        }
        Ok(order)
    }
    fn deps_operational(&self, idx: usize) -> bool {
        self.modules[idx].dependencies.iter().all(|d| {
            self.index_of(d)
                .map(|i| self.modules[i].state == ModuleState::Operational)
                .unwrap_or(false)
        })
    }
    fn all_operational(&self) -> bool {
        self.modules.iter().all(|m| m.state == ModuleState::Operational)
    }
    fn activate_cross_links(&mut self, idx: usize) {
        let name = self.modules[idx].name.clone();
        let deps = self.modules[idx].dependencies.clone();
        for other in 0..self.modules.len() {
            if other != idx
                && self.modules[other].state == ModuleState::Operational
                && self.modules[other].dependencies.iter().any(|d| d.as_str() == &*name)
            {
                self.modules[other].module.start_event_handler_for_module(&name);
            }
        }
        for dep in &deps {
            if let Some(di) = self.index_of(dep) {
                if self.modules[di].state == ModuleState::Operational {
                    self.modules[idx].module.start_event_handler_for_module(dep);
                }
            }
        }
    }
    fn mark_operational(&mut self, idx: usize, admit_tasks: bool) {
        if admit_tasks {
            self.modules[idx].context.module_executor().mark_started();
        }
        self.modules[idx].state = ModuleState::Operational;
        self.activate_cross_links(idx);
    }
    fn report_error(&mut self, module: &str, error: Error, critical: bool) -> Option<Error> {
        let idx = self.index_of(module);
        if let Some(idx) = idx {
            if let Some(description) = self.modules[idx].description.as_deref() {
                tracing::debug!(module, description, "reporting error for module");
            }
        }
        self.user_controller.on_error(&error, module, critical);
        if critical {
            self.shutdown.store(true, Ordering::Release);
            Some(error)
        } else {
            if let Some(idx) = idx {
                let ctx = self.modules[idx].context.clone();
                self.modules[idx].module.on_error(&ctx, error);
            }
            None
        }
    }
    #[cfg(unix)]
    fn spawn_signal_thread(&self) -> Result<()> {
        use signal_hook::iterator::Signals;
        let signal_ids = self
            .config
            .shutdown_signals
            .iter()
            .map(|s| signal_by_name(s))
            .collect::<Result<Vec<_>>>()?;
        let shutdown = self.shutdown.clone();
        let mut signals = match Signals::new(signal_ids) {
            Ok(signals) => signals,
            Err(e) => {
                tracing::warn!(error = %e, "unable to register shutdown signal handlers");
                return Ok(());
            }
        };
        crate::thread_rt::spawn("vaf-signals", None, move || {
            if signals.forever().next().is_some() {
                shutdown.store(true, Ordering::Release);
            }
        })
        .map(|_| ())
        .map_err(Error::from)
    }
    #[cfg(not(unix))]
    fn spawn_signal_thread(&self) -> Result<()> {
        Ok(())
    }
    /// Boots the controller: Initialize, Start, Operate, then shutdown. Returns once the
    /// operational lifecycle ends, either because a shutdown signal arrived or because a critical
    /// error was reported; a critical error is surfaced as `Err`. `running` (and therefore
    /// [`Self::register_module`]'s availability) is restored on every exit path, including a
    /// dependency-graph failure discovered before a single module has started.
    pub fn run(&mut self) -> Result<()> {
        self.running = true;
        let outcome = self.run_inner();
        self.running = false;
        outcome
    }
    fn run_inner(&mut self) -> Result<()> {
        let (order, mut critical_error) = self.initialize_phase();
        if critical_error.is_none() {
            critical_error = self.spawn_signal_thread().err();
        }
        if critical_error.is_none() {
            critical_error = self.scheduler.start(None).err().map(Error::from);
        }
        if critical_error.is_none() {
            critical_error = self.start_phase(&order);
        }
        if critical_error.is_none() {
            critical_error = self.operate_phase();
        }
        self.shutdown_phase(&order);

        match critical_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
    /// Runs `pre_initialize`, verifies the dependency graph, then `init`s every module in
    /// dependency order, all inside the `pre_initialize`/`post_initialize` bracket. A graph error
    /// (unknown dependency or cycle) is reported exactly like an `init` failure: critical, via
    /// [`Self::report_error`], with no modules to unwind.
    fn initialize_phase(&mut self) -> (Vec<usize>, Option<Error>) {
        self.user_controller.pre_initialize();
        let order = match self.topological_order() {
            Ok(order) => order,
            Err(e) => {
                let culprit = match &e {
                    Error::UnknownDependency(m, _) => m.clone(),
                    Error::DependencyCycle(m) => m.clone(),
                    _ => String::new(),
                };
                let failure = self.report_error(&culprit, e, true);
                self.user_controller.post_initialize();
                return (Vec::new(), failure);
            }
        };
        let mut initialized = Vec::new();
        let mut failure = None;
        for &idx in &order {
            let ctx = self.modules[idx].context.clone();
            match self.modules[idx].module.init(&ctx) {
                Ok(()) => {
                    self.modules[idx].state = ModuleState::NotOperational;
                    initialized.push(idx);
                }
                Err(e) => {
                    let name = self.modules[idx].name.to_string();
                    failure = self.report_error(&name, e, true);
                    break;
                }
            }
        }
        if failure.is_some() {
            for idx in initialized.into_iter().rev() {
                let ctx = self.modules[idx].context.clone();
                self.modules[idx].module.deinit(&ctx);
                self.modules[idx].state = ModuleState::Shutdown;
            }
        }
        self.user_controller.post_initialize();
        (order, failure)
    }
    fn start_phase(&mut self, order: &[usize]) -> Option<Error> {
        self.user_controller.pre_start();
        while !self.shutdown.load(Ordering::Acquire) && !self.all_operational() {
            for &idx in order {
                if self.modules[idx].state == ModuleState::NotOperational && self.deps_operational(idx) {
                    let ctx = self.modules[idx].context.clone();
                    self.modules[idx].state = ModuleState::Starting;
                    self.modules[idx].starting_checks = 0;
                    if let Err(e) = self.modules[idx].module.start(&ctx) {
                        let name = self.modules[idx].name.to_string();
                        if let Some(err) = self.report_error(&name, e, true) {
                            return Some(err);
                        }
                    }
                }
            }
            match self.events_rx.recv_timeout(self.config.poll_interval()) {
                Ok(ModuleEvent::Operational(name)) => {
                    if let Some(idx) = self.index_of(&name) {
                        self.mark_operational(idx, true);
                    }
                }
                Ok(ModuleEvent::SkipStarting(name)) => {
                    if let Some(idx) = self.index_of(&name) {
                        self.mark_operational(idx, false);
                    }
                }
                Ok(ModuleEvent::Error { module, error, critical }) => {
                    if let Some(err) = self.report_error(&module, error, critical) {
                        return Some(err);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(err) = self.check_starting_stall() {
                        return Some(err);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if !self.shutdown.load(Ordering::Acquire) {
            self.user_controller.post_start();
        }
        None
    }
    fn check_starting_stall(&mut self) -> Option<Error> {
        let stalled: Vec<usize> = self
            .modules
            .iter_mut()
            .enumerate()
            .filter_map(|(i, m)| {
                if m.state == ModuleState::Starting {
                    m.starting_checks += 1;
                    (m.starting_checks > self.config.starting_stall_checks).then_some(i)
                } else {
                    None
                }
            })
            .collect();
        for idx in stalled {
            let name = self.modules[idx].name.to_string();
            let error = Error::StartingStall(name.clone());
            if let Some(err) = self.report_error(&name, error, true) {
                return Some(err);
            }
        }
        None
    }
    fn operate_phase(&mut self) -> Option<Error> {
        while !self.shutdown.load(Ordering::Acquire) {
            match self.events_rx.recv_timeout(self.config.poll_interval()) {
                Ok(ModuleEvent::Error { module, error, critical }) => {
                    if let Some(err) = self.report_error(&module, error, critical) {
                        return Some(err);
                    }
                }
                Ok(ModuleEvent::Operational(_) | ModuleEvent::SkipStarting(_)) => {
                    tracing::warn!("module reported a starting-phase transition after becoming operational");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        None
    }
    fn shutdown_phase(&mut self, order: &[usize]) {
        self.user_controller.pre_shutdown();
        self.scheduler.shutdown();
        for &idx in order.iter().rev() {
            if matches!(self.modules[idx].state, ModuleState::Shutdown | ModuleState::NotInitialized) {
                continue;
            }
            let ctx = self.modules[idx].context.clone();
            self.modules[idx].context.module_executor().pause();
            self.modules[idx].module.stop(&ctx);
            self.modules[idx].module.deinit(&ctx);
            self.modules[idx].state = ModuleState::Shutdown;
        }
        self.user_controller.post_shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Leaf {
        started: Arc<AtomicUsize>,
    }
    impl ModuleControl for Leaf {
        fn init(&mut self, _ctx: &ModuleContext) -> Result<()> {
            Ok(())
        }
        fn start(&mut self, ctx: &ModuleContext) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            ctx.report_operational();
            Ok(())
        }
        fn stop(&mut self, _ctx: &ModuleContext) {}
        fn deinit(&mut self, _ctx: &ModuleContext) {}
        fn on_error(&mut self, _ctx: &ModuleContext, _error: Error) {}
    }

    struct Dependent {
        saw_active: Arc<AtomicBool>,
    }
    impl ModuleControl for Dependent {
        fn init(&mut self, _ctx: &ModuleContext) -> Result<()> {
            Ok(())
        }
        fn start(&mut self, ctx: &ModuleContext) -> Result<()> {
            ctx.report_operational();
            Ok(())
        }
        fn stop(&mut self, _ctx: &ModuleContext) {}
        fn deinit(&mut self, _ctx: &ModuleContext) {}
        fn on_error(&mut self, _ctx: &ModuleContext, _error: Error) {}
        fn start_event_handler_for_module(&self, module: &str) {
            if module == "leaf" {
                self.saw_active.store(true, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_dependency_ordered_start_and_cross_link() {
        let mut config = RuntimeConfig::default();
        config.poll_interval_ms = 1;
        let mut controller = ExecutableController::new(config);
        let started = Arc::new(AtomicUsize::new(0));
        let saw_active = Arc::new(AtomicBool::new(false));
        controller
            .register_module(
                "leaf",
                None,
                vec![],
                Leaf {
                    started: started.clone(),
                },
            )
            .unwrap();
        controller
            .register_module(
                "dependent",
                None,
                vec!["leaf".to_owned()],
                Dependent {
                    saw_active: saw_active.clone(),
                },
            )
            .unwrap();
        let shutdown = controller.shutdown.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            shutdown.store(true, Ordering::Release);
        });
        controller.run().unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(saw_active.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut controller = ExecutableController::new(RuntimeConfig::default());
        controller
            .register_module(
                "dependent",
                None,
                vec!["missing".to_owned()],
                Leaf {
                    started: Arc::new(AtomicUsize::new(0)),
                },
            )
            .unwrap();
        assert!(matches!(controller.run(), Err(Error::UnknownDependency(_, _))));
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let mut controller = ExecutableController::new(RuntimeConfig::default());
        controller
            .register_module(
                "m",
                None,
                vec![],
                Leaf {
                    started: Arc::new(AtomicUsize::new(0)),
                },
            )
            .unwrap();
        let result = controller.register_module(
            "m",
            None,
            vec![],
            Leaf {
                started: Arc::new(AtomicUsize::new(0)),
            },
        );
        assert!(matches!(result, Err(Error::DuplicateModule(_))));
    }

    #[test]
    fn test_starting_stall_detected() {
        struct NeverStarts;
        impl ModuleControl for NeverStarts {
            fn init(&mut self, _ctx: &ModuleContext) -> Result<()> {
                Ok(())
            }
            fn start(&mut self, _ctx: &ModuleContext) -> Result<()> {
                Ok(())
            }
            fn stop(&mut self, _ctx: &ModuleContext) {}
            fn deinit(&mut self, _ctx: &ModuleContext) {}
            fn on_error(&mut self, _ctx: &ModuleContext, _error: Error) {}
        }
        let mut config = RuntimeConfig::default();
        config.poll_interval_ms = 1;
        config.starting_stall_checks = 2;
        let mut controller = ExecutableController::new(config);
        controller.register_module("stuck", None, vec![], NeverStarts).unwrap();
        let result = controller.run();
        assert!(matches!(result, Err(Error::StartingStall(_))));
    }
}
