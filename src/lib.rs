#![ doc = include_str!( concat!( env!( "CARGO_MANIFEST_DIR" ), "/", "README.md" ) ) ]
#![deny(missing_docs)]
use std::env;
use std::io::Write;

use colored::Colorize as _;

pub use log::LevelFilter;
pub use rtsc::locking;

/// Monotonic interval/duration helpers used by the scheduler's tick loop
pub mod time;

/// Result type, error taxonomy
pub mod error;
/// Single-assignment future/promise handoff
pub mod future;
/// Owned-value handles: move-only mutable, cloneable shared-reader
pub mod handle;
/// Immutable per-task description plus the scheduler-owned active flag
pub mod task;
/// Real-time thread spawning for the runtime's fixed threads
pub mod thread_rt;
/// The periodic scheduler: tick thread, ordered task list, budgets
pub mod scheduler;
/// Per-module facade over the scheduler
pub mod executor;
/// Provider/consumer contract for data elements and operations
pub mod contract;
/// Concrete in-process channel and operation types
pub mod channel;
/// Module control interface and lifecycle state machine
pub mod lifecycle;
/// Executable controller: registry, lifecycle orchestration, signal handling
pub mod controller;
/// Optional user-controller hooks
pub mod hooks;
/// Runtime configuration
pub mod config;

pub use error::{Error, Result};

/// Prefix on a [`fatal`] panic's message. The scheduler's per-task `catch_unwind` checks for it to
/// tell a programming-error abort apart from an ordinary task exception, so it can re-unwind
/// instead of downgrading it to a reported error.
pub(crate) const FATAL_PANIC_PREFIX: &str = "vaf-rt fatal: ";

/// Logs a fatal diagnostic and panics. Used for programming errors the source contract calls
/// "abort": an empty owned-handle dereference, a promise set twice, or a future read through
/// [`future::Future::get`] after resolving to an error. Raised from inside a task body, this
/// still aborts the process instead of being caught and reported like a task's own exception —
/// see `scheduler::run_tick`.
pub(crate) fn fatal(msg: &str) -> ! {
    tracing::error!("{msg}");
    eprintln!("{}", msg.red().bold());
    panic!("{FATAL_PANIC_PREFIX}{msg}");
}

/// Returns true if started in production mode (as a systemd unit)
pub fn is_production() -> bool {
    env::var("INVOCATION_ID").map_or(false, |v| !v.is_empty())
}

/// Configures stdout logging with the given filter. If started in production mode, timestamps are
/// omitted (systemd's journal already timestamps each line).
pub fn configure_logger(filter: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stdout);
    builder.filter_level(filter);
    if is_production() {
        builder.format(|buf, record| writeln!(buf, "{} {}", record.level(), record.args()));
    }
    builder.init();
}

/// A process-wide guard bounding the lifetime of the runtime's global state (the log sink).
/// Construct one before building the [`controller::ExecutableController`] and let it drop after
/// the controller has finished running, favouring explicit construction order over static
/// initialization.
pub struct Runtime {
    _private: (),
}

impl Runtime {
    /// Configures the logger and returns a guard scoping its lifetime to this value's lifetime.
    pub fn init(filter: LevelFilter) -> Self {
        configure_logger(filter);
        Self { _private: () }
    }
}

/// Prelude module
pub mod prelude {
    pub use crate::channel::{Channel, Operation};
    pub use crate::config::RuntimeConfig;
    pub use crate::contract::{Consumer, OperationConsumer, OperationProvider, Provider};
    pub use crate::controller::ExecutableController;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::future::{Future, Promise};
    pub use crate::handle::{Owned, Shared};
    pub use crate::hooks::UserController;
    pub use crate::lifecycle::{ModuleContext, ModuleControl, ModuleState};
    pub use crate::Runtime;
    pub use std::time::Duration;
}
