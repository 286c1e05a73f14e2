//! Schedulers
//!
//! A scheduler decides where the [`PartitionRunner`]s of a flowgraph execute. Every runner
//! drives the blocks of one partition and blocks its thread until the partition exits.
use std::thread;

use crate::runtime::Error;

mod notify;
pub(crate) use notify::Notify;

mod partition;
pub use partition::PartitionExit;
pub use partition::PartitionRunner;

/// Scheduler trait
///
/// This has to be implemented for every scheduler.
pub trait Scheduler: Clone + Send + Sync + 'static {
    /// Execute a partition of a [`Flowgraph`](crate::runtime::Flowgraph).
    ///
    /// Implementations call [`PartitionRunner::run`] on a dedicated thread. On error, the runner
    /// must be dropped, which returns its blocks to the flowgraph.
    fn run_partition(&self, runner: PartitionRunner) -> Result<thread::JoinHandle<()>, Error>;
}

/// Thread-per-partition scheduler
///
/// Spawns one OS thread per partition.
#[derive(Debug, Clone, Default)]
pub struct ThreadScheduler {
    stack_size: Option<usize>,
}

impl ThreadScheduler {
    /// Create scheduler with the default stack size of the platform
    pub fn new() -> ThreadScheduler {
        ThreadScheduler::default()
    }

    /// Create scheduler with the given stack size for partition threads
    pub fn with_stack_size(stack_size: usize) -> ThreadScheduler {
        ThreadScheduler {
            stack_size: Some(stack_size),
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn run_partition(&self, runner: PartitionRunner) -> Result<thread::JoinHandle<()>, Error> {
        let index = runner.index();
        let mut builder = thread::Builder::new().name(format!("sdrflow-partition-{index}"));
        if let Some(s) = self.stack_size {
            builder = builder.stack_size(s);
        }
        builder
            .spawn(move || runner.run())
            .map_err(|e| Error::RuntimeError(format!("cannot spawn thread for partition {index}: {e}")))
    }
}
