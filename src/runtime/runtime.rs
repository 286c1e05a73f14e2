use futures::StreamExt;
use futures::channel::mpsc;
use futures::executor::block_on;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread;

use crate::runtime::Error;
use crate::runtime::Flowgraph;
use crate::runtime::FlowgraphHandle;
use crate::runtime::FlowgraphMessage;
use crate::runtime::config::Config;
use crate::runtime::flowgraph_handle::Control;
use crate::runtime::flowgraph_handle::Inbox;
use crate::runtime::logging;
use crate::runtime::scheduler::Notify;
use crate::runtime::scheduler::PartitionExit;
use crate::runtime::scheduler::PartitionRunner;
use crate::runtime::scheduler::Scheduler;
use crate::runtime::scheduler::ThreadScheduler;

/// This is the [`Runtime`] that runs a [`Flowgraph`] to completion.
///
/// [`Runtime`]s are generic over the scheduler used to run the partitions of a [`Flowgraph`].
/// The configuration is passed explicitly, so independent runtimes can coexist in one process.
pub struct Runtime<S = ThreadScheduler> {
    scheduler: S,
    config: Config,
}

impl Runtime<ThreadScheduler> {
    /// Constructs a new [`Runtime`] with the configuration from files and environment.
    pub fn new() -> Self {
        Runtime::with_config(Config::load())
    }

    /// Constructs a new [`Runtime`] with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let scheduler = ThreadScheduler::with_stack_size(config.stack_size);
        Runtime::with_scheduler(scheduler, config)
    }
}

impl Default for Runtime<ThreadScheduler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scheduler> Runtime<S> {
    /// Create a [`Runtime`] with a given [`Scheduler`]
    pub fn with_scheduler(scheduler: S, config: Config) -> Self {
        logging::init(&config);
        Runtime { scheduler, config }
    }

    /// Configuration used for commits and partition runners.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The scheduler that runs partitions.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Commit the [`Flowgraph`] and start one runner per partition.
    ///
    /// Does not block. If the flowgraph cannot be committed, it is dropped with the error.
    /// Call [`Flowgraph::commit`] with [`Runtime::config`] beforehand to keep it on failure.
    pub fn start(&self, fg: Flowgraph) -> Result<RunningFlowgraph<S>, Error> {
        let mut running = RunningFlowgraph {
            fg: Some(fg),
            scheduler: self.scheduler.clone(),
            config: self.config.clone(),
            control: Control::new(),
            inbox: None,
            workers: Vec::new(),
            running: 0,
            error: None,
            locked: false,
        };
        running.launch()?;
        Ok(running)
    }

    /// Main method that kicks off the execution of a [`Flowgraph`] and waits for it to
    /// terminate.
    pub fn run(&self, fg: Flowgraph) -> Result<Flowgraph, Error> {
        self.start(fg)?.wait()
    }

    /// Awaitable version of [`Runtime::run`].
    pub async fn run_async(&self, fg: Flowgraph) -> Result<Flowgraph, Error> {
        self.start(fg)?.wait_async().await
    }
}

impl<S: fmt::Debug> fmt::Debug for Runtime<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .finish()
    }
}

/// A started [`Flowgraph`].
///
/// Dropping it stops the flowgraph and waits for all partitions to exit.
pub struct RunningFlowgraph<S: Scheduler = ThreadScheduler> {
    fg: Option<Flowgraph>,
    scheduler: S,
    config: Config,
    control: Arc<Control>,
    inbox: Option<mpsc::Receiver<FlowgraphMessage>>,
    workers: Vec<thread::JoinHandle<()>>,
    running: usize,
    error: Option<Error>,
    locked: bool,
}

impl<S: Scheduler> RunningFlowgraph<S> {
    /// Handle to stop the flowgraph or post messages from other threads.
    pub fn handle(&self) -> FlowgraphHandle {
        FlowgraphHandle::new(self.control.clone())
    }

    /// Ask all partitions to exit after their current `work` call. Does not block.
    pub fn stop(&self) {
        self.handle().stop();
    }

    /// Wait until all partitions exited and return the flowgraph.
    ///
    /// If a block failed, the first error is returned. Partitions that did not fail are run to
    /// completion (or until stopped) before.
    pub fn wait(self) -> Result<Flowgraph, Error> {
        block_on(self.wait_async())
    }

    /// Awaitable version of [`RunningFlowgraph::wait`].
    pub async fn wait_async(mut self) -> Result<Flowgraph, Error> {
        self.collect().await;
        self.control.clear();
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.fg
            .take()
            .ok_or_else(|| Error::RuntimeError("flowgraph already taken".to_string()))
    }

    /// Pause all partitions and return the flowgraph for editing.
    ///
    /// When this returns, no block is inside `work`. Blocks are de-initialized and initialized
    /// again on [`unlock`](RunningFlowgraph::unlock).
    pub fn lock(&mut self) -> Result<&mut Flowgraph, Error> {
        info!("locking flowgraph");
        self.control.pause();
        block_on(self.collect());
        self.locked = true;
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.fg
            .as_mut()
            .ok_or_else(|| Error::RuntimeError("flowgraph already taken".to_string()))
    }

    /// Commit the edited flowgraph and resume scheduling.
    ///
    /// On error, the flowgraph stays locked and can be fixed and unlocked again.
    pub fn unlock(&mut self) -> Result<(), Error> {
        if !self.locked {
            return Err(Error::InvalidState("flowgraph is not locked".to_string()));
        }
        if self.control.stopped() {
            self.locked = false;
            return Ok(());
        }
        info!("unlocking flowgraph");
        self.launch()?;
        self.locked = false;
        Ok(())
    }

    /// Number of partitions that did not exit yet.
    pub fn running_partitions(&self) -> usize {
        self.running
    }

    fn launch(&mut self) -> Result<(), Error> {
        let fg = self
            .fg
            .as_mut()
            .ok_or_else(|| Error::RuntimeError("flowgraph already taken".to_string()))?;
        fg.commit(&self.config)?;
        fg.prepare_run();
        let partitions = fg.partitions().map(|p| p.to_vec()).unwrap_or_default();

        let (tx, rx) = mpsc::channel(partitions.len().max(1));
        self.inbox = Some(rx);
        self.control.resume();

        let mut runners = Vec::new();
        let mut notifies = Vec::new();
        let mut inboxes = HashMap::new();
        for (index, ids) in partitions.iter().enumerate() {
            let notify = Notify::new();
            let mut blocks = Vec::with_capacity(ids.len());
            for id in ids.iter() {
                let block = fg.topology.take_block(*id).ok_or(Error::InvalidBlock(*id))?;
                if let Some(sender) = block.inbox() {
                    inboxes.insert(
                        *id,
                        Inbox {
                            name: block.instance_name().unwrap_or_default().to_string(),
                            sender,
                            notify: notify.clone(),
                            ports: block.mio().inputs().iter().map(|i| i.name().to_string()).collect(),
                        },
                    );
                }
                blocks.push((*id, block));
            }
            notifies.push(notify.clone());
            runners.push(PartitionRunner::new(
                index,
                blocks,
                self.control.clone(),
                notify,
                tx.clone(),
                self.config.idle_timeout,
            ));
        }
        drop(tx);
        self.control.register(notifies, inboxes);

        info!("starting {} partitions", runners.len());
        let mut pending = runners.into_iter();
        while let Some(runner) = pending.next() {
            match self.scheduler.run_partition(runner) {
                Ok(handle) => {
                    self.workers.push(handle);
                    self.running += 1;
                }
                Err(e) => {
                    error!("{}", e);
                    // the failed and the unstarted runners hand their blocks back on drop
                    self.running += 1 + pending.len();
                    drop(pending);
                    self.control.pause();
                    block_on(self.collect());
                    self.error = None;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Receive the exit of every running partition and put its blocks back.
    async fn collect(&mut self) {
        while self.running > 0 {
            let Some(inbox) = self.inbox.as_mut() else {
                break;
            };
            match inbox.next().await {
                Some(FlowgraphMessage::PartitionExit {
                    partition,
                    blocks,
                    result,
                }) => {
                    self.running -= 1;
                    if let Some(fg) = self.fg.as_mut() {
                        for (id, block) in blocks {
                            fg.topology.put_block(id, block);
                        }
                    }
                    match result {
                        Ok(PartitionExit::Finished) => debug!("partition {} finished", partition),
                        Ok(exit) => debug!("partition {} exited: {:?}", partition, exit),
                        Err(e) => {
                            if self.error.is_none() {
                                self.error = Some(e);
                            }
                        }
                    }
                }
                None => {
                    warn!("{} partitions exited without returning their blocks", self.running);
                    if self.error.is_none() {
                        self.error = Some(Error::RuntimeError(
                            "partition exited without returning its blocks".to_string(),
                        ));
                    }
                    self.running = 0;
                }
            }
        }
        self.inbox = None;
        for w in self.workers.drain(..) {
            if w.join().is_err() {
                warn!("partition thread panicked");
            }
        }
    }
}

impl<S: Scheduler> Drop for RunningFlowgraph<S> {
    fn drop(&mut self) {
        if self.running > 0 {
            debug!("running flowgraph dropped, stopping");
            self.control.stop();
            block_on(self.collect());
        }
    }
}

impl<S: Scheduler> fmt::Debug for RunningFlowgraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningFlowgraph")
            .field("running", &self.running)
            .field("locked", &self.locked)
            .finish()
    }
}
