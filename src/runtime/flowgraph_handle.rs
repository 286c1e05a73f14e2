use futures::channel::mpsc::Sender;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::runtime::BlockId;
use crate::runtime::BlockMessage;
use crate::runtime::BlockPortCtx;
use crate::runtime::Error;
use crate::runtime::Pmt;
use crate::runtime::PortId;
use crate::runtime::scheduler::Notify;

/// Inbox of a running block.
pub(crate) struct Inbox {
    pub(crate) name: String,
    pub(crate) sender: Sender<BlockMessage>,
    pub(crate) notify: Notify,
    pub(crate) ports: Vec<String>,
}

/// State shared between a [`RunningFlowgraph`](crate::runtime::RunningFlowgraph), its
/// partition runners and all [`FlowgraphHandle`]s.
#[derive(Default)]
pub(crate) struct Control {
    stop: AtomicBool,
    pause: AtomicBool,
    notifies: Mutex<Vec<Notify>>,
    inboxes: Mutex<HashMap<BlockId, Inbox>>,
}

impl Control {
    pub(crate) fn new() -> Arc<Control> {
        Arc::new(Control::default())
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn paused(&self) -> bool {
        self.pause.load(Ordering::Acquire)
    }

    pub(crate) fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake_all();
    }

    pub(crate) fn pause(&self) {
        self.pause.store(true, Ordering::Release);
        self.wake_all();
    }

    pub(crate) fn resume(&self) {
        self.pause.store(false, Ordering::Release);
    }

    /// Replace the runners and inboxes of the previous launch.
    pub(crate) fn register(&self, notifies: Vec<Notify>, inboxes: HashMap<BlockId, Inbox>) {
        *lock(&self.notifies) = notifies;
        *lock(&self.inboxes) = inboxes;
    }

    pub(crate) fn clear(&self) {
        self.register(Vec::new(), HashMap::new());
    }

    fn wake_all(&self) {
        for n in lock(&self.notifies).iter() {
            n.notify();
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to interact with a running [`Flowgraph`](crate::runtime::Flowgraph)
///
/// Handles are cheap to clone and can be sent to other threads.
#[derive(Clone)]
pub struct FlowgraphHandle {
    control: Arc<Control>,
}

impl PartialEq for FlowgraphHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.control, &other.control)
    }
}

impl fmt::Debug for FlowgraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowgraphHandle")
            .field("stopped", &self.control.stopped())
            .finish()
    }
}

impl FlowgraphHandle {
    pub(crate) fn new(control: Arc<Control>) -> FlowgraphHandle {
        FlowgraphHandle { control }
    }

    /// Ask all partitions to exit after their current `work` call. Does not block.
    pub fn stop(&self) {
        if !self.control.stopped() {
            info!("stopping flowgraph");
        }
        self.control.stop();
    }

    /// Whether [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.control.stopped()
    }

    /// Send a message to a message input of a running block.
    pub fn post(&self, block: BlockId, port: impl Into<PortId>, data: Pmt) -> Result<(), Error> {
        let port = port.into();
        let mut inboxes = lock(&self.control.inboxes);
        let inbox = inboxes.get_mut(&block).ok_or(Error::InvalidBlock(block))?;
        let port_id = match &port {
            PortId::Index(i) if *i < inbox.ports.len() => *i,
            PortId::Name(n) => inbox
                .ports
                .iter()
                .position(|p| p == n)
                .ok_or_else(|| Error::InvalidMessagePort(BlockPortCtx::Id(block), port.clone()))?,
            PortId::Index(_) => {
                return Err(Error::InvalidMessagePort(BlockPortCtx::Id(block), port));
            }
        };
        inbox
            .sender
            .try_send(BlockMessage::Call { port_id, data })
            .map_err(|e| {
                if e.is_full() {
                    Error::ChannelFull(inbox.name.clone())
                } else {
                    Error::InvalidBlock(block)
                }
            })?;
        inbox.notify.notify();
        Ok(())
    }
}
