//! ## Streaming Dataflow Runtime
//!
//! A [`Flowgraph`] owns blocks and the connections between them. The [`Runtime`] commits it,
//! which validates the graph, allocates one circular buffer per connected stream output and
//! splits the active blocks into partitions, i.e., weakly connected components. Every partition
//! is driven by its own thread.
use futures::channel::mpsc;
use thiserror::Error;

mod allocations;
mod block;
mod block_meta;
pub mod buffer;
pub mod config;
mod description;
mod flowgraph;
mod flowgraph_handle;
mod hier_block;
mod ids;
mod kernel;
mod logging;
pub mod message_io;
mod mocker;
mod pmt;
#[allow(clippy::module_inception)]
mod runtime;
pub mod scheduler;
pub mod stream_io;
mod topology;
mod work_io;

pub use allocations::AllocationCounters;
pub use allocations::Allocations;
pub use block::Block;
pub use block::BlockDetail;
pub use block_meta::BlockMeta;
pub use block_meta::BlockMetaBuilder;
pub use config::Config;
pub use description::BlockDescription;
pub use description::FlowgraphDescription;
pub use flowgraph::Flowgraph;
pub use flowgraph::GraphState;
pub use flowgraph_handle::FlowgraphHandle;
pub use hier_block::HierBlock;
pub use ids::BlockId;
pub use ids::BlockPortCtx;
pub use ids::Endpoint;
pub use ids::PortDirection;
pub use ids::PortId;
pub use kernel::Kernel;
pub use message_io::MessageInput;
pub use message_io::MessageIo;
pub use message_io::MessageIoBuilder;
pub use message_io::MessageOutput;
pub use mocker::Mocker;
pub use pmt::Pmt;
pub use pmt::PmtKind;
pub use runtime::RunningFlowgraph;
pub use runtime::Runtime;
pub use stream_io::IoSignature;
pub use stream_io::StreamInput;
pub use stream_io::StreamIo;
pub use stream_io::StreamIoBuilder;
pub use stream_io::StreamOutput;
pub use topology::MessageEdge;
pub use topology::Node;
pub use topology::StreamEdge;
pub use topology::Topology;
pub use work_io::WorkIo;

/// Initialize logging with the given configuration.
///
/// [`Runtime::new`] does this already. Calling it more than once is harmless.
pub fn init(config: &Config) {
    logging::init(config);
}

/// Message to a block inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockMessage {
    /// Call the handler of message input `port_id`
    Call {
        /// Message input
        port_id: usize,
        /// Payload
        data: Pmt,
    },
}

/// Message from a partition runner to the [`RunningFlowgraph`].
#[derive(Debug)]
pub(crate) enum FlowgraphMessage {
    PartitionExit {
        partition: usize,
        blocks: Vec<(BlockId, Block)>,
        result: Result<scheduler::PartitionExit>,
    },
}

pub(crate) type FlowgraphInbox = mpsc::Sender<FlowgraphMessage>;

/// Runtime error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The stream edges contain a cycle.
    #[error("Flowgraph is not a DAG, cycle through {name} ({block})")]
    NotDag {
        /// Block on the cycle
        block: BlockId,
        /// Its instance name
        name: String,
    },
    /// Item sizes of connected ports differ.
    #[error("Item size mismatch: {src} produces {src_size} byte items, {dst} expects {dst_size}")]
    PortType {
        /// Output
        src: String,
        /// Item size of output
        src_size: usize,
        /// Input
        dst: String,
        /// Item size of input
        dst_size: usize,
    },
    /// Stream input already has a writer.
    #[error("Stream input {block}.{port} is already connected")]
    PortInUse {
        /// Block
        block: String,
        /// Input
        port: String,
    },
    /// Required stream port without connection.
    #[error("Stream {direction} {block}.{port} is not connected")]
    UnconnectedPort {
        /// Block
        block: String,
        /// Port
        port: String,
        /// Input or output
        direction: PortDirection,
    },
    /// Block does not exist.
    #[error("Block {0} does not exist")]
    InvalidBlock(BlockId),
    /// Stream port does not exist.
    #[error("Block {0} has no stream port {1}")]
    InvalidStreamPort(BlockPortCtx, PortId),
    /// Message port does not exist.
    #[error("Block {0} has no message port {1}")]
    InvalidMessagePort(BlockPortCtx, PortId),
    /// Edge to disconnect does not exist.
    #[error("Not connected: {0}")]
    NotConnected(String),
    /// Buffer memory could not be reserved.
    #[error("Could not allocate {bytes} bytes for the buffer of {port}")]
    BufferAllocation {
        /// Output
        port: String,
        /// Requested size
        bytes: usize,
    },
    /// Buffer is smaller than what the connected ports need per call.
    #[error("Buffer of {port} holds {capacity} items, but {required} are needed per call")]
    BufferSizing {
        /// Output
        port: String,
        /// Capacity in items
        capacity: usize,
        /// Largest minimum item count of the connected ports
        required: usize,
    },
    /// Operation not allowed in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Kernel returned an error.
    #[error("Block {block} failed: {message}")]
    BlockError {
        /// Block
        block: String,
        /// Error of the kernel
        message: String,
    },
    /// Partition runner panicked.
    #[error("Partition {partition} panicked: {message}")]
    PartitionPanic {
        /// Partition index
        partition: usize,
        /// Panic payload
        message: String,
    },
    /// Inbox of a message receiver is full.
    #[error("Inbox full, message on {0} dropped")]
    ChannelFull(String),
    /// Runtime internal error.
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

/// Runtime result
pub type Result<T, E = Error> = std::result::Result<T, E>;
