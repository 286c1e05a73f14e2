use serde::Deserialize;
use serde::Serialize;

/// Serializable view of a flowgraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowgraphDescription {
    /// Leaf and composite blocks in id order.
    pub blocks: Vec<BlockDescription>,
    /// `(src, src_port, dst, dst_port)`
    pub stream_edges: Vec<(usize, usize, usize, usize)>,
    /// `(src, src_port, dst, dst_port)`
    pub message_edges: Vec<(usize, usize, usize, usize)>,
}

/// Serializable view of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescription {
    /// Block id.
    pub id: usize,
    /// Type name.
    pub type_name: String,
    /// Unique instance name.
    pub instance_name: String,
    /// Stream input names.
    pub stream_inputs: Vec<String>,
    /// Stream output names.
    pub stream_outputs: Vec<String>,
    /// Message input names.
    pub message_inputs: Vec<String>,
    /// Message output names.
    pub message_outputs: Vec<String>,
    /// Enabled flag.
    pub enabled: bool,
    /// Hierarchical block that is not flattened yet.
    pub composite: bool,
}
