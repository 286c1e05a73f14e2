use slab::Slab;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::mem;

use crate::runtime::Block;
use crate::runtime::BlockDescription;
use crate::runtime::BlockId;
use crate::runtime::BlockPortCtx;
use crate::runtime::Endpoint;
use crate::runtime::Error;
use crate::runtime::FlowgraphDescription;
use crate::runtime::HierBlock;
use crate::runtime::PortId;
use crate::runtime::buffer::BufferSize;
use crate::runtime::hier_block::Boundary;

/// Resolved stream port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PortInfo {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) item_size: usize,
}

/// Stream edge between two resolved ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamEdge {
    /// Producing block
    pub src: BlockId,
    /// Output index
    pub src_port: usize,
    /// Consuming block
    pub dst: BlockId,
    /// Input index
    pub dst_port: usize,
}

/// Message edge between two resolved ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageEdge {
    /// Posting block
    pub src: BlockId,
    /// Message output index
    pub src_port: usize,
    /// Receiving block
    pub dst: BlockId,
    /// Message input index
    pub dst_port: usize,
}

/// Node of a [`Topology`]: either a leaf block or a composite of further nodes.
#[derive(Debug)]
pub enum Node {
    /// Block with a kernel
    Leaf(Block),
    /// Hierarchical block, expanded into its leaves on commit
    Composite(HierBlock),
}

impl From<Block> for Node {
    fn from(b: Block) -> Self {
        Node::Leaf(b)
    }
}

impl From<HierBlock> for Node {
    fn from(h: HierBlock) -> Self {
        Node::Composite(h)
    }
}

impl Node {
    /// Unique name, assigned when the node is added to a topology.
    pub fn instance_name(&self) -> Option<&str> {
        match self {
            Node::Leaf(b) => b.instance_name(),
            Node::Composite(h) => h.instance_name(),
        }
    }

    /// Rename the node.
    pub fn set_instance_name(&mut self, name: &str) {
        match self {
            Node::Leaf(b) => b.set_instance_name(name),
            Node::Composite(h) => h.set_instance_name(name),
        }
    }

    /// Type name of the block or hierarchical block.
    pub fn type_name(&self) -> &str {
        match self {
            Node::Leaf(b) => b.type_name(),
            Node::Composite(h) => h.type_name(),
        }
    }

    /// The block, if this is a leaf.
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Leaf(b) => Some(b),
            Node::Composite(_) => None,
        }
    }

    /// Mutable block, if this is a leaf.
    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match self {
            Node::Leaf(b) => Some(b),
            Node::Composite(_) => None,
        }
    }

    /// Whether this is a hierarchical block.
    pub fn is_composite(&self) -> bool {
        matches!(self, Node::Composite(_))
    }

    pub(crate) fn stream_input(&self, port: &PortId) -> Option<PortInfo> {
        match self {
            Node::Leaf(b) => {
                let index = match port {
                    PortId::Index(i) => *i,
                    PortId::Name(n) => b.sio().input_name_to_id(n)?,
                };
                let input = b.sio().inputs().get(index)?;
                Some(PortInfo {
                    index,
                    name: input.name().to_string(),
                    item_size: input.item_size(),
                })
            }
            Node::Composite(h) => h.input_port(port),
        }
    }

    pub(crate) fn stream_output(&self, port: &PortId) -> Option<PortInfo> {
        match self {
            Node::Leaf(b) => {
                let index = match port {
                    PortId::Index(i) => *i,
                    PortId::Name(n) => b.sio().output_name_to_id(n)?,
                };
                let output = b.sio().outputs().get(index)?;
                Some(PortInfo {
                    index,
                    name: output.name().to_string(),
                    item_size: output.item_size(),
                })
            }
            Node::Composite(h) => h.output_port(port),
        }
    }

    pub(crate) fn message_input(&self, port: &PortId) -> Option<usize> {
        match self {
            Node::Leaf(b) => match port {
                PortId::Index(i) => (*i < b.mio().inputs().len()).then_some(*i),
                PortId::Name(n) => b.mio().input_name_to_id(n),
            },
            Node::Composite(h) => h.message_input_port(port),
        }
    }

    pub(crate) fn message_output(&self, port: &PortId) -> Option<usize> {
        match self {
            Node::Leaf(b) => match port {
                PortId::Index(i) => (*i < b.mio().outputs().len()).then_some(*i),
                PortId::Name(n) => b.mio().output_name_to_id(n),
            },
            Node::Composite(h) => h.message_output_port(port),
        }
    }

    /// Visit every leaf block, descending into composites.
    pub(crate) fn for_each_block_mut(&mut self, f: &mut dyn FnMut(&mut Block)) {
        match self {
            Node::Leaf(b) => f(b),
            Node::Composite(h) => {
                for (_, n) in h.topology.nodes.iter_mut() {
                    if let Some(n) = n {
                        n.for_each_block_mut(f);
                    }
                }
            }
        }
    }

    /// Serializable description of the node.
    pub fn description(&self, id: usize) -> BlockDescription {
        match self {
            Node::Leaf(b) => b.description(id),
            Node::Composite(h) => h.description(id),
        }
    }
}

/// The graph that backs a [`Flowgraph`](crate::runtime::Flowgraph) or a [`HierBlock`].
#[derive(Debug, Default)]
pub struct Topology {
    pub(crate) nodes: Slab<Option<Node>>,
    pub(crate) stream_edges: Vec<StreamEdge>,
    pub(crate) message_edges: Vec<MessageEdge>,
    pub(crate) buffer_sizes: HashMap<(BlockId, usize), BufferSize>,
    // blocks that lost an edge, candidates for garbage collection
    touched: BTreeSet<BlockId>,
}

impl Topology {
    /// Constructs a blank [`Topology`]
    pub fn new() -> Self {
        Topology::default()
    }

    /// Id of the node with the given instance name.
    pub fn block_id(&self, name: &str) -> Option<BlockId> {
        self.nodes
            .iter()
            .find(|(_, n)| n.as_ref().and_then(|n| n.instance_name()) == Some(name))
            .map(|(i, _)| BlockId(i))
    }

    /// Instance name of a node.
    pub fn block_name(&self, id: BlockId) -> Option<&str> {
        self.node(id).and_then(|n| n.instance_name())
    }

    /// Adds a node, making its instance name unique.
    pub fn add_node(&mut self, node: impl Into<Node>) -> BlockId {
        let mut node = node.into();
        let (mut i, base_name, mut name) = if let Some(name) = node.instance_name() {
            (-1, name.to_string(), name.to_string())
        } else {
            (
                0,
                node.type_name().to_string(),
                format!("{}_{}", node.type_name(), 0),
            )
        };

        // find a unique name
        while self.block_id(&name).is_some() {
            i += 1;
            name = format!("{base_name}_{i}");
        }

        node.set_instance_name(&name);
        BlockId(self.nodes.insert(Some(node)))
    }

    /// Node with the given id.
    pub fn node(&self, id: BlockId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    /// Mutable node with the given id.
    pub fn node_mut(&mut self, id: BlockId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(|n| n.as_mut())
    }

    /// Leaf block with the given id.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.node(id).and_then(|n| n.as_block())
    }

    /// Mutable leaf block with the given id.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.node_mut(id).and_then(|n| n.as_block_mut())
    }

    /// Ids of all nodes, ascending.
    pub fn ids(&self) -> Vec<BlockId> {
        self.nodes.iter().map(|(i, _)| BlockId(i)).collect()
    }

    /// All stream edges.
    pub fn stream_edges(&self) -> &[StreamEdge] {
        &self.stream_edges
    }

    /// All message edges.
    pub fn message_edges(&self) -> &[MessageEdge] {
        &self.message_edges
    }

    /// Removes a node and all its edges.
    pub fn remove_node(&mut self, id: BlockId) -> Option<Node> {
        let node = self.nodes.try_remove(id.0)??;
        for e in self.stream_edges.iter().filter(|e| e.src == id || e.dst == id) {
            self.touched.insert(e.src);
            self.touched.insert(e.dst);
        }
        for e in self.message_edges.iter().filter(|e| e.src == id || e.dst == id) {
            self.touched.insert(e.src);
            self.touched.insert(e.dst);
        }
        self.stream_edges.retain(|e| e.src != id && e.dst != id);
        self.message_edges.retain(|e| e.src != id && e.dst != id);
        self.buffer_sizes.retain(|k, _| k.0 != id);
        self.touched.remove(&id);
        Some(node)
    }

    /// Move a leaf out, leaving its slot reserved.
    pub(crate) fn take_block(&mut self, id: BlockId) -> Option<Block> {
        let slot = self.nodes.get_mut(id.0)?;
        match slot.take() {
            Some(Node::Leaf(b)) => Some(b),
            other => {
                *slot = other;
                None
            }
        }
    }

    pub(crate) fn put_block(&mut self, id: BlockId, block: Block) {
        if let Some(slot) = self.nodes.get_mut(id.0) {
            *slot = Some(Node::Leaf(block));
        }
    }

    fn node_or_err(&self, id: BlockId) -> Result<&Node, Error> {
        self.node(id).ok_or(Error::InvalidBlock(id))
    }

    fn label(&self, id: BlockId, port: &str) -> String {
        format!("{}.{}", self.block_name(id).unwrap_or("?"), port)
    }

    /// Resolve both ends of a stream connection and check the item sizes.
    pub(crate) fn resolve_stream(
        &self,
        src: &Endpoint,
        dst: &Endpoint,
    ) -> Result<StreamEdge, Error> {
        let src_port = self
            .node_or_err(src.block)?
            .stream_output(&src.port)
            .ok_or_else(|| Error::InvalidStreamPort(BlockPortCtx::Id(src.block), src.port.clone()))?;
        let dst_port = self
            .node_or_err(dst.block)?
            .stream_input(&dst.port)
            .ok_or_else(|| Error::InvalidStreamPort(BlockPortCtx::Id(dst.block), dst.port.clone()))?;

        if src_port.item_size != dst_port.item_size {
            return Err(Error::PortType {
                src: self.label(src.block, &src_port.name),
                src_size: src_port.item_size,
                dst: self.label(dst.block, &dst_port.name),
                dst_size: dst_port.item_size,
            });
        }

        Ok(StreamEdge {
            src: src.block,
            src_port: src_port.index,
            dst: dst.block,
            dst_port: dst_port.index,
        })
    }

    pub(crate) fn input_in_use(&self, dst: BlockId, port: usize) -> bool {
        self.stream_edges
            .iter()
            .any(|e| e.dst == dst && e.dst_port == port)
    }

    pub(crate) fn port_in_use(&self, dst: BlockId, port: usize) -> Error {
        let name = self
            .node(dst)
            .and_then(|n| n.stream_input(&PortId::Index(port)))
            .map(|p| p.name)
            .unwrap_or_else(|| port.to_string());
        Error::PortInUse {
            block: self.block_name(dst).unwrap_or("?").to_string(),
            port: name,
        }
    }

    /// Connect two stream ports. Nothing changes if the connection is rejected.
    pub fn connect_stream(
        &mut self,
        src: Endpoint,
        dst: Endpoint,
        size: BufferSize,
    ) -> Result<(), Error> {
        let edge = self.resolve_stream(&src, &dst)?;
        if self.input_in_use(edge.dst, edge.dst_port) {
            return Err(self.port_in_use(edge.dst, edge.dst_port));
        }
        self.push_stream_edge(edge, size);
        Ok(())
    }

    pub(crate) fn push_stream_edge(&mut self, edge: StreamEdge, size: BufferSize) {
        if size != BufferSize::Default {
            self.buffer_sizes.insert((edge.src, edge.src_port), size);
        }
        self.stream_edges.push(edge);
    }

    /// Remove a stream edge.
    pub fn disconnect_stream(&mut self, src: &Endpoint, dst: &Endpoint) -> Result<(), Error> {
        let edge = self.resolve_stream(src, dst)?;
        let pos = self
            .stream_edges
            .iter()
            .position(|e| *e == edge)
            .ok_or_else(|| Error::NotConnected(format!("{src} > {dst}")))?;
        self.stream_edges.remove(pos);
        if !self
            .stream_edges
            .iter()
            .any(|e| e.src == edge.src && e.src_port == edge.src_port)
        {
            self.buffer_sizes.remove(&(edge.src, edge.src_port));
        }
        self.touched.insert(edge.src);
        self.touched.insert(edge.dst);
        Ok(())
    }

    pub(crate) fn resolve_message(
        &self,
        src: &Endpoint,
        dst: &Endpoint,
    ) -> Result<MessageEdge, Error> {
        let src_port = self
            .node_or_err(src.block)?
            .message_output(&src.port)
            .ok_or_else(|| Error::InvalidMessagePort(BlockPortCtx::Id(src.block), src.port.clone()))?;
        let dst_port = self
            .node_or_err(dst.block)?
            .message_input(&dst.port)
            .ok_or_else(|| Error::InvalidMessagePort(BlockPortCtx::Id(dst.block), dst.port.clone()))?;
        Ok(MessageEdge {
            src: src.block,
            src_port,
            dst: dst.block,
            dst_port,
        })
    }

    /// Connect two message ports. Connecting the same ports twice has no effect.
    pub fn connect_message(&mut self, src: Endpoint, dst: Endpoint) -> Result<(), Error> {
        let edge = self.resolve_message(&src, &dst)?;
        if !self.message_edges.contains(&edge) {
            self.message_edges.push(edge);
        }
        Ok(())
    }

    /// Remove a message edge.
    pub fn disconnect_message(&mut self, src: &Endpoint, dst: &Endpoint) -> Result<(), Error> {
        let edge = self.resolve_message(src, dst)?;
        let pos = self
            .message_edges
            .iter()
            .position(|e| *e == edge)
            .ok_or_else(|| Error::NotConnected(format!("{src} > {dst}")))?;
        self.message_edges.remove(pos);
        self.touched.insert(edge.src);
        self.touched.insert(edge.dst);
        Ok(())
    }

    /// Remove all edges. Nodes that stay unconnected are collected on the next commit.
    pub fn disconnect_all(&mut self) {
        self.stream_edges.clear();
        self.message_edges.clear();
        self.buffer_sizes.clear();
        self.touched.extend(self.nodes.iter().map(|(i, _)| BlockId(i)));
    }

    fn has_edges(&self, id: BlockId) -> bool {
        self.stream_edges.iter().any(|e| e.src == id || e.dst == id)
            || self.message_edges.iter().any(|e| e.src == id || e.dst == id)
    }

    /// Remove nodes that were disconnected and have no edges left.
    pub fn collect_garbage(&mut self) -> Vec<BlockId> {
        let candidates = mem::take(&mut self.touched);
        let mut removed = Vec::new();
        for id in candidates {
            if self.node(id).is_some() && !self.has_edges(id) {
                debug!("removing orphaned block {:?}", self.block_name(id));
                self.nodes.remove(id.0);
                self.buffer_sizes.retain(|k, _| k.0 != id);
                removed.push(id);
            }
        }
        removed
    }

    /// Expand all composites into their leaves.
    ///
    /// Returns, for every expanded composite, the ids of the leaves that replaced it.
    pub(crate) fn flatten(&mut self) -> BTreeMap<BlockId, Vec<BlockId>> {
        self.expand_all()
            .into_iter()
            .map(|(id, e)| (id, e.leaves))
            .collect()
    }

    fn expand_all(&mut self) -> BTreeMap<BlockId, Expansion> {
        let mut expanded = BTreeMap::new();
        while let Some(id) = self
            .nodes
            .iter()
            .find(|(_, n)| n.as_ref().is_some_and(|n| n.is_composite()))
            .map(|(i, _)| BlockId(i))
        {
            if let Some(e) = self.expand(id) {
                expanded.insert(id, e);
            }
        }
        expanded
    }

    fn expand(&mut self, id: BlockId) -> Option<Expansion> {
        let Some(Some(Node::Composite(mut hier))) = self.nodes.try_remove(id.0) else {
            return None;
        };
        // nested composites: route our boundary through theirs, their ids are gone now
        let nested = hier.topology.expand_all();
        if !nested.is_empty() {
            reroute(&mut hier.inputs, &nested, |e| e.inputs.as_slice());
            reroute(&mut hier.outputs, &nested, |e| e.outputs.as_slice());
            reroute(&mut hier.message_inputs, &nested, |e| e.message_inputs.as_slice());
            reroute(&mut hier.message_outputs, &nested, |e| e.message_outputs.as_slice());
        }
        let prefix = hier
            .instance_name()
            .unwrap_or_else(|| hier.type_name())
            .to_string();
        debug!("flattening {}", prefix);

        // move inner nodes
        let mut map = HashMap::new();
        for (inner, node) in mem::take(&mut hier.topology.nodes) {
            if let Some(mut node) = node {
                let name = format!("{}/{}", prefix, node.instance_name().unwrap_or("?"));
                node.set_instance_name(&name);
                map.insert(BlockId(inner), self.add_node(node));
            }
        }
        let m = |b: BlockId| map.get(&b).copied();

        // inner edges
        for e in hier.topology.stream_edges.iter() {
            if let (Some(src), Some(dst)) = (m(e.src), m(e.dst)) {
                let size = hier
                    .topology
                    .buffer_sizes
                    .get(&(e.src, e.src_port))
                    .copied()
                    .unwrap_or_default();
                self.push_stream_edge(
                    StreamEdge {
                        src,
                        src_port: e.src_port,
                        dst,
                        dst_port: e.dst_port,
                    },
                    size,
                );
            }
        }
        for e in hier.topology.message_edges.iter() {
            if let (Some(src), Some(dst)) = (m(e.src), m(e.dst)) {
                self.message_edges.push(MessageEdge {
                    src,
                    src_port: e.src_port,
                    dst,
                    dst_port: e.dst_port,
                });
            }
        }

        // outer edges through the boundary
        let stream_edges = mem::take(&mut self.stream_edges);
        for e in stream_edges {
            if e.src != id && e.dst != id {
                self.stream_edges.push(e);
                continue;
            }
            let srcs: Vec<(BlockId, usize)> = if e.src == id {
                hier.outputs
                    .get(e.src_port)
                    .map(|b| b.endpoints.iter().filter_map(|(b, p)| Some((m(*b)?, *p))).collect())
                    .unwrap_or_default()
            } else {
                vec![(e.src, e.src_port)]
            };
            let dsts: Vec<(BlockId, usize)> = if e.dst == id {
                hier.inputs
                    .get(e.dst_port)
                    .map(|b| b.endpoints.iter().filter_map(|(b, p)| Some((m(*b)?, *p))).collect())
                    .unwrap_or_default()
            } else {
                vec![(e.dst, e.dst_port)]
            };
            for &(src, src_port) in srcs.iter() {
                for &(dst, dst_port) in dsts.iter() {
                    self.stream_edges.push(StreamEdge {
                        src,
                        src_port,
                        dst,
                        dst_port,
                    });
                }
            }
        }
        let sizes: Vec<_> = self
            .buffer_sizes
            .iter()
            .filter(|(k, _)| k.0 == id)
            .map(|(k, v)| (*k, *v))
            .collect();
        for ((_, port), size) in sizes {
            self.buffer_sizes.remove(&(id, port));
            if let Some(&(b, p)) = hier.outputs.get(port).and_then(|o| o.endpoints.first()) {
                if let Some(b) = m(b) {
                    self.buffer_sizes.insert((b, p), size);
                }
            }
        }

        let message_edges = mem::take(&mut self.message_edges);
        for e in message_edges {
            if e.src != id && e.dst != id {
                self.message_edges.push(e);
                continue;
            }
            let srcs: Vec<(BlockId, usize)> = if e.src == id {
                hier.message_outputs
                    .get(e.src_port)
                    .map(|b| b.endpoints.iter().filter_map(|(b, p)| Some((m(*b)?, *p))).collect())
                    .unwrap_or_default()
            } else {
                vec![(e.src, e.src_port)]
            };
            let dsts: Vec<(BlockId, usize)> = if e.dst == id {
                hier.message_inputs
                    .get(e.dst_port)
                    .map(|b| b.endpoints.iter().filter_map(|(b, p)| Some((m(*b)?, *p))).collect())
                    .unwrap_or_default()
            } else {
                vec![(e.dst, e.dst_port)]
            };
            for &(src, src_port) in srcs.iter() {
                for &(dst, dst_port) in dsts.iter() {
                    self.message_edges.push(MessageEdge {
                        src,
                        src_port,
                        dst,
                        dst_port,
                    });
                }
            }
        }

        if self.touched.remove(&id) {
            self.touched.extend(map.values().copied());
        }

        let resolve = |ports: &[Boundary]| -> Vec<Vec<(BlockId, usize)>> {
            ports
                .iter()
                .map(|b| b.endpoints.iter().filter_map(|(b, p)| Some((m(*b)?, *p))).collect())
                .collect()
        };
        let inputs = resolve(&hier.inputs);
        let outputs = resolve(&hier.outputs);
        let message_inputs = resolve(&hier.message_inputs);
        let message_outputs = resolve(&hier.message_outputs);

        let mut leaves: Vec<BlockId> = map.into_values().collect();
        leaves.sort();
        Some(Expansion {
            leaves,
            inputs,
            outputs,
            message_inputs,
            message_outputs,
        })
    }

    /// Serializable snapshot of nodes and edges.
    pub fn description(&self) -> FlowgraphDescription {
        FlowgraphDescription {
            blocks: self
                .nodes
                .iter()
                .filter_map(|(i, n)| n.as_ref().map(|n| n.description(i)))
                .collect(),
            stream_edges: self
                .stream_edges
                .iter()
                .map(|e| (e.src.0, e.src_port, e.dst.0, e.dst_port))
                .collect(),
            message_edges: self
                .message_edges
                .iter()
                .map(|e| (e.src.0, e.src_port, e.dst.0, e.dst_port))
                .collect(),
        }
    }
}

/// What replaced an expanded composite, in ids of the enclosing topology.
struct Expansion {
    leaves: Vec<BlockId>,
    inputs: Vec<Vec<(BlockId, usize)>>,
    outputs: Vec<Vec<(BlockId, usize)>>,
    message_inputs: Vec<Vec<(BlockId, usize)>>,
    message_outputs: Vec<Vec<(BlockId, usize)>>,
}

/// Replace boundary endpoints on expanded composites with the endpoints behind their ports.
fn reroute(
    ports: &mut [Boundary],
    nested: &BTreeMap<BlockId, Expansion>,
    side: impl Fn(&Expansion) -> &[Vec<(BlockId, usize)>],
) {
    for port in ports.iter_mut() {
        port.endpoints = port
            .endpoints
            .iter()
            .flat_map(|&(b, p)| match nested.get(&b) {
                Some(e) => side(e).get(p).cloned().unwrap_or_default(),
                None => vec![(b, p)],
            })
            .collect();
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Topologically sort `blocks` along the stream edges between them.
///
/// Blocks without upstream stream edges come first, then the remaining ones, each group in
/// ascending id order. A depth-first search visits successors in ascending id order, and the
/// reversed post-order is the result. The order is therefore fully determined by the block ids
/// and the set of edges, not by the order in which edges were added.
pub(crate) fn topological_sort(
    blocks: &[BlockId],
    edges: &[StreamEdge],
    name: impl Fn(BlockId) -> String,
) -> Result<Vec<BlockId>, Error> {
    let set: BTreeSet<BlockId> = blocks.iter().copied().collect();
    let mut successors: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
    let mut has_upstream = BTreeSet::new();
    for e in edges {
        has_upstream.insert(e.dst);
        if set.contains(&e.src) && set.contains(&e.dst) {
            successors.entry(e.src).or_default().insert(e.dst);
        }
    }

    let (sources, others): (Vec<BlockId>, Vec<BlockId>) =
        set.iter().partition(|b| !has_upstream.contains(b));

    let mut color: BTreeMap<BlockId, Color> = set.iter().map(|b| (*b, Color::White)).collect();
    let mut post = Vec::with_capacity(set.len());
    let empty = BTreeSet::new();

    for start in sources.into_iter().chain(others) {
        if color[&start] != Color::White {
            continue;
        }
        color.insert(start, Color::Grey);
        let mut stack = vec![(start, successors.get(&start).unwrap_or(&empty).iter())];
        while let Some((node, iter)) = stack.last_mut() {
            let node = *node;
            match iter.next() {
                Some(&next) => match color[&next] {
                    Color::White => {
                        color.insert(next, Color::Grey);
                        stack.push((next, successors.get(&next).unwrap_or(&empty).iter()));
                    }
                    Color::Grey => {
                        return Err(Error::NotDag {
                            block: next,
                            name: name(next),
                        });
                    }
                    Color::Black => {}
                },
                None => {
                    color.insert(node, Color::Black);
                    post.push(node);
                    stack.pop();
                }
            }
        }
    }

    post.reverse();
    Ok(post)
}

/// Weakly connected components of `blocks`, joined by stream and message edges.
///
/// Each component is sorted by id, components are ordered by their smallest id.
pub(crate) fn components(
    blocks: &[BlockId],
    stream: &[StreamEdge],
    message: &[MessageEdge],
) -> Vec<Vec<BlockId>> {
    let set: BTreeSet<BlockId> = blocks.iter().copied().collect();
    let mut adjacent: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    let pairs = stream
        .iter()
        .map(|e| (e.src, e.dst))
        .chain(message.iter().map(|e| (e.src, e.dst)));
    for (a, b) in pairs {
        if set.contains(&a) && set.contains(&b) {
            adjacent.entry(a).or_default().push(b);
            adjacent.entry(b).or_default().push(a);
        }
    }

    let mut seen = BTreeSet::new();
    let mut result = Vec::new();
    for &start in set.iter() {
        if !seen.insert(start) {
            continue;
        }
        let mut component = vec![start];
        let mut todo = vec![start];
        while let Some(b) = todo.pop() {
            for &n in adjacent.get(&b).into_iter().flatten() {
                if seen.insert(n) {
                    component.push(n);
                    todo.push(n);
                }
            }
        }
        component.sort();
        result.push(component);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(src: usize, dst: usize) -> StreamEdge {
        StreamEdge {
            src: BlockId(src),
            src_port: 0,
            dst: BlockId(dst),
            dst_port: 0,
        }
    }

    fn ids(v: &[usize]) -> Vec<BlockId> {
        v.iter().map(|i| BlockId(*i)).collect()
    }

    #[test]
    fn sort_is_independent_of_edge_order() {
        let blocks = ids(&[0, 1, 2, 3, 4, 5]);
        let mut edges = vec![e(0, 2), e(1, 3), e(2, 4), e(3, 4), e(4, 5)];
        let a = topological_sort(&blocks, &edges, |b| b.to_string()).unwrap();
        edges.reverse();
        let b = topological_sort(&blocks, &edges, |b| b.to_string()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, ids(&[1, 3, 0, 2, 4, 5]));
    }

    #[test]
    fn cycle_is_reported() {
        let blocks = ids(&[0, 1, 2]);
        let edges = vec![e(0, 1), e(1, 2), e(2, 1)];
        let err = topological_sort(&blocks, &edges, |b| format!("b{}", b.0)).unwrap_err();
        assert!(matches!(err, Error::NotDag { .. }));
    }

    #[test]
    fn components_split_on_missing_edges() {
        let blocks = ids(&[0, 1, 2, 3, 4]);
        let edges = vec![e(3, 1), e(0, 4)];
        let c = components(&blocks, &edges, &[]);
        assert_eq!(c, vec![ids(&[0, 4]), ids(&[1, 3]), ids(&[2])]);
    }
}
