use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;

use crate::runtime::AllocationCounters;
use crate::runtime::Allocations;
use crate::runtime::Block;
use crate::runtime::BlockDetail;
use crate::runtime::BlockId;
use crate::runtime::Config;
use crate::runtime::Endpoint;
use crate::runtime::Error;
use crate::runtime::FlowgraphDescription;
use crate::runtime::Kernel;
use crate::runtime::PortDirection;
use crate::runtime::PortId;
use crate::runtime::allocations::Resource;
use crate::runtime::buffer::BufferReader;
use crate::runtime::buffer::BufferSize;
use crate::runtime::buffer::BufferWriter;
use crate::runtime::topology;
use crate::runtime::topology::MessageEdge;
use crate::runtime::topology::Node;
use crate::runtime::topology::StreamEdge;
use crate::runtime::topology::Topology;

/// Life cycle state of a [`Flowgraph`].
///
/// A running flowgraph is represented by a [`RunningFlowgraph`](crate::runtime::RunningFlowgraph),
/// a destroyed one by dropping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    /// Edited since the last validation
    Building,
    /// Validated, no buffers allocated yet
    Validated,
    /// Buffers allocated, ready to run
    Committed,
}

/// What the scheduler runs, derived from the topology on validation.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    /// Enabled blocks in topological order
    pub(crate) active: Vec<BlockId>,
    /// Stream edges with disabled blocks bypassed or elided
    pub(crate) stream_edges: Vec<StreamEdge>,
    pub(crate) message_edges: Vec<MessageEdge>,
    /// Weakly connected components, each in topological order
    pub(crate) partitions: Vec<Vec<BlockId>>,
}

/// The main component of any sdrflow program.
///
/// A [`Flowgraph`] owns a set of blocks and the connections between them. Blocks are added with
/// [`add_block`](Flowgraph::add_block) and wired with the `connect*` methods, which reject
/// invalid connections right away and leave the graph unchanged in that case. Before it can
/// run, the flowgraph is [committed](Flowgraph::commit): hierarchical blocks are flattened,
/// disconnected blocks are collected, the graph is validated and buffers are allocated.
///
/// ```
/// use sdrflow::blocks::AddConst;
/// use sdrflow::blocks::VectorSink;
/// use sdrflow::blocks::VectorSource;
/// use sdrflow::runtime::Flowgraph;
/// use sdrflow::runtime::Runtime;
///
/// # fn main() -> sdrflow::runtime::Result<()> {
/// let mut fg = Flowgraph::new();
/// let src = fg.add_block(VectorSource::<u32>::new(vec![0, 1, 2, 3]));
/// let add = fg.add_block(AddConst::<u32>::new(2));
/// let snk = fg.add_block(VectorSink::<u32>::new(4));
/// fg.connect_chain(&[src, add, snk])?;
///
/// let fg = Runtime::new().run(fg)?;
/// let snk = fg.kernel::<VectorSink<u32>>(snk).unwrap();
/// assert_eq!(snk.items(), &[2, 3, 4, 5]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Flowgraph {
    pub(crate) topology: Topology,
    counters: AllocationCounters,
    state: GraphState,
    plan: Option<Plan>,
    expanded: BTreeMap<BlockId, Vec<BlockId>>,
}

impl Flowgraph {
    /// Creates a new [`Flowgraph`] with an empty [`Topology`]
    pub fn new() -> Flowgraph {
        Flowgraph {
            topology: Topology::new(),
            counters: AllocationCounters::new(),
            state: GraphState::Building,
            plan: None,
            expanded: BTreeMap::new(),
        }
    }

    /// Add a block or a [`HierBlock`](crate::runtime::HierBlock).
    ///
    /// The instance name is made unique by appending `_<n>` if needed.
    pub fn add_block(&mut self, node: impl Into<Node>) -> BlockId {
        let mut node = node.into();
        let counters = &self.counters;
        node.for_each_block_mut(&mut |b| {
            if !b.has_allocation() {
                b.set_allocation(counters.track(Resource::Block));
            }
        });
        let id = self.topology.add_node(node);
        self.expanded.remove(&id);
        self.invalidate();
        id
    }

    /// Remove a block and all its connections.
    ///
    /// The returned node holds no buffers or runtime state anymore; its upstream blocks are not
    /// held back by it.
    pub fn remove_block(&mut self, id: BlockId) -> Result<Node, Error> {
        let mut node = self
            .topology
            .remove_node(id)
            .ok_or(Error::InvalidBlock(id))?;
        node.for_each_block_mut(&mut release);
        self.forget(&[id]);
        self.invalidate();
        Ok(node)
    }

    /// Connect output 0 of `src` to input 0 of `dst`.
    pub fn connect(&mut self, src: BlockId, dst: BlockId) -> Result<(), Error> {
        self.connect_ports(src, dst)
    }

    /// Connect two stream ports.
    ///
    /// ```
    /// # use sdrflow::blocks::{NullSink, NullSource};
    /// # use sdrflow::runtime::Flowgraph;
    /// # fn main() -> sdrflow::runtime::Result<()> {
    /// let mut fg = Flowgraph::new();
    /// let src = fg.add_block(NullSource::<f32>::new());
    /// let snk = fg.add_block(NullSink::<f32>::new());
    /// fg.connect_ports(src.port("out"), (snk, 0))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect_ports(
        &mut self,
        src: impl Into<Endpoint>,
        dst: impl Into<Endpoint>,
    ) -> Result<(), Error> {
        self.connect_with_buffer(src, dst, BufferSize::Default)
    }

    /// Connect two stream ports, addressed by block and port.
    pub fn connect_stream(
        &mut self,
        src: BlockId,
        src_port: impl Into<PortId>,
        dst: BlockId,
        dst_port: impl Into<PortId>,
    ) -> Result<(), Error> {
        self.connect_ports(src.port(src_port), dst.port(dst_port))
    }

    /// Connect two stream ports and request a buffer size for the output.
    pub fn connect_with_buffer(
        &mut self,
        src: impl Into<Endpoint>,
        dst: impl Into<Endpoint>,
        size: BufferSize,
    ) -> Result<(), Error> {
        self.topology.connect_stream(src.into(), dst.into(), size)?;
        self.invalidate();
        Ok(())
    }

    /// Connect the blocks one after another, port 0 to port 0.
    ///
    /// Either all connections are made or, on error, none.
    pub fn connect_chain(&mut self, blocks: &[BlockId]) -> Result<(), Error> {
        let mut edges = Vec::new();
        let mut used = BTreeSet::new();
        for w in blocks.windows(2) {
            let edge = self
                .topology
                .resolve_stream(&Endpoint::from(w[0]), &Endpoint::from(w[1]))?;
            if self.topology.input_in_use(edge.dst, edge.dst_port)
                || !used.insert((edge.dst, edge.dst_port))
            {
                return Err(self.topology.port_in_use(edge.dst, edge.dst_port));
            }
            edges.push(edge);
        }
        for e in edges {
            self.topology.push_stream_edge(e, BufferSize::Default);
        }
        self.invalidate();
        Ok(())
    }

    /// Remove the connection from output 0 of `src` to input 0 of `dst`.
    pub fn disconnect(&mut self, src: BlockId, dst: BlockId) -> Result<(), Error> {
        self.disconnect_ports(src, dst)
    }

    /// Remove a stream connection.
    pub fn disconnect_ports(
        &mut self,
        src: impl Into<Endpoint>,
        dst: impl Into<Endpoint>,
    ) -> Result<(), Error> {
        self.topology
            .disconnect_stream(&src.into(), &dst.into())?;
        self.invalidate();
        Ok(())
    }

    /// Connect a message output to a message input.
    pub fn connect_message(
        &mut self,
        src: impl Into<Endpoint>,
        dst: impl Into<Endpoint>,
    ) -> Result<(), Error> {
        self.topology.connect_message(src.into(), dst.into())?;
        self.invalidate();
        Ok(())
    }

    /// Remove a message connection.
    pub fn disconnect_message(
        &mut self,
        src: impl Into<Endpoint>,
        dst: impl Into<Endpoint>,
    ) -> Result<(), Error> {
        self.topology
            .disconnect_message(&src.into(), &dst.into())?;
        self.invalidate();
        Ok(())
    }

    /// Remove all connections. Blocks are freed by the next garbage collection.
    pub fn disconnect_all(&mut self) {
        self.topology.disconnect_all();
        self.invalidate();
    }

    /// Enable or disable a block. For a hierarchical block, all of its blocks are affected.
    pub fn set_enabled(&mut self, id: BlockId, enabled: bool) -> Result<(), Error> {
        let mut ids = self.expand_ids(&[id]);
        if ids.is_empty() {
            ids.push(id);
        }
        for id in ids {
            let node = self
                .topology
                .node_mut(id)
                .ok_or(Error::InvalidBlock(id))?;
            node.for_each_block_mut(&mut |b| b.set_enabled(enabled));
        }
        self.invalidate();
        Ok(())
    }

    /// Replace all hierarchical blocks with their inner blocks.
    ///
    /// Ids of flattened hierarchical blocks can still be passed to
    /// [`topological_sort`](Flowgraph::topological_sort) and
    /// [`partition_graph`](Flowgraph::partition_graph); they stand for their inner blocks.
    pub fn flatten(&mut self) {
        let expanded = self.topology.flatten();
        if !expanded.is_empty() {
            self.expanded.extend(expanded);
            self.invalidate();
        }
    }

    /// Remove blocks that lost their last connection. Returns their ids.
    pub fn collect_garbage(&mut self) -> Vec<BlockId> {
        let removed = self.topology.collect_garbage();
        if !removed.is_empty() {
            self.forget(&removed);
            self.invalidate();
        }
        removed
    }

    /// Check that the flowgraph can be scheduled.
    ///
    /// Flattens hierarchical blocks and collects garbage first. Fails if a required stream port
    /// of an enabled block is not connected, or if the stream edges contain a cycle.
    pub fn validate(&mut self) -> Result<(), Error> {
        self.flatten();
        self.collect_garbage();
        if self.state != GraphState::Building && self.plan.is_some() {
            return Ok(());
        }
        let plan = self.plan()?;
        debug!(
            "validated flowgraph: {} blocks in {} partitions",
            plan.active.len(),
            plan.partitions.len()
        );
        self.plan = Some(plan);
        self.state = GraphState::Validated;
        Ok(())
    }

    /// Topological order of the given blocks along the stream edges between them.
    ///
    /// Blocks without upstream come first, then the others, each in ascending id order. From
    /// each of them, downstream blocks are visited depth-first in ascending id order, and the
    /// reversed post-order is returned. The result only depends on the blocks and edges, not on
    /// the order of `connect` calls.
    pub fn topological_sort(&mut self, blocks: &[BlockId]) -> Result<Vec<BlockId>, Error> {
        self.flatten();
        let blocks = self.existing(blocks)?;
        topology::topological_sort(&blocks, self.topology.stream_edges(), |b| self.name(b))
    }

    /// Split the given blocks into weakly connected components, each in topological order.
    ///
    /// Components are ordered by their smallest block id.
    pub fn partition_graph(&mut self, blocks: &[BlockId]) -> Result<Vec<Vec<BlockId>>, Error> {
        self.flatten();
        let blocks = self.existing(blocks)?;
        topology::components(
            &blocks,
            self.topology.stream_edges(),
            self.topology.message_edges(),
        )
        .into_iter()
        .map(|c| {
            topology::topological_sort(&c, self.topology.stream_edges(), |b| self.name(b))
        })
        .collect()
    }

    /// Validate the flowgraph and allocate its buffers.
    ///
    /// Buffers that still fit are kept, so data that is buffered survives a re-commit. If
    /// allocation fails, the flowgraph stays [`GraphState::Validated`] and nothing is changed.
    pub fn commit(&mut self, config: &Config) -> Result<(), Error> {
        match self.state {
            GraphState::Committed => return Ok(()),
            GraphState::Building => self.validate()?,
            GraphState::Validated => {}
        }
        let plan = self
            .plan
            .take()
            .ok_or_else(|| Error::InvalidState("validated flowgraph without plan".to_string()))?;
        let result = self.setup_connections(&plan, config);
        self.plan = Some(plan);
        result?;
        self.state = GraphState::Committed;
        info!(
            "committed flowgraph (blocks, details, buffers, readers): {:?}",
            self.allocations().as_tuple()
        );
        Ok(())
    }

    /// Release all buffers and scheduling state.
    pub fn decommit(&mut self) {
        for id in self.topology.ids() {
            if let Some(b) = self.topology.block_mut(id) {
                release(b);
            }
        }
        self.invalidate();
    }

    /// Lifecycle state.
    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Ids of all blocks in ascending order.
    pub fn all_blocks(&self) -> Vec<BlockId> {
        self.topology.ids()
    }

    /// Id of the block with the given instance name.
    pub fn block_id(&self, name: &str) -> Option<BlockId> {
        self.topology.block_id(name)
    }

    /// Leaf block with the given id.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.topology.block(id)
    }

    /// Mutable leaf block with the given id.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.topology.block_mut(id)
    }

    /// Block or hierarchical block with the given id.
    pub fn node(&self, id: BlockId) -> Option<&Node> {
        self.topology.node(id)
    }

    /// The underlying graph.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Get the kernel of a block, e.g., to read the results of a sink.
    pub fn kernel<K: Kernel + 'static>(&self, id: BlockId) -> Option<&K> {
        self.topology.block(id).and_then(|b| b.kernel())
    }

    /// Mutable access to the kernel of a block.
    pub fn kernel_mut<K: Kernel + 'static>(&mut self, id: BlockId) -> Option<&mut K> {
        self.topology.block_mut(id).and_then(|b| b.kernel_mut())
    }

    /// Allocation counters, shared with everything this flowgraph allocates.
    ///
    /// The handle stays valid after the flowgraph is dropped.
    pub fn counters(&self) -> AllocationCounters {
        self.counters.clone()
    }

    /// Current allocation counts.
    pub fn allocations(&self) -> Allocations {
        self.counters.snapshot()
    }

    /// Serializable snapshot of blocks and edges.
    pub fn description(&self) -> FlowgraphDescription {
        self.topology.description()
    }

    /// Partitions of the last validation, each in topological order.
    pub fn partitions(&self) -> Option<&[Vec<BlockId>]> {
        self.plan.as_ref().map(|p| p.partitions.as_slice())
    }

    /// Clear end-of-stream state of all scheduled blocks.
    pub(crate) fn prepare_run(&mut self) {
        let Some(plan) = self.plan.as_ref() else {
            return;
        };
        for id in plan.active.iter() {
            if let Some(b) = self.topology.block_mut(*id) {
                b.prepare_run();
            }
        }
    }

    fn invalidate(&mut self) {
        self.state = GraphState::Building;
        self.plan = None;
    }

    fn name(&self, id: BlockId) -> String {
        self.topology.block_name(id).unwrap_or("?").to_string()
    }

    fn forget(&mut self, removed: &[BlockId]) {
        for leaves in self.expanded.values_mut() {
            leaves.retain(|b| !removed.contains(b));
        }
    }

    fn expand_ids(&self, ids: &[BlockId]) -> Vec<BlockId> {
        let mut out = Vec::new();
        for id in ids {
            match self.expanded.get(id) {
                Some(leaves) if self.topology.node(*id).is_none() || leaves.contains(id) => {
                    out.extend(leaves.iter().copied())
                }
                _ => out.push(*id),
            }
        }
        out.sort();
        out.dedup();
        out
    }

    fn existing(&self, ids: &[BlockId]) -> Result<Vec<BlockId>, Error> {
        let ids = self.expand_ids(ids);
        if let Some(id) = ids.iter().find(|id| self.topology.node(**id).is_none()) {
            return Err(Error::InvalidBlock(*id));
        }
        Ok(ids)
    }

    /// Stream and message edges as they are scheduled.
    ///
    /// A disabled block with one connected input and one connected output of the same item
    /// size is bypassed. All other disabled blocks are removed together with their edges.
    fn effective_edges(&self) -> (Vec<StreamEdge>, Vec<MessageEdge>) {
        let mut stream = self.topology.stream_edges().to_vec();
        let mut message = self.topology.message_edges().to_vec();

        for id in self.topology.ids() {
            let Some(block) = self.topology.block(id) else {
                continue;
            };
            if block.is_enabled() {
                continue;
            }
            let ins: Vec<StreamEdge> = stream.iter().filter(|e| e.dst == id).copied().collect();
            let outs: Vec<StreamEdge> = stream.iter().filter(|e| e.src == id).copied().collect();
            stream.retain(|e| e.src != id && e.dst != id);
            message.retain(|e| e.src != id && e.dst != id);

            let in_ports: BTreeSet<usize> = ins.iter().map(|e| e.dst_port).collect();
            let out_ports: BTreeSet<usize> = outs.iter().map(|e| e.src_port).collect();
            let bypass = match (ins.as_slice(), out_ports.len()) {
                ([upstream], 1) => {
                    let in_size = block.sio().inputs()[upstream.dst_port].item_size();
                    let out_size = block.sio().outputs()[outs[0].src_port].item_size();
                    in_ports.len() == 1 && in_size == out_size
                }
                _ => false,
            };

            if bypass {
                debug!("bypassing disabled block {}", self.name(id));
                let upstream = ins[0];
                stream.extend(outs.iter().map(|o| StreamEdge {
                    src: upstream.src,
                    src_port: upstream.src_port,
                    dst: o.dst,
                    dst_port: o.dst_port,
                }));
            } else {
                debug!("eliding disabled block {}", self.name(id));
            }
        }
        (stream, message)
    }

    fn plan(&self) -> Result<Plan, Error> {
        let (stream_edges, message_edges) = self.effective_edges();
        let active: Vec<BlockId> = self
            .topology
            .ids()
            .into_iter()
            .filter(|id| self.topology.block(*id).is_some_and(|b| b.is_enabled()))
            .collect();

        for id in active.iter() {
            let Some(block) = self.topology.block(*id) else {
                continue;
            };
            let unconnected = |port: &str, direction| Error::UnconnectedPort {
                block: self.name(*id),
                port: port.to_string(),
                direction,
            };
            for (n, input) in block.sio().inputs().iter().enumerate() {
                if !input.is_optional()
                    && !stream_edges.iter().any(|e| e.dst == *id && e.dst_port == n)
                {
                    return Err(unconnected(input.name(), PortDirection::Input));
                }
            }
            for (n, output) in block.sio().outputs().iter().enumerate() {
                if !output.is_optional()
                    && !stream_edges.iter().any(|e| e.src == *id && e.src_port == n)
                {
                    return Err(unconnected(output.name(), PortDirection::Output));
                }
            }
        }

        let name = |b| self.name(b);
        let order = topology::topological_sort(&active, &stream_edges, name)?;
        let partitions = topology::components(&active, &stream_edges, &message_edges)
            .into_iter()
            .map(|c| topology::topological_sort(&c, &stream_edges, name))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Plan {
            active: order,
            stream_edges,
            message_edges,
            partitions,
        })
    }

    /// Allocate buffers for the planned edges and wire block inboxes.
    ///
    /// Everything that can fail happens before the first block is touched.
    fn setup_connections(&mut self, plan: &Plan, config: &Config) -> Result<(), Error> {
        // outputs and the inputs they feed
        let mut fanout: BTreeMap<(BlockId, usize), Vec<(BlockId, usize)>> = BTreeMap::new();
        for e in plan.stream_edges.iter() {
            fanout
                .entry((e.src, e.src_port))
                .or_default()
                .push((e.dst, e.dst_port));
        }

        // size and allocate
        let mut staged: HashMap<(BlockId, usize), BufferWriter> = HashMap::new();
        let mut kept: BTreeSet<(BlockId, usize)> = BTreeSet::new();
        for (&(src, port), dsts) in fanout.iter() {
            let block = self.topology.block(src).ok_or(Error::InvalidBlock(src))?;
            let output = &block.sio().outputs()[port];
            let label = format!("{}.{}", self.name(src), output.name());
            let required = dsts
                .iter()
                .filter_map(|(b, p)| self.topology.block(*b).map(|b| b.sio().inputs()[*p].min_items()))
                .chain(std::iter::once(output.min_items()))
                .max()
                .unwrap_or(1);
            let size = self
                .topology
                .buffer_sizes
                .get(&(src, port))
                .copied()
                .unwrap_or_default();
            let capacity = size.items(output.item_size(), config.buffer_size, required);
            if capacity < required {
                return Err(Error::BufferSizing {
                    port: label,
                    capacity,
                    required,
                });
            }
            match output.writer() {
                Some(w) if w.capacity() == capacity && w.item_size() == output.item_size() => {
                    kept.insert((src, port));
                }
                _ => {
                    let writer =
                        BufferWriter::new(output.item_size(), capacity, &label, &self.counters)?;
                    staged.insert((src, port), writer);
                }
            }
        }

        // install writers
        let ids = self.topology.ids();
        for id in ids.iter() {
            let Some(block) = self.topology.block_mut(*id) else {
                continue;
            };
            for (port, output) in block.sio_mut().outputs_mut().iter_mut().enumerate() {
                if let Some(w) = staged.remove(&(*id, port)) {
                    output.set_writer(Some(w));
                } else if !kept.contains(&(*id, port)) {
                    output.set_writer(None);
                }
            }
        }

        // readers
        let mut readers: HashMap<(BlockId, usize), BufferReader> = HashMap::new();
        let mut keep_reader: BTreeSet<(BlockId, usize)> = BTreeSet::new();
        for e in plan.stream_edges.iter() {
            let writer = self
                .topology
                .block(e.src)
                .and_then(|b| b.sio().outputs()[e.src_port].writer());
            let current = self
                .topology
                .block(e.dst)
                .and_then(|b| b.sio().inputs()[e.dst_port].reader());
            match (writer, current) {
                (Some(w), Some(r)) if w.is_source_of(r) => {
                    keep_reader.insert((e.dst, e.dst_port));
                }
                (Some(w), _) => {
                    readers.insert(
                        (e.dst, e.dst_port),
                        w.add_reader((e.dst, e.dst_port), &self.counters),
                    );
                }
                (None, _) => warn!("no buffer for {:?}", e),
            }
        }
        for id in ids.iter() {
            let Some(block) = self.topology.block_mut(*id) else {
                continue;
            };
            for (port, input) in block.sio_mut().inputs_mut().iter_mut().enumerate() {
                if let Some(r) = readers.remove(&(*id, port)) {
                    input.set_reader(Some(r));
                } else if !keep_reader.contains(&(*id, port)) {
                    input.set_reader(None);
                }
            }
        }

        // scheduling state
        let active: BTreeSet<BlockId> = plan.active.iter().copied().collect();
        for id in ids.iter() {
            let Some(block) = self.topology.block_mut(*id) else {
                continue;
            };
            if !active.contains(id) {
                block.set_detail(None);
            } else if block.detail().is_none() {
                block.set_detail(Some(BlockDetail::new(config.queue_size, &self.counters)));
            }
            block.mio_mut().disconnect_all();
        }

        // message wiring
        for e in plan.message_edges.iter() {
            let Some(sender) = self.topology.block(e.dst).and_then(|b| b.inbox()) else {
                warn!("no inbox for {:?}", e);
                continue;
            };
            if let Some(b) = self.topology.block_mut(e.src) {
                b.mio_mut().output_mut(e.src_port).connect(e.dst_port, sender);
            }
            if let Some(b) = self.topology.block_mut(e.dst) {
                b.mio_mut().input_mut(e.dst_port).add_connection();
            }
        }

        Ok(())
    }
}

impl Default for Flowgraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop buffers, message connections and runtime state of a block.
fn release(b: &mut Block) {
    for o in b.sio_mut().outputs_mut() {
        o.set_writer(None);
    }
    for i in b.sio_mut().inputs_mut() {
        i.set_reader(None);
    }
    b.mio_mut().disconnect_all();
    b.set_detail(None);
}
