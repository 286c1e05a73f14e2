use std::collections::BTreeSet;

use crate::runtime::BlockDescription;
use crate::runtime::BlockId;
use crate::runtime::BlockMeta;
use crate::runtime::BlockMetaBuilder;
use crate::runtime::BlockPortCtx;
use crate::runtime::Endpoint;
use crate::runtime::Error;
use crate::runtime::PortId;
use crate::runtime::buffer::BufferSize;
use crate::runtime::topology::Node;
use crate::runtime::topology::PortInfo;
use crate::runtime::topology::Topology;

/// External port of a hierarchical block and the inner ports it maps to.
#[derive(Debug, Clone)]
pub(crate) struct Boundary {
    pub(crate) name: String,
    pub(crate) item_size: usize,
    pub(crate) endpoints: Vec<(BlockId, usize)>,
}

impl Boundary {
    fn new(name: &str, item_size: usize) -> Boundary {
        Boundary {
            name: name.to_string(),
            item_size,
            endpoints: Vec::new(),
        }
    }
}

fn find(ports: &[Boundary], port: &PortId) -> Option<usize> {
    match port {
        PortId::Index(i) => (*i < ports.len()).then_some(*i),
        PortId::Name(n) => ports.iter().position(|p| &p.name == n),
    }
}

/// Hierarchical Block
///
/// A subgraph with its own stream and message ports. From the outside it is connected like
/// any other block. On commit it is replaced by its inner blocks and every connection to one
/// of its ports is rewired to the inner ports behind it, so a flowgraph with hierarchical
/// blocks behaves exactly like the equivalent flat one.
///
/// ```
/// use sdrflow::blocks::AddConst;
/// use sdrflow::blocks::Copy;
/// use sdrflow::runtime::HierBlock;
///
/// # fn main() -> sdrflow::runtime::Result<()> {
/// let mut hier = HierBlock::new("AddTwice")
///     .with_input("in", 4)
///     .with_output("out", 4);
/// let a = hier.add_block(AddConst::<u32>::new(1));
/// let b = hier.add_block(AddConst::<u32>::new(1));
/// let c = hier.add_block(Copy::<u32>::new());
/// hier.connect_chain(&[a, b, c])?;
/// hier.connect_input("in", a)?;
/// hier.connect_output(c, "out")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HierBlock {
    meta: BlockMeta,
    pub(crate) topology: Topology,
    pub(crate) inputs: Vec<Boundary>,
    pub(crate) outputs: Vec<Boundary>,
    pub(crate) message_inputs: Vec<Boundary>,
    pub(crate) message_outputs: Vec<Boundary>,
}

impl HierBlock {
    /// Create an empty hierarchical block.
    pub fn new(type_name: &str) -> HierBlock {
        HierBlock {
            meta: BlockMetaBuilder::new(type_name).build(),
            topology: Topology::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            message_inputs: Vec::new(),
            message_outputs: Vec::new(),
        }
    }

    /// Declare a stream input.
    #[must_use]
    pub fn with_input(mut self, name: &str, item_size: usize) -> HierBlock {
        self.inputs.push(Boundary::new(name, item_size));
        self
    }

    /// Declare a stream output.
    #[must_use]
    pub fn with_output(mut self, name: &str, item_size: usize) -> HierBlock {
        self.outputs.push(Boundary::new(name, item_size));
        self
    }

    /// Declare a message input.
    #[must_use]
    pub fn with_message_input(mut self, name: &str) -> HierBlock {
        self.message_inputs.push(Boundary::new(name, 0));
        self
    }

    /// Declare a message output.
    #[must_use]
    pub fn with_message_output(mut self, name: &str) -> HierBlock {
        self.message_outputs.push(Boundary::new(name, 0));
        self
    }

    /// Instance name, unique within the flowgraph once added.
    pub fn instance_name(&self) -> Option<&str> {
        self.meta.instance_name()
    }

    /// Set the instance name.
    pub fn set_instance_name(&mut self, name: &str) {
        self.meta.set_instance_name(name);
    }

    /// Type name, e.g. `Copy`.
    pub fn type_name(&self) -> &str {
        self.meta.type_name()
    }

    /// Add a block or a nested hierarchical block.
    pub fn add_block(&mut self, node: impl Into<Node>) -> BlockId {
        self.topology.add_node(node)
    }

    fn check_free(&self, dst: BlockId, port: usize) -> Result<(), Error> {
        let boundary = self
            .inputs
            .iter()
            .any(|b| b.endpoints.contains(&(dst, port)));
        if boundary || self.topology.input_in_use(dst, port) {
            return Err(self.topology.port_in_use(dst, port));
        }
        Ok(())
    }

    /// Connect output 0 of `src` to input 0 of `dst`.
    pub fn connect(&mut self, src: BlockId, dst: BlockId) -> Result<(), Error> {
        self.connect_ports(src, dst)
    }

    /// Connect two inner stream ports.
    pub fn connect_ports(
        &mut self,
        src: impl Into<Endpoint>,
        dst: impl Into<Endpoint>,
    ) -> Result<(), Error> {
        let edge = self.topology.resolve_stream(&src.into(), &dst.into())?;
        self.check_free(edge.dst, edge.dst_port)?;
        self.topology.push_stream_edge(edge, BufferSize::Default);
        Ok(())
    }

    /// Connect two inner stream ports by name.
    pub fn connect_stream(
        &mut self,
        src: BlockId,
        src_port: impl Into<PortId>,
        dst: BlockId,
        dst_port: impl Into<PortId>,
    ) -> Result<(), Error> {
        self.connect_ports(src.port(src_port), dst.port(dst_port))
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
            self.check_free(edge.dst, edge.dst_port)?;
            if !used.insert((edge.dst, edge.dst_port)) {
                return Err(self.topology.port_in_use(edge.dst, edge.dst_port));
            }
            edges.push(edge);
        }
        for e in edges {
            self.topology.push_stream_edge(e, BufferSize::Default);
        }
        Ok(())
    }

    /// Connect two inner message ports.
    pub fn connect_message(
        &mut self,
        src: impl Into<Endpoint>,
        dst: impl Into<Endpoint>,
    ) -> Result<(), Error> {
        self.topology.connect_message(src.into(), dst.into())
    }

    /// Feed an external stream input into an inner input. An external input may feed several
    /// inner inputs.
    pub fn connect_input(
        &mut self,
        port: impl Into<PortId>,
        dst: impl Into<Endpoint>,
    ) -> Result<(), Error> {
        let port = port.into();
        let dst = dst.into();
        let index = find(&self.inputs, &port)
            .ok_or_else(|| Error::InvalidStreamPort(self.ctx(), port.clone()))?;
        let inner = self
            .topology
            .node(dst.block)
            .ok_or(Error::InvalidBlock(dst.block))?
            .stream_input(&dst.port)
            .ok_or_else(|| Error::InvalidStreamPort(BlockPortCtx::Id(dst.block), dst.port.clone()))?;
        let outer = &self.inputs[index];
        if outer.item_size != inner.item_size {
            return Err(Error::PortType {
                src: format!("{}.{}", self.name(), outer.name),
                src_size: outer.item_size,
                dst: format!(
                    "{}.{}",
                    self.topology.block_name(dst.block).unwrap_or("?"),
                    inner.name
                ),
                dst_size: inner.item_size,
            });
        }
        self.check_free(dst.block, inner.index)?;
        self.inputs[index].endpoints.push((dst.block, inner.index));
        Ok(())
    }

    /// Expose an inner output as external stream output.
    pub fn connect_output(
        &mut self,
        src: impl Into<Endpoint>,
        port: impl Into<PortId>,
    ) -> Result<(), Error> {
        let port = port.into();
        let src = src.into();
        let index = find(&self.outputs, &port)
            .ok_or_else(|| Error::InvalidStreamPort(self.ctx(), port.clone()))?;
        let inner = self
            .topology
            .node(src.block)
            .ok_or(Error::InvalidBlock(src.block))?
            .stream_output(&src.port)
            .ok_or_else(|| Error::InvalidStreamPort(BlockPortCtx::Id(src.block), src.port.clone()))?;
        let outer = &self.outputs[index];
        if outer.item_size != inner.item_size {
            return Err(Error::PortType {
                src: format!(
                    "{}.{}",
                    self.topology.block_name(src.block).unwrap_or("?"),
                    inner.name
                ),
                src_size: inner.item_size,
                dst: format!("{}.{}", self.name(), outer.name),
                dst_size: outer.item_size,
            });
        }
        if !outer.endpoints.is_empty() {
            return Err(Error::PortInUse {
                block: self.name(),
                port: outer.name.clone(),
            });
        }
        self.outputs[index].endpoints.push((src.block, inner.index));
        Ok(())
    }

    /// Forward an external message input to an inner message input.
    pub fn connect_message_input(
        &mut self,
        port: impl Into<PortId>,
        dst: impl Into<Endpoint>,
    ) -> Result<(), Error> {
        let port = port.into();
        let dst = dst.into();
        let index = find(&self.message_inputs, &port)
            .ok_or_else(|| Error::InvalidMessagePort(self.ctx(), port.clone()))?;
        let inner = self
            .topology
            .node(dst.block)
            .ok_or(Error::InvalidBlock(dst.block))?
            .message_input(&dst.port)
            .ok_or_else(|| Error::InvalidMessagePort(BlockPortCtx::Id(dst.block), dst.port.clone()))?;
        self.message_inputs[index].endpoints.push((dst.block, inner));
        Ok(())
    }

    /// Forward an inner message output to an external message output.
    pub fn connect_message_output(
        &mut self,
        src: impl Into<Endpoint>,
        port: impl Into<PortId>,
    ) -> Result<(), Error> {
        let port = port.into();
        let src = src.into();
        let index = find(&self.message_outputs, &port)
            .ok_or_else(|| Error::InvalidMessagePort(self.ctx(), port.clone()))?;
        let inner = self
            .topology
            .node(src.block)
            .ok_or(Error::InvalidBlock(src.block))?
            .message_output(&src.port)
            .ok_or_else(|| Error::InvalidMessagePort(BlockPortCtx::Id(src.block), src.port.clone()))?;
        self.message_outputs[index].endpoints.push((src.block, inner));
        Ok(())
    }

    /// Inner stream inputs fed by the external inputs.
    pub fn get_sources(&self) -> Vec<Endpoint> {
        self.inputs
            .iter()
            .flat_map(|b| b.endpoints.iter())
            .map(|(b, p)| Endpoint::new(*b, *p))
            .collect()
    }

    /// Inner stream outputs exposed as external outputs.
    pub fn get_sinks(&self) -> Vec<Endpoint> {
        self.outputs
            .iter()
            .flat_map(|b| b.endpoints.iter())
            .map(|(b, p)| Endpoint::new(*b, *p))
            .collect()
    }

    /// The inner graph.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    fn name(&self) -> String {
        self.instance_name()
            .unwrap_or_else(|| self.type_name())
            .to_string()
    }

    fn ctx(&self) -> BlockPortCtx {
        BlockPortCtx::Name(self.name())
    }

    pub(crate) fn input_port(&self, port: &PortId) -> Option<PortInfo> {
        let index = find(&self.inputs, port)?;
        Some(PortInfo {
            index,
            name: self.inputs[index].name.clone(),
            item_size: self.inputs[index].item_size,
        })
    }

    pub(crate) fn output_port(&self, port: &PortId) -> Option<PortInfo> {
        let index = find(&self.outputs, port)?;
        Some(PortInfo {
            index,
            name: self.outputs[index].name.clone(),
            item_size: self.outputs[index].item_size,
        })
    }

    pub(crate) fn message_input_port(&self, port: &PortId) -> Option<usize> {
        find(&self.message_inputs, port)
    }

    pub(crate) fn message_output_port(&self, port: &PortId) -> Option<usize> {
        find(&self.message_outputs, port)
    }

    pub(crate) fn description(&self, id: usize) -> BlockDescription {
        let names = |v: &[Boundary]| v.iter().map(|b| b.name.clone()).collect();
        BlockDescription {
            id,
            type_name: self.type_name().to_string(),
            instance_name: self.instance_name().unwrap_or_default().to_string(),
            stream_inputs: names(&self.inputs),
            stream_outputs: names(&self.outputs),
            message_inputs: names(&self.message_inputs),
            message_outputs: names(&self.message_outputs),
            enabled: true,
            composite: true,
        }
    }
}
