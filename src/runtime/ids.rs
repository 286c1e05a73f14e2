use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Identifier of a block (or composite) inside a flowgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

impl BlockId {
    /// Endpoint at the given port of this block.
    pub fn port(self, port: impl Into<PortId>) -> Endpoint {
        Endpoint::new(self, port)
    }
}

impl From<usize> for BlockId {
    fn from(item: usize) -> Self {
        BlockId(item)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Port Identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortId {
    /// Index
    Index(usize),
    /// Name
    Name(String),
}

impl From<usize> for PortId {
    fn from(item: usize) -> Self {
        PortId::Index(item)
    }
}

impl From<&str> for PortId {
    fn from(item: &str) -> Self {
        PortId::Name(item.to_string())
    }
}

impl From<String> for PortId {
    fn from(item: String) -> Self {
        PortId::Name(item)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortId::Index(i) => write!(f, "{i}"),
            PortId::Name(n) => write!(f, "{n}"),
        }
    }
}

/// A port on a specific block.
///
/// A bare [`BlockId`] converts into the endpoint at port 0, which is what the single-port
/// `connect` form uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Block
    pub block: BlockId,
    /// Port on that block
    pub port: PortId,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(block: BlockId, port: impl Into<PortId>) -> Self {
        Endpoint {
            block,
            port: port.into(),
        }
    }
}

impl From<BlockId> for Endpoint {
    fn from(block: BlockId) -> Self {
        Endpoint::new(block, 0)
    }
}

impl<P: Into<PortId>> From<(BlockId, P)> for Endpoint {
    fn from((block, port): (BlockId, P)) -> Self {
        Endpoint::new(block, port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.block, self.port)
    }
}

/// Block context used in port errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockPortCtx {
    /// No block context available
    None,
    /// Block referenced by id
    Id(BlockId),
    /// Block referenced by instance name
    Name(String),
}

impl fmt::Display for BlockPortCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockPortCtx::None => write!(f, "<unknown>"),
            BlockPortCtx::Id(id) => write!(f, "{id}"),
            BlockPortCtx::Name(n) => write!(f, "{n}"),
        }
    }
}

/// Direction of a stream port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Input
    Input,
    /// Output
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_conversions() {
        let b = BlockId(3);
        assert_eq!(Endpoint::from(b), Endpoint::new(b, 0));
        assert_eq!(Endpoint::from((b, "out")), b.port("out"));
        assert_eq!(b.port(1).to_string(), "#3.1");
    }
}
