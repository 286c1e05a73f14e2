#![warn(missing_docs)]
#![allow(clippy::new_ret_no_self)]
#![allow(clippy::new_without_default)]

//! A streaming dataflow scheduler for SDR flowgraphs.
//!
//! Blocks exchange samples through circular buffers and messages through bounded inboxes. A
//! committed flowgraph is split into partitions, i.e., weakly connected components, and every
//! partition is driven by its own thread. Termination travels in both directions: a finished
//! source ends its downstream blocks, a finished sink detaches from its upstream.
//!
//! ## Example
//! An example flowgraph that forwards 123 zeros into a sink:
//! ```
//! use sdrflow::blocks::Head;
//! use sdrflow::blocks::NullSink;
//! use sdrflow::blocks::NullSource;
//! use sdrflow::connect;
//! use sdrflow::runtime::Error;
//! use sdrflow::runtime::Flowgraph;
//! use sdrflow::runtime::Runtime;
//!
//! fn main() -> Result<(), Error> {
//!     let mut fg = Flowgraph::new();
//!
//!     let src = fg.add_block(NullSource::<u8>::new());
//!     let head = fg.add_block(Head::<u8>::new(123));
//!     let snk = fg.add_block(NullSink::<u8>::new());
//!
//!     connect!(fg, src > head > snk);
//!
//!     Runtime::new().run(fg)?;
//!
//!     Ok(())
//! }
//! ```

/// Logging macro
#[macro_use]
pub extern crate tracing;

// re-exports
pub use anyhow;
pub use futures;

/// Standard block library.
pub mod blocks;
/// Flowgraphs, blocks and the runtime.
pub mod runtime;

/// Connect a chain of blocks, output 0 to input 0.
///
/// `connect!(fg, a > b > c)` is [`Flowgraph::connect_chain`](crate::runtime::Flowgraph::connect_chain)
/// over `[a, b, c]`. Errors are returned from the enclosing function with `?`. Either all links
/// are added or none.
#[macro_export]
macro_rules! connect {
    ($fg:expr, $first:ident $(> $rest:ident)+) => {
        $fg.connect_chain(&[$first $(, $rest)+])?
    };
}

/// Commonly used items.
pub mod prelude {
    pub use crate::anyhow::Result;
    pub use crate::connect;
    pub use crate::runtime::Block;
    pub use crate::runtime::BlockMeta;
    pub use crate::runtime::BlockMetaBuilder;
    pub use crate::runtime::Flowgraph;
    pub use crate::runtime::Kernel;
    pub use crate::runtime::MessageIo;
    pub use crate::runtime::MessageIoBuilder;
    pub use crate::runtime::Pmt;
    pub use crate::runtime::Runtime;
    pub use crate::runtime::StreamIo;
    pub use crate::runtime::StreamIoBuilder;
    pub use crate::runtime::WorkIo;
}
