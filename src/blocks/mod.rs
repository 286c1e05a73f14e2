//! ## Standard blocks
//!
//! ## Generic blocks
//! | Block | Usage |
//! |---|---|
//! | [Apply] | Apply a function to each sample |
//! | [AddConst] | Add a constant to each sample |
//! | [Copy] | Copy input to output |
//! | [Nop] | Any number of optional ports, consumes everything |
//!
//! ## Limiting blocks
//! | Block | Usage |
//! |---|---|
//! | [Throttle] | Limits graph sample rate |
//! | [Head] | Stops graph after specified number of samples |
//!
//! ## Source/sink blocks
//! | Block | Usage |
//! |---|---|
//! | [NullSource] | Generates a stream of zeros |
//! | [NullSink] | Drops samples |
//! | [VectorSource] | Streams the items of a vector |
//! | [VectorSink] | Stores samples in a vector |
//!
//! ## Message blocks
//! | Block | Usage |
//! |---|---|
//! | [MessageSource](MessageSourceBuilder) | Repeats a fixed message on an interval |
//! | [MessageSink] | Stores received messages |

mod add_const;
pub use add_const::AddConst;

mod apply;
pub use apply::Apply;

mod copy;
pub use copy::Copy;

mod head;
pub use head::Head;

mod message_sink;
pub use message_sink::MessageSink;

mod message_source;
pub use message_source::{MessageSource, MessageSourceBuilder};

mod nop;
pub use nop::Nop;

mod null_sink;
pub use null_sink::NullSink;

mod null_source;
pub use null_source::NullSource;

mod throttle;
pub use throttle::Throttle;

mod vector_sink;
pub use vector_sink::VectorSink;

mod vector_source;
pub use vector_source::VectorSource;
