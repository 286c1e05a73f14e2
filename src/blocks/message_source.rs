use std::cmp;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crate::anyhow::Result;
use crate::runtime::Block;
use crate::runtime::BlockMeta;
use crate::runtime::BlockMetaBuilder;
use crate::runtime::Kernel;
use crate::runtime::MessageIo;
use crate::runtime::MessageIoBuilder;
use crate::runtime::Pmt;
use crate::runtime::StreamIo;
use crate::runtime::StreamIoBuilder;
use crate::runtime::WorkIo;

const MAX_SLEEP: Duration = Duration::from_millis(10);

/// Output the same message periodically.
pub struct MessageSource {
    message: Pmt,
    interval: Duration,
    t_last: Option<Instant>,
    n_messages: Option<usize>,
}

impl MessageSource {
    /// Create MessageSource block
    pub fn new(message: Pmt, interval: Duration, n_messages: Option<usize>) -> Block {
        Block::new(
            BlockMetaBuilder::new("MessageSource").build(),
            StreamIoBuilder::new().build(),
            MessageIoBuilder::new().add_output("out").build(),
            MessageSource {
                message,
                interval,
                t_last: None,
                n_messages,
            },
        )
    }
}

#[doc(hidden)]
impl Kernel for MessageSource {
    fn work(
        &mut self,
        io: &mut WorkIo,
        _sio: &mut StreamIo,
        mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        if self.n_messages == Some(0) {
            io.finished = true;
            return Ok(());
        }

        let now = Instant::now();
        let due = self.t_last.map(|t| t + self.interval);
        if due.is_none_or(|d| now >= d) {
            mio.post(0, self.message.clone())?;
            self.t_last = Some(now);
            if let Some(ref mut n) = self.n_messages {
                *n -= 1;
                if *n == 0 {
                    io.finished = true;
                    return Ok(());
                }
            }
        } else if let Some(d) = due {
            thread::sleep(cmp::min(d - now, MAX_SLEEP));
        }

        io.call_again = true;
        Ok(())
    }

    fn init(&mut self, _mio: &mut MessageIo, _meta: &mut BlockMeta) -> Result<()> {
        self.t_last = None;
        Ok(())
    }
}

/// Repeats a fixed message on an interval
///
/// # Inputs
///
/// No inputs.
///
/// # Outputs
///
/// **Message**: `out`: Message output
///
/// # Usage
/// ```
/// use std::time;
/// use sdrflow::blocks::MessageSourceBuilder;
/// use sdrflow::runtime::{Flowgraph, Pmt};
///
/// let mut fg = Flowgraph::new();
///
/// // Repeat the message "foo" every 100ms twenty times
/// let msg_source = fg.add_block(
///     MessageSourceBuilder::new(
///         Pmt::String("foo".to_string()),
///         time::Duration::from_millis(100),
///     )
///     .n_messages(20)
///     .build()
/// );
/// ```
pub struct MessageSourceBuilder {
    message: Pmt,
    duration: Duration,
    n_messages: Option<usize>,
}

impl MessageSourceBuilder {
    /// Create MessageSource builder
    pub fn new(message: Pmt, duration: Duration) -> MessageSourceBuilder {
        MessageSourceBuilder {
            message,
            duration,
            n_messages: None,
        }
    }
    /// Number of message to send
    #[must_use]
    pub fn n_messages(mut self, n: usize) -> MessageSourceBuilder {
        self.n_messages = Some(n);
        self
    }
    /// Build Message Source block
    pub fn build(self) -> Block {
        MessageSource::new(self.message, self.duration, self.n_messages)
    }
}
