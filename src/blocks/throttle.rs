use std::cmp;
use std::marker::PhantomData;
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
use crate::runtime::StreamIo;
use crate::runtime::StreamIoBuilder;
use crate::runtime::WorkIo;

const MAX_SLEEP: Duration = Duration::from_millis(10);

/// Limit sample rate.
///
/// The block never sleeps longer than a few milliseconds per call, so a stopped flowgraph
/// still exits quickly.
///
/// # Inputs
///
/// `in`: Input
///
/// # Outputs
///
/// `out`: Output
///
/// # Usage
/// ```
/// use sdrflow::blocks::Throttle;
/// use sdrflow::runtime::Flowgraph;
///
/// let mut fg = Flowgraph::new();
///
/// let throttle = fg.add_block(Throttle::<f32>::new(1_000_000.0));
/// ```
pub struct Throttle<T: Copy + Send + 'static> {
    rate: f64,
    t_init: Instant,
    n_items: usize,
    _type: PhantomData<T>,
}

impl<T: Copy + Send + 'static> Throttle<T> {
    /// Creates a new Throttle block which will throttle to the specified rate in items per second.
    pub fn new(rate: f64) -> Block {
        Block::new(
            BlockMetaBuilder::new("Throttle").build(),
            StreamIoBuilder::new()
                .add_input("in", std::mem::size_of::<T>())
                .add_output("out", std::mem::size_of::<T>())
                .build(),
            MessageIoBuilder::new().build(),
            Throttle::<T> {
                rate,
                t_init: Instant::now(),
                n_items: 0,
                _type: PhantomData,
            },
        )
    }
}

#[doc(hidden)]
impl<T: Copy + Send + 'static> Kernel for Throttle<T> {
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let (inputs, outputs) = sio.split();
        let i = inputs[0].slice::<T>();
        let o = outputs[0].slice::<T>();
        let i_len = i.len();

        let target_items = (self.t_init.elapsed().as_secs_f64() * self.rate).floor() as usize;
        let possible = cmp::min(i_len, o.len());
        let m = cmp::min(possible, target_items.saturating_sub(self.n_items));
        if m > 0 {
            o[..m].copy_from_slice(&i[..m]);
            self.n_items += m;
            inputs[0].consume(m);
            outputs[0].produce(m);
        }

        if inputs[0].finished() && m == i_len {
            io.finished = true;
        } else if m < possible && self.rate > 0.0 {
            // items are waiting for their time slot
            let due = Duration::from_secs_f64((self.n_items + 1) as f64 / self.rate);
            thread::sleep(cmp::min(due.saturating_sub(self.t_init.elapsed()), MAX_SLEEP));
            io.call_again = true;
        }

        Ok(())
    }

    fn init(&mut self, _mio: &mut MessageIo, _meta: &mut BlockMeta) -> Result<()> {
        self.t_init = Instant::now();
        self.n_items = 0;
        Ok(())
    }
}
