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

/// Store received samples in vector.
///
/// Get the samples with [`Flowgraph::kernel`](crate::runtime::Flowgraph::kernel) once the
/// flowgraph terminated.
pub struct VectorSink<T> {
    items: Vec<T>,
}

impl<T: Copy + Send + 'static> VectorSink<T> {
    /// Create VectorSink block with an initial capacity
    pub fn new(capacity: usize) -> Block {
        Block::new(
            BlockMetaBuilder::new("VectorSink").build(),
            StreamIoBuilder::new()
                .add_input("in", std::mem::size_of::<T>())
                .build(),
            MessageIoBuilder::new().build(),
            VectorSink {
                items: Vec::<T>::with_capacity(capacity),
            },
        )
    }

    /// Received items
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

#[doc(hidden)]
impl<T: Copy + Send + 'static> Kernel for VectorSink<T> {
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let input = sio.input(0);
        let i = input.slice::<T>();
        self.items.extend_from_slice(i);
        let n = i.len();
        input.consume(n);

        if input.finished() {
            io.finished = true;
        }

        Ok(())
    }
}
