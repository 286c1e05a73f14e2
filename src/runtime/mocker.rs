use futures::channel::mpsc::Receiver;
use futures::channel::mpsc::channel;
use std::mem;
use std::ptr;
use std::slice;

use crate::runtime::AllocationCounters;
use crate::runtime::Block;
use crate::runtime::BlockDetail;
use crate::runtime::BlockId;
use crate::runtime::BlockMessage;
use crate::runtime::BlockPortCtx;
use crate::runtime::Config;
use crate::runtime::Error;
use crate::runtime::Kernel;
use crate::runtime::Pmt;
use crate::runtime::PortId;
use crate::runtime::WorkIo;
use crate::runtime::buffer::BufferReader;
use crate::runtime::buffer::BufferWriter;

/// Mocker for a block
///
/// A harness to run a block without a runtime. Used for unit tests and benchmarking.
///
/// ```
/// use sdrflow::blocks::AddConst;
/// use sdrflow::runtime::Mocker;
///
/// # fn main() -> sdrflow::runtime::Result<()> {
/// let mut mocker = Mocker::new(AddConst::<u32>::new(2));
/// mocker.input(0, vec![0u32, 1, 2, 3])?;
/// mocker.init_output::<u32>(0, 16)?;
/// mocker.run()?;
/// assert_eq!(mocker.output::<u32>(0), vec![2, 3, 4, 5]);
/// # Ok(())
/// # }
/// ```
pub struct Mocker {
    block: Block,
    counters: AllocationCounters,
    inputs: Vec<Option<BufferWriter>>,
    outputs: Vec<Option<BufferReader>>,
    message_sinks: Vec<Receiver<BlockMessage>>,
    messages: Vec<Vec<Pmt>>,
}

impl Mocker {
    /// Create mocker
    pub fn new(mut block: Block) -> Self {
        let counters = AllocationCounters::new();
        let queue_size = Config::default().queue_size;
        block.set_detail(Some(BlockDetail::new(queue_size, &counters)));

        let mut messages = Vec::new();
        let mut message_sinks = Vec::new();
        for (n, p) in block.mio_mut().outputs_mut().iter_mut().enumerate() {
            messages.push(Vec::new());
            let (tx, rx) = channel(queue_size);
            message_sinks.push(rx);
            p.connect(n, tx);
        }

        let inputs = block.sio().inputs().iter().map(|_| None).collect();
        let outputs = block.sio().outputs().iter().map(|_| None).collect();

        Mocker {
            block,
            counters,
            inputs,
            outputs,
            message_sinks,
            messages,
        }
    }

    /// Provide the data of an input, replacing data that was not consumed yet.
    pub fn input<T: Copy>(&mut self, id: usize, data: Vec<T>) -> Result<(), Error> {
        let port = self.input_port(id)?;
        let item_size = check_item::<T>(self.block.sio().inputs()[port].item_size())?;
        let name = self.block.sio().inputs()[port].name().to_string();

        let mut writer = BufferWriter::new(item_size, data.len(), &name, &self.counters)?;
        let reader = writer.add_reader((BlockId(0), port), &self.counters);
        // SAFETY: `T` is `Copy` and exactly `item_size` bytes large.
        let bytes = unsafe { slice::from_raw_parts(data.as_ptr().cast::<u8>(), data.len() * item_size) };
        writer.slice_bytes()[..bytes.len()].copy_from_slice(bytes);
        writer.write(data.len());

        self.block.sio_mut().inputs_mut()[port].set_reader(Some(reader));
        self.inputs[port] = Some(writer);
        Ok(())
    }

    /// Mark an input as finished, as if its upstream block terminated.
    pub fn finish_input(&mut self, id: usize) {
        if let Some(w) = self.inputs.get(id).and_then(|w| w.as_ref()) {
            w.finish();
        }
    }

    /// Initialize output buffer with given size
    pub fn init_output<T: Copy>(&mut self, id: usize, size: usize) -> Result<(), Error> {
        let output = self
            .block
            .sio()
            .outputs()
            .get(id)
            .ok_or(Error::InvalidStreamPort(BlockPortCtx::None, PortId::Index(id)))?;
        let item_size = check_item::<T>(output.item_size())?;
        let writer = BufferWriter::new(item_size, size, output.name(), &self.counters)?;
        self.outputs[id] = Some(writer.add_reader((BlockId(0), id), &self.counters));
        self.block.sio_mut().outputs_mut()[id].set_writer(Some(writer));
        Ok(())
    }

    /// Take the items produced on an output so far.
    pub fn output<T: Copy>(&mut self, id: usize) -> Vec<T> {
        let Some(reader) = self.outputs.get_mut(id).and_then(|r| r.as_mut()) else {
            return Vec::new();
        };
        let bytes = reader.slice_bytes();
        let n = bytes.len() / mem::size_of::<T>().max(1);
        let mut items: Vec<T> = Vec::with_capacity(n);
        // SAFETY: the buffer holds `n` initialized items of type `T`, checked in `init_output`.
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                items.as_mut_ptr().cast::<u8>(),
                n * mem::size_of::<T>(),
            );
            items.set_len(n);
        }
        reader.read(n);
        items
    }

    /// Post a PMT to a message handler of the block.
    pub fn post(&mut self, port: impl Into<PortId>, p: Pmt) -> Result<(), Error> {
        let port = port.into();
        let id = match &port {
            PortId::Name(n) => self.block.mio().input_name_to_id(n),
            PortId::Index(i) => (*i < self.block.mio().inputs().len()).then_some(*i),
        }
        .ok_or(Error::InvalidMessagePort(BlockPortCtx::None, port))?;

        if let Some(mut inbox) = self.block.inbox() {
            inbox
                .try_send(BlockMessage::Call {
                    port_id: id,
                    data: p,
                })
                .map_err(|_| Error::ChannelFull(self.block.type_name().to_string()))?;
        }
        let mut io = WorkIo::default();
        self.block.handle_messages(&mut io)?;
        self.collect_messages();
        Ok(())
    }

    /// Call `work` until the block makes no more progress or finishes.
    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            let mut io = WorkIo::default();
            self.block.handle_messages(&mut io)?;
            let progress = self.block.work(&mut io)?;
            self.collect_messages();
            if io.finished {
                return self.block.finish();
            }
            if !progress {
                return Ok(());
            }
        }
    }

    /// Init the block wrapped by the mocker
    pub fn init(&mut self) -> Result<(), Error> {
        self.block.init()
    }

    /// Deinit the block wrapped by the mocker
    pub fn deinit(&mut self) -> Result<(), Error> {
        self.block.deinit()
    }

    /// Get produced PMTs from output message ports.
    pub fn messages(&self) -> Vec<Vec<Pmt>> {
        self.messages.clone()
    }

    /// Take produced PMTs from output message ports.
    pub fn take_messages(&mut self) -> Vec<Vec<Pmt>> {
        let n = self.messages.len();
        mem::replace(&mut self.messages, vec![Vec::new(); n])
    }

    /// Downcast the kernel of the block.
    pub fn kernel<K: Kernel + 'static>(&self) -> Option<&K> {
        self.block.kernel()
    }

    /// The wrapped block.
    pub fn block(&self) -> &Block {
        &self.block
    }

    fn input_port(&self, id: usize) -> Result<usize, Error> {
        (id < self.block.sio().inputs().len())
            .then_some(id)
            .ok_or(Error::InvalidStreamPort(BlockPortCtx::None, PortId::Index(id)))
    }

    fn collect_messages(&mut self) {
        for (n, r) in self.message_sinks.iter_mut().enumerate() {
            while let Ok(Some(BlockMessage::Call { data, .. })) = r.try_next() {
                if data != Pmt::Finished {
                    self.messages[n].push(data);
                }
            }
        }
    }
}

fn check_item<T>(item_size: usize) -> Result<usize, Error> {
    if mem::size_of::<T>() != item_size {
        return Err(Error::RuntimeError(format!(
            "mocker: item type has {} bytes, port expects {}",
            mem::size_of::<T>(),
            item_size
        )));
    }
    Ok(item_size)
}
