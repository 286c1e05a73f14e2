//! Stream Ports

use std::mem;
use std::slice;

use crate::runtime::buffer::BufferReader;
use crate::runtime::buffer::BufferWriter;

fn check_layout<T>(item_size: usize) {
    assert!(
        mem::size_of::<T>() > 0 && item_size % mem::align_of::<T>() == 0,
        "type of {} bytes (align {}) does not fit items of {} bytes",
        mem::size_of::<T>(),
        mem::align_of::<T>(),
        item_size
    );
}

/// Stream input port of a block.
#[derive(Debug)]
pub struct StreamInput {
    name: String,
    item_size: usize,
    min_items: usize,
    optional: bool,
    reader: Option<BufferReader>,
    consumed: u64,
    violation: Option<String>,
}

impl StreamInput {
    /// Create a mandatory stream input.
    pub fn new(name: &str, item_size: usize) -> StreamInput {
        StreamInput {
            name: name.to_string(),
            item_size,
            min_items: 1,
            optional: false,
            reader: None,
            consumed: 0,
            violation: None,
        }
    }

    /// Size of one item in bytes.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items needed before the block is scheduled.
    pub fn min_items(&self) -> usize {
        self.min_items
    }

    /// Optional inputs may stay unconnected.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Has a buffer attached.
    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    /// Items available for reading.
    pub fn available(&self) -> usize {
        self.reader.as_ref().map_or(0, |r| r.available_data())
    }

    /// Readable items as raw bytes.
    pub fn bytes(&self) -> &[u8] {
        match self.reader.as_ref() {
            Some(r) => r.slice_bytes(),
            None => &[],
        }
    }

    /// Readable items.
    ///
    /// # Panics
    /// If `T` does not fit the item layout of the port.
    pub fn slice<T: Copy>(&self) -> &[T] {
        check_layout::<T>(self.item_size);
        let bytes = self.bytes();
        // SAFETY: the buffer is 64-byte aligned and items start at multiples of `item_size`,
        // which is a multiple of the alignment of `T`.
        unsafe {
            slice::from_raw_parts(
                bytes.as_ptr().cast::<T>(),
                bytes.len() / mem::size_of::<T>(),
            )
        }
    }

    /// Mark `n` items as consumed.
    pub fn consume(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if self.reader.as_mut().map_or(0, |r| r.read(n)) == n {
            self.consumed += n as u64;
        } else {
            self.violation = Some(format!(
                "consumed {} items on input {}, only {} available",
                n,
                self.name,
                self.available()
            ));
        }
    }

    /// Upstream finished and all items are consumed. Unconnected inputs are always finished.
    pub fn finished(&self) -> bool {
        self.reader.as_ref().is_none_or(|r| r.finished())
    }

    /// The upstream block finished. Items may still be readable.
    pub fn upstream_done(&self) -> bool {
        self.reader.as_ref().is_none_or(|r| r.writer_done())
    }

    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }

    pub(crate) fn reader(&self) -> Option<&BufferReader> {
        self.reader.as_ref()
    }

    pub(crate) fn set_reader(&mut self, reader: Option<BufferReader>) {
        self.reader = reader;
    }

    pub(crate) fn take_violation(&mut self) -> Option<String> {
        self.violation.take()
    }
}

/// Stream output port of a block.
#[derive(Debug)]
pub struct StreamOutput {
    name: String,
    item_size: usize,
    min_items: usize,
    optional: bool,
    writer: Option<BufferWriter>,
    produced: u64,
    violation: Option<String>,
}

impl StreamOutput {
    /// Create a mandatory stream output.
    pub fn new(name: &str, item_size: usize) -> StreamOutput {
        StreamOutput {
            name: name.to_string(),
            item_size,
            min_items: 1,
            optional: false,
            writer: None,
            produced: 0,
            violation: None,
        }
    }

    /// Size of one item in bytes.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free items needed before the block is scheduled.
    pub fn min_items(&self) -> usize {
        self.min_items
    }

    /// Optional outputs may stay unconnected.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Has a buffer attached.
    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    /// Items that can be written.
    pub fn space(&self) -> usize {
        self.writer.as_ref().map_or(0, |w| w.available_space())
    }

    /// Writable items as raw bytes.
    pub fn bytes(&mut self) -> &mut [u8] {
        match self.writer.as_mut() {
            Some(w) => w.slice_bytes(),
            None => &mut [],
        }
    }

    /// Writable items.
    ///
    /// # Panics
    /// If `T` does not fit the item layout of the port.
    pub fn slice<T: Copy>(&mut self) -> &mut [T] {
        check_layout::<T>(self.item_size);
        let bytes = self.bytes();
        // SAFETY: see `StreamInput::slice`
        unsafe {
            slice::from_raw_parts_mut(
                bytes.as_mut_ptr().cast::<T>(),
                bytes.len() / mem::size_of::<T>(),
            )
        }
    }

    /// Publish `n` items, written to the front of [`slice`](Self::slice).
    pub fn produce(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let written = self.writer.as_mut().map(|w| w.write(n));
        match written {
            Some(w) if w == n => self.produced += n as u64,
            // unconnected optional output, items go nowhere
            None if self.optional => {}
            _ => {
                self.violation = Some(format!(
                    "produced {} items on output {}, only {} free",
                    n,
                    self.name,
                    self.space()
                ));
            }
        }
    }

    /// Whether at least one downstream block still consumes this output.
    pub fn has_readers(&self) -> bool {
        self.writer.as_ref().is_some_and(|w| w.has_attached_readers())
    }

    pub(crate) fn produced(&self) -> u64 {
        self.produced
    }

    pub(crate) fn writer(&self) -> Option<&BufferWriter> {
        self.writer.as_ref()
    }

    pub(crate) fn set_writer(&mut self, writer: Option<BufferWriter>) {
        self.writer = writer;
    }

    pub(crate) fn take_violation(&mut self) -> Option<String> {
        self.violation.take()
    }
}

/// Port count bounds and item sizes of one side of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoSignature {
    /// Ports that have to be connected
    pub min_ports: usize,
    /// All declared ports
    pub max_ports: usize,
    /// Item size per port
    pub item_sizes: Vec<usize>,
}

/// Stream ports of a block.
#[derive(Debug)]
pub struct StreamIo {
    inputs: Vec<StreamInput>,
    outputs: Vec<StreamOutput>,
}

impl StreamIo {
    fn new(inputs: Vec<StreamInput>, outputs: Vec<StreamOutput>) -> StreamIo {
        StreamIo { inputs, outputs }
    }

    /// All inputs.
    pub fn inputs(&self) -> &[StreamInput] {
        &self.inputs
    }

    /// All inputs, mutable.
    pub fn inputs_mut(&mut self) -> &mut [StreamInput] {
        &mut self.inputs
    }

    /// Input by index.
    pub fn input(&mut self, id: usize) -> &mut StreamInput {
        &mut self.inputs[id]
    }

    /// Input by index, shared.
    pub fn input_ref(&self, id: usize) -> &StreamInput {
        &self.inputs[id]
    }

    /// Input with this name.
    pub fn input_by_name(&self, name: &str) -> Option<&StreamInput> {
        self.inputs.iter().find(|x| x.name() == name)
    }

    /// Index of the input with this name.
    pub fn input_name_to_id(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|x| x.name() == name)
    }

    /// All outputs.
    pub fn outputs(&self) -> &[StreamOutput] {
        &self.outputs
    }

    /// All outputs, mutable.
    pub fn outputs_mut(&mut self) -> &mut [StreamOutput] {
        &mut self.outputs
    }

    /// Output by index.
    pub fn output(&mut self, id: usize) -> &mut StreamOutput {
        &mut self.outputs[id]
    }

    /// Output by index, shared.
    pub fn output_ref(&self, id: usize) -> &StreamOutput {
        &self.outputs[id]
    }

    /// Output with this name.
    pub fn output_by_name(&self, name: &str) -> Option<&StreamOutput> {
        self.outputs.iter().find(|x| x.name() == name)
    }

    /// Index of the output with this name.
    pub fn output_name_to_id(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|x| x.name() == name)
    }

    /// Borrow inputs and outputs at the same time.
    pub fn split(&mut self) -> (&mut [StreamInput], &mut [StreamOutput]) {
        (&mut self.inputs, &mut self.outputs)
    }

    /// Item sizes of the inputs.
    pub fn input_signature(&self) -> IoSignature {
        IoSignature {
            min_ports: self.inputs.iter().filter(|i| !i.optional).count(),
            max_ports: self.inputs.len(),
            item_sizes: self.inputs.iter().map(|i| i.item_size).collect(),
        }
    }

    /// Item sizes of the outputs.
    pub fn output_signature(&self) -> IoSignature {
        IoSignature {
            min_ports: self.outputs.iter().filter(|o| !o.optional).count(),
            max_ports: self.outputs.len(),
            item_sizes: self.outputs.iter().map(|o| o.item_size).collect(),
        }
    }

    /// Total items moved through all ports, used to detect progress.
    pub(crate) fn transferred(&self) -> u64 {
        self.inputs.iter().map(|i| i.consumed()).sum::<u64>()
            + self.outputs.iter().map(|o| o.produced()).sum::<u64>()
    }

    pub(crate) fn take_violation(&mut self) -> Option<String> {
        let mut violation = None;
        for i in self.inputs.iter_mut() {
            violation = violation.or(i.take_violation());
        }
        for o in self.outputs.iter_mut() {
            violation = violation.or(o.take_violation());
        }
        violation
    }
}

/// Builder for [`StreamIo`].
pub struct StreamIoBuilder {
    inputs: Vec<StreamInput>,
    outputs: Vec<StreamOutput>,
    last_output: bool,
}

impl StreamIoBuilder {
    /// Empty builder.
    pub fn new() -> StreamIoBuilder {
        StreamIoBuilder {
            inputs: Vec::new(),
            outputs: Vec::new(),
            last_output: false,
        }
    }

    /// Add a mandatory input.
    #[must_use]
    pub fn add_input(mut self, name: &str, item_size: usize) -> StreamIoBuilder {
        self.inputs.push(StreamInput::new(name, item_size));
        self.last_output = false;
        self
    }

    /// Add an input that may stay unconnected.
    #[must_use]
    pub fn add_optional_input(mut self, name: &str, item_size: usize) -> StreamIoBuilder {
        let mut i = StreamInput::new(name, item_size);
        i.optional = true;
        self.inputs.push(i);
        self.last_output = false;
        self
    }

    /// Add a mandatory output.
    #[must_use]
    pub fn add_output(mut self, name: &str, item_size: usize) -> StreamIoBuilder {
        self.outputs.push(StreamOutput::new(name, item_size));
        self.last_output = true;
        self
    }

    /// Add an output that may stay unconnected.
    #[must_use]
    pub fn add_optional_output(mut self, name: &str, item_size: usize) -> StreamIoBuilder {
        let mut o = StreamOutput::new(name, item_size);
        o.optional = true;
        self.outputs.push(o);
        self.last_output = true;
        self
    }

    /// Set the minimum number of items per call for the port added last.
    #[must_use]
    pub fn min_items(mut self, n: usize) -> StreamIoBuilder {
        let n = n.max(1);
        if self.last_output {
            if let Some(o) = self.outputs.last_mut() {
                o.min_items = n;
            }
        } else if let Some(i) = self.inputs.last_mut() {
            i.min_items = n;
        }
        self
    }

    /// Finish.
    pub fn build(self) -> StreamIo {
        StreamIo::new(self.inputs, self.outputs)
    }
}

impl Default for StreamIoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::AllocationCounters;
    use crate::runtime::BlockId;

    #[test]
    fn builder() {
        let sio = StreamIoBuilder::new()
            .add_input("in", 4)
            .min_items(16)
            .add_optional_input("aux", 4)
            .add_output("out", 8)
            .build();
        assert_eq!(sio.input_ref(0).min_items(), 16);
        assert_eq!(sio.input_ref(1).min_items(), 1);
        assert_eq!(sio.input_name_to_id("aux"), Some(1));
        assert_eq!(
            sio.input_signature(),
            IoSignature {
                min_ports: 1,
                max_ports: 2,
                item_sizes: vec![4, 4]
            }
        );
        assert!(sio.input_ref(1).finished());
    }

    #[test]
    fn typed_access_and_violations() {
        let c = AllocationCounters::new();
        let mut out = StreamOutput::new("out", 4);
        let mut inp = StreamInput::new("in", 4);
        let w = BufferWriter::new(4, 8, "out", &c).unwrap();
        inp.set_reader(Some(w.add_reader((BlockId(1), 0), &c)));
        out.set_writer(Some(w));

        let o = out.slice::<f32>();
        assert_eq!(o.len(), 8);
        o[..3].copy_from_slice(&[1.0, 2.0, 3.0]);
        out.produce(3);
        assert_eq!(inp.slice::<f32>(), &[1.0, 2.0, 3.0]);

        inp.consume(4);
        assert!(inp.take_violation().is_some());
        inp.consume(3);
        assert!(inp.take_violation().is_none());
        assert_eq!(inp.consumed(), 3);
    }
}
