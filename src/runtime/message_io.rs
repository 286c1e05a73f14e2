//! Message Ports

use futures::channel::mpsc::Sender;

use crate::runtime::BlockMessage;
use crate::runtime::BlockPortCtx;
use crate::runtime::Error;
use crate::runtime::Pmt;
use crate::runtime::PortId;

/// Message input port.
///
/// Messages arriving on the port are passed to [`Kernel::handle`](crate::runtime::Kernel::handle)
/// together with the port index.
#[derive(Debug)]
pub struct MessageInput {
    name: String,
    connections: usize,
    finished: usize,
}

impl MessageInput {
    /// Create a message input.
    pub fn new(name: &str) -> MessageInput {
        MessageInput {
            name: name.to_string(),
            connections: 0,
            finished: 0,
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of upstream message outputs.
    pub fn connections(&self) -> usize {
        self.connections
    }

    /// All upstream outputs signalled that they are finished.
    pub fn finished(&self) -> bool {
        self.connections > 0 && self.finished >= self.connections
    }

    pub(crate) fn add_connection(&mut self) {
        self.connections += 1;
    }

    pub(crate) fn upstream_finished(&mut self) {
        self.finished += 1;
    }

    pub(crate) fn reset(&mut self) {
        self.finished = 0;
    }

    fn disconnect_all(&mut self) {
        self.connections = 0;
        self.finished = 0;
    }
}

/// Message output port.
#[derive(Debug)]
pub struct MessageOutput {
    name: String,
    handlers: Vec<(usize, Sender<BlockMessage>)>,
}

impl MessageOutput {
    /// Create an unconnected message output.
    pub fn new(name: &str) -> MessageOutput {
        MessageOutput {
            name: name.to_string(),
            handlers: Vec::new(),
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Has at least one receiver.
    pub fn is_connected(&self) -> bool {
        !self.handlers.is_empty()
    }

    pub(crate) fn connect(&mut self, port: usize, sender: Sender<BlockMessage>) {
        self.handlers.push((port, sender));
    }

    /// Send a message to all connected inputs.
    ///
    /// Inputs of blocks that already terminated are skipped. A full inbox is reported as
    /// [`Error::ChannelFull`].
    pub fn post(&mut self, p: Pmt) -> Result<(), Error> {
        for (port_id, sender) in self.handlers.iter_mut() {
            if let Err(e) = sender.try_send(BlockMessage::Call {
                port_id: *port_id,
                data: p.clone(),
            }) {
                if e.is_full() {
                    return Err(Error::ChannelFull(self.name.clone()));
                }
                debug!("message output {}: receiver gone", self.name);
            }
        }
        Ok(())
    }

    /// Tell all connected inputs that no more messages follow.
    pub(crate) fn notify_finished(&mut self) {
        for (port_id, sender) in self.handlers.iter_mut() {
            let _ = sender.try_send(BlockMessage::Call {
                port_id: *port_id,
                data: Pmt::Finished,
            });
        }
    }
}

/// Message ports of a block.
#[derive(Debug)]
pub struct MessageIo {
    inputs: Vec<MessageInput>,
    outputs: Vec<MessageOutput>,
    posted: u64,
}

impl MessageIo {
    fn new(inputs: Vec<MessageInput>, outputs: Vec<MessageOutput>) -> Self {
        MessageIo {
            inputs,
            outputs,
            posted: 0,
        }
    }

    /// Index of the input with this name.
    pub fn input_name_to_id(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|x| x.name() == name)
    }

    /// All inputs.
    pub fn inputs(&self) -> &[MessageInput] {
        &self.inputs
    }

    /// Input by index.
    pub fn input(&self, id: usize) -> &MessageInput {
        &self.inputs[id]
    }

    pub(crate) fn input_mut(&mut self, id: usize) -> &mut MessageInput {
        &mut self.inputs[id]
    }

    /// All outputs.
    pub fn outputs(&self) -> &[MessageOutput] {
        &self.outputs
    }

    /// All outputs, mutable.
    pub fn outputs_mut(&mut self) -> &mut [MessageOutput] {
        &mut self.outputs
    }

    /// Output by index.
    pub fn output(&self, id: usize) -> &MessageOutput {
        &self.outputs[id]
    }

    /// Output by index, mutable.
    pub fn output_mut(&mut self, id: usize) -> &mut MessageOutput {
        &mut self.outputs[id]
    }

    /// Index of the output with this name.
    pub fn output_name_to_id(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|x| x.name() == name)
    }

    /// Post a message on the output with the given index.
    pub fn post(&mut self, id: usize, p: Pmt) -> Result<(), Error> {
        let output = self
            .outputs
            .get_mut(id)
            .ok_or(Error::InvalidMessagePort(
                BlockPortCtx::None,
                PortId::Index(id),
            ))?;
        output.post(p)?;
        self.posted += 1;
        Ok(())
    }

    /// At least one message input has an upstream connection.
    pub(crate) fn has_connected_inputs(&self) -> bool {
        self.inputs.iter().any(|i| i.connections() > 0)
    }

    /// Every connected message input saw all its upstream outputs finish.
    pub(crate) fn inputs_finished(&self) -> bool {
        self.has_connected_inputs()
            && self
                .inputs
                .iter()
                .filter(|i| i.connections() > 0)
                .all(|i| i.finished())
    }

    pub(crate) fn posted(&self) -> u64 {
        self.posted
    }

    pub(crate) fn notify_finished(&mut self) {
        for o in self.outputs.iter_mut() {
            o.notify_finished();
        }
    }

    /// Drop all connections, they are rebuilt on commit.
    pub(crate) fn disconnect_all(&mut self) {
        for i in self.inputs.iter_mut() {
            i.disconnect_all();
        }
        for o in self.outputs.iter_mut() {
            o.handlers.clear();
        }
    }

    pub(crate) fn reset(&mut self) {
        for i in self.inputs.iter_mut() {
            i.reset();
        }
    }
}

/// Builder for [`MessageIo`].
pub struct MessageIoBuilder {
    inputs: Vec<MessageInput>,
    outputs: Vec<MessageOutput>,
}

impl MessageIoBuilder {
    /// Empty builder.
    pub fn new() -> MessageIoBuilder {
        MessageIoBuilder {
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    #[must_use]
    /// Add a message input.
    pub fn add_input(mut self, name: &str) -> MessageIoBuilder {
        self.inputs.push(MessageInput::new(name));
        self
    }

    #[must_use]
    /// Add a message output.
    pub fn add_output(mut self, name: &str) -> MessageIoBuilder {
        self.outputs.push(MessageOutput::new(name));
        self
    }

    /// Finish.
    pub fn build(self) -> MessageIo {
        MessageIo::new(self.inputs, self.outputs)
    }
}

impl Default for MessageIoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    #[test]
    fn post_reaches_all_connections() {
        let mut mio = MessageIoBuilder::new().add_output("out").build();
        let (tx, mut rx) = mpsc::channel(4);
        mio.output_mut(0).connect(2, tx.clone());
        mio.output_mut(0).connect(5, tx);

        mio.post(0, Pmt::U32(7)).unwrap();
        assert_eq!(mio.posted(), 1);

        let mut ports = Vec::new();
        while let Ok(Some(BlockMessage::Call { port_id, data })) = rx.try_next() {
            assert_eq!(data, Pmt::U32(7));
            ports.push(port_id);
        }
        assert_eq!(ports, vec![2, 5]);
    }

    #[test]
    fn input_finishes_after_all_upstreams() {
        let mut mio = MessageIoBuilder::new().add_input("in").add_input("unused").build();
        mio.input_mut(0).add_connection();
        mio.input_mut(0).add_connection();
        mio.input_mut(0).upstream_finished();
        assert!(!mio.inputs_finished());
        mio.input_mut(0).upstream_finished();
        assert!(mio.inputs_finished());

        mio.reset();
        assert!(!mio.inputs_finished());
    }
}
