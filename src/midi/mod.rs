mod loopback;
mod message;
mod port;
mod signal;

use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender, unbounded};

pub use loopback::LoopbackSink;
pub use message::MidiMessage;
pub use port::{MidiInPort, MidiOutPort, list_input_ports, list_output_ports};
pub use signal::MidiSignal;

use crate::error::PortError;
use crate::timing::Clock;

/// Anything that accepts outgoing MIDI.
pub trait MidiSink: Send + Sync {
    fn send(&self, channel: u8, message: &MidiMessage) -> Result<(), PortError>;
}

/// The input stream and output sink an engine runs against.
pub struct MidiIo {
    pub clock: Clock,
    pub messages: Receiver<MidiMessage>,
    pub output: Arc<dyn MidiSink>,
    /// Keeps a hardware or virtual input connection open.
    pub input_port: Option<MidiInPort>,
}

impl MidiIo {
    /// Opens both ports by name. A name no system port carries gets a
    /// virtual port instead.
    pub fn open(input: &str, output: &str, clock: Clock) -> Result<Self, PortError> {
        let input_port = MidiInPort::open(input, clock)?;
        let output_port = MidiOutPort::open(output)?;
        Ok(Self {
            clock,
            messages: input_port.messages(),
            output: Arc::new(output_port),
            input_port: Some(input_port),
        })
    }

    /// In-memory wiring: feed input through the returned sender and inspect
    /// output on the returned sink.
    pub fn loopback(clock: Clock) -> (Self, Sender<MidiMessage>, Arc<LoopbackSink>) {
        let (sender, messages) = unbounded();
        let sink = Arc::new(LoopbackSink::new());
        let io = Self {
            clock,
            messages,
            output: sink.clone(),
            input_port: None,
        };
        (io, sender, sink)
    }
}
