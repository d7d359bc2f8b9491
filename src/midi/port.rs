use crossbeam::channel::{Receiver, Sender, unbounded};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{MidiMessage, MidiSink};
use crate::error::PortError;
use crate::timing::Clock;

const CLIENT_NAME: &str = "antiphon";

pub fn list_input_ports() -> Result<Vec<String>, PortError> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| PortError::Init(e.to_string()))?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect())
}

pub fn list_output_ports() -> Result<Vec<String>, PortError> {
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| PortError::Init(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect())
}

/// A connected input. Decoded messages arrive on [`messages`](Self::messages)
/// for as long as the port is alive; dropping it closes the connection.
pub struct MidiInPort {
    name: String,
    is_virtual: bool,
    receiver: Receiver<MidiMessage>,
    _connection: MidiInputConnection<()>,
}

impl MidiInPort {
    pub fn open(name: &str, clock: Clock) -> Result<Self, PortError> {
        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| PortError::Init(e.to_string()))?;
        let (sender, receiver) = unbounded();
        let callback = input_callback(sender, clock);

        let existing = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).is_ok_and(|n| n == name));

        let (connection, is_virtual) = match existing {
            Some(port) => {
                let connection = midi_in
                    .connect(&port, "antiphon-input", callback, ())
                    .map_err(|e| unavailable(name, e))?;
                (connection, false)
            }
            None => {
                info!(port = name, "opening virtual MIDI port for input");
                (create_virtual_input(midi_in, name, callback)?, true)
            }
        };

        debug!(port = name, is_virtual, "MIDI input connected");
        Ok(Self {
            name: name.to_string(),
            is_virtual,
            receiver,
            _connection: connection,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// The input stream. Every clone observes the same single stream.
    pub fn messages(&self) -> Receiver<MidiMessage> {
        self.receiver.clone()
    }
}

fn input_callback(
    sender: Sender<MidiMessage>,
    clock: Clock,
) -> impl FnMut(u64, &[u8], &mut ()) + Send + 'static {
    move |_timestamp, bytes, _| {
        // Stamp on arrival so every source shares the performance clock.
        if let Some(message) = MidiMessage::from_bytes(bytes, clock.now()) {
            if sender.send(message).is_err() {
                debug!("MIDI input receiver dropped");
            }
        }
    }
}

#[cfg(unix)]
fn create_virtual_input(
    midi_in: MidiInput,
    name: &str,
    callback: impl FnMut(u64, &[u8], &mut ()) + Send + 'static,
) -> Result<MidiInputConnection<()>, PortError> {
    use midir::os::unix::VirtualInput;
    midi_in
        .create_virtual(name, callback, ())
        .map_err(|e| unavailable(name, e))
}

#[cfg(not(unix))]
fn create_virtual_input(
    _midi_in: MidiInput,
    name: &str,
    _callback: impl FnMut(u64, &[u8], &mut ()) + Send + 'static,
) -> Result<MidiInputConnection<()>, PortError> {
    Err(PortError::PortUnavailable {
        name: name.to_string(),
        reason: "virtual ports are not supported on this platform".to_string(),
    })
}

/// A connected output, shareable between the metronome and playback threads.
pub struct MidiOutPort {
    name: String,
    is_virtual: bool,
    connection: Mutex<MidiOutputConnection>,
}

impl MidiOutPort {
    pub fn open(name: &str) -> Result<Self, PortError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| PortError::Init(e.to_string()))?;

        let existing = midi_out
            .ports()
            .into_iter()
            .find(|p| midi_out.port_name(p).is_ok_and(|n| n == name));

        let (connection, is_virtual) = match existing {
            Some(port) => {
                let connection = midi_out
                    .connect(&port, "antiphon-output")
                    .map_err(|e| unavailable(name, e))?;
                (connection, false)
            }
            None => {
                info!(port = name, "opening virtual MIDI port for output");
                (create_virtual_output(midi_out, name)?, true)
            }
        };

        debug!(port = name, is_virtual, "MIDI output connected");
        Ok(Self {
            name: name.to_string(),
            is_virtual,
            connection: Mutex::new(connection),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }
}

impl MidiSink for MidiOutPort {
    fn send(&self, channel: u8, message: &MidiMessage) -> Result<(), PortError> {
        self.connection
            .lock()
            .send(&message.to_bytes(channel))
            .map_err(|e| PortError::Send(e.to_string()))
    }
}

impl Drop for MidiOutPort {
    fn drop(&mut self) {
        debug!(port = %self.name, "closing MIDI output");
    }
}

#[cfg(unix)]
fn create_virtual_output(midi_out: MidiOutput, name: &str) -> Result<MidiOutputConnection, PortError> {
    use midir::os::unix::VirtualOutput;
    midi_out
        .create_virtual(name)
        .map_err(|e| unavailable(name, e))
}

#[cfg(not(unix))]
fn create_virtual_output(_midi_out: MidiOutput, name: &str) -> Result<MidiOutputConnection, PortError> {
    Err(PortError::PortUnavailable {
        name: name.to_string(),
        reason: "virtual ports are not supported on this platform".to_string(),
    })
}

fn unavailable(name: &str, error: impl std::fmt::Display) -> PortError {
    warn!(port = name, %error, "failed to open MIDI port");
    PortError::PortUnavailable {
        name: name.to_string(),
        reason: error.to_string(),
    }
}
