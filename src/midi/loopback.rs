use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::{MidiMessage, MidiSink};
use crate::error::PortError;

/// Records everything sent to it.
#[derive(Debug, Default)]
pub struct LoopbackSink {
    sent: Mutex<Vec<(u8, MidiMessage)>>,
}

impl LoopbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(u8, MidiMessage)> {
        self.sent.lock().clone()
    }

    pub fn sent_on(&self, channel: u8) -> Vec<MidiMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, m)| *m)
            .collect()
    }

    /// `(channel, pitch)` pairs with more note-ons than note-offs so far.
    pub fn sounding_notes(&self) -> Vec<(u8, u8)> {
        let mut balance: BTreeMap<(u8, u8), i64> = BTreeMap::new();
        for (channel, message) in self.sent.lock().iter() {
            match *message {
                MidiMessage::NoteOn { pitch, .. } => *balance.entry((*channel, pitch)).or_insert(0) += 1,
                MidiMessage::NoteOff { pitch, .. } => *balance.entry((*channel, pitch)).or_insert(0) -= 1,
                MidiMessage::ControlChange { .. } => {}
            }
        }
        balance
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(key, _)| key)
            .collect()
    }
}

impl MidiSink for LoopbackSink {
    fn send(&self, channel: u8, message: &MidiMessage) -> Result<(), PortError> {
        self.sent.lock().push((channel, *message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sounding_notes_balance() {
        let sink = LoopbackSink::new();
        let on = MidiMessage::NoteOn {
            pitch: 60,
            velocity: 90,
            time: 0.0,
        };
        sink.send(0, &on).unwrap();
        sink.send(9, &on).unwrap();
        sink.send(0, &MidiMessage::NoteOff { pitch: 60, time: 1.0 }).unwrap();
        assert_eq!(sink.sounding_notes(), vec![(9, 60)]);
        assert_eq!(sink.sent_on(0).len(), 2);
    }
}
