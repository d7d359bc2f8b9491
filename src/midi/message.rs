use serde::{Deserialize, Serialize};

/// A channel-voice MIDI message stamped with performance-clock seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MidiMessage {
    NoteOn { pitch: u8, velocity: u8, time: f64 },
    NoteOff { pitch: u8, time: f64 },
    ControlChange { number: u8, value: u8, time: f64 },
}

impl MidiMessage {
    /// Decodes raw bytes. The channel nibble is ignored and note-on with
    /// velocity 0 is a note-off. Anything other than note and control
    /// messages yields `None`.
    pub fn from_bytes(bytes: &[u8], time: f64) -> Option<Self> {
        if bytes.len() < 3 {
            return None;
        }

        let data1 = bytes[1] & 0x7F;
        let data2 = bytes[2] & 0x7F;
        match bytes[0] & 0xF0 {
            0x90 if data2 > 0 => Some(MidiMessage::NoteOn {
                pitch: data1,
                velocity: data2,
                time,
            }),
            0x80 | 0x90 => Some(MidiMessage::NoteOff { pitch: data1, time }),
            0xB0 => Some(MidiMessage::ControlChange {
                number: data1,
                value: data2,
                time,
            }),
            _ => None,
        }
    }

    /// Encodes the message for `channel` (0-15).
    pub fn to_bytes(&self, channel: u8) -> [u8; 3] {
        let channel = channel & 0x0F;
        match *self {
            MidiMessage::NoteOn { pitch, velocity, .. } => {
                [0x90 | channel, pitch & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOff { pitch, .. } => [0x80 | channel, pitch & 0x7F, 0],
            MidiMessage::ControlChange { number, value, .. } => {
                [0xB0 | channel, number & 0x7F, value & 0x7F]
            }
        }
    }

    pub fn time(&self) -> f64 {
        match *self {
            MidiMessage::NoteOn { time, .. }
            | MidiMessage::NoteOff { time, .. }
            | MidiMessage::ControlChange { time, .. } => time,
        }
    }

    /// Same message, restamped.
    pub fn at(self, time: f64) -> Self {
        match self {
            MidiMessage::NoteOn { pitch, velocity, .. } => MidiMessage::NoteOn {
                pitch,
                velocity,
                time,
            },
            MidiMessage::NoteOff { pitch, .. } => MidiMessage::NoteOff { pitch, time },
            MidiMessage::ControlChange { number, value, .. } => MidiMessage::ControlChange {
                number,
                value,
                time,
            },
        }
    }

    pub fn is_note(&self) -> bool {
        !matches!(self, MidiMessage::ControlChange { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on() {
        let msg = MidiMessage::from_bytes(&[0x90, 60, 100], 1.5).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOn {
                pitch: 60,
                velocity: 100,
                time: 1.5
            }
        );
    }

    #[test]
    fn test_note_on_velocity_zero_is_note_off() {
        let msg = MidiMessage::from_bytes(&[0x90, 64, 0], 0.0).unwrap();
        assert_eq!(msg, MidiMessage::NoteOff { pitch: 64, time: 0.0 });
    }

    #[test]
    fn test_control_change_any_channel() {
        let msg = MidiMessage::from_bytes(&[0xBF, 20, 0], 2.0).unwrap();
        assert_eq!(
            msg,
            MidiMessage::ControlChange {
                number: 20,
                value: 0,
                time: 2.0
            }
        );
    }

    #[test]
    fn test_ignored_messages() {
        assert!(MidiMessage::from_bytes(&[], 0.0).is_none());
        assert!(MidiMessage::from_bytes(&[0x90, 60], 0.0).is_none());
        assert!(MidiMessage::from_bytes(&[0xE0, 0x00, 0x40], 0.0).is_none());
        assert!(MidiMessage::from_bytes(&[0xF8, 0x00, 0x00], 0.0).is_none());
    }

    #[test]
    fn test_encode_uses_channel() {
        let on = MidiMessage::NoteOn {
            pitch: 60,
            velocity: 90,
            time: 0.0,
        };
        assert_eq!(on.to_bytes(9), [0x99, 60, 90]);
        let off = MidiMessage::NoteOff { pitch: 60, time: 0.0 };
        assert_eq!(off.to_bytes(0), [0x80, 60, 0]);
    }

    #[test]
    fn test_restamp() {
        let msg = MidiMessage::NoteOff { pitch: 1, time: 0.0 }.at(3.0);
        assert_eq!(msg.time(), 3.0);
    }
}
