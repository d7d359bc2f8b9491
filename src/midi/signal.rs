use serde::{Deserialize, Serialize};

use super::MidiMessage;

/// Recognizes a trigger message. `None` fields match any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiSignal {
    Control { number: u8, value: Option<u8> },
    Note { pitch: u8, velocity: Option<u8> },
}

impl MidiSignal {
    pub fn control(number: u8, value: Option<u8>) -> Self {
        MidiSignal::Control { number, value }
    }

    pub fn note(pitch: u8, velocity: Option<u8>) -> Self {
        MidiSignal::Note { pitch, velocity }
    }

    pub fn matches(&self, message: &MidiMessage) -> bool {
        match (*self, *message) {
            (
                MidiSignal::Control { number, value },
                MidiMessage::ControlChange {
                    number: n,
                    value: v,
                    ..
                },
            ) => number == n && value.is_none_or(|value| value == v),
            (
                MidiSignal::Note { pitch, velocity },
                MidiMessage::NoteOn {
                    pitch: p,
                    velocity: v,
                    ..
                },
            ) => pitch == p && velocity.is_none_or(|velocity| velocity == v),
            _ => false,
        }
    }
}

impl std::fmt::Display for MidiSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MidiSignal::Control {
                number,
                value: Some(value),
            } => write!(f, "CC {number}={value}"),
            MidiSignal::Control { number, value: None } => write!(f, "CC {number}"),
            MidiSignal::Note {
                pitch,
                velocity: Some(velocity),
            } => write!(f, "note {pitch} vel {velocity}"),
            MidiSignal::Note {
                pitch,
                velocity: None,
            } => write!(f, "note {pitch}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc(number: u8, value: u8) -> MidiMessage {
        MidiMessage::ControlChange {
            number,
            value,
            time: 0.0,
        }
    }

    #[test]
    fn test_control_exact_value() {
        let signal = MidiSignal::control(20, Some(0));
        assert!(signal.matches(&cc(20, 0)));
        assert!(!signal.matches(&cc(20, 1)));
        assert!(!signal.matches(&cc(21, 0)));
    }

    #[test]
    fn test_control_wildcard_value() {
        let signal = MidiSignal::control(7, None);
        assert!(signal.matches(&cc(7, 0)));
        assert!(signal.matches(&cc(7, 127)));
    }

    #[test]
    fn test_note_signal() {
        let signal = MidiSignal::note(36, None);
        let on = MidiMessage::NoteOn {
            pitch: 36,
            velocity: 12,
            time: 0.0,
        };
        assert!(signal.matches(&on));
        assert!(!signal.matches(&MidiMessage::NoteOff { pitch: 36, time: 0.0 }));
        assert!(!signal.matches(&cc(36, 0)));
        assert!(!MidiSignal::note(36, Some(100)).matches(&on));
    }
}
