use crate::midi::MidiMessage;

use super::{Note, NoteSequence};

#[derive(Debug, Clone, Copy)]
struct OpenNote {
    pitch: u8,
    velocity: u8,
    start_time: f64,
}

/// Monophonic capture of live input. At most one note is open at a time, so
/// the recorded notes never overlap.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    qpm: f64,
    start_time: f64,
    last_time: f64,
    notes: Vec<Note>,
    open: Option<OpenNote>,
}

impl CaptureBuffer {
    pub fn new(qpm: f64) -> Self {
        Self {
            qpm,
            start_time: 0.0,
            last_time: 0.0,
            notes: Vec::new(),
            open: None,
        }
    }

    /// Clears everything and starts capturing at `start_time`.
    pub fn reset(&mut self, start_time: f64) {
        self.start_time = start_time;
        self.last_time = start_time;
        self.notes.clear();
        self.open = None;
    }

    pub fn clear(&mut self) {
        self.reset(self.start_time);
    }

    /// Number of notes recorded so far, including one still held.
    pub fn len(&self) -> usize {
        self.notes.len() + usize::from(self.open.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record(&mut self, message: &MidiMessage) {
        // Late or reordered messages never move backwards in time.
        let time = message.time().max(self.last_time);
        match *message {
            MidiMessage::NoteOn {
                pitch, velocity, ..
            } => {
                self.close_open(time);
                self.open = Some(OpenNote {
                    pitch,
                    velocity,
                    start_time: time,
                });
            }
            MidiMessage::NoteOff { pitch, .. } => {
                if self.open.is_some_and(|open| open.pitch == pitch) {
                    self.close_open(time);
                }
            }
            MidiMessage::ControlChange { .. } => return,
        }
        self.last_time = time;
    }

    fn close_open(&mut self, time: f64) {
        if let Some(open) = self.open.take() {
            if time > open.start_time {
                self.notes
                    .push(Note::new(open.pitch, open.velocity, open.start_time, time));
            }
        }
    }

    /// Copy of the capture up to `as_of`, relative to the capture start. A
    /// held note is closed at `as_of`.
    pub fn snapshot(&self, as_of: f64) -> NoteSequence {
        let open = self
            .open
            .map(|o| Note::new(o.pitch, o.velocity, o.start_time, as_of));
        let notes = self
            .notes
            .iter()
            .copied()
            .chain(open)
            .filter(|n| n.start_time < as_of)
            .map(|n| Note {
                start_time: n.start_time - self.start_time,
                end_time: n.end_time.min(as_of) - self.start_time,
                ..n
            })
            .filter(|n| n.end_time > n.start_time)
            .collect();
        NoteSequence {
            qpm: self.qpm,
            total_time: (as_of - self.start_time).max(0.0),
            notes,
        }
    }
}
