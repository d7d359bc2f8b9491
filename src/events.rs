use crate::error::GenerationError;
use crate::midi::MidiMessage;
use crate::timing::NoteSequence;

/// A metronome beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Call cycle the metronome was started for.
    pub cycle: u64,
    pub beat_index: u64,
    pub scheduled_time: f64,
    pub delivered_time: f64,
}

impl Tick {
    pub fn is_downbeat(&self) -> bool {
        self.beat_index % crate::timing::BEATS_PER_BAR as u64 == 0
    }

    pub fn bar_index(&self) -> u64 {
        self.beat_index / crate::timing::BEATS_PER_BAR as u64
    }

    pub fn lateness(&self) -> f64 {
        self.delivered_time - self.scheduled_time
    }
}

/// Everything the engine's event loop consumes.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Midi(MidiMessage),
    Tick(Tick),
    Generated {
        cycle: u64,
        result: Result<NoteSequence, GenerationError>,
    },
    PlaybackFinished {
        cycle: u64,
        scheduled_time: f64,
    },
    Stop,
}

/// What the scheduler does at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackAction {
    Send(MidiMessage),
    Finish { cycle: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub time: f64,
    pub action: PlaybackAction,
}

impl ScheduledEvent {
    /// Ordering within one instant: pitch ascending, note-off before note-on
    /// on the same pitch, completion last.
    pub fn order_key(&self) -> (u8, u8) {
        match self.action {
            PlaybackAction::Send(MidiMessage::NoteOff { pitch, .. }) => (pitch, 0),
            PlaybackAction::Send(MidiMessage::NoteOn { pitch, .. }) => (pitch, 1),
            PlaybackAction::Send(MidiMessage::ControlChange { .. }) => (u8::MAX, 0),
            PlaybackAction::Finish { .. } => (u8::MAX, 2),
        }
    }
}
