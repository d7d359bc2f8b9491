mod capture;
mod clock;
mod metronome;
mod scheduler;
mod sequence;
mod state_machine;

pub use capture::CaptureBuffer;
pub use clock::Clock;
pub use metronome::Metronome;
pub use scheduler::{PlaybackScheduler, schedule_sequence_events};
pub use sequence::{BEATS_PER_BAR, Note, NoteSequence};
pub use state_machine::{
    CallAndResponse, Effect, GenerationRequest, Phase, SessionSnapshot, SessionState,
};
