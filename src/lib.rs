pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod generator;
pub mod midi;
pub mod scripting;
pub mod timing;

pub use config::{ClickConfig, InteractionConfig, OffCallInput, PhraseBoundary};
pub use engine::Engine;
pub use error::{
    BundleError, ConfigError, EngineError, GenerationError, PortError, QuantizationError,
    SchedulerError,
};
pub use events::{EngineEvent, Tick};
pub use generator::{
    ArgValue, GeneratorBundle, GeneratorOptions, GeneratorRegistry, SequenceGenerator,
};
pub use midi::{MidiIo, MidiMessage, MidiSignal, MidiSink};
pub use timing::{Clock, Note, NoteSequence, Phase, SessionSnapshot};
