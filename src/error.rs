use std::path::PathBuf;

use thiserror::Error;

/// Invalid or contradictory configuration. Fatal at startup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("exactly one of `phrase_bars` or `end_call_signal` must be set")]
    AmbiguousBoundary,
    #[error("`phrase_bars` must be at least 1")]
    ZeroPhraseBars,
    #[error("tempo must be positive, got {0} qpm")]
    InvalidTempo(f64),
    #[error("`steps_per_quarter` must be at least 1")]
    InvalidStepsPerQuarter,
    #[error("no generators loaded")]
    NoGenerators,
    #[error("{0} generators loaded but no `generator_select_control` configured")]
    MissingGeneratorSelect(usize),
    #[error("invalid temperature range ({0}, {1})")]
    InvalidTemperatureRange(f64, f64),
    #[error("failed to read config {path}: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("failed to parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum PortError {
    #[error("MIDI port '{name}' unavailable: {reason}")]
    PortUnavailable { name: String, reason: String },
    #[error("failed to initialise MIDI client: {0}")]
    Init(String),
    #[error("failed to send MIDI message: {0}")]
    Send(String),
}

/// A captured note collapsed to zero steps on the quantization grid.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("note {pitch} at {start_time:.3}s is shorter than one step")]
pub struct QuantizationError {
    pub pitch: u8,
    pub start_time: f64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error(
        "generate range starts at {generate_start:.3}s, before the primer ends at {primer_end:.3}s"
    )]
    OverlapsPrimer {
        generate_start: f64,
        primer_end: f64,
    },
    #[error("empty generate range ({0:.3}, {1:.3})")]
    EmptyRange(f64, f64),
    #[error("script error: {0}")]
    Script(String),
    #[error("generator '{0}' failed: {1}")]
    Failed(String, String),
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to read bundle {path}: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("failed to parse bundle {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("unrecognized generator id '{id}' in bundle {path}")]
    UnknownGeneratorId { id: String, path: PathBuf },
    #[error("bundle '{0}' is missing a script")]
    MissingScript(String),
    #[error("failed to initialise generator '{0}': {1}")]
    Init(String, String),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("playback thread is no longer running")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error("failed to spawn {0} thread: {1}")]
    Spawn(&'static str, String),
}
