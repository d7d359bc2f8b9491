use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::midi::MidiSignal;

/// What to do with notes played while the engine is not capturing a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OffCallInput {
    /// Dropped, with a debug log line.
    #[default]
    Discard,
    /// Held in a bounded buffer and replayed into the next call.
    Buffer,
}

/// How the end of a call phrase is detected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhraseBoundary {
    FixedBars(u32),
    SignalTriggered {
        start: Option<MidiSignal>,
        end: MidiSignal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub enabled: bool,
    /// Zero-based MIDI channel.
    pub channel: u8,
    pub pitch: u8,
    pub accent_velocity: u8,
    pub velocity: u8,
    /// Seconds between a click's note-on and note-off.
    pub duration: f64,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: 9,
            pitch: 95,
            accent_velocity: 100,
            velocity: 64,
            duration: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub input_port: String,
    pub output_port: String,
    /// Zero-based channel used for response playback.
    pub output_channel: u8,
    pub qpm: f64,
    pub phrase_bars: Option<u32>,
    pub start_call_signal: Option<MidiSignal>,
    pub end_call_signal: Option<MidiSignal>,
    pub temperature_control: Option<u8>,
    pub generator_select_control: Option<u8>,
    pub temperature: f64,
    pub temperature_range: (f64, f64),
    pub steps_per_quarter: u32,
    pub min_primer_bars: u32,
    pub off_call_input: OffCallInput,
    pub held_input_capacity: usize,
    pub underrun_tolerance_ms: f64,
    pub metronome: ClickConfig,
    pub bundle_files: Vec<PathBuf>,
    pub log: String,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            input_port: "antiphon_in".to_string(),
            output_port: "antiphon_out".to_string(),
            output_channel: 0,
            qpm: 90.0,
            phrase_bars: None,
            start_call_signal: None,
            end_call_signal: None,
            temperature_control: None,
            generator_select_control: None,
            temperature: 1.0,
            temperature_range: (0.1, 2.0),
            steps_per_quarter: 4,
            min_primer_bars: 0,
            off_call_input: OffCallInput::Discard,
            held_input_capacity: 256,
            underrun_tolerance_ms: 10.0,
            metronome: ClickConfig::default(),
            bundle_files: Vec::new(),
            log: "warn".to_string(),
        }
    }
}

impl InteractionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        ron::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Checks cross-field constraints and returns the active boundary policy.
    pub fn validate(&self) -> Result<PhraseBoundary, ConfigError> {
        if !(self.qpm.is_finite() && self.qpm > 0.0) {
            return Err(ConfigError::InvalidTempo(self.qpm));
        }
        if self.steps_per_quarter == 0 {
            return Err(ConfigError::InvalidStepsPerQuarter);
        }
        let (low, high) = self.temperature_range;
        if !(low.is_finite() && high.is_finite() && low <= high) {
            return Err(ConfigError::InvalidTemperatureRange(low, high));
        }

        match (self.phrase_bars, self.end_call_signal) {
            (Some(0), None) => Err(ConfigError::ZeroPhraseBars),
            (Some(bars), None) => Ok(PhraseBoundary::FixedBars(bars)),
            (None, Some(end)) => Ok(PhraseBoundary::SignalTriggered {
                start: self.start_call_signal,
                end,
            }),
            _ => Err(ConfigError::AmbiguousBoundary),
        }
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.qpm
    }

    pub fn bar_duration(&self) -> f64 {
        self.seconds_per_beat() * crate::timing::BEATS_PER_BAR as f64
    }

    /// Maps a 7-bit controller value onto the temperature range.
    pub fn temperature_for(&self, value: u8) -> f64 {
        let (low, high) = self.temperature_range;
        low + (f64::from(value.min(127)) / 127.0) * (high - low)
    }
}
