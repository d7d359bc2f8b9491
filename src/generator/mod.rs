mod echo;
mod lua;
mod registry;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use echo::EchoGenerator;
pub use lua::LuaGenerator;
pub use registry::{GeneratorBundle, GeneratorFactory, GeneratorRegistry};

use crate::error::{ConfigError, GenerationError};
use crate::timing::NoteSequence;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    Float(f64),
    Int(i64),
}

impl ArgValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ArgValue::Float(value) => value,
            ArgValue::Int(value) => value as f64,
        }
    }
}

/// Parameter bag handed to a generator. Ranges are seconds relative to the
/// start of the primer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorOptions {
    pub input_time_range: Option<(f64, f64)>,
    pub generate_time_range: (f64, f64),
    pub args: BTreeMap<String, ArgValue>,
}

impl GeneratorOptions {
    pub fn new(generate_time_range: (f64, f64)) -> Self {
        Self {
            input_time_range: None,
            generate_time_range,
            args: BTreeMap::new(),
        }
    }

    pub fn with_input(mut self, start: f64, end: f64) -> Self {
        self.input_time_range = Some((start, end));
        self
    }

    pub fn with_arg(mut self, name: &str, value: ArgValue) -> Self {
        self.args.insert(name.to_string(), value);
        self
    }

    pub fn temperature(&self) -> Option<f64> {
        self.args.get("temperature").map(ArgValue::as_f64)
    }
}

/// A sequence model reached through a single blocking call.
pub trait SequenceGenerator: Send + Sync {
    fn id(&self) -> &str;

    fn generate(
        &self,
        primer: &NoteSequence,
        options: &GeneratorOptions,
    ) -> Result<NoteSequence, GenerationError>;
}

/// Generators only extend their primer: the generate range must be
/// non-empty and start after the last primer note ends.
pub fn check_extends_primer(
    primer: &NoteSequence,
    options: &GeneratorOptions,
) -> Result<(), GenerationError> {
    let (start, end) = options.generate_time_range;
    if end <= start {
        return Err(GenerationError::EmptyRange(start, end));
    }
    let primer_end = primer.last_end_time();
    if primer_end > start {
        return Err(GenerationError::OverlapsPrimer {
            generate_start: start,
            primer_end,
        });
    }
    Ok(())
}

/// Picks the active generator from a live controller value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorSelector {
    count: usize,
    control: Option<u8>,
}

impl GeneratorSelector {
    pub fn new(count: usize, control: Option<u8>) -> Result<Self, ConfigError> {
        match (count, control) {
            (0, _) => Err(ConfigError::NoGenerators),
            (n, None) if n > 1 => Err(ConfigError::MissingGeneratorSelect(n)),
            _ => Ok(Self { count, control }),
        }
    }

    pub fn control(&self) -> Option<u8> {
        self.control
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn select(&self, value: u8) -> usize {
        value as usize % self.count
    }
}
