use super::{ArgValue, GeneratorBundle, GeneratorOptions, SequenceGenerator, check_extends_primer};
use crate::error::GenerationError;
use crate::timing::{Note, NoteSequence};

/// Answers a call by repeating it, optionally transposed, until the generate
/// range is filled.
#[derive(Debug, Clone)]
pub struct EchoGenerator {
    id: String,
    transpose: i32,
}

impl EchoGenerator {
    pub fn new(transpose: i32) -> Self {
        Self {
            id: "echo".to_string(),
            transpose,
        }
    }

    pub fn from_bundle(bundle: &GeneratorBundle) -> Self {
        let transpose = match bundle.args.get("transpose") {
            Some(ArgValue::Int(semitones)) => *semitones as i32,
            Some(ArgValue::Float(semitones)) => semitones.round() as i32,
            None => 0,
        };
        Self {
            id: bundle.id.clone(),
            transpose,
        }
    }
}

impl SequenceGenerator for EchoGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    fn generate(
        &self,
        primer: &NoteSequence,
        options: &GeneratorOptions,
    ) -> Result<NoteSequence, GenerationError> {
        check_extends_primer(primer, options)?;
        let (start, end) = options.generate_time_range;
        let (input_start, input_end) = options.input_time_range.unwrap_or((0.0, primer.total_time));
        let pattern = primer.subsequence(input_start, input_end);
        let period = pattern.total_time;

        let mut response = NoteSequence::new(primer.qpm);
        response.total_time = end;
        if pattern.is_empty() || period <= 0.0 {
            return Ok(response);
        }

        let mut offset = start;
        while offset < end {
            for note in &pattern.notes {
                let note_start = offset + note.start_time;
                if note_start >= end {
                    break;
                }
                let pitch = (i32::from(note.pitch) + self.transpose).clamp(0, 127) as u8;
                response.notes.push(Note::new(
                    pitch,
                    note.velocity,
                    note_start,
                    (offset + note.end_time).min(end),
                ));
            }
            offset += period;
        }
        Ok(response)
    }
}
