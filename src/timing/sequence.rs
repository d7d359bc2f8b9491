use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::QuantizationError;

pub const BEATS_PER_BAR: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub start_time: f64,
    pub end_time: f64,
}

impl Note {
    pub fn new(pitch: u8, velocity: u8, start_time: f64, end_time: f64) -> Self {
        Self {
            pitch,
            velocity,
            start_time,
            end_time,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Notes ordered by start time, all times in seconds relative to the start
/// of the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSequence {
    pub qpm: f64,
    pub total_time: f64,
    pub notes: Vec<Note>,
}

impl NoteSequence {
    pub fn new(qpm: f64) -> Self {
        Self {
            qpm,
            total_time: 0.0,
            notes: Vec::new(),
        }
    }

    /// Builds a sequence from unordered notes. `total_time` covers the last
    /// note end.
    pub fn from_notes(qpm: f64, mut notes: Vec<Note>) -> Self {
        notes.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then(a.pitch.cmp(&b.pitch))
        });
        let total_time = notes.iter().map(|n| n.end_time).fold(0.0, f64::max);
        Self {
            qpm,
            total_time,
            notes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn seconds_per_quarter(&self) -> f64 {
        60.0 / self.qpm
    }

    pub fn bar_duration(&self) -> f64 {
        self.seconds_per_quarter() * BEATS_PER_BAR as f64
    }

    pub fn last_end_time(&self) -> f64 {
        self.notes.iter().map(|n| n.end_time).fold(0.0, f64::max)
    }

    /// Snaps note boundaries to the nearest step of a grid with
    /// `steps_per_quarter` steps per beat.
    pub fn quantize(&self, steps_per_quarter: u32) -> Result<Self, QuantizationError> {
        let step = self.step_duration(steps_per_quarter);
        let notes = self
            .notes
            .iter()
            .map(|note| quantize_note(note, step))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.with_quantized(notes, step))
    }

    /// Like [`quantize`](Self::quantize) but drops degenerate notes instead of
    /// failing, returning what was dropped.
    pub fn quantize_lossy(&self, steps_per_quarter: u32) -> (Self, Vec<QuantizationError>) {
        let step = self.step_duration(steps_per_quarter);
        let mut dropped = Vec::new();
        let notes = self
            .notes
            .iter()
            .filter_map(|note| match quantize_note(note, step) {
                Ok(note) => Some(note),
                Err(e) => {
                    dropped.push(e);
                    None
                }
            })
            .collect();
        (self.with_quantized(notes, step), dropped)
    }

    fn step_duration(&self, steps_per_quarter: u32) -> f64 {
        self.seconds_per_quarter() / steps_per_quarter.max(1) as f64
    }

    fn with_quantized(&self, notes: Vec<Note>, step: f64) -> Self {
        let last_end = notes.iter().map(|n| n.end_time).fold(0.0, f64::max);
        Self {
            qpm: self.qpm,
            total_time: ((self.total_time / step).round() * step).max(last_end),
            notes,
        }
    }

    /// The trailing run of notes in which no gap between consecutive notes
    /// exceeds one bar. Empty when that run spans less than `min_bars` bars.
    pub fn extract_last_contiguous_phrase(&self, min_bars: u32) -> Self {
        let mut phrase = Self {
            qpm: self.qpm,
            total_time: self.total_time,
            notes: Vec::new(),
        };
        let Some(last) = self.notes.last() else {
            return phrase;
        };

        let bar = self.bar_duration();
        let mut first = self.notes.len() - 1;
        while first > 0 {
            let gap = self.notes[first].start_time - self.notes[first - 1].end_time;
            if gap > bar {
                break;
            }
            first -= 1;
        }

        let span = last.end_time - self.notes[first].start_time;
        if span + 1e-9 < min_bars as f64 * bar {
            return phrase;
        }
        phrase.notes = self.notes[first..].to_vec();
        phrase
    }

    /// Notes starting inside `[start, end)`, shifted so `start` becomes zero
    /// and clipped at `end`.
    pub fn subsequence(&self, start: f64, end: f64) -> Self {
        let length = (end - start).max(0.0);
        let notes = self
            .notes
            .iter()
            .filter(|n| n.start_time >= start && n.start_time < end)
            .map(|n| Note {
                start_time: n.start_time - start,
                end_time: (n.end_time.min(end) - start).max(n.start_time - start),
                ..*n
            })
            .filter(|n| n.end_time > n.start_time)
            .collect();
        Self {
            qpm: self.qpm,
            total_time: length,
            notes,
        }
    }

    /// Count of notes per pitch, useful for summaries in logs.
    pub fn pitch_histogram(&self) -> BTreeMap<u8, usize> {
        let mut histogram = BTreeMap::new();
        for note in &self.notes {
            *histogram.entry(note.pitch).or_insert(0) += 1;
        }
        histogram
    }
}

fn quantize_note(note: &Note, step: f64) -> Result<Note, QuantizationError> {
    let start_step = (note.start_time / step).round();
    let end_step = (note.end_time / step).round();
    if end_step <= start_step {
        return Err(QuantizationError {
            pitch: note.pitch,
            start_time: note.start_time,
        });
    }
    Ok(Note {
        start_time: start_step * step,
        end_time: end_step * step,
        ..*note
    })
}
