use serde::{Deserialize, Serialize};

pub const MIN_MIDI_PITCH: u8 = 0;
pub const MAX_MIDI_PITCH: u8 = 127;

/// Resolution of sequences produced by the performance decoder.
pub const STANDARD_PPQ: u16 = 220;

/// Tempo assumed when a sequence carries no tempo entries.
pub const DEFAULT_QPM: f64 = 120.0;

/// MIDI controller number for the sustain pedal.
pub const DEFAULT_SUSTAIN_CONTROLLER: u8 = 64;

/// A note with paired onset/offset timing and source metadata.
///
/// Times are ticks until the owning sequence is quantized, steps after.
/// `end_time` is always strictly greater than `start_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeqNote {
    pub pitch: u8,
    /// 1..=127; zero-velocity onsets are note-offs and never materialize.
    pub velocity: u8,
    pub start_time: i64,
    pub end_time: i64,
    /// Ordinal of the instrument bucket this note was extracted into.
    pub instrument: u32,
    pub program: u8,
}

impl SeqNote {
    pub fn duration(&self) -> i64 {
        self.end_time - self.start_time
    }
}

/// Tempo marking: quarter notes per minute from `time` onward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    pub time: i64,
    pub qpm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub time: i64,
    pub numerator: u8,
    pub denominator: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySignature {
    pub time: i64,
    /// Count of sharps, negative for flats.
    pub sharps: i8,
    pub minor: bool,
}

/// Pitch wheel position, centered: -8192..=8191, 0 = no bend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchBend {
    pub time: i64,
    pub value: i16,
    pub instrument: u32,
    pub program: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlChange {
    pub time: i64,
    pub controller: u8,
    pub value: u8,
    pub instrument: u32,
    pub program: u8,
}

/// A multi-instrument note sequence with tempo and signature maps.
///
/// Owns all contained events. Note and control-change times are ticks
/// scaled by `ticks_per_quarter` until `quantize` converts them to
/// steps, at which point `steps_per_second` becomes `Some`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NoteSequence {
    pub ticks_per_quarter: u16,
    /// `Some` once quantized; note/control times are steps at this rate.
    pub steps_per_second: Option<f64>,
    /// Max note end time. Every mutating transform keeps this current.
    pub total_time: i64,
    pub time_signatures: Vec<TimeSignature>,
    pub key_signatures: Vec<KeySignature>,
    pub tempos: Vec<Tempo>,
    pub notes: Vec<SeqNote>,
    pub pitch_bends: Vec<PitchBend>,
    pub control_changes: Vec<ControlChange>,
}

impl NoteSequence {
    pub fn new(ticks_per_quarter: u16) -> Self {
        Self {
            ticks_per_quarter,
            ..Default::default()
        }
    }

    pub fn is_quantized(&self) -> bool {
        self.steps_per_second.is_some()
    }

    /// The single tempo the whole sequence plays at, or `DEFAULT_QPM`
    /// when there are no tempo entries. Disagreeing tempos are an error.
    pub(crate) fn uniform_qpm(&self) -> crate::Result<f64> {
        let mut qpm = None;
        for tempo in &self.tempos {
            match qpm {
                None => qpm = Some(tempo.qpm),
                Some(q) if tempo.qpm != q => {
                    return Err(crate::Error::InconsistentTempo(q, tempo.qpm));
                }
                Some(_) => {}
            }
        }
        Ok(qpm.unwrap_or(DEFAULT_QPM))
    }

    /// Recompute `total_time` from the notes.
    pub(crate) fn refresh_total_time(&mut self) {
        self.total_time = self.notes.iter().map(|n| n.end_time).max().unwrap_or(0);
    }
}
