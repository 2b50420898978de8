pub mod encoding;
pub mod events;
pub mod extract;
pub mod melody;
pub mod performance;
pub mod sequence;
pub mod sustain;
pub mod transform;

pub use encoding::{MelodyOneHotEncoding, PerformanceOneHotEncoding};
pub use events::{EventKind, Track, TrackEvent};
pub use extract::{build_sequence, extract_instruments, Instrument};
pub use melody::{extract_melody, Melody, MelodyExtractOptions, MELODY_NOTE_OFF, MELODY_NO_EVENT};
pub use performance::{
    Performance, PerformanceEvent, PerformanceEventKind, PerformanceOptions,
    DEFAULT_MAX_SHIFT_STEPS, DEFAULT_STEPS_PER_SECOND,
};
pub use sequence::{
    ControlChange, KeySignature, NoteSequence, PitchBend, SeqNote, Tempo, TimeSignature,
    DEFAULT_QPM, DEFAULT_SUSTAIN_CONTROLLER, MAX_MIDI_PITCH, MIN_MIDI_PITCH, STANDARD_PPQ,
};
pub use sustain::apply_sustain;
pub use transform::{quantize, stretch, transpose};

/// Errors from sequence transforms and symbol codecs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("tempo changes from {0} to {1} qpm mid-sequence")]
    InconsistentTempo(f64, f64),

    #[error("sequence is already quantized")]
    AlreadyQuantized,

    #[error("sequence is not quantized")]
    NotQuantized,

    #[error("invalid steps per second {0}")]
    InvalidStepsPerSecond(f64),

    #[error("time quantized to negative step {0}")]
    NegativeQuantizedTime(i64),

    #[error("invalid stretch factor {0}")]
    InvalidStretchFactor(f64),

    #[error("inverted pitch bounds {min}..={max}")]
    InvertedPitchBounds { min: u8, max: u8 },

    #[error("sequence has no time signature")]
    NoTimeSignature,

    #[error("invalid time signature {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u8, denominator: u8 },

    #[error("steps per bar {0} is not a whole number")]
    FractionalStepsPerBar(f64),

    #[error("invalid melody event {0}")]
    InvalidMelodyEvent(i16),

    #[error("multiple onsets at step {0}")]
    PolyphonicOnset(i64),

    #[error("note at step {found} precedes earlier onset at step {prev}")]
    NotesOutOfOrder { found: i64, prev: i64 },

    #[error("invalid {kind:?} value {value}")]
    InvalidEventValue {
        kind: performance::PerformanceEventKind,
        value: i32,
    },

    #[error("invalid velocity bin count {0}")]
    InvalidVelocityBins(u8),

    #[error("invalid max shift steps {0}")]
    InvalidMaxShift(u32),

    #[error("melody event {0} is outside the encoder bounds")]
    UnencodableMelodyEvent(i16),

    #[error("performance event {0:?} has no class")]
    UnencodablePerformanceEvent(performance::PerformanceEvent),

    #[error("invalid encoder note bounds {min_note}..{max_note}")]
    InvalidEncoderBounds { min_note: u8, max_note: u8 },

    #[error("class index {index} out of range for {num_classes} classes")]
    IndexOutOfRange { index: usize, num_classes: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
