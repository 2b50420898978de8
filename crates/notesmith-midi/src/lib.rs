pub mod reader;
pub mod writer;

pub use reader::{read_sequence, read_tracks};
pub use writer::write_sequence;

/// Errors from reading and writing Standard MIDI Files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("SMPTE timecode timing is not supported")]
    SmpteTiming,

    #[error("MIDI write error: {0}")]
    MidiWrite(String),

    #[error("quantized sequences cannot be written as MIDI ticks")]
    QuantizedSequence,
}

pub type Result<T> = std::result::Result<T, Error>;
