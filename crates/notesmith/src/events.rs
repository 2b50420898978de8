use serde::{Deserialize, Serialize};

/// A timestamped event at an absolute tick position.
///
/// The core works in absolute time only; converting from a wire
/// format's delta times is the reader's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEvent {
    pub time: i64,
    pub kind: EventKind,
}

impl TrackEvent {
    pub fn new(time: i64, kind: EventKind) -> Self {
        Self { time, kind }
    }
}

/// The event types the demultiplexer understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A velocity of 0 is treated as a note-off.
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Centered 14-bit value: -8192..=8191.
    PitchBend { channel: u8, value: i16 },
    SetTempo { qpm: f64 },
    TimeSignature { numerator: u8, denominator: u8 },
    KeySignature { sharps: i8, minor: bool },
}

/// One track of the interleaved event stream, in stream order.
pub type Track = Vec<TrackEvent>;
