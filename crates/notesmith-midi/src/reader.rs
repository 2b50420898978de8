use crate::{Error, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use notesmith::{build_sequence, EventKind, NoteSequence, Track, TrackEvent};
use tracing::debug;

/// Decode SMF bytes into absolute-time event tracks plus the pulse
/// resolution from the header.
///
/// Note-ons keep their velocity even at zero; downstream demuxing
/// treats zero-velocity ons as offs. Events with no sequence
/// counterpart (aftertouch, sysex, text meta) are skipped.
pub fn read_tracks(bytes: &[u8]) -> Result<(Vec<Track>, u16)> {
    let smf = Smf::parse(bytes).map_err(|e| Error::MidiParse(e.to_string()))?;
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(ticks) => ticks.as_int(),
        Timing::Timecode(..) => return Err(Error::SmpteTiming),
    };

    let mut tracks = Vec::with_capacity(smf.tracks.len());
    for track in &smf.tracks {
        let mut events: Track = Vec::new();
        let mut current_tick: i64 = 0;

        for event in track {
            current_tick += event.delta.as_int() as i64;

            let kind = match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } => Some(EventKind::NoteOn {
                            channel,
                            pitch: key.as_int(),
                            velocity: vel.as_int(),
                        }),
                        MidiMessage::NoteOff { key, .. } => Some(EventKind::NoteOff {
                            channel,
                            pitch: key.as_int(),
                        }),
                        MidiMessage::ProgramChange { program } => {
                            Some(EventKind::ProgramChange {
                                channel,
                                program: program.as_int(),
                            })
                        }
                        MidiMessage::Controller { controller, value } => {
                            Some(EventKind::ControlChange {
                                channel,
                                controller: controller.as_int(),
                                value: value.as_int(),
                            })
                        }
                        MidiMessage::PitchBend { bend } => Some(EventKind::PitchBend {
                            channel,
                            value: bend.as_int(),
                        }),
                        _ => None,
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(usec)) => Some(EventKind::SetTempo {
                    qpm: 60_000_000.0 / usec.as_int() as f64,
                }),
                TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denom_pow, _, _)) => {
                    Some(EventKind::TimeSignature {
                        numerator,
                        denominator: 1u8 << denom_pow.min(7),
                    })
                }
                TrackEventKind::Meta(MetaMessage::KeySignature(sharps, minor)) => {
                    Some(EventKind::KeySignature { sharps, minor })
                }
                _ => None,
            };
            if let Some(kind) = kind {
                events.push(TrackEvent::new(current_tick, kind));
            }
        }
        tracks.push(events);
    }

    debug!(
        tracks = tracks.len(),
        ticks_per_quarter, "parsed midi file"
    );
    Ok((tracks, ticks_per_quarter))
}

/// Parse SMF bytes all the way to a `NoteSequence`.
pub fn read_sequence(bytes: &[u8]) -> Result<NoteSequence> {
    let (tracks, ticks_per_quarter) = read_tracks(bytes)?;
    Ok(build_sequence(&tracks, ticks_per_quarter))
}
