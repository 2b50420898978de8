use crate::events::{EventKind, Track};
use crate::sequence::{
    ControlChange, KeySignature, NoteSequence, PitchBend, SeqNote, Tempo, TimeSignature,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Notes and controller events reconstructed for one stream source.
///
/// A transient grouping produced by extraction; `build_sequence`
/// flattens instruments into a `NoteSequence`, assigning each bucket's
/// position as the instrument ordinal on its events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub program: u8,
    pub notes: Vec<SeqNote>,
    pub pitch_bends: Vec<PitchBend>,
    pub control_changes: Vec<ControlChange>,
}

impl Instrument {
    fn new(program: u8) -> Self {
        Self {
            program,
            notes: Vec::new(),
            pitch_bends: Vec::new(),
            control_changes: Vec::new(),
        }
    }
}

/// Buckets keyed by (program, channel, track), iterated in the order
/// keys were first seen.
#[derive(Default)]
struct InstrumentMap {
    keys: Vec<(u8, u8, usize)>,
    buckets: Vec<Instrument>,
}

impl InstrumentMap {
    fn get_or_insert(&mut self, key: (u8, u8, usize)) -> &mut Instrument {
        let idx = match self.keys.iter().position(|k| *k == key) {
            Some(idx) => idx,
            None => {
                self.keys.push(key);
                self.buckets.push(Instrument::new(key.0));
                self.keys.len() - 1
            }
        };
        &mut self.buckets[idx]
    }

    /// Re-key the default-program bucket when a program change arrives
    /// after controller events but before any note landed in it.
    fn relabel_default(&mut self, channel: u8, track: usize, program: u8) {
        let from = (0u8, channel, track);
        let to = (program, channel, track);
        if to == from {
            return;
        }
        let Some(idx) = self.keys.iter().position(|k| *k == from) else {
            return;
        };
        if !self.buckets[idx].notes.is_empty() {
            return;
        }
        if let Some(existing) = self.keys.iter().position(|k| *k == to) {
            // Target bucket already established: fold the stray events in.
            self.keys.remove(idx);
            let mut moved = self.buckets.remove(idx);
            let existing = if existing > idx { existing - 1 } else { existing };
            retag_program(&mut moved, program);
            self.buckets[existing].pitch_bends.extend(moved.pitch_bends);
            self.buckets[existing].control_changes.extend(moved.control_changes);
        } else {
            self.keys[idx] = to;
            self.buckets[idx].program = program;
            retag_program(&mut self.buckets[idx], program);
        }
    }
}

fn retag_program(instrument: &mut Instrument, program: u8) {
    for pb in &mut instrument.pitch_bends {
        pb.program = program;
    }
    for cc in &mut instrument.control_changes {
        cc.program = program;
    }
}

/// Reconstruct per-(program, channel, track) instruments from raw
/// absolute-time tracks, pairing note-ons with note-offs.
///
/// Overlapping same-pitch notes stack in FIFO order. Note-ons still
/// pending at the end of a track are dropped; a truncated track never
/// invents an end time.
pub fn extract_instruments(tracks: &[Track]) -> Vec<Instrument> {
    let mut map = InstrumentMap::default();

    for (track_index, track) in tracks.iter().enumerate() {
        let mut programs = [0u8; 16];
        // (channel, pitch) → FIFO of (start_time, velocity) for notes
        // currently sounding
        let mut pending: HashMap<(u8, u8), Vec<(i64, u8)>> = HashMap::new();

        for event in track {
            let time = event.time;
            match event.kind {
                EventKind::NoteOn {
                    channel,
                    pitch,
                    velocity,
                } if velocity > 0 => {
                    pending
                        .entry((channel, pitch))
                        .or_default()
                        .push((time, velocity));
                }
                EventKind::NoteOn { channel, pitch, .. }
                | EventKind::NoteOff { channel, pitch } => {
                    // vel=0 NoteOn is a NoteOff
                    let Some(queue) = pending.remove(&(channel, pitch)) else {
                        continue;
                    };
                    // An entry starting at this very moment belongs to
                    // the onset beside this off; it stays pending.
                    let (continuing, closing): (Vec<_>, Vec<_>) =
                        queue.into_iter().partition(|entry| entry.0 == time);
                    if !continuing.is_empty() {
                        pending.insert((channel, pitch), continuing);
                    }
                    if closing.is_empty() {
                        continue;
                    }
                    let program = programs[(channel as usize) & 0x0F];
                    let bucket = map.get_or_insert((program, channel, track_index));
                    for (start_time, velocity) in closing {
                        bucket.notes.push(SeqNote {
                            pitch,
                            velocity,
                            start_time,
                            end_time: time,
                            instrument: 0,
                            program,
                        });
                    }
                }
                EventKind::ProgramChange { channel, program } => {
                    programs[(channel as usize) & 0x0F] = program;
                    map.relabel_default(channel, track_index, program);
                }
                EventKind::ControlChange {
                    channel,
                    controller,
                    value,
                } => {
                    let program = programs[(channel as usize) & 0x0F];
                    let bucket = map.get_or_insert((program, channel, track_index));
                    bucket.control_changes.push(ControlChange {
                        time,
                        controller,
                        value,
                        instrument: 0,
                        program,
                    });
                }
                EventKind::PitchBend { channel, value } => {
                    let program = programs[(channel as usize) & 0x0F];
                    let bucket = map.get_or_insert((program, channel, track_index));
                    bucket.pitch_bends.push(PitchBend {
                        time,
                        value,
                        instrument: 0,
                        program,
                    });
                }
                EventKind::SetTempo { .. }
                | EventKind::TimeSignature { .. }
                | EventKind::KeySignature { .. } => {}
            }
        }

        if !pending.is_empty() {
            let unresolved: usize = pending.values().map(Vec::len).sum();
            debug!(
                track = track_index,
                unresolved, "dropping note-ons without a terminal note-off"
            );
        }
    }

    map.buckets
}

/// Assemble a `NoteSequence` from raw tracks: demultiplex instruments,
/// collect tempo/signature meta events, and assign instrument ordinals.
pub fn build_sequence(tracks: &[Track], ticks_per_quarter: u16) -> NoteSequence {
    let mut seq = NoteSequence::new(ticks_per_quarter);

    for track in tracks {
        for event in track {
            match event.kind {
                EventKind::SetTempo { qpm } => {
                    seq.tempos.push(Tempo {
                        time: event.time,
                        qpm,
                    });
                }
                EventKind::TimeSignature {
                    numerator,
                    denominator,
                } => {
                    seq.time_signatures.push(TimeSignature {
                        time: event.time,
                        numerator,
                        denominator,
                    });
                }
                EventKind::KeySignature { sharps, minor } => {
                    seq.key_signatures.push(KeySignature {
                        time: event.time,
                        sharps,
                        minor,
                    });
                }
                _ => {}
            }
        }
    }

    // Parallel tracks repeat meta events; keep one copy per time.
    seq.tempos.sort_by_key(|t| t.time);
    seq.tempos.dedup_by(|a, b| a.time == b.time && a.qpm == b.qpm);
    seq.time_signatures.sort_by_key(|t| t.time);
    seq.time_signatures.dedup_by(|a, b| a.time == b.time);
    seq.key_signatures.sort_by_key(|k| k.time);
    seq.key_signatures.dedup_by(|a, b| a.time == b.time);

    for (ordinal, instrument) in extract_instruments(tracks).into_iter().enumerate() {
        let ordinal = ordinal as u32;
        for mut note in instrument.notes {
            note.instrument = ordinal;
            seq.notes.push(note);
        }
        for mut pb in instrument.pitch_bends {
            pb.instrument = ordinal;
            seq.pitch_bends.push(pb);
        }
        for mut cc in instrument.control_changes {
            cc.instrument = ordinal;
            seq.control_changes.push(cc);
        }
    }

    seq.refresh_total_time();
    seq
}
