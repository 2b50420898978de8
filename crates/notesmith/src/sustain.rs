use crate::sequence::NoteSequence;
use std::collections::HashMap;

// Same-time ties resolve in this order: pedal state changes first, then
// onsets, then releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PedalKind {
    SustainOn,
    SustainOff,
    NoteOn,
    NoteOff,
}

#[derive(Default)]
struct InstrumentState {
    sustain: bool,
    active: Vec<usize>,
}

/// Fold sustain-pedal control changes into note durations: while the
/// pedal is down, a note sounds until the pedal releases or the same
/// pitch retriggers.
///
/// Pedal state is tracked per instrument. Control changes with values
/// of 64 and above press the pedal; lower values release it. The
/// control changes themselves stay in the sequence.
pub fn apply_sustain(mut seq: NoteSequence, controller: u8) -> NoteSequence {
    // (time, kind, note index, instrument); pedal events carry no note.
    let mut events: Vec<(i64, PedalKind, usize, u32)> = Vec::new();
    for cc in &seq.control_changes {
        if cc.controller != controller {
            continue;
        }
        let kind = if cc.value >= 64 {
            PedalKind::SustainOn
        } else {
            PedalKind::SustainOff
        };
        events.push((cc.time, kind, usize::MAX, cc.instrument));
    }
    for (i, note) in seq.notes.iter().enumerate() {
        events.push((note.start_time, PedalKind::NoteOn, i, note.instrument));
    }
    for (i, note) in seq.notes.iter().enumerate() {
        events.push((note.end_time, PedalKind::NoteOff, i, note.instrument));
    }
    events.sort_by_key(|&(time, kind, ..)| (time, kind));

    let mut states: HashMap<u32, InstrumentState> = HashMap::new();
    let mut deleted = vec![false; seq.notes.len()];
    let mut last_time = 0i64;

    for &(time, kind, index, instrument) in &events {
        last_time = time;
        let state = states.entry(instrument).or_default();
        match kind {
            PedalKind::SustainOn => state.sustain = true,
            PedalKind::SustainOff => {
                state.sustain = false;
                // Notes whose release was swallowed by the pedal end
                // here; notes still held keep sounding.
                let mut held = Vec::new();
                for &i in &state.active {
                    if seq.notes[i].end_time < time {
                        seq.notes[i].end_time = time;
                    } else {
                        held.push(i);
                    }
                }
                state.active = held;
            }
            PedalKind::NoteOn => {
                if state.sustain {
                    let pitch = seq.notes[index].pitch;
                    let mut held = Vec::new();
                    for &i in &state.active {
                        if seq.notes[i].pitch == pitch {
                            seq.notes[i].end_time = time;
                            if seq.notes[i].start_time == time {
                                // Retriggered at its own onset: nothing
                                // left of the earlier note.
                                deleted[i] = true;
                            }
                        } else {
                            held.push(i);
                        }
                    }
                    state.active = held;
                }
                state.active.push(index);
            }
            PedalKind::NoteOff => {
                if !state.sustain {
                    state.active.retain(|&i| i != index);
                }
            }
        }
    }

    // The pedal never released for these; end them at the last event.
    for state in states.values() {
        for &i in &state.active {
            seq.notes[i].end_time = last_time;
        }
    }

    if deleted.iter().any(|&d| d) {
        let mut idx = 0;
        seq.notes.retain(|_| {
            let keep = !deleted[idx];
            idx += 1;
            keep
        });
    }

    let max_end = seq.notes.iter().map(|n| n.end_time).max().unwrap_or(0);
    seq.total_time = seq.total_time.max(max_end);
    seq
}
