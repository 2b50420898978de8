use crate::sequence::{NoteSequence, SeqNote, MAX_MIDI_PITCH, MIN_MIDI_PITCH};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Step value ending the current note.
pub const MELODY_NOTE_OFF: i16 = -1;
/// Step value carrying the previous state forward.
pub const MELODY_NO_EVENT: i16 = -2;

/// A monophonic line as one event per step: a pitch starts a note,
/// `MELODY_NOTE_OFF` ends it, `MELODY_NO_EVENT` sustains whatever came
/// before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Melody {
    events: Vec<i16>,
    pub start_step: i64,
    pub steps_per_bar: u32,
    pub steps_per_quarter: f64,
}

impl Melody {
    /// Build a melody from raw step events, rejecting values outside
    /// the event alphabet. Leading note-offs carry no information and
    /// become no-events.
    pub fn from_events(
        events: Vec<i16>,
        start_step: i64,
        steps_per_bar: u32,
        steps_per_quarter: f64,
    ) -> Result<Melody> {
        for &event in &events {
            if !(MELODY_NO_EVENT..=MAX_MIDI_PITCH as i16).contains(&event) {
                return Err(Error::InvalidMelodyEvent(event));
            }
        }
        let mut events = events;
        for event in &mut events {
            if *event == MELODY_NOTE_OFF {
                *event = MELODY_NO_EVENT;
            } else if *event != MELODY_NO_EVENT {
                break;
            }
        }
        Ok(Melody {
            events,
            start_step,
            steps_per_bar,
            steps_per_quarter,
        })
    }

    pub fn events(&self) -> &[i16] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn end_step(&self) -> i64 {
        self.start_step + self.events.len() as i64
    }

    /// Truncate or pad to exactly `steps` events. Padding closes a
    /// still-sounding note before the silence begins.
    pub fn set_length(&mut self, steps: usize) {
        set_events_length(&mut self.events, steps);
    }
}

fn set_events_length(events: &mut Vec<i16>, steps: usize) {
    let old_len = events.len();
    if steps < old_len {
        events.truncate(steps);
    } else if steps > old_len {
        events.resize(steps, MELODY_NO_EVENT);
        for i in (0..old_len).rev() {
            if events[i] == MELODY_NOTE_OFF {
                break;
            }
            if events[i] != MELODY_NO_EVENT {
                events[old_len] = MELODY_NOTE_OFF;
                break;
            }
        }
    }
}

/// Everything after `start` is discarded; the new note's onset ends
/// whatever was sounding there.
fn add_note(events: &mut Vec<i16>, pitch: u8, start: usize, end: usize) {
    debug_assert!(end > start);
    set_events_length(events, start + 1);
    events[start] = pitch as i16;
    events.extend(std::iter::repeat(MELODY_NO_EVENT).take(end - start - 1));
    events.push(MELODY_NOTE_OFF);
}

/// Indexes of the most recent onset and the note-off after it, if any
/// onset exists. The off index is `events.len()` while the note still
/// sounds.
fn last_on_off(events: &[i16]) -> Option<(usize, usize)> {
    let mut last_off = events.len();
    for i in (0..events.len()).rev() {
        if events[i] == MELODY_NOTE_OFF {
            last_off = i;
        }
        if events[i] >= MIN_MIDI_PITCH as i16 {
            return Some((i, last_off));
        }
    }
    None
}

/// Controls for melody extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MelodyExtractOptions {
    /// Instrument ordinal to read notes from. Default: 0.
    pub instrument: u32,
    /// Step to begin searching from. Default: 0.
    pub search_start_step: i64,
    /// Bars of silence after a note-off that end the melody. Default: 1.
    pub gap_bars: u32,
    /// Keep the highest note at a polyphonic onset instead of failing.
    /// Default: false.
    pub ignore_polyphonic_notes: bool,
    /// Pad the result with silence out to a whole bar. Default: false.
    pub pad_end: bool,
}

impl Default for MelodyExtractOptions {
    fn default() -> Self {
        Self {
            instrument: 0,
            search_start_step: 0,
            gap_bars: 1,
            ignore_polyphonic_notes: false,
            pad_end: false,
        }
    }
}

/// Pull a monophonic melody from one instrument of a quantized
/// sequence. Returns `Ok(None)` when no notes qualify.
///
/// The melody begins at the bar boundary at or before the first note.
/// Simultaneous onsets are an error unless `ignore_polyphonic_notes`
/// keeps the highest pitch, and a rest of `gap_bars` ends the melody.
pub fn extract_melody(seq: &NoteSequence, opts: &MelodyExtractOptions) -> Result<Option<Melody>> {
    let steps_per_second = seq.steps_per_second.ok_or(Error::NotQuantized)?;
    if !steps_per_second.is_finite() || steps_per_second <= 0.0 {
        return Err(Error::InvalidStepsPerSecond(steps_per_second));
    }
    let signature = seq.time_signatures.first().ok_or(Error::NoTimeSignature)?;
    if signature.numerator == 0 || signature.denominator == 0 {
        return Err(Error::InvalidTimeSignature {
            numerator: signature.numerator,
            denominator: signature.denominator,
        });
    }
    let qpm = seq.uniform_qpm()?;
    let steps_per_quarter = steps_per_second * 60.0 / qpm;
    let quarters_per_bar = 4.0 / signature.denominator as f64 * signature.numerator as f64;
    let steps_per_bar_f = steps_per_quarter * quarters_per_bar;
    if steps_per_bar_f.fract() != 0.0 {
        return Err(Error::FractionalStepsPerBar(steps_per_bar_f));
    }
    let steps_per_bar = steps_per_bar_f as i64;

    let mut notes: Vec<&SeqNote> = seq
        .notes
        .iter()
        .filter(|n| {
            n.instrument == opts.instrument
                && n.start_time >= opts.search_start_step
                && n.velocity > 0
        })
        .collect();
    // Descending pitch at equal onsets, so the highest note comes first.
    notes.sort_by_key(|n| (n.start_time, Reverse(n.pitch)));

    let first_start = match notes.first() {
        Some(n) => n.start_time,
        None => return Ok(None),
    };
    let melody_start = first_start - (first_start - opts.search_start_step) % steps_per_bar;

    let mut events: Vec<i16> = Vec::new();
    for note in notes {
        let start_index = note.start_time - melody_start;
        let end_index = note.end_time - melody_start;

        if let Some((last_on, last_off)) = last_on_off(&events) {
            let on_distance = start_index - last_on as i64;
            let off_distance = start_index - last_off as i64;
            if on_distance == 0 {
                if opts.ignore_polyphonic_notes {
                    continue;
                }
                return Err(Error::PolyphonicOnset(note.start_time));
            }
            if on_distance < 0 {
                return Err(Error::NotesOutOfOrder {
                    found: note.start_time,
                    prev: melody_start + last_on as i64,
                });
            }
            if off_distance >= opts.gap_bars as i64 * steps_per_bar {
                break;
            }
        }
        add_note(&mut events, note.pitch, start_index as usize, end_index as usize);
    }

    if events.is_empty() {
        return Ok(None);
    }
    if events.last() == Some(&MELODY_NOTE_OFF) {
        events.pop();
    }
    let mut length = events.len();
    if opts.pad_end {
        let bar = steps_per_bar as usize;
        length += (bar - length % bar) % bar;
    }
    set_events_length(&mut events, length);

    Ok(Some(Melody {
        events,
        start_step: melody_start,
        steps_per_bar: steps_per_bar as u32,
        steps_per_quarter,
    }))
}
