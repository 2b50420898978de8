use crate::sequence::{NoteSequence, SeqNote, Tempo, DEFAULT_QPM, STANDARD_PPQ};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Steps per second conventional for performance encodings.
pub const DEFAULT_STEPS_PER_SECOND: f64 = 100.0;
/// Longest time shift a single event expresses by default.
pub const DEFAULT_MAX_SHIFT_STEPS: u32 = 100;

/// One symbol of a performance stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceEvent {
    NoteOn(u8),
    NoteOff(u8),
    /// Advance time by this many steps.
    TimeShift(u32),
    /// Switch the running velocity to this bin (1-based).
    Velocity(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceEventKind {
    NoteOn,
    NoteOff,
    TimeShift,
    Velocity,
}

impl PerformanceEvent {
    /// Build an event from a kind and a raw value, checking the value
    /// domain: pitches 0..=127, shifts >= 0, velocity bins 1..=127.
    pub fn new(kind: PerformanceEventKind, value: i32) -> Result<PerformanceEvent> {
        match kind {
            PerformanceEventKind::NoteOn if (0..=127).contains(&value) => {
                Ok(PerformanceEvent::NoteOn(value as u8))
            }
            PerformanceEventKind::NoteOff if (0..=127).contains(&value) => {
                Ok(PerformanceEvent::NoteOff(value as u8))
            }
            PerformanceEventKind::TimeShift if value >= 0 => {
                Ok(PerformanceEvent::TimeShift(value as u32))
            }
            PerformanceEventKind::Velocity if (1..=127).contains(&value) => {
                Ok(PerformanceEvent::Velocity(value as u8))
            }
            _ => Err(Error::InvalidEventValue { kind, value }),
        }
    }

    pub fn kind(&self) -> PerformanceEventKind {
        match self {
            PerformanceEvent::NoteOn(_) => PerformanceEventKind::NoteOn,
            PerformanceEvent::NoteOff(_) => PerformanceEventKind::NoteOff,
            PerformanceEvent::TimeShift(_) => PerformanceEventKind::TimeShift,
            PerformanceEvent::Velocity(_) => PerformanceEventKind::Velocity,
        }
    }

    pub fn value(&self) -> i32 {
        match *self {
            PerformanceEvent::NoteOn(pitch) | PerformanceEvent::NoteOff(pitch) => pitch as i32,
            PerformanceEvent::TimeShift(steps) => steps as i32,
            PerformanceEvent::Velocity(bin) => bin as i32,
        }
    }
}

/// Controls for encoding a quantized sequence as a performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceOptions {
    /// Step to begin encoding from. Default: 0.
    pub start_step: i64,
    /// Number of velocity bins; 0 omits velocity events. Default: 0.
    pub velocity_bins: u8,
    /// Longest expressible shift in steps. Default: 100.
    pub max_shift_steps: u32,
    /// Restrict to one instrument ordinal; `None` takes every note.
    /// Default: `None`.
    pub instrument: Option<u32>,
    /// Program carried along to decoded sequences. Default: `None`.
    pub program: Option<u8>,
}

impl Default for PerformanceOptions {
    fn default() -> Self {
        Self {
            start_step: 0,
            velocity_bins: 0,
            max_shift_steps: DEFAULT_MAX_SHIFT_STEPS,
            instrument: None,
            program: None,
        }
    }
}

/// A polyphonic passage as a flat stream of note-on/off, time-shift,
/// and velocity events on a fixed steps-per-second grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    events: Vec<PerformanceEvent>,
    pub start_step: i64,
    pub steps_per_second: f64,
    pub velocity_bins: u8,
    pub max_shift_steps: u32,
    pub program: Option<u8>,
}

impl Performance {
    /// An empty performance on the given grid.
    pub fn new(
        steps_per_second: f64,
        velocity_bins: u8,
        max_shift_steps: u32,
    ) -> Result<Performance> {
        if !steps_per_second.is_finite() || steps_per_second <= 0.0 {
            return Err(Error::InvalidStepsPerSecond(steps_per_second));
        }
        if velocity_bins > 127 {
            return Err(Error::InvalidVelocityBins(velocity_bins));
        }
        if max_shift_steps == 0 {
            return Err(Error::InvalidMaxShift(max_shift_steps));
        }
        Ok(Performance {
            events: Vec::new(),
            start_step: 0,
            steps_per_second,
            velocity_bins,
            max_shift_steps,
            program: None,
        })
    }

    /// Encode the notes of a quantized sequence, walking onsets and
    /// releases in step order. Within a step, lower pitches come first
    /// and a note's onset precedes its release.
    pub fn from_quantized(seq: &NoteSequence, opts: &PerformanceOptions) -> Result<Performance> {
        let steps_per_second = seq.steps_per_second.ok_or(Error::NotQuantized)?;
        let mut perf =
            Performance::new(steps_per_second, opts.velocity_bins, opts.max_shift_steps)?;
        perf.start_step = opts.start_step;
        perf.program = opts.program;

        let mut notes: Vec<&SeqNote> = seq
            .notes
            .iter()
            .filter(|n| {
                n.start_time >= opts.start_step
                    && opts.instrument.map_or(true, |i| n.instrument == i)
            })
            .collect();
        notes.sort_by_key(|n| (n.start_time, n.pitch));

        // (step, note index, is_offset); offsets sort after onsets of
        // the same note.
        let mut note_events: Vec<(i64, usize, bool)> = Vec::with_capacity(notes.len() * 2);
        for (idx, note) in notes.iter().enumerate() {
            note_events.push((note.start_time, idx, false));
            note_events.push((note.end_time, idx, true));
        }
        note_events.sort();

        let mut current_step = opts.start_step;
        let mut current_bin: u8 = 0;
        for (step, idx, is_offset) in note_events {
            if step > current_step {
                while step > current_step + perf.max_shift_steps as i64 {
                    perf.events.push(PerformanceEvent::TimeShift(perf.max_shift_steps));
                    current_step += perf.max_shift_steps as i64;
                }
                perf.events
                    .push(PerformanceEvent::TimeShift((step - current_step) as u32));
                current_step = step;
            }
            let note = notes[idx];
            if perf.velocity_bins > 0 && !is_offset {
                let bin = velocity_to_bin(note.velocity, perf.velocity_bins);
                if bin != current_bin {
                    current_bin = bin;
                    perf.events.push(PerformanceEvent::Velocity(bin));
                }
            }
            perf.events.push(if is_offset {
                PerformanceEvent::NoteOff(note.pitch)
            } else {
                PerformanceEvent::NoteOn(note.pitch)
            });
        }
        Ok(perf)
    }

    /// Decode back to an unquantized sequence at the standard pulse
    /// resolution and default tempo, so re-quantizing at the same grid
    /// reproduces the original steps.
    ///
    /// `velocity` applies until the first velocity event changes the
    /// running value. Note-offs with no matching note-on are dropped,
    /// and notes still sounding at the end close at the final step.
    pub fn to_sequence(&self, velocity: u8, instrument: u32, program: Option<u8>) -> NoteSequence {
        let ticks_per_step = STANDARD_PPQ as f64 * DEFAULT_QPM / (60.0 * self.steps_per_second);
        let to_ticks =
            |step: i64| ((self.start_step + step) as f64 * ticks_per_step).round() as i64;
        let program = program.or(self.program).unwrap_or(0);

        let mut seq = NoteSequence::new(STANDARD_PPQ);
        seq.tempos.push(Tempo {
            time: 0,
            qpm: DEFAULT_QPM,
        });

        let mut velocity = velocity;
        let mut step: i64 = 0;
        // One FIFO per pitch, in order of first onset.
        let mut pending: Vec<(u8, Vec<(i64, u8)>)> = Vec::new();

        for event in &self.events {
            match *event {
                PerformanceEvent::NoteOn(pitch) => {
                    match pending.iter_mut().find(|(p, _)| *p == pitch) {
                        Some((_, queue)) => queue.push((step, velocity)),
                        None => pending.push((pitch, vec![(step, velocity)])),
                    }
                }
                PerformanceEvent::NoteOff(pitch) => {
                    let queue = pending
                        .iter_mut()
                        .find(|(p, _)| *p == pitch)
                        .map(|(_, q)| q);
                    match queue {
                        Some(queue) if !queue.is_empty() => {
                            let (start, vel) = queue.remove(0);
                            if start == step {
                                debug!(step, pitch, "skipping zero-duration note");
                                continue;
                            }
                            seq.notes.push(SeqNote {
                                pitch,
                                velocity: vel,
                                start_time: to_ticks(start),
                                end_time: to_ticks(step),
                                instrument,
                                program,
                            });
                        }
                        _ => debug!(step, pitch, "ignoring note-off without a note-on"),
                    }
                }
                PerformanceEvent::TimeShift(shift) => step += shift as i64,
                PerformanceEvent::Velocity(bin) => {
                    if self.velocity_bins > 0 {
                        velocity = bin_to_velocity(bin, self.velocity_bins);
                    } else {
                        debug!(bin, "ignoring velocity event in binless performance");
                    }
                }
            }
        }

        // Notes never released close at the final step.
        for (pitch, queue) in pending {
            for (start, vel) in queue {
                if start == step {
                    debug!(step, pitch, "skipping zero-duration note");
                    continue;
                }
                seq.notes.push(SeqNote {
                    pitch,
                    velocity: vel,
                    start_time: to_ticks(start),
                    end_time: to_ticks(step),
                    instrument,
                    program,
                });
            }
        }

        seq.refresh_total_time();
        seq
    }

    pub fn push(&mut self, event: PerformanceEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[PerformanceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total steps spanned, the sum of all time shifts.
    pub fn num_steps(&self) -> u32 {
        self.events
            .iter()
            .map(|e| match e {
                PerformanceEvent::TimeShift(v) => *v,
                _ => 0,
            })
            .sum()
    }

    pub fn end_step(&self) -> i64 {
        self.start_step + self.num_steps() as i64
    }

    /// Grow or shrink to exactly `steps` steps. Growth widens the
    /// trailing shift before appending new ones; shrinking discards
    /// trailing events until enough shift has been removed.
    pub fn set_length(&mut self, steps: u32) {
        let current = self.num_steps();
        if current < steps {
            let mut diff = steps - current;
            if let Some(PerformanceEvent::TimeShift(v)) = self.events.last_mut() {
                let grow = diff.min(self.max_shift_steps.saturating_sub(*v));
                *v += grow;
                diff -= grow;
            }
            while diff > 0 {
                let shift = diff.min(self.max_shift_steps);
                self.events.push(PerformanceEvent::TimeShift(shift));
                diff -= shift;
            }
        } else if current > steps {
            let mut excess = current - steps;
            while excess > 0 {
                match self.events.pop() {
                    Some(PerformanceEvent::TimeShift(v)) => {
                        if v <= excess {
                            excess -= v;
                        } else {
                            self.events.push(PerformanceEvent::TimeShift(v - excess));
                            excess = 0;
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
        debug_assert_eq!(self.num_steps(), steps);
    }
}

fn velocity_to_bin(velocity: u8, bins: u8) -> u8 {
    ((velocity.max(1) as u32 - 1) * bins as u32 / 127 + 1) as u8
}

fn bin_to_velocity(bin: u8, bins: u8) -> u8 {
    let bin = bin.max(1) as u32;
    let bins = bins.max(1) as u32;
    let lo = (bin - 1) * 127 / bins + 1;
    let hi = bin * 127 / bins;
    ((lo + hi) / 2).min(127) as u8
}
