use crate::sequence::NoteSequence;
use crate::{Error, Result};
use tracing::debug;

/// Fraction of a step an onset must reach before it rounds up to the
/// next step boundary.
const QUANTIZE_CUTOFF: f64 = 0.5;

/// Snap note and control-change times from ticks to a fixed grid of
/// `steps_per_second` steps, marking the sequence quantized.
///
/// Requires a single uniform tempo; the grid has no meaning across a
/// tempo change. Notes that collapse to zero length keep one step.
pub fn quantize(mut seq: NoteSequence, steps_per_second: f64) -> Result<NoteSequence> {
    if seq.is_quantized() {
        return Err(Error::AlreadyQuantized);
    }
    if !steps_per_second.is_finite() || steps_per_second <= 0.0 {
        return Err(Error::InvalidStepsPerSecond(steps_per_second));
    }
    let qpm = seq.uniform_qpm()?;
    let ticks_per_second = seq.ticks_per_quarter as f64 * qpm / 60.0;
    let to_step = |ticks: i64| -> i64 {
        let seconds = ticks as f64 / ticks_per_second;
        (seconds * steps_per_second + (1.0 - QUANTIZE_CUTOFF)).floor() as i64
    };

    for note in &mut seq.notes {
        note.start_time = to_step(note.start_time);
        note.end_time = to_step(note.end_time);
        if note.start_time < 0 {
            return Err(Error::NegativeQuantizedTime(note.start_time));
        }
        if note.end_time == note.start_time {
            note.end_time += 1;
        }
    }
    for cc in &mut seq.control_changes {
        cc.time = to_step(cc.time);
        if cc.time < 0 {
            return Err(Error::NegativeQuantizedTime(cc.time));
        }
    }

    seq.total_time = to_step(seq.total_time);
    let max_end = seq.notes.iter().map(|n| n.end_time).max().unwrap_or(0);
    seq.total_time = seq.total_time.max(max_end);
    seq.steps_per_second = Some(steps_per_second);
    Ok(seq)
}

/// Scale every timestamp by `factor` and divide tempos by it, slowing
/// the sequence down (factor > 1) or speeding it up (factor < 1).
pub fn stretch(mut seq: NoteSequence, factor: f64) -> Result<NoteSequence> {
    if seq.is_quantized() {
        return Err(Error::AlreadyQuantized);
    }
    if !factor.is_finite() || factor <= 0.0 {
        return Err(Error::InvalidStretchFactor(factor));
    }
    if factor == 1.0 {
        return Ok(seq);
    }
    let scale = |t: i64| (t as f64 * factor).round() as i64;

    for note in &mut seq.notes {
        note.start_time = scale(note.start_time);
        note.end_time = scale(note.end_time);
    }
    for ts in &mut seq.time_signatures {
        ts.time = scale(ts.time);
    }
    for ks in &mut seq.key_signatures {
        ks.time = scale(ks.time);
    }
    for tempo in &mut seq.tempos {
        tempo.time = scale(tempo.time);
        tempo.qpm /= factor;
    }
    for pb in &mut seq.pitch_bends {
        pb.time = scale(pb.time);
    }
    for cc in &mut seq.control_changes {
        cc.time = scale(cc.time);
    }
    seq.total_time = scale(seq.total_time);
    Ok(seq)
}

/// Shift every note by `amount` semitones, deleting notes that land
/// outside `[min_pitch, max_pitch]`. Returns the sequence and how many
/// notes were deleted.
pub fn transpose(
    mut seq: NoteSequence,
    amount: i32,
    min_pitch: u8,
    max_pitch: u8,
) -> Result<(NoteSequence, usize)> {
    if min_pitch > max_pitch {
        return Err(Error::InvertedPitchBounds {
            min: min_pitch,
            max: max_pitch,
        });
    }
    let mut deleted = 0usize;
    let notes = std::mem::take(&mut seq.notes);
    seq.notes = notes
        .into_iter()
        .filter_map(|mut note| {
            let pitch = note.pitch as i32 + amount;
            if pitch < min_pitch as i32 || pitch > max_pitch as i32 {
                deleted += 1;
                None
            } else {
                note.pitch = pitch as u8;
                Some(note)
            }
        })
        .collect();
    if deleted > 0 {
        seq.refresh_total_time();
        debug!(deleted, "transposition dropped out-of-range notes");
    }
    Ok((seq, deleted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{SeqNote, Tempo, TimeSignature};
    use pretty_assertions::assert_eq;

    fn note(pitch: u8, start: i64, end: i64) -> SeqNote {
        SeqNote {
            pitch,
            velocity: 100,
            start_time: start,
            end_time: end,
            instrument: 0,
            program: 0,
        }
    }

    fn sequence(notes: &[(u8, i64, i64)]) -> NoteSequence {
        let mut seq = NoteSequence::new(220);
        seq.notes = notes.iter().map(|&(p, s, e)| note(p, s, e)).collect();
        seq.refresh_total_time();
        seq
    }

    #[test]
    fn quantize_rounds_to_nearest_step() {
        // 220 tpq at the default 120 qpm is 440 ticks per second; at 4
        // steps per second, 275 ticks sits at 2.5 steps and rounds up.
        let seq = sequence(&[(60, 275, 440)]);
        let seq = quantize(seq, 4.0).unwrap();

        assert_eq!(seq.notes[0].start_time, 3);
        assert_eq!(seq.notes[0].end_time, 4);
        assert_eq!(seq.steps_per_second, Some(4.0));
        assert!(seq.is_quantized());
    }

    #[test]
    fn quantize_keeps_one_step_for_short_notes() {
        let seq = sequence(&[(60, 0, 10)]);
        let seq = quantize(seq, 4.0).unwrap();

        assert_eq!(seq.notes[0].start_time, 0);
        assert_eq!(seq.notes[0].end_time, 1);
        assert_eq!(seq.total_time, 1);
    }

    #[test]
    fn quantize_covers_control_changes_and_total_time() {
        let mut seq = sequence(&[(60, 0, 440)]);
        seq.control_changes.push(crate::sequence::ControlChange {
            time: 275,
            controller: 64,
            value: 100,
            instrument: 0,
            program: 0,
        });
        let seq = quantize(seq, 4.0).unwrap();

        assert_eq!(seq.control_changes[0].time, 3);
        assert_eq!(seq.total_time, 4);
    }

    #[test]
    fn quantize_rejects_quantized_input() {
        let seq = quantize(sequence(&[(60, 0, 440)]), 4.0).unwrap();
        let err = quantize(seq, 4.0).unwrap_err();
        assert!(matches!(err, Error::AlreadyQuantized));
    }

    #[test]
    fn quantize_rejects_tempo_change() {
        let mut seq = sequence(&[(60, 0, 440)]);
        seq.tempos.push(Tempo {
            time: 0,
            qpm: 120.0,
        });
        seq.tempos.push(Tempo {
            time: 220,
            qpm: 140.0,
        });
        let err = quantize(seq, 4.0).unwrap_err();
        assert!(matches!(err, Error::InconsistentTempo(..)));
    }

    #[test]
    fn quantize_rejects_negative_times() {
        let seq = sequence(&[(60, -100, 440)]);
        let err = quantize(seq, 4.0).unwrap_err();
        assert!(matches!(err, Error::NegativeQuantizedTime(_)));
    }

    #[test]
    fn stretch_slows_times_and_tempo() {
        let mut seq = sequence(&[(60, 100, 200)]);
        seq.tempos.push(Tempo {
            time: 0,
            qpm: 120.0,
        });
        seq.time_signatures.push(TimeSignature {
            time: 40,
            numerator: 4,
            denominator: 4,
        });
        let seq = stretch(seq, 3.0).unwrap();

        assert_eq!(seq.notes[0].start_time, 300);
        assert_eq!(seq.notes[0].end_time, 600);
        assert_eq!(seq.tempos[0].qpm, 40.0);
        assert_eq!(seq.time_signatures[0].time, 120);
        assert_eq!(seq.total_time, 600);
    }

    #[test]
    fn stretch_speeds_up_below_one() {
        let mut seq = sequence(&[(60, 100, 200)]);
        seq.tempos.push(Tempo {
            time: 0,
            qpm: 120.0,
        });
        let seq = stretch(seq, 0.25).unwrap();

        assert_eq!(seq.notes[0].start_time, 25);
        assert_eq!(seq.notes[0].end_time, 50);
        assert_eq!(seq.tempos[0].qpm, 480.0);
    }

    #[test]
    fn stretch_scales_a_three_note_line() {
        let notes = &[(60, 0, 220), (64, 220, 440), (67, 440, 660)];

        let slowed = stretch(sequence(notes), 3.0).unwrap();
        let ends: Vec<_> = slowed
            .notes
            .iter()
            .map(|n| (n.start_time, n.end_time))
            .collect();
        assert_eq!(ends, vec![(0, 660), (660, 1320), (1320, 1980)]);
        assert_eq!(slowed.total_time, 1980);

        let rushed = stretch(sequence(notes), 0.25).unwrap();
        let ends: Vec<_> = rushed
            .notes
            .iter()
            .map(|n| (n.start_time, n.end_time))
            .collect();
        assert_eq!(ends, vec![(0, 55), (55, 110), (110, 165)]);
        assert_eq!(rushed.total_time, 165);
    }

    #[test]
    fn stretch_then_inverse_restores_times() {
        let seq = stretch(sequence(&[(60, 100, 200)]), 3.0).unwrap();
        let seq = stretch(seq, 1.0 / 3.0).unwrap();

        assert_eq!(seq.notes[0].start_time, 100);
        assert_eq!(seq.notes[0].end_time, 200);
    }

    #[test]
    fn stretch_rejects_quantized_and_bad_factors() {
        let quantized = quantize(sequence(&[(60, 0, 440)]), 4.0).unwrap();
        assert!(matches!(
            stretch(quantized, 2.0).unwrap_err(),
            Error::AlreadyQuantized
        ));
        assert!(matches!(
            stretch(sequence(&[]), 0.0).unwrap_err(),
            Error::InvalidStretchFactor(_)
        ));
        assert!(matches!(
            stretch(sequence(&[]), -1.0).unwrap_err(),
            Error::InvalidStretchFactor(_)
        ));
    }

    #[test]
    fn transpose_moves_and_deletes() {
        let seq = sequence(&[(30, 0, 100), (60, 100, 200)]);
        let (seq, deleted) = transpose(seq, -12, 20, 60).unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(seq.notes.len(), 1);
        assert_eq!(seq.notes[0].pitch, 48);
        assert_eq!(seq.total_time, 200);
    }

    #[test]
    fn transpose_down_into_a_narrow_range() {
        let mut seq = NoteSequence::new(220);
        for &(pitch, velocity, start, end) in
            &[(116u8, 4u8, 0i64, 1i64), (42, 75, 103, 635), (67, 100, 216, 773)]
        {
            seq.notes.push(SeqNote {
                pitch,
                velocity,
                start_time: start,
                end_time: end,
                instrument: 0,
                program: 0,
            });
        }
        seq.refresh_total_time();

        let (seq, deleted) = transpose(seq, -12, 20, 60).unwrap();

        assert_eq!(deleted, 1);
        let kept: Vec<_> = seq
            .notes
            .iter()
            .map(|n| (n.pitch, n.velocity, n.start_time, n.end_time))
            .collect();
        assert_eq!(kept, vec![(30, 75, 103, 635), (55, 100, 216, 773)]);
    }

    #[test]
    fn transpose_up_then_down_restores_survivors() {
        let seq = sequence(&[(60, 0, 100), (64, 100, 200), (120, 200, 300), (30, 300, 400)]);

        let (seq, deleted) = transpose(seq, 12, 20, 127).unwrap();
        assert_eq!(deleted, 1);
        let pitches: Vec<_> = seq.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![72, 76, 42]);

        let (seq, deleted) = transpose(seq, -12, 20, 127).unwrap();
        assert_eq!(deleted, 0);
        let pitches: Vec<_> = seq.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 64, 30]);
    }

    #[test]
    fn transpose_refreshes_total_time_after_deletion() {
        let seq = sequence(&[(60, 0, 100), (100, 100, 500)]);
        let (seq, deleted) = transpose(seq, 40, 0, 127).unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(seq.notes[0].pitch, 100);
        assert_eq!(seq.total_time, 100);
    }

    #[test]
    fn transpose_rejects_inverted_bounds() {
        let err = transpose(sequence(&[]), 0, 60, 20).unwrap_err();
        assert!(matches!(err, Error::InvertedPitchBounds { .. }));
    }
}
