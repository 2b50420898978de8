use crate::{Error, Result};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use notesmith::NoteSequence;
use tracing::{debug, warn};

/// Encode a sequence as Standard MIDI File format 1 bytes.
///
/// Track 0 carries tempo, time-signature, and key-signature meta
/// events; each instrument gets its own track and channel, leaving the
/// percussion channel free. Tick times are written as-is, so quantized
/// sequences are rejected.
pub fn write_sequence(seq: &NoteSequence) -> Result<Vec<u8>> {
    if seq.is_quantized() {
        return Err(Error::QuantizedSequence);
    }

    let header = Header::new(
        Format::Parallel,
        Timing::Metrical(seq.ticks_per_quarter.into()),
    );
    let mut smf = Smf::new(header);
    smf.tracks.push(build_meta_track(seq));

    let num_instruments = seq
        .notes
        .iter()
        .map(|n| n.instrument + 1)
        .chain(seq.pitch_bends.iter().map(|p| p.instrument + 1))
        .chain(seq.control_changes.iter().map(|c| c.instrument + 1))
        .max()
        .unwrap_or(0);

    if num_instruments > 15 {
        warn!(
            instruments = num_instruments,
            "more instruments than usable channels; the rest share channel 15"
        );
    }
    let mut channel_alloc = 0u8;
    for instrument in 0..num_instruments {
        let channel = channel_alloc.min(15);
        if channel_alloc < 16 {
            channel_alloc += 1;
            if channel_alloc == 9 {
                channel_alloc = 10; // skip percussion channel
            }
        }
        smf.tracks.push(build_instrument_track(seq, instrument, channel));
    }

    let mut buffer = Vec::new();
    smf.write(&mut buffer)
        .map_err(|e| Error::MidiWrite(e.to_string()))?;
    debug!(
        tracks = smf.tracks.len(),
        bytes = buffer.len(),
        "encoded midi file"
    );
    Ok(buffer)
}

fn build_meta_track(seq: &NoteSequence) -> Vec<midly::TrackEvent<'static>> {
    let mut events: Vec<(u64, TrackEventKind<'static>)> = Vec::new();

    for tempo in &seq.tempos {
        let usec = (60_000_000.0 / tempo.qpm).round() as u32;
        events.push((
            tempo.time.max(0) as u64,
            TrackEventKind::Meta(MetaMessage::Tempo(usec.into())),
        ));
    }
    // If no tempo was provided, emit default 120 BPM
    if seq.tempos.is_empty() {
        events.push((0, TrackEventKind::Meta(MetaMessage::Tempo(500_000u32.into()))));
    }
    for ts in &seq.time_signatures {
        let denom_pow = (ts.denominator as f64).log2() as u8;
        events.push((
            ts.time.max(0) as u64,
            TrackEventKind::Meta(MetaMessage::TimeSignature(ts.numerator, denom_pow, 24, 8)),
        ));
    }
    for ks in &seq.key_signatures {
        events.push((
            ks.time.max(0) as u64,
            TrackEventKind::Meta(MetaMessage::KeySignature(ks.sharps, ks.minor)),
        ));
    }

    events.sort_by_key(|&(tick, _)| tick);
    to_delta_track(events)
}

fn build_instrument_track(
    seq: &NoteSequence,
    instrument: u32,
    channel: u8,
) -> Vec<midly::TrackEvent<'static>> {
    // Rank 0 sorts note-offs ahead of other events at the same tick, so
    // an abutting retrigger is never swallowed.
    let mut events: Vec<(u64, u8, TrackEventKind<'static>)> = Vec::new();

    let program = seq
        .notes
        .iter()
        .find(|n| n.instrument == instrument)
        .map(|n| n.program)
        .or_else(|| {
            seq.pitch_bends
                .iter()
                .find(|p| p.instrument == instrument)
                .map(|p| p.program)
        })
        .or_else(|| {
            seq.control_changes
                .iter()
                .find(|c| c.instrument == instrument)
                .map(|c| c.program)
        })
        .unwrap_or(0);
    events.push((
        0,
        1,
        TrackEventKind::Midi {
            channel: channel.into(),
            message: MidiMessage::ProgramChange {
                program: program.into(),
            },
        },
    ));

    for note in seq.notes.iter().filter(|n| n.instrument == instrument) {
        events.push((
            note.start_time.max(0) as u64,
            1,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOn {
                    key: note.pitch.into(),
                    vel: note.velocity.into(),
                },
            },
        ));
        events.push((
            note.end_time.max(0) as u64,
            0,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOff {
                    key: note.pitch.into(),
                    vel: 0.into(),
                },
            },
        ));
    }
    for pb in seq.pitch_bends.iter().filter(|p| p.instrument == instrument) {
        events.push((
            pb.time.max(0) as u64,
            1,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::PitchBend {
                    bend: midly::PitchBend::from_int(pb.value),
                },
            },
        ));
    }
    for cc in seq
        .control_changes
        .iter()
        .filter(|c| c.instrument == instrument)
    {
        events.push((
            cc.time.max(0) as u64,
            1,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::Controller {
                    controller: cc.controller.into(),
                    value: cc.value.into(),
                },
            },
        ));
    }

    events.sort_by_key(|&(tick, rank, _)| (tick, rank));
    to_delta_track(events.into_iter().map(|(tick, _, kind)| (tick, kind)).collect())
}

fn to_delta_track(events: Vec<(u64, TrackEventKind<'static>)>) -> Vec<midly::TrackEvent<'static>> {
    let mut track = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0u64;
    for (tick, kind) in events {
        let delta = tick.saturating_sub(last_tick) as u32;
        track.push(midly::TrackEvent {
            delta: delta.into(),
            kind,
        });
        last_tick = tick;
    }
    track.push(midly::TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}
