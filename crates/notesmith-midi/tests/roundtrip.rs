//! End-to-end tests: sequences through SMF bytes and back, and on
//! through the symbol codecs.

use notesmith::{
    apply_sustain, extract_melody, quantize, ControlChange, KeySignature, MelodyExtractOptions,
    NoteSequence, Performance, PerformanceEvent, PerformanceOptions, SeqNote, Tempo,
    TimeSignature, DEFAULT_SUSTAIN_CONTROLLER, MELODY_NO_EVENT,
};
use notesmith_midi::{read_sequence, write_sequence};
use pretty_assertions::assert_eq;

fn note(pitch: u8, start: i64, end: i64, instrument: u32, program: u8) -> SeqNote {
    SeqNote {
        pitch,
        velocity: 100,
        start_time: start,
        end_time: end,
        instrument,
        program,
    }
}

#[test]
fn test_write_read_round_trip() {
    let mut seq = NoteSequence::new(480);
    seq.tempos.push(Tempo {
        time: 0,
        qpm: 120.0,
    });
    seq.time_signatures.push(TimeSignature {
        time: 0,
        numerator: 3,
        denominator: 8,
    });
    seq.key_signatures.push(KeySignature {
        time: 0,
        sharps: -1,
        minor: false,
    });
    seq.notes.push(note(60, 0, 480, 0, 0));
    seq.notes.push(note(64, 480, 960, 0, 0));
    seq.notes.push(note(36, 0, 960, 1, 33));
    seq.control_changes.push(ControlChange {
        time: 240,
        controller: 64,
        value: 127,
        instrument: 0,
        program: 0,
    });
    seq.total_time = 960;

    let bytes = write_sequence(&seq).unwrap();
    let parsed = read_sequence(&bytes).unwrap();

    assert_eq!(parsed, seq);
}

#[test]
fn test_sustain_quantize_performance_pipeline() {
    let mut seq = NoteSequence::new(480);
    seq.tempos.push(Tempo {
        time: 0,
        qpm: 120.0,
    });
    seq.notes.push(note(60, 0, 480, 0, 0));
    seq.notes.push(note(64, 960, 1440, 0, 0));
    seq.control_changes.push(ControlChange {
        time: 240,
        controller: DEFAULT_SUSTAIN_CONTROLLER,
        value: 127,
        instrument: 0,
        program: 0,
    });
    seq.control_changes.push(ControlChange {
        time: 720,
        controller: DEFAULT_SUSTAIN_CONTROLLER,
        value: 0,
        instrument: 0,
        program: 0,
    });
    seq.total_time = 1440;

    let bytes = write_sequence(&seq).unwrap();
    let seq = read_sequence(&bytes).unwrap();

    // The pedal holds the first note from tick 480 out to the release
    // at 720.
    let seq = apply_sustain(seq, DEFAULT_SUSTAIN_CONTROLLER);
    assert_eq!(seq.notes[0].end_time, 720);

    let seq = quantize(seq, 100.0).unwrap();
    let perf = Performance::from_quantized(&seq, &PerformanceOptions::default()).unwrap();

    assert_eq!(
        perf.events(),
        &[
            PerformanceEvent::NoteOn(60),
            PerformanceEvent::TimeShift(75),
            PerformanceEvent::NoteOff(60),
            PerformanceEvent::TimeShift(25),
            PerformanceEvent::NoteOn(64),
            PerformanceEvent::TimeShift(50),
            PerformanceEvent::NoteOff(64),
        ]
    );
}

#[test]
fn test_performance_decode_survives_midi_round_trip() {
    let mut seq = NoteSequence::new(480);
    seq.tempos.push(Tempo {
        time: 0,
        qpm: 120.0,
    });
    seq.notes.push(note(60, 0, 480, 0, 0));
    seq.notes.push(note(67, 240, 960, 0, 0));
    seq.total_time = 960;

    let quantized = quantize(seq, 100.0).unwrap();
    let opts = PerformanceOptions {
        velocity_bins: 16,
        ..Default::default()
    };
    let perf = Performance::from_quantized(&quantized, &opts).unwrap();

    // Decode to ticks, push through SMF bytes, and re-encode.
    let decoded = perf.to_sequence(100, 0, None);
    let bytes = write_sequence(&decoded).unwrap();
    let reread = read_sequence(&bytes).unwrap();
    let requantized = quantize(reread, 100.0).unwrap();
    let perf2 = Performance::from_quantized(&requantized, &opts).unwrap();

    assert_eq!(perf.events(), perf2.events());
}

#[test]
fn test_melody_from_midi_bytes() {
    let mut seq = NoteSequence::new(220);
    seq.tempos.push(Tempo {
        time: 0,
        qpm: 120.0,
    });
    seq.time_signatures.push(TimeSignature {
        time: 0,
        numerator: 4,
        denominator: 4,
    });
    seq.notes.push(note(60, 0, 220, 0, 0));
    seq.notes.push(note(62, 220, 440, 0, 0));
    seq.notes.push(note(64, 440, 880, 0, 0));
    seq.total_time = 880;

    let bytes = write_sequence(&seq).unwrap();
    let seq = read_sequence(&bytes).unwrap();

    // 2 steps per second at 120 qpm is one step per eighth note.
    let seq = quantize(seq, 2.0).unwrap();
    let melody = extract_melody(&seq, &MelodyExtractOptions::default())
        .unwrap()
        .unwrap();

    assert_eq!(melody.start_step, 0);
    assert_eq!(melody.steps_per_bar, 4);
    assert_eq!(melody.events(), &[60, 62, 64, MELODY_NO_EVENT]);
}
