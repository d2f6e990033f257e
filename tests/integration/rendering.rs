//! Rendering integration tests
//!
//! Verifies sample-accurate event placement with real sine voices.

use approx::assert_abs_diff_eq;
use polyphon::prelude::*;

use crate::helpers::tolerances::{AUDIBLE_RMS, FLOAT_EPSILON, SILENCE_THRESHOLD};
use crate::helpers::*;

#[test]
fn test_silent_without_notes() {
    let mut synth = test_synth(4, 0);
    let (left, right) = render_stereo(&mut synth, &[], TEST_BUFFER_SIZE);
    assert_silence(&left, SILENCE_THRESHOLD);
    assert_silence(&right, SILENCE_THRESHOLD);
}

#[test]
fn test_note_on_mid_block_is_sample_accurate() {
    let mut synth = test_synth(4, 0);
    let events = [MidiEvent::note_on(200, 1, 69, 127)];
    let (left, right) = render_stereo(&mut synth, &events, TEST_BUFFER_SIZE);

    assert_silence(&left[..200], SILENCE_THRESHOLD);
    assert_has_audio(&left[200..], AUDIBLE_RMS);
    // Same signal on every output channel.
    assert!(left.iter().zip(&right).all(|(l, r)| (l - r).abs() <= FLOAT_EPSILON));
}

#[test]
fn test_note_off_mid_block_without_tail() {
    let mut synth = test_synth(4, 0);
    synth.note_on(1, 69, 1.0);
    let events = [MidiEvent::note_off(300, 1, 69, 0)];
    let (left, _) = render_stereo(&mut synth, &events, TEST_BUFFER_SIZE);

    assert_has_audio(&left[..300], AUDIBLE_RMS);
    assert_silence(&left[300..], SILENCE_THRESHOLD);
    assert_eq!(synth.active_voice_count(), 0);
}

#[test]
fn test_release_tail_spans_blocks() {
    let mut synth = test_synth(4, 384);
    synth.note_on(1, 60, 1.0);
    synth.note_off(1, 60, 0.0, true);
    assert_eq!(synth.voice(0).unwrap().state(), VoiceState::Releasing);

    let (first, _) = render_stereo(&mut synth, &[], 256);
    assert_has_audio(&first, AUDIBLE_RMS);
    assert_eq!(synth.active_voice_count(), 1);

    let (second, _) = render_stereo(&mut synth, &[], 256);
    assert_silence(&second[128..], SILENCE_THRESHOLD);
    assert_eq!(synth.active_voice_count(), 0);
}

#[test]
fn test_output_is_accumulated() {
    let mut reference = test_synth(1, 0);
    reference.note_on(1, 64, 1.0);
    let (expected, _) = render_stereo(&mut reference, &[], 128);

    let mut synth = test_synth(1, 0);
    synth.note_on(1, 64, 1.0);
    let mut left = vec![0.5f32; 128];
    {
        let mut output = [left.as_mut_slice()];
        synth.render_next_block(&mut output, &[], 0, 128);
    }

    for (got, want) in left.iter().zip(&expected) {
        assert_abs_diff_eq!(*got, want + 0.5, epsilon = FLOAT_EPSILON);
    }
}

#[test]
fn test_two_voices_sum() {
    let mut single = test_synth(2, 0);
    single.note_on(1, 60, 1.0);
    let (one, _) = render_stereo(&mut single, &[], TEST_BUFFER_SIZE);

    let mut double = test_synth(2, 0);
    double.note_on(1, 60, 1.0);
    double.note_on(2, 60, 1.0);
    let (two, _) = render_stereo(&mut double, &[], TEST_BUFFER_SIZE);

    assert!(rms(&two) > rms(&one) * 1.9);
}

/// Splitting one block in two renders the same audio as one call.
#[test]
fn test_split_rendering_matches_whole_block() {
    let events = [
        MidiEvent::note_on(0, 1, 60, 100),
        MidiEvent::note_on(100, 1, 67, 100),
        MidiEvent::note_off(300, 1, 60, 0),
    ];

    let mut whole = test_synth(4, 0);
    let (expected, _) = render_stereo(&mut whole, &events, TEST_BUFFER_SIZE);

    let mut split = test_synth(4, 0);
    let mut left = vec![0.0f32; TEST_BUFFER_SIZE];
    {
        let mut output = [left.as_mut_slice()];
        split.render_next_block(&mut output, &events[..2], 0, 256);
        let rest: Vec<MidiEvent> = events[2..].to_vec();
        split.render_next_block(&mut output, &rest, 256, 256);
    }

    for (got, want) in left.iter().zip(&expected) {
        assert_abs_diff_eq!(*got, *want, epsilon = FLOAT_EPSILON);
    }
}

#[test]
fn test_events_past_block_take_effect_next_block() {
    let mut synth = test_synth(2, 0);
    let events = [MidiEvent::note_on(TEST_BUFFER_SIZE + 10, 1, 60, 100)];
    let (left, _) = render_stereo(&mut synth, &events, TEST_BUFFER_SIZE);
    assert_silence(&left, SILENCE_THRESHOLD);
    assert_eq!(synth.active_voice_count(), 1);

    let (next, _) = render_stereo(&mut synth, &[], TEST_BUFFER_SIZE);
    assert_has_audio(&next, AUDIBLE_RMS);
}

#[test]
fn test_sample_rate_change_silences_pool() {
    let mut synth = test_synth(2, 1000);
    synth.note_on(1, 60, 1.0);
    synth.set_current_playback_sample_rate(96000.0);
    let (left, _) = render_stereo(&mut synth, &[], TEST_BUFFER_SIZE);
    assert_silence(&left, SILENCE_THRESHOLD);
}
