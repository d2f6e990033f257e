//! Voice pool integration tests
//!
//! Drives the synthesiser only through MIDI events and the public
//! inspection surface.

use polyphon::midi::{CC_SOSTENUTO, CC_SUSTAIN};
use polyphon::prelude::*;
use polyphon::VoiceSlot;

use crate::helpers::*;

fn feed(synth: &mut Synthesiser, events: &[MidiEvent]) {
    for event in events {
        synth.handle_midi_event(event);
    }
}

/// Two voices, three notes: the oldest note is stolen.
#[test]
fn test_two_voice_stealing_scenario() {
    let mut synth = test_synth(2, 0);
    feed(
        &mut synth,
        &[
            MidiEvent::note_on(0, 1, 60, 100),
            MidiEvent::note_on(0, 1, 64, 100),
            MidiEvent::note_on(0, 1, 67, 100),
        ],
    );

    assert_eq!(sounding_notes(&synth), vec![64, 67]);
    assert_eq!(synth.voice(0).and_then(VoiceSlot::currently_playing_note), Some(67));
    assert_eq!(synth.voice(1).and_then(VoiceSlot::currently_playing_note), Some(64));

    let stolen = synth.voice(0).unwrap().voice_as::<SineVoice>().unwrap();
    assert_eq!(stolen.notes_started, 2);
}

/// With stealing disabled the extra note is dropped.
#[test]
fn test_stealing_disabled_drops_note() {
    let mut synth = test_synth(2, 0);
    synth.set_note_stealing_enabled(false);
    feed(
        &mut synth,
        &[
            MidiEvent::note_on(0, 1, 60, 100),
            MidiEvent::note_on(0, 1, 64, 100),
            MidiEvent::note_on(0, 1, 67, 100),
        ],
    );
    assert_eq!(sounding_notes(&synth), vec![60, 64]);
}

/// M voices, M + 1 distinct note-ons: every voice busy, the first note gone.
#[test]
fn test_pool_stays_full_under_pressure() {
    let voices = 8;
    let mut synth = test_synth(voices, 0);
    for i in 0..=voices as u8 {
        synth.handle_midi_event(&MidiEvent::note_on(0, 1, 48 + i, 90));
    }
    assert_eq!(synth.active_voice_count(), voices);
    assert!(!sounding_notes(&synth).contains(&48));
}

#[test]
fn test_sustain_holds_through_note_off() {
    let mut synth = test_synth(4, 0);
    feed(
        &mut synth,
        &[
            MidiEvent::note_on(0, 1, 60, 100),
            MidiEvent::control_change(0, 1, CC_SUSTAIN, 127),
            MidiEvent::note_off(0, 1, 60, 0),
        ],
    );

    assert!(synth.is_sustain_pedal_down(1));
    let slot = synth.voice(0).unwrap();
    assert!(slot.is_voice_active());
    assert!(!slot.is_key_down());

    synth.handle_midi_event(&MidiEvent::control_change(0, 1, CC_SUSTAIN, 0));
    assert_eq!(synth.active_voice_count(), 0);
}

/// Sostenuto holds only the notes down at the moment it was pressed.
#[test]
fn test_sostenuto_latches_held_notes_only() {
    let mut synth = test_synth(4, 0);
    feed(
        &mut synth,
        &[
            MidiEvent::note_on(0, 1, 60, 100),
            MidiEvent::note_on(0, 1, 64, 100),
            MidiEvent::control_change(0, 1, CC_SOSTENUTO, 127),
            MidiEvent::note_on(0, 1, 67, 100),
            MidiEvent::note_off(0, 1, 60, 0),
            MidiEvent::note_off(0, 1, 64, 0),
            MidiEvent::note_off(0, 1, 67, 0),
        ],
    );
    assert_eq!(sounding_notes(&synth), vec![60, 64]);

    synth.handle_midi_event(&MidiEvent::control_change(0, 1, CC_SOSTENUTO, 0));
    assert!(sounding_notes(&synth).is_empty());
}

#[test]
fn test_pedals_are_per_channel() {
    let mut synth = test_synth(4, 0);
    feed(
        &mut synth,
        &[
            MidiEvent::note_on(0, 1, 60, 100),
            MidiEvent::note_on(0, 2, 62, 100),
            MidiEvent::control_change(0, 1, CC_SUSTAIN, 127),
            MidiEvent::note_off(0, 1, 60, 0),
            MidiEvent::note_off(0, 2, 62, 0),
        ],
    );
    assert_eq!(sounding_notes(&synth), vec![60]);
}

#[test]
fn test_all_notes_off_messages() {
    let mut synth = test_synth(4, 256);
    feed(
        &mut synth,
        &[
            MidiEvent::note_on(0, 1, 60, 100),
            MidiEvent::note_on(0, 2, 62, 100),
        ],
    );

    // All-notes-off lets the tail ring.
    synth.handle_midi_event(&MidiEvent::all_notes_off(0, 1));
    assert_eq!(synth.voice(0).unwrap().state(), VoiceState::Releasing);
    assert_eq!(synth.voice(1).unwrap().state(), VoiceState::Active);

    // All-sound-off cuts immediately.
    synth.handle_midi_event(&MidiEvent::all_sound_off(0, 2));
    assert_eq!(synth.voice(1).unwrap().state(), VoiceState::Idle);

    // Repeating changes nothing.
    synth.all_notes_off(0, false);
    synth.all_notes_off(0, false);
    assert_eq!(synth.active_voice_count(), 0);
}

#[test]
fn test_controllers_reach_only_their_channel() {
    let mut synth = test_synth(2, 0);
    feed(
        &mut synth,
        &[
            MidiEvent::note_on(0, 1, 60, 100),
            MidiEvent::note_on(0, 2, 62, 100),
            MidiEvent::control_change(0, 2, 74, 33),
        ],
    );

    let first = synth.voice(0).unwrap().voice_as::<SineVoice>().unwrap();
    let second = synth.voice(1).unwrap().voice_as::<SineVoice>().unwrap();
    assert!(first.controllers.is_empty());
    assert_eq!(second.controllers, vec![(74, 33)]);
}

#[test]
fn test_split_keyboard_sounds() {
    init_tracing();
    let mut synth = Synthesiser::new();
    synth.set_current_playback_sample_rate(TEST_SAMPLE_RATE);
    for _ in 0..4 {
        synth.add_voice(Box::new(SineVoice::new(0)));
    }
    let bass = KeyRangeSound::new(0..=59, 0).into_ref();
    let lead = KeyRangeSound::new(60..=127, 0).into_ref();
    synth.add_sound(bass.clone());
    synth.add_sound(lead.clone());

    feed(
        &mut synth,
        &[
            MidiEvent::note_on(0, 1, 40, 100),
            MidiEvent::note_on(0, 1, 72, 100),
        ],
    );

    let sound_of = |note: u8| {
        synth
            .voices()
            .iter()
            .find(|v| v.currently_playing_note() == Some(note))
            .and_then(|v| v.currently_playing_sound().cloned())
    };
    assert!(SoundRef::ptr_eq(&sound_of(40).unwrap(), &bass));
    assert!(SoundRef::ptr_eq(&sound_of(72).unwrap(), &lead));
}

#[test]
fn test_errors_convert_to_umbrella_error() {
    fn remove_missing(synth: &mut Synthesiser) -> polyphon::Result<()> {
        synth.remove_voice(10)?;
        Ok(())
    }

    let mut synth = test_synth(1, 0);
    let err = remove_missing(&mut synth).unwrap_err();
    assert!(matches!(
        err,
        polyphon::Error::Synth(polyphon::synth::Error::IndexOutOfRange { index: 10, len: 1, .. })
    ));
    assert!(err.to_string().contains("voice index 10"));
}

#[test]
fn test_with_config() {
    let config = SynthesiserConfig {
        note_stealing: false,
        sample_rate: TEST_SAMPLE_RATE,
        ..Default::default()
    };
    let mut synth = Synthesiser::with_config(config).unwrap();
    let index = synth.add_voice(Box::new(SineVoice::new(0)));
    assert!(!synth.is_note_stealing_enabled());
    assert_eq!(synth.sample_rate(), TEST_SAMPLE_RATE);
    assert_eq!(index, 0);
}
