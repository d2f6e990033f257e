//! MPE integration tests (requires "mpe" feature)
//!
//! Zone layouts configured over MIDI, the channel assigner and remapper
//! placed in front of the voice pool, and the MPE synthesiser base driving a
//! per-note sine renderer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use polyphon::midi::mpe::ZoneLayoutListener;
use polyphon::midi::{note_to_hz, CC_SUSTAIN};
use polyphon::prelude::*;
use polyphon::{KeyState, MpeChannelRemapper, MpeMessages};
use proptest::prelude::*;

use crate::helpers::tolerances::{AUDIBLE_RMS, SILENCE_THRESHOLD};
use crate::helpers::*;

/// Routes note events through an assigner before they reach the pool.
struct MpeFrontEnd {
    assigner: MpeChannelAssigner,
    synth: Synthesiser,
}

impl MpeFrontEnd {
    fn new(zone: MpeZone, voices: usize) -> Self {
        Self {
            assigner: MpeChannelAssigner::new(zone).unwrap(),
            synth: test_synth(voices, 0),
        }
    }

    fn note_on(&mut self, note: u8) -> u8 {
        let channel = self.assigner.find_midi_channel_for_new_note(note);
        self.synth.handle_midi_event(&MidiEvent::note_on(0, channel, note, 100));
        channel
    }

    fn note_off(&mut self, note: u8) {
        if let Some(channel) = self.assigner.find_midi_channel_for_existing_note(note) {
            self.assigner.note_off(note, Some(channel));
            self.synth.handle_midi_event(&MidiEvent::note_off(0, channel, note, 0));
        }
    }

    fn channel_of_voice_playing(&self, note: u8) -> Option<u8> {
        self.synth
            .voices()
            .iter()
            .find(|v| v.currently_playing_note() == Some(note))
            .and_then(|v| v.currently_playing_channel())
    }
}

#[test]
fn test_zone_layout_from_midi_messages() {
    init_tracing();
    let mut layout = MpeZoneLayout::new();
    layout.process_next_midi_buffer(&MpeMessages::set_lower_zone(7, 24, 12));
    layout.process_next_midi_buffer(&MpeMessages::set_upper_zone(5, 48, 2));

    let lower = layout.lower_zone();
    assert_eq!(lower.num_member_channels, 7);
    assert_eq!(lower.per_note_pitchbend_range, 24);
    assert_eq!(lower.master_pitchbend_range, 12);
    assert_eq!(lower.member_channel_range(), 2..=8);

    let upper = layout.upper_zone();
    assert_eq!(upper.num_member_channels, 5);
    assert_eq!(upper.member_channel_range(), 11..=15);

    assert_eq!(layout.zone_for_channel(16), Some(upper));
    assert_eq!(layout.zone_for_channel(9), None);

    layout.process_next_midi_buffer(&MpeMessages::clear_all_zones());
    assert!(!layout.is_active());
}

#[test]
fn test_layout_listener_sees_changes() {
    let changes = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&changes);
    let listener: Arc<dyn ZoneLayoutListener> = Arc::new(move |_: &MpeZoneLayout| {
        seen.fetch_add(1, Ordering::Relaxed);
    });

    let mut layout = MpeZoneLayout::new();
    let id = layout.add_listener(listener);
    layout.process_next_midi_buffer(&MpeMessages::set_lower_zone(3, 48, 2));
    assert!(changes.load(Ordering::Relaxed) >= 1);

    assert!(layout.remove_listener(id));
    let before = changes.load(Ordering::Relaxed);
    layout.clear_all_zones();
    assert_eq!(changes.load(Ordering::Relaxed), before);
}

/// Three member channels, four notes: the fourth shares the channel of the
/// closest sounding note.
#[test]
fn test_assigner_feeds_voice_pool() {
    let mut layout = MpeZoneLayout::new();
    layout.process_next_midi_buffer(&MpeMessages::set_lower_zone(3, 48, 2));
    let mut front = MpeFrontEnd::new(layout.lower_zone(), 8);

    assert_eq!(front.note_on(60), 2);
    assert_eq!(front.note_on(64), 3);
    assert_eq!(front.note_on(67), 4);
    assert_eq!(front.note_on(72), 4);

    assert_eq!(front.channel_of_voice_playing(60), Some(2));
    assert_eq!(front.channel_of_voice_playing(72), Some(4));
    assert_eq!(front.synth.active_voice_count(), 4);

    // Releasing one of the shared-channel notes leaves the other sounding.
    front.note_off(67);
    assert_eq!(front.channel_of_voice_playing(67), None);
    assert_eq!(front.channel_of_voice_playing(72), Some(4));
    assert_eq!(front.assigner.notes_on_channel(4), &[72]);
}

#[test]
fn test_per_note_expression_stays_on_its_voice() {
    let mut front = MpeFrontEnd::new(MpeZone::lower(15), 4);
    let c = front.note_on(60);
    let e = front.note_on(64);
    assert_ne!(c, e);

    front
        .synth
        .handle_midi_event(&MidiEvent::control_change(0, e, 74, 90));

    let voice_of = |note: u8| {
        front
            .synth
            .voices()
            .iter()
            .find(|v| v.currently_playing_note() == Some(note))
            .and_then(|v| v.voice_as::<SineVoice>())
            .unwrap()
    };
    assert!(voice_of(60).controllers.is_empty());
    assert_eq!(voice_of(64).controllers, vec![(74, 90)]);
}

#[test]
fn test_released_channel_is_reused_for_same_note() {
    let mut front = MpeFrontEnd::new(MpeZone::upper(4), 8);
    let first = front.note_on(60);
    front.note_on(62);
    front.note_off(60);
    front.note_on(65);
    assert_eq!(front.note_on(60), first);
}

#[test]
fn test_remapper_merges_two_sources() {
    let zone = MpeZone::lower(4);
    let mut remapper = MpeChannelRemapper::new(zone).unwrap();
    let mut synth = test_synth(8, 0);

    let mut events = [
        (MidiEvent::note_on(0, 2, 60, 100), 1),
        (MidiEvent::note_on(0, 2, 64, 100), 2),
        (MidiEvent::control_change(0, 2, 74, 10), 2),
    ];
    for (event, source) in events.iter_mut() {
        remapper.remap_midi_channel_if_needed(event, *source);
        synth.handle_midi_event(event);
    }

    assert_eq!(events[0].0.channel_number(), 2);
    assert_eq!(events[1].0.channel_number(), 3);
    assert_eq!(events[2].0.channel_number(), 3);

    let voice = synth
        .voices()
        .iter()
        .find(|v| v.currently_playing_note() == Some(64))
        .unwrap();
    assert_eq!(voice.currently_playing_channel(), Some(3));
    assert_eq!(voice.voice_as::<SineVoice>().unwrap().controllers, vec![(74, 10)]);
}

#[test]
fn test_overlapping_zones_rejected() {
    let err = MpeZoneLayout::from_zones(MpeZone::lower(10), MpeZone::upper(8)).unwrap_err();
    let err: polyphon::Error = err.into();
    assert!(matches!(
        err,
        polyphon::Error::Midi(polyphon::midi::Error::OverlappingZones { lower: 10, upper: 8 })
    ));
}

/// One sine per tracked note, following its total pitch bend and pressure.
#[derive(Debug, Default)]
struct MpeSineRenderer {
    sample_rate: f64,
    /// (note, phase)
    notes: Vec<(MpeNote, f64)>,
}

impl MpeRenderer for MpeSineRenderer {
    fn handle_instrument_event(&mut self, event: &InstrumentEvent) {
        match event {
            InstrumentEvent::NoteAdded(note) => self.notes.push((*note, 0.0)),
            InstrumentEvent::NoteReleased(note) => self.notes.retain(|(n, _)| n.note_id != note.note_id),
            InstrumentEvent::ZoneLayoutChanged => {}
            other => {
                if let Some(changed) = other.note() {
                    for (note, _) in &mut self.notes {
                        if note.note_id == changed.note_id {
                            *note = *changed;
                        }
                    }
                }
            }
        }
    }

    fn render_next_sub_block(&mut self, output: &mut [&mut [f32]], start_sample: usize, num_samples: usize) {
        for (note, phase) in &mut self.notes {
            let step = note.frequency_hz(440.0) as f64 / self.sample_rate;
            let gain = 0.2 + 0.8 * note.pressure.as_unsigned_f32();
            for i in start_sample..start_sample + num_samples {
                let sample = (*phase * std::f64::consts::TAU).sin() as f32 * gain;
                for channel in output.iter_mut() {
                    channel[i] += sample;
                }
                *phase = (*phase + step).fract();
            }
        }
    }

    fn set_current_playback_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }
}

fn mpe_synth() -> MpeSynthesiser<MpeSineRenderer> {
    let mut synth = MpeSynthesiser::new(MpeSineRenderer::default());
    synth.set_current_playback_sample_rate(TEST_SAMPLE_RATE);
    for event in MpeMessages::set_lower_zone(15, 48, 2).iter() {
        synth.handle_midi_event(event);
    }
    synth
}

fn render_mono(synth: &mut MpeSynthesiser<MpeSineRenderer>, events: &[MidiEvent]) -> Vec<f32> {
    let mut left = vec![0.0f32; TEST_BUFFER_SIZE];
    let mut output = [left.as_mut_slice()];
    synth.render_next_block(&mut output, events, 0, TEST_BUFFER_SIZE);
    left
}

#[test]
fn test_mpe_synthesiser_plays_notes_sample_accurately() {
    init_tracing();
    let mut synth = mpe_synth();
    assert_eq!(synth.zone_layout().lower_zone().num_member_channels, 15);

    let left = render_mono(&mut synth, &[MidiEvent::note_on(100, 2, 69, 100)]);
    assert_silence(&left[..100], SILENCE_THRESHOLD);
    assert_has_audio(&left[100..], AUDIBLE_RMS);
    assert_eq!(synth.renderer().notes.len(), 1);

    let left = render_mono(&mut synth, &[MidiEvent::note_off(0, 2, 69, 0)]);
    assert_silence(&left, SILENCE_THRESHOLD);
    assert!(synth.renderer().notes.is_empty());
}

#[test]
fn test_mpe_synthesiser_tracks_per_note_bend() {
    let mut synth = mpe_synth();
    synth.handle_midi_event(&MidiEvent::note_on(0, 2, 60, 100));
    synth.handle_midi_event(&MidiEvent::note_on(0, 3, 64, 100));

    // +48 semitones per note on channel 3 only, at full range.
    synth.handle_midi_event(&MidiEvent::pitch_bend(0, 3, 16383));
    let notes = &synth.renderer().notes;
    let bent = notes.iter().find(|(n, _)| n.initial_note == 64).unwrap().0;
    let straight = notes.iter().find(|(n, _)| n.initial_note == 60).unwrap().0;
    assert_relative_eq!(bent.total_pitchbend_in_semitones, 48.0);
    assert_relative_eq!(straight.total_pitchbend_in_semitones, 0.0);
    assert_relative_eq!(bent.frequency_hz(440.0), note_to_hz(112.0), epsilon = 1e-2);

    // Master channel bend moves both by the master range.
    synth.handle_midi_event(&MidiEvent::pitch_bend(0, 1, 0));
    let straight = synth.instrument().note(2, 60).unwrap();
    assert_relative_eq!(straight.total_pitchbend_in_semitones, -2.0);
}

#[test]
fn test_mpe_synthesiser_master_sustain() {
    let mut synth = mpe_synth();
    let events = [
        MidiEvent::note_on(0, 2, 60, 100),
        MidiEvent::control_change(0, 1, CC_SUSTAIN, 127),
        MidiEvent::note_off(64, 2, 60, 0),
    ];
    let left = render_mono(&mut synth, &events);
    assert_has_audio(&left[64..], AUDIBLE_RMS);
    assert_eq!(synth.instrument().note(2, 60).unwrap().key_state, KeyState::Sustained);

    let left = render_mono(&mut synth, &[MidiEvent::control_change(0, 1, CC_SUSTAIN, 0)]);
    assert_silence(&left, SILENCE_THRESHOLD);
    assert_eq!(synth.instrument().num_playing_notes(), 0);
}

proptest! {
    /// Whatever the note stream, notes only ever land on member channels and
    /// the pool never holds more notes than it has voices.
    #[test]
    fn prop_assigned_notes_stay_in_zone(
        members in 1u8..=15,
        upper in any::<bool>(),
        script in prop::collection::vec((0u8..128, any::<bool>()), 1..64),
    ) {
        let zone = if upper { MpeZone::upper(members) } else { MpeZone::lower(members) };
        let mut front = MpeFrontEnd::new(zone, 6);

        for (note, press) in script {
            if press {
                let channel = front.note_on(note);
                prop_assert!(zone.is_using_channel_as_member_channel(channel));
            } else {
                front.note_off(note);
            }
            prop_assert!(front.synth.active_voice_count() <= 6);
        }

        for slot in front.synth.voices() {
            if let Some(channel) = slot.currently_playing_channel() {
                prop_assert!(zone.is_using_channel_as_member_channel(channel));
            }
        }
    }
}
