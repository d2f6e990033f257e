//! Test helpers and fixtures for polyphon integration tests
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (accumulation, unity gain)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use std::any::Any;
use std::sync::Once;

use polyphon::midi::{note_to_hz, pitch_wheel_to_bipolar};
use polyphon::prelude::*;

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Standard buffer size for deterministic testing
pub const TEST_BUFFER_SIZE: usize = 512;

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness. Set `RUST_LOG=debug` to see it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Sine voice with a linear release, bent by ±2 semitones of pitch wheel.
#[derive(Debug, Default)]
pub struct SineVoice {
    sample_rate: f64,
    phase: f64,
    frequency: f64,
    bend: f64,
    gain: f32,
    release_samples: usize,
    release_remaining: Option<usize>,
    pub notes_started: usize,
    pub controllers: Vec<(u8, u8)>,
}

impl SineVoice {
    pub fn new(release_samples: usize) -> Self {
        Self {
            release_samples,
            ..Self::default()
        }
    }

    fn update_frequency(&mut self, note: u8) {
        self.frequency = note_to_hz(note as f32) as f64;
    }
}

impl Voice for SineVoice {
    fn start_note(&mut self, note: u8, velocity: f32, _sound: &SoundRef, pitch_wheel: u16) {
        self.update_frequency(note);
        self.bend = pitch_wheel_to_bipolar(pitch_wheel) as f64 * 2.0;
        self.gain = velocity * 0.25;
        self.phase = 0.0;
        self.release_remaining = None;
        self.notes_started += 1;
    }

    fn stop_note(&mut self, _velocity: f32, allow_tail_off: bool) -> VoicePlayback {
        if allow_tail_off && self.release_samples > 0 {
            self.release_remaining = Some(self.release_samples);
            VoicePlayback::Sounding
        } else {
            self.release_remaining = None;
            self.gain = 0.0;
            VoicePlayback::Finished
        }
    }

    fn pitch_wheel_moved(&mut self, value: u16) {
        self.bend = pitch_wheel_to_bipolar(value) as f64 * 2.0;
    }

    fn controller_moved(&mut self, controller: u8, value: u8) {
        self.controllers.push((controller, value));
    }

    fn set_current_playback_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn render_next_block(
        &mut self,
        output: &mut [&mut [f32]],
        start_sample: usize,
        num_samples: usize,
    ) -> VoicePlayback {
        if self.sample_rate <= 0.0 {
            return VoicePlayback::Sounding;
        }

        let increment = self.frequency * 2f64.powf(self.bend / 12.0) / self.sample_rate;
        for i in start_sample..start_sample + num_samples {
            let envelope = match self.release_remaining {
                Some(0) => break,
                Some(remaining) => {
                    self.release_remaining = Some(remaining - 1);
                    remaining as f32 / self.release_samples as f32
                }
                None => 1.0,
            };

            let value = (self.phase * std::f64::consts::TAU).sin() as f32 * self.gain * envelope;
            for channel in output.iter_mut() {
                channel[i] += value;
            }
            self.phase = (self.phase + increment).fract();
        }

        if self.release_remaining == Some(0) {
            self.release_remaining = None;
            VoicePlayback::Finished
        } else {
            VoicePlayback::Sounding
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Synthesiser at [`TEST_SAMPLE_RATE`] with `voices` sine voices and one
/// full-range sound.
pub fn test_synth(voices: usize, release_samples: usize) -> Synthesiser {
    init_tracing();
    let mut synth = Synthesiser::new();
    synth.set_current_playback_sample_rate(TEST_SAMPLE_RATE);
    for _ in 0..voices {
        synth.add_voice(Box::new(SineVoice::new(release_samples)));
    }
    synth.add_sound(KeyRangeSound::full_range().into_ref());
    synth
}

/// Render one stereo block of `len` samples.
pub fn render_stereo(synth: &mut Synthesiser, events: &[MidiEvent], len: usize) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![0.0f32; len];
    let mut right = vec![0.0f32; len];
    {
        let mut output = [left.as_mut_slice(), right.as_mut_slice()];
        synth.render_next_block(&mut output, events, 0, len);
    }
    (left, right)
}

/// Notes currently held by the pool, sorted.
pub fn sounding_notes(synth: &Synthesiser) -> Vec<u8> {
    let mut notes: Vec<u8> = synth
        .voices()
        .iter()
        .filter_map(|v| v.currently_playing_note())
        .collect();
    notes.sort_unstable();
    notes
}

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// Assert that a signal has content (not silent).
pub fn assert_has_audio(samples: &[f32], min_rms: f32) {
    let r = rms(samples);
    assert!(
        r >= min_rms,
        "Expected audio content with RMS >= {}, but RMS was {}",
        min_rms,
        r
    );
}
