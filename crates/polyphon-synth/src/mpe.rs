//! MPE-aware synthesiser base.
//!
//! [`MpeSynthesiser`] feeds incoming MIDI through an [`MpeInstrument`] and
//! hands the resulting note changes to an [`MpeRenderer`], rendering in
//! sub-blocks split at event offsets like [`Synthesiser`](crate::Synthesiser).

use polyphon_midi::mpe::{InstrumentEvent, MpeInstrument, MpeZoneLayout, TrackingMode};
use polyphon_midi::MidiEvent;

use crate::config::SynthesiserConfig;
use crate::render::{render_split, SubBlockRenderer};
use crate::Result;

/// Sound generation driven by MPE note changes.
pub trait MpeRenderer: Send {
    /// Called for every note or layout change, in order, before the audio
    /// that follows it is rendered.
    fn handle_instrument_event(&mut self, event: &InstrumentEvent);

    /// Add `num_samples` frames starting at `start_sample` to `output`.
    fn render_next_sub_block(
        &mut self,
        output: &mut [&mut [f32]],
        start_sample: usize,
        num_samples: usize,
    );

    fn set_current_playback_sample_rate(&mut self, _sample_rate: f64) {}
}

/// An [`MpeInstrument`] driving a renderer with sample-accurate timing.
///
/// Only the subdivision settings and sample rate of the configuration are
/// used; voice stealing is up to the renderer.
pub struct MpeSynthesiser<R: MpeRenderer> {
    instrument: MpeInstrument,
    renderer: R,
    config: SynthesiserConfig,
}

impl<R: MpeRenderer> MpeSynthesiser<R> {
    /// Synthesiser with an instrument that has no zones yet.
    pub fn new(renderer: R) -> Self {
        Self {
            instrument: MpeInstrument::new(),
            renderer,
            config: SynthesiserConfig::default(),
        }
    }

    pub fn with_config(renderer: R, config: SynthesiserConfig) -> Result<Self> {
        config.validate()?;
        let mut synth = Self::new(renderer);
        synth.renderer.set_current_playback_sample_rate(config.sample_rate);
        synth.config = config;
        Ok(synth)
    }

    #[inline]
    pub fn config(&self) -> &SynthesiserConfig {
        &self.config
    }

    #[inline]
    pub fn instrument(&self) -> &MpeInstrument {
        &self.instrument
    }

    #[inline]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    #[inline]
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    // ------------------------------------------------------------------
    // Instrument settings
    // ------------------------------------------------------------------

    /// Releases every note, then switches to `layout`.
    pub fn set_zone_layout(&mut self, layout: &MpeZoneLayout) {
        self.instrument.set_zone_layout(layout);
        self.dispatch_instrument_events();
    }

    #[inline]
    pub fn zone_layout(&self) -> &MpeZoneLayout {
        self.instrument.zone_layout()
    }

    pub fn enable_legacy_mode(
        &mut self,
        pitchbend_range: u8,
        channels: std::ops::RangeInclusive<u8>,
    ) -> polyphon_midi::Result<()> {
        let result = self.instrument.enable_legacy_mode(pitchbend_range, channels);
        self.dispatch_instrument_events();
        result
    }

    #[inline]
    pub fn is_legacy_mode_enabled(&self) -> bool {
        self.instrument.is_legacy_mode_enabled()
    }

    pub fn set_legacy_mode_channel_range(
        &mut self,
        channels: std::ops::RangeInclusive<u8>,
    ) -> polyphon_midi::Result<()> {
        let result = self.instrument.set_legacy_mode_channel_range(channels);
        self.dispatch_instrument_events();
        result
    }

    pub fn set_legacy_mode_pitchbend_range(
        &mut self,
        pitchbend_range: u8,
    ) -> polyphon_midi::Result<()> {
        let result = self.instrument.set_legacy_mode_pitchbend_range(pitchbend_range);
        self.dispatch_instrument_events();
        result
    }

    pub fn set_pressure_tracking_mode(&mut self, mode: TrackingMode) {
        self.instrument.set_pressure_tracking_mode(mode);
    }

    pub fn set_pitchbend_tracking_mode(&mut self, mode: TrackingMode) {
        self.instrument.set_pitchbend_tracking_mode(mode);
    }

    pub fn set_timbre_tracking_mode(&mut self, mode: TrackingMode) {
        self.instrument.set_timbre_tracking_mode(mode);
    }

    // ------------------------------------------------------------------
    // Playback settings
    // ------------------------------------------------------------------

    /// Change the playback rate. Every note is released when the rate changes.
    ///
    /// Negative or non-finite rates are ignored.
    pub fn set_current_playback_sample_rate(&mut self, sample_rate: f64) {
        if !sample_rate.is_finite() || sample_rate < 0.0 {
            tracing::warn!("Ignoring invalid sample rate {}", sample_rate);
            return;
        }
        if self.config.sample_rate == sample_rate {
            return;
        }

        self.instrument.release_all_notes();
        self.dispatch_instrument_events();
        self.config.sample_rate = sample_rate;
        self.renderer.set_current_playback_sample_rate(sample_rate);
        tracing::debug!("MPE synthesiser: sample rate {} Hz", sample_rate);
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Smallest sub-block rendered between two MIDI events.
    ///
    /// With `strict == false` the first sub-block of each block may be shorter.
    pub fn set_minimum_rendering_subdivision_size(&mut self, num_samples: usize, strict: bool) {
        if num_samples == 0 {
            tracing::warn!("Minimum rendering subdivision of 0 samples, using 1");
        }
        self.config.minimum_subdivision = num_samples.max(1);
        self.config.strict_subdivision = strict;
    }

    // ------------------------------------------------------------------
    // MIDI and rendering
    // ------------------------------------------------------------------

    /// Apply one event now, outside of rendering.
    pub fn handle_midi_event(&mut self, event: &MidiEvent) {
        self.instrument.process_next_midi_event(event);
        self.dispatch_instrument_events();
    }

    /// Release every playing note.
    pub fn release_all_notes(&mut self) {
        self.instrument.release_all_notes();
        self.dispatch_instrument_events();
    }

    /// Render `num_samples` frames starting at `start_sample`, interleaving
    /// `midi_events` at their frame offsets. Follows the same splitting rules
    /// as [`Synthesiser::render_next_block`](crate::Synthesiser::render_next_block).
    pub fn render_next_block(
        &mut self,
        output: &mut [&mut [f32]],
        midi_events: &[MidiEvent],
        start_sample: usize,
        num_samples: usize,
    ) {
        let minimum = self.config.minimum_subdivision;
        let strict = self.config.strict_subdivision;
        render_split(self, output, midi_events, start_sample, num_samples, minimum, strict);
    }

    fn dispatch_instrument_events(&mut self) {
        for event in self.instrument.drain_events() {
            self.renderer.handle_instrument_event(&event);
        }
    }
}

impl<R: MpeRenderer> SubBlockRenderer for MpeSynthesiser<R> {
    #[inline]
    fn handle_event(&mut self, event: &MidiEvent) {
        self.handle_midi_event(event);
    }

    fn render_sub_block(&mut self, output: &mut [&mut [f32]], start_sample: usize, num_samples: usize) {
        if num_samples == 0 || output.is_empty() {
            return;
        }
        self.renderer.render_next_sub_block(output, start_sample, num_samples);
    }
}

impl<R: MpeRenderer + std::fmt::Debug> std::fmt::Debug for MpeSynthesiser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpeSynthesiser")
            .field("instrument", &self.instrument)
            .field("renderer", &self.renderer)
            .field("config", &self.config)
            .finish()
    }
}
