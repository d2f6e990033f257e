//! Polyphonic voice pool.
//!
//! Maps note and controller events onto a fixed set of voices:
//! - Sound filtering by note and channel
//! - Oldest-voice stealing when every voice is busy
//! - Sustain and sostenuto pedal handling per channel
//!
//! Event handling never allocates; only pool mutation (`add_voice`,
//! `add_sound`, ...) does, and that takes `&mut self` so it cannot race with
//! rendering.

use polyphon_midi::event::{CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF};
use polyphon_midi::{
    velocity_to_gain, ChannelVoiceMsg, ControlChange, MidiEvent, CC_SOFT_PEDAL, CC_SOSTENUTO,
    CC_SUSTAIN, PITCH_WHEEL_CENTRE,
};

use crate::config::SynthesiserConfig;
use crate::sound::SoundRef;
use crate::voice::{Voice, VoiceSlot};
use crate::{Error, Result};

#[inline]
fn is_valid_channel(channel: u8) -> bool {
    (1..=16).contains(&channel)
}

/// Polyphonic voice pool.
///
/// Channels are 1-based; `0` means "every channel" where noted.
pub struct Synthesiser {
    pub(crate) config: SynthesiserConfig,
    pub(crate) voices: Vec<VoiceSlot>,
    sounds: Vec<SoundRef>,
    last_note_on_counter: u64,
    /// Indexed by channel - 1.
    last_pitch_wheel_values: [u16; 16],
    /// Indexed by channel; slot 0 is unused.
    sustain_pedals_down: [bool; 17],
    soft_pedals_down: [bool; 17],
    programs: [u8; 17],
}

impl Default for Synthesiser {
    fn default() -> Self {
        Self {
            config: SynthesiserConfig::default(),
            voices: Vec::new(),
            sounds: Vec::new(),
            last_note_on_counter: 0,
            last_pitch_wheel_values: [PITCH_WHEEL_CENTRE; 16],
            sustain_pedals_down: [false; 17],
            soft_pedals_down: [false; 17],
            programs: [0; 17],
        }
    }
}

impl core::fmt::Debug for Synthesiser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Synthesiser")
            .field("config", &self.config)
            .field("voices", &self.voices)
            .field("sounds", &self.sounds.len())
            .finish_non_exhaustive()
    }
}

impl Synthesiser {
    /// Empty pool with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SynthesiserConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    #[inline]
    pub fn config(&self) -> &SynthesiserConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Pool management (not real-time safe)
    // ------------------------------------------------------------------

    /// Add a voice and return its index. The voice receives the current sample rate.
    pub fn add_voice(&mut self, voice: Box<dyn Voice>) -> usize {
        let mut slot = VoiceSlot::new(voice);
        slot.set_sample_rate(self.config.sample_rate);
        self.voices.push(slot);
        tracing::debug!("Synthesiser: added voice, {} total", self.voices.len());
        self.voices.len() - 1
    }

    /// Remove a voice, returning it. Later voices shift down by one.
    pub fn remove_voice(&mut self, index: usize) -> Result<Box<dyn Voice>> {
        if index >= self.voices.len() {
            return Err(Error::IndexOutOfRange {
                kind: "voice",
                index,
                len: self.voices.len(),
            });
        }
        let slot = self.voices.remove(index);
        tracing::debug!("Synthesiser: removed voice {}, {} left", index, self.voices.len());
        Ok(slot.into_voice())
    }

    pub fn clear_voices(&mut self) {
        self.voices.clear();
        tracing::debug!("Synthesiser: cleared voices");
    }

    #[inline]
    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    #[inline]
    pub fn voice(&self, index: usize) -> Option<&VoiceSlot> {
        self.voices.get(index)
    }

    #[inline]
    pub fn voice_mut(&mut self, index: usize) -> Option<&mut VoiceSlot> {
        self.voices.get_mut(index)
    }

    #[inline]
    pub fn voices(&self) -> &[VoiceSlot] {
        &self.voices
    }

    /// Number of voices currently playing or releasing a note.
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_voice_active()).count()
    }

    /// Register a sound and return its index.
    pub fn add_sound(&mut self, sound: SoundRef) -> usize {
        self.sounds.push(sound);
        tracing::debug!("Synthesiser: added sound, {} total", self.sounds.len());
        self.sounds.len() - 1
    }

    /// Unregister a sound. Voices already playing it keep their handle.
    pub fn remove_sound(&mut self, index: usize) -> Result<SoundRef> {
        if index >= self.sounds.len() {
            return Err(Error::IndexOutOfRange {
                kind: "sound",
                index,
                len: self.sounds.len(),
            });
        }
        tracing::debug!("Synthesiser: removed sound {}", index);
        Ok(self.sounds.remove(index))
    }

    pub fn clear_sounds(&mut self) {
        self.sounds.clear();
        tracing::debug!("Synthesiser: cleared sounds");
    }

    #[inline]
    pub fn num_sounds(&self) -> usize {
        self.sounds.len()
    }

    #[inline]
    pub fn sound(&self, index: usize) -> Option<&SoundRef> {
        self.sounds.get(index)
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn set_note_stealing_enabled(&mut self, enabled: bool) {
        self.config.note_stealing = enabled;
    }

    #[inline]
    pub fn is_note_stealing_enabled(&self) -> bool {
        self.config.note_stealing
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

    /// Change the playback rate. Every note is cut when the rate changes.
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

        self.all_notes_off(0, false);
        self.config.sample_rate = sample_rate;
        for slot in &mut self.voices {
            slot.set_sample_rate(sample_rate);
        }
        tracing::debug!("Synthesiser: sample rate {} Hz", sample_rate);
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    // ------------------------------------------------------------------
    // Channel state
    // ------------------------------------------------------------------

    #[inline]
    pub fn is_sustain_pedal_down(&self, channel: u8) -> bool {
        is_valid_channel(channel) && self.sustain_pedals_down[channel as usize]
    }

    #[inline]
    pub fn is_soft_pedal_down(&self, channel: u8) -> bool {
        is_valid_channel(channel) && self.soft_pedals_down[channel as usize]
    }

    /// Last program selected on `channel`.
    #[inline]
    pub fn program(&self, channel: u8) -> Option<u8> {
        is_valid_channel(channel).then(|| self.programs[channel as usize])
    }

    /// Last pitch-wheel position received on `channel`.
    #[inline]
    pub fn last_pitch_wheel(&self, channel: u8) -> Option<u16> {
        is_valid_channel(channel).then(|| self.last_pitch_wheel_values[channel as usize - 1])
    }

    // ------------------------------------------------------------------
    // Note handling
    // ------------------------------------------------------------------

    /// Start `note` on a voice for every sound that applies to it.
    ///
    /// A voice already playing the same note, channel and sound is released
    /// first. When no idle voice can play the sound, the oldest voice is
    /// stolen if stealing is enabled; otherwise the note is dropped.
    pub fn note_on(&mut self, channel: u8, note: u8, velocity: f32) {
        if !is_valid_channel(channel) {
            return;
        }

        for sound_index in 0..self.sounds.len() {
            let sound = SoundRef::clone(&self.sounds[sound_index]);
            if !(sound.applies_to_note(note) && sound.applies_to_channel(channel)) {
                continue;
            }

            // Retrigger: the note may still be ringing under a pedal.
            for slot in &mut self.voices {
                if slot.current_note == Some(note)
                    && slot.is_playing_channel(channel)
                    && slot.is_playing_sound(&sound)
                    && !slot.releasing
                {
                    slot.stop(1.0, true);
                }
            }

            if let Some(index) = self.find_free_voice(&sound, self.config.note_stealing) {
                self.start_voice(index, sound, channel, note, velocity);
            }
        }
    }

    /// Release `note` on `channel` (0 = every channel).
    ///
    /// Voices held by the sustain or sostenuto pedal only lose their key-down
    /// flag and keep sounding until the pedal is released.
    pub fn note_off(&mut self, channel: u8, note: u8, velocity: f32, allow_tail_off: bool) {
        for slot in &mut self.voices {
            if slot.current_note != Some(note) || !slot.matches_channel(channel) || !slot.key_down
            {
                continue;
            }

            let applies = slot.current_sound.as_ref().is_some_and(|sound| {
                sound.applies_to_note(note) && sound.applies_to_channel(slot.current_channel)
            });
            if !applies {
                continue;
            }

            slot.key_down = false;
            if !slot.is_held_by_pedal() {
                slot.stop(velocity, allow_tail_off);
            }
        }
    }

    /// Stop every note on `channel` (0 = every channel) and lift its sustain pedal.
    ///
    /// Calling it again has no further effect.
    pub fn all_notes_off(&mut self, channel: u8, allow_tail_off: bool) {
        for slot in &mut self.voices {
            if slot.matches_channel(channel) && !(allow_tail_off && slot.releasing) {
                slot.stop(1.0, allow_tail_off);
            }
        }

        if channel == 0 {
            self.sustain_pedals_down = [false; 17];
        } else if is_valid_channel(channel) {
            self.sustain_pedals_down[channel as usize] = false;
        }
    }

    // ------------------------------------------------------------------
    // Controllers
    // ------------------------------------------------------------------

    pub fn handle_pitch_wheel(&mut self, channel: u8, value: u16) {
        if !is_valid_channel(channel) {
            return;
        }

        self.last_pitch_wheel_values[channel as usize - 1] = value;
        for slot in &mut self.voices {
            if slot.is_playing_channel(channel) {
                slot.voice_mut().pitch_wheel_moved(value);
            }
        }
    }

    /// Pedal controllers (64, 66, 67) update the pool first; every controller
    /// is then forwarded to the channel's voices.
    pub fn handle_controller(&mut self, channel: u8, controller: u8, value: u8) {
        if !is_valid_channel(channel) {
            return;
        }

        match controller {
            CC_SUSTAIN => self.handle_sustain_pedal(channel, value >= 64),
            CC_SOSTENUTO => self.handle_sostenuto_pedal(channel, value >= 64),
            CC_SOFT_PEDAL => self.handle_soft_pedal(channel, value >= 64),
            _ => {}
        }

        for slot in &mut self.voices {
            if slot.is_playing_channel(channel) {
                slot.voice_mut().controller_moved(controller, value);
            }
        }
    }

    /// Polyphonic aftertouch for one note.
    pub fn handle_aftertouch(&mut self, channel: u8, note: u8, value: u8) {
        for slot in &mut self.voices {
            if slot.current_note == Some(note) && slot.is_playing_channel(channel) {
                slot.voice_mut().aftertouch_changed(value);
            }
        }
    }

    pub fn handle_channel_pressure(&mut self, channel: u8, value: u8) {
        for slot in &mut self.voices {
            if slot.is_playing_channel(channel) {
                slot.voice_mut().channel_pressure_changed(value);
            }
        }
    }

    /// Press latches the channel's key-down voices; release stops the voices
    /// whose keys went up meanwhile. Never retriggers a note.
    pub fn handle_sustain_pedal(&mut self, channel: u8, is_down: bool) {
        if !is_valid_channel(channel) {
            return;
        }

        if is_down {
            self.sustain_pedals_down[channel as usize] = true;
            for slot in &mut self.voices {
                if slot.is_playing_channel(channel) && slot.key_down {
                    slot.sustain_pedal_down = true;
                }
            }
        } else {
            for slot in &mut self.voices {
                if !slot.is_playing_channel(channel) {
                    continue;
                }
                let was_sustained = slot.sustain_pedal_down;
                slot.sustain_pedal_down = false;
                if was_sustained && !slot.key_down && !slot.sostenuto_pedal_down && !slot.releasing {
                    slot.stop(1.0, true);
                }
            }
            self.sustain_pedals_down[channel as usize] = false;
        }
    }

    /// Press freezes exactly the notes held at that moment; notes played
    /// afterwards are unaffected. Release stops the frozen notes whose keys
    /// are already up, unless the sustain pedal still holds them.
    pub fn handle_sostenuto_pedal(&mut self, channel: u8, is_down: bool) {
        if !is_valid_channel(channel) {
            return;
        }

        for slot in &mut self.voices {
            if !slot.is_playing_channel(channel) {
                continue;
            }

            if is_down {
                if slot.key_down {
                    slot.sostenuto_pedal_down = true;
                }
            } else if slot.sostenuto_pedal_down {
                slot.sostenuto_pedal_down = false;
                if !slot.key_down && !slot.sustain_pedal_down && !slot.releasing {
                    slot.stop(1.0, true);
                }
            }
        }
    }

    /// Tracked per channel; voices read it through `controller_moved`.
    pub fn handle_soft_pedal(&mut self, channel: u8, is_down: bool) {
        if is_valid_channel(channel) {
            self.soft_pedals_down[channel as usize] = is_down;
        }
    }

    pub fn handle_program_change(&mut self, channel: u8, program: u8) {
        if is_valid_channel(channel) {
            self.programs[channel as usize] = program & 0x7F;
        }
    }

    /// Dispatch one MIDI event.
    ///
    /// A note-on with velocity 0 is a note-off. All-notes-off releases with
    /// tail-off, all-sound-off cuts immediately.
    pub fn handle_midi_event(&mut self, event: &MidiEvent) {
        let channel = event.channel_number();

        match event.msg {
            ChannelVoiceMsg::NoteOn { note, velocity } if velocity > 0 => {
                self.note_on(channel, note, velocity_to_gain(velocity));
            }
            ChannelVoiceMsg::NoteOn { note, .. } => self.note_off(channel, note, 0.0, true),
            ChannelVoiceMsg::NoteOff { note, velocity } => {
                self.note_off(channel, note, velocity_to_gain(velocity), true);
            }
            ChannelVoiceMsg::ControlChange {
                control: ControlChange::CC { control, value },
            } => match control {
                CC_ALL_NOTES_OFF => self.all_notes_off(channel, true),
                CC_ALL_SOUND_OFF => self.all_notes_off(channel, false),
                _ => self.handle_controller(channel, control, value),
            },
            ChannelVoiceMsg::PitchBend { bend } => self.handle_pitch_wheel(channel, bend),
            ChannelVoiceMsg::PolyPressure { note, pressure } => {
                self.handle_aftertouch(channel, note, pressure);
            }
            ChannelVoiceMsg::ChannelPressure { pressure } => {
                self.handle_channel_pressure(channel, pressure);
            }
            ChannelVoiceMsg::ProgramChange { program } => {
                self.handle_program_change(channel, program);
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    fn find_free_voice(&self, sound: &SoundRef, steal_if_none_available: bool) -> Option<usize> {
        if let Some(index) = self
            .voices
            .iter()
            .position(|slot| !slot.is_voice_active() && slot.voice().can_play_sound(sound))
        {
            return Some(index);
        }

        if steal_if_none_available {
            self.find_voice_to_steal(sound)
        } else {
            None
        }
    }

    /// Oldest voice in release first, then the oldest voice not held by a
    /// pedal, then the oldest of all.
    fn find_voice_to_steal(&self, sound: &SoundRef) -> Option<usize> {
        self.steal_candidates(sound)
            .filter(|(_, slot)| slot.releasing)
            .min_by_key(|(_, slot)| slot.note_on_time)
            .or_else(|| {
                self.steal_candidates(sound)
                    .filter(|(_, slot)| !slot.is_held_by_pedal())
                    .min_by_key(|(_, slot)| slot.note_on_time)
            })
            .or_else(|| {
                self.steal_candidates(sound)
                    .min_by_key(|(_, slot)| slot.note_on_time)
            })
            .map(|(index, _)| index)
    }

    fn steal_candidates<'a>(
        &'a self,
        sound: &'a SoundRef,
    ) -> impl Iterator<Item = (usize, &'a VoiceSlot)> + 'a {
        self.voices
            .iter()
            .enumerate()
            .filter(move |(_, slot)| slot.is_voice_active() && slot.voice().can_play_sound(sound))
    }

    fn start_voice(&mut self, index: usize, sound: SoundRef, channel: u8, note: u8, velocity: f32) {
        let sustain = self.sustain_pedals_down[channel as usize];
        let pitch_wheel = self.last_pitch_wheel_values[channel as usize - 1];
        self.last_note_on_counter += 1;
        let note_on_time = self.last_note_on_counter;

        let slot = &mut self.voices[index];
        if slot.is_voice_active() {
            // Stolen: cut the old note before the new one starts.
            slot.stop(0.0, false);
        }
        slot.start(note, channel, velocity, sound, note_on_time, sustain, pitch_wheel);
    }
}
