//! Voice capability and the per-voice bookkeeping kept by the pool.
//!
//! A [`Voice`] only produces audio. Which note it plays, whether its key is
//! down and whether a pedal holds it are tracked by the [`VoiceSlot`] that
//! wraps it, and changed only by the [`Synthesiser`](crate::Synthesiser).

use core::any::Any;
use std::sync::Arc;

use crate::sound::SoundRef;

/// Whether a voice is still producing sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePlayback {
    /// Still sounding (e.g. in its release tail).
    Sounding,
    /// Silent; the slot can be reused.
    Finished,
}

/// State of a single voice slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    /// Voice is idle and available for allocation
    #[default]
    Idle,
    /// Voice is playing a note
    Active,
    /// Note was stopped, voice is finishing its tail
    Releasing,
}

/// One renderable voice.
///
/// Implementations generate audio for the note they were started with. They
/// are driven from the audio thread and must not allocate or block.
pub trait Voice: Send {
    /// Whether this voice can play `sound` (default: any sound).
    fn can_play_sound(&self, _sound: &SoundRef) -> bool {
        true
    }

    /// Begin a note. `velocity` is 0.0-1.0, `pitch_wheel` the channel's
    /// current 14-bit wheel position.
    fn start_note(&mut self, note: u8, velocity: f32, sound: &SoundRef, pitch_wheel: u16);

    /// Stop the current note.
    ///
    /// With `allow_tail_off == false` the voice must go silent at once and is
    /// freed whatever it returns. Otherwise it may return
    /// [`VoicePlayback::Sounding`] and finish later from `render_next_block`.
    fn stop_note(&mut self, velocity: f32, allow_tail_off: bool) -> VoicePlayback;

    fn pitch_wheel_moved(&mut self, value: u16);

    fn controller_moved(&mut self, controller: u8, value: u8);

    fn aftertouch_changed(&mut self, _value: u8) {}

    fn channel_pressure_changed(&mut self, _value: u8) {}

    fn set_current_playback_sample_rate(&mut self, _sample_rate: f64) {}

    /// Add this voice's output to `output[channel][start_sample..start_sample + num_samples]`.
    ///
    /// Must accumulate, never overwrite.
    fn render_next_block(
        &mut self,
        output: &mut [&mut [f32]],
        start_sample: usize,
        num_samples: usize,
    ) -> VoicePlayback;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A pooled voice plus the note state the pool tracks for it.
pub struct VoiceSlot {
    voice: Box<dyn Voice>,
    pub(crate) current_note: Option<u8>,
    pub(crate) current_channel: u8,
    pub(crate) current_sound: Option<SoundRef>,
    /// Start order, higher = more recent.
    pub(crate) note_on_time: u64,
    pub(crate) key_down: bool,
    pub(crate) sustain_pedal_down: bool,
    pub(crate) sostenuto_pedal_down: bool,
    pub(crate) releasing: bool,
}

impl VoiceSlot {
    pub(crate) fn new(voice: Box<dyn Voice>) -> Self {
        Self {
            voice,
            current_note: None,
            current_channel: 0,
            current_sound: None,
            note_on_time: 0,
            key_down: false,
            sustain_pedal_down: false,
            sostenuto_pedal_down: false,
            releasing: false,
        }
    }

    /// True while a note is assigned (including its release tail).
    #[inline]
    pub fn is_voice_active(&self) -> bool {
        self.current_note.is_some()
    }

    #[inline]
    pub fn state(&self) -> VoiceState {
        match (self.current_note, self.releasing) {
            (None, _) => VoiceState::Idle,
            (Some(_), false) => VoiceState::Active,
            (Some(_), true) => VoiceState::Releasing,
        }
    }

    #[inline]
    pub fn currently_playing_note(&self) -> Option<u8> {
        self.current_note
    }

    #[inline]
    pub fn currently_playing_sound(&self) -> Option<&SoundRef> {
        self.current_sound.as_ref()
    }

    /// 1-based channel of the current note, `None` when idle.
    #[inline]
    pub fn currently_playing_channel(&self) -> Option<u8> {
        self.current_note.map(|_| self.current_channel)
    }

    #[inline]
    pub fn is_key_down(&self) -> bool {
        self.key_down
    }

    #[inline]
    pub fn is_sustain_pedal_down(&self) -> bool {
        self.sustain_pedal_down
    }

    #[inline]
    pub fn is_sostenuto_pedal_down(&self) -> bool {
        self.sostenuto_pedal_down
    }

    #[inline]
    pub fn is_playing_channel(&self, channel: u8) -> bool {
        self.is_voice_active() && self.current_channel == channel
    }

    /// True if this voice's note started before `other`'s.
    #[inline]
    pub fn was_started_before(&self, other: &VoiceSlot) -> bool {
        self.note_on_time < other.note_on_time
    }

    #[inline]
    pub fn voice(&self) -> &dyn Voice {
        self.voice.as_ref()
    }

    #[inline]
    pub fn voice_mut(&mut self) -> &mut dyn Voice {
        self.voice.as_mut()
    }

    /// Downcast the wrapped voice to its concrete type.
    pub fn voice_as<T: Voice + 'static>(&self) -> Option<&T> {
        self.voice.as_any().downcast_ref::<T>()
    }

    pub fn voice_as_mut<T: Voice + 'static>(&mut self) -> Option<&mut T> {
        self.voice.as_any_mut().downcast_mut::<T>()
    }

    pub(crate) fn into_voice(self) -> Box<dyn Voice> {
        self.voice
    }

    #[inline]
    pub(crate) fn matches_channel(&self, channel: u8) -> bool {
        self.is_voice_active() && (channel == 0 || self.current_channel == channel)
    }

    #[inline]
    pub(crate) fn is_playing_sound(&self, sound: &SoundRef) -> bool {
        self.current_sound
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, sound))
    }

    /// Held by a pedal rather than by its key.
    #[inline]
    pub(crate) fn is_held_by_pedal(&self) -> bool {
        self.sustain_pedal_down || self.sostenuto_pedal_down
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn start(
        &mut self,
        note: u8,
        channel: u8,
        velocity: f32,
        sound: SoundRef,
        note_on_time: u64,
        sustain_pedal_down: bool,
        pitch_wheel: u16,
    ) {
        self.current_note = Some(note);
        self.current_channel = channel;
        self.note_on_time = note_on_time;
        self.key_down = true;
        self.sustain_pedal_down = sustain_pedal_down;
        self.sostenuto_pedal_down = false;
        self.releasing = false;
        self.voice.start_note(note, velocity, &sound, pitch_wheel);
        self.current_sound = Some(sound);
    }

    /// Stop the voice; frees the slot unless the voice keeps a tail.
    pub(crate) fn stop(&mut self, velocity: f32, allow_tail_off: bool) {
        let playback = self.voice.stop_note(velocity, allow_tail_off);
        if !allow_tail_off || playback == VoicePlayback::Finished {
            self.clear_current_note();
        } else {
            self.releasing = true;
        }
    }

    /// Render if active; frees the slot when the voice reports it is done.
    #[inline]
    pub(crate) fn render(&mut self, output: &mut [&mut [f32]], start_sample: usize, num_samples: usize) {
        if self.is_voice_active()
            && self.voice.render_next_block(output, start_sample, num_samples)
                == VoicePlayback::Finished
        {
            self.clear_current_note();
        }
    }

    pub(crate) fn set_sample_rate(&mut self, sample_rate: f64) {
        self.voice.set_current_playback_sample_rate(sample_rate);
    }

    pub(crate) fn clear_current_note(&mut self) {
        self.current_note = None;
        self.current_channel = 0;
        self.current_sound = None;
        self.key_down = false;
        self.sustain_pedal_down = false;
        self.sostenuto_pedal_down = false;
        self.releasing = false;
    }
}

impl core::fmt::Debug for VoiceSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VoiceSlot")
            .field("state", &self.state())
            .field("note", &self.current_note)
            .field("channel", &self.current_channel)
            .field("key_down", &self.key_down)
            .field("sustain_pedal_down", &self.sustain_pedal_down)
            .field("sostenuto_pedal_down", &self.sostenuto_pedal_down)
            .finish_non_exhaustive()
    }
}
