//! A note tracked by an [`MpeInstrument`](super::MpeInstrument).

use serde::{Deserialize, Serialize};

use super::value::MpeValue;
use crate::utils::note_to_hz_with_reference;

/// Physical state of a tracked note's key and the pedals holding it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyState {
    /// Released; the note is about to be dropped.
    #[default]
    Off,
    KeyDown,
    /// Key up, held by a sustain or sostenuto pedal.
    Sustained,
    KeyDownAndSustained,
}

impl KeyState {
    #[inline]
    pub fn is_key_down(self) -> bool {
        matches!(self, KeyState::KeyDown | KeyState::KeyDownAndSustained)
    }
}

/// One playing note with its per-note expression.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MpeNote {
    /// Unique among the notes an instrument is tracking; never 0.
    pub note_id: u16,
    /// 1-based channel the note arrived on.
    pub midi_channel: u8,
    pub initial_note: u8,
    pub note_on_velocity: MpeValue,
    pub pitchbend: MpeValue,
    pub pressure: MpeValue,
    pub initial_timbre: MpeValue,
    pub timbre: MpeValue,
    /// Set when the key is released.
    pub note_off_velocity: MpeValue,
    /// Per-note plus master pitch bend.
    pub total_pitchbend_in_semitones: f32,
    pub key_state: KeyState,
}

impl MpeNote {
    /// Sounding frequency including pitch bend, with A4 at `a4_hz`.
    pub fn frequency_hz(&self, a4_hz: f32) -> f32 {
        note_to_hz_with_reference(
            self.initial_note as f32 + self.total_pitchbend_in_semitones,
            a4_hz,
        )
    }
}
