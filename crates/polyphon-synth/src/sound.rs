//! Sounds: which notes and channels a voice may be triggered for.

use core::any::Any;
use core::ops::RangeInclusive;
use std::sync::Arc;

/// Describes one playable instrument sound.
///
/// A sound is shared between the synthesiser and every voice currently
/// playing it.
pub trait Sound: Send + Sync {
    fn applies_to_note(&self, note: u8) -> bool;

    /// `channel` is 1-based (1-16).
    fn applies_to_channel(&self, channel: u8) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a registered sound.
pub type SoundRef = Arc<dyn Sound>;

/// Sound bounded by a note range and, optionally, a single channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRangeSound {
    notes: RangeInclusive<u8>,
    /// 0 = every channel.
    channel: u8,
}

impl KeyRangeSound {
    pub fn new(notes: RangeInclusive<u8>, channel: u8) -> Self {
        Self { notes, channel }
    }

    /// Applies to every note on every channel.
    pub fn full_range() -> Self {
        Self::new(0..=127, 0)
    }

    pub fn into_ref(self) -> SoundRef {
        Arc::new(self)
    }
}

impl Default for KeyRangeSound {
    fn default() -> Self {
        Self::full_range()
    }
}

impl Sound for KeyRangeSound {
    fn applies_to_note(&self, note: u8) -> bool {
        self.notes.contains(&note)
    }

    fn applies_to_channel(&self, channel: u8) -> bool {
        self.channel == 0 || self.channel == channel
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
