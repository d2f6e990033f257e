//! MPE zone configuration types.

use serde::{Deserialize, Serialize};

/// Highest number of member channels a single zone can own.
pub const MAX_MEMBER_CHANNELS: u8 = 15;
/// Highest pitch-bend range in semitones.
pub const MAX_PITCHBEND_RANGE: u8 = 96;
/// Per-note pitch-bend range a zone starts with.
pub const DEFAULT_PER_NOTE_PITCHBEND_RANGE: u8 = 48;
/// Master-channel pitch-bend range a zone starts with.
pub const DEFAULT_MASTER_PITCHBEND_RANGE: u8 = 2;

/// Which end of the channel space a zone grows from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneType {
    /// Master channel 1, members ascending from channel 2.
    Lower,
    /// Master channel 16, members descending from channel 15.
    Upper,
}

/// One MPE zone: a master channel plus a contiguous block of member channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MpeZone {
    pub zone_type: ZoneType,
    pub num_member_channels: u8,
    pub per_note_pitchbend_range: u8,
    pub master_pitchbend_range: u8,
}

impl MpeZone {
    /// Zone with explicit values; member count and ranges are clamped to their legal bounds.
    pub fn new(
        zone_type: ZoneType,
        num_member_channels: u8,
        per_note_pitchbend_range: u8,
        master_pitchbend_range: u8,
    ) -> Self {
        Self {
            zone_type,
            num_member_channels: num_member_channels.min(MAX_MEMBER_CHANNELS),
            per_note_pitchbend_range: per_note_pitchbend_range.min(MAX_PITCHBEND_RANGE),
            master_pitchbend_range: master_pitchbend_range.min(MAX_PITCHBEND_RANGE),
        }
    }

    /// Lower zone with default pitch-bend ranges.
    pub fn lower(num_member_channels: u8) -> Self {
        Self::new(
            ZoneType::Lower,
            num_member_channels,
            DEFAULT_PER_NOTE_PITCHBEND_RANGE,
            DEFAULT_MASTER_PITCHBEND_RANGE,
        )
    }

    /// Upper zone with default pitch-bend ranges.
    pub fn upper(num_member_channels: u8) -> Self {
        Self::new(
            ZoneType::Upper,
            num_member_channels,
            DEFAULT_PER_NOTE_PITCHBEND_RANGE,
            DEFAULT_MASTER_PITCHBEND_RANGE,
        )
    }

    /// Set both pitch-bend ranges in semitones.
    pub fn with_pitchbend_ranges(mut self, per_note: u8, master: u8) -> Self {
        self.per_note_pitchbend_range = per_note.min(MAX_PITCHBEND_RANGE);
        self.master_pitchbend_range = master.min(MAX_PITCHBEND_RANGE);
        self
    }

    #[inline]
    pub fn is_lower_zone(&self) -> bool {
        self.zone_type == ZoneType::Lower
    }

    #[inline]
    pub fn is_upper_zone(&self) -> bool {
        self.zone_type == ZoneType::Upper
    }

    /// A zone with no member channels is inactive.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.num_member_channels > 0
    }

    #[inline]
    pub fn master_channel(&self) -> u8 {
        match self.zone_type {
            ZoneType::Lower => 1,
            ZoneType::Upper => 16,
        }
    }

    #[inline]
    pub fn first_member_channel(&self) -> u8 {
        match self.zone_type {
            ZoneType::Lower => 2,
            ZoneType::Upper => 15,
        }
    }

    /// Last member channel in scan order (the master channel when inactive).
    #[inline]
    pub fn last_member_channel(&self) -> u8 {
        match self.zone_type {
            ZoneType::Lower => 1 + self.num_member_channels,
            ZoneType::Upper => 16 - self.num_member_channels,
        }
    }

    /// +1 for the lower zone, -1 for the upper zone.
    #[inline]
    pub fn channel_increment(&self) -> i8 {
        match self.zone_type {
            ZoneType::Lower => 1,
            ZoneType::Upper => -1,
        }
    }

    #[inline]
    pub fn is_master_channel(&self, channel: u8) -> bool {
        channel == self.master_channel()
    }

    /// True for member channels only.
    #[inline]
    pub fn is_using_channel_as_member_channel(&self, channel: u8) -> bool {
        match self.zone_type {
            ZoneType::Lower => channel > 1 && channel <= self.last_member_channel(),
            ZoneType::Upper => channel < 16 && channel >= self.last_member_channel(),
        }
    }

    /// True for member channels and the master channel.
    #[inline]
    pub fn is_using_channel(&self, channel: u8) -> bool {
        self.is_using_channel_as_member_channel(channel) || self.is_master_channel(channel)
    }

    /// Member channels in ascending numeric order.
    pub fn member_channel_range(&self) -> core::ops::RangeInclusive<u8> {
        let first = self.first_member_channel();
        let last = self.last_member_channel();
        first.min(last)..=first.max(last)
    }

    /// Member channels in allocation order (ascending for lower, descending for upper).
    pub fn member_channels(&self) -> impl Iterator<Item = u8> {
        let first = self.first_member_channel() as i16;
        let increment = self.channel_increment() as i16;
        (0..self.num_member_channels as i16).map(move |i| (first + i * increment) as u8)
    }
}
