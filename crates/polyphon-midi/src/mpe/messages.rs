//! Builders for the MIDI messages that configure an MPE device.
//!
//! Every builder returns a [`MidiBuffer`] with all events at offset 0, ready to
//! be sent to a device or fed to [`MpeZoneLayout::process_next_midi_buffer`].
//!
//! [`MpeZoneLayout::process_next_midi_buffer`]: super::MpeZoneLayout::process_next_midi_buffer

use super::layout::{MpeZoneLayout, PITCHBEND_RANGE_RPN, ZONE_LAYOUT_RPN};
use super::zone::{MpeZone, ZoneType, MAX_MEMBER_CHANNELS, MAX_PITCHBEND_RANGE};
use crate::event::MidiBuffer;
use crate::rpn;

/// Namespace for MPE configuration message builders.
pub struct MpeMessages;

impl MpeMessages {
    /// Configure a lower zone with the given member count and pitch-bend ranges.
    pub fn set_lower_zone(
        num_member_channels: u8,
        per_note_pitchbend_range: u8,
        master_pitchbend_range: u8,
    ) -> MidiBuffer {
        Self::set_zone(
            ZoneType::Lower,
            num_member_channels,
            per_note_pitchbend_range,
            master_pitchbend_range,
        )
    }

    /// Configure an upper zone with the given member count and pitch-bend ranges.
    pub fn set_upper_zone(
        num_member_channels: u8,
        per_note_pitchbend_range: u8,
        master_pitchbend_range: u8,
    ) -> MidiBuffer {
        Self::set_zone(
            ZoneType::Upper,
            num_member_channels,
            per_note_pitchbend_range,
            master_pitchbend_range,
        )
    }

    pub fn set_lower_zone_per_note_pitchbend_range(range: u8) -> MidiBuffer {
        Self::pitchbend_range(2, range)
    }

    pub fn set_upper_zone_per_note_pitchbend_range(range: u8) -> MidiBuffer {
        Self::pitchbend_range(15, range)
    }

    pub fn set_lower_zone_master_pitchbend_range(range: u8) -> MidiBuffer {
        Self::pitchbend_range(1, range)
    }

    pub fn set_upper_zone_master_pitchbend_range(range: u8) -> MidiBuffer {
        Self::pitchbend_range(16, range)
    }

    pub fn clear_lower_zone() -> MidiBuffer {
        Self::zone_layout(1, 0)
    }

    pub fn clear_upper_zone() -> MidiBuffer {
        Self::zone_layout(16, 0)
    }

    pub fn clear_all_zones() -> MidiBuffer {
        let mut buffer = Self::clear_lower_zone();
        buffer.extend(Self::clear_upper_zone().iter().copied());
        buffer
    }

    /// Clear both zones, then configure every active zone of `layout`.
    pub fn set_zone_layout(layout: &MpeZoneLayout) -> MidiBuffer {
        let mut buffer = Self::clear_all_zones();

        for zone in [layout.lower_zone(), layout.upper_zone()] {
            if zone.is_active() {
                buffer.extend(Self::set_zone_from(&zone).iter().copied());
            }
        }

        buffer
    }

    fn set_zone_from(zone: &MpeZone) -> MidiBuffer {
        Self::set_zone(
            zone.zone_type,
            zone.num_member_channels,
            zone.per_note_pitchbend_range,
            zone.master_pitchbend_range,
        )
    }

    fn set_zone(
        zone_type: ZoneType,
        num_member_channels: u8,
        per_note_pitchbend_range: u8,
        master_pitchbend_range: u8,
    ) -> MidiBuffer {
        let zone = MpeZone::new(
            zone_type,
            num_member_channels,
            per_note_pitchbend_range,
            master_pitchbend_range,
        );

        let mut buffer = Self::zone_layout(zone.master_channel(), zone.num_member_channels);
        buffer.extend(
            Self::pitchbend_range(zone.first_member_channel(), zone.per_note_pitchbend_range)
                .iter()
                .copied(),
        );
        buffer.extend(
            Self::pitchbend_range(zone.master_channel(), zone.master_pitchbend_range)
                .iter()
                .copied(),
        );
        buffer
    }

    fn zone_layout(master_channel: u8, num_member_channels: u8) -> MidiBuffer {
        rpn::generate(
            master_channel,
            ZONE_LAYOUT_RPN,
            num_member_channels.min(MAX_MEMBER_CHANNELS) as u16,
            false,
            false,
        )
        .into_iter()
        .collect()
    }

    fn pitchbend_range(channel: u8, range: u8) -> MidiBuffer {
        rpn::generate(
            channel,
            PITCHBEND_RANGE_RPN,
            range.min(MAX_PITCHBEND_RANGE) as u16,
            false,
            false,
        )
        .into_iter()
        .collect()
    }
}
