//! Lower/upper zone layout with change notification.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::zone::{
    MpeZone, ZoneType, DEFAULT_MASTER_PITCHBEND_RANGE, DEFAULT_PER_NOTE_PITCHBEND_RANGE,
    MAX_MEMBER_CHANNELS, MAX_PITCHBEND_RANGE,
};
use crate::event::MidiEvent;
use crate::rpn::{RpnDetector, RpnMessage};
use crate::{Error, Result};

/// RPN number of the MPE Configuration Message.
pub const ZONE_LAYOUT_RPN: u16 = 6;
/// RPN number of pitch-bend sensitivity.
pub const PITCHBEND_RANGE_RPN: u16 = 0;

/// Receives a callback every time a [`MpeZoneLayout`] changes.
pub trait ZoneLayoutListener: Send + Sync {
    fn zone_layout_changed(&self, layout: &MpeZoneLayout);
}

impl<F> ZoneLayoutListener for F
where
    F: Fn(&MpeZoneLayout) + Send + Sync,
{
    fn zone_layout_changed(&self, layout: &MpeZoneLayout) {
        self(layout)
    }
}

/// Handle returned by [`MpeZoneLayout::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The MPE zone configuration of a device: an optional lower and upper zone.
///
/// Member ranges of the two zones never overlap: growing one zone shrinks the
/// other. Every mutation notifies listeners exactly once. Cloning copies the
/// zones but not the listeners.
#[derive(Serialize, Deserialize)]
pub struct MpeZoneLayout {
    lower_zone: MpeZone,
    upper_zone: MpeZone,
    #[serde(skip)]
    rpn_detector: RpnDetector,
    #[serde(skip)]
    listeners: Vec<(ListenerId, Arc<dyn ZoneLayoutListener>)>,
    #[serde(skip)]
    next_listener_id: u64,
}

impl Default for MpeZoneLayout {
    fn default() -> Self {
        Self {
            lower_zone: MpeZone::lower(0),
            upper_zone: MpeZone::upper(0),
            rpn_detector: RpnDetector::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }
}

impl Clone for MpeZoneLayout {
    fn clone(&self) -> Self {
        Self {
            lower_zone: self.lower_zone,
            upper_zone: self.upper_zone,
            ..Self::default()
        }
    }
}

impl PartialEq for MpeZoneLayout {
    fn eq(&self, other: &Self) -> bool {
        self.lower_zone == other.lower_zone && self.upper_zone == other.upper_zone
    }
}

impl fmt::Debug for MpeZoneLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpeZoneLayout")
            .field("lower_zone", &self.lower_zone)
            .field("upper_zone", &self.upper_zone)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl MpeZoneLayout {
    /// Layout with both zones inactive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout holding a single zone; the other zone is inactive.
    pub fn from_zone(zone: MpeZone) -> Self {
        let mut layout = Self::default();
        match zone.zone_type {
            ZoneType::Lower => layout.lower_zone = zone,
            ZoneType::Upper => layout.upper_zone = zone,
        }
        layout
    }

    /// Layout holding both zones.
    ///
    /// Fails if the zone types are swapped or the member ranges would overlap.
    pub fn from_zones(lower: MpeZone, upper: MpeZone) -> Result<Self> {
        if !lower.is_lower_zone() || !upper.is_upper_zone() {
            return Err(Error::InvalidConfig(
                "from_zones expects a lower zone followed by an upper zone".into(),
            ));
        }

        if lower.is_active()
            && upper.is_active()
            && lower.num_member_channels + upper.num_member_channels >= MAX_MEMBER_CHANNELS
        {
            return Err(Error::OverlappingZones {
                lower: lower.num_member_channels,
                upper: upper.num_member_channels,
            });
        }

        Ok(Self {
            lower_zone: lower,
            upper_zone: upper,
            ..Self::default()
        })
    }

    #[inline]
    pub fn lower_zone(&self) -> MpeZone {
        self.lower_zone
    }

    #[inline]
    pub fn upper_zone(&self) -> MpeZone {
        self.upper_zone
    }

    /// True if at least one zone is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.lower_zone.is_active() || self.upper_zone.is_active()
    }

    /// The active zone using `channel` as member or master channel.
    pub fn zone_for_channel(&self, channel: u8) -> Option<MpeZone> {
        [self.lower_zone, self.upper_zone]
            .into_iter()
            .find(|zone| zone.is_active() && zone.is_using_channel(channel))
    }

    pub fn set_lower_zone(
        &mut self,
        num_member_channels: u8,
        per_note_pitchbend_range: u8,
        master_pitchbend_range: u8,
    ) {
        self.set_zone(
            ZoneType::Lower,
            num_member_channels,
            per_note_pitchbend_range,
            master_pitchbend_range,
        );
    }

    pub fn set_upper_zone(
        &mut self,
        num_member_channels: u8,
        per_note_pitchbend_range: u8,
        master_pitchbend_range: u8,
    ) {
        self.set_zone(
            ZoneType::Upper,
            num_member_channels,
            per_note_pitchbend_range,
            master_pitchbend_range,
        );
    }

    /// Replace this layout's zones with another layout's (listeners are kept).
    pub fn set_layout(&mut self, other: &MpeZoneLayout) {
        self.lower_zone = other.lower_zone;
        self.upper_zone = other.upper_zone;
        self.send_layout_change_message();
    }

    pub fn clear_all_zones(&mut self) {
        self.lower_zone = MpeZone::lower(0);
        self.upper_zone = MpeZone::upper(0);
        self.send_layout_change_message();
    }

    /// Apply MPE configuration and pitch-bend sensitivity RPNs.
    ///
    /// Non-controller messages are ignored.
    pub fn process_next_midi_event(&mut self, event: &MidiEvent) {
        if let Some(rpn) = self.rpn_detector.try_parse_event(event) {
            self.process_rpn_message(rpn);
        }
    }

    pub fn process_next_midi_buffer(&mut self, events: &[MidiEvent]) {
        for event in events {
            self.process_next_midi_event(event);
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ZoneLayoutListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn set_zone(
        &mut self,
        zone_type: ZoneType,
        num_member_channels: u8,
        per_note_pitchbend_range: u8,
        master_pitchbend_range: u8,
    ) {
        let num_member_channels =
            limit_zone_parameter("member channel count", num_member_channels, MAX_MEMBER_CHANNELS);
        let per_note_pitchbend_range =
            limit_zone_parameter("per-note pitch-bend range", per_note_pitchbend_range, MAX_PITCHBEND_RANGE);
        let master_pitchbend_range =
            limit_zone_parameter("master pitch-bend range", master_pitchbend_range, MAX_PITCHBEND_RANGE);

        let zone = MpeZone::new(
            zone_type,
            num_member_channels,
            per_note_pitchbend_range,
            master_pitchbend_range,
        );

        let other = match zone_type {
            ZoneType::Lower => {
                self.lower_zone = zone;
                &mut self.upper_zone
            }
            ZoneType::Upper => {
                self.upper_zone = zone;
                &mut self.lower_zone
            }
        };

        // The zone just set wins; the other one shrinks out of its way.
        if num_member_channels > 0
            && num_member_channels + other.num_member_channels >= MAX_MEMBER_CHANNELS
        {
            other.num_member_channels = (MAX_MEMBER_CHANNELS - 1).saturating_sub(num_member_channels);
        }

        tracing::debug!(
            "MPE zone layout: lower {} members, upper {} members",
            self.lower_zone.num_member_channels,
            self.upper_zone.num_member_channels
        );

        self.send_layout_change_message();
    }

    fn process_rpn_message(&mut self, rpn: RpnMessage) {
        match rpn.parameter_number {
            ZONE_LAYOUT_RPN => self.process_zone_layout_rpn(rpn),
            PITCHBEND_RANGE_RPN => self.process_pitchbend_range_rpn(rpn),
            _ => {}
        }
    }

    fn process_zone_layout_rpn(&mut self, rpn: RpnMessage) {
        if rpn.value >= 16 {
            return;
        }

        let members = rpn.value as u8;
        match rpn.channel {
            1 => self.set_lower_zone(
                members,
                DEFAULT_PER_NOTE_PITCHBEND_RANGE,
                DEFAULT_MASTER_PITCHBEND_RANGE,
            ),
            16 => self.set_upper_zone(
                members,
                DEFAULT_PER_NOTE_PITCHBEND_RANGE,
                DEFAULT_MASTER_PITCHBEND_RANGE,
            ),
            _ => {}
        }
    }

    fn process_pitchbend_range_rpn(&mut self, rpn: RpnMessage) {
        // The data-entry LSB carries cents; only whole semitones are kept.
        let semitones = if rpn.is_14_bit_value {
            rpn.value >> 7
        } else {
            rpn.value
        };
        let semitones = limit_zone_parameter(
            "pitch-bend range",
            semitones.min(u8::MAX as u16) as u8,
            MAX_PITCHBEND_RANGE,
        );

        let changed = match rpn.channel {
            1 => update_value(&mut self.lower_zone.master_pitchbend_range, semitones),
            16 => update_value(&mut self.upper_zone.master_pitchbend_range, semitones),
            channel if self.lower_zone.is_using_channel_as_member_channel(channel) => {
                update_value(&mut self.lower_zone.per_note_pitchbend_range, semitones)
            }
            channel if self.upper_zone.is_using_channel_as_member_channel(channel) => {
                update_value(&mut self.upper_zone.per_note_pitchbend_range, semitones)
            }
            _ => false,
        };

        if changed {
            self.send_layout_change_message();
        }
    }

    fn send_layout_change_message(&self) {
        for (_, listener) in &self.listeners {
            listener.zone_layout_changed(self);
        }
    }
}

fn update_value(target: &mut u8, value: u8) -> bool {
    if *target == value {
        return false;
    }
    *target = value;
    true
}

fn limit_zone_parameter(name: &str, value: u8, max: u8) -> u8 {
    if value > max {
        tracing::warn!("MPE {} {} out of range, limiting to {}", name, value, max);
        max
    } else {
        value
    }
}
