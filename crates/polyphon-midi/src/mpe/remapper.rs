//! Merging of several MPE sources into one zone without channel collisions.

use super::zone::MpeZone;
use crate::event::MidiEvent;
use crate::{Error, Result};

/// Moves events from different MPE sources onto distinct member channels.
///
/// Each `(source, channel)` pair keeps the physical channel it was given
/// until its note-off. When a pair arrives on a channel already owned by
/// another source, it is moved to the first unowned member channel or, if
/// none is left, to the least recently used one.
#[derive(Clone, Debug)]
pub struct MpeChannelRemapper {
    zone: MpeZone,
    counter: u32,
    /// Indexed by 1-based channel number.
    last_used: [u32; 17],
    source_and_channel: [u32; 17],
}

impl MpeChannelRemapper {
    /// Marks a channel that no source currently owns.
    pub const NOT_MPE: u32 = 0;

    pub fn new(zone: MpeZone) -> Result<Self> {
        if !zone.is_active() {
            return Err(Error::InvalidConfig(
                "channel remapper needs an active MPE zone".into(),
            ));
        }

        Ok(Self {
            zone,
            counter: 0,
            last_used: [0; 17],
            source_and_channel: [Self::NOT_MPE; 17],
        })
    }

    #[inline]
    pub fn zone(&self) -> MpeZone {
        self.zone
    }

    /// Rewrite the event's channel if another source already owns it.
    ///
    /// An all-notes-off or reset-all-controllers on the master channel
    /// releases every channel owned by `source_id`.
    pub fn remap_midi_channel_if_needed(&mut self, event: &mut MidiEvent, source_id: u32) {
        let channel = event.channel_number();

        if self.zone.is_master_channel(channel)
            && (event.is_reset_all_controllers() || event.is_all_notes_off())
        {
            self.clear_source(source_id);
            return;
        }

        if !self.zone.is_using_channel_as_member_channel(channel) {
            return;
        }

        let id = (source_id << 5) | channel as u32;
        self.counter = self.counter.wrapping_add(1);

        if self.apply_remap_if_existing(channel, id, event) {
            return;
        }

        for member in self.zone.member_channels() {
            if self.apply_remap_if_existing(member, id, event) {
                return;
            }
        }

        if self.source_and_channel[channel as usize] == Self::NOT_MPE {
            self.last_used[channel as usize] = self.counter;
            self.source_and_channel[channel as usize] = id;
            return;
        }

        let target = self.best_channel_to_reuse();
        self.source_and_channel[target as usize] = id;
        self.last_used[target as usize] = self.counter;
        event.set_channel(target);
    }

    /// Forget every mapping.
    pub fn reset(&mut self) {
        self.source_and_channel = [Self::NOT_MPE; 17];
    }

    pub fn clear_channel(&mut self, channel: u8) {
        if let Some(slot) = self.source_and_channel.get_mut(channel as usize) {
            *slot = Self::NOT_MPE;
        }
    }

    /// Release all channels owned by `source_id`.
    pub fn clear_source(&mut self, source_id: u32) {
        for slot in self.source_and_channel.iter_mut() {
            if *slot != Self::NOT_MPE && *slot >> 5 == source_id {
                *slot = Self::NOT_MPE;
            }
        }
    }

    fn apply_remap_if_existing(&mut self, channel: u8, id: u32, event: &mut MidiEvent) -> bool {
        if self.source_and_channel[channel as usize] != id {
            return false;
        }

        if event.is_note_off() {
            self.source_and_channel[channel as usize] = Self::NOT_MPE;
        } else {
            self.last_used[channel as usize] = self.counter;
        }
        event.set_channel(channel);
        true
    }

    fn best_channel_to_reuse(&self) -> u8 {
        if let Some(free) = self
            .zone
            .member_channels()
            .find(|&c| self.source_and_channel[c as usize] == Self::NOT_MPE)
        {
            return free;
        }

        let mut best = self.zone.first_member_channel();
        let mut best_last_use = self.counter;
        for channel in self.zone.member_channels() {
            if self.last_used[channel as usize] < best_last_use {
                best_last_use = self.last_used[channel as usize];
                best = channel;
            }
        }
        best
    }
}
