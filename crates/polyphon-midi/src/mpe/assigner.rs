//! Allocation of MIDI channels to notes inside an MPE zone or a legacy channel range.

use core::ops::RangeInclusive;

use smallvec::SmallVec;

use super::zone::MpeZone;
use crate::{Error, Result};

#[derive(Clone, Debug, Default)]
struct ChannelNotes {
    notes: SmallVec<[u8; 4]>,
    last_note_played: Option<u8>,
}

impl ChannelNotes {
    #[inline]
    fn is_free(&self) -> bool {
        self.notes.is_empty()
    }

    fn remove_note(&mut self, note: u8) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| *n != note);
        if self.notes.len() != before {
            self.last_note_played = Some(note);
            true
        } else {
            false
        }
    }
}

/// Picks a MIDI channel for each new note so that simultaneous notes land on
/// different channels.
///
/// Channels are tried in this order:
/// 1. a free channel whose last note was the same note number,
/// 2. the next free channel after the previous assignment (round robin),
/// 3. when every channel is busy, the channel playing the closest
///    different note. That channel then carries two notes until one of them
///    is released; note-offs are matched by note number.
#[derive(Clone, Debug)]
pub struct MpeChannelAssigner {
    zone: Option<MpeZone>,
    first_channel: u8,
    channel_increment: i8,
    num_channels: u8,
    /// Zone-order index of the last assigned channel.
    last_assigned: Option<u8>,
    /// Indexed by 1-based channel number; slot 0 is unused.
    channels: [ChannelNotes; 17],
}

impl MpeChannelAssigner {
    /// Assigner over the member channels of an active zone.
    pub fn new(zone: MpeZone) -> Result<Self> {
        if !zone.is_active() {
            return Err(Error::InvalidConfig(
                "channel assigner needs an active MPE zone".into(),
            ));
        }

        tracing::debug!(
            "MPE channel assigner: {:?} zone, {} member channels",
            zone.zone_type,
            zone.num_member_channels
        );

        Ok(Self {
            zone: Some(zone),
            first_channel: zone.first_member_channel(),
            channel_increment: zone.channel_increment(),
            num_channels: zone.num_member_channels,
            last_assigned: None,
            channels: Default::default(),
        })
    }

    /// Assigner over a plain channel range, without an MPE zone.
    pub fn legacy(channels: RangeInclusive<u8>) -> Result<Self> {
        let (first, last) = (*channels.start(), *channels.end());
        if channels.is_empty() || first < 1 || last > 16 {
            return Err(Error::InvalidConfig(format!(
                "invalid legacy channel range {first}..={last}"
            )));
        }

        tracing::debug!("Legacy channel assigner over channels {}..={}", first, last);

        Ok(Self {
            zone: None,
            first_channel: first,
            channel_increment: 1,
            num_channels: last - first + 1,
            last_assigned: None,
            channels: Default::default(),
        })
    }

    /// The zone this assigner serves, `None` in legacy mode.
    #[inline]
    pub fn zone(&self) -> Option<MpeZone> {
        self.zone
    }

    #[inline]
    pub fn is_legacy(&self) -> bool {
        self.zone.is_none()
    }

    #[inline]
    pub fn num_channels(&self) -> u8 {
        self.num_channels
    }

    /// Channels in scan order.
    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.num_channels).map(move |index| self.channel_at(index))
    }

    /// Notes currently recorded on `channel` (1-16).
    pub fn notes_on_channel(&self, channel: u8) -> &[u8] {
        self.channels
            .get(channel as usize)
            .map(|c| c.notes.as_slice())
            .unwrap_or(&[])
    }

    /// Choose a channel for a new note and record the note on it.
    pub fn find_midi_channel_for_new_note(&mut self, note: u8) -> u8 {
        if self.num_channels == 1 {
            let channel = self.first_channel;
            self.channels[channel as usize].notes.push(note);
            return channel;
        }

        // Continuity: a free channel that last played this note.
        let continuing = (0..self.num_channels).find(|&index| {
            let state = &self.channels[self.channel_at(index) as usize];
            state.is_free() && state.last_note_played == Some(note)
        });
        if let Some(index) = continuing {
            return self.assign(index, note);
        }

        // Round robin, visiting each channel at most once.
        let start = self.last_assigned.map_or(0, |i| (i + 1) % self.num_channels);
        let free = (0..self.num_channels)
            .map(|step| (start + step) % self.num_channels)
            .find(|&index| self.channels[self.channel_at(index) as usize].is_free());
        if let Some(index) = free {
            return self.assign(index, note);
        }

        let index = self.index_playing_closest_nonequal_note(note);
        self.assign(index, note)
    }

    /// Channel currently recording `note`, searched in channel-number order.
    pub fn find_midi_channel_for_existing_note(&self, note: u8) -> Option<u8> {
        (1..=16u8).find(|&channel| self.channels[channel as usize].notes.contains(&note))
    }

    /// Release `note`, either from the given channel or from the first channel
    /// (in channel-number order) that holds it.
    ///
    /// A hint of 0 names the unused slot 0 and so releases nothing.
    pub fn note_off(&mut self, note: u8, channel: Option<u8>) {
        if let Some(channel @ 0..=16) = channel {
            self.channels[channel as usize].remove_note(note);
            return;
        }

        for state in self.channels.iter_mut().skip(1) {
            if state.remove_note(note) {
                return;
            }
        }
    }

    /// Release everything, remembering each channel's most recent note.
    pub fn all_notes_off(&mut self) {
        for state in self.channels.iter_mut() {
            if let Some(&last) = state.notes.last() {
                state.last_note_played = Some(last);
            }
            state.notes.clear();
        }
    }

    #[inline]
    fn channel_at(&self, index: u8) -> u8 {
        (self.first_channel as i16 + index as i16 * self.channel_increment as i16) as u8
    }

    fn assign(&mut self, index: u8, note: u8) -> u8 {
        let channel = self.channel_at(index);
        self.last_assigned = Some(index);
        self.channels[channel as usize].notes.push(note);
        channel
    }

    /// Ties go to the first channel in scan order.
    fn index_playing_closest_nonequal_note(&self, note: u8) -> u8 {
        let mut closest_index = 0;
        let mut closest_distance = 127;

        for index in 0..self.num_channels {
            for &playing in &self.channels[self.channel_at(index) as usize].notes {
                let distance = playing.abs_diff(note);
                if distance > 0 && distance < closest_distance {
                    closest_distance = distance;
                    closest_index = index;
                }
            }
        }

        closest_index
    }
}

impl Default for MpeChannelAssigner {
    /// Legacy assigner over all 16 channels.
    fn default() -> Self {
        Self {
            zone: None,
            first_channel: 1,
            channel_increment: 1,
            num_channels: 16,
            last_assigned: None,
            channels: Default::default(),
        }
    }
}
