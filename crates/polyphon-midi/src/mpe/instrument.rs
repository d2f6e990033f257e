//! Per-note expression tracking on top of a zone layout.
//!
//! [`MpeInstrument`] turns a stream of [`MidiEvent`]s into a list of playing
//! [`MpeNote`]s. Pitch bend, pressure and timbre received on a member channel
//! go to the note(s) on that channel; the same dimensions received on a
//! master channel apply to every note of the zone. Every change is queued as
//! an [`InstrumentEvent`] for the owner to drain.
//!
//! In legacy mode zones are ignored: a range of channels behaves like member
//! channels with a fixed pitch-bend range, and pedals act per channel.

use std::ops::RangeInclusive;

use midi_msg::ChannelVoiceMsg;
use serde::{Deserialize, Serialize};

use super::layout::MpeZoneLayout;
use super::note::{KeyState, MpeNote};
use super::value::MpeValue;
use super::zone::{MpeZone, MAX_PITCHBEND_RANGE};
use crate::event::{
    MidiEvent, CC_ALL_NOTES_OFF, CC_RESET_ALL_CONTROLLERS, CC_SOSTENUTO, CC_SUSTAIN,
};
use crate::{Error, Result};

/// Controller carrying pressure (MSB) as an alternative to channel pressure.
pub const CC_PRESSURE_MSB: u8 = 70;
/// Controller carrying timbre (MSB), the MPE "slide" dimension.
pub const CC_TIMBRE_MSB: u8 = 74;
pub const CC_PRESSURE_LSB: u8 = 102;
pub const CC_TIMBRE_LSB: u8 = 106;

/// Release velocity used when the real one is unknown.
const DEFAULT_NOTE_OFF_VELOCITY: u8 = 64;
/// Pitch-bend range of a freshly enabled legacy mode.
const DEFAULT_LEGACY_PITCHBEND_RANGE: u8 = 2;

/// Which note(s) a per-channel dimension message applies to when a member
/// channel carries more than one note.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingMode {
    /// The most recent note whose key is still down.
    #[default]
    LastNotePlayedOnChannel,
    LowestNoteOnChannel,
    HighestNoteOnChannel,
    AllNotesOnChannel,
}

/// A change to the instrument's notes or layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InstrumentEvent {
    NoteAdded(MpeNote),
    PressureChanged(MpeNote),
    PitchbendChanged(MpeNote),
    TimbreChanged(MpeNote),
    /// A pedal or key change that did not end the note.
    KeyStateChanged(MpeNote),
    /// The note has ended and is no longer tracked.
    NoteReleased(MpeNote),
    ZoneLayoutChanged,
}

impl InstrumentEvent {
    /// Snapshot of the note this event is about.
    pub fn note(&self) -> Option<&MpeNote> {
        match self {
            InstrumentEvent::NoteAdded(note)
            | InstrumentEvent::PressureChanged(note)
            | InstrumentEvent::PitchbendChanged(note)
            | InstrumentEvent::TimbreChanged(note)
            | InstrumentEvent::KeyStateChanged(note)
            | InstrumentEvent::NoteReleased(note) => Some(note),
            InstrumentEvent::ZoneLayoutChanged => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dimension {
    Pressure = 0,
    Pitchbend = 1,
    Timbre = 2,
}

impl Dimension {
    /// Pressure rests at zero, the bipolar dimensions at the centre.
    fn resting_value(self) -> MpeValue {
        match self {
            Dimension::Pressure => MpeValue::MIN,
            Dimension::Pitchbend | Dimension::Timbre => MpeValue::CENTRE,
        }
    }

    fn value_mut(self, note: &mut MpeNote) -> &mut MpeValue {
        match self {
            Dimension::Pressure => &mut note.pressure,
            Dimension::Pitchbend => &mut note.pitchbend,
            Dimension::Timbre => &mut note.timbre,
        }
    }

    fn changed(self, note: MpeNote) -> InstrumentEvent {
        match self {
            Dimension::Pressure => InstrumentEvent::PressureChanged(note),
            Dimension::Pitchbend => InstrumentEvent::PitchbendChanged(note),
            Dimension::Timbre => InstrumentEvent::TimbreChanged(note),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct DimensionState {
    tracking_mode: TrackingMode,
    /// Indexed by channel - 1.
    last_value_received: [MpeValue; 16],
}

impl DimensionState {
    fn new(dimension: Dimension) -> Self {
        Self {
            tracking_mode: TrackingMode::default(),
            last_value_received: [dimension.resting_value(); 16],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LegacyMode {
    enabled: bool,
    first_channel: u8,
    last_channel: u8,
    pitchbend_range: u8,
}

impl LegacyMode {
    #[inline]
    fn contains(&self, channel: u8) -> bool {
        (self.first_channel..=self.last_channel).contains(&channel)
    }
}

#[inline]
fn is_valid_channel(channel: u8) -> bool {
    (1..=16).contains(&channel)
}

/// Tracks MPE notes and their expression dimensions.
///
/// Channels are 1-based; events on channels the layout (or legacy range) does
/// not use are ignored.
#[derive(Debug)]
pub struct MpeInstrument {
    zone_layout: MpeZoneLayout,
    legacy: LegacyMode,
    /// Indexed by [`Dimension`].
    dimensions: [DimensionState; 3],
    /// Controller LSBs waiting for their MSB, indexed by channel - 1.
    pressure_lsb: [Option<u8>; 16],
    timbre_lsb: [Option<u8>; 16],
    member_channel_sustained: [bool; 16],
    notes: Vec<MpeNote>,
    events: Vec<InstrumentEvent>,
    last_note_id: u16,
}

impl Default for MpeInstrument {
    fn default() -> Self {
        Self {
            zone_layout: MpeZoneLayout::new(),
            legacy: LegacyMode {
                enabled: false,
                first_channel: 1,
                last_channel: 16,
                pitchbend_range: DEFAULT_LEGACY_PITCHBEND_RANGE,
            },
            dimensions: [
                DimensionState::new(Dimension::Pressure),
                DimensionState::new(Dimension::Pitchbend),
                DimensionState::new(Dimension::Timbre),
            ],
            pressure_lsb: [None; 16],
            timbre_lsb: [None; 16],
            member_channel_sustained: [false; 16],
            notes: Vec::with_capacity(32),
            events: Vec::with_capacity(32),
            last_note_id: 0,
        }
    }
}

impl MpeInstrument {
    /// Instrument with no active zones. Feed it MPE configuration messages or
    /// call [`set_zone_layout`](Self::set_zone_layout) before playing notes.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zone_layout(layout: &MpeZoneLayout) -> Self {
        let mut instrument = Self::default();
        instrument.zone_layout.set_layout(layout);
        instrument
    }

    // ------------------------------------------------------------------
    // Layout and legacy mode
    // ------------------------------------------------------------------

    #[inline]
    pub fn zone_layout(&self) -> &MpeZoneLayout {
        &self.zone_layout
    }

    /// Replace the zone layout. Releases every note and leaves legacy mode.
    pub fn set_zone_layout(&mut self, layout: &MpeZoneLayout) {
        self.release_all_notes();
        self.legacy.enabled = false;

        if self.zone_layout != *layout {
            self.zone_layout.set_layout(layout);
            self.events.push(InstrumentEvent::ZoneLayoutChanged);
        }
    }

    /// Treat `channels` as independent channels with a shared pitch-bend range
    /// instead of following MPE zones. Does nothing if already enabled.
    pub fn enable_legacy_mode(
        &mut self,
        pitchbend_range: u8,
        channels: RangeInclusive<u8>,
    ) -> Result<()> {
        if self.legacy.enabled {
            return Ok(());
        }
        let (first, last) = validate_legacy_range(&channels)?;
        validate_legacy_pitchbend_range(pitchbend_range)?;

        self.release_all_notes();
        self.legacy = LegacyMode {
            enabled: true,
            first_channel: first,
            last_channel: last,
            pitchbend_range,
        };
        self.zone_layout.clear_all_zones();
        self.events.push(InstrumentEvent::ZoneLayoutChanged);
        tracing::debug!(
            "MPE instrument: legacy mode on channels {}..={}, bend range {}",
            first,
            last,
            pitchbend_range
        );
        Ok(())
    }

    #[inline]
    pub fn is_legacy_mode_enabled(&self) -> bool {
        self.legacy.enabled
    }

    #[inline]
    pub fn legacy_mode_channel_range(&self) -> RangeInclusive<u8> {
        self.legacy.first_channel..=self.legacy.last_channel
    }

    /// Releases every note, even when legacy mode is off.
    pub fn set_legacy_mode_channel_range(&mut self, channels: RangeInclusive<u8>) -> Result<()> {
        let (first, last) = validate_legacy_range(&channels)?;
        self.release_all_notes();

        if (first, last) != (self.legacy.first_channel, self.legacy.last_channel) {
            self.legacy.first_channel = first;
            self.legacy.last_channel = last;
            self.events.push(InstrumentEvent::ZoneLayoutChanged);
        }
        Ok(())
    }

    #[inline]
    pub fn legacy_mode_pitchbend_range(&self) -> u8 {
        self.legacy.pitchbend_range
    }

    /// Releases every note, even when legacy mode is off.
    pub fn set_legacy_mode_pitchbend_range(&mut self, pitchbend_range: u8) -> Result<()> {
        validate_legacy_pitchbend_range(pitchbend_range)?;
        self.release_all_notes();

        if pitchbend_range != self.legacy.pitchbend_range {
            self.legacy.pitchbend_range = pitchbend_range;
            self.events.push(InstrumentEvent::ZoneLayoutChanged);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tracking modes
    // ------------------------------------------------------------------

    pub fn set_pressure_tracking_mode(&mut self, mode: TrackingMode) {
        self.dimensions[Dimension::Pressure as usize].tracking_mode = mode;
    }

    pub fn set_pitchbend_tracking_mode(&mut self, mode: TrackingMode) {
        self.dimensions[Dimension::Pitchbend as usize].tracking_mode = mode;
    }

    pub fn set_timbre_tracking_mode(&mut self, mode: TrackingMode) {
        self.dimensions[Dimension::Timbre as usize].tracking_mode = mode;
    }

    #[inline]
    pub fn pressure_tracking_mode(&self) -> TrackingMode {
        self.dimensions[Dimension::Pressure as usize].tracking_mode
    }

    #[inline]
    pub fn pitchbend_tracking_mode(&self) -> TrackingMode {
        self.dimensions[Dimension::Pitchbend as usize].tracking_mode
    }

    #[inline]
    pub fn timbre_tracking_mode(&self) -> TrackingMode {
        self.dimensions[Dimension::Timbre as usize].tracking_mode
    }

    // ------------------------------------------------------------------
    // MIDI input
    // ------------------------------------------------------------------

    /// Update the zone layout from configuration RPNs, then apply the event.
    pub fn process_next_midi_event(&mut self, event: &MidiEvent) {
        let before = (self.zone_layout.lower_zone(), self.zone_layout.upper_zone());
        self.zone_layout.process_next_midi_event(event);
        if before != (self.zone_layout.lower_zone(), self.zone_layout.upper_zone()) {
            // A zone configured over MIDI takes over from legacy mode.
            if self.zone_layout.is_active() {
                self.legacy.enabled = false;
            }
            self.events.push(InstrumentEvent::ZoneLayoutChanged);
        }

        let channel = event.channel_number();
        match event.msg {
            ChannelVoiceMsg::NoteOn { note, velocity: 0 } => {
                self.note_off(channel, note, MpeValue::from_7bit(DEFAULT_NOTE_OFF_VELOCITY));
            }
            ChannelVoiceMsg::NoteOn { note, velocity } => {
                self.note_on(channel, note, MpeValue::from_7bit(velocity));
            }
            ChannelVoiceMsg::NoteOff { note, velocity } => {
                self.note_off(channel, note, MpeValue::from_7bit(velocity));
            }
            ChannelVoiceMsg::PitchBend { bend } => {
                self.pitchbend(channel, MpeValue::from_14bit(bend));
            }
            ChannelVoiceMsg::ChannelPressure { pressure } => {
                self.pressure(channel, MpeValue::from_7bit(pressure));
            }
            ChannelVoiceMsg::PolyPressure { note, pressure } => {
                if self.is_member_channel(channel) {
                    self.poly_aftertouch(channel, note, MpeValue::from_7bit(pressure));
                }
            }
            _ => {
                if let Some((control, value)) = event.controller() {
                    self.process_controller(channel, control, value);
                }
            }
        }
    }

    pub fn process_next_midi_buffer(&mut self, events: &[MidiEvent]) {
        for event in events {
            self.process_next_midi_event(event);
        }
    }

    fn process_controller(&mut self, channel: u8, control: u8, value: u8) {
        match control {
            CC_RESET_ALL_CONTROLLERS | CC_ALL_NOTES_OFF => self.reset_all_controllers(channel),
            CC_SUSTAIN => self.sustain_pedal(channel, value >= 64),
            CC_SOSTENUTO => self.sostenuto_pedal(channel, value >= 64),
            CC_PRESSURE_MSB => {
                if is_valid_channel(channel) {
                    let lsb = self.pressure_lsb[channel as usize - 1];
                    self.pressure(channel, combine_msb(value, lsb));
                }
            }
            CC_TIMBRE_MSB => {
                if is_valid_channel(channel) {
                    let lsb = self.timbre_lsb[channel as usize - 1];
                    self.timbre(channel, combine_msb(value, lsb));
                }
            }
            CC_PRESSURE_LSB => {
                if is_valid_channel(channel) {
                    self.pressure_lsb[channel as usize - 1] = Some(value);
                }
            }
            CC_TIMBRE_LSB => {
                if is_valid_channel(channel) {
                    self.timbre_lsb[channel as usize - 1] = Some(value);
                }
            }
            _ => {}
        }
    }

    /// Legacy channels end their own notes; a master channel ends every note
    /// of its zone. Member channels are ignored.
    fn reset_all_controllers(&mut self, channel: u8) {
        if self.legacy.enabled && self.legacy.contains(channel) {
            self.release_notes_where(|note| note.midi_channel == channel);
        } else if self.is_master_channel(channel) {
            let zone = self.zone_of_master(channel);
            self.release_notes_where(|note| zone.is_using_channel(note.midi_channel));
        }
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Start tracking a note. A second note-on for a note already playing on
    /// the same channel releases the old one first.
    pub fn note_on(&mut self, channel: u8, note: u8, velocity: MpeValue) {
        if !is_valid_channel(channel) || !self.is_using_channel(channel) {
            return;
        }

        let timbre = self.initial_value(channel, Dimension::Timbre);
        let mut new_note = MpeNote {
            note_id: self.next_note_id(),
            midi_channel: channel,
            initial_note: note,
            note_on_velocity: velocity,
            pitchbend: self.initial_value(channel, Dimension::Pitchbend),
            pressure: self.initial_value(channel, Dimension::Pressure),
            initial_timbre: timbre,
            timbre,
            note_off_velocity: MpeValue::MIN,
            total_pitchbend_in_semitones: 0.0,
            key_state: if self.member_channel_sustained[channel as usize - 1] {
                KeyState::KeyDownAndSustained
            } else {
                KeyState::KeyDown
            },
        };
        if let Some(total) = self.total_pitchbend(&new_note) {
            new_note.total_pitchbend_in_semitones = total;
        }

        if let Some(index) = self.note_index(channel, note) {
            self.release_note_at(index);
        }

        self.notes.push(new_note);
        self.events.push(InstrumentEvent::NoteAdded(new_note));
    }

    /// Release a note. A pedal-held note stays tracked as
    /// [`KeyState::Sustained`] until the pedal lifts.
    pub fn note_off(&mut self, channel: u8, note: u8, velocity: MpeValue) {
        if self.notes.is_empty() || !is_valid_channel(channel) || !self.is_using_channel(channel) {
            return;
        }
        let Some(index) = self.note_index(channel, note) else {
            return;
        };

        let tracked = &mut self.notes[index];
        tracked.key_state = match tracked.key_state {
            KeyState::KeyDownAndSustained => KeyState::Sustained,
            _ => KeyState::Off,
        };
        tracked.note_off_velocity = velocity;
        let snapshot = *tracked;

        // The next note on an emptied member channel starts from rest.
        if !self.legacy.enabled && self.last_note_played_index(channel).is_none() {
            for (state, dimension) in self.dimensions.iter_mut().zip([
                Dimension::Pressure,
                Dimension::Pitchbend,
                Dimension::Timbre,
            ]) {
                state.last_value_received[channel as usize - 1] = dimension.resting_value();
            }
        }

        if snapshot.key_state == KeyState::Off {
            self.notes.remove(index);
            self.events.push(InstrumentEvent::NoteReleased(snapshot));
        } else {
            self.events.push(InstrumentEvent::KeyStateChanged(snapshot));
        }
    }

    /// End every tracked note.
    pub fn release_all_notes(&mut self) {
        self.release_notes_where(|_| true);
    }

    // ------------------------------------------------------------------
    // Expression
    // ------------------------------------------------------------------

    pub fn pitchbend(&mut self, channel: u8, value: MpeValue) {
        self.update_dimension(channel, Dimension::Pitchbend, value);
    }

    pub fn pressure(&mut self, channel: u8, value: MpeValue) {
        self.update_dimension(channel, Dimension::Pressure, value);
    }

    pub fn timbre(&mut self, channel: u8, value: MpeValue) {
        self.update_dimension(channel, Dimension::Timbre, value);
    }

    /// Pressure for one note only.
    pub fn poly_aftertouch(&mut self, channel: u8, note: u8, value: MpeValue) {
        for index in (0..self.notes.len()).rev() {
            let tracked = &mut self.notes[index];
            if tracked.midi_channel == channel
                && tracked.initial_note == note
                && tracked.pressure != value
            {
                tracked.pressure = value;
                let snapshot = *tracked;
                self.events.push(InstrumentEvent::PressureChanged(snapshot));
            }
        }
    }

    fn update_dimension(&mut self, channel: u8, dimension: Dimension, value: MpeValue) {
        if !is_valid_channel(channel) {
            return;
        }
        self.dimensions[dimension as usize].last_value_received[channel as usize - 1] = value;

        if self.notes.is_empty() {
            return;
        }

        if self.is_member_channel(channel) {
            match self.dimensions[dimension as usize].tracking_mode {
                TrackingMode::AllNotesOnChannel => {
                    for index in (0..self.notes.len()).rev() {
                        if self.notes[index].midi_channel == channel {
                            self.update_dimension_for_note(index, dimension, value);
                        }
                    }
                }
                mode => {
                    if let Some(index) = self.tracked_note_index(channel, mode) {
                        self.update_dimension_for_note(index, dimension, value);
                    }
                }
            }
        } else if self.is_master_channel(channel) {
            self.update_dimension_master(channel, dimension, value);
        }
    }

    fn update_dimension_for_note(&mut self, index: usize, dimension: Dimension, value: MpeValue) {
        let slot = dimension.value_mut(&mut self.notes[index]);
        if *slot == value {
            return;
        }
        *slot = value;

        if dimension == Dimension::Pitchbend {
            self.refresh_total_pitchbend(index);
        }
        self.events.push(dimension.changed(self.notes[index]));
    }

    /// Master pitch bend shifts every note's total bend; master pressure and
    /// timbre overwrite the notes' own values.
    fn update_dimension_master(&mut self, channel: u8, dimension: Dimension, value: MpeValue) {
        let zone = self.zone_of_master(channel);
        if !zone.is_active() {
            return;
        }

        for index in (0..self.notes.len()).rev() {
            if !zone.is_using_channel(self.notes[index].midi_channel) {
                continue;
            }

            if dimension == Dimension::Pitchbend {
                self.refresh_total_pitchbend(index);
                self.events
                    .push(InstrumentEvent::PitchbendChanged(self.notes[index]));
            } else {
                let slot = dimension.value_mut(&mut self.notes[index]);
                if *slot != value {
                    *slot = value;
                    self.events.push(dimension.changed(self.notes[index]));
                }
            }
        }
    }

    fn refresh_total_pitchbend(&mut self, index: usize) {
        if let Some(total) = self.total_pitchbend(&self.notes[index]) {
            self.notes[index].total_pitchbend_in_semitones = total;
        }
    }

    /// Per-note bend scaled by the zone's per-note range plus the master
    /// channel's bend scaled by the master range. `None` for a note outside
    /// every zone.
    fn total_pitchbend(&self, note: &MpeNote) -> Option<f32> {
        if self.legacy.enabled {
            return Some(note.pitchbend.as_signed_f32() * self.legacy.pitchbend_range as f32);
        }

        let zone = self.zone_layout.zone_for_channel(note.midi_channel)?;
        let per_note = if zone.is_using_channel_as_member_channel(note.midi_channel) {
            note.pitchbend.as_signed_f32() * zone.per_note_pitchbend_range as f32
        } else {
            0.0
        };
        let master_bend = self.dimensions[Dimension::Pitchbend as usize].last_value_received
            [zone.master_channel() as usize - 1];
        Some(per_note + master_bend.as_signed_f32() * zone.master_pitchbend_range as f32)
    }

    /// Value a new note on `channel` starts with: the last value received on
    /// the channel, or the resting value if another key is already down there.
    fn initial_value(&self, channel: u8, dimension: Dimension) -> MpeValue {
        if !self.legacy.enabled && self.last_note_played_index(channel).is_some() {
            return dimension.resting_value();
        }
        self.dimensions[dimension as usize].last_value_received[channel as usize - 1]
    }

    // ------------------------------------------------------------------
    // Pedals
    // ------------------------------------------------------------------

    /// Sustain on a master channel (or a legacy channel). Notes pressed while
    /// it is down start out sustained.
    pub fn sustain_pedal(&mut self, channel: u8, is_down: bool) {
        self.handle_sustain_or_sostenuto(channel, is_down, false);
    }

    /// Sostenuto holds only the notes already down when it is pressed.
    pub fn sostenuto_pedal(&mut self, channel: u8, is_down: bool) {
        self.handle_sustain_or_sostenuto(channel, is_down, true);
    }

    fn handle_sustain_or_sostenuto(&mut self, channel: u8, is_down: bool, is_sostenuto: bool) {
        let applies = if self.legacy.enabled {
            self.legacy.contains(channel)
        } else {
            self.is_master_channel(channel)
        };
        if !applies {
            return;
        }

        let legacy = self.legacy.enabled;
        let zone = self.zone_of_master(channel);
        let affects = |note: &MpeNote| {
            if legacy {
                note.midi_channel == channel
            } else {
                zone.is_using_channel(note.midi_channel)
            }
        };

        for index in (0..self.notes.len()).rev() {
            if !affects(&self.notes[index]) {
                continue;
            }

            let note = &mut self.notes[index];
            let new_state = match (note.key_state, is_down) {
                (KeyState::KeyDown, true) => KeyState::KeyDownAndSustained,
                (KeyState::Sustained, false) => KeyState::Off,
                (KeyState::KeyDownAndSustained, false) => KeyState::KeyDown,
                (state, _) => state,
            };
            if new_state == note.key_state {
                continue;
            }
            note.key_state = new_state;
            let snapshot = *note;

            if new_state == KeyState::Off {
                self.notes.remove(index);
                self.events.push(InstrumentEvent::NoteReleased(snapshot));
            } else {
                self.events.push(InstrumentEvent::KeyStateChanged(snapshot));
            }
        }

        if !is_sostenuto {
            self.member_channel_sustained[channel as usize - 1] = is_down;
            if !legacy {
                for member in zone.member_channel_range() {
                    self.member_channel_sustained[member as usize - 1] = is_down;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Channel roles
    // ------------------------------------------------------------------

    /// Channels that carry per-note expression (the legacy range in legacy mode).
    pub fn is_member_channel(&self, channel: u8) -> bool {
        if self.legacy.enabled {
            return self.legacy.contains(channel);
        }
        self.zone_layout
            .lower_zone()
            .is_using_channel_as_member_channel(channel)
            || self
                .zone_layout
                .upper_zone()
                .is_using_channel_as_member_channel(channel)
    }

    /// Master channel of an active zone. Always false in legacy mode.
    pub fn is_master_channel(&self, channel: u8) -> bool {
        if self.legacy.enabled {
            return false;
        }
        let lower = self.zone_layout.lower_zone();
        let upper = self.zone_layout.upper_zone();
        (lower.is_active() && channel == lower.master_channel())
            || (upper.is_active() && channel == upper.master_channel())
    }

    /// Member or master channel of an active zone, or a legacy channel.
    pub fn is_using_channel(&self, channel: u8) -> bool {
        if self.legacy.enabled {
            return self.legacy.contains(channel);
        }
        self.zone_layout.zone_for_channel(channel).is_some()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[inline]
    pub fn num_playing_notes(&self) -> usize {
        self.notes.len()
    }

    /// Tracked notes, oldest first.
    #[inline]
    pub fn notes(&self) -> &[MpeNote] {
        &self.notes
    }

    /// The note playing `note` on `channel`.
    pub fn note(&self, channel: u8, note: u8) -> Option<MpeNote> {
        self.note_index(channel, note).map(|index| self.notes[index])
    }

    pub fn note_at(&self, index: usize) -> Option<MpeNote> {
        self.notes.get(index).copied()
    }

    pub fn note_with_id(&self, note_id: u16) -> Option<MpeNote> {
        self.notes.iter().find(|n| n.note_id == note_id).copied()
    }

    /// Most recent note on `channel` whose key is still down.
    pub fn most_recent_note(&self, channel: u8) -> Option<MpeNote> {
        self.last_note_played_index(channel)
            .map(|index| self.notes[index])
    }

    /// Most recent tracked note other than `other`, on any channel.
    pub fn most_recent_note_other_than(&self, other: &MpeNote) -> Option<MpeNote> {
        self.notes
            .iter()
            .rev()
            .find(|n| n.note_id != other.note_id)
            .copied()
    }

    /// Queued changes, oldest first. Events accumulate until drained.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, InstrumentEvent> {
        self.events.drain(..)
    }

    #[inline]
    pub fn pending_events(&self) -> &[InstrumentEvent] {
        &self.events
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn next_note_id(&mut self) -> u16 {
        self.last_note_id = self.last_note_id.wrapping_add(1).max(1);
        self.last_note_id
    }

    fn zone_of_master(&self, channel: u8) -> MpeZone {
        if channel == 1 {
            self.zone_layout.lower_zone()
        } else {
            self.zone_layout.upper_zone()
        }
    }

    fn note_index(&self, channel: u8, note: u8) -> Option<usize> {
        self.notes
            .iter()
            .position(|n| n.midi_channel == channel && n.initial_note == note)
    }

    fn last_note_played_index(&self, channel: u8) -> Option<usize> {
        self.notes
            .iter()
            .rposition(|n| n.midi_channel == channel && n.key_state.is_key_down())
    }

    /// Key-down note on `channel` selected by `mode`. Ties go to the most
    /// recent note.
    fn tracked_note_index(&self, channel: u8, mode: TrackingMode) -> Option<usize> {
        let key_down = self
            .notes
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, n)| n.midi_channel == channel && n.key_state.is_key_down());

        match mode {
            TrackingMode::LastNotePlayedOnChannel => self.last_note_played_index(channel),
            TrackingMode::LowestNoteOnChannel => key_down
                .fold(None, |best: Option<(usize, u8)>, (index, n)| match best {
                    Some((_, lowest)) if lowest <= n.initial_note => best,
                    _ => Some((index, n.initial_note)),
                })
                .map(|(index, _)| index),
            TrackingMode::HighestNoteOnChannel => key_down
                .fold(None, |best: Option<(usize, u8)>, (index, n)| match best {
                    Some((_, highest)) if highest >= n.initial_note => best,
                    _ => Some((index, n.initial_note)),
                })
                .map(|(index, _)| index),
            TrackingMode::AllNotesOnChannel => None,
        }
    }

    fn release_note_at(&mut self, index: usize) {
        let mut note = self.notes.remove(index);
        note.key_state = KeyState::Off;
        note.note_off_velocity = MpeValue::from_7bit(DEFAULT_NOTE_OFF_VELOCITY);
        self.events.push(InstrumentEvent::NoteReleased(note));
    }

    /// Newest first.
    fn release_notes_where(&mut self, mut predicate: impl FnMut(&MpeNote) -> bool) {
        for index in (0..self.notes.len()).rev() {
            if predicate(&self.notes[index]) {
                self.release_note_at(index);
            }
        }
    }
}

/// 14-bit value from a controller MSB and an optional earlier LSB.
fn combine_msb(msb: u8, lsb: Option<u8>) -> MpeValue {
    match lsb {
        Some(lsb) => MpeValue::from_14bit(((msb as u16) << 7) | lsb as u16),
        None => MpeValue::from_7bit(msb),
    }
}

fn validate_legacy_range(channels: &RangeInclusive<u8>) -> Result<(u8, u8)> {
    let (first, last) = (*channels.start(), *channels.end());
    if first < 1 || last > 16 || first > last {
        return Err(Error::InvalidConfig(format!(
            "legacy channel range {first}..={last} must be a non-empty range within 1..=16"
        )));
    }
    Ok((first, last))
}

fn validate_legacy_pitchbend_range(range: u8) -> Result<()> {
    if range > MAX_PITCHBEND_RANGE {
        return Err(Error::InvalidConfig(format!(
            "legacy pitch-bend range {range} exceeds {MAX_PITCHBEND_RANGE} semitones"
        )));
    }
    Ok(())
}
