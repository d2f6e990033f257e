//! RT-safe MIDI event types with sample-accurate timing.
//!
//! Channels in this crate's API are 1-based (1-16), matching the numbering
//! used by zone layouts and the voice pool. The wire representation stays the
//! 0-based [`Channel`] enum from `midi-msg`.

use core::ops::Deref;

use midi_msg::{Channel, ChannelModeMsg, ChannelVoiceMsg, ControlChange, MidiMsg, PolyMode};

use crate::utils::velocity_to_gain;

/// Controller number of the sustain (damper) pedal.
pub const CC_SUSTAIN: u8 = 0x40;
/// Controller number of the sostenuto pedal.
pub const CC_SOSTENUTO: u8 = 0x42;
/// Controller number of the soft pedal.
pub const CC_SOFT_PEDAL: u8 = 0x43;
/// Channel-mode controller: all sound off.
pub const CC_ALL_SOUND_OFF: u8 = 0x78;
/// Channel-mode controller: reset all controllers.
pub const CC_RESET_ALL_CONTROLLERS: u8 = 0x79;
/// Channel-mode controller: all notes off.
pub const CC_ALL_NOTES_OFF: u8 = 0x7B;

/// Centre position of the 14-bit pitch wheel.
pub const PITCH_WHEEL_CENTRE: u16 = 8192;

#[inline]
fn wire_channel(channel: u8) -> Channel {
    debug_assert!((1..=16).contains(&channel), "MIDI channel out of range: {channel}");
    Channel::from_u8(channel.clamp(1, 16) - 1)
}

/// RT-safe MIDI event with sample-accurate frame offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    /// Offset within the current buffer (0 = first sample).
    pub frame_offset: usize,
    pub channel: Channel,
    pub msg: ChannelVoiceMsg,
}

impl MidiEvent {
    #[inline]
    pub fn new(frame_offset: usize, channel: Channel, msg: ChannelVoiceMsg) -> Self {
        Self {
            frame_offset,
            channel,
            msg,
        }
    }

    #[inline]
    pub fn note_on(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(
            frame_offset,
            wire_channel(channel),
            ChannelVoiceMsg::NoteOn { note, velocity },
        )
    }

    /// Note-on with a normalized velocity (0.0-1.0).
    ///
    /// A non-zero velocity never rounds down to 0, which would read as a note-off.
    #[inline]
    pub fn note_on_f32(frame_offset: usize, channel: u8, note: u8, velocity: f32) -> Self {
        let scaled = libm::roundf(velocity.clamp(0.0, 1.0) * 127.0) as u8;
        let velocity = if velocity > 0.0 { scaled.max(1) } else { 0 };
        Self::note_on(frame_offset, channel, note, velocity)
    }

    #[inline]
    pub fn note_off(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(
            frame_offset,
            wire_channel(channel),
            ChannelVoiceMsg::NoteOff { note, velocity },
        )
    }

    #[inline]
    pub fn control_change(frame_offset: usize, channel: u8, cc: u8, value: u8) -> Self {
        Self::new(
            frame_offset,
            wire_channel(channel),
            ChannelVoiceMsg::ControlChange {
                control: ControlChange::CC { control: cc, value },
            },
        )
    }

    #[inline]
    pub fn pitch_bend(frame_offset: usize, channel: u8, bend: u16) -> Self {
        Self::new(
            frame_offset,
            wire_channel(channel),
            ChannelVoiceMsg::PitchBend {
                bend: bend.min(16383),
            },
        )
    }

    #[inline]
    pub fn channel_pressure(frame_offset: usize, channel: u8, pressure: u8) -> Self {
        Self::new(
            frame_offset,
            wire_channel(channel),
            ChannelVoiceMsg::ChannelPressure { pressure },
        )
    }

    #[inline]
    pub fn poly_aftertouch(frame_offset: usize, channel: u8, note: u8, pressure: u8) -> Self {
        Self::new(
            frame_offset,
            wire_channel(channel),
            ChannelVoiceMsg::PolyPressure { note, pressure },
        )
    }

    #[inline]
    pub fn program_change(frame_offset: usize, channel: u8, program: u8) -> Self {
        Self::new(
            frame_offset,
            wire_channel(channel),
            ChannelVoiceMsg::ProgramChange { program },
        )
    }

    #[inline]
    pub fn all_notes_off(frame_offset: usize, channel: u8) -> Self {
        Self::control_change(frame_offset, channel, CC_ALL_NOTES_OFF, 0)
    }

    #[inline]
    pub fn all_sound_off(frame_offset: usize, channel: u8) -> Self {
        Self::control_change(frame_offset, channel, CC_ALL_SOUND_OFF, 0)
    }

    /// 1-based channel number (1-16).
    #[inline]
    pub fn channel_number(&self) -> u8 {
        self.channel as u8 + 1
    }

    /// Move the event to another 1-based channel.
    #[inline]
    pub fn set_channel(&mut self, channel: u8) {
        self.channel = wire_channel(channel);
    }

    #[inline]
    pub fn with_offset(mut self, frame_offset: usize) -> Self {
        self.frame_offset = frame_offset;
        self
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        matches!(self.msg, ChannelVoiceMsg::NoteOn { velocity, .. } if velocity > 0)
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        matches!(
            self.msg,
            ChannelVoiceMsg::NoteOff { .. } | ChannelVoiceMsg::NoteOn { velocity: 0, .. }
        )
    }

    #[inline]
    pub fn note(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::NoteOn { note, .. }
            | ChannelVoiceMsg::NoteOff { note, .. }
            | ChannelVoiceMsg::PolyPressure { note, .. } => Some(note),
            _ => None,
        }
    }

    #[inline]
    pub fn velocity(&self) -> Option<u8> {
        match self.msg {
            ChannelVoiceMsg::NoteOn { velocity, .. }
            | ChannelVoiceMsg::NoteOff { velocity, .. } => Some(velocity),
            _ => None,
        }
    }

    /// Velocity normalized to 0.0-1.0.
    #[inline]
    pub fn float_velocity(&self) -> Option<f32> {
        self.velocity().map(velocity_to_gain)
    }

    /// `(controller, value)` for 7-bit controller messages.
    #[inline]
    pub fn controller(&self) -> Option<(u8, u8)> {
        match self.msg {
            ChannelVoiceMsg::ControlChange {
                control: ControlChange::CC { control, value },
            } => Some((control, value)),
            _ => None,
        }
    }

    #[inline]
    pub fn pitch_wheel(&self) -> Option<u16> {
        match self.msg {
            ChannelVoiceMsg::PitchBend { bend } => Some(bend),
            _ => None,
        }
    }

    #[inline]
    pub fn is_controller(&self) -> bool {
        self.controller().is_some()
    }

    #[inline]
    pub fn is_all_notes_off(&self) -> bool {
        matches!(self.controller(), Some((CC_ALL_NOTES_OFF, _)))
    }

    #[inline]
    pub fn is_all_sound_off(&self) -> bool {
        matches!(self.controller(), Some((CC_ALL_SOUND_OFF, _)))
    }

    #[inline]
    pub fn is_reset_all_controllers(&self) -> bool {
        matches!(self.controller(), Some((CC_RESET_ALL_CONTROLLERS, _)))
    }

    /// Wire message for this event. Controllers 120-127 become channel-mode messages.
    pub fn to_midi_msg(&self) -> MidiMsg {
        let mode = match self.controller() {
            Some((control, value)) => channel_mode_msg(control, value),
            None => None,
        };
        match mode {
            Some(msg) => MidiMsg::ChannelMode {
                channel: self.channel,
                msg,
            },
            None => MidiMsg::ChannelVoice {
                channel: self.channel,
                msg: self.msg,
            },
        }
    }

    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_midi_msg().to_midi()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, midi_msg::ParseError> {
        Self::from_bytes_with_offset(bytes, 0)
    }

    pub fn from_bytes_with_offset(
        bytes: &[u8],
        frame_offset: usize,
    ) -> Result<Self, midi_msg::ParseError> {
        let (msg, _len) = MidiMsg::from_midi(bytes)?;
        match msg {
            MidiMsg::ChannelVoice { channel, msg } => Ok(Self {
                frame_offset,
                channel,
                msg,
            }),
            MidiMsg::ChannelMode { channel, msg } => {
                let (control, value) = channel_mode_controller(msg);
                Ok(Self {
                    frame_offset,
                    channel,
                    msg: ChannelVoiceMsg::ControlChange {
                        control: ControlChange::CC { control, value },
                    },
                })
            }
            _ => Err(midi_msg::ParseError::Invalid(
                "Expected a channel voice or channel mode message",
            )),
        }
    }
}

fn channel_mode_msg(control: u8, value: u8) -> Option<ChannelModeMsg> {
    let msg = match control {
        CC_ALL_SOUND_OFF => ChannelModeMsg::AllSoundOff,
        CC_RESET_ALL_CONTROLLERS => ChannelModeMsg::ResetAllControllers,
        0x7A => ChannelModeMsg::LocalControl(value >= 64),
        CC_ALL_NOTES_OFF => ChannelModeMsg::AllNotesOff,
        0x7C => ChannelModeMsg::OmniMode(false),
        0x7D => ChannelModeMsg::OmniMode(true),
        0x7E => ChannelModeMsg::PolyMode(PolyMode::Mono(value.min(16))),
        0x7F => ChannelModeMsg::PolyMode(PolyMode::Poly),
        _ => return None,
    };
    Some(msg)
}

/// Controller number and value that carry a channel-mode message on the wire.
fn channel_mode_controller(msg: ChannelModeMsg) -> (u8, u8) {
    match msg {
        ChannelModeMsg::AllSoundOff => (CC_ALL_SOUND_OFF, 0),
        ChannelModeMsg::ResetAllControllers => (CC_RESET_ALL_CONTROLLERS, 0),
        ChannelModeMsg::LocalControl(on) => (0x7A, if on { 127 } else { 0 }),
        ChannelModeMsg::AllNotesOff => (CC_ALL_NOTES_OFF, 0),
        ChannelModeMsg::OmniMode(on) => (if on { 0x7D } else { 0x7C }, 0),
        ChannelModeMsg::PolyMode(PolyMode::Mono(channels)) => (0x7E, channels.min(16)),
        ChannelModeMsg::PolyMode(PolyMode::Poly) => (0x7F, 0),
    }
}

/// Time-ordered sequence of MIDI events for one processing block.
///
/// Events are kept sorted by `frame_offset`; events sharing an offset keep
/// their insertion order. Reserve capacity up front when the buffer is refilled
/// from the audio thread.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
}

impl MidiBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Insert an event after every event at the same or an earlier offset.
    pub fn add_event(&mut self, event: MidiEvent) {
        let index = self
            .events
            .partition_point(|e| e.frame_offset <= event.frame_offset);
        self.events.insert(index, event);
    }

    /// Append all events from `other`, shifted by `offset_delta` samples.
    pub fn add_events(&mut self, other: &[MidiEvent], offset_delta: usize) {
        for event in other {
            self.add_event(event.with_offset(event.frame_offset + offset_delta));
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[inline]
    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    /// Offset of the first event, if any.
    #[inline]
    pub fn first_event_time(&self) -> Option<usize> {
        self.events.first().map(|e| e.frame_offset)
    }

    /// Offset of the last event, if any.
    #[inline]
    pub fn last_event_time(&self) -> Option<usize> {
        self.events.last().map(|e| e.frame_offset)
    }
}

impl Deref for MidiBuffer {
    type Target = [MidiEvent];

    fn deref(&self) -> &Self::Target {
        &self.events
    }
}

impl FromIterator<MidiEvent> for MidiBuffer {
    fn from_iter<T: IntoIterator<Item = MidiEvent>>(iter: T) -> Self {
        let mut buffer = MidiBuffer::new();
        for event in iter {
            buffer.add_event(event);
        }
        buffer
    }
}

impl Extend<MidiEvent> for MidiBuffer {
    fn extend<T: IntoIterator<Item = MidiEvent>>(&mut self, iter: T) {
        for event in iter {
            self.add_event(event);
        }
    }
}

impl<'a> IntoIterator for &'a MidiBuffer {
    type Item = &'a MidiEvent;
    type IntoIter = core::slice::Iter<'a, MidiEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
