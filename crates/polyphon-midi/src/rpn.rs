//! Registered / non-registered parameter number (RPN/NRPN) parsing and generation.
//!
//! An RPN arrives as a short run of controller messages on one channel:
//! parameter LSB (CC 100) and MSB (CC 101), then data entry MSB (CC 6) and an
//! optional LSB (CC 38). NRPNs use CC 98/99 for the parameter number.

use smallvec::SmallVec;

use crate::event::MidiEvent;

const CC_DATA_ENTRY_MSB: u8 = 0x06;
const CC_DATA_ENTRY_LSB: u8 = 0x26;
const CC_NRPN_LSB: u8 = 0x62;
const CC_NRPN_MSB: u8 = 0x63;
const CC_RPN_LSB: u8 = 0x64;
const CC_RPN_MSB: u8 = 0x65;

/// Marks a 7-bit field that has not been received yet.
const UNSET: u8 = 0xFF;

/// A fully parsed RPN or NRPN.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RpnMessage {
    /// 1-based MIDI channel.
    pub channel: u8,
    /// 14-bit parameter number.
    pub parameter_number: u16,
    /// 7-bit or 14-bit value, see `is_14_bit_value`.
    pub value: u16,
    pub is_nrpn: bool,
    pub is_14_bit_value: bool,
}

#[derive(Clone, Copy, Debug)]
struct ChannelState {
    parameter_msb: u8,
    parameter_lsb: u8,
    value_msb: u8,
    value_lsb: u8,
    is_nrpn: bool,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            parameter_msb: UNSET,
            parameter_lsb: UNSET,
            value_msb: UNSET,
            value_lsb: UNSET,
            is_nrpn: false,
        }
    }
}

impl ChannelState {
    fn reset_value(&mut self) {
        self.value_msb = UNSET;
        self.value_lsb = UNSET;
    }

    fn handle_controller(&mut self, channel: u8, controller: u8, value: u8) -> Option<RpnMessage> {
        match controller {
            CC_NRPN_LSB => self.select_parameter(false, value, true),
            CC_NRPN_MSB => self.select_parameter(true, value, true),
            CC_RPN_LSB => self.select_parameter(false, value, false),
            CC_RPN_MSB => self.select_parameter(true, value, false),
            CC_DATA_ENTRY_MSB => {
                self.value_msb = value;
                self.value_lsb = UNSET;
                return self.message_if_ready(channel);
            }
            CC_DATA_ENTRY_LSB => {
                self.value_lsb = value;
                return self.message_if_ready(channel);
            }
            _ => {}
        }
        None
    }

    fn select_parameter(&mut self, msb: bool, value: u8, is_nrpn: bool) {
        if msb {
            self.parameter_msb = value;
        } else {
            self.parameter_lsb = value;
        }
        self.reset_value();
        self.is_nrpn = is_nrpn;
    }

    fn message_if_ready(&self, channel: u8) -> Option<RpnMessage> {
        if self.parameter_msb >= 0x80 || self.parameter_lsb >= 0x80 || self.value_msb >= 0x80 {
            return None;
        }

        let parameter_number = ((self.parameter_msb as u16) << 7) + self.parameter_lsb as u16;
        let (value, is_14_bit_value) = if self.value_lsb < 0x80 {
            (((self.value_msb as u16) << 7) + self.value_lsb as u16, true)
        } else {
            (self.value_msb as u16, false)
        };

        Some(RpnMessage {
            channel,
            parameter_number,
            value,
            is_nrpn: self.is_nrpn,
            is_14_bit_value,
        })
    }
}

/// Reassembles RPN/NRPN messages from a stream of controller messages.
///
/// Keeps independent state for each of the 16 channels.
#[derive(Clone, Debug)]
pub struct RpnDetector {
    states: [ChannelState; 16],
}

impl Default for RpnDetector {
    fn default() -> Self {
        Self {
            states: [ChannelState::default(); 16],
        }
    }
}

impl RpnDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one controller message (1-based channel).
    ///
    /// Returns a message once parameter number and value are both complete.
    /// A data-entry LSB following an MSB yields a second, 14-bit message.
    pub fn try_parse(&mut self, channel: u8, controller: u8, value: u8) -> Option<RpnMessage> {
        if !(1..=16).contains(&channel) || controller >= 0x80 || value >= 0x80 {
            return None;
        }
        self.states[channel as usize - 1].handle_controller(channel, controller, value)
    }

    /// Feed an event; non-controller events are ignored.
    pub fn try_parse_event(&mut self, event: &MidiEvent) -> Option<RpnMessage> {
        let (controller, value) = event.controller()?;
        self.try_parse(event.channel_number(), controller, value)
    }

    pub fn reset(&mut self) {
        self.states = [ChannelState::default(); 16];
    }
}

/// Controller sequence produced by [`generate`].
pub type RpnSequence = SmallVec<[MidiEvent; 4]>;

/// Build the controller messages that transmit an RPN/NRPN.
///
/// The data-entry LSB is sent after the MSB, since receiving an MSB resets
/// the LSB on the receiver.
pub fn generate(
    channel: u8,
    parameter_number: u16,
    value: u16,
    is_nrpn: bool,
    use_14_bit_value: bool,
) -> RpnSequence {
    debug_assert!((1..=16).contains(&channel));
    debug_assert!(parameter_number < 16384);
    debug_assert!(value < if use_14_bit_value { 16384 } else { 128 });

    let parameter_lsb = (parameter_number & 0x7F) as u8;
    let parameter_msb = ((parameter_number >> 7) & 0x7F) as u8;

    let (value_msb, value_lsb) = if use_14_bit_value {
        (((value >> 7) & 0x7F) as u8, (value & 0x7F) as u8)
    } else {
        ((value & 0x7F) as u8, 0)
    };

    let (lsb_cc, msb_cc) = if is_nrpn {
        (CC_NRPN_LSB, CC_NRPN_MSB)
    } else {
        (CC_RPN_LSB, CC_RPN_MSB)
    };

    let mut sequence = RpnSequence::new();
    sequence.push(MidiEvent::control_change(0, channel, lsb_cc, parameter_lsb));
    sequence.push(MidiEvent::control_change(0, channel, msb_cc, parameter_msb));
    sequence.push(MidiEvent::control_change(0, channel, CC_DATA_ENTRY_MSB, value_msb));

    if use_14_bit_value {
        sequence.push(MidiEvent::control_change(0, channel, CC_DATA_ENTRY_LSB, value_lsb));
    }

    sequence
}

/// Build the controller messages for an already parsed message.
pub fn generate_message(message: &RpnMessage) -> RpnSequence {
    generate(
        message.channel,
        message.parameter_number,
        message.value,
        message.is_nrpn,
        message.is_14_bit_value,
    )
}
