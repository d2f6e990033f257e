//! 14-bit MPE dimension values.

use serde::{Deserialize, Serialize};

/// A pitch-bend, pressure or timbre value at 14-bit resolution.
///
/// 7-bit inputs are scaled so that 64 maps to the centre and 127 to the maximum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MpeValue(u16);

impl MpeValue {
    pub const MIN: MpeValue = MpeValue(0);
    pub const CENTRE: MpeValue = MpeValue(8192);
    pub const MAX: MpeValue = MpeValue(16383);

    /// From a 7-bit value (0-127).
    pub fn from_7bit(value: u8) -> Self {
        let value = value.min(127) as u16;
        if value <= 64 {
            Self(value << 7)
        } else {
            let upper = (value - 64) as f32 / 63.0 * 8191.0;
            Self(8192 + upper as u16)
        }
    }

    /// From a 14-bit value (0-16383).
    #[inline]
    pub fn from_14bit(value: u16) -> Self {
        Self(value.min(16383))
    }

    /// From -1.0..=1.0, centre at 0.0.
    pub fn from_signed_f32(value: f32) -> Self {
        let value = value.clamp(-1.0, 1.0);
        Self(libm::roundf((value + 1.0) * 16383.0 / 2.0) as u16)
    }

    /// From 0.0..=1.0.
    pub fn from_unsigned_f32(value: f32) -> Self {
        Self(libm::roundf(value.clamp(0.0, 1.0) * 16383.0) as u16)
    }

    #[inline]
    pub fn as_7bit(self) -> u8 {
        (self.0 >> 7) as u8
    }

    #[inline]
    pub fn as_14bit(self) -> u16 {
        self.0
    }

    /// -1.0..=1.0. Each half of the range is scaled separately so that the
    /// centre maps to exactly 0.0.
    pub fn as_signed_f32(self) -> f32 {
        let value = self.0 as f32;
        if self.0 < 8192 {
            value / 8192.0 - 1.0
        } else {
            (value - 8192.0) / 8191.0
        }
    }

    /// 0.0..=1.0.
    #[inline]
    pub fn as_unsigned_f32(self) -> f32 {
        self.0 as f32 / 16383.0
    }
}
