//! Conversions between MIDI values and the floating-point values voices use.

use libm::powf;

/// Frequency of a (possibly fractional) note number, A4 = 69 at `a4_hz`.
#[inline]
pub fn note_to_hz_with_reference(note: f32, a4_hz: f32) -> f32 {
    a4_hz * powf(2.0, (note - 69.0) / 12.0)
}

/// Frequency of a note number in standard 440 Hz tuning.
#[inline]
pub fn note_to_hz(note: f32) -> f32 {
    note_to_hz_with_reference(note, 440.0)
}

/// 7-bit velocity to 0.0-1.0. Out-of-range bytes count as 127.
#[inline]
pub fn velocity_to_gain(velocity: u8) -> f32 {
    velocity.min(127) as f32 / 127.0
}

/// Maps a 14-bit pitch-wheel position to -1.0..=1.0 (8192 = centre).
#[inline]
pub fn pitch_wheel_to_bipolar(value: u16) -> f32 {
    (value.min(16383) as f32 - 8192.0) / 8192.0
}
