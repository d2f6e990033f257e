//! Tolerance constants for audio testing.

/// Floating point rounding errors (for accumulation, exact gain).
/// Use for operations that should be mathematically exact.
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Silence threshold (~-80dB).
/// Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;

/// Minimum RMS of a block where at least one sine voice plays.
pub const AUDIBLE_RMS: f32 = 0.01;
