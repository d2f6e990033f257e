//! Synthesiser configuration.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default smallest sub-block the renderer splits a block into.
pub const DEFAULT_MINIMUM_SUBDIVISION: usize = 32;

/// Settings of a [`Synthesiser`](crate::Synthesiser).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesiserConfig {
    /// Steal the oldest voice when a note arrives and every voice is busy.
    pub note_stealing: bool,
    /// Smallest number of samples rendered between two MIDI events.
    pub minimum_subdivision: usize,
    /// When false, the first sub-block of a block may be a single sample.
    pub strict_subdivision: bool,
    /// Playback sample rate in Hz (0.0 until the host sets one).
    pub sample_rate: f64,
}

impl Default for SynthesiserConfig {
    fn default() -> Self {
        Self {
            note_stealing: true,
            minimum_subdivision: DEFAULT_MINIMUM_SUBDIVISION,
            strict_subdivision: false,
            sample_rate: 0.0,
        }
    }
}

impl SynthesiserConfig {
    pub fn validate(&self) -> Result<()> {
        if self.minimum_subdivision == 0 {
            return Err(Error::InvalidConfig(
                "minimum_subdivision must be at least 1 sample".into(),
            ));
        }
        if !self.sample_rate.is_finite() || self.sample_rate < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate must be a non-negative number, got {}",
                self.sample_rate
            )));
        }
        Ok(())
    }
}
