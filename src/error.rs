//! Centralized error type for the polyphon umbrella crate.
//!
//! Wraps the subsystem errors so `?` propagates across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("MIDI: {0}")]
    Midi(#[from] polyphon_midi::Error),

    #[error("Synth: {0}")]
    Synth(#[from] polyphon_synth::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
