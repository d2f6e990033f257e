//! Error types for the MIDI subsystem.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Overlapping MPE zones: lower zone has {lower} member channels, upper zone has {upper}")]
    OverlappingZones { lower: u8, upper: u8 },
}

impl From<midi_msg::ParseError> for Error {
    fn from(e: midi_msg::ParseError) -> Self {
        Error::MidiParse(format!("{e:?}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
