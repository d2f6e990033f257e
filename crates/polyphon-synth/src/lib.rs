//! Polyphonic voice pool for polyphon.
//!
//! A [`Synthesiser`] owns a set of [`Voice`]s and a list of [`Sound`]s and
//! turns MIDI events into note starts and stops on those voices.
//!
//! # Features
//!
//! - **Allocation**: idle voices first, then oldest-voice stealing
//! - **Pedals**: sustain and sostenuto per channel, soft pedal tracking
//! - **Rendering**: blocks split at MIDI event offsets for sample accuracy
//! - **MPE**: [`MpeSynthesiser`] drives a renderer from per-note expression (feature: `mpe`)
//!
//! # Example
//!
//! ```ignore
//! use polyphon_synth::{KeyRangeSound, Synthesiser};
//!
//! let mut synth = Synthesiser::new();
//! synth.set_current_playback_sample_rate(48000.0);
//! for _ in 0..8 {
//!     synth.add_voice(Box::new(MyVoice::default()));
//! }
//! synth.add_sound(KeyRangeSound::full_range().into_ref());
//!
//! synth.render_next_block(&mut output, &midi_events, 0, block_size);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
#[cfg(feature = "mpe")]
pub mod mpe;
mod render;
pub mod sound;
pub mod synthesiser;
pub mod voice;


pub use config::{SynthesiserConfig, DEFAULT_MINIMUM_SUBDIVISION};
#[cfg(feature = "mpe")]
pub use mpe::{MpeRenderer, MpeSynthesiser};
pub use sound::{KeyRangeSound, Sound, SoundRef};
pub use synthesiser::Synthesiser;
pub use voice::{Voice, VoicePlayback, VoiceSlot, VoiceState};
