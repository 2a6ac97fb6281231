//! Attachment handling: the on-disk media cache and Ogg/Opus voice-note
//! analysis.

pub mod audio;
pub mod cache;
mod error;

pub use audio::{analyze_ogg_opus, synthesize_waveform, OggAnalysis};
pub use cache::{MediaCache, ResolvedMedia};
pub use error::{MediaError, Result};
