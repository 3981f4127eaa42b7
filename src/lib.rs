//! vocalsplit - Offline Vocal / Instrumental Separation
//!
//! Splits a mono mixture into a vocal stem and an instrumental residual by
//! predicting a magnitude mask over fixed-width spectrogram patches.
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! - `config`: CLI argument parsing and runtime settings
//! - `discovery`: Input file scanning
//! - `audio`: Decoding with symphonia and WAV stem output
//! - `separation`: STFT, patch tiling, mask prediction, overlap averaging, reconstruction
//! - `pipeline`: Batch orchestration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vocalsplit::config::SeparationConfig;
//! use vocalsplit::separation::{ConstantMaskPredictor, Separator};
//! use vocalsplit::Waveform;
//!
//! let separator = Separator::new(
//!     SeparationConfig::default(),
//!     Arc::new(ConstantMaskPredictor::new(0.5)),
//! )
//! .expect("valid config");
//! let mixture = Waveform::new(vec![0.0; 22050], 22050);
//! let stems = separator.separate(&mixture).expect("separation failed");
//! println!("{} vocal samples", stems.vocals.len());
//! ```

pub mod audio;
pub mod config;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod separation;
pub mod types;

// Re-export key types at crate root
pub use error::{Result, SeparationError};
pub use types::{StemPair, StemPaths, Waveform};
