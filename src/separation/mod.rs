//! Vocal separation core
//!
//! Magnitude-mask separation of a mono mixture into vocals and an
//! instrumental residual:
//!
//! waveform -> STFT -> patches -> mask predictor -> overlap average ->
//! inverse STFT (original phase) -> vocals, and mixture - vocals -> instruments.

pub mod accumulator;
pub mod model;
pub mod predictor;
pub mod reconstruct;
pub mod separator;
pub mod stft;
pub mod tiling;
pub mod traits;

pub use accumulator::OverlapAccumulator;
pub use model::OrtMaskPredictor;
pub use predictor::{ConstantMaskPredictor, DeadlinePredictor};
pub use separator::{RunState, Separator};
pub use stft::{SpectralTransform, Spectrogram};
pub use tiling::{Patch, PatchTiler, TileConfig};
pub use traits::{MaskPredictor, StemSink};
