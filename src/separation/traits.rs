//! Separation trait abstractions
//!
//! These traits define the collaborator boundaries of the separation core.
//! The mask model and the stem persistence layer can both be swapped without
//! touching the pipeline.

use crate::error::Result;
use crate::types::{StemPair, StemPaths};
use ndarray::{Array2, ArrayView2};

/// Soft-mask prediction backend
pub trait MaskPredictor: Send + Sync {
    /// Predict a vocal mask for one patch
    ///
    /// # Arguments
    /// * `log_magnitude` - `log1p` of the patch magnitudes, shaped `(bins, max_frames)`
    ///
    /// # Returns
    /// A same-shaped array of vocal energy fractions in `[0, 1]`
    fn predict(&self, log_magnitude: ArrayView2<'_, f32>) -> Result<Array2<f32>>;

    /// Get the name of this predictor (for logging)
    fn name(&self) -> &'static str;
}

/// Stem persistence backend
pub trait StemSink: Send + Sync {
    /// Persist both stems of one separated input
    ///
    /// # Arguments
    /// * `base_name` - Name of the source, used to derive stem names
    /// * `stems` - Fully computed vocal and instrumental waveforms
    fn write(&self, base_name: &str, stems: &StemPair) -> Result<StemPaths>;

    /// Get the name of this sink (for logging)
    fn name(&self) -> &'static str;
}
