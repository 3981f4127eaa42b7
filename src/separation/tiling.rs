//! Magnitude tiling into fixed-width overlapping patches
//!
//! The mask model takes a fixed `(bins, max_frames)` input. A long
//! spectrogram is cut into full-width patches advancing by
//! `step = max_frames - overlap` columns. Once a full patch no longer fits, one
//! remainder patch covers the columns that are left. It is zero-padded on the
//! right to the full width and flagged so only its `valid_width` real columns
//! are accumulated.

use crate::config::SeparationConfig;
use crate::error::{Result, SeparationError};
use ndarray::{s, Array2, ArrayView2};

/// Patch geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileConfig {
    /// Patch width in columns
    pub max_frames: usize,
    /// Columns shared by consecutive patches
    pub overlap: usize,
}

impl TileConfig {
    pub fn new(max_frames: usize, overlap: usize) -> Result<Self> {
        if max_frames == 0 || overlap >= max_frames {
            return Err(SeparationError::invalid_input(format!(
                "patch width {} with overlap {} leaves no forward step",
                max_frames, overlap
            )));
        }
        Ok(Self {
            max_frames,
            overlap,
        })
    }

    /// Columns advanced per patch (always > 0)
    pub fn step(&self) -> usize {
        self.max_frames - self.overlap
    }
}

impl TryFrom<&SeparationConfig> for TileConfig {
    type Error = SeparationError;

    fn try_from(config: &SeparationConfig) -> Result<Self> {
        TileConfig::new(config.max_frames, config.overlap)
    }
}

/// One model input: a `(bins, max_frames)` crop of the magnitude spectrogram
#[derive(Debug, Clone)]
pub struct Patch {
    /// First spectrogram column covered
    pub start: usize,
    /// Magnitudes, always exactly `max_frames` wide
    pub data: Array2<f32>,
    /// True for the zero-padded remainder patch
    pub is_padded: bool,
    /// Leading columns that hold real data
    pub valid_width: usize,
}

impl Patch {
    /// One past the last real column covered
    pub fn end(&self) -> usize {
        self.start + self.valid_width
    }

    /// Model input: element-wise `log1p` of the magnitudes
    pub fn log_magnitude(&self) -> Array2<f32> {
        self.data.mapv(f32::ln_1p)
    }
}

/// Splits one magnitude spectrogram into patches
#[derive(Debug, Clone)]
pub struct PatchTiler<'a> {
    magnitude: ArrayView2<'a, f32>,
    config: TileConfig,
}

impl<'a> PatchTiler<'a> {
    pub fn new(magnitude: ArrayView2<'a, f32>, config: TileConfig) -> Self {
        Self { magnitude, config }
    }

    pub fn total_columns(&self) -> usize {
        self.magnitude.ncols()
    }

    /// A fresh pass over the patches, starting at column 0
    pub fn patches(&self) -> Patches<'a> {
        Patches {
            magnitude: self.magnitude,
            config: self.config,
            start: 0,
            finished: false,
        }
    }

    /// Number of patches `patches()` yields
    pub fn patch_count(&self) -> usize {
        let total = self.total_columns();
        let max = self.config.max_frames;
        let step = self.config.step();
        let full = if total >= max { (total - max) / step + 1 } else { 0 };
        full + usize::from(full * step < total)
    }
}

/// Lazy patch sequence produced by [`PatchTiler::patches`]
#[derive(Debug, Clone)]
pub struct Patches<'a> {
    magnitude: ArrayView2<'a, f32>,
    config: TileConfig,
    start: usize,
    finished: bool,
}

impl Iterator for Patches<'_> {
    type Item = Patch;

    fn next(&mut self) -> Option<Patch> {
        if self.finished {
            return None;
        }

        let total = self.magnitude.ncols();
        let max = self.config.max_frames;
        let start = self.start;

        if start + max <= total {
            self.start += self.config.step();
            return Some(Patch {
                start,
                data: self.magnitude.slice(s![.., start..start + max]).to_owned(),
                is_padded: false,
                valid_width: max,
            });
        }

        self.finished = true;
        if start >= total {
            return None;
        }

        let valid_width = total - start;
        let mut data = Array2::<f32>::zeros((self.magnitude.nrows(), max));
        data.slice_mut(s![.., ..valid_width])
            .assign(&self.magnitude.slice(s![.., start..]));

        Some(Patch {
            start,
            data,
            is_padded: true,
            valid_width,
        })
    }
}
