//! Overlap accumulation of masked patch magnitudes
//!
//! Every patch adds its masked magnitudes into a full-length sum buffer and
//! bumps a per-column contribution count. Finalizing divides each column by
//! `max(count, 1)`, which is the mean of all predictions for that column.
//! Padding columns of the remainder patch never touch the buffer, so the
//! count array is always exactly as long as the spectrogram.

use super::predictor::apply_mask;
use super::tiling::Patch;
use crate::error::{Result, SeparationError};
use ndarray::{s, Array2, ArrayView2, Axis};

/// Running sums and per-column counts for one spectrogram
#[derive(Debug, Clone)]
pub struct OverlapAccumulator {
    sums: Array2<f32>,
    counts: Vec<u32>,
}

impl OverlapAccumulator {
    /// Zeroed buffer for a `(bins, total_columns)` spectrogram
    pub fn new(bins: usize, total_columns: usize) -> Self {
        Self {
            sums: Array2::zeros((bins, total_columns)),
            counts: vec![0; total_columns],
        }
    }

    pub fn bins(&self) -> usize {
        self.sums.nrows()
    }

    pub fn total_columns(&self) -> usize {
        self.counts.len()
    }

    /// Contributions received per column so far
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Add the first `valid_width` columns of `masked` starting at `start`
    ///
    /// Columns past the end of the spectrogram are dropped.
    pub fn add(&mut self, start: usize, masked: ArrayView2<'_, f32>, valid_width: usize) -> Result<()> {
        if masked.nrows() != self.bins() {
            return Err(SeparationError::reconstruction(format!(
                "patch has {} bins, accumulation buffer has {}",
                masked.nrows(),
                self.bins()
            )));
        }

        let end = (start + valid_width.min(masked.ncols())).min(self.total_columns());
        if end <= start {
            return Ok(());
        }
        let width = end - start;

        let mut target = self.sums.slice_mut(s![.., start..end]);
        target += &masked.slice(s![.., ..width]);
        for count in &mut self.counts[start..end] {
            *count += 1;
        }
        Ok(())
    }

    /// Mask a patch and add its real columns
    pub fn accumulate(&mut self, patch: &Patch, mask: &Array2<f32>) -> Result<()> {
        let masked = apply_mask(patch, mask);
        self.add(patch.start, masked.view(), patch.valid_width)
    }

    /// Per-column mean of all contributions
    pub fn finalize(self) -> Array2<f32> {
        let Self { mut sums, counts } = self;
        for (mut column, &count) in sums.axis_iter_mut(Axis(1)).zip(counts.iter()) {
            let divisor = count.max(1) as f32;
            if divisor > 1.0 {
                column.mapv_inplace(|v| v / divisor);
            }
        }
        sums
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::separation::tiling::{PatchTiler, TileConfig};

    #[test]
    fn test_single_contribution_unchanged() {
        let mut acc = OverlapAccumulator::new(2, 4);
        let values = Array2::from_shape_vec((2, 4), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
        acc.add(0, values.view(), 4).unwrap();
        assert_eq!(acc.counts(), &[1, 1, 1, 1]);
        assert_eq!(acc.finalize(), values);
    }

    #[test]
    fn test_overlap_is_averaged() {
        let mut acc = OverlapAccumulator::new(1, 6);
        acc.add(0, Array2::from_elem((1, 4), 2.0).view(), 4).unwrap();
        acc.add(2, Array2::from_elem((1, 4), 4.0).view(), 4).unwrap();
        assert_eq!(acc.counts(), &[1, 1, 2, 2, 1, 1]);

        let out = acc.finalize();
        assert_eq!(out.row(0).to_vec(), vec![2.0, 2.0, 3.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn test_padding_columns_ignored() {
        let mut acc = OverlapAccumulator::new(1, 5);
        // Remainder patch: 2 real columns, 6 padded, starting at column 3
        acc.add(3, Array2::from_elem((1, 8), 1.0).view(), 2).unwrap();
        assert_eq!(acc.counts(), &[0, 0, 0, 1, 1]);
        assert_eq!(acc.counts().len(), 5);
    }

    #[test]
    fn test_uncovered_columns_stay_zero() {
        let acc = OverlapAccumulator::new(2, 3);
        let out = acc.finalize();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_bin_mismatch_rejected() {
        let mut acc = OverlapAccumulator::new(3, 4);
        let err = acc.add(0, Array2::<f32>::zeros((2, 4)).view(), 4).unwrap_err();
        assert!(matches!(err, SeparationError::Reconstruction { .. }));
    }

    #[test]
    fn test_identity_mask_recovers_magnitude() {
        let mag = Array2::from_shape_fn((3, 23), |(b, c)| (b as f32 + 1.0) * (c as f32 + 0.5));
        let tiler = PatchTiler::new(mag.view(), TileConfig::new(8, 3).unwrap());
        let mut acc = OverlapAccumulator::new(3, 23);
        for patch in tiler.patches() {
            let ones = Array2::ones(patch.data.dim());
            acc.accumulate(&patch, &ones).unwrap();
        }
        assert!(acc.counts().iter().all(|&c| c >= 1));

        let out = acc.finalize();
        for (a, b) in out.iter().zip(mag.iter()) {
            assert!((a - b).abs() < 1e-4, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_mean_of_distinct_predictions() {
        // width 4, overlap 2 on 6 columns: patches at 0, 2 full, remainder at 4
        let mag = Array2::from_elem((1, 6), 10.0);
        let tiler = PatchTiler::new(mag.view(), TileConfig::new(4, 2).unwrap());
        let mut acc = OverlapAccumulator::new(1, 6);
        let mask_values = [0.2, 0.4, 0.6];
        for (patch, &m) in tiler.patches().zip(mask_values.iter()) {
            acc.accumulate(&patch, &Array2::from_elem(patch.data.dim(), m)).unwrap();
        }
        assert_eq!(acc.counts(), &[1, 1, 2, 2, 2, 2]);

        let out = acc.finalize();
        let expected = [2.0, 2.0, 3.0, 3.0, 5.0, 5.0];
        for (a, b) in out.row(0).iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_zero_mask_silences_magnitude() {
        let mag = Array2::from_elem((2, 10), 3.0);
        let tiler = PatchTiler::new(mag.view(), TileConfig::new(4, 1).unwrap());
        let mut acc = OverlapAccumulator::new(2, 10);
        for patch in tiler.patches() {
            acc.accumulate(&patch, &Array2::zeros(patch.data.dim())).unwrap();
        }
        assert!(acc.finalize().iter().all(|&v| v == 0.0));
    }
}
