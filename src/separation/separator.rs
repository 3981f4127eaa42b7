//! Mask-based vocal separator
//!
//! Runs one waveform through transform, tiling, mask prediction, overlap
//! accumulation and reconstruction. Patches may be predicted on a bounded
//! worker pool. Accumulation always happens on the calling thread in patch
//! order, so the shared sum/count buffers see serialized writes.

use super::accumulator::OverlapAccumulator;
use super::predictor::{predict_mask, DeadlinePredictor};
use super::reconstruct::reconstruct_stems;
use super::stft::SpectralTransform;
use super::tiling::{Patch, PatchTiler, TileConfig};
use super::traits::MaskPredictor;
use crate::config::SeparationConfig;
use crate::error::{Result, SeparationError};
use crate::types::{StemPair, Waveform};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Lifecycle of one separation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Received,
    Transformed,
    Predicting { done: usize, total: usize },
    Accumulated,
    Reconstructed,
    Written,
    Done,
    Failed(String),
}

impl RunState {
    /// Move to `next`, logging the transition
    pub fn advance(&mut self, next: RunState) {
        debug!("Run state: {} -> {}", self, next);
        *self = next;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Received => write!(f, "received"),
            RunState::Transformed => write!(f, "transformed"),
            RunState::Predicting { done, total } => write!(f, "predicting {}/{}", done, total),
            RunState::Accumulated => write!(f, "accumulated"),
            RunState::Reconstructed => write!(f, "reconstructed"),
            RunState::Written => write!(f, "written"),
            RunState::Done => write!(f, "done"),
            RunState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Vocal / instrumental separator for mono waveforms
pub struct Separator {
    config: SeparationConfig,
    tiles: TileConfig,
    transform: SpectralTransform,
    predictor: Arc<dyn MaskPredictor>,
    workers: usize,
    show_progress: bool,
}

impl Separator {
    /// Create a separator; every predictor call is bounded by the configured timeout
    pub fn new(config: SeparationConfig, predictor: Arc<dyn MaskPredictor>) -> Result<Self> {
        config.validate()?;
        let tiles = TileConfig::try_from(&config)?;
        let transform = SpectralTransform::new(config.n_fft, config.hop_length)?;
        let predictor: Arc<dyn MaskPredictor> =
            Arc::new(DeadlinePredictor::new(predictor, config.model_timeout));

        Ok(Self {
            config,
            tiles,
            transform,
            predictor,
            workers: 1,
            show_progress: false,
        })
    }

    /// Predict up to `workers` patches concurrently
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Show a progress bar over patches
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    pub fn transform(&self) -> &SpectralTransform {
        &self.transform
    }

    /// Separate one mixture into vocals and instrumental residual
    pub fn separate(&self, mixture: &Waveform) -> Result<StemPair> {
        let mut state = RunState::Received;
        self.separate_tracked(mixture, &mut state)
    }

    /// Like [`separate`](Self::separate), recording progress in `state`
    ///
    /// On failure `state` ends in [`RunState::Failed`] naming the stage.
    pub fn separate_tracked(&self, mixture: &Waveform, state: &mut RunState) -> Result<StemPair> {
        let result = self.run_stages(mixture, state);
        if let Err(e) = &result {
            error!("Separation failed during {} stage: {}", e.stage(), e);
            state.advance(RunState::Failed(format!("{} stage: {}", e.stage(), e)));
        }
        result
    }

    fn run_stages(&self, mixture: &Waveform, state: &mut RunState) -> Result<StemPair> {
        let start = Instant::now();

        if mixture.is_empty() {
            return Err(SeparationError::invalid_input("mixture waveform is empty"));
        }
        if mixture.sample_rate == 0 {
            return Err(SeparationError::invalid_input("sample rate must be positive"));
        }
        if !mixture.is_finite() {
            return Err(SeparationError::invalid_input(
                "mixture waveform contains non-finite samples",
            ));
        }

        let spectrogram = self.transform.forward(mixture)?;
        let magnitude = spectrogram.magnitude();
        let phase = spectrogram.phase();
        drop(spectrogram);
        state.advance(RunState::Transformed);

        info!(
            "Separating {:.2}s of audio ({} bins x {} frames)",
            mixture.duration(),
            magnitude.nrows(),
            magnitude.ncols()
        );

        let vocal_magnitude = self.predict_vocal_magnitude(&magnitude, state)?;
        state.advance(RunState::Accumulated);

        let stems = reconstruct_stems(&self.transform, &vocal_magnitude, &phase, mixture)?;
        state.advance(RunState::Reconstructed);

        info!(
            "Separation finished in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Ok(stems)
    }

    /// Tile, predict and average the vocal magnitude for a full spectrogram
    pub fn predict_vocal_magnitude(
        &self,
        magnitude: &Array2<f32>,
        state: &mut RunState,
    ) -> Result<Array2<f32>> {
        let tiler = PatchTiler::new(magnitude.view(), self.tiles);
        let total = tiler.patch_count();
        let mut accumulator = OverlapAccumulator::new(magnitude.nrows(), magnitude.ncols());
        let progress_bar = self.progress_bar(total);

        debug!(
            "Predicting {} patches ({} frames, step {}) with {} worker(s) using {}",
            total,
            self.tiles.max_frames,
            self.tiles.step(),
            self.workers,
            self.predictor.name()
        );
        state.advance(RunState::Predicting { done: 0, total });

        if self.workers <= 1 {
            for (done, patch) in tiler.patches().enumerate() {
                let mask = predict_mask(self.predictor.as_ref(), &patch)?;
                accumulator.accumulate(&patch, &mask)?;
                *state = RunState::Predicting { done: done + 1, total };
                if let Some(ref pb) = progress_bar {
                    pb.inc(1);
                }
            }
        } else {
            let patches: Vec<Patch> = tiler.patches().collect();
            let masks = self.predict_parallel(&patches, progress_bar.as_ref())?;
            for (patch, mask) in patches.iter().zip(masks.iter()) {
                accumulator.accumulate(patch, mask)?;
            }
            *state = RunState::Predicting { done: total, total };
        }

        if let Some(pb) = progress_bar {
            pb.finish_and_clear();
        }

        Ok(accumulator.finalize())
    }

    fn predict_parallel(
        &self,
        patches: &[Patch],
        progress_bar: Option<&ProgressBar>,
    ) -> Result<Vec<Array2<f32>>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("patch-worker-{}", i))
            .build()
            .map_err(|e| {
                SeparationError::Config(format!("Failed to build prediction pool: {}", e))
            })?;

        let predictor = self.predictor.as_ref();
        pool.install(|| {
            patches
                .par_iter()
                .map(|patch| {
                    let mask = predict_mask(predictor, patch);
                    if let Some(pb) = progress_bar {
                        pb.inc(1);
                    }
                    mask
                })
                .collect::<Result<Vec<_>>>()
        })
    }

    fn progress_bar(&self, total: usize) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} patches {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Some(pb)
    }
}
