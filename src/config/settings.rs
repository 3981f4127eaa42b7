//! Runtime configuration settings

use crate::error::{Result, SeparationError};
use std::path::PathBuf;
use std::time::Duration;

/// Transform and tiling constants for one separation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparationConfig {
    /// FFT window size (samples)
    pub n_fft: usize,
    /// Hop between analysis frames (samples)
    pub hop_length: usize,
    /// Patch width in spectrogram columns
    pub max_frames: usize,
    /// Columns shared between consecutive patches
    pub overlap: usize,
    /// Deadline for one mask predictor call
    pub model_timeout: Duration,
}

impl SeparationConfig {
    /// Frequency bins produced by the forward transform
    pub fn freq_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Columns advanced per patch
    pub fn step(&self) -> usize {
        self.max_frames.saturating_sub(self.overlap)
    }

    /// Reject configurations the tiler or transform cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.n_fft == 0 || self.hop_length == 0 || self.max_frames == 0 {
            return Err(SeparationError::invalid_input(format!(
                "n_fft ({}), hop_length ({}) and max_frames ({}) must be positive",
                self.n_fft, self.hop_length, self.max_frames
            )));
        }
        if self.n_fft % 2 != 0 {
            return Err(SeparationError::invalid_input(format!(
                "n_fft must be even, got {}",
                self.n_fft
            )));
        }
        if self.hop_length > self.n_fft {
            return Err(SeparationError::invalid_input(format!(
                "hop_length ({}) larger than n_fft ({}) leaves gaps between frames",
                self.hop_length, self.n_fft
            )));
        }
        if self.overlap >= self.max_frames {
            return Err(SeparationError::invalid_input(format!(
                "overlap ({}) must be smaller than max_frames ({})",
                self.overlap, self.max_frames
            )));
        }
        if self.model_timeout.is_zero() {
            return Err(SeparationError::invalid_input(
                "model timeout must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            n_fft: 1024,
            hop_length: 256,
            max_frames: 512,
            overlap: 64,
            model_timeout: Duration::from_secs(120),
        }
    }
}

/// Runtime settings for the separation pipeline
#[derive(Debug, Clone)]
pub struct Settings {
    /// Input path (file or directory)
    pub input: PathBuf,
    /// Output directory for stems
    pub output: PathBuf,
    /// Explicit model path (otherwise searched)
    pub model_path: Option<PathBuf>,
    /// Transform and tiling constants
    pub separation: SeparationConfig,
    /// Number of patch prediction workers
    pub workers: usize,
    /// Scan recursively
    pub recursive: bool,
    /// Show progress bars
    pub show_progress: bool,
    /// Dry run mode - show files without processing
    pub dry_run: bool,
}

impl Settings {
    /// Create settings from CLI arguments
    pub fn from_cli(cli: &super::cli::Cli) -> Self {
        let default_workers = num_cpus::get().saturating_sub(1).max(1);

        Self {
            input: cli.input.clone(),
            output: cli.output.clone(),
            model_path: cli.model.clone(),
            separation: SeparationConfig {
                n_fft: cli.n_fft,
                hop_length: cli.hop_length,
                max_frames: cli.max_frames,
                overlap: cli.overlap,
                model_timeout: Duration::from_secs(cli.model_timeout),
            },
            workers: cli.threads.unwrap_or(default_workers).max(1),
            recursive: cli.recursive,
            show_progress: !cli.quiet,
            dry_run: cli.dry_run,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input: PathBuf::from("."),
            output: PathBuf::from("./stems"),
            model_path: None,
            separation: SeparationConfig::default(),
            workers: num_cpus::get().saturating_sub(1).max(1),
            recursive: false,
            show_progress: true,
            dry_run: false,
        }
    }
}
