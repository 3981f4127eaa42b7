//! Core data types for vocalsplit
//!
//! These types represent the domain model and flow through the pipeline.

use std::path::PathBuf;

// =============================================================================
// Audio buffer types
// =============================================================================

/// Mono audio samples with their sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Mono samples, nominally in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        // Guard against division by zero - use 0 duration for invalid sample rate
        if self.sample_rate > 0 {
            self.samples.len() as f64 / self.sample_rate as f64
        } else {
            0.0
        }
    }

    /// True if every sample is a finite number
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }
}

/// The two separated stems of one mixture, sharing its sample rate
#[derive(Debug, Clone)]
pub struct StemPair {
    pub vocals: Waveform,
    pub instruments: Waveform,
}

impl StemPair {
    pub fn sample_rate(&self) -> u32 {
        self.vocals.sample_rate
    }
}

/// Paths to written stem files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemPaths {
    pub vocals: PathBuf,
    pub instruments: PathBuf,
}

// =============================================================================
// Supported formats
// =============================================================================

/// Audio formats accepted as separation input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Aiff,
    Ogg,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "wav" => Some(AudioFormat::Wav),
            "mp3" => Some(AudioFormat::Mp3),
            "flac" => Some(AudioFormat::Flac),
            "aiff" | "aif" => Some(AudioFormat::Aiff),
            "ogg" => Some(AudioFormat::Ogg),
            _ => None,
        }
    }

    /// Check if a path has a supported extension
    pub fn is_supported_path(path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .is_some()
    }
}
