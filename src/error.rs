//! Unified error types for vocalsplit
//!
//! Error strategy:
//! - Per-file errors (decode, bad input, inference, reconstruction): the
//!   file yields no stems, the batch continues with the next file
//! - System errors (output, configuration, missing model): fatal, abort batch
//!
//! All errors include actionable suggestions where possible.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Supported audio formats for helpful error messages
pub const SUPPORTED_FORMATS: &str = "WAV, MP3, FLAC, AIFF, OGG";

/// Top-level error type for vocalsplit operations
#[derive(Debug, Error)]
pub enum SeparationError {
    // =========================================================================
    // Per-run errors - the file is skipped, nothing is written for it
    // =========================================================================
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Model inference failed: {reason}\n  Tip: Check that the model was exported for the configured patch shape (bins x max_frames)")]
    ModelInference { reason: String },

    #[error("Reconstruction failed: {reason}")]
    Reconstruction { reason: String },

    #[error("Failed to decode audio file '{path}': {reason}\n  Supported formats: {SUPPORTED_FORMATS}\n  Tip: If the file plays in other apps, it may be corrupted or use an unsupported codec")]
    Decode { path: PathBuf, reason: String },

    #[error("Unsupported audio format for '{path}': {format}\n  Supported formats: {SUPPORTED_FORMATS}")]
    UnsupportedFormat { path: PathBuf, format: String },

    #[error("File not found: '{0}'\n  Tip: Check the path exists and is accessible")]
    FileNotFound(PathBuf),

    // =========================================================================
    // Fatal errors - abort entire batch
    // =========================================================================
    #[error("Mask predictor unavailable: {reason}\n\n  To enable separation:\n  1. Export the vocal separator U-Net to ONNX (vocal_separator_unet.onnx)\n  2. Set environment variable:\n     export VOCALSPLIT_MODEL_PATH=/path/to/vocal_separator_unet.onnx\n  3. Build with the model runtime:\n     cargo build --release --features onnx")]
    ModelUnavailable { reason: String },

    #[error("Cannot write output to '{path}': {reason}\n  Tip: Check write permissions for the output directory")]
    Output { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for vocalsplit operations
pub type Result<T> = std::result::Result<T, SeparationError>;

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Decode,
    Validation,
    Prediction,
    Reconstruction,
    Output,
    Setup,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::Decode => "decode",
            FailureStage::Validation => "validation",
            FailureStage::Prediction => "mask prediction",
            FailureStage::Reconstruction => "reconstruction",
            FailureStage::Output => "output",
            FailureStage::Setup => "setup",
        };
        f.write_str(name)
    }
}

impl SeparationError {
    /// Returns true if this error is recoverable (skip file, continue batch)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SeparationError::InvalidInput { .. }
                | SeparationError::ModelInference { .. }
                | SeparationError::Reconstruction { .. }
                | SeparationError::Decode { .. }
                | SeparationError::UnsupportedFormat { .. }
                | SeparationError::FileNotFound(_)
        )
    }

    /// The pipeline stage this error originated from
    pub fn stage(&self) -> FailureStage {
        match self {
            SeparationError::InvalidInput { .. } => FailureStage::Validation,
            SeparationError::ModelInference { .. } => FailureStage::Prediction,
            SeparationError::Reconstruction { .. } => FailureStage::Reconstruction,
            SeparationError::Decode { .. }
            | SeparationError::UnsupportedFormat { .. }
            | SeparationError::FileNotFound(_) => FailureStage::Decode,
            SeparationError::Output { .. } | SeparationError::Io(_) => FailureStage::Output,
            SeparationError::ModelUnavailable { .. } | SeparationError::Config(_) => {
                FailureStage::Setup
            }
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        SeparationError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Create a model inference error
    pub fn inference(reason: impl Into<String>) -> Self {
        SeparationError::ModelInference {
            reason: reason.into(),
        }
    }

    /// Create a reconstruction error
    pub fn reconstruction(reason: impl Into<String>) -> Self {
        SeparationError::Reconstruction {
            reason: reason.into(),
        }
    }

    /// Create a decode error with context about the issue
    pub fn decode_error(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SeparationError::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an output error, checking for common issues
    pub fn output_error(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        let reason = match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                format!("Permission denied. Check that you have write access to {}", path.display())
            }
            std::io::ErrorKind::NotFound => {
                format!("Directory does not exist: {}", path.parent().map(|p| p.display().to_string()).unwrap_or_default())
            }
            _ => err.to_string(),
        };
        SeparationError::Output { path, reason }
    }

    /// Create a model unavailable error when the runtime is not compiled in
    pub fn model_feature_disabled() -> Self {
        SeparationError::ModelUnavailable {
            reason: "ONNX Runtime support not compiled in".to_string(),
        }
    }
}
