//! Vocal mask model management
//!
//! Locates the exported U-Net and wraps it in an ONNX Runtime session.
//! Model resolution checks multiple common locations automatically.

use super::traits::MaskPredictor;
use crate::error::{Result, SeparationError};
use directories::ProjectDirs;
use ndarray::{Array2, ArrayView2};
use std::path::{Path, PathBuf};
#[cfg(feature = "onnx")]
use std::sync::Mutex;
#[cfg(not(feature = "onnx"))]
use tracing::debug;
#[cfg(feature = "onnx")]
use tracing::info;

#[cfg(feature = "onnx")]
use ort::session::Session;

/// Model filename looked up in every search location
pub const MODEL_FILENAME: &str = "vocal_separator_unet.onnx";

/// Environment variable overriding the model location
pub const MODEL_PATH_ENV: &str = "VOCALSPLIT_MODEL_PATH";

/// Check for user-provided model path via environment variable
pub fn get_user_model_path() -> Option<PathBuf> {
    std::env::var(MODEL_PATH_ENV).ok().map(PathBuf::from)
}

/// Find the model file by checking multiple common locations
///
/// Search order:
/// 1. Explicit path (from `--model`)
/// 2. VOCALSPLIT_MODEL_PATH environment variable
/// 3. ProjectDirs cache: ~/.cache/vocalsplit/models/ (Linux)
///    or ~/Library/Caches/com.vocalsplit.vocalsplit/models/ (macOS)
/// 4. ProjectDirs data: ~/.local/share/vocalsplit/models/ (Linux XDG)
/// 5. Current directory: ./models/vocal_separator_unet.onnx
///
/// Returns the first existing model path found, or an error listing all checked locations.
pub fn find_model_path(explicit: Option<&Path>) -> Result<PathBuf> {
    let mut checked_locations: Vec<String> = Vec::new();

    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        checked_locations.push(format!("--model {}", path.display()));
    }

    if let Some(env_path) = get_user_model_path() {
        if env_path.is_file() {
            return Ok(env_path);
        }
        checked_locations.push(format!("{}={}", MODEL_PATH_ENV, env_path.display()));
    }

    if let Some(proj_dirs) = ProjectDirs::from("com", "vocalsplit", "vocalsplit") {
        let cache_path = proj_dirs.cache_dir().join("models").join(MODEL_FILENAME);
        if cache_path.is_file() {
            return Ok(cache_path);
        }
        checked_locations.push(cache_path.display().to_string());

        let data_path = proj_dirs.data_dir().join("models").join(MODEL_FILENAME);
        if data_path.is_file() {
            return Ok(data_path);
        }
        checked_locations.push(data_path.display().to_string());
    }

    let cwd_path = PathBuf::from("./models").join(MODEL_FILENAME);
    if cwd_path.is_file() {
        return Ok(cwd_path.canonicalize().unwrap_or(cwd_path));
    }
    checked_locations.push(cwd_path.display().to_string());

    let locations_list = checked_locations
        .iter()
        .map(|loc| format!("  - {}", loc))
        .collect::<Vec<_>>()
        .join("\n");

    Err(SeparationError::ModelUnavailable {
        reason: format!("model not found.\n\n  Locations checked:\n{}", locations_list),
    })
}

/// Mask predictor running the exported U-Net through ONNX Runtime
///
/// The model takes `[1, 1, bins, frames]` log-magnitudes and returns a
/// sigmoid mask of the same shape.
pub struct OrtMaskPredictor {
    model_path: PathBuf,
    /// ORT session (wrapped in Mutex for interior mutability)
    #[cfg(feature = "onnx")]
    session: Mutex<Session>,
    #[cfg(feature = "onnx")]
    input_name: String,
}

impl OrtMaskPredictor {
    /// Load the model with the CPU execution provider
    #[cfg(feature = "onnx")]
    pub fn load(model_path: &Path) -> Result<Self> {
        use ort::execution_providers::CPUExecutionProvider;

        let session = Session::builder()
            .map_err(|e| SeparationError::ModelUnavailable {
                reason: format!("Failed to create ORT session builder: {}", e),
            })?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| SeparationError::ModelUnavailable {
                reason: format!("Failed to configure CPU provider: {}", e),
            })?
            .commit_from_file(model_path)
            .map_err(|e| SeparationError::ModelUnavailable {
                reason: format!("Failed to load model '{}': {}", model_path.display(), e),
            })?;

        // Fail explicitly if model has no inputs
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| SeparationError::ModelUnavailable {
                reason: "Model has no input tensors defined".to_string(),
            })?;

        info!("Mask model loaded from {}", model_path.display());

        Ok(Self {
            model_path: model_path.to_path_buf(),
            session: Mutex::new(session),
            input_name,
        })
    }

    #[cfg(not(feature = "onnx"))]
    pub fn load(model_path: &Path) -> Result<Self> {
        debug!(
            "Cannot load {}: built without the onnx feature",
            model_path.display()
        );
        Err(SeparationError::model_feature_disabled())
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl MaskPredictor for OrtMaskPredictor {
    #[cfg(feature = "onnx")]
    fn predict(&self, log_magnitude: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        use ort::value::Tensor;

        let (bins, frames) = log_magnitude.dim();

        // Prepare input tensor: shape (batch=1, channels=1, bins, frames)
        let input = log_magnitude
            .to_owned()
            .into_shape_with_order((1, 1, bins, frames))
            .map_err(|e| SeparationError::inference(format!("Failed to shape input: {}", e)))?;

        let input_tensor = Tensor::from_array(input).map_err(|e| {
            SeparationError::inference(format!("Failed to create input tensor: {}", e))
        })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| SeparationError::inference("Failed to acquire session lock"))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| SeparationError::inference(format!("Inference failed: {}", e)))?;

        let output = outputs
            .iter()
            .next()
            .map(|(_, v)| v)
            .ok_or_else(|| SeparationError::inference("No output tensor from model"))?;

        let (output_shape, output_data) = output.try_extract_tensor::<f32>().map_err(|e| {
            SeparationError::inference(format!("Failed to extract output tensor: {}", e))
        })?;

        // Validate output shape: expect exactly (batch=1, channels=1, bins, frames)
        let shape: Vec<i64> = output_shape.iter().copied().collect();
        let expected = [1, 1, bins as i64, frames as i64];
        if shape != expected {
            return Err(SeparationError::inference(format!(
                "Expected output shape {:?}, got {:?}",
                expected, shape
            )));
        }

        Array2::from_shape_vec((bins, frames), output_data.to_vec()).map_err(|e| {
            SeparationError::inference(format!("Output buffer does not match shape: {}", e))
        })
    }

    #[cfg(not(feature = "onnx"))]
    fn predict(&self, _log_magnitude: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        Err(SeparationError::model_feature_disabled())
    }

    fn name(&self) -> &'static str {
        "unet-ort"
    }
}
