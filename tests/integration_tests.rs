//! Integration tests for the vocalsplit pipeline
//!
//! These tests run the full decode -> separate -> write path on synthesized
//! WAV files, with deterministic mask predictors standing in for the model.

use ndarray::{Array2, ArrayView2};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vocalsplit::audio::WavStemWriter;
use vocalsplit::config::{SeparationConfig, Settings};
use vocalsplit::separation::{ConstantMaskPredictor, MaskPredictor};
use vocalsplit::{pipeline, SeparationError};

/// Generate a sine wave WAV file for testing
///
/// Creates a mono 16-bit WAV file at the specified path.
fn generate_sine_wav(path: &Path, frequency_hz: f32, duration_secs: f32, sample_rate: u32) {
    use std::f32::consts::PI;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV file");

    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let amplitude = 0.5f32; // 50% amplitude to avoid clipping

    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;
        let sample = (2.0 * PI * frequency_hz * t).sin() * amplitude;
        let sample_i16 = (sample * 32767.0) as i16;
        writer.write_sample(sample_i16).expect("Failed to write sample");
    }

    writer.finalize().expect("Failed to finalize WAV");
}

/// Read a WAV file back as i16 samples
fn read_wav(path: &Path) -> (hound::WavSpec, Vec<i16>) {
    let reader = hound::WavReader::open(path).expect("Failed to open stem");
    let spec = reader.spec();
    let samples = reader
        .into_samples::<i16>()
        .map(|s| s.expect("Failed to read sample"))
        .collect();
    (spec, samples)
}

fn create_test_settings(input: &Path, output: &Path) -> Settings {
    Settings {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        model_path: None,
        separation: SeparationConfig {
            model_timeout: Duration::from_secs(30),
            ..SeparationConfig::default()
        },
        workers: 2,
        recursive: false,
        show_progress: false,
        dry_run: false,
    }
}

fn stem_files(output: &Path) -> Vec<PathBuf> {
    match fs::read_dir(output) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

struct FailingPredictor;

impl MaskPredictor for FailingPredictor {
    fn predict(&self, _log_magnitude: ArrayView2<'_, f32>) -> vocalsplit::Result<Array2<f32>> {
        Err(SeparationError::inference("model crashed"))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

struct WrongShapePredictor;

impl MaskPredictor for WrongShapePredictor {
    fn predict(&self, log_magnitude: ArrayView2<'_, f32>) -> vocalsplit::Result<Array2<f32>> {
        let (bins, frames) = log_magnitude.dim();
        Ok(Array2::from_elem((bins, frames / 2), 0.5))
    }

    fn name(&self) -> &'static str {
        "wrong-shape"
    }
}

#[test]
fn test_pipeline_writes_both_stems() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let out = output_dir.path().join("stems");

    generate_sine_wav(&input_dir.path().join("tone.wav"), 440.0, 3.0, 22050);

    let settings = create_test_settings(input_dir.path(), &out);
    let sink = WavStemWriter::new(&out);
    let result =
        pipeline::run_with(&settings, Arc::new(ConstantMaskPredictor::new(0.5)), &sink).unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.successful, 1);
    assert_eq!(result.failed, 0);

    let (vocal_spec, vocals) = read_wav(&out.join("vocals_tone.wav"));
    let (inst_spec, instruments) = read_wav(&out.join("instruments_tone.wav"));

    assert_eq!(vocal_spec.sample_rate, 22050);
    assert_eq!(inst_spec.sample_rate, 22050);
    assert_eq!(vocal_spec.channels, 1);

    // 66150 input samples -> 255 frames -> 1024 + 254 * 256 samples
    assert_eq!(vocals.len(), 66048);
    assert_eq!(instruments.len(), vocals.len());
    assert!(66150 - vocals.len() < 256);
}

#[test]
fn test_half_mask_splits_mixture_evenly() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();

    generate_sine_wav(&input_dir.path().join("mix.wav"), 330.0, 3.0, 22050);

    let settings = create_test_settings(input_dir.path(), output_dir.path());
    let sink = WavStemWriter::new(output_dir.path());
    pipeline::run_with(&settings, Arc::new(ConstantMaskPredictor::new(0.5)), &sink).unwrap();

    let (_, vocals) = read_wav(&output_dir.path().join("vocals_mix.wav"));
    let (_, instruments) = read_wav(&output_dir.path().join("instruments_mix.wav"));

    // Skip the edge frames where the window sum is incomplete
    let interior = 1024..vocals.len() - 1024;
    let peak = vocals[interior.clone()].iter().map(|s| s.unsigned_abs()).max().unwrap();
    assert!(peak > 7000, "vocal stem should carry half the tone, peak {}", peak);
    for i in interior {
        let (v, inst) = (vocals[i], instruments[i]);
        assert!(
            (v as i32 - inst as i32).abs() <= 4,
            "sample {}: vocals {} vs instruments {}",
            i,
            v,
            inst
        );
    }
}

#[test]
fn test_identity_mask_leaves_silent_instruments() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();

    generate_sine_wav(&input_dir.path().join("voice.wav"), 220.0, 2.0, 16000);

    let settings = create_test_settings(input_dir.path(), output_dir.path());
    let sink = WavStemWriter::new(output_dir.path());
    pipeline::run_with(&settings, Arc::new(ConstantMaskPredictor::new(1.0)), &sink).unwrap();

    let (spec, instruments) = read_wav(&output_dir.path().join("instruments_voice.wav"));
    assert_eq!(spec.sample_rate, 16000);
    let residual = instruments[1024..instruments.len() - 1024]
        .iter()
        .map(|s| s.unsigned_abs())
        .max()
        .unwrap();
    assert!(residual <= 4, "residual too loud: {}", residual);
}

#[test]
fn test_failing_predictor_writes_nothing() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let out = output_dir.path().join("stems");

    generate_sine_wav(&input_dir.path().join("tone.wav"), 440.0, 2.0, 22050);

    let settings = create_test_settings(input_dir.path(), &out);
    let sink = WavStemWriter::new(&out);
    let result = pipeline::run_with(&settings, Arc::new(FailingPredictor), &sink).unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.successful, 0);
    assert_eq!(result.failed, 1);
    assert!(stem_files(&out).is_empty(), "no stem may be written on failure");
}

#[test]
fn test_wrong_mask_shape_fails_file() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();

    generate_sine_wav(&input_dir.path().join("tone.wav"), 440.0, 2.0, 22050);

    let settings = create_test_settings(input_dir.path(), output_dir.path());
    let sink = WavStemWriter::new(output_dir.path());
    let result = pipeline::run_with(&settings, Arc::new(WrongShapePredictor), &sink).unwrap();

    assert_eq!(result.failed, 1);
    assert!(stem_files(output_dir.path()).is_empty());
}

#[test]
fn test_output_failure_leaves_no_partial_stems() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();

    generate_sine_wav(&input_dir.path().join("tone.wav"), 440.0, 1.0, 22050);
    // Occupy the instruments stem name so only the second stem can fail
    fs::create_dir(output_dir.path().join("instruments_tone.wav")).unwrap();

    let settings = create_test_settings(input_dir.path(), output_dir.path());
    let sink = WavStemWriter::new(output_dir.path());
    let err = pipeline::run_with(&settings, Arc::new(ConstantMaskPredictor::new(0.5)), &sink)
        .unwrap_err();

    assert!(matches!(err, SeparationError::Output { .. }));
    let leftovers: Vec<_> = stem_files(output_dir.path())
        .into_iter()
        .filter(|p| p.is_file())
        .collect();
    assert!(leftovers.is_empty(), "partial stems left behind: {:?}", leftovers);
}

#[test]
fn test_pipeline_handles_empty_directory() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();

    let settings = create_test_settings(input_dir.path(), output_dir.path());
    let sink = WavStemWriter::new(output_dir.path());
    let result =
        pipeline::run_with(&settings, Arc::new(ConstantMaskPredictor::new(0.5)), &sink).unwrap();

    assert_eq!(result.total, 0);
    assert_eq!(result.successful, 0);
}

#[test]
fn test_pipeline_multiple_files() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();

    for (name, freq) in [("a", 220.0), ("b", 440.0), ("c", 880.0)] {
        generate_sine_wav(&input_dir.path().join(format!("{}.wav", name)), freq, 1.5, 22050);
    }

    let settings = create_test_settings(input_dir.path(), output_dir.path());
    let sink = WavStemWriter::new(output_dir.path());
    let result =
        pipeline::run_with(&settings, Arc::new(ConstantMaskPredictor::new(0.5)), &sink).unwrap();

    assert_eq!(result.total, 3);
    assert_eq!(result.successful, 3);
    for name in ["a", "b", "c"] {
        assert!(output_dir.path().join(format!("vocals_{}.wav", name)).exists());
        assert!(output_dir.path().join(format!("instruments_{}.wav", name)).exists());
    }
}

#[test]
fn test_handles_invalid_audio_data() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();

    fs::write(
        input_dir.path().join("corrupted.wav"),
        b"This is not a valid WAV file content!!!!!",
    )
    .unwrap();
    generate_sine_wav(&input_dir.path().join("good.wav"), 440.0, 1.0, 22050);

    let settings = create_test_settings(input_dir.path(), output_dir.path());
    let sink = WavStemWriter::new(output_dir.path());
    let result =
        pipeline::run_with(&settings, Arc::new(ConstantMaskPredictor::new(0.5)), &sink).unwrap();

    assert_eq!(result.total, 2);
    assert_eq!(result.successful, 1);
    assert_eq!(result.skipped, 1);
    assert!(!output_dir.path().join("vocals_corrupted.wav").exists());
}

#[test]
fn test_handles_nonexistent_input_gracefully() {
    let output_dir = TempDir::new().unwrap();
    let settings = create_test_settings(Path::new("/nonexistent/path/to/music"), output_dir.path());
    let sink = WavStemWriter::new(output_dir.path());

    let err = pipeline::run_with(&settings, Arc::new(ConstantMaskPredictor::new(0.5)), &sink)
        .unwrap_err();
    assert!(matches!(err, SeparationError::FileNotFound(_)));
}

#[test]
fn test_earlier_stems_are_not_reseparated() {
    let input_dir = TempDir::new().unwrap();
    let out = input_dir.path().join("stems");

    generate_sine_wav(&input_dir.path().join("tone.wav"), 440.0, 1.0, 22050);

    let mut settings = create_test_settings(input_dir.path(), &out);
    settings.recursive = true;
    let sink = WavStemWriter::new(&out);
    let predictor: Arc<dyn MaskPredictor> = Arc::new(ConstantMaskPredictor::new(0.5));

    let first = pipeline::run_with(&settings, predictor.clone(), &sink).unwrap();
    let second = pipeline::run_with(&settings, predictor, &sink).unwrap();

    assert_eq!(first.total, 1);
    assert_eq!(second.total, 1);
    assert_eq!(stem_files(&out).len(), 2);
}

#[test]
fn test_dry_run_writes_nothing() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let out = output_dir.path().join("stems");

    generate_sine_wav(&input_dir.path().join("tone.wav"), 440.0, 1.0, 22050);

    let mut settings = create_test_settings(input_dir.path(), &out);
    settings.dry_run = true;
    let result = pipeline::run(&settings).unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.skipped, 1);
    assert!(!out.exists());
}

#[test]
fn test_invalid_config_is_rejected_before_work() {
    let input_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();

    generate_sine_wav(&input_dir.path().join("tone.wav"), 440.0, 1.0, 22050);

    let mut settings = create_test_settings(input_dir.path(), output_dir.path());
    settings.separation.overlap = settings.separation.max_frames;
    let sink = WavStemWriter::new(output_dir.path());

    let err = pipeline::run_with(&settings, Arc::new(ConstantMaskPredictor::new(0.5)), &sink)
        .unwrap_err();
    assert!(matches!(err, SeparationError::InvalidInput { .. }));
    assert!(stem_files(output_dir.path()).is_empty());
}
