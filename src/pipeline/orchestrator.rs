//! Pipeline orchestration
//!
//! Coordinates file discovery, separation, and stem output. Files are
//! separated one at a time; patch prediction inside a file is parallel.

use crate::audio::{self, WavStemWriter};
use crate::config::Settings;
use crate::discovery::{self, DiscoveredFile};
use crate::error::{FailureStage, Result};
use crate::separation::model::{find_model_path, OrtMaskPredictor};
use crate::separation::{MaskPredictor, RunState, Separator, StemSink};
use crate::types::StemPaths;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Pipeline result summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Run the full separation pipeline with the ONNX mask model
pub fn run(settings: &Settings) -> Result<PipelineResult> {
    // Configuration problems surface before the model is touched
    settings.separation.validate()?;

    if settings.dry_run {
        let files = discover(settings)?;
        return Ok(run_dry_run(&files, settings));
    }

    let model_path = find_model_path(settings.model_path.as_deref())?;
    info!("Using mask model {}", model_path.display());
    let predictor: Arc<dyn MaskPredictor> = Arc::new(OrtMaskPredictor::load(&model_path)?);
    let sink = WavStemWriter::new(&settings.output);

    run_with(settings, predictor, &sink)
}

/// Run the pipeline with an explicit predictor and stem sink
pub fn run_with(
    settings: &Settings,
    predictor: Arc<dyn MaskPredictor>,
    sink: &dyn StemSink,
) -> Result<PipelineResult> {
    let pipeline_start = Instant::now();

    let files = discover(settings)?;
    if files.is_empty() {
        return Ok(PipelineResult::default());
    }

    if settings.dry_run {
        return Ok(run_dry_run(&files, settings));
    }

    // One file gets a per-patch bar, a batch gets a per-file bar
    let per_file_progress = settings.show_progress && files.len() > 1;
    let separator = Separator::new(settings.separation.clone(), predictor)?
        .with_workers(settings.workers)
        .with_progress(settings.show_progress && !per_file_progress);

    info!(
        "Separating {} files with {} (sink: {})",
        files.len(),
        separator_label(&separator),
        sink.name()
    );

    let progress_bar = if per_file_progress {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut result = PipelineResult {
        total: files.len(),
        ..PipelineResult::default()
    };

    for file in &files {
        if let Some(ref pb) = progress_bar {
            pb.set_message(file.base_name());
        }

        let mut state = RunState::Received;
        let outcome = separate_file(file, &separator, sink, &mut state);
        debug!("{} finished in state: {}", file.path.display(), state);

        match outcome {
            Ok(paths) => {
                result.successful += 1;
                info!(
                    "Stems for {}: {}, {}",
                    file.path.display(),
                    paths.vocals.display(),
                    paths.instruments.display()
                );
            }
            Err(e) if e.is_recoverable() => {
                if e.stage() == FailureStage::Decode {
                    warn!("Skipping {}: {}", file.path.display(), e);
                    result.skipped += 1;
                } else {
                    error!("Failed {}: {}", file.path.display(), e);
                    result.failed += 1;
                }
            }
            Err(e) => {
                if let Some(ref pb) = progress_bar {
                    pb.abandon();
                }
                error!("Aborting batch at {}: {}", file.path.display(), e);
                return Err(e);
            }
        }

        if let Some(ref pb) = progress_bar {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Separation complete");
    }

    info!(
        "Total pipeline time: {:.2}s ({} ok, {} failed, {} skipped)",
        pipeline_start.elapsed().as_secs_f64(),
        result.successful,
        result.failed,
        result.skipped
    );

    Ok(result)
}

fn discover(settings: &Settings) -> Result<Vec<DiscoveredFile>> {
    let discovery_start = Instant::now();
    info!("Scanning for audio files...");
    let files = discovery::scan(&settings.input, settings.recursive, Some(&settings.output))?;
    info!(
        "Found {} audio files in {:.2}s",
        files.len(),
        discovery_start.elapsed().as_secs_f64()
    );
    Ok(files)
}

fn separator_label(separator: &Separator) -> String {
    let config = separator.config();
    format!(
        "n_fft={} hop={} patch={}/{}",
        config.n_fft, config.hop_length, config.max_frames, config.overlap
    )
}

/// Decode, separate, and write one file
///
/// The sink only sees a fully reconstructed stem pair, so a failure at any
/// earlier stage writes nothing. `state` ends in `Done` or `Failed`.
fn separate_file(
    file: &DiscoveredFile,
    separator: &Separator,
    sink: &dyn StemSink,
    state: &mut RunState,
) -> Result<StemPaths> {
    let start = Instant::now();
    debug!("Separating: {}", file.path.display());

    let mixture = match audio::decode(&file.path) {
        Ok(mixture) => mixture,
        Err(e) => {
            state.advance(RunState::Failed(format!("{} stage: {}", e.stage(), e)));
            return Err(e);
        }
    };

    let stems = separator.separate_tracked(&mixture, state)?;

    let paths = match sink.write(&file.base_name(), &stems) {
        Ok(paths) => paths,
        Err(e) => {
            state.advance(RunState::Failed(format!("{} stage: {}", e.stage(), e)));
            return Err(e);
        }
    };
    state.advance(RunState::Written);
    state.advance(RunState::Done);

    debug!(
        "Separated {} in {:.2}s",
        file.path.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(paths)
}

/// Dry run mode - show files that would be separated without processing
fn run_dry_run(files: &[DiscoveredFile], settings: &Settings) -> PipelineResult {
    let writer = WavStemWriter::new(&settings.output);

    println!();
    println!("=== DRY RUN MODE ===");
    println!();

    let mut total_bytes = 0u64;
    for file in files {
        let paths = writer.stem_paths(&file.base_name());
        total_bytes += file.size_bytes;
        println!("{} ({:?})", file.path.display(), file.format);
        println!("  -> {}", paths.vocals.display());
        println!("  -> {}", paths.instruments.display());
    }

    println!();
    println!(
        "Would separate {} files ({:.1} MB of input) into {}",
        files.len(),
        total_bytes as f64 / (1024.0 * 1024.0),
        display_dir(&settings.output).display()
    );
    println!();

    PipelineResult {
        total: files.len(),
        successful: 0,
        failed: 0,
        skipped: files.len(), // All "skipped" in dry run mode
    }
}

fn display_dir(path: &std::path::Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
