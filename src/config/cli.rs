//! CLI argument parsing and configuration

use clap::Parser;
use std::path::PathBuf;

/// vocalsplit - Offline vocal / instrumental separation
///
/// Splits each input mixture into a vocal stem and an instrumental residual
/// using a spectrogram mask predictor. Writes two mono WAV files per input.
#[derive(Parser, Debug)]
#[command(name = "vocalsplit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Input path (file or directory)
    #[arg(short, long, value_name = "PATH")]
    pub input: PathBuf,

    /// Output directory for the stem files
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Path to the ONNX mask model (searched in standard locations if omitted)
    #[arg(long, value_name = "FILE", env = "VOCALSPLIT_MODEL_PATH")]
    pub model: Option<PathBuf>,

    /// FFT window size in samples
    #[arg(long, default_value_t = 1024, env = "VOCALSPLIT_N_FFT")]
    pub n_fft: usize,

    /// Hop between analysis frames in samples
    #[arg(long, default_value_t = 256, env = "VOCALSPLIT_HOP_LENGTH")]
    pub hop_length: usize,

    /// Patch width in spectrogram frames
    #[arg(long, default_value_t = 512, env = "VOCALSPLIT_MAX_FRAMES")]
    pub max_frames: usize,

    /// Frames shared by consecutive patches
    #[arg(long, default_value_t = 64, env = "VOCALSPLIT_OVERLAP")]
    pub overlap: usize,

    /// Deadline for a single model call, in seconds
    #[arg(long, default_value_t = 120, env = "VOCALSPLIT_MODEL_TIMEOUT_SECS")]
    pub model_timeout: u64,

    /// Number of patch prediction workers (defaults to CPU count - 1)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Scan subdirectories recursively
    #[arg(short, long, default_value = "false")]
    pub recursive: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress progress bars)
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,

    /// Dry run - show files that would be separated without processing
    #[arg(long, default_value = "false")]
    pub dry_run: bool,
}

impl Cli {
    /// Get the log filter based on verbosity flags
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
