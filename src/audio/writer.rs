//! WAV stem writer
//!
//! Persists a separated stem pair as two mono 16-bit WAV files named
//! `vocals_<base>.wav` and `instruments_<base>.wav`.

use crate::error::{Result, SeparationError};
use crate::separation::StemSink;
use crate::types::{StemPair, StemPaths, Waveform};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writes stems into one output directory
#[derive(Debug, Clone)]
pub struct WavStemWriter {
    output_dir: PathBuf,
}

impl WavStemWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Paths the stems of `base_name` are written to
    pub fn stem_paths(&self, base_name: &str) -> StemPaths {
        StemPaths {
            vocals: self.output_dir.join(format!("vocals_{}.wav", base_name)),
            instruments: self.output_dir.join(format!("instruments_{}.wav", base_name)),
        }
    }
}

impl StemSink for WavStemWriter {
    /// Both stems are staged as hidden `.tmp` siblings and only renamed into
    /// place once both have been finalized. On any error every file this call
    /// created is removed, so a failed write leaves no stem behind.
    fn write(&self, base_name: &str, stems: &StemPair) -> Result<StemPaths> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| SeparationError::output_error(&self.output_dir, e))?;

        let paths = self.stem_paths(base_name);
        let staged = StemPaths {
            vocals: staging_path(&paths.vocals),
            instruments: staging_path(&paths.instruments),
        };

        let written = write_mono_wav(&staged.vocals, &stems.vocals)
            .and_then(|()| write_mono_wav(&staged.instruments, &stems.instruments));
        if let Err(e) = written {
            remove_quietly(&[staged.vocals.as_path(), staged.instruments.as_path()]);
            return Err(e);
        }

        if let Err(e) = std::fs::rename(&staged.vocals, &paths.vocals) {
            remove_quietly(&[staged.vocals.as_path(), staged.instruments.as_path()]);
            return Err(SeparationError::output_error(&paths.vocals, e));
        }
        if let Err(e) = std::fs::rename(&staged.instruments, &paths.instruments) {
            remove_quietly(&[staged.instruments.as_path(), paths.vocals.as_path()]);
            return Err(SeparationError::output_error(&paths.instruments, e));
        }

        Ok(paths)
    }

    fn name(&self) -> &'static str {
        "wav"
    }
}

/// Hidden sibling `.<name>.tmp` a stem is staged in before the rename
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

fn remove_quietly(paths: &[&Path]) {
    for path in paths {
        if path.is_file() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Could not remove partial stem {}: {}", path.display(), e);
            }
        }
    }
}

/// Write mono audio to a 16-bit WAV file
pub fn write_mono_wav(path: &Path, audio: &Waveform) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| SeparationError::Output {
            path: path.to_path_buf(),
            reason: format!("Failed to create WAV file: {}", e),
        })?;

    for sample in &audio.samples {
        let value = (*sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer
            .write_sample(value)
            .map_err(|e| SeparationError::Output {
                path: path.to_path_buf(),
                reason: format!("Failed to write sample: {}", e),
            })?;
    }

    writer.finalize().map_err(|e| SeparationError::Output {
        path: path.to_path_buf(),
        reason: format!("Failed to finalize WAV: {}", e),
    })?;

    debug!("Wrote stem to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stem_names() {
        let writer = WavStemWriter::new("/out");
        let paths = writer.stem_paths("song");
        assert_eq!(paths.vocals, PathBuf::from("/out/vocals_song.wav"));
        assert_eq!(paths.instruments, PathBuf::from("/out/instruments_song.wav"));
    }

    #[test]
    fn test_write_creates_both_files() {
        let dir = TempDir::new().unwrap();
        let writer = WavStemWriter::new(dir.path().join("stems"));
        let stems = StemPair {
            vocals: Waveform::new(vec![0.5, -0.5, 0.25], 22050),
            instruments: Waveform::new(vec![0.1, 0.2, 0.3], 22050),
        };

        let paths = writer.write("mix", &stems).unwrap();
        let reader = hound::WavReader::open(&paths.vocals).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![16383, -16383, 8191]);
        assert!(paths.instruments.exists());
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        let staged = staging_path(Path::new("/out/vocals_song.wav"));
        assert_eq!(staged, PathBuf::from("/out/.vocals_song.wav.tmp"));
    }

    #[test]
    fn test_failed_write_leaves_no_stems() {
        let dir = TempDir::new().unwrap();
        let writer = WavStemWriter::new(dir.path());
        // A directory squatting on the instruments name makes its rename fail
        std::fs::create_dir(dir.path().join("instruments_mix.wav")).unwrap();
        let stems = StemPair {
            vocals: Waveform::new(vec![0.5; 64], 22050),
            instruments: Waveform::new(vec![0.25; 64], 22050),
        };

        let err = writer.write("mix", &stems).unwrap_err();
        assert!(matches!(err, SeparationError::Output { .. }));
        assert!(!dir.path().join("vocals_mix.wav").exists());
        assert!(!dir.path().join(".vocals_mix.wav.tmp").exists());
        assert!(!dir.path().join(".instruments_mix.wav.tmp").exists());
    }

    #[test]
    fn test_clipping_is_clamped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loud.wav");
        write_mono_wav(&path, &Waveform::new(vec![2.0, -2.0], 8000)).unwrap();
        let samples: Vec<i16> = hound::WavReader::open(&path)
            .unwrap()
            .into_samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(samples, vec![32767, -32768]);
    }
}
