//! Stem reconstruction
//!
//! The vocal stem is rebuilt from the averaged vocal magnitude and the phase
//! of the original mixture spectrogram. The instrumental stem is the
//! time-domain residual `mixture - vocals`, both truncated to the shorter
//! length. The subtraction assumes the two waveforms are sample-aligned and
//! makes no attempt to compensate for any offset the transform introduces.

use super::stft::{SpectralTransform, Spectrogram};
use crate::error::{Result, SeparationError};
use crate::types::{StemPair, Waveform};
use ndarray::Array2;
use tracing::debug;

/// Inverse-transform `vocal_magnitude` with the mixture's phase
pub fn reconstruct_vocals(
    transform: &SpectralTransform,
    vocal_magnitude: &Array2<f32>,
    mixture_phase: &Array2<f32>,
    sample_rate: u32,
) -> Result<Waveform> {
    let spectrogram =
        Spectrogram::from_polar(vocal_magnitude, mixture_phase, transform.n_fft(), sample_rate)?;
    let vocals = transform.inverse(&spectrogram)?;

    if vocals.is_empty() {
        return Err(SeparationError::reconstruction(
            "inverse transform produced an empty vocal waveform",
        ));
    }
    Ok(vocals)
}

/// `mixture[i] - vocals[i]` over the shorter of the two lengths
pub fn instrumental_residual(mixture: &Waveform, vocals: &Waveform) -> Result<Waveform> {
    if mixture.sample_rate != vocals.sample_rate {
        return Err(SeparationError::reconstruction(format!(
            "mixture ({} Hz) and vocals ({} Hz) have different sample rates",
            mixture.sample_rate, vocals.sample_rate
        )));
    }

    let len = mixture.len().min(vocals.len());
    if len == 0 {
        return Err(SeparationError::reconstruction(
            "nothing to subtract: mixture or vocal waveform is empty",
        ));
    }

    let samples: Vec<f32> = mixture.samples[..len]
        .iter()
        .zip(&vocals.samples[..len])
        .map(|(m, v)| m - v)
        .collect();

    let instruments = Waveform::new(samples, mixture.sample_rate);
    if !instruments.is_finite() {
        return Err(SeparationError::reconstruction(
            "instrumental residual contains non-finite samples",
        ));
    }
    Ok(instruments)
}

/// Build both stems from the averaged vocal magnitude
pub fn reconstruct_stems(
    transform: &SpectralTransform,
    vocal_magnitude: &Array2<f32>,
    mixture_phase: &Array2<f32>,
    mixture: &Waveform,
) -> Result<StemPair> {
    let vocals = reconstruct_vocals(transform, vocal_magnitude, mixture_phase, mixture.sample_rate)?;
    let instruments = instrumental_residual(mixture, &vocals)?;

    debug!(
        "Reconstructed stems: mixture {} samples, vocals {}, instruments {}",
        mixture.len(),
        vocals.len(),
        instruments.len()
    );

    Ok(StemPair {
        vocals,
        instruments,
    })
}
