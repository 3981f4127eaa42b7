//! STFT (Short-Time Fourier Transform) for mask-based separation
//!
//! The forward transform frames the waveform without centering or padding:
//! a signal of `L >= n_fft` samples yields `floor((L - n_fft) / hop) + 1`
//! frames of `n_fft / 2 + 1` bins. Any padding the model needs is done by the
//! tiler on magnitude data, never here.
//!
//! # Reconstruction
//!
//! The inverse is a weighted overlap-add with the same Hann window, normalized
//! by the per-sample sum of squared windows. For an unmodified spectrogram it
//! reproduces the input exactly (up to float rounding) over
//! `n_fft + (frames - 1) * hop` samples, so the output is shorter than the
//! input by `(L - n_fft) mod hop` samples. The first and last few samples,
//! where the squared window sum falls below `1e-8`, cannot be recovered and
//! are left unnormalized.

use crate::error::{Result, SeparationError};
use crate::types::Waveform;
use ndarray::{Array2, Zip};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Squared window sums below this are treated as uncovered
const WINDOW_SUM_FLOOR: f32 = 1e-8;

/// Complex spectrogram of a mono signal, indexed `[bin, frame]`
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    data: Array2<Complex32>,
    n_fft: usize,
    sample_rate: u32,
}

impl Spectrogram {
    /// Wrap complex data produced with the given window size
    pub fn new(data: Array2<Complex32>, n_fft: usize, sample_rate: u32) -> Result<Self> {
        if data.nrows() != n_fft / 2 + 1 {
            return Err(SeparationError::reconstruction(format!(
                "spectrogram has {} bins, expected {} for n_fft={}",
                data.nrows(),
                n_fft / 2 + 1,
                n_fft
            )));
        }
        Ok(Self {
            data,
            n_fft,
            sample_rate,
        })
    }

    /// Build a spectrogram from polar components: `mag * exp(i * phase)`
    pub fn from_polar(
        magnitude: &Array2<f32>,
        phase: &Array2<f32>,
        n_fft: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if magnitude.dim() != phase.dim() {
            return Err(SeparationError::reconstruction(format!(
                "magnitude shape {:?} does not match phase shape {:?}",
                magnitude.dim(),
                phase.dim()
            )));
        }
        let data = Zip::from(magnitude)
            .and(phase)
            .map_collect(|&m, &p| Complex32::from_polar(m, p));
        Self::new(data, n_fft, sample_rate)
    }

    /// Number of frequency bins (`n_fft / 2 + 1`)
    pub fn bins(&self) -> usize {
        self.data.nrows()
    }

    /// Number of time frames
    pub fn frames(&self) -> usize {
        self.data.ncols()
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn data(&self) -> &Array2<Complex32> {
        &self.data
    }

    /// Non-negative magnitude view, same shape
    pub fn magnitude(&self) -> Array2<f32> {
        self.data.mapv(|c| c.norm())
    }

    /// Phase in (-pi, pi], same shape
    pub fn phase(&self) -> Array2<f32> {
        self.data.mapv(|c| {
            let angle = c.arg();
            if angle <= -PI {
                angle + 2.0 * PI
            } else {
                angle
            }
        })
    }
}

/// Forward/inverse transform pair sharing one window and FFT plan
pub struct SpectralTransform {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    forward_fft: Arc<dyn Fft<f32>>,
    inverse_fft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("n_fft", &self.n_fft)
            .field("hop_length", &self.hop_length)
            .finish()
    }
}

impl SpectralTransform {
    pub fn new(n_fft: usize, hop_length: usize) -> Result<Self> {
        if n_fft == 0 || hop_length == 0 {
            return Err(SeparationError::invalid_input(format!(
                "n_fft ({}) and hop_length ({}) must be positive",
                n_fft, hop_length
            )));
        }
        if n_fft % 2 != 0 {
            return Err(SeparationError::invalid_input(format!(
                "n_fft must be even, got {}",
                n_fft
            )));
        }

        let mut planner = FftPlanner::new();
        Ok(Self {
            n_fft,
            hop_length,
            window: hann_window(n_fft),
            forward_fft: planner.plan_fft_forward(n_fft),
            inverse_fft: planner.plan_fft_inverse(n_fft),
        })
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Frequency bins per frame
    pub fn freq_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Frames produced for a waveform of `len` samples (`len > 0`)
    ///
    /// Signals shorter than one window are zero-padded to a single frame.
    pub fn frame_count(&self, len: usize) -> usize {
        len.saturating_sub(self.n_fft) / self.hop_length + 1
    }

    /// Samples produced by the inverse for `frames` frames
    pub fn output_len(&self, frames: usize) -> usize {
        if frames == 0 {
            return 0;
        }
        self.n_fft + (frames - 1) * self.hop_length
    }

    /// Time -> frequency
    pub fn forward(&self, waveform: &Waveform) -> Result<Spectrogram> {
        if waveform.is_empty() {
            return Err(SeparationError::invalid_input("waveform is empty"));
        }
        if waveform.sample_rate == 0 {
            return Err(SeparationError::invalid_input("sample rate must be positive"));
        }

        let samples = &waveform.samples;
        let bins = self.freq_bins();
        let num_frames = self.frame_count(samples.len());
        let mut data = Array2::<Complex32>::zeros((bins, num_frames));
        let mut buffer = vec![Complex32::new(0.0, 0.0); self.n_fft];

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.hop_length;

            // Windowed frame, zero beyond the end of a short signal
            for (i, (slot, &w)) in buffer.iter_mut().zip(self.window.iter()).enumerate() {
                let sample = samples.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex32::new(sample * w, 0.0);
            }

            self.forward_fft.process(&mut buffer);

            // Keep only positive frequencies (DC .. Nyquist)
            for (bin, value) in buffer[..bins].iter().enumerate() {
                data[[bin, frame_idx]] = *value;
            }
        }

        Spectrogram::new(data, self.n_fft, waveform.sample_rate)
    }

    /// Frequency -> time
    pub fn inverse(&self, spectrogram: &Spectrogram) -> Result<Waveform> {
        let bins = self.freq_bins();
        if spectrogram.n_fft() != self.n_fft || spectrogram.bins() != bins {
            return Err(SeparationError::reconstruction(format!(
                "spectrogram was built for n_fft={} ({} bins), transform uses n_fft={}",
                spectrogram.n_fft(),
                spectrogram.bins(),
                self.n_fft
            )));
        }
        if spectrogram.frames() == 0 {
            return Err(SeparationError::reconstruction("spectrogram has no frames"));
        }

        let output_length = self.output_len(spectrogram.frames());
        let mut output = vec![0.0f32; output_length];
        let mut window_sum = vec![0.0f32; output_length];
        let mut buffer = vec![Complex32::new(0.0, 0.0); self.n_fft];
        let scale = 1.0 / self.n_fft as f32;

        for (frame_idx, frame) in spectrogram.data().columns().into_iter().enumerate() {
            let start = frame_idx * self.hop_length;

            // Rebuild the full conjugate-symmetric spectrum
            for (i, &c) in frame.iter().enumerate() {
                buffer[i] = c;
            }
            for i in 1..bins - 1 {
                buffer[self.n_fft - i] = frame[i].conj();
            }

            self.inverse_fft.process(&mut buffer);

            for (i, &w) in self.window.iter().enumerate() {
                output[start + i] += buffer[i].re * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, &ws) in output.iter_mut().zip(window_sum.iter()) {
            if ws > WINDOW_SUM_FLOOR {
                *sample /= ws;
            }
        }

        let waveform = Waveform::new(output, spectrogram.sample_rate());
        if !waveform.is_finite() {
            return Err(SeparationError::reconstruction(
                "inverse transform produced non-finite samples",
            ));
        }
        Ok(waveform)
    }
}

/// One-shot forward transform
pub fn forward(waveform: &Waveform, n_fft: usize, hop_length: usize) -> Result<Spectrogram> {
    SpectralTransform::new(n_fft, hop_length)?.forward(waveform)
}

/// One-shot inverse transform, window size taken from the spectrogram
pub fn inverse(spectrogram: &Spectrogram, hop_length: usize) -> Result<Waveform> {
    SpectralTransform::new(spectrogram.n_fft(), hop_length)?.inverse(spectrogram)
}

/// Periodic Hann window of given size
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}
