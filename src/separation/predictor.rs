//! Mask predictor adapter
//!
//! Feeds one patch through a [`MaskPredictor`] and enforces the boundary
//! contract: the mask must have the patch's exact shape and hold finite
//! values in `[0, 1]`. Any failure on this side of the boundary is reported as
//! a model inference error.

use super::tiling::Patch;
use super::traits::MaskPredictor;
use crate::error::{Result, SeparationError};
use crossbeam_channel::{bounded, RecvTimeoutError};
use ndarray::{Array2, ArrayView2};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{trace, warn};

/// Run the predictor on one patch and validate its mask
pub fn predict_mask(predictor: &dyn MaskPredictor, patch: &Patch) -> Result<Array2<f32>> {
    let input = patch.log_magnitude();

    let mask = predictor.predict(input.view()).map_err(|e| match e {
        e @ SeparationError::ModelInference { .. } => e,
        other => SeparationError::inference(format!(
            "{} failed on patch at column {}: {}",
            predictor.name(),
            patch.start,
            other
        )),
    })?;

    validate_mask(&mask, patch)?;
    trace!("Mask predicted for columns {}..{}", patch.start, patch.end());
    Ok(mask)
}

/// Element-wise `patch * mask`
pub fn apply_mask(patch: &Patch, mask: &Array2<f32>) -> Array2<f32> {
    &patch.data * mask
}

fn validate_mask(mask: &Array2<f32>, patch: &Patch) -> Result<()> {
    if mask.dim() != patch.data.dim() {
        return Err(SeparationError::inference(format!(
            "mask shape {:?} does not match patch shape {:?} (patch at column {})",
            mask.dim(),
            patch.data.dim(),
            patch.start
        )));
    }

    if let Some(bad) = mask
        .iter()
        .find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0)
    {
        return Err(SeparationError::inference(format!(
            "mask value {} outside [0, 1] (patch at column {})",
            bad, patch.start
        )));
    }

    Ok(())
}

/// Predictor returning the same mask value everywhere
///
/// `1.0` is the identity mask (everything is vocals), `0.0` silences the
/// vocal stem. Useful as a stand-in when no model is loaded.
#[derive(Debug, Clone, Copy)]
pub struct ConstantMaskPredictor {
    value: f32,
}

impl ConstantMaskPredictor {
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

impl MaskPredictor for ConstantMaskPredictor {
    fn predict(&self, log_magnitude: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        Ok(Array2::from_elem(log_magnitude.dim(), self.value))
    }

    fn name(&self) -> &'static str {
        "constant"
    }
}

/// Enforces a deadline on every call to an inner predictor
///
/// The call runs on a helper thread. If it has not answered within the
/// timeout the patch fails with a model inference error. The helper is left
/// to finish on its own and its late answer is dropped.
///
/// An abandoned helper may still hold the inner predictor (the ORT session
/// sits behind a mutex), so a new call would only queue up behind it and time
/// out as well. While any abandoned helper is still running, calls fail
/// immediately instead of waiting out another deadline.
pub struct DeadlinePredictor {
    inner: Arc<dyn MaskPredictor>,
    timeout: Duration,
    abandoned: Arc<AtomicUsize>,
}

// Per-call handshake between the caller and its helper thread
const CALL_RUNNING: u8 = 0;
const CALL_FINISHED: u8 = 1;
const CALL_ABANDONED: u8 = 2;

impl DeadlinePredictor {
    pub fn new(inner: Arc<dyn MaskPredictor>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            abandoned: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Helper threads given up on that have not returned yet
    pub fn abandoned_calls(&self) -> usize {
        self.abandoned.load(Ordering::Acquire)
    }
}

impl MaskPredictor for DeadlinePredictor {
    fn predict(&self, log_magnitude: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let stalled = self.abandoned_calls();
        if stalled > 0 {
            return Err(SeparationError::inference(format!(
                "{} is still running {} call(s) that exceeded the {:.1}s deadline",
                self.inner.name(),
                stalled,
                self.timeout.as_secs_f64()
            )));
        }

        let input = log_magnitude.to_owned();
        let inner = Arc::clone(&self.inner);
        let abandoned = Arc::clone(&self.abandoned);
        let call_state = Arc::new(AtomicU8::new(CALL_RUNNING));
        let helper_state = Arc::clone(&call_state);
        // Capacity 1 so the helper never blocks on send after we stop waiting
        let (tx, rx) = bounded(1);

        thread::Builder::new()
            .name("mask-predictor".to_string())
            .spawn(move || {
                // Release the abandoned slot even if the predictor panics
                let _finished = CallGuard {
                    state: helper_state,
                    abandoned,
                };
                let result = inner.predict(input.view());
                // Receiver gone means the deadline already passed
                let _ = tx.send(result);
            })
            .map_err(|e| {
                SeparationError::inference(format!("failed to spawn predictor thread: {}", e))
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                // Count before flagging so the helper never decrements first
                self.abandoned.fetch_add(1, Ordering::AcqRel);
                if call_state
                    .compare_exchange(
                        CALL_RUNNING,
                        CALL_ABANDONED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_err()
                {
                    // Helper finished right at the deadline; take its answer
                    self.abandoned.fetch_sub(1, Ordering::AcqRel);
                    return rx.recv().unwrap_or_else(|_| {
                        Err(SeparationError::inference(format!(
                            "{} worker exited without a result",
                            self.inner.name()
                        )))
                    });
                }

                warn!(
                    "{} did not answer within {:.1}s",
                    self.inner.name(),
                    self.timeout.as_secs_f64()
                );
                Err(SeparationError::inference(format!(
                    "{} timed out after {:.1}s",
                    self.inner.name(),
                    self.timeout.as_secs_f64()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SeparationError::inference(format!(
                "{} worker exited without a result",
                self.inner.name()
            ))),
        }
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Marks a helper's call finished when dropped
struct CallGuard {
    state: Arc<AtomicU8>,
    abandoned: Arc<AtomicUsize>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let was_abandoned = self
            .state
            .compare_exchange(
                CALL_RUNNING,
                CALL_FINISHED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err();
        if was_abandoned {
            self.abandoned.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
