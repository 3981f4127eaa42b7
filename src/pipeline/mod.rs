//! Batch separation pipeline

pub mod orchestrator;

pub use orchestrator::{run, run_with, PipelineResult};
