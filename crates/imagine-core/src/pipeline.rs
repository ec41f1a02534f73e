use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

use crate::Sampler;

/// Returned by a progress callback to abort the run in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

/// Progress callback handed to a pipeline run.
///
/// Invoked with the 1-based step index and a decoded preview of the
/// partial state. An `Err(Aborted)` return obliges the pipeline to stop
/// and surface [`PipelineError::Aborted`] from `run`.
pub type ProgressFn<'a> = dyn FnMut(u32, RgbImage) -> Result<(), Aborted> + 'a;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load model '{path}': {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("generation aborted")]
    Aborted,
    #[error("generation failed: {0}")]
    Execution(String),
}

/// Text-to-image vs. image-to-image pipeline variant, selected by the
/// presence of a source image in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    TextToImage,
    ImageToImage,
}

/// Fully validated parameters for one generation run.
#[derive(Debug, Clone)]
pub struct GenerationSpec {
    pub prompt: String,
    pub neg_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance: f32,
    pub sampler: Sampler,
    pub seed: u64,
    /// Decoded source image, already resized to width x height.
    pub source: Option<RgbImage>,
    pub strength: f32,
    pub clip_skip: u32,
    /// Invoke the progress callback every N steps; `None` disables it.
    pub stream: Option<u32>,
}

impl GenerationSpec {
    pub fn mode(&self) -> PipelineMode {
        if self.source.is_some() {
            PipelineMode::ImageToImage
        } else {
            PipelineMode::TextToImage
        }
    }

    /// Steps at which the progress callback fires, given interval `k`:
    /// every k-th completed step except the last one, whose checkpoint
    /// is the final record itself.
    pub fn emits_progress_at(&self, step: u32) -> bool {
        match self.stream {
            Some(k) if k > 0 => step % k == 0 && step != self.steps,
            _ => false,
        }
    }
}

/// One loaded model executing a single generation run.
///
/// The synthesis backend behind this trait is opaque to the rest of the
/// system; the server only relies on the callback contract above.
pub trait Pipeline: Send {
    fn run(
        &mut self,
        spec: &GenerationSpec,
        on_step: Option<&mut ProgressFn>,
    ) -> Result<RgbImage, PipelineError>;
}

/// Loads a pipeline for a resolved model file.
pub trait PipelineFactory: Send + Sync {
    fn load(&self, model: &Path, mode: PipelineMode) -> Result<Box<dyn Pipeline>, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(steps: u32, stream: Option<u32>) -> GenerationSpec {
        GenerationSpec {
            prompt: "x".into(),
            neg_prompt: String::new(),
            width: 64,
            height: 64,
            steps,
            guidance: 7.0,
            sampler: Sampler::default(),
            seed: 1,
            source: None,
            strength: 0.8,
            clip_skip: 1,
            stream,
        }
    }

    #[test]
    fn test_progress_cadence_floor() {
        let s = spec(10, Some(3));
        let fired: Vec<u32> = (1..=10).filter(|&i| s.emits_progress_at(i)).collect();
        assert_eq!(fired, vec![3, 6, 9]);
    }

    #[test]
    fn test_no_progress_when_interval_exceeds_steps() {
        let s = spec(10, Some(10));
        assert!((1..=10).all(|i| !s.emits_progress_at(i)));

        let s = spec(10, Some(15));
        assert!((1..=10).all(|i| !s.emits_progress_at(i)));
    }

    #[test]
    fn test_no_progress_without_stream() {
        let s = spec(10, None);
        assert!((1..=10).all(|i| !s.emits_progress_at(i)));
    }
}
