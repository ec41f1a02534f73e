use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use image::{Rgb, RgbImage};
use imagine_core::pipeline::{
    GenerationSpec, Pipeline, PipelineError, PipelineFactory, PipelineMode, ProgressFn,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Device;

/// Built-in deterministic pipeline.
///
/// Stands in for a real diffusion backend: it refines a seeded noise
/// field toward a prompt-derived palette over `steps` iterations, so
/// identical requests (seed included) produce byte-identical images and
/// previews show visible convergence. Everything the server cares about
/// (callback cadence, abort handling, resource lifetime) behaves like
/// the real thing.
pub struct ProceduralFactory {
    device: Device,
    full_precision: bool,
}

impl ProceduralFactory {
    pub fn new(device: Device, full_precision: bool) -> Self {
        Self {
            device,
            full_precision,
        }
    }
}

impl PipelineFactory for ProceduralFactory {
    fn load(&self, model: &Path, mode: PipelineMode) -> Result<Box<dyn Pipeline>, PipelineError> {
        if !model.is_file() {
            return Err(PipelineError::ModelLoad {
                path: model.to_path_buf(),
                reason: "file not found".into(),
            });
        }

        log::info!(
            "Loading model: {} for device {:?}, precision {} ({:?})",
            model.display(),
            self.device,
            if self.full_precision { "f32" } else { "f16" },
            mode,
        );

        Ok(Box::new(ProceduralPipeline {
            model_tag: hash_str(&model.display().to_string()),
        }))
    }
}

struct ProceduralPipeline {
    model_tag: u64,
}

impl Pipeline for ProceduralPipeline {
    fn run(
        &mut self,
        spec: &GenerationSpec,
        mut on_step: Option<&mut ProgressFn>,
    ) -> Result<RgbImage, PipelineError> {
        if spec.width == 0 || spec.height == 0 || spec.steps == 0 {
            return Err(PipelineError::Execution(
                "width, height and steps must be positive".into(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(spec.seed);
        let mut noise = RgbImage::new(spec.width, spec.height);
        for pixel in noise.pixels_mut() {
            *pixel = Rgb([rng.r#gen(), rng.r#gen(), rng.r#gen()]);
        }

        // img2img keeps the source visible in proportion to (1 - strength).
        if let Some(source) = &spec.source {
            let keep = 1.0 - spec.strength.clamp(0.0, 1.0);
            for (noisy, src) in noise.pixels_mut().zip(source.pixels()) {
                for c in 0..3 {
                    noisy.0[c] = lerp(noisy.0[c], src.0[c], keep);
                }
            }
        }

        let palette = palette_for(spec, self.model_tag);
        let mut image = noise.clone();

        for step in 1..=spec.steps {
            // Guidance sharpens convergence toward the palette. The
            // denominator keeps t strictly below 1 so the seeded noise
            // (and any img2img source) stays visible in the final frame.
            let t = (step as f32 / (spec.steps + 1) as f32).powf(1.0 + spec.guidance / 20.0);
            for (x, y, pixel) in image.enumerate_pixels_mut() {
                let target = palette[((x / 8 + y / 8) % palette.len() as u32) as usize];
                let start = noise.get_pixel(x, y);
                for c in 0..3 {
                    pixel.0[c] = lerp(start.0[c], target.0[c], t);
                }
            }

            if spec.emits_progress_at(step) {
                if let Some(cb) = on_step.as_deref_mut() {
                    cb(step, image.clone()).map_err(|_| PipelineError::Aborted)?;
                }
            }
        }

        Ok(image)
    }
}

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round().clamp(0.0, 255.0) as u8
}

fn hash_str(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Three-color palette derived from the prompt, model and sampler, with
/// the negative prompt and clip depth perturbing the hue.
fn palette_for(spec: &GenerationSpec, model_tag: u64) -> Vec<Rgb<u8>> {
    let mut hasher = DefaultHasher::new();
    spec.prompt.hash(&mut hasher);
    spec.neg_prompt.hash(&mut hasher);
    spec.sampler.key().hash(&mut hasher);
    spec.clip_skip.hash(&mut hasher);
    model_tag.hash(&mut hasher);
    let mut h = hasher.finish();

    (0..3)
        .map(|_| {
            let color = Rgb([(h & 0xff) as u8, ((h >> 8) & 0xff) as u8, ((h >> 16) & 0xff) as u8]);
            h = h.rotate_right(24).wrapping_mul(0x9e3779b97f4a7c15);
            color
        })
        .collect()
}
