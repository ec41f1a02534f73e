use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat};
use imagine_core::record::ImageRecord;
use imagine_core::request::{GenerationRequest, Seed};
use serde_json::json;

use crate::RunArgs;
use crate::client::Client;

/// Denoising strength for the refinement pass; low enough to keep the
/// composition of the base image.
const HIRES_STRENGTH: f32 = 0.35;

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    if let Some(factor) = args.hires {
        check_hires_factor(factor)?;
    }

    let prompt = args.prompt.join(" ");
    let seed = args.seed.unwrap_or_else(rand::random);

    let img = match &args.img {
        Some(path) => {
            let source = image::open(path)
                .with_context(|| format!("failed to open input image {}", path.display()))?;
            Some(encode_png(&source)?)
        }
        None => None,
    };

    let request = GenerationRequest {
        prompt,
        model: args.model.clone(),
        neg: args.neg.clone(),
        width: args.width,
        height: args.height,
        steps: args.steps,
        guidance: args.guidance,
        sampler: args.sampler.clone(),
        seed: Some(Seed(seed)),
        img,
        strength: args.strength,
        clip: args.clip,
        stream: args.stream,
    };

    let filename = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_filename()));

    let client = Client::new(&args.address);
    let result = save_generation(&client, &request, &filename, args.meta, None, "Image saved")?;

    // High resolution fix: an independent img2img pass seeded from the
    // first result, resized back to the requested dimensions on save.
    if let (Some(factor), None) = (args.hires, &args.img) {
        let hires_request = hires_request(&request, &result, factor)?;
        save_generation(
            &client,
            &hires_request,
            &filename,
            args.meta,
            Some((args.width, args.height)),
            "Image hires.fix saved",
        )?;
    }

    Ok(())
}

pub fn list(address: &str) -> anyhow::Result<()> {
    let models = Client::new(address).list_models()?;
    println!("MODELS:");
    for model in models {
        println!("{model}");
    }
    Ok(())
}

/// Drive one request, writing every received record over the output
/// file (intermediates give a live preview of the run) and optionally a
/// JSON meta sidecar. Returns the final record for chaining.
fn save_generation(
    client: &Client,
    request: &GenerationRequest,
    filename: &Path,
    meta: bool,
    resize: Option<(u32, u32)>,
    prefix: &str,
) -> anyhow::Result<ImageRecord> {
    let mut received = 0u32;
    let result = client.generate(request, &mut |record| {
        let mut image = decode_png(&record.img)?;
        if let Some((w, h)) = resize {
            image = image.resize_exact(w, h, image::imageops::FilterType::Lanczos3);
        }
        image
            .save(filename)
            .with_context(|| format!("failed to save {}", filename.display()))?;

        if meta {
            let sidecar = json!({ "meta": request, "out": record.img });
            let meta_path = format!("{}.json", filename.display());
            std::fs::write(&meta_path, serde_json::to_string_pretty(&sidecar)?)
                .with_context(|| format!("failed to write {meta_path}"))?;
        }

        println!("{prefix} [{received}/{}]: {}", request.steps, filename.display());
        received += 1;
        Ok(())
    })?;

    Ok(result)
}

/// Second-pass request: the base result upscaled by `factor`, fed back
/// as an img2img source at low strength.
fn hires_request(
    base: &GenerationRequest,
    result: &ImageRecord,
    factor: f32,
) -> anyhow::Result<GenerationRequest> {
    let width = (base.width as f32 * factor) as u32;
    let height = (base.height as f32 * factor) as u32;

    let upscaled = decode_png(&result.img)?.resize_exact(
        width,
        height,
        image::imageops::FilterType::Lanczos3,
    );

    let mut request = base.clone();
    request.width = width;
    request.height = height;
    request.img = Some(encode_png(&upscaled)?);
    request.strength = HIRES_STRENGTH;
    Ok(request)
}

/// Rejected before any request is made; a factor at or below 1 would
/// only shrink the image, and a non-positive one would truncate to a
/// zero-sized request.
fn check_hires_factor(factor: f32) -> anyhow::Result<()> {
    anyhow::ensure!(
        factor.is_finite() && factor > 1.0,
        "hires factor must be greater than 1, got {factor}"
    );
    Ok(())
}

fn default_filename() -> String {
    format!("{}.png", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

fn decode_png(encoded: &str) -> anyhow::Result<DynamicImage> {
    let bytes = BASE64.decode(encoded).context("response image is not valid base64")?;
    image::load_from_memory(&bytes).context("response image could not be decoded")
}

fn encode_png(image: &DynamicImage) -> anyhow::Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .context("failed to encode image as PNG")?;
    Ok(BASE64.encode(buffer.into_inner()))
}
