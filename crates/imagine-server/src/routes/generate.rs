use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::imageops::FilterType;
use imagine_core::Sampler;
use imagine_core::pipeline::GenerationSpec;
use imagine_core::request::GenerationRequest;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::job::{self, JobError};
use crate::state::AppState;
use crate::stream;

/// POST /generate — validate, start one job, stream or buffer its
/// records back. Streaming vs. buffered is decided before the job is
/// spawned; validation failures never allocate a pipeline.
pub async fn generate(State(state): State<Arc<AppState>>, body: String) -> ApiResult<Response> {
    let request: GenerationRequest =
        serde_json::from_str(&body).map_err(|_| ApiError::BadRequest)?;

    let streaming = request.stream.is_some();
    let (model, spec) = validate(&state, request)?;

    log::info!(
        "Generating image: {}",
        json!({
            "model": model.file_stem().and_then(|s| s.to_str()),
            "prompt": spec.prompt,
            "neg": spec.neg_prompt,
            "seed": spec.seed.to_string(),
            "sampler": spec.sampler.key(),
            "width": spec.width,
            "height": spec.height,
            "steps": spec.steps,
            "guidance": spec.guidance,
            "stream": spec.stream,
            "img": spec.source.is_some(),
            "strength": spec.strength,
            "clip": spec.clip_skip,
        })
    );

    let handle = job::start(state.factory.clone(), model, spec);

    if streaming {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/json")
            .body(stream::ndjson_body(handle))
            .map_err(|e| ApiError::Internal(e.into()))?;
        Ok(response)
    } else {
        match stream::drain_buffered(handle).await {
            Ok(record) => Ok(Json(record).into_response()),
            Err(JobError::Cancelled) => {
                Err(ApiError::Generation("Generation was cancelled by client".into()))
            }
            Err(JobError::Failed(detail)) => Err(ApiError::Generation(detail)),
        }
    }
}

/// Check every field and resolve the request into a runnable spec.
fn validate(
    state: &AppState,
    request: GenerationRequest,
) -> ApiResult<(PathBuf, GenerationSpec)> {
    if request.prompt.is_empty() {
        return Err(ApiError::Validation("Prompt is required".into()));
    }
    if request.model.is_empty() {
        return Err(ApiError::Validation("Model is required".into()));
    }

    let model = state.registry.resolve(&request.model)?;
    let sampler: Sampler = request.sampler.parse()?;

    if request.width == 0 || request.height == 0 {
        return Err(ApiError::Validation("Width and height must be positive".into()));
    }
    if request.steps == 0 {
        return Err(ApiError::Validation("Steps must be positive".into()));
    }
    if let Some(0) = request.stream {
        return Err(ApiError::Validation("Stream interval must be positive".into()));
    }

    let source = match &request.img {
        Some(encoded) => Some(decode_source(encoded, request.width, request.height)?),
        None => None,
    };
    if source.is_some() && !(request.strength > 0.0 && request.strength <= 1.0) {
        return Err(ApiError::Validation("Strength must be in (0, 1]".into()));
    }

    let seed = request.seed.map(|s| s.0).unwrap_or_else(rand::random);

    let spec = GenerationSpec {
        prompt: request.prompt,
        neg_prompt: request.neg,
        width: request.width,
        height: request.height,
        steps: request.steps,
        guidance: request.guidance,
        sampler,
        seed,
        source,
        strength: request.strength,
        clip_skip: request.clip,
        stream: request.stream,
    };

    Ok((model, spec))
}

fn decode_source(encoded: &str, width: u32, height: u32) -> ApiResult<image::RgbImage> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| ApiError::Validation("Source image is not valid base64".into()))?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| ApiError::Validation(format!("Source image could not be decoded: {e}")))?;
    Ok(decoded
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_rgb8())
}
