use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use imagine_core::UnknownSampler;
use imagine_core::record::ErrorRecord;

/// Errors a request handler can surface to the peer.
///
/// `BadRequest` and `Validation` are raised before any job is started;
/// `Generation` carries a failure reported through the result channel
/// of an already-running job. Peer disconnects never become a response
/// (the peer is gone) and are handled inside the streamer instead.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid JSON")]
    BadRequest,

    #[error("{0}")]
    Validation(String),

    #[error("Internal server error during image generation")]
    Generation(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<UnknownSampler> for ApiError {
    fn from(err: UnknownSampler) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            ApiError::BadRequest | ApiError::Validation(_) => (StatusCode::BAD_REQUEST, None),
            ApiError::Generation(detail) => {
                log::error!("generation failed: {detail}");
                (StatusCode::INTERNAL_SERVER_ERROR, Some(detail.clone()))
            }
            ApiError::Internal(err) => {
                log::error!("internal error: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, Some(err.to_string()))
            }
        };

        let body = ErrorRecord {
            error: self.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_400() {
        let resp = ApiError::Validation("Prompt is required".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_generation_maps_to_500() {
        let resp = ApiError::Generation("device lost".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
