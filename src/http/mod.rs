//! REST adapter.
//!
//! All responses use the `{code, msg, data}` envelope. `code` mirrors the HTTP
//! status: 200 on success, 400/404/500/501/504 on failure with `data` absent.

mod handlers;
mod listener;
mod server;

pub use listener::{IdleTimeoutListener, IdleTimeoutStream};
pub use server::HttpServer;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::service::ConvertService;
use crate::types::Error;

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            msg: "success".to_string(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Error side of a handler result, rendered as an envelope without data.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.to_envelope_code();
        if code >= 500 {
            tracing::warn!(code, error = %self.0, "http_request_failed");
        }
        ApiResponse::<()> {
            code,
            msg: self.0.to_string(),
            data: None,
        }
        .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<ApiResponse<T>, ApiError>;

/// Build the REST router. Layers are added by [`HttpServer`].
pub fn create_router(service: ConvertService) -> Router {
    let api = Router::new()
        .route("/convert", post(handlers::convert))
        .route("/convert/batch", post(handlers::convert_batch))
        .route("/convert/simple", get(handlers::convert_simple))
        .route("/convert/url", post(handlers::convert_from_url))
        .route("/health", get(handlers::health))
        .route("/info", get(handlers::info));

    Router::new()
        .route("/", get(handlers::index))
        .nest("/api/v1", api)
        .fallback(handlers::not_found)
        .with_state(service)
}
