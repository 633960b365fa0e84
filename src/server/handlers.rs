//! Request handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::GatewayError;
use crate::gateway::{PayloadEncoding, ServerPathRequest, SERVICE_NAME};
use crate::response::ToolResponse;

/// Body of `POST /convert/content`.
#[derive(Debug, Deserialize)]
pub struct ContentBody {
    pub filename: String,
    /// Encoded file content.
    pub content: String,
    #[serde(default)]
    pub encoding: PayloadEncoding,
    #[serde(default)]
    pub output_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// HTTP status for a gateway error.
pub fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::UnsupportedType { .. } | GatewayError::InvalidEncoding { .. } => {
            StatusCode::BAD_REQUEST
        }
        GatewayError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        GatewayError::AccessDenied { .. } => StatusCode::FORBIDDEN,
        GatewayError::NotAccessible { .. } => StatusCode::NOT_FOUND,
        GatewayError::ConversionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::StagingFailed { .. }
        | GatewayError::OutputWriteFailed { .. }
        | GatewayError::SweepFailed { .. }
        | GatewayError::InvalidConfig(_)
        | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &GatewayError) -> Response {
    (status_for(err), Json(ToolResponse::from_error(err))).into_response()
}

/// A malformed request body still gets the uniform response shape.
fn rejection_response(rejection: JsonRejection) -> Response {
    let body = ToolResponse {
        ok: false,
        message: format!("Invalid request: {}", rejection.body_text()),
        filename: None,
        content: None,
        output_path: None,
        backend: None,
        error_kind: Some(crate::error::ErrorKind::Validation),
    };
    (rejection.status(), Json(body)).into_response()
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn convert_path(
    State(state): State<AppState>,
    body: Result<Json<ServerPathRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    match state
        .gateway
        .convert_from_path(req.path, req.output_name)
        .await
    {
        Ok(success) => Json(ToolResponse::from_conversion(&success)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn convert_content(
    State(state): State<AppState>,
    body: Result<Json<ContentBody>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    match state
        .gateway
        .convert_from_content(req.filename, req.content, req.encoding, req.output_name)
        .await
    {
        Ok(success) => Json(ToolResponse::from_conversion(&success)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn list_formats(State(state): State<AppState>) -> Response {
    Json(state.gateway.list_supported_formats()).into_response()
}

pub async fn service_info(State(state): State<AppState>) -> Response {
    Json(state.gateway.service_info()).into_response()
}

pub async fn sweep(State(state): State<AppState>) -> Response {
    match state.gateway.sweep_old_artifacts().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(&e),
    }
}
