//! Webhook listener: maps HTTP onto the ingress gate.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use relay_sync::prepare::{PLATFORM_TOKEN_HEADER, SIGNATURE_HEADER};
use relay_sync::{IngressError, IngressRequest, JobScheduler, SyncContext, WebhookGate};

#[derive(Clone)]
struct AppState {
    ctx: Arc<SyncContext>,
    scheduler: Arc<dyn JobScheduler>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<BTreeMap<String, Vec<String>>>,
}

/// `POST {webhook_path}` plus `GET /health`.
pub fn router(ctx: Arc<SyncContext>, scheduler: Arc<dyn JobScheduler>) -> Router {
    let webhook_path = ctx.settings.webhook_path.clone();
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(&webhook_path, post(webhook))
        .with_state(AppState { ctx, scheduler })
}

async fn webhook(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = IngressRequest {
        path: uri.path().to_string(),
        bearer_token: bearer_token(&headers),
        platform_token: header_value(&headers, PLATFORM_TOKEN_HEADER),
        signature: header_value(&headers, SIGNATURE_HEADER),
        body: body.to_vec(),
    };

    match WebhookGate::new(&state.ctx).accept(&request, state.scheduler.as_ref()) {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => {
            tracing::info!(path = %request.path, status = err.status_code(), error = %err, "webhook rejected");
            rejection(err).into_response()
        }
    }
}

fn rejection(err: IngressError) -> (StatusCode, Json<ErrorBody>) {
    match err {
        IngressError::Authentication(reason) => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                message: format!("Unauthorized: {reason}"),
                errors: None,
            }),
        ),
        IngressError::Validation(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody {
                message: "The given data was invalid.".to_string(),
                errors: Some(errors.0),
            }),
        ),
        IngressError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                message: "Service Unavailable: sync job could not be queued".to_string(),
                errors: None,
            }),
        ),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim().to_string())
}
