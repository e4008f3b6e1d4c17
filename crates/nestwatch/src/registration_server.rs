//! Worker registration HTTP server (§6 "Worker registration HTTP").
//!
//! Two endpoints only — `POST /register` and `GET /register/<workerId>/status`
//! — the one piece of external interface this core owns outright, everything
//! else (admin/public APIs) being out of scope.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use nestwatch_fleet::registration::{RegistrationRateLimiter, RegistrationService};
use nestwatch_protocol::registration_api::{
    RegisterRequest, RegisterResponse, StatusResponse, REGISTRATION_TOKEN_HEADER,
};
use nestwatch_protocol::CoreError;
use tracing::warn;

pub struct AppState {
    pub registration: RegistrationService,
    pub rate_limiter: RegistrationRateLimiter,
    pub required_token: Option<String>,
    pub broker_host: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/register/:worker_id/status", get(status))
        .with_state(state)
}

fn check_token(state: &AppState, headers: &HeaderMap) -> Result<(), CoreError> {
    let Some(expected) = &state.required_token else {
        return Ok(());
    };
    let provided = headers
        .get(REGISTRATION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(CoreError::Authorization)
    }
}

fn reporting_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Response {
    if let Err(err) = check_token(&state, &headers) {
        return core_error_response(err);
    }

    let ip = reporting_ip(&headers);
    if let Err(err) = state.rate_limiter.check_and_record(&ip, chrono::Utc::now()).await {
        warn!(ip, "registration rate limit exceeded");
        return core_error_response(err.into());
    }

    let outcome = state
        .registration
        .register(
            request.worker_id,
            request.hostname,
            request.platform,
            ip,
            request.public_key,
            request.owner_email,
        )
        .await;

    match outcome {
        Ok(outcome) => Json(RegisterResponse {
            worker_id: outcome.registration.worker_id,
            approved: outcome.registration.approved,
            message: if outcome.created {
                "registered, awaiting approval".to_string()
            } else {
                "already registered".to_string()
            },
        })
        .into_response(),
        Err(err) => core_error_response(err.into()),
    }
}

async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(worker_id): Path<String>,
) -> Response {
    if let Err(err) = check_token(&state, &headers) {
        return core_error_response(err);
    }

    match state.registration.status(&worker_id).await {
        Ok(registration) => {
            let rabbitmq_url =
                RegistrationService::broker_url(&registration, &state.broker_host);
            Json(StatusResponse {
                worker_id: registration.worker_id,
                approved: registration.approved,
                rabbitmq_url,
                region: registration.approved.then_some(registration.region),
            })
            .into_response()
        }
        Err(err) => core_error_response(err.into()),
    }
}

fn core_error_response(err: CoreError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match err.to_envelope() {
        Some(envelope) => (status, Json(envelope)).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestwatch_storage::memory_backend::MemoryBackend;
    use nestwatch_storage::Store;
    use std::sync::Arc as StdArc;

    fn test_state(token: Option<String>) -> Arc<AppState> {
        let store = Store::new(StdArc::new(MemoryBackend::new()));
        Arc::new(AppState {
            registration: RegistrationService::new(store.clone()),
            rate_limiter: RegistrationRateLimiter::new(store, 100),
            required_token: token,
            broker_host: "broker.internal".to_string(),
        })
    }

    #[tokio::test]
    async fn missing_token_is_rejected_when_one_is_required() {
        let state = test_state(Some("s3cr3t".to_string()));
        let err = check_token(&state, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, CoreError::Authorization));
    }

    #[tokio::test]
    async fn no_token_required_when_unconfigured() {
        let state = test_state(None);
        assert!(check_token(&state, &HeaderMap::new()).is_ok());
    }
}
