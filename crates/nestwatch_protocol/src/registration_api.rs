//! Request/response shapes for the worker registration HTTP endpoints (§6).
//!
//! Shared between the worker's registration client and the launcher's
//! registration server so the two sides of the wire never drift.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub worker_id: String,
    pub hostname: String,
    pub platform: String,
    pub ip: String,
    pub public_key: Option<String>,
    pub owner_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub worker_id: String,
    pub approved: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub worker_id: String,
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rabbitmq_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Header carrying the optional shared registration token (§4.2, §6).
pub const REGISTRATION_TOKEN_HEADER: &str = "X-Registration-Token";
