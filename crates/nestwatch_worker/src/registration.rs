//! Registration HTTP client (§4.2 `UNREGISTERED -> PENDING -> APPROVED`).
//!
//! The worker side of the six-state machine: POST once, then poll status
//! until approved (or until told it will never be, on revocation).

use std::time::Duration;

use nestwatch_protocol::registration_api::{RegisterRequest, RegisterResponse, StatusResponse};
use tracing::info;

use crate::error::{Result, WorkerError};

pub struct RegistrationClient {
    http: reqwest::Client,
    base_url: String,
}

impl RegistrationClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        let response = self
            .http
            .post(format!("{}/register", self.base_url))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json::<RegisterResponse>()
            .await?;
        Ok(response)
    }

    pub async fn status(&self, worker_id: &str) -> Result<StatusResponse> {
        let response = self
            .http
            .get(format!("{}/register/{}/status", self.base_url, worker_id))
            .send()
            .await?
            .error_for_status()?
            .json::<StatusResponse>()
            .await?;
        Ok(response)
    }

    /// Poll `GET /register/<id>/status` at `interval` until approved, up to
    /// `max_attempts` times.
    pub async fn wait_for_approval(
        &self,
        worker_id: &str,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<StatusResponse> {
        for attempt in 1..=max_attempts {
            let status = self.status(worker_id).await?;
            if status.approved {
                return Ok(status);
            }
            info!(worker_id, attempt, max_attempts, "still pending approval");
            tokio::time::sleep(interval).await;
        }
        Err(WorkerError::NotApproved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_formats_base_urls_without_trailing_slash_assumptions() {
        let client = RegistrationClient::new("http://localhost:8080".to_string());
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
