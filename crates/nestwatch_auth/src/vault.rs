//! External secret-manager client for the externally-stored password
//! variant (§4.6).
//!
//! Modeled on the raw-HTTP identity-provider pattern this core's teacher
//! uses for Azure AD: a thin `reqwest::Client` wrapper with no heavy SDK,
//! talking a KV-v2-shaped protocol (`GET`/`PUT` under `v1/<mount>/data/<path>`
//! with an `X-Vault-Token` header) rather than pulling in a full Vault SDK
//! crate this workspace has no other use for.

use async_trait::async_trait;
use nestwatch_protocol::types::PasswordRecord;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

#[async_trait]
pub trait SecretManager: Send + Sync {
    async fn get_password_record(&self, user_id: &str) -> Result<Option<PasswordRecord>>;
    async fn put_password_record(&self, user_id: &str, record: &PasswordRecord) -> Result<()>;
}

pub struct VaultSecretClient {
    base_url: String,
    mount: String,
    token: String,
    http: reqwest::Client,
}

impl VaultSecretClient {
    pub fn new(base_url: impl Into<String>, mount: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            mount: mount.into(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}/v1/{}/data/{path}", self.base_url, self.mount)
    }
}

#[derive(Deserialize)]
struct KvReadResponse {
    data: KvReadData,
}

#[derive(Deserialize)]
struct KvReadData {
    data: Option<PasswordRecord>,
}

#[derive(Serialize)]
struct KvWriteRequest<'a> {
    data: &'a PasswordRecord,
}

#[async_trait]
impl SecretManager for VaultSecretClient {
    async fn get_password_record(&self, user_id: &str) -> Result<Option<PasswordRecord>> {
        let path = nestwatch_protocol::keys::vault_password_path(user_id);
        let response = self
            .http
            .get(self.data_url(&path))
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| AuthError::SecretManager(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AuthError::SecretManager(format!(
                "secret manager returned {}",
                response.status()
            )));
        }

        let body: KvReadResponse = response
            .json()
            .await
            .map_err(|e| AuthError::SecretManager(e.to_string()))?;
        Ok(body.data.data)
    }

    async fn put_password_record(&self, user_id: &str, record: &PasswordRecord) -> Result<()> {
        let path = nestwatch_protocol::keys::vault_password_path(user_id);
        let response = self
            .http
            .put(self.data_url(&path))
            .header("X-Vault-Token", &self.token)
            .json(&KvWriteRequest { data: record })
            .send()
            .await
            .map_err(|e| AuthError::SecretManager(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::SecretManager(format!(
                "secret manager returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Process-local secret manager. Used in tests and whenever a nest hasn't
/// configured external storage but a caller still wants to exercise the
/// `SecretManager` seam uniformly.
#[derive(Default)]
pub struct InMemorySecretManager {
    records: tokio::sync::Mutex<std::collections::HashMap<String, PasswordRecord>>,
}

impl InMemorySecretManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretManager for InMemorySecretManager {
    async fn get_password_record(&self, user_id: &str) -> Result<Option<PasswordRecord>> {
        Ok(self.records.lock().await.get(user_id).cloned())
    }

    async fn put_password_record(&self, user_id: &str, record: &PasswordRecord) -> Result<()> {
        self.records
            .lock()
            .await
            .insert(user_id.to_string(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn in_memory_manager_roundtrips_password_record() {
        let manager = InMemorySecretManager::new();
        let record = PasswordRecord::new("hash-1".into(), Utc::now());
        manager.put_password_record("u1", &record).await.unwrap();

        let loaded = manager.get_password_record("u1").await.unwrap().unwrap();
        assert_eq!(loaded.current_hash, "hash-1");
        assert!(loaded.previous_hash.is_none());
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let manager = InMemorySecretManager::new();
        assert!(manager.get_password_record("missing").await.unwrap().is_none());
    }
}
