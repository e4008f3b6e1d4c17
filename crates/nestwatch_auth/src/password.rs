//! Password storage, selected at boot (§4.6).
//!
//! Inline mode keeps a bcrypt hash on the user record; external mode keeps
//! only a flag on the record and the hash (plus a 5-entry change ring) in
//! the secret manager. Both variants live behind one enum rather than a
//! trait object — the set of variants is closed and each needs a different
//! shape of history handling, so a `match` reads clearer than a vtable here.

use std::sync::Arc;

use chrono::Utc;
use nestwatch_protocol::types::{PasswordRecord, User};

use crate::error::{AuthError, Result};
use crate::vault::SecretManager;

pub enum PasswordBackend {
    Inline {
        cost: u32,
    },
    External {
        secret_manager: Arc<dyn SecretManager>,
        cost: u32,
    },
}

impl PasswordBackend {
    pub fn inline(cost: u32) -> Self {
        Self::Inline { cost }
    }

    pub fn external(secret_manager: Arc<dyn SecretManager>, cost: u32) -> Self {
        Self::External { secret_manager, cost }
    }

    fn cost(&self) -> u32 {
        match self {
            PasswordBackend::Inline { cost } => *cost,
            PasswordBackend::External { cost, .. } => *cost,
        }
    }

    fn hash(&self, password: &str) -> Result<String> {
        Ok(bcrypt::hash(password, self.cost())?)
    }

    /// Verify a login candidate against whichever store backs this user.
    pub async fn verify(&self, user: &User, candidate: &str) -> Result<bool> {
        match self {
            PasswordBackend::Inline { .. } => match &user.password_hash {
                Some(hash) => Ok(bcrypt::verify(candidate, hash)?),
                None => Ok(false),
            },
            PasswordBackend::External { secret_manager, .. } => {
                match secret_manager.get_password_record(&user.id).await? {
                    Some(record) => Ok(bcrypt::verify(candidate, &record.current_hash)?),
                    None => Ok(false),
                }
            }
        }
    }

    /// Set a new password. Rejects reuse of the immediately previous
    /// password in external mode; inline mode has no history ring to check.
    pub async fn set_password(&self, user: &mut User, new_password: &str) -> Result<()> {
        let hash = self.hash(new_password)?;
        match self {
            PasswordBackend::Inline { .. } => {
                user.password_hash = Some(hash);
                user.password_in_secret_manager = false;
            }
            PasswordBackend::External { secret_manager, .. } => {
                let now = Utc::now();
                let existing = secret_manager.get_password_record(&user.id).await?;
                if let Some(record) = &existing {
                    if check_password_history(record, new_password)? {
                        return Err(AuthError::PasswordReused);
                    }
                }
                let record = match existing {
                    Some(mut record) => {
                        record.rotate(hash, now);
                        record
                    }
                    None => PasswordRecord::new(hash, now),
                };
                secret_manager.put_password_record(&user.id, &record).await?;
                user.password_hash = None;
                user.password_in_secret_manager = true;
            }
        }
        Ok(())
    }
}

/// `checkPasswordHistory`: compares a new candidate against the previous
/// hash only. Full history checking would require storing a
/// plaintext-equivalent and is deliberately not supported (§4.6).
pub fn check_password_history(record: &PasswordRecord, candidate: &str) -> Result<bool> {
    match &record.previous_hash {
        Some(previous) => Ok(bcrypt::verify(candidate, previous)?),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::InMemorySecretManager;
    use nestwatch_protocol::types::UserRole;

    fn sample_user() -> User {
        User {
            id: "u1".into(),
            nest_id: "n1".into(),
            email: "owner@acme.test".into(),
            display_name: "Owner".into(),
            role: UserRole::Owner,
            active: true,
            email_verified: true,
            two_factor_secret: None,
            password_hash: None,
            password_in_secret_manager: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn inline_backend_hashes_and_verifies() {
        let backend = PasswordBackend::inline(10);
        let mut user = sample_user();
        backend.set_password(&mut user, "hunter22").await.unwrap();
        assert!(user.password_hash.is_some());
        assert!(backend.verify(&user, "hunter22").await.unwrap());
        assert!(!backend.verify(&user, "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn external_backend_rejects_reusing_previous_password() {
        let manager = Arc::new(InMemorySecretManager::new());
        let backend = PasswordBackend::external(manager, 10);
        let mut user = sample_user();

        backend.set_password(&mut user, "first-password").await.unwrap();
        backend.set_password(&mut user, "second-password").await.unwrap();

        let err = backend
            .set_password(&mut user, "first-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PasswordReused));
    }

    #[tokio::test]
    async fn external_backend_allows_reuse_beyond_the_previous_hash() {
        let manager = Arc::new(InMemorySecretManager::new());
        let backend = PasswordBackend::external(manager, 10);
        let mut user = sample_user();

        backend.set_password(&mut user, "aaa-password").await.unwrap();
        backend.set_password(&mut user, "bbb-password").await.unwrap();
        // "aaa-password" is two changes back, not the immediately previous
        // one, so §4.6's previous-hash-only check lets it through.
        backend.set_password(&mut user, "aaa-password").await.unwrap();
    }
}
