//! Optional 2FA secret generation and code verification.
//!
//! The login algorithm (§4.6 step 4) only needs to know whether 2FA is
//! enabled to short-circuit with `requiresTwoFactor`; actually completing a
//! 2FA challenge is an admin-API concern outside this core's scope. This
//! module supplies the primitive that collaborator will call.

use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::{AuthError, Result};

const TOTP_STEP_SECS: u64 = 30;
const TOTP_DIGITS: usize = 6;

fn totp_for_secret(secret: &str, issuer: &str, account: &str) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        1,
        TOTP_STEP_SECS,
        Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| AuthError::SecretManager(e.to_string()))?,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::SecretManager(e.to_string()))
}

/// Generate a fresh base32 TOTP secret for a user enrolling in 2FA.
pub fn generate_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

/// Verify a 6-digit code against a user's stored secret.
pub fn verify_code(secret: &str, issuer: &str, account: &str, code: &str) -> Result<bool> {
    let totp = totp_for_secret(secret, issuer, account)?;
    totp.check_current(code)
        .map_err(|e| AuthError::SecretManager(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_verifies_against_its_own_secret() {
        let secret = generate_secret();
        let totp = totp_for_secret(&secret, "nestwatch", "user@example.com").unwrap();
        let code = totp.generate_current().unwrap();
        assert!(verify_code(&secret, "nestwatch", "user@example.com", &code).unwrap());
    }

    #[test]
    fn wrong_code_fails_verification() {
        let secret = generate_secret();
        assert!(!verify_code(&secret, "nestwatch", "user@example.com", "000000").unwrap());
    }
}
