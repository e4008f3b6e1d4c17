//! JWT session issuance, password storage, TOTP 2FA, login rate limiting,
//! and the heartbeat signature primitive (§4.6, §4.3 gate 1).

pub mod error;
pub mod jwt;
pub mod login;
pub mod password;
pub mod rate_limit;
pub mod signing;
pub mod totp;
pub mod vault;

pub use error::{AuthError, Result};
pub use jwt::{Claims, Session, TokenIssuer};
pub use login::{LoginOutcome, LoginService};
pub use password::PasswordBackend;
pub use rate_limit::RateLimiter;
pub use vault::{InMemorySecretManager, SecretManager, VaultSecretClient};
