//! Backend construction from configuration.
//!
//! Mirrors the connect-or-fall-back shape the upstream pool module uses for
//! compile-time database selection, adapted to a runtime choice: try Redis,
//! and if it can't be reached at startup, degrade to the in-process backend
//! rather than refuse to boot (§4.5 Design Notes).

use std::sync::Arc;

use nestwatch_protocol::config::RedisConfig;
use tracing::warn;

use crate::backend::StorageBackend;
use crate::memory_backend::MemoryBackend;
use crate::redis_backend::RedisBackend;

/// Connect to Redis, falling back to the degraded in-process backend if the
/// connection cannot be established.
pub async fn connect(config: &RedisConfig) -> Arc<dyn StorageBackend> {
    match RedisBackend::connect(&config.connection_url()).await {
        Ok(backend) => Arc::new(backend),
        Err(err) => {
            warn!(
                error = %err,
                "could not reach redis at startup, falling back to degraded in-process storage"
            );
            Arc::new(MemoryBackend::new())
        }
    }
}
