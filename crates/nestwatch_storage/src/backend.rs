//! The opaque key-value backend contract (§4.5).
//!
//! Everything above this trait — the tenant-scoped `Store` facade, the
//! scheduler's dedup cache, the fleet's heartbeat table — talks to a
//! `Box<dyn StorageBackend>` and never learns whether it's Redis or the
//! in-process fallback. Mirrors the `StateStoreBackend` seam in the upstream
//! state-store crate this was lifted from: one trait, swappable impl, no
//! caller-visible branching on backend kind.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;
    async fn hdel(&self, key: &str, field: &str) -> Result<()>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>>;
    async fn hkeys(&self, key: &str) -> Result<Vec<String>>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;
    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>>;
    async fn zrem(&self, key: &str, member: &str) -> Result<()>;

    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn srem(&self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    async fn publish(&self, channel: &str, message: &str) -> Result<()>;

    /// True for the in-process fallback used when the backing store is
    /// unreachable. Callers use this to decide whether to downgrade
    /// guarantees (no persistence, no fan-out across processes) rather than
    /// fail outright.
    fn is_degraded(&self) -> bool {
        false
    }
}
