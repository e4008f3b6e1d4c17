//! In-process fallback backend used when Redis is unreachable at startup.
//!
//! §4.5's Design Notes call out a degraded mode: the scheduler and fleet
//! keep running against process-local state rather than refusing to boot,
//! accepting that dedup/fan-out guarantees only hold within a single
//! process until the backing store comes back. `is_degraded()` lets callers
//! log that downgrade instead of silently operating under weaker
//! guarantees.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backend::StorageBackend;
use crate::error::Result;

#[derive(Default)]
struct State {
    strings: HashMap<String, String>,
    expirations: HashMap<String, Instant>,
    hashes: HashMap<String, HashMap<String, String>>,
    sorted_sets: HashMap<String, Vec<(String, f64)>>,
    sets: HashMap<String, HashSet<String>>,
}

impl State {
    fn is_expired(&self, key: &str) -> bool {
        matches!(self.expirations.get(key), Some(at) if Instant::now() >= *at)
    }

    fn sweep(&mut self, key: &str) {
        if self.is_expired(key) {
            self.strings.remove(key);
            self.expirations.remove(key);
        }
    }
}

/// A single-process, non-persistent stand-in for the real backend.
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        state.sweep(key);
        Ok(state.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.strings.insert(key.to_string(), value.to_string());
        state.expirations.remove(key);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.strings.insert(key.to_string(), value.to_string());
        state
            .expirations
            .insert(key.to_string(), Instant::now() + Duration::from_secs(ttl_secs));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.strings.remove(key);
        state.expirations.remove(key);
        state.hashes.remove(key);
        state.sorted_sets.remove(key);
        state.sets.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.sweep(key);
        Ok(state.strings.contains_key(key)
            || state.hashes.contains_key(key)
            || state.sorted_sets.contains_key(key)
            || state.sets.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .expirations
            .insert(key.to_string(), Instant::now() + Duration::from_secs(ttl_secs));
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(h) = state.hashes.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        let state = self.state.lock().await;
        Ok(state
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .hashes
            .get(key)
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        let set = state.sorted_sets.entry(key.to_string()).or_default();
        set.retain(|(m, _)| m != member);
        set.push((member.to_string(), score));
        set.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(())
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let Some(set) = state.sorted_sets.get(key) else {
            return Ok(Vec::new());
        };
        Ok(slice_range(set, start, stop)
            .into_iter()
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .sorted_sets
            .get(key)
            .map(|set| {
                set.iter()
                    .filter(|(_, score)| *score >= min && *score <= max)
                    .map(|(m, _)| m.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(set) = state.sorted_sets.get_mut(key) {
            set.retain(|(m, _)| m != member);
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(s) = state.sets.get_mut(key) {
            s.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        let live: Vec<String> = state.strings.keys().cloned().collect();
        for k in &live {
            state.sweep(k);
        }
        Ok(state
            .strings
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn publish(&self, _channel: &str, _message: &str) -> Result<()> {
        // No subscribers across processes in degraded mode; in-process
        // listeners would need a broadcast channel wired in separately.
        Ok(())
    }

    fn is_degraded(&self) -> bool {
        true
    }
}

fn slice_range(set: &[(String, f64)], start: isize, stop: isize) -> Vec<&(String, f64)> {
    let len = set.len() as isize;
    if len == 0 {
        return Vec::new();
    }
    let norm = |i: isize| -> isize {
        if i < 0 {
            (len + i).max(0)
        } else {
            i.min(len - 1)
        }
    };
    let start = norm(start);
    let stop = norm(stop);
    if start > stop {
        return Vec::new();
    }
    set[start as usize..=stop as usize].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get_roundtrip() {
        let backend = MemoryBackend::new();
        backend.set("k", "v").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn sorted_set_returns_members_in_score_order() {
        let backend = MemoryBackend::new();
        backend.zadd("z", "b", 2.0).await.unwrap();
        backend.zadd("z", "a", 1.0).await.unwrap();
        assert_eq!(backend.zrange("z", 0, -1).await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn is_degraded_reports_true() {
        let backend = MemoryBackend::new();
        assert!(backend.is_degraded());
    }
}
