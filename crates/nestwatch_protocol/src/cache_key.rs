//! Probe dedup cache-key computation (§4.1).
//!
//! The cache key is the canonical fingerprint of everything that makes two
//! probes indistinguishable: target, type, method, and headers. Two
//! services that produce the same key within the dedup window share one
//! outbound probe.

use std::collections::BTreeMap;

use blake3::Hasher;
use serde::Serialize;

use crate::types::{ServiceConfig, ServiceType};

/// The subset of a service's identity that participates in dedup, in a
/// canonical (sorted-keys) serialization so field order never matters.
#[derive(Serialize)]
struct CacheKeyFingerprint<'a> {
    target: &'a str,
    #[serde(rename = "type")]
    service_type: ServiceType,
    method: Option<&'a str>,
    headers: BTreeMap<&'a str, &'a str>,
}

/// Compute the dedup cache key for a target/type/method/headers tuple.
///
/// Two services with identical `(target, type, method, headers)` produce
/// the same key regardless of which nest owns them.
pub fn cache_key(target: &str, config: &ServiceConfig) -> String {
    let (method, headers): (Option<&str>, BTreeMap<&str, &str>) = match config {
        ServiceConfig::Web { method, headers, .. } => (
            Some(method.as_str()),
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
        ),
        ServiceConfig::Keyword { method, headers, .. } => (
            Some(method.as_str()),
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
        ),
        _ => (None, BTreeMap::new()),
    };

    let fingerprint = CacheKeyFingerprint {
        target,
        service_type: config.service_type(),
        method,
        headers,
    };

    // `serde_json` preserves struct field declaration order and BTreeMap key
    // order, so this is a stable canonical form across processes/versions.
    let canonical = serde_json::to_string(&fingerprint).expect("fingerprint always serializes");

    let mut hasher = Hasher::new();
    hasher.update(canonical.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn web_config(method: &str, headers: &[(&str, &str)]) -> ServiceConfig {
        ServiceConfig::Web {
            method: method.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            expected_status: None,
            body_keyword: None,
        }
    }

    #[test]
    fn identical_target_type_method_headers_collide() {
        let a = web_config("GET", &[("Accept", "text/html")]);
        let b = web_config("GET", &[("Accept", "text/html")]);
        assert_eq!(
            cache_key("https://example.com", &a),
            cache_key("https://example.com", &b)
        );
    }

    #[test]
    fn header_insertion_order_does_not_matter() {
        let a = web_config("GET", &[("A", "1"), ("B", "2")]);
        let b = web_config("GET", &[("B", "2"), ("A", "1")]);
        assert_eq!(
            cache_key("https://example.com", &a),
            cache_key("https://example.com", &b)
        );
    }

    #[test]
    fn different_method_changes_the_key() {
        let a = web_config("GET", &[]);
        let b = web_config("POST", &[]);
        assert_ne!(
            cache_key("https://example.com", &a),
            cache_key("https://example.com", &b)
        );
    }

    #[test]
    fn different_type_changes_the_key_even_with_same_target() {
        let web = web_config("GET", &[]);
        let ping = ServiceConfig::Ping;
        assert_ne!(
            cache_key("example.com", &web),
            cache_key("example.com", &ping)
        );
    }

    #[test]
    fn non_http_types_ignore_headers_entirely() {
        let a = ServiceConfig::Tcp { port: 443 };
        let b = ServiceConfig::Tcp { port: 443 };
        assert_eq!(cache_key("example.com", &a), cache_key("example.com", &b));
    }
}
