//! Probe execution: the worker-side half of the probe-command contract
//! (§4.1 "Command envelope", §6 "Probe command/result message").
//!
//! One function per `ServiceConfig` variant, exhaustively matched so adding
//! a service type is a compile error here until it's handled.

use std::time::{Duration, Instant};

use nestwatch_protocol::types::{ProbeStatus, ServiceConfig};
use reqwest::Method;
use tokio::net::TcpStream;
use tracing::debug;

/// Default per-probe timeout. Not configurable per spec — the scheduler's
/// `T_TICK` already bounds how often a slow target gets re-tried.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub response_time_ms: Option<u32>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    fn up(elapsed: Duration) -> Self {
        Self {
            status: ProbeStatus::Up,
            response_time_ms: Some(elapsed.as_millis() as u32),
            error: None,
        }
    }

    fn down(error: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Down,
            response_time_ms: None,
            error: Some(error.into()),
        }
    }

    fn degraded(elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Degraded,
            response_time_ms: Some(elapsed.as_millis() as u32),
            error: Some(error.into()),
        }
    }
}

/// Run the probe described by `config` against `target`.
pub async fn run(http: &reqwest::Client, target: &str, config: &ServiceConfig) -> ProbeOutcome {
    match config {
        ServiceConfig::Web {
            method,
            headers,
            expected_status,
            body_keyword,
        } => probe_http(http, target, method, headers, *expected_status, body_keyword.as_deref()).await,
        ServiceConfig::Tcp { port } => probe_tcp(target, *port).await,
        ServiceConfig::Port { port } => probe_tcp(target, *port).await,
        ServiceConfig::Ping => probe_ping(target).await,
        ServiceConfig::Github { repo } => probe_github(http, repo).await,
        ServiceConfig::UptimeApi { endpoint } => probe_http(http, endpoint, "GET", &Default::default(), None, None).await,
        ServiceConfig::Keyword {
            method,
            headers,
            keyword,
            keyword_must_exist,
        } => probe_keyword(http, target, method, headers, keyword, *keyword_must_exist).await,
        ServiceConfig::Heartbeat { .. } => probe_heartbeat(),
    }
}

async fn probe_http(
    http: &reqwest::Client,
    target: &str,
    method: &str,
    headers: &std::collections::HashMap<String, String>,
    expected_status: Option<u16>,
    body_keyword: Option<&str>,
) -> ProbeOutcome {
    let method = Method::from_bytes(method.as_bytes()).unwrap_or(Method::GET);
    let mut request = http.request(method, target).timeout(PROBE_TIMEOUT);
    for (key, value) in headers {
        request = request.header(key, value);
    }

    let start = Instant::now();
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => return ProbeOutcome::down(err.to_string()),
    };
    let elapsed = start.elapsed();
    let status = response.status().as_u16();

    if let Some(expected) = expected_status {
        if status != expected {
            return ProbeOutcome::degraded(elapsed, format!("expected status {expected}, got {status}"));
        }
    } else if !response.status().is_success() {
        return ProbeOutcome::degraded(elapsed, format!("unexpected status {status}"));
    }

    if let Some(keyword) = body_keyword {
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return ProbeOutcome::degraded(elapsed, format!("could not read body: {err}")),
        };
        if !body.contains(keyword) {
            return ProbeOutcome::degraded(elapsed, format!("body missing keyword '{keyword}'"));
        }
    }

    ProbeOutcome::up(elapsed)
}

async fn probe_keyword(
    http: &reqwest::Client,
    target: &str,
    method: &str,
    headers: &std::collections::HashMap<String, String>,
    keyword: &str,
    keyword_must_exist: bool,
) -> ProbeOutcome {
    let method = Method::from_bytes(method.as_bytes()).unwrap_or(Method::GET);
    let mut request = http.request(method, target).timeout(PROBE_TIMEOUT);
    for (key, value) in headers {
        request = request.header(key, value);
    }

    let start = Instant::now();
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => return ProbeOutcome::down(err.to_string()),
    };
    let elapsed = start.elapsed();
    if !response.status().is_success() {
        let status = response.status().as_u16();
        return ProbeOutcome::degraded(elapsed, format!("unexpected status {status}"));
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => return ProbeOutcome::degraded(elapsed, format!("could not read body: {err}")),
    };
    let found = body.contains(keyword);
    if found == keyword_must_exist {
        ProbeOutcome::up(elapsed)
    } else if keyword_must_exist {
        ProbeOutcome::degraded(elapsed, format!("keyword '{keyword}' not found"))
    } else {
        ProbeOutcome::degraded(elapsed, format!("forbidden keyword '{keyword}' found"))
    }
}

async fn probe_tcp(target: &str, port: u16) -> ProbeOutcome {
    let addr = format!("{target}:{port}");
    let start = Instant::now();
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => ProbeOutcome::up(start.elapsed()),
        Ok(Err(err)) => ProbeOutcome::down(err.to_string()),
        Err(_) => ProbeOutcome::down("connection timed out"),
    }
}

/// ICMP echo requires raw-socket privileges most worker deployments won't
/// have; a bare TCP connect against the target's default HTTP port is used
/// as the reachability signal instead. Ports reachable over TCP are
/// reachable over the network generally, which is the property `ping`
/// service definitions care about in this fleet.
async fn probe_ping(target: &str) -> ProbeOutcome {
    probe_tcp(target, 80).await
}

async fn probe_github(http: &reqwest::Client, repo: &str) -> ProbeOutcome {
    let url = format!("https://api.github.com/repos/{repo}");
    let start = Instant::now();
    let response = http
        .get(&url)
        .header("User-Agent", "nestwatch-worker")
        .timeout(PROBE_TIMEOUT)
        .send()
        .await;
    match response {
        Ok(response) if response.status().is_success() => ProbeOutcome::up(start.elapsed()),
        Ok(response) => ProbeOutcome::degraded(start.elapsed(), format!("github returned {}", response.status())),
        Err(err) => ProbeOutcome::down(err.to_string()),
    }
}

/// A heartbeat-type service is a dead man's switch: its target pings a
/// collection endpoint outside this worker's control, and "down" is the
/// grace-period expiry the scheduler/result-pipeline owns, not something a
/// worker polls for. Reported up unconditionally; no outbound probe.
fn probe_heartbeat() -> ProbeOutcome {
    debug!("heartbeat-type service has no active probe, reporting up");
    ProbeOutcome {
        status: ProbeStatus::Up,
        response_time_ms: None,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tcp_probe_against_a_closed_port_is_down() {
        let outcome = probe_tcp("127.0.0.1", 1).await;
        assert_eq!(outcome.status, ProbeStatus::Down);
    }

    #[tokio::test]
    async fn heartbeat_probe_is_always_up_with_no_timing() {
        let outcome = probe_heartbeat();
        assert_eq!(outcome.status, ProbeStatus::Up);
        assert!(outcome.response_time_ms.is_none());
    }
}
