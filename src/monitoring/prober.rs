use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::error::Error as StdError;
use std::time::Instant;
use tracing::{debug, warn};

use crate::db::enums::{ErrorKind, HttpMethod, ProbeStatus};
use crate::db::models::{Monitor, ProbeResult};

/// Issues one HTTP request per check and classifies the outcome. Every
/// outcome, including transport failure, becomes a [`ProbeResult`].
#[derive(Debug, Clone)]
pub struct Prober {
    client: Client,
}

impl Prober {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("apiwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub async fn probe(&self, monitor: &Monitor) -> ProbeResult {
        let mut request = self
            .client
            .request(monitor.method.into(), &monitor.url)
            .timeout(monitor.probe_timeout());

        for (name, value) in &monitor.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!(monitor_id = monitor.id, header = %name, "Skipping invalid request header."),
            }
        }

        let mut request_size = 0;
        if let Some(body) = monitor.body.as_deref().filter(|b| !b.is_empty()) {
            if monitor.method != HttpMethod::Get {
                if serde_json::from_str::<serde_json::Value>(body).is_ok() {
                    request = request.header(CONTENT_TYPE, "application/json");
                }
                request_size = body.len() as u64;
                request = request.body(body.to_string());
            }
        }

        let started = Instant::now();
        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status();
                response.bytes().await.map(|body| (status, body.len() as u64))
            }
            Err(e) => Err(e),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let (status, status_code, message, error_kind, response_size) = match outcome {
            Ok((code, response_size)) => {
                let (status, message, error_kind) = classify_response(monitor, code, latency_ms);
                (status, code.as_u16(), message, error_kind, response_size)
            }
            Err(e) => {
                let (error_kind, message) = classify_transport_error(&e);
                debug!(monitor_id = monitor.id, error = %e, "Probe transport failure.");
                (ProbeStatus::Down, 0, message, error_kind, 0)
            }
        };

        ProbeResult {
            monitor_id: monitor.id,
            status,
            status_code,
            latency_ms,
            message,
            timestamp: Utc::now(),
            request_size,
            response_size,
            error_kind,
        }
    }
}

fn classify_response(
    monitor: &Monitor,
    code: StatusCode,
    latency_ms: u64,
) -> (ProbeStatus, String, ErrorKind) {
    if code.as_u16() != monitor.expected_status {
        let error_kind = if code.is_server_error() {
            ErrorKind::Server
        } else if code.is_client_error() {
            ErrorKind::Client
        } else {
            ErrorKind::Unknown
        };
        let message = format!("API returned unexpected status code: {}", code.as_u16());
        return (ProbeStatus::Down, message, error_kind);
    }

    let message = if latency_ms > monitor.expected_latency_ms {
        format!(
            "API is up but response time ({latency_ms}ms) exceeds expected time ({}ms)",
            monitor.expected_latency_ms
        )
    } else {
        "API is up and running".to_string()
    };
    (ProbeStatus::Up, message, ErrorKind::None)
}

fn classify_transport_error(e: &reqwest::Error) -> (ErrorKind, String) {
    if e.is_timeout() {
        return (ErrorKind::Timeout, "Request timed out".to_string());
    }
    if is_dns_failure(e) {
        return (ErrorKind::Connection, "DNS lookup failed".to_string());
    }
    if is_connection_refused(e) {
        return (ErrorKind::Connection, "Connection refused".to_string());
    }
    if e.is_connect() {
        return (ErrorKind::Connection, e.to_string());
    }
    (ErrorKind::Unknown, e.to_string())
}

fn sources(e: &reqwest::Error) -> impl Iterator<Item = &(dyn StdError + 'static)> {
    std::iter::successors(e.source(), |&err| err.source())
}

fn is_dns_failure(e: &reqwest::Error) -> bool {
    sources(e).any(|err| {
        let text = err.to_string().to_lowercase();
        text.contains("dns error") || text.contains("failed to lookup address")
    })
}

fn is_connection_refused(e: &reqwest::Error) -> bool {
    sources(e).any(|err| {
        err.downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::ConnectionRefused)
    })
}
