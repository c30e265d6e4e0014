//! HTTP event source backed by `reqwest`.

use std::time::Duration;

use flood_core::DetectionEvent;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, UpstreamError};
use crate::source::{EventSource, SourceFuture};

/// Connection settings for the detection service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSourceConfig {
    /// Base URL, for example `https://detect.example.net/api`.
    pub base_url: String,
    /// Bearer token, if the service requires one.
    pub api_key: Option<String>,
    /// Path of the active-events listing.
    pub events_path: String,
    /// Path of the liveness endpoint.
    pub ping_path: String,
    /// Transport-level request timeout.
    pub timeout: Duration,
}

impl HttpSourceConfig {
    /// Creates a configuration with default paths and a 10 second timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            events_path: "/events/active".to_string(),
            ping_path: "/health".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the active-events path.
    #[must_use]
    pub fn with_events_path(mut self, path: impl Into<String>) -> Self {
        self.events_path = path.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Fetches events from the detection service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpEventSource {
    client: reqwest::Client,
    config: HttpSourceConfig,
}

impl HttpEventSource {
    /// Builds the source.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::InvalidConfig` if the base URL is not http(s)
    /// or the HTTP client cannot be built.
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        let base = config.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(UpstreamError::InvalidConfig {
                reason: format!("base URL must be http(s), got '{base}'"),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("floodwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpSourceConfig {
        &self.config
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let mut request = self.client.get(self.config.url(path));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                }
            } else {
                UpstreamError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                code: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl EventSource for HttpEventSource {
    fn fetch_active_events(&self) -> SourceFuture<'_, Vec<DetectionEvent>> {
        Box::pin(async move {
            let body = self.get(&self.config.events_path).await?.bytes().await?;
            let events = parse_events(&body)?;
            debug!(count = events.len(), "fetched active events");
            Ok(events)
        })
    }

    fn ping(&self) -> SourceFuture<'_, ()> {
        Box::pin(async move {
            self.get(&self.config.ping_path).await?;
            Ok(())
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EventsPayload {
    Wrapped {
        #[serde(alias = "data", alias = "attacks")]
        events: Vec<DetectionEvent>,
    },
    Bare(Vec<DetectionEvent>),
}

/// Decodes an active-events response body.
///
/// Accepts either `{"events": [...]}` (also under `data` or `attacks`) or a
/// bare array.
///
/// # Errors
///
/// Returns `UpstreamError::Malformed` for anything else.
pub fn parse_events(body: &[u8]) -> Result<Vec<DetectionEvent>> {
    let payload: EventsPayload = serde_json::from_slice(body)?;
    Ok(match payload {
        EventsPayload::Wrapped { events } | EventsPayload::Bare(events) => events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod config_tests {
        use super::*;

        #[test]
        fn url_joins_cleanly() {
            let config = HttpSourceConfig::new("https://detect.example.net/api/");
            assert_eq!(
                config.url("/events/active"),
                "https://detect.example.net/api/events/active"
            );
            assert_eq!(config.url("health"), "https://detect.example.net/api/health");
        }

        #[test]
        fn rejects_non_http_url() {
            let err = HttpEventSource::new(HttpSourceConfig::new("ftp://detect")).unwrap_err();
            assert!(matches!(err, UpstreamError::InvalidConfig { .. }));
        }

        #[test]
        fn builds_with_api_key() {
            let source = HttpEventSource::new(
                HttpSourceConfig::new("https://detect.example.net")
                    .with_api_key("secret")
                    .with_timeout(Duration::from_secs(3)),
            )
            .unwrap();
            assert_eq!(source.config().api_key.as_deref(), Some("secret"));
            assert_eq!(source.config().timeout, Duration::from_secs(3));
        }
    }

    mod parse_tests {
        use super::*;

        const EVENT: &str = r#"{
            "id": "evt-1",
            "ip": "203.0.113.5",
            "type": "udp_flood",
            "start_time": "2026-01-01T12:00:00Z",
            "peak_bps": 2000000000,
            "peak_pps": 50000
        }"#;

        #[test]
        fn wrapped_payload() {
            let body = format!(r#"{{"events": [{EVENT}]}}"#);
            let events = parse_events(body.as_bytes()).unwrap();

            assert_eq!(events.len(), 1);
            assert_eq!(events[0].id, "evt-1");
            assert_eq!(events[0].address, "203.0.113.5");
            assert_eq!(events[0].kind, "udp_flood");
            assert!(events[0].is_ongoing());
        }

        #[test]
        fn data_alias_payload() {
            let body = format!(r#"{{"data": [{EVENT}]}}"#);
            assert_eq!(parse_events(body.as_bytes()).unwrap().len(), 1);
        }

        #[test]
        fn bare_array_payload() {
            let body = format!("[{EVENT}, {EVENT}]");
            assert_eq!(parse_events(body.as_bytes()).unwrap().len(), 2);
        }

        #[test]
        fn empty_list() {
            assert!(parse_events(br#"{"events": []}"#).unwrap().is_empty());
        }

        #[test]
        fn garbage_is_malformed() {
            for body in [&b"not json"[..], br#"{"events": 3}"#, br#"{"id": "x"}"#] {
                let err = parse_events(body).unwrap_err();
                assert!(matches!(err, UpstreamError::Malformed { .. }), "{err}");
            }
        }
    }
}
