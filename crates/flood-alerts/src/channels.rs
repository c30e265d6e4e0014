//! Notification channels for alert delivery.
//!
//! The dispatcher only knows the [`NotificationChannel`] trait. This module
//! ships a JSON webhook channel, a channel that writes alerts to the log, and
//! a [`ChannelRouter`] that picks a channel by destination prefix.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AlertError, Result};
use crate::render::RenderedMessage;

/// Boxed future returned by channel operations.
pub type ChannelFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait for notification channels.
///
/// Implement this trait to deliver alerts through another protocol or service.
pub trait NotificationChannel: Send + Sync + fmt::Debug {
    /// Returns the name of this channel.
    fn name(&self) -> &str;

    /// Delivers `message` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::DeliveryFailed` if the message was not accepted.
    fn send<'a>(&'a self, destination: &'a str, message: &'a RenderedMessage) -> ChannelFuture<'a>;
}

/// Configuration for a webhook channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// The name of this webhook.
    pub name: String,
    /// HTTP headers to include with requests.
    pub headers: HashMap<String, String>,
    /// Timeout for HTTP requests.
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            name: "webhook".to_string(),
            headers: HashMap::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl WebhookConfig {
    /// Adds a header to the configuration.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A webhook notification channel.
///
/// POSTs a [`WebhookPayload`] as JSON to the destination URL. Any non-2xx
/// answer is a delivery failure.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    /// Creates a new webhook channel with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidChannel` if the HTTP client cannot be built.
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AlertError::InvalidChannel {
                reason: e.to_string(),
            })?;
        Ok(Self { config, client })
    }

    /// Formats the message as JSON.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::SerializationError` if serialization fails.
    pub fn format_payload(&self, message: &RenderedMessage) -> Result<String> {
        serde_json::to_string(&WebhookPayload::from_message(message)).map_err(AlertError::from)
    }

    fn failed(&self, reason: impl Into<String>) -> AlertError {
        AlertError::DeliveryFailed {
            channel: self.config.name.clone(),
            reason: reason.into(),
        }
    }
}

impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn send<'a>(&'a self, destination: &'a str, message: &'a RenderedMessage) -> ChannelFuture<'a> {
        Box::pin(async move {
            let mut request = self
                .client
                .post(destination)
                .json(&WebhookPayload::from_message(message));
            for (key, value) in &self.config.headers {
                request = request.header(key, value);
            }

            let response = request.send().await.map_err(|e| self.failed(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(self.failed(format!("status {}", status.as_u16())));
            }

            debug!(
                channel = %self.name(),
                url = %destination,
                event_id = %message.event_id,
                "webhook delivered"
            );
            Ok(())
        })
    }
}

/// The payload format for webhook notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Payload version.
    pub version: String,
    /// Summary line.
    pub title: String,
    /// Description.
    pub text: String,
    /// Severity tier.
    pub severity: String,
    /// Owning tenant.
    pub tenant: String,
    /// Upstream event id.
    pub event_id: String,
    /// True for operator test alerts.
    pub test: bool,
    /// Structured details.
    pub fields: Vec<WebhookField>,
    /// When the message was rendered.
    pub sent_at: String,
}

/// A field in a webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookField {
    /// Field label.
    pub name: String,
    /// Field value.
    pub value: String,
}

impl WebhookPayload {
    /// Creates a payload from a rendered message.
    #[must_use]
    pub fn from_message(message: &RenderedMessage) -> Self {
        Self {
            version: "1".to_string(),
            title: message.title.clone(),
            text: message.body.clone(),
            severity: message.severity.to_string(),
            tenant: message.tenant.clone(),
            event_id: message.event_id.clone(),
            test: message.test,
            fields: message
                .fields
                .iter()
                .map(|(name, value)| WebhookField {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            sent_at: message.rendered_at.to_rfc3339(),
        }
    }
}

/// A channel that writes alerts to the log.
#[derive(Debug, Clone, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn send<'a>(&'a self, destination: &'a str, message: &'a RenderedMessage) -> ChannelFuture<'a> {
        Box::pin(async move {
            info!(
                destination = %destination,
                tenant = %message.tenant,
                severity = %message.severity,
                event_id = %message.event_id,
                test = message.test,
                "{}",
                message.to_text()
            );
            Ok(())
        })
    }
}

/// Routes each destination to a channel by prefix.
///
/// Routes are tried in registration order; the first prefix that matches
/// wins. Destinations matching no route fail with `AlertError::NoRoute`
/// unless a fallback is set.
#[derive(Debug, Clone, Default)]
pub struct ChannelRouter {
    routes: Vec<(String, Arc<dyn NotificationChannel>)>,
    fallback: Option<Arc<dyn NotificationChannel>>,
}

impl ChannelRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends destinations starting with `prefix` to `channel`.
    #[must_use]
    pub fn route(mut self, prefix: impl Into<String>, channel: Arc<dyn NotificationChannel>) -> Self {
        self.routes.push((prefix.into(), channel));
        self
    }

    /// Sends unmatched destinations to `channel`.
    #[must_use]
    pub fn fallback(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.fallback = Some(channel);
        self
    }

    /// The default routing: `http://` and `https://` to a webhook channel,
    /// `log:` to the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook channel cannot be built.
    pub fn standard(webhook: WebhookConfig) -> Result<Self> {
        let webhook: Arc<dyn NotificationChannel> = Arc::new(WebhookChannel::new(webhook)?);
        Ok(Self::new()
            .route("http://", webhook.clone())
            .route("https://", webhook)
            .route("log:", Arc::new(LogChannel)))
    }

    /// Returns the channel for `destination`.
    #[must_use]
    pub fn resolve(&self, destination: &str) -> Option<&Arc<dyn NotificationChannel>> {
        self.routes
            .iter()
            .find(|(prefix, _)| destination.starts_with(prefix.as_str()))
            .map(|(_, channel)| channel)
            .or(self.fallback.as_ref())
    }
}

impl NotificationChannel for ChannelRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn send<'a>(&'a self, destination: &'a str, message: &'a RenderedMessage) -> ChannelFuture<'a> {
        match self.resolve(destination) {
            Some(channel) => channel.send(destination, message),
            None => {
                warn!(destination = %destination, "no channel for destination");
                Box::pin(async move {
                    Err(AlertError::NoRoute {
                        destination: destination.to_string(),
                    })
                })
            }
        }
    }
}
