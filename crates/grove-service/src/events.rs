//! Event-bus notifications emitted after successful mutations.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::BusConfig;
use crate::error::IntegrationError;

/// Publishes a JSON payload to a topic.
pub trait EventPublisher: Send + Sync + 'static {
    fn publish(
        &self,
        topic: &str,
        payload: Value,
    ) -> impl Future<Output = Result<(), IntegrationError>> + Send;
}

/// Envelope posted to the bus for every event.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    topic: &'a str,
    originator: &'a str,
    timestamp: String,
    #[serde(rename = "mime-type")]
    mime_type: &'static str,
    payload: Value,
}

/// HTTP event-bus client.
///
/// Constructed once at startup and shared; after [`shutdown`](Self::shutdown)
/// every publish fails with [`IntegrationError::Closed`].
pub struct BusApiPublisher {
    http: reqwest::Client,
    config: BusConfig,
    closed: AtomicBool,
}

impl BusApiPublisher {
    pub fn new(config: BusConfig) -> Result<Self, IntegrationError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        info!(url = %config.url, originator = %config.originator, "Event bus publisher ready");
        Ok(Self {
            http,
            config,
            closed: AtomicBool::new(false),
        })
    }

    /// Stops accepting events. Idempotent.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Event bus publisher shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl EventPublisher for BusApiPublisher {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), IntegrationError> {
        if self.is_closed() {
            return Err(IntegrationError::Closed);
        }

        let envelope = Envelope {
            topic,
            originator: &self.config.originator,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            mime_type: "application/json",
            payload,
        };

        let mut request = self.http.post(&self.config.url).json(&envelope);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IntegrationError::Status {
                service: "event bus",
                status: status.as_u16(),
            });
        }

        debug!(topic, "Event published");
        Ok(())
    }
}

/// Serializes `payload` and publishes it, logging failures.
pub(crate) async fn emit<P: EventPublisher, T: Serialize>(
    publisher: &P,
    topic: &str,
    payload: &T,
) -> Result<(), IntegrationError> {
    let value = serde_json::to_value(payload)?;
    publisher.publish(topic, value).await.inspect_err(|e| {
        error!(topic, error = %e, "Failed to publish event");
    })
}
