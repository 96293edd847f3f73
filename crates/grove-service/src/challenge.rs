//! Lookup of challenges that reference a group.

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::ChallengeConfig;
use crate::error::IntegrationError;

/// Answers whether any challenge is associated with a group.
pub trait ChallengeChecker: Send + Sync + 'static {
    fn has_associated_challenges(
        &self,
        group_id: Uuid,
    ) -> impl Future<Output = Result<bool, IntegrationError>> + Send;
}

/// Queries the challenge API with a `groups` filter. A non-empty result
/// array means the group is in use.
pub struct HttpChallengeChecker {
    http: reqwest::Client,
    config: ChallengeConfig,
}

impl HttpChallengeChecker {
    pub fn new(config: ChallengeConfig) -> Result<Self, IntegrationError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn filter_url(&self, group_id: Uuid) -> String {
        format!("{}?groups=[\"{group_id}\"]", self.config.url)
    }
}

impl ChallengeChecker for HttpChallengeChecker {
    async fn has_associated_challenges(&self, group_id: Uuid) -> Result<bool, IntegrationError> {
        let mut request = self
            .http
            .get(self.filter_url(group_id))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IntegrationError::Status {
                service: "challenge API",
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let associated = body.as_array().is_some_and(|items| !items.is_empty());
        debug!(%group_id, associated, "Checked challenge associations");
        Ok(associated)
    }
}
