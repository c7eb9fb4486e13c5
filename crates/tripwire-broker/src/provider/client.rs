//! HTTP client for one event-provider service.
//!
//! Wire protocol (JSON bodies, base64url credentials in the path):
//! ```text
//! GET    {base}/event/{uri}                                 → EventInfo
//! POST   {base}/event/{uri}/{secret}/{base64(credentials)}  → EventInfo (subscribe)
//! DELETE {base}/event/{uri}/{base64(credentials)}           (unsubscribe)
//! GET    {base}/ping                                        (health)
//! ```
//!
//! Request correlation and the authenticated-entity blob travel as headers
//! taken from the call context. HTTP 501 (or a body carrying the well-known
//! `ErrNotImplemented` marker) maps to [`ProviderError::NotImplemented`],
//! the only provider error callers recover from.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::errors::ProviderError;
use crate::types::{CallContext, EventInfo};

/// Correlation-id header forwarded to providers.
pub const HEADER_REQUEST_ID: &str = "X-Request-Id";
/// Authenticated-entity header forwarded to providers.
pub const HEADER_AUTH_ENTITY: &str = "X-Authenticated-Entity";

/// Marker string providers return to signal "subscription not applicable".
const NOT_IMPLEMENTED_MARKER: &str = "ErrNotImplemented";

/// Client for a single event-provider service URL.
pub struct ProviderClient {
    base_url: String,
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Describe an event without subscribing.
    pub async fn event_info(
        &self,
        ctx: &CallContext,
        uri: &str,
    ) -> Result<EventInfo, ProviderError> {
        let url = format!("{}/event/{uri}", self.base_url);
        let resp = self.send(self.http.get(&url), ctx).await?;
        decode_info(resp).await
    }

    /// Subscribe the event in the upstream system; returns the provider's
    /// describe fields.
    pub async fn subscribe(
        &self,
        ctx: &CallContext,
        uri: &str,
        secret: &str,
        credentials: &HashMap<String, String>,
    ) -> Result<EventInfo, ProviderError> {
        let url = format!(
            "{}/event/{uri}/{secret}/{}",
            self.base_url,
            encode_credentials(credentials)?
        );
        let resp = self.send(self.http.post(&url), ctx).await?;
        decode_info(resp).await
    }

    /// Remove the upstream subscription.
    pub async fn unsubscribe(
        &self,
        ctx: &CallContext,
        uri: &str,
        credentials: &HashMap<String, String>,
    ) -> Result<(), ProviderError> {
        let url = format!(
            "{}/event/{uri}/{}",
            self.base_url,
            encode_credentials(credentials)?
        );
        self.send(self.http.delete(&url), ctx).await?;
        Ok(())
    }

    /// Provider liveness probe.
    pub async fn ping(&self, ctx: &CallContext) -> Result<(), ProviderError> {
        let url = format!("{}/ping", self.base_url);
        self.send(self.http.get(&url), ctx).await?;
        Ok(())
    }

    /// Attach context headers, send, and classify the response status.
    async fn send(
        &self,
        mut builder: reqwest::RequestBuilder,
        ctx: &CallContext,
    ) -> Result<reqwest::Response, ProviderError> {
        if !ctx.request_id.is_empty() {
            builder = builder.header(HEADER_REQUEST_ID, &ctx.request_id);
        }
        if !ctx.auth_entity.is_empty() {
            builder = builder.header(HEADER_AUTH_ENTITY, &ctx.auth_entity);
        }

        let resp = builder.send().await.map_err(|e| ProviderError::Transport {
            message: format!("request to event provider failed: {e}"),
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status.as_u16() == 501 || body.contains(NOT_IMPLEMENTED_MARKER) {
            return Err(ProviderError::NotImplemented);
        }
        if status.is_client_error() {
            return Err(ProviderError::Client {
                status: status.as_u16(),
                message: body,
            });
        }
        Err(ProviderError::Transport {
            message: format!("event provider returned HTTP {status}: {body}"),
        })
    }
}

fn encode_credentials(credentials: &HashMap<String, String>) -> Result<String, ProviderError> {
    let json = serde_json::to_vec(credentials).map_err(|e| ProviderError::Protocol {
        message: format!("failed to serialize credentials: {e}"),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

async fn decode_info(resp: reqwest::Response) -> Result<EventInfo, ProviderError> {
    resp.json::<EventInfo>()
        .await
        .map_err(|e| ProviderError::Protocol {
            message: format!("failed to parse event info: {e}"),
        })
}
