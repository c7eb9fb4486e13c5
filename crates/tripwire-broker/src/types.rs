//! Core data model: trigger events, bindings, and the event-type catalog.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Secret value requesting server-side generation on event creation.
pub const GENERATE_KEYWORD: &str = "!generate";

// ---------------------------------------------------------------------------
// Call context
// ---------------------------------------------------------------------------

/// Request-scoped context propagated through every core operation.
///
/// `request_id` and `auth_entity` are forwarded to event providers as HTTP
/// headers; `account` scopes every key the store touches.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Tenant account id of the caller.
    pub account: String,
    /// Correlation id, forwarded as `X-Request-Id`.
    pub request_id: String,
    /// Opaque authenticated-entity blob, forwarded as
    /// `X-Authenticated-Entity`.
    pub auth_entity: String,
}

impl CallContext {
    /// Create a context for the given account with no correlation data.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..Default::default()
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_auth_entity(mut self, auth_entity: impl Into<String>) -> Self {
        self.auth_entity = auth_entity.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Trigger events and bindings
// ---------------------------------------------------------------------------

/// Descriptive fields reported by an event provider for a subscribed event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub status: String,
}

/// A normalized trigger event, identified by its URI.
///
/// Stored as a hash record under `event:{uri}`; every field is write-once
/// (first writer wins per field).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub uri: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub kind: String,
    pub account: String,
    pub secret: String,
    #[serde(flatten)]
    pub info: EventInfo,
}

impl TriggerEvent {
    /// Rebuild an event from its stored hash-record fields.
    pub fn from_fields(uri: impl Into<String>, fields: &HashMap<String, String>) -> Self {
        let get = |name: &str| fields.get(name).cloned().unwrap_or_default();
        Self {
            uri: uri.into(),
            event_type: get("type"),
            kind: get("kind"),
            account: get("account"),
            secret: get("secret"),
            info: EventInfo {
                endpoint: get("endpoint"),
                description: get("description"),
                help: get("help"),
                status: get("status"),
            },
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{}) {}",
            self.uri, self.event_type, self.kind, self.info.status
        )
    }
}

/// A binding between a trigger event and a pipeline.
///
/// Exists only as paired membership in the `trigger:{uri}` and
/// `pipeline:{id}` sets; it carries no attributes of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Event URI (prefix stripped, account hash preserved).
    pub event: String,
    /// Pipeline id in the external build service.
    pub pipeline: String,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.event, self.pipeline)
    }
}

// ---------------------------------------------------------------------------
// Event-type catalog
// ---------------------------------------------------------------------------

/// A single template-field definition in an [`EventType`] config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    /// Regex the field value must fully match (empty = unvalidated).
    #[serde(default)]
    pub validator: String,
    #[serde(default)]
    pub required: bool,
}

/// Catalog entry describing a family of events and the provider service
/// that handles them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub kind: String,
    #[serde(rename = "service-url")]
    pub service_url: String,
    /// Template with `{{name}}` placeholders, e.g.
    /// `registry:dockerhub:{{namespace}}:{{name}}:push`.
    #[serde(rename = "uri-template", default)]
    pub uri_template: String,
    /// Regex matching a fully-formed URI without its account suffix.
    #[serde(rename = "uri-pattern", default)]
    pub uri_pattern: String,
    #[serde(default)]
    pub config: Vec<ConfigField>,
}

/// The catalog-file document: `{ "types": [ EventType, … ] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypes {
    #[serde(default)]
    pub types: Vec<EventType>,
}
