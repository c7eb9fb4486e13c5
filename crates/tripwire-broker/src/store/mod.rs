//! The binding store: trigger events, triggers, and pipelines.
//!
//! Three derived indexes live in the key-value engine:
//! ```text
//! event:{uri}      — hash record for the TriggerEvent
//! trigger:{uri}    — set of pipeline ids bound to the event
//! pipeline:{id}    — set of event URIs bound to the pipeline
//! ```
//! Every binding mutation updates both set sides inside one engine
//! transaction, so `p ∈ trigger[e] ⇔ e ∈ pipeline[p]` holds at every
//! quiescent point and no reader observes a half-update. Any command error
//! mid-transaction leads to an explicit discard; the first error surfaces.
//!
//! Tenant isolation is an existence lie: events owned by another account
//! (other than the public one) read as `EventNotFound`, never as a
//! permission error.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

use crate::account::{account_hash, PUBLIC_ACCOUNT, PUBLIC_ACCOUNT_HASH};
use crate::errors::{EngineError, ProviderError, StoreError};
use crate::keys;
use crate::provider::EventProviderManager;
use crate::traits::{CredentialsResolver, KvEngine, KvTransaction, PipelineGateway};
use crate::types::{CallContext, Trigger, TriggerEvent, GENERATE_KEYWORD};

/// Store for events, triggers, and pipelines over a shared key-value
/// engine.
///
/// Stateless above the engine; concurrency safety is delegated to the
/// engine's transactions.
pub struct TriggerStore {
    engine: Arc<dyn KvEngine>,
    manager: Arc<EventProviderManager>,
    gateway: Arc<dyn PipelineGateway>,
    credentials: Arc<dyn CredentialsResolver>,
}

/// Discard the transaction and surface the command error.
async fn abort(txn: Box<dyn KvTransaction>, err: EngineError) -> StoreError {
    if let Err(discard_err) = txn.discard().await {
        tracing::error!(error = %discard_err, "failed to discard transaction");
    }
    tracing::error!(error = %err, "transaction command failed, aborted");
    StoreError::Engine(err)
}

/// Append items not already present, preserving first-seen order.
fn merge_unique(acc: &mut Vec<String>, extra: Vec<String>) {
    for item in extra {
        if !acc.contains(&item) {
            acc.push(item);
        }
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl TriggerStore {
    pub fn new(
        engine: Arc<dyn KvEngine>,
        manager: Arc<EventProviderManager>,
        gateway: Arc<dyn PipelineGateway>,
        credentials: Arc<dyn CredentialsResolver>,
    ) -> Self {
        Self {
            engine,
            manager,
            gateway,
            credentials,
        }
    }

    // -----------------------------------------------------------------------
    // Trigger events
    // -----------------------------------------------------------------------

    /// Define a trigger event: construct its URI, subscribe it with the
    /// event provider (falling back to describe-only when the provider
    /// reports the subscription is not applicable), and persist the record.
    ///
    /// Record fields are write-once: repeated creation of the same URI
    /// leaves existing fields untouched.
    pub async fn create_event(
        &self,
        ctx: &CallContext,
        event_type: &str,
        kind: &str,
        secret: &str,
        values: &HashMap<String, String>,
    ) -> Result<TriggerEvent, StoreError> {
        tracing::debug!(event_type = %event_type, kind = %kind, "creating trigger event");
        let uri = self
            .manager
            .construct_event_uri(event_type, kind, &ctx.account, values)?;

        let secret = if secret == GENERATE_KEYWORD {
            tracing::debug!("auto-generating trigger secret");
            generate_secret()
        } else {
            secret.to_string()
        };

        let credentials = self.credentials.resolve(ctx).await;
        let info = match self
            .manager
            .subscribe_to_event(ctx, &uri, &secret, credentials.as_ref())
            .await
        {
            Ok(info) => info,
            Err(ProviderError::NotImplemented) => {
                tracing::debug!(uri = %uri, "subscription not applicable, describe-only fallback");
                self.manager.get_event_info(ctx, &uri, &secret).await?
            }
            Err(e) => return Err(e.into()),
        };

        let event = TriggerEvent {
            uri: uri.clone(),
            event_type: event_type.to_string(),
            kind: kind.to_string(),
            account: ctx.account.clone(),
            secret,
            info,
        };

        let key = keys::event_key(&uri, &account_hash(&ctx.account));
        let fields = [
            ("type", event.event_type.as_str()),
            ("kind", event.kind.as_str()),
            ("account", event.account.as_str()),
            ("secret", event.secret.as_str()),
            ("description", event.info.description.as_str()),
            ("endpoint", event.info.endpoint.as_str()),
            ("help", event.info.help.as_str()),
            ("status", event.info.status.as_str()),
        ];

        let mut txn = self.engine.begin().await?;
        for (field, value) in fields {
            if let Err(e) = txn.hsetnx(&key, field, value).await {
                return Err(abort(txn, e).await);
            }
        }
        txn.commit().await?;
        Ok(event)
    }

    /// Read one trigger event by URI. Events owned by a different,
    /// non-public account read as absent.
    pub async fn get_event(
        &self,
        ctx: &CallContext,
        uri: &str,
    ) -> Result<TriggerEvent, StoreError> {
        keys::check_single_key(uri)?;
        let key = keys::event_key(uri, &account_hash(&ctx.account));
        let fields = self.engine.hgetall(&key).await?;
        if fields.is_empty() {
            return Err(StoreError::EventNotFound {
                uri: uri.to_string(),
            });
        }
        let event = TriggerEvent::from_fields(uri, &fields);
        if !event.account.is_empty()
            && event.account != ctx.account
            && event.account != PUBLIC_ACCOUNT
        {
            return Err(StoreError::EventNotFound {
                uri: uri.to_string(),
            });
        }
        Ok(event)
    }

    /// List trigger events, optionally filtered by type, kind, and a URI
    /// glob. Events invisible to the caller are skipped; other read errors
    /// propagate.
    pub async fn get_events(
        &self,
        ctx: &CallContext,
        event_type: &str,
        kind: &str,
        filter: &str,
    ) -> Result<Vec<TriggerEvent>, StoreError> {
        tracing::debug!(event_type = %event_type, kind = %kind, filter = %filter, "listing trigger events");
        let base = keys::prefixed(keys::EVENT_PREFIX, filter);
        let pattern = if base.ends_with('*') {
            base
        } else {
            format!("{base}:*")
        };

        let mut events = Vec::new();
        for key in self.engine.keys(&pattern).await? {
            let uri = keys::strip_prefix(keys::EVENT_PREFIX, &key);
            match self.get_event(ctx, uri).await {
                Ok(event) => {
                    if (event_type.is_empty() || event.event_type == event_type)
                        && (kind.is_empty() || event.kind == kind)
                    {
                        events.push(event);
                    }
                }
                // Keyspace races and cross-tenant keys read as absent.
                Err(StoreError::EventNotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        events.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(events)
    }

    /// Read the webhook secret stored for an event.
    pub async fn get_secret(&self, ctx: &CallContext, uri: &str) -> Result<String, StoreError> {
        Ok(self.get_event(ctx, uri).await?.secret)
    }

    /// Delete a trigger event. Fails while any pipeline is still bound;
    /// the provider-side unsubscribe is best-effort after the commit.
    pub async fn delete_event(&self, ctx: &CallContext, uri: &str) -> Result<(), StoreError> {
        keys::check_single_key(uri)?;
        tracing::debug!(uri = %uri, "deleting trigger event");
        let hash = account_hash(&ctx.account);
        let event_key = keys::event_key(uri, &hash);
        let trigger_key = keys::trigger_key(uri, &hash);

        let fields = self.engine.hgetall(&event_key).await?;
        if fields.is_empty() {
            return Err(StoreError::EventNotFound {
                uri: uri.to_string(),
            });
        }
        // Deleting is a write: only the owning account may do it, and the
        // mismatch reads as absence.
        let owner = fields.get("account").map(String::as_str).unwrap_or("");
        if !owner.is_empty() && owner != ctx.account {
            return Err(StoreError::EventNotFound {
                uri: uri.to_string(),
            });
        }

        let bound = self.engine.zrange(&trigger_key).await?;
        if !bound.is_empty() {
            return Err(StoreError::EventDeleteWithTriggers {
                uri: uri.to_string(),
            });
        }

        let mut txn = self.engine.begin().await?;
        if let Err(e) = txn.del(&event_key).await {
            return Err(abort(txn, e).await);
        }
        if let Err(e) = txn.del(&trigger_key).await {
            return Err(abort(txn, e).await);
        }
        txn.commit().await?;

        let credentials = self.credentials.resolve(ctx).await;
        match self
            .manager
            .unsubscribe_from_event(ctx, uri, credentials.as_ref())
            .await
        {
            Ok(()) => {}
            Err(ProviderError::NotImplemented) => {
                tracing::debug!(uri = %uri, "provider does not implement unsubscribe");
            }
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "best-effort unsubscribe failed");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Triggers (bindings)
    // -----------------------------------------------------------------------

    /// Bind an event to pipelines. Every pipeline id is verified against
    /// the build service before any mutation; both index sides are written
    /// in one transaction.
    pub async fn create_triggers_for_event(
        &self,
        ctx: &CallContext,
        uri: &str,
        pipelines: &[String],
    ) -> Result<(), StoreError> {
        tracing::debug!(uri = %uri, pipelines = ?pipelines, "creating triggers for event");
        if pipelines.is_empty() {
            return Ok(());
        }
        // The event record must exist and be visible: no dangling bindings.
        self.get_event(ctx, uri).await?;
        for pipeline in pipelines {
            self.check_pipeline(pipeline).await?;
        }

        let trigger_key = keys::trigger_key(uri, &account_hash(&ctx.account));
        let full_uri = keys::strip_prefix(keys::TRIGGER_PREFIX, &trigger_key).to_string();

        let mut txn = self.engine.begin().await?;
        for pipeline in pipelines {
            if let Err(e) = txn
                .zadd(&keys::pipeline_key(pipeline), std::slice::from_ref(&full_uri))
                .await
            {
                return Err(abort(txn, e).await);
            }
        }
        if let Err(e) = txn.zadd(&trigger_key, pipelines).await {
            return Err(abort(txn, e).await);
        }
        txn.commit().await?;
        Ok(())
    }

    /// Bind a pipeline to events; the symmetric twin of
    /// [`create_triggers_for_event`](Self::create_triggers_for_event). The
    /// pipeline is checked once.
    pub async fn create_triggers_for_pipeline(
        &self,
        ctx: &CallContext,
        pipeline: &str,
        events: &[String],
    ) -> Result<(), StoreError> {
        tracing::debug!(pipeline = %pipeline, events = ?events, "creating triggers for pipeline");
        if events.is_empty() {
            return Ok(());
        }
        self.check_pipeline(pipeline).await?;
        for uri in events {
            self.get_event(ctx, uri).await?;
        }

        let hash = account_hash(&ctx.account);
        let trigger_keys: Vec<String> =
            events.iter().map(|uri| keys::trigger_key(uri, &hash)).collect();
        let full_uris: Vec<String> = trigger_keys
            .iter()
            .map(|k| keys::strip_prefix(keys::TRIGGER_PREFIX, k).to_string())
            .collect();
        let pipeline_member = vec![pipeline.to_string()];

        let mut txn = self.engine.begin().await?;
        for trigger_key in &trigger_keys {
            if let Err(e) = txn.zadd(trigger_key, &pipeline_member).await {
                return Err(abort(txn, e).await);
            }
        }
        if let Err(e) = txn.zadd(&keys::pipeline_key(pipeline), &full_uris).await {
            return Err(abort(txn, e).await);
        }
        txn.commit().await?;
        Ok(())
    }

    /// Unbind pipelines from an event; both sides removed in one
    /// transaction.
    pub async fn delete_triggers_for_event(
        &self,
        ctx: &CallContext,
        uri: &str,
        pipelines: &[String],
    ) -> Result<(), StoreError> {
        tracing::debug!(uri = %uri, pipelines = ?pipelines, "deleting triggers for event");
        if pipelines.is_empty() {
            return Ok(());
        }
        keys::check_single_key(uri)?;
        let trigger_key = keys::trigger_key(uri, &account_hash(&ctx.account));
        if self.engine.zrange(&trigger_key).await?.is_empty() {
            return Err(StoreError::TriggerNotFound {
                message: format!("no triggers for event {uri}"),
            });
        }
        let full_uri = keys::strip_prefix(keys::TRIGGER_PREFIX, &trigger_key).to_string();

        let mut txn = self.engine.begin().await?;
        for pipeline in pipelines {
            if let Err(e) = txn
                .zrem(&keys::pipeline_key(pipeline), std::slice::from_ref(&full_uri))
                .await
            {
                return Err(abort(txn, e).await);
            }
        }
        if let Err(e) = txn.zrem(&trigger_key, pipelines).await {
            return Err(abort(txn, e).await);
        }
        txn.commit().await?;
        Ok(())
    }

    /// Unbind events from a pipeline; both sides removed in one
    /// transaction.
    pub async fn delete_triggers_for_pipeline(
        &self,
        ctx: &CallContext,
        pipeline: &str,
        events: &[String],
    ) -> Result<(), StoreError> {
        tracing::debug!(pipeline = %pipeline, events = ?events, "deleting triggers for pipeline");
        if events.is_empty() {
            return Ok(());
        }
        let pipeline_key = keys::pipeline_key(pipeline);
        if self.engine.zrange(&pipeline_key).await?.is_empty() {
            return Err(StoreError::TriggerNotFound {
                message: format!("no triggers for pipeline {pipeline}"),
            });
        }

        let hash = account_hash(&ctx.account);
        let trigger_keys: Vec<String> =
            events.iter().map(|uri| keys::trigger_key(uri, &hash)).collect();
        let full_uris: Vec<String> = trigger_keys
            .iter()
            .map(|k| keys::strip_prefix(keys::TRIGGER_PREFIX, k).to_string())
            .collect();
        let pipeline_member = vec![pipeline.to_string()];

        let mut txn = self.engine.begin().await?;
        for trigger_key in &trigger_keys {
            if let Err(e) = txn.zrem(trigger_key, &pipeline_member).await {
                return Err(abort(txn, e).await);
            }
        }
        if let Err(e) = txn.zrem(&pipeline_key, &full_uris).await {
            return Err(abort(txn, e).await);
        }
        txn.commit().await?;
        Ok(())
    }

    /// List `{event, pipeline}` pairs for events matching a URI glob,
    /// across the caller's account and the public one.
    pub async fn get_event_triggers(
        &self,
        ctx: &CallContext,
        filter: &str,
    ) -> Result<Vec<Trigger>, StoreError> {
        tracing::debug!(filter = %filter, "listing triggers for events");
        let base = keys::prefixed(keys::TRIGGER_PREFIX, filter);
        let patterns = if keys::has_account_suffix(&base) {
            vec![base]
        } else {
            vec![
                format!("{base}:{}", account_hash(&ctx.account)),
                format!("{base}:{PUBLIC_ACCOUNT_HASH}"),
            ]
        };

        // The account and public enumerations may overlap; dedup is
        // explicit by key.
        let mut matched: Vec<String> = Vec::new();
        for pattern in patterns {
            merge_unique(&mut matched, self.engine.keys(&pattern).await?);
        }
        matched.sort();

        let mut triggers = Vec::new();
        for key in matched {
            let event = keys::strip_prefix(keys::TRIGGER_PREFIX, &key).to_string();
            for pipeline in self.engine.zrange(&key).await? {
                triggers.push(Trigger {
                    event: event.clone(),
                    pipeline,
                });
            }
        }
        Ok(triggers)
    }

    /// List `{event, pipeline}` pairs for one pipeline, keeping only
    /// events visible to the caller.
    pub async fn get_pipeline_triggers(
        &self,
        ctx: &CallContext,
        pipeline: &str,
    ) -> Result<Vec<Trigger>, StoreError> {
        tracing::debug!(pipeline = %pipeline, "listing triggers for pipeline");
        let key = keys::pipeline_key(pipeline);
        if !self.engine.exists(&key).await? {
            return Err(StoreError::PipelineNotFound {
                message: pipeline.to_string(),
            });
        }

        let own_suffix = format!(":{}", account_hash(&ctx.account));
        let public_suffix = format!(":{PUBLIC_ACCOUNT_HASH}");
        let mut triggers = Vec::new();
        for uri in self.engine.zrange(&key).await? {
            if uri.ends_with(&own_suffix) || uri.ends_with(&public_suffix) {
                triggers.push(Trigger {
                    event: uri,
                    pipeline: pipeline.to_string(),
                });
            }
        }
        Ok(triggers)
    }

    /// List pipeline ids bound to the given events, or every pipeline with
    /// bindings when the filter is empty.
    pub async fn get_pipelines_for_triggers(
        &self,
        ctx: &CallContext,
        events: &[String],
    ) -> Result<Vec<String>, StoreError> {
        if events.is_empty() {
            tracing::debug!("listing all pipelines with triggers");
            let found = self.engine.keys(&keys::pipeline_key("")).await?;
            if found.is_empty() {
                return Err(StoreError::PipelineNotFound {
                    message: "no pipelines with triggers".to_string(),
                });
            }
            let mut ids: Vec<String> = found
                .iter()
                .map(|k| keys::strip_prefix(keys::PIPELINE_PREFIX, k).to_string())
                .collect();
            ids.sort();
            return Ok(ids);
        }

        let hash = account_hash(&ctx.account);
        let mut all: Vec<String> = Vec::new();
        for event in events {
            tracing::debug!(uri = %event, "getting pipelines for trigger filter");
            let pipelines = self.engine.zrange(&keys::trigger_key(event, &hash)).await?;
            merge_unique(&mut all, pipelines);
        }
        if all.is_empty() {
            return Err(StoreError::PipelineNotFound {
                message: format!("no pipelines for events {events:?}"),
            });
        }
        Ok(all)
    }

    /// Engine round-trip liveness probe.
    pub async fn ping(&self) -> Result<String, StoreError> {
        Ok(self.engine.ping().await?)
    }

    async fn check_pipeline(&self, pipeline: &str) -> Result<(), StoreError> {
        match self.gateway.check_pipeline_exists(pipeline).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(StoreError::PipelineCheck {
                pipeline: pipeline.to_string(),
                message: "pipeline does not exist".to_string(),
            }),
            Err(e) => Err(StoreError::PipelineCheck {
                pipeline: pipeline.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
