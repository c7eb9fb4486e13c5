//! Shared command plumbing: broker wiring and argument parsing helpers.

pub mod pipeline;
pub mod trigger;
pub mod trigger_event;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use tripwire_broker::{
    CallContext, EventProviderManager, NoopCredentialsResolver, NoopPipelineGateway, RedisConfig,
    RedisEngine, TriggerService, TriggerStore,
};

/// One wired-up broker instance plus the caller's context.
pub struct App {
    service: TriggerService,
    ctx: CallContext,
}

impl App {
    pub fn new(
        redis_host: &str,
        redis_port: u16,
        redis_password: Option<String>,
        config: &Path,
        account: &str,
    ) -> anyhow::Result<Self> {
        let engine = RedisEngine::new(RedisConfig {
            host: redis_host.to_string(),
            port: redis_port,
            password: redis_password,
            ..Default::default()
        })
        .context("failed to configure key-value engine")?;

        // One-shot commands don't need the catalog watcher.
        let manager = EventProviderManager::new(config, false);
        let store = Arc::new(TriggerStore::new(
            Arc::new(engine),
            Arc::clone(&manager),
            Arc::new(NoopPipelineGateway),
            Arc::new(NoopCredentialsResolver),
        ));

        let ctx = CallContext::new(account).with_request_id(uuid::Uuid::new_v4().to_string());
        Ok(Self {
            service: TriggerService::new(store, manager),
            ctx,
        })
    }

    pub fn store(&self) -> &TriggerStore {
        self.service.store()
    }

    pub fn service(&self) -> &TriggerService {
        &self.service
    }

    pub fn ctx(&self) -> &CallContext {
        &self.ctx
    }

    pub async fn close(&self) {
        self.service.close().await;
    }
}

/// Parse `key=value` pairs into a map.
pub fn parse_values(pairs: &[String]) -> anyhow::Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("bad value {pair:?}; expected key=value"))?;
        values.insert(key.to_string(), value.to_string());
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_values() {
        let values =
            parse_values(&["namespace=codefresh".to_string(), "name=fortune".to_string()])
                .expect("parse");
        assert_eq!(values.get("namespace").map(String::as_str), Some("codefresh"));
        assert_eq!(values.get("name").map(String::as_str), Some("fortune"));

        assert!(parse_values(&["no-equals-sign".to_string()]).is_err());
        // Values may themselves contain '='.
        let values = parse_values(&["token=a=b".to_string()]).expect("parse");
        assert_eq!(values.get("token").map(String::as_str), Some("a=b"));
    }
}
