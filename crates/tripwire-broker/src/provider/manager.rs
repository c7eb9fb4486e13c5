//! Event-provider manager: the dynamic event-type catalog and RPC routing.
//!
//! The catalog is loaded from a JSON file and held as one immutable
//! snapshot behind a lock; reload replaces the whole snapshot atomically,
//! so readers see either the old or the new catalog, never a partial one.
//! A background watcher polls the file's mtime and reloads on change; a
//! document that fails to parse (bad JSON or a bad pattern regex) is logged
//! and the previous snapshot retained.
//!
//! The manager is an explicit object wired in by the process entry point
//! and torn down with [`close`](EventProviderManager::close).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::client::ProviderClient;
use super::CatalogError;
use crate::account::account_hash;
use crate::errors::ProviderError;
use crate::keys::strip_account_suffix;
use crate::types::{CallContext, EventInfo, EventType, EventTypes};

/// How often the watcher polls the catalog file for changes.
const WATCH_PERIOD: Duration = Duration::from_secs(1);

/// One catalog entry with its patterns compiled.
struct CompiledType {
    def: EventType,
    /// Compiled `uri-pattern` (absent when the entry declares none).
    pattern: Option<Regex>,
    /// Compiled validator per config field, index-aligned with
    /// `def.config`.
    validators: Vec<Option<Regex>>,
}

#[derive(Default)]
struct Catalog {
    types: Vec<CompiledType>,
}

impl Catalog {
    fn load(path: &Path) -> Result<Self, CatalogError> {
        let data = std::fs::read(path).map_err(|e| CatalogError::Read {
            message: format!("{}: {e}", path.display()),
        })?;
        let doc: EventTypes = serde_json::from_slice(&data).map_err(|e| CatalogError::Parse {
            message: e.to_string(),
        })?;

        let mut types = Vec::with_capacity(doc.types.len());
        for def in doc.types {
            let pattern = match def.uri_pattern.as_str() {
                "" => None,
                p => Some(Regex::new(p).map_err(|e| CatalogError::Parse {
                    message: format!("bad uri-pattern for {}:{}: {e}", def.event_type, def.kind),
                })?),
            };
            let validators = def
                .config
                .iter()
                .map(|f| match f.validator.as_str() {
                    "" => Ok(None),
                    v => Regex::new(v).map(Some).map_err(|e| CatalogError::Parse {
                        message: format!("bad validator for field {}: {e}", f.name),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            types.push(CompiledType {
                def,
                pattern,
                validators,
            });
        }
        Ok(Self { types })
    }
}

/// Registry of event types and router of provider RPCs.
pub struct EventProviderManager {
    config_path: PathBuf,
    catalog: RwLock<Arc<Catalog>>,
    http: reqwest::Client,
    shutdown_tx: broadcast::Sender<()>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl EventProviderManager {
    /// Create a manager for the given catalog file. When `watch` is set, a
    /// background task reloads the catalog on file change until
    /// [`close`](Self::close).
    ///
    /// A missing or malformed file logs a warning and starts with an empty
    /// catalog; a later valid write is picked up by the watcher.
    pub fn new(config_path: impl Into<PathBuf>, watch: bool) -> Arc<Self> {
        let config_path = config_path.into();
        let catalog = match Catalog::load(&config_path) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(
                    path = %config_path.display(),
                    error = %e,
                    "failed to load event-type catalog, starting empty"
                );
                Catalog::default()
            }
        };

        let (shutdown_tx, _) = broadcast::channel(1);
        let manager = Arc::new(Self {
            config_path,
            catalog: RwLock::new(Arc::new(catalog)),
            http: reqwest::Client::new(),
            shutdown_tx,
            watcher: Mutex::new(None),
        });

        if watch {
            let task = tokio::spawn(Self::watch_config(
                Arc::clone(&manager),
                manager.shutdown_tx.subscribe(),
            ));
            *manager.watcher.lock() = Some(task);
        }
        manager
    }

    /// Stop the config watcher. Safe to call when watching is off.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(());
        let task = self.watcher.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    async fn watch_config(manager: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(WATCH_PERIOD);
        let mut last_modified = modified_time(&manager.config_path);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let modified = modified_time(&manager.config_path);
                    if modified != last_modified {
                        last_modified = modified;
                        manager.reload();
                    }
                }
            }
        }
    }

    /// Reload the catalog file, atomically swapping the snapshot on
    /// success and retaining the previous one on failure.
    pub fn reload(&self) {
        match Catalog::load(&self.config_path) {
            Ok(catalog) => {
                let count = catalog.types.len();
                *self.catalog.write() = Arc::new(catalog);
                tracing::info!(
                    path = %self.config_path.display(),
                    types = count,
                    "reloaded event-type catalog"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.config_path.display(),
                    error = %e,
                    "failed to reload event-type catalog, keeping previous snapshot"
                );
            }
        }
    }

    fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    /// Snapshot of all registered event types.
    pub fn get_types(&self) -> Vec<EventType> {
        self.snapshot().types.iter().map(|t| t.def.clone()).collect()
    }

    /// Look up one event type by `type` and `kind`.
    pub fn get_type(&self, event_type: &str, kind: &str) -> Result<EventType, ProviderError> {
        self.snapshot()
            .types
            .iter()
            .find(|t| t.def.event_type == event_type && t.def.kind == kind)
            .map(|t| t.def.clone())
            .ok_or_else(|| ProviderError::TypeNotFound {
                message: format!("{event_type}:{kind}"),
            })
    }

    /// Find the event type whose `uri-pattern` matches the URI with its
    /// account suffix stripped. Declaration order resolves ambiguity.
    pub fn match_type(&self, uri: &str) -> Result<EventType, ProviderError> {
        let bare = strip_account_suffix(uri);
        self.snapshot()
            .types
            .iter()
            .find(|t| t.pattern.as_ref().is_some_and(|p| p.is_match(bare)))
            .map(|t| t.def.clone())
            .ok_or_else(|| ProviderError::TypeNotFound {
                message: format!("no type matches uri {uri}"),
            })
    }

    /// Build the canonical event URI for a type/kind, account, and template
    /// values: validate each configured field, substitute `{{name}}`
    /// placeholders, and append the account-hash suffix.
    pub fn construct_event_uri(
        &self,
        event_type: &str,
        kind: &str,
        account: &str,
        values: &HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        let snapshot = self.snapshot();
        let compiled = snapshot
            .types
            .iter()
            .find(|t| t.def.event_type == event_type && t.def.kind == kind)
            .ok_or_else(|| ProviderError::TypeNotFound {
                message: format!("{event_type}:{kind}"),
            })?;

        let mut uri = compiled.def.uri_template.clone();
        for (field, validator) in compiled.def.config.iter().zip(&compiled.validators) {
            let value = match values.get(&field.name) {
                Some(value) => value,
                None if field.required => {
                    return Err(ProviderError::ValueValidation {
                        field: field.name.clone(),
                        message: "required value missing".to_string(),
                    });
                }
                None => continue,
            };
            if let Some(validator) = validator {
                if !validator.is_match(value) {
                    return Err(ProviderError::ValueValidation {
                        field: field.name.clone(),
                        message: format!("value {value:?} does not match {}", field.validator),
                    });
                }
            }
            uri = uri.replace(&format!("{{{{{}}}}}", field.name), value);
        }

        if let Some(start) = uri.find("{{") {
            let rest = &uri[start + 2..];
            let name = rest.split("}}").next().unwrap_or(rest);
            return Err(ProviderError::ValueValidation {
                field: name.to_string(),
                message: "unresolved template placeholder".to_string(),
            });
        }

        Ok(format!("{uri}:{}", account_hash(account)))
    }

    /// Subscribe the event through its provider.
    pub async fn subscribe_to_event(
        &self,
        ctx: &CallContext,
        uri: &str,
        secret: &str,
        credentials: Option<&HashMap<String, String>>,
    ) -> Result<EventInfo, ProviderError> {
        let event_type = self.match_type(uri)?;
        self.client_for(&event_type.service_url)
            .subscribe(ctx, uri, secret, credentials.unwrap_or(&HashMap::new()))
            .await
    }

    /// Remove the provider-side subscription.
    pub async fn unsubscribe_from_event(
        &self,
        ctx: &CallContext,
        uri: &str,
        credentials: Option<&HashMap<String, String>>,
    ) -> Result<(), ProviderError> {
        let event_type = self.match_type(uri)?;
        self.client_for(&event_type.service_url)
            .unsubscribe(ctx, uri, credentials.unwrap_or(&HashMap::new()))
            .await
    }

    /// Ask the provider to describe an event. The `secret` parameter is
    /// reserved for providers that gate describe access; the current wire
    /// contract does not carry it.
    pub async fn get_event_info(
        &self,
        ctx: &CallContext,
        uri: &str,
        _secret: &str,
    ) -> Result<EventInfo, ProviderError> {
        let event_type = self.match_type(uri)?;
        self.client_for(&event_type.service_url)
            .event_info(ctx, uri)
            .await
    }

    /// Distinct provider service URLs, in declaration order.
    pub fn service_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for t in &self.snapshot().types {
            if !t.def.service_url.is_empty() && !urls.contains(&t.def.service_url) {
                urls.push(t.def.service_url.clone());
            }
        }
        urls
    }

    /// Client for one provider service, sharing the manager's HTTP client.
    pub fn client_for(&self, service_url: &str) -> ProviderClient {
        ProviderClient::new(service_url, self.http.clone())
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{PUBLIC_ACCOUNT, PUBLIC_ACCOUNT_HASH};
    use crate::provider::testutil::MockProviderServer;
    use crate::types::ConfigField;
    use std::io::Write;

    fn registry_type(service_url: &str) -> EventType {
        EventType {
            event_type: "registry".to_string(),
            kind: "dockerhub".to_string(),
            service_url: service_url.to_string(),
            uri_template: "registry:dockerhub:{{namespace}}:{{name}}:push".to_string(),
            uri_pattern: "^registry:dockerhub:[a-z0-9_-]+:[a-z0-9_-]+:push$".to_string(),
            config: vec![
                ConfigField {
                    name: "namespace".to_string(),
                    field_type: "string".to_string(),
                    validator: "^[a-z0-9_-]+$".to_string(),
                    required: true,
                },
                ConfigField {
                    name: "name".to_string(),
                    field_type: "string".to_string(),
                    validator: "^[a-z0-9_-]+$".to_string(),
                    required: true,
                },
            ],
        }
    }

    fn write_catalog(types: &[EventType]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        let doc = EventTypes {
            types: types.to_vec(),
        };
        file.write_all(serde_json::to_vec(&doc).unwrap().as_slice())
            .expect("write catalog");
        file.flush().expect("flush");
        file
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_load_valid_catalog() {
        let file = write_catalog(&[registry_type("http://service:8080")]);
        let manager = EventProviderManager::new(file.path(), false);
        assert_eq!(manager.get_types().len(), 1);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_invalid_catalog_starts_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Non JSON file. Should lead to error!").unwrap();
        let manager = EventProviderManager::new(file.path(), false);
        assert!(manager.get_types().is_empty());
        manager.close().await;
    }

    #[tokio::test]
    async fn test_missing_catalog_starts_empty() {
        let manager = EventProviderManager::new("non-existing.file.json", false);
        assert!(manager.get_types().is_empty());
        manager.close().await;
    }

    #[tokio::test]
    async fn test_hot_reload_picks_up_new_type() {
        let file = write_catalog(&[registry_type("http://service:8080")]);
        let manager = EventProviderManager::new(file.path(), true);
        assert_eq!(manager.get_types().len(), 1);

        let mut updated = vec![registry_type("http://service:8080")];
        updated.push(EventType {
            event_type: "new-type".to_string(),
            service_url: "http://new-service".to_string(),
            ..Default::default()
        });
        std::fs::write(
            file.path(),
            serde_json::to_vec(&EventTypes { types: updated }).unwrap(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(manager.get_types().len(), 2);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_malformed_edit_preserves_snapshot() {
        let file = write_catalog(&[registry_type("http://service:8080")]);
        let manager = EventProviderManager::new(file.path(), true);
        assert_eq!(manager.get_types().len(), 1);

        std::fs::write(file.path(), b"{ definitely broken").unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(manager.get_types().len(), 1);
        assert_eq!(manager.get_types()[0].event_type, "registry");
        manager.close().await;
    }

    #[tokio::test]
    async fn test_get_type_and_miss() {
        let file = write_catalog(&[registry_type("http://service:8080")]);
        let manager = EventProviderManager::new(file.path(), false);

        assert!(manager.get_type("registry", "dockerhub").is_ok());
        let err = manager.get_type("registry", "non-existing").unwrap_err();
        assert!(matches!(err, ProviderError::TypeNotFound { .. }));
        manager.close().await;
    }

    #[tokio::test]
    async fn test_match_type_with_and_without_account_suffix() {
        let file = write_catalog(&[registry_type("http://service:8080")]);
        let manager = EventProviderManager::new(file.path(), false);

        let hashed = format!(
            "registry:dockerhub:codefresh:fortune:push:{}",
            account_hash("A")
        );
        assert!(manager.match_type(&hashed).is_ok());
        assert!(manager
            .match_type("registry:dockerhub:codefresh:fortune:push:efa1f375d761")
            .is_ok());

        let err = manager
            .match_type("registry:dockerhub:not-valid:push")
            .unwrap_err();
        assert!(matches!(err, ProviderError::TypeNotFound { .. }));
        manager.close().await;
    }

    #[tokio::test]
    async fn test_construct_event_uri() {
        let file = write_catalog(&[registry_type("http://service:8080")]);
        let manager = EventProviderManager::new(file.path(), false);

        // Public account.
        let uri = manager
            .construct_event_uri(
                "registry",
                "dockerhub",
                PUBLIC_ACCOUNT,
                &values(&[("namespace", "codefresh"), ("name", "fortune")]),
            )
            .expect("construct");
        assert_eq!(
            uri,
            format!("registry:dockerhub:codefresh:fortune:push:{PUBLIC_ACCOUNT_HASH}")
        );

        // A tenant account.
        let uri = manager
            .construct_event_uri(
                "registry",
                "dockerhub",
                "5672d8deb6724b6e359adf62",
                &values(&[("namespace", "codefresh"), ("name", "fortune")]),
            )
            .expect("construct");
        assert_eq!(uri, "registry:dockerhub:codefresh:fortune:push:289524e54332");

        // Unknown type.
        let err = manager
            .construct_event_uri("non-existing-type", "any", "a", &values(&[]))
            .unwrap_err();
        assert!(matches!(err, ProviderError::TypeNotFound { .. }));

        // Values rejected by the field validators.
        let err = manager
            .construct_event_uri(
                "registry",
                "dockerhub",
                "a",
                &values(&[("namespace", "codefresh!"), ("name", "fortune@")]),
            )
            .unwrap_err();
        assert!(matches!(err, ProviderError::ValueValidation { .. }));

        // Required value missing.
        let err = manager
            .construct_event_uri(
                "registry",
                "dockerhub",
                "a",
                &values(&[("namespace", "codefresh")]),
            )
            .unwrap_err();
        match err {
            ProviderError::ValueValidation { field, .. } => assert_eq!(field, "name"),
            other => panic!("expected ValueValidation, got: {other:?}"),
        }
        manager.close().await;
    }

    #[tokio::test]
    async fn test_construct_match_round_trip() {
        let file = write_catalog(&[registry_type("http://service:8080")]);
        let manager = EventProviderManager::new(file.path(), false);

        let uri = manager
            .construct_event_uri(
                "registry",
                "dockerhub",
                "some-account",
                &values(&[("namespace", "codefresh"), ("name", "fortune")]),
            )
            .expect("construct");
        let matched = manager.match_type(&uri).expect("match");
        assert_eq!(matched.event_type, "registry");
        assert_eq!(matched.kind, "dockerhub");
        manager.close().await;
    }

    #[tokio::test]
    async fn test_subscribe_routes_to_matched_provider() {
        let server = MockProviderServer::start(
            &serde_json::json!({
                "endpoint": "https://webhook/endpoint",
                "description": "desc",
                "help": "help",
                "status": "active"
            })
            .to_string(),
        );
        let file = write_catalog(&[registry_type(&server.url())]);
        let manager = EventProviderManager::new(file.path(), false);

        let ctx = CallContext::new("A")
            .with_request_id("1234")
            .with_auth_entity(r#"{"user": "test"}"#);
        let uri = format!("registry:dockerhub:test:image:push:{}", account_hash("A"));
        let info = manager
            .subscribe_to_event(&ctx, &uri, "XXX", None)
            .await
            .expect("subscribe");
        assert_eq!(info.endpoint, "https://webhook/endpoint");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].headers.get("x-request-id").map(String::as_str), Some("1234"));
        manager.close().await;
    }

    #[tokio::test]
    async fn test_service_urls_deduplicated() {
        let mut second = registry_type("http://service:8080");
        second.kind = "gcr".to_string();
        let file = write_catalog(&[registry_type("http://service:8080"), second]);
        let manager = EventProviderManager::new(file.path(), false);
        assert_eq!(manager.service_urls(), vec!["http://service:8080"]);
        manager.close().await;
    }
}
