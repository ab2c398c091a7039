//! End-to-end: load a manifest from disk, then dispatch uniform
//! operations against the instance it materializes, exercising the
//! same `Registry` facade the WebSocket session and HTTP front end
//! both go through.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use connector_host::config::LoaderConfig;
use connector_host::connector::ConnectorImpl;
use connector_host::error::{Error, Result};
use connector_host::loader::load_connectors;
use connector_host::model::{ConnectorObject, OperationOptions};
use connector_host::registry::Registry;
use connector_host::session::dispatch;

/// A minimal in-memory connector, standing in for a real backend plugin
/// crate calling `Registry::register_factory` at startup.
struct MemoryConnector {
    objects: Mutex<std::collections::HashMap<(String, String), ConnectorObject>>,
}

impl MemoryConnector {
    fn new() -> Self {
        Self {
            objects: Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[async_trait]
impl ConnectorImpl for MemoryConnector {
    async fn get(&self, object_class: &str, uid: &str, _options: &OperationOptions) -> Result<Option<ConnectorObject>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(object_class.to_string(), uid.to_string()))
            .cloned())
    }

    async fn create(
        &self,
        object_class: &str,
        attrs: serde_json::Map<String, serde_json::Value>,
        _options: &OperationOptions,
    ) -> Result<ConnectorObject> {
        let uid = attrs.get("uid").and_then(|v| v.as_str()).unwrap_or("generated").to_string();
        let object = ConnectorObject {
            object_class: object_class.to_string(),
            uid: uid.clone(),
            name: None,
            attributes: Default::default(),
        };
        self.objects
            .lock()
            .unwrap()
            .insert((object_class.to_string(), uid), object.clone());
        Ok(object)
    }

    async fn update(
        &self,
        object_class: &str,
        uid: &str,
        _attrs: serde_json::Map<String, serde_json::Value>,
        _options: &OperationOptions,
    ) -> Result<ConnectorObject> {
        let object = ConnectorObject {
            object_class: object_class.to_string(),
            uid: uid.to_string(),
            name: None,
            attributes: Default::default(),
        };
        self.objects
            .lock()
            .unwrap()
            .insert((object_class.to_string(), uid.to_string()), object.clone());
        Ok(object)
    }

    async fn delete(&self, object_class: &str, uid: &str, _options: &OperationOptions) -> Result<()> {
        self.objects.lock().unwrap().remove(&(object_class.to_string(), uid.to_string()));
        Ok(())
    }
}

fn write_manifest(dir: &std::path::Path, subdir: &str, body: &str) {
    let sub = dir.join(subdir);
    std::fs::create_dir_all(&sub).unwrap();
    std::fs::write(sub.join("manifest.json"), body).unwrap();
}

#[tokio::test]
async fn loaded_instance_serves_create_then_get_through_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        "ldap",
        r#"{
            "id": "ldap-connector",
            "type": "ldap",
            "version": "1.0.0",
            "instances": [{"id": "ldap-prod", "config": {"host": "ldap.internal"}}]
        }"#,
    );

    let registry = Registry::new();
    registry.register_factory("ldap", "1.0.0", Arc::new(|_args| Ok(Arc::new(MemoryConnector::new()))));

    let loader_config = LoaderConfig {
        connectors_dir: dir.path().to_path_buf(),
    };
    load_connectors(&registry, &loader_config).await.unwrap();
    assert_eq!(registry.ids(), vec!["ldap-prod".to_string()]);

    let create_result = dispatch(
        &registry,
        "ldap-prod",
        "create",
        serde_json::json!({"objectClass": "User", "attrs": {"uid": "u1"}}),
    )
    .await
    .unwrap();
    assert_eq!(create_result["uid"], "u1");

    let get_result = dispatch(
        &registry,
        "ldap-prod",
        "get",
        serde_json::json!({"objectClass": "User", "uid": "u1"}),
    )
    .await
    .unwrap();
    assert_eq!(get_result["uid"], "u1");
}

#[tokio::test]
async fn unregistered_manifest_type_leaves_registry_empty_without_failing_the_load() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        "scim",
        r#"{"id":"scim-connector","type":"scim","version":"2.0.0","instances":[{"id":"scim-1"}]}"#,
    );

    let registry = Registry::new();
    let loader_config = LoaderConfig {
        connectors_dir: dir.path().to_path_buf(),
    };
    load_connectors(&registry, &loader_config).await.unwrap();

    assert!(registry.ids().is_empty());
    let result = dispatch(&registry, "scim-1", "schema", serde_json::json!({})).await;
    assert!(matches!(result, Err(Error::ConnectorNotFound(_))));
}

#[tokio::test]
async fn repeated_dispatch_calls_share_the_same_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        "ldap",
        r#"{
            "id": "ldap-connector",
            "type": "ldap",
            "version": "1.0.0",
            "instances": [{"id": "ldap-prod", "config": {}}]
        }"#,
    );

    let registry = Registry::new();
    registry.register_factory("ldap", "1.0.0", Arc::new(|_args| Ok(Arc::new(MemoryConnector::new()))));
    let loader_config = LoaderConfig {
        connectors_dir: dir.path().to_path_buf(),
    };
    load_connectors(&registry, &loader_config).await.unwrap();

    dispatch(
        &registry,
        "ldap-prod",
        "create",
        serde_json::json!({"objectClass": "User", "attrs": {"uid": "u1"}}),
    )
    .await
    .unwrap();

    // Two calls to the same facade should hit the same cache entry --
    // verified indirectly by confirming both calls succeed and return
    // the same uid, which would fail if the facade were rebuilt (and
    // thus its cache wiped) between dispatches.
    let first = dispatch(
        &registry,
        "ldap-prod",
        "get",
        serde_json::json!({"objectClass": "User", "uid": "u1"}),
    )
    .await
    .unwrap();
    let second = dispatch(
        &registry,
        "ldap-prod",
        "get",
        serde_json::json!({"objectClass": "User", "uid": "u1"}),
    )
    .await
    .unwrap();
    assert_eq!(first, second);
}
