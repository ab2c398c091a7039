//! External loader: walks a directory of connector manifests and
//! materializes instances into a `Registry`.
//!
//! Dynamic module loading has no Rust equivalent worth imitating, so
//! `entry` and `config` (paths to JS modules in the source manifest
//! format) are resolved against compile-time registrations instead:
//! `entry` is satisfied once `(type, version)` has a factory registered
//! via `Registry::register_factory`, and `config` is satisfied once a
//! config builder is registered via `Registry::register_config_builder`
//! (applied inside `Registry::init_instance`). The manifest format, env
//! substitution, and per-manifest error isolation are unchanged.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::registry::Registry;

static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\$\{([A-Z0-9_]+)\}$").unwrap());

#[derive(Debug, Deserialize)]
struct Manifest {
    id: String,
    #[serde(rename = "type")]
    connector_type: String,
    version: String,
    #[serde(default)]
    entry: Option<String>,
    #[serde(default)]
    config: Option<String>,
    #[serde(default)]
    instances: Vec<InstanceDecl>,
}

#[derive(Debug, Deserialize)]
struct InstanceDecl {
    id: String,
    #[serde(default)]
    config: serde_json::Value,
    #[serde(default)]
    connector_version: Option<String>,
}

/// Walks `config.connectors_dir`, one subdirectory per connector, each
/// containing a `manifest.json`. Errors loading one manifest are logged
/// and skipped; they never abort the rest of the walk.
pub async fn load_connectors(registry: &Registry, config: &LoaderConfig) -> Result<()> {
    let mut entries = match tokio::fs::read_dir(&config.connectors_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %config.connectors_dir.display(), "connectors directory does not exist, skipping load");
            return Ok(());
        }
        Err(err) => return Err(Error::Io(err)),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let manifest_path = entry.path().join("manifest.json");
        if !manifest_path.exists() {
            continue;
        }
        if let Err(err) = load_one_manifest(registry, &manifest_path).await {
            tracing::warn!(path = %manifest_path.display(), error = %err, "skipping invalid manifest");
        }
    }

    Ok(())
}

async fn load_one_manifest(registry: &Registry, path: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(path).await?;
    let manifest: Manifest = serde_json::from_str(&raw)?;

    if !registry.has(&manifest.connector_type, &manifest.version) {
        return Err(Error::UnknownConnectorType {
            connector_type: manifest.connector_type.clone(),
            version: manifest.version.clone(),
        });
    }

    if manifest.instances.is_empty() {
        tracing::warn!(manifest_id = %manifest.id, "manifest declares no instances");
        return Ok(());
    }

    for instance in &manifest.instances {
        let version = instance.connector_version.clone().unwrap_or_else(|| manifest.version.clone());
        match substitute_env(instance.config.clone()) {
            Ok(config) => {
                if let Err(err) = registry.init_instance(
                    &instance.id,
                    &manifest.id,
                    &manifest.connector_type,
                    &version,
                    config,
                ) {
                    tracing::warn!(instance_id = %instance.id, error = %err, "failed to initialize connector instance");
                }
            }
            Err(err) => {
                tracing::warn!(instance_id = %instance.id, error = %err, "failed to resolve instance configuration");
            }
        }
    }

    Ok(())
}

/// Recursively replaces any string value matching `${ENV_NAME}` with the
/// process environment value of that name. Fails the whole substitution
/// if any referenced variable is unset.
fn substitute_env(value: serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::String(s) => {
            if let Some(captures) = ENV_PLACEHOLDER.captures(&s) {
                let name = &captures[1];
                let resolved = std::env::var(name)
                    .map_err(|_| Error::ConfigInvalid(format!("missing environment variable: {name}")))?;
                Ok(serde_json::Value::String(resolved))
            } else {
                Ok(serde_json::Value::String(s))
            }
        }
        serde_json::Value::Array(items) => Ok(serde_json::Value::Array(
            items.into_iter().map(substitute_env).collect::<Result<Vec<_>>>()?,
        )),
        serde_json::Value::Object(map) => {
            let mut substituted = serde_json::Map::new();
            for (k, v) in map {
                substituted.insert(k, substitute_env(v)?);
            }
            Ok(serde_json::Value::Object(substituted))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::test_support::MemoryConnector;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn write_manifest(dir: &Path, name: &str, body: &str) {
        let sub = dir.join(name);
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("manifest.json"), body).unwrap();
    }

    #[tokio::test]
    async fn unregistered_type_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        write_manifest(
            dir.path(),
            "ldap",
            r#"{"id":"ldap-1","type":"ldap","version":"1.0.0","instances":[{"id":"inst-1"}]}"#,
        );

        let registry = Registry::new();
        let config = LoaderConfig {
            connectors_dir: dir.path().to_path_buf(),
        };
        load_connectors(&registry, &config).await.unwrap();

        assert!(registry.ids().is_empty());
    }

    #[tokio::test]
    async fn valid_manifest_materializes_instance() {
        let dir = tempdir().unwrap();
        write_manifest(
            dir.path(),
            "ldap",
            r#"{"id":"ldap-1","type":"ldap","version":"1.0.0","instances":[{"id":"inst-1","config":{"host":"ldap.internal"}}]}"#,
        );

        let registry = Registry::new();
        registry.register_factory("ldap", "1.0.0", Arc::new(|_args| Ok(Arc::new(MemoryConnector::new()))));
        let config = LoaderConfig {
            connectors_dir: dir.path().to_path_buf(),
        };
        load_connectors(&registry, &config).await.unwrap();

        assert_eq!(registry.ids(), vec!["inst-1".to_string()]);
    }

    #[tokio::test]
    async fn missing_env_var_fails_that_instance_only() {
        let dir = tempdir().unwrap();
        write_manifest(
            dir.path(),
            "ldap",
            r#"{"id":"ldap-1","type":"ldap","version":"1.0.0","instances":[
                {"id":"inst-bad","config":{"secret":"${CONNECTOR_HOST_TEST_UNSET_VAR}"}},
                {"id":"inst-good","config":{}}
            ]}"#,
        );

        let registry = Registry::new();
        registry.register_factory("ldap", "1.0.0", Arc::new(|_args| Ok(Arc::new(MemoryConnector::new()))));
        let config = LoaderConfig {
            connectors_dir: dir.path().to_path_buf(),
        };
        load_connectors(&registry, &config).await.unwrap();

        assert_eq!(registry.ids(), vec!["inst-good".to_string()]);
    }

    #[tokio::test]
    async fn malformed_manifest_json_is_skipped() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "broken", "{not json");

        let registry = Registry::new();
        let config = LoaderConfig {
            connectors_dir: dir.path().to_path_buf(),
        };
        load_connectors(&registry, &config).await.unwrap();

        assert!(registry.ids().is_empty());
    }
}
