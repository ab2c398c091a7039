//! Connector registry: maps `(type, version)` to a factory and config
//! builder, and tracks materialized instances by id.
//!
//! Compile-time plugin registration replaces the source's dynamic module
//! loading (the host links every connector crate it serves); the
//! external loader (`loader.rs`) is what turns manifests into calls to
//! `register_factory` + `init_instance` at startup.

use std::time::Duration;

use dashmap::DashMap;
use semver::Version;

use crate::breaker::{Breaker, BreakerConfig};
use crate::cache::TtlCache;
use crate::connector::{ConfigBuilder, ConnectorFactory, ConnectorInstance, FactoryArgs};
use crate::error::{Error, Result};
use crate::facade::{CacheTtls, Facade};

#[derive(Clone)]
struct Registration {
    factory: ConnectorFactory,
    config_builder: Option<ConfigBuilder>,
}

/// Process-wide registry of connector types and running instances.
///
/// Every materialized instance gets its own long-lived `Facade`, built
/// once in `init_instance` and handed out by reference thereafter, so a
/// connector's circuit breaker accumulates failure/success counts across
/// calls instead of resetting on each dispatch (the cache, by contrast,
/// is one `moka` instance shared by every facade and namespaced by
/// instance id -- see `cache.rs`).
///
/// Cheap to clone: every field is an `Arc`-backed concurrent map or an
/// already-`Clone` value.
#[derive(Clone)]
pub struct Registry {
    registrations: std::sync::Arc<DashMap<(String, String), Registration>>,
    instances: std::sync::Arc<DashMap<String, ConnectorInstance>>,
    facades: std::sync::Arc<DashMap<String, Facade>>,
    cache: TtlCache,
    breaker_config: BreakerConfig,
    cache_ttls: CacheTtls,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new_with_resilience(
            TtlCache::new(10_000, Duration::from_millis(60_000)),
            BreakerConfig::default(),
            CacheTtls {
                schema: Duration::from_millis(300_000),
                get: Duration::from_millis(30_000),
            },
        )
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry whose facades share `cache` and are configured
    /// with `breaker_config`/`cache_ttls`, matching the process' real
    /// `BreakerDefaults`/`CacheDefaults`.
    pub fn new_with_resilience(cache: TtlCache, breaker_config: BreakerConfig, cache_ttls: CacheTtls) -> Self {
        Self {
            registrations: std::sync::Arc::new(DashMap::new()),
            instances: std::sync::Arc::new(DashMap::new()),
            facades: std::sync::Arc::new(DashMap::new()),
            cache,
            breaker_config,
            cache_ttls,
        }
    }

    pub fn register_factory(&self, connector_type: impl Into<String>, version: impl Into<String>, factory: ConnectorFactory) {
        let key = (connector_type.into(), version.into());
        self.registrations
            .entry(key)
            .and_modify(|r| r.factory = factory.clone())
            .or_insert(Registration {
                factory,
                config_builder: None,
            });
    }

    pub fn register_config_builder(
        &self,
        connector_type: impl Into<String>,
        version: impl Into<String>,
        builder: ConfigBuilder,
    ) {
        let key = (connector_type.into(), version.into());
        if let Some(mut entry) = self.registrations.get_mut(&key) {
            entry.config_builder = Some(builder);
        }
    }

    pub fn has(&self, connector_type: &str, version: &str) -> bool {
        self.registrations
            .contains_key(&(connector_type.to_string(), version.to_string()))
    }

    /// Builds and stores a new connector instance from a registered
    /// `(type, version)`, running its config builder first if one is
    /// registered.
    pub fn init_instance(
        &self,
        instance_id: impl Into<String>,
        connector_id: impl Into<String>,
        connector_type: impl Into<String>,
        connector_version: impl Into<String>,
        raw_config: serde_json::Value,
    ) -> Result<()> {
        let instance_id = instance_id.into();
        let connector_id = connector_id.into();
        let connector_type = connector_type.into();
        let connector_version = connector_version.into();
        let key = (connector_type.clone(), connector_version.clone());

        let registration = self.registrations.get(&key).ok_or_else(|| Error::UnknownConnectorType {
            connector_type: connector_type.clone(),
            version: connector_version.clone(),
        })?;

        let effective_config = match &registration.config_builder {
            Some(builder) => builder(raw_config)?,
            None => raw_config,
        };

        let implementation = (registration.factory)(FactoryArgs {
            instance_id: instance_id.clone(),
            connector_id: connector_id.clone(),
            connector_version: connector_version.clone(),
            config: effective_config,
        })?;
        drop(registration);

        let facade = Facade::new(
            instance_id.clone(),
            implementation.clone(),
            Breaker::new(self.breaker_config),
            self.cache.clone(),
            self.cache_ttls,
        );
        self.facades.insert(instance_id.clone(), facade);

        self.instances.insert(
            instance_id.clone(),
            ConnectorInstance {
                id: instance_id,
                connector_type,
                connector_version,
                implementation,
            },
        );
        Ok(())
    }

    /// Runs `f` with a reference to the instance, avoiding a clone of
    /// the boxed implementation.
    pub fn with_instance<T>(&self, instance_id: &str, f: impl FnOnce(&ConnectorInstance) -> T) -> Result<T> {
        self.instances
            .get(instance_id)
            .map(|entry| f(entry.value()))
            .ok_or_else(|| Error::ConnectorNotFound(instance_id.to_string()))
    }

    /// Returns the long-lived `Facade` for `instance_id`, built once in
    /// `init_instance` and reused for every call so breaker state and
    /// cache entries persist across dispatches.
    pub fn facade(&self, instance_id: &str) -> Result<Facade> {
        self.facades
            .get(instance_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::ConnectorNotFound(instance_id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.instances.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn keys(&self) -> Vec<(String, String)> {
        self.registrations.iter().map(|entry| entry.key().clone()).collect()
    }

    /// All registered versions for a connector type, ascending by semver
    /// where parseable (non-semver version strings sort lexically after).
    pub fn get_versions(&self, connector_type: &str) -> Vec<String> {
        let mut versions: Vec<String> = self
            .registrations
            .iter()
            .filter(|entry| entry.key().0 == connector_type)
            .map(|entry| entry.key().1.clone())
            .collect();
        versions.sort_by(|a, b| match (Version::parse(a), Version::parse(b)) {
            (Ok(va), Ok(vb)) => va.cmp(&vb),
            _ => a.cmp(b),
        });
        versions
    }

    pub fn get_latest_version(&self, connector_type: &str) -> Option<String> {
        self.get_versions(connector_type).into_iter().last()
    }

    pub fn remove_instance(&self, instance_id: &str) -> bool {
        self.facades.remove(instance_id);
        self.instances.remove(instance_id).is_some()
    }
}
