//! Resilience facade: wraps one connector instance with the circuit
//! breaker and the shared TTL cache, and is the single place every
//! transport (remote session dispatch, thin HTTP front end) calls
//! through to run a uniform operation.

use std::sync::Arc;
use std::time::Duration;

use crate::breaker::Breaker;
use crate::cache::{CacheKey, TtlCache};
use crate::connector::{ConnectorImpl, SearchMode};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::model::{
    ConnectorObject, OperationOptions, Schema, SearchListResult, SearchStreamResult, SyncResult,
    SyncToken,
};

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub schema: Duration,
    pub get: Duration,
}

impl From<&crate::config::CacheDefaults> for CacheTtls {
    fn from(defaults: &crate::config::CacheDefaults) -> Self {
        Self {
            schema: Duration::from_millis(defaults.schema_ttl_ms),
            get: Duration::from_millis(defaults.get_ttl_ms),
        }
    }
}

/// Per-instance wrapper around a `ConnectorImpl`, providing caching and
/// breaker-gated resilience for every operation in the uniform surface.
#[derive(Clone)]
pub struct Facade {
    instance_id: String,
    implementation: Arc<dyn ConnectorImpl>,
    breaker: Breaker,
    cache: TtlCache,
    ttls: CacheTtls,
}

impl Facade {
    pub fn new(
        instance_id: impl Into<String>,
        implementation: Arc<dyn ConnectorImpl>,
        breaker: Breaker,
        cache: TtlCache,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            implementation,
            breaker,
            cache,
            ttls,
        }
    }

    pub async fn test(&self) -> Result<()> {
        let implementation = self.implementation.clone();
        self.breaker.call(|| async move { implementation.test().await }).await
    }

    pub async fn schema(&self) -> Result<Schema> {
        let key = CacheKey::schema(&self.instance_id);
        if let Some(cached) = self.cache.get(&key) {
            if let Ok(schema) = serde_json::from_value(cached) {
                return Ok(schema);
            }
        }

        let implementation = self.implementation.clone();
        let schema = self
            .breaker
            .call(|| async move { implementation.schema().await })
            .await?;

        if let Ok(encoded) = serde_json::to_value(&schema) {
            self.cache.set_with_ttl(key, encoded, self.ttls.schema);
        }
        Ok(schema)
    }

    pub async fn get(
        &self,
        object_class: &str,
        uid: &str,
        options: &OperationOptions,
    ) -> Result<Option<ConnectorObject>> {
        options.validate()?;
        let key = CacheKey::get(
            &self.instance_id,
            object_class,
            uid,
            &options.canonical_attributes_to_get(),
        );
        if let Some(cached) = self.cache.get(&key) {
            return Ok(serde_json::from_value(cached).ok());
        }

        let implementation = self.implementation.clone();
        let object_class = object_class.to_string();
        let uid = uid.to_string();
        let options_clone = options.clone();
        let result = self
            .breaker
            .call(|| async move { implementation.get(&object_class, &uid, &options_clone).await })
            .await?;

        if let Some(object) = &result {
            if let Ok(encoded) = serde_json::to_value(object) {
                self.cache.set_with_ttl(key, encoded, self.ttls.get);
            }
        }
        Ok(result)
    }

    pub async fn create(
        &self,
        object_class: &str,
        attrs: serde_json::Map<String, serde_json::Value>,
        options: &OperationOptions,
    ) -> Result<ConnectorObject> {
        options.validate()?;
        let implementation = self.implementation.clone();
        let object_class_owned = object_class.to_string();
        let options_clone = options.clone();
        let created = self
            .breaker
            .call(|| async move {
                implementation.create(&object_class_owned, attrs, &options_clone).await
            })
            .await?;

        self.cache
            .invalidate_prefix(&CacheKey::schema_prefix(&self.instance_id));
        self.cache
            .invalidate_prefix(&CacheKey::get_prefix(&self.instance_id, object_class, None));
        Ok(created)
    }

    pub async fn update(
        &self,
        object_class: &str,
        uid: &str,
        attrs: serde_json::Map<String, serde_json::Value>,
        options: &OperationOptions,
    ) -> Result<ConnectorObject> {
        options.validate()?;
        let implementation = self.implementation.clone();
        let object_class_owned = object_class.to_string();
        let uid_owned = uid.to_string();
        let options_clone = options.clone();
        let updated = self
            .breaker
            .call(|| async move {
                implementation
                    .update(&object_class_owned, &uid_owned, attrs, &options_clone)
                    .await
            })
            .await?;

        self.cache.invalidate_prefix(&CacheKey::get_prefix(
            &self.instance_id,
            object_class,
            Some(uid),
        ));
        Ok(updated)
    }

    pub async fn delete(&self, object_class: &str, uid: &str, options: &OperationOptions) -> Result<()> {
        options.validate()?;
        let implementation = self.implementation.clone();
        let object_class_owned = object_class.to_string();
        let uid_owned = uid.to_string();
        let options_clone = options.clone();
        self.breaker
            .call(|| async move {
                implementation.delete(&object_class_owned, &uid_owned, &options_clone).await
            })
            .await?;

        self.cache.invalidate_prefix(&CacheKey::get_prefix(
            &self.instance_id,
            object_class,
            Some(uid),
        ));
        Ok(())
    }

    pub async fn add_attribute_values(
        &self,
        object_class: &str,
        uid: &str,
        attrs: serde_json::Map<String, serde_json::Value>,
        options: &OperationOptions,
    ) -> Result<ConnectorObject> {
        options.validate()?;
        let implementation = self.implementation.clone();
        let object_class_owned = object_class.to_string();
        let uid_owned = uid.to_string();
        let options_clone = options.clone();
        let updated = self
            .breaker
            .call(|| async move {
                implementation
                    .add_attribute_values(&object_class_owned, &uid_owned, attrs, &options_clone)
                    .await
            })
            .await?;

        self.cache.invalidate_prefix(&CacheKey::get_prefix(
            &self.instance_id,
            object_class,
            Some(uid),
        ));
        Ok(updated)
    }

    pub async fn remove_attribute_values(
        &self,
        object_class: &str,
        uid: &str,
        attrs: serde_json::Map<String, serde_json::Value>,
        options: &OperationOptions,
    ) -> Result<ConnectorObject> {
        options.validate()?;
        let implementation = self.implementation.clone();
        let object_class_owned = object_class.to_string();
        let uid_owned = uid.to_string();
        let options_clone = options.clone();
        let updated = self
            .breaker
            .call(|| async move {
                implementation
                    .remove_attribute_values(&object_class_owned, &uid_owned, attrs, &options_clone)
                    .await
            })
            .await?;

        self.cache.invalidate_prefix(&CacheKey::get_prefix(
            &self.instance_id,
            object_class,
            Some(uid),
        ));
        Ok(updated)
    }

    /// Runs search in whichever mode the connector implements. Never
    /// cached: result sets are filter-dependent and typically large.
    pub async fn search_list(
        &self,
        object_class: &str,
        filter: &Option<Filter>,
        options: &OperationOptions,
    ) -> Result<SearchListResult> {
        options.validate()?;
        match self.implementation.search_mode() {
            SearchMode::NotSupported => Err(Error::NotSupported("search".to_string())),
            SearchMode::List => {
                let implementation = self.implementation.clone();
                let object_class = object_class.to_string();
                let filter = filter.clone();
                let options = options.clone();
                self.breaker
                    .call(|| async move { implementation.search_list(&object_class, &filter, &options).await })
                    .await
            }
            // Bridge: a streaming-only connector is driven to completion
            // and its pages collected into one list result (§9 Open
            // Question: list-primary with a documented streaming bridge).
            SearchMode::Streaming => {
                let implementation = self.implementation.clone();
                let object_class = object_class.to_string();
                let filter = filter.clone();
                let options = options.clone();
                self.breaker
                    .call(|| async move {
                        let mut collected = Vec::new();
                        let stream_result = implementation
                            .search_streaming(&object_class, &filter, &options, &mut |object| {
                                collected.push(object);
                                true
                            })
                            .await?;
                        Ok(SearchListResult {
                            results: collected,
                            next_offset: stream_result.remaining_paged_results.map(|_| 0),
                        })
                    })
                    .await
            }
        }
    }

    /// Streaming search. Returns `NotSupported` when the connector only
    /// implements list mode; callers that need streaming specifically
    /// (rather than the bridged `search_list`) must check first.
    pub async fn search_streaming<F>(
        &self,
        object_class: &str,
        filter: &Option<Filter>,
        options: &OperationOptions,
        mut handler: F,
    ) -> Result<SearchStreamResult>
    where
        F: FnMut(ConnectorObject) -> bool + Send,
    {
        options.validate()?;
        if self.implementation.search_mode() != SearchMode::Streaming {
            return Err(Error::NotSupported("search (streaming)".to_string()));
        }
        let implementation = self.implementation.clone();
        let object_class = object_class.to_string();
        let filter = filter.clone();
        let options = options.clone();
        self.breaker
            .call(|| async move {
                implementation
                    .search_streaming(&object_class, &filter, &options, &mut handler)
                    .await
            })
            .await
    }

    pub async fn sync(
        &self,
        object_class: &str,
        token: Option<SyncToken>,
        options: &OperationOptions,
    ) -> Result<SyncResult> {
        options.validate()?;
        let implementation = self.implementation.clone();
        let object_class = object_class.to_string();
        let options = options.clone();
        self.breaker
            .call(|| async move { implementation.sync(&object_class, token, &options).await })
            .await
    }

    pub async fn script_on_connector(&self, context: serde_json::Value) -> Result<serde_json::Value> {
        let implementation = self.implementation.clone();
        self.breaker
            .call(|| async move { implementation.script_on_connector(context).await })
            .await
    }

    pub async fn breaker_snapshot(&self) -> crate::breaker::BreakerState {
        self.breaker.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::connector::test_support::MemoryConnector;

    fn facade_with(connector: Arc<MemoryConnector>) -> Facade {
        Facade::new(
            "inst-1",
            connector,
            Breaker::new(BreakerConfig::default()),
            TtlCache::new(1000, Duration::from_secs(60)),
            CacheTtls {
                schema: Duration::from_secs(300),
                get: Duration::from_secs(30),
            },
        )
    }

    #[tokio::test]
    async fn get_is_cached_across_calls() {
        let connector = Arc::new(MemoryConnector::new());
        connector.seed(ConnectorObject {
            object_class: "User".into(),
            uid: "u1".into(),
            name: None,
            attributes: Default::default(),
        });
        let facade = facade_with(connector.clone());
        let options = OperationOptions::default();

        facade.get("User", "u1", &options).await.unwrap();
        facade.get("User", "u1", &options).await.unwrap();

        assert_eq!(connector.get_call_count(), 1);
    }

    #[tokio::test]
    async fn update_invalidates_get_cache_for_that_uid() {
        let connector = Arc::new(MemoryConnector::new());
        connector.seed(ConnectorObject {
            object_class: "User".into(),
            uid: "u1".into(),
            name: None,
            attributes: Default::default(),
        });
        let facade = facade_with(connector.clone());
        let options = OperationOptions::default();

        facade.get("User", "u1", &options).await.unwrap();
        facade
            .update("User", "u1", serde_json::Map::new(), &options)
            .await
            .unwrap();
        facade.get("User", "u1", &options).await.unwrap();

        assert_eq!(connector.get_call_count(), 2);
    }

    #[tokio::test]
    async fn search_not_supported_without_a_search_mode() {
        let connector = Arc::new(MemoryConnector::new());
        let facade = facade_with(connector);
        let result = facade.search_list("User", &None, &OperationOptions::default()).await;
        assert!(matches!(result, Err(Error::NotSupported(_))));
    }

    #[tokio::test]
    async fn delete_removes_object_and_invalidates_cache() {
        let connector = Arc::new(MemoryConnector::new());
        connector.seed(ConnectorObject {
            object_class: "User".into(),
            uid: "u1".into(),
            name: None,
            attributes: Default::default(),
        });
        let facade = facade_with(connector.clone());
        let options = OperationOptions::default();

        facade.get("User", "u1", &options).await.unwrap();
        facade.delete("User", "u1", &options).await.unwrap();
        let after = facade.get("User", "u1", &options).await.unwrap();

        assert!(after.is_none());
        assert_eq!(connector.get_call_count(), 2);
    }
}
