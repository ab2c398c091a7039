//! The capability set a connector implementation exposes to the Facade.
//!
//! Rather than the source's "partial-type" impl (an object that may or
//! may not support each operation, checked at call time), each capability
//! is an explicit optional hook with a default `NotSupported` body. The
//! search capability is the one exception: a connector declares which
//! form it implements via `search_mode()`, and the Facade adapts
//! streaming↔list per the documented bridge (§9 Open Question).

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::model::{
    ConnectorObject, OperationOptions, Schema, SearchListResult, SearchStreamResult, SyncResult,
    SyncToken,
};

/// A handler invoked once per object during streaming search. Returning
/// `false` cancels the stream after the current page.
pub type SearchHandler<'a> = &'a mut (dyn FnMut(ConnectorObject) -> bool + Send);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    NotSupported,
    List,
    Streaming,
}

/// The uniform operation surface a connector crate implements.
#[async_trait]
pub trait ConnectorImpl: Send + Sync {
    async fn test(&self) -> Result<()> {
        Ok(())
    }

    async fn schema(&self) -> Result<Schema> {
        Ok(Schema::empty_with_complex_attributes())
    }

    async fn get(
        &self,
        object_class: &str,
        uid: &str,
        options: &OperationOptions,
    ) -> Result<Option<ConnectorObject>>;

    async fn create(
        &self,
        object_class: &str,
        attrs: serde_json::Map<String, serde_json::Value>,
        options: &OperationOptions,
    ) -> Result<ConnectorObject>;

    async fn update(
        &self,
        object_class: &str,
        uid: &str,
        attrs: serde_json::Map<String, serde_json::Value>,
        options: &OperationOptions,
    ) -> Result<ConnectorObject>;

    async fn delete(&self, object_class: &str, uid: &str, options: &OperationOptions) -> Result<()>;

    async fn add_attribute_values(
        &self,
        _object_class: &str,
        _uid: &str,
        _attrs: serde_json::Map<String, serde_json::Value>,
        _options: &OperationOptions,
    ) -> Result<ConnectorObject> {
        Err(Error::NotSupported("addAttributeValues".to_string()))
    }

    async fn remove_attribute_values(
        &self,
        _object_class: &str,
        _uid: &str,
        _attrs: serde_json::Map<String, serde_json::Value>,
        _options: &OperationOptions,
    ) -> Result<ConnectorObject> {
        Err(Error::NotSupported("removeAttributeValues".to_string()))
    }

    /// Declares which search form this connector implements, if any.
    fn search_mode(&self) -> SearchMode {
        SearchMode::NotSupported
    }

    /// Implemented when `search_mode() == List`.
    async fn search_list(
        &self,
        _object_class: &str,
        _filter: &Option<Filter>,
        _options: &OperationOptions,
    ) -> Result<SearchListResult> {
        Err(Error::NotSupported("search".to_string()))
    }

    /// Implemented when `search_mode() == Streaming`.
    async fn search_streaming(
        &self,
        _object_class: &str,
        _filter: &Option<Filter>,
        _options: &OperationOptions,
        _handler: SearchHandler<'_>,
    ) -> Result<SearchStreamResult> {
        Err(Error::NotSupported("search".to_string()))
    }

    async fn sync(
        &self,
        _object_class: &str,
        _token: Option<SyncToken>,
        _options: &OperationOptions,
    ) -> Result<SyncResult> {
        Err(Error::NotSupported("sync".to_string()))
    }

    async fn script_on_connector(&self, _context: serde_json::Value) -> Result<serde_json::Value> {
        Err(Error::NotSupported("scriptOnConnector".to_string()))
    }
}

/// `{config, instanceId, connectorId, connectorVersion, type}` bundle
/// passed to a factory at `initInstance` time (the source's `logger` is
/// the ambient `tracing` span each Facade call opens instead).
pub struct FactoryArgs {
    pub instance_id: String,
    pub connector_id: String,
    pub connector_version: String,
    pub config: serde_json::Value,
}

/// A registered connector factory: builds a `ConnectorImpl` from the
/// effective, validated configuration.
pub type ConnectorFactory = Arc<dyn Fn(FactoryArgs) -> Result<Arc<dyn ConnectorImpl>> + Send + Sync>;

/// Builds the effective configuration value from a manifest's raw config.
/// Preferred entry point is `buildConfiguration`-equivalent; a builder may
/// also run `validate()`-equivalent checks and surface `ConfigInvalid`.
pub type ConfigBuilder = Arc<dyn Fn(serde_json::Value) -> Result<serde_json::Value> + Send + Sync>;

/// A materialized, running connector instance. Lives for the process
/// lifetime once created; never mutated.
pub struct ConnectorInstance {
    pub id: String,
    pub connector_type: String,
    pub connector_version: String,
    pub implementation: Arc<dyn ConnectorImpl>,
}
