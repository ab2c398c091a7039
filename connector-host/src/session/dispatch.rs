//! Routes a validated `operation` payload to the right `Facade` call.
//! Shared by the WebSocket session (`client.rs`) and the thin HTTP
//! front end (`http::handlers`) so both transports apply identical
//! payload validation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{OperationOptions, SyncToken};
use crate::registry::Registry;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetPayload {
    object_class: String,
    uid: String,
    #[serde(default)]
    options: OperationOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePayload {
    object_class: String,
    attrs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    options: OperationOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePayload {
    object_class: String,
    uid: String,
    attrs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    options: OperationOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletePayload {
    object_class: String,
    uid: String,
    #[serde(default)]
    options: OperationOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPayload {
    object_class: String,
    #[serde(default)]
    filter: Option<serde_json::Value>,
    #[serde(default)]
    options: OperationOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncPayload {
    object_class: String,
    #[serde(default)]
    token: Option<SyncToken>,
    #[serde(default)]
    options: OperationOptions,
}

#[derive(Debug, Deserialize, Serialize)]
struct ScriptContext {
    language: String,
    script: String,
    #[serde(default)]
    params: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ScriptPayload {
    context: ScriptContext,
}

/// Resolves `connector_id` through the registry and runs `operation`
/// against its long-lived `Facade`, returning the JSON result the
/// caller sends back (as a `response` frame over WebSocket, or an HTTP
/// body). The facade is the one built by `Registry::init_instance`, so
/// breaker state and cache entries persist across dispatches instead of
/// resetting on every call.
pub async fn dispatch(
    registry: &Registry,
    connector_id: &str,
    operation: &str,
    payload: serde_json::Value,
) -> Result<serde_json::Value> {
    let facade = registry.facade(connector_id)?;

    match operation {
        "schema" => {
            let schema = facade.schema().await?;
            Ok(serde_json::to_value(schema)?)
        }
        "test" => {
            facade.test().await?;
            Ok(serde_json::json!({}))
        }
        "create" => {
            let p: CreatePayload = parse_payload(payload)?;
            let object = facade.create(&p.object_class, p.attrs, &p.options).await?;
            Ok(serde_json::to_value(object)?)
        }
        "get" => {
            let p: GetPayload = parse_payload(payload)?;
            let object = facade.get(&p.object_class, &p.uid, &p.options).await?;
            Ok(serde_json::to_value(object)?)
        }
        "update" => {
            let p: UpdatePayload = parse_payload(payload)?;
            let object = facade.update(&p.object_class, &p.uid, p.attrs, &p.options).await?;
            Ok(serde_json::to_value(object)?)
        }
        "delete" => {
            let p: DeletePayload = parse_payload(payload)?;
            facade.delete(&p.object_class, &p.uid, &p.options).await?;
            Ok(serde_json::json!({}))
        }
        "addAttributeValues" => {
            let p: UpdatePayload = parse_payload(payload)?;
            let object = facade
                .add_attribute_values(&p.object_class, &p.uid, p.attrs, &p.options)
                .await?;
            Ok(serde_json::to_value(object)?)
        }
        "removeAttributeValues" => {
            let p: UpdatePayload = parse_payload(payload)?;
            let object = facade
                .remove_attribute_values(&p.object_class, &p.uid, p.attrs, &p.options)
                .await?;
            Ok(serde_json::to_value(object)?)
        }
        "search" => {
            let p: SearchPayload = parse_payload(payload)?;
            let filter = match p.filter {
                Some(value) if !value.is_null() => Some(crate::filter::parse(&value)?),
                _ => None,
            };
            let result = facade.search_list(&p.object_class, &filter, &p.options).await?;
            Ok(serde_json::to_value(result)?)
        }
        "sync" => {
            let p: SyncPayload = parse_payload(payload)?;
            let result = facade.sync(&p.object_class, p.token, &p.options).await?;
            Ok(serde_json::to_value(result)?)
        }
        "scriptOnConnector" => {
            let p: ScriptPayload = parse_payload(payload)?;
            let context = serde_json::to_value(&p.context)?;
            let result = facade.script_on_connector(context).await?;
            Ok(result)
        }
        other => Err(Error::ValidationFailed(format!("unknown operation: {other}"))),
    }
}

fn parse_payload<T: for<'de> Deserialize<'de>>(payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| Error::ValidationFailed(format!("invalid payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::test_support::MemoryConnector;
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_connector_id_is_not_found() {
        let registry = Registry::new();
        let result = dispatch(&registry, "missing", "schema", serde_json::json!({})).await;
        assert!(matches!(result, Err(Error::ConnectorNotFound(_))));
    }

    #[tokio::test]
    async fn get_requires_object_class_and_uid() {
        let registry = Registry::new();
        registry.register_factory("ldap", "1.0.0", Arc::new(|_| Ok(Arc::new(MemoryConnector::new()))));
        registry.init_instance("i1", "c1", "ldap", "1.0.0", serde_json::json!({})).unwrap();

        let result = dispatch(&registry, "i1", "get", serde_json::json!({"objectClass": "User"})).await;
        assert!(matches!(result, Err(Error::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn unknown_operation_is_validation_failed() {
        let registry = Registry::new();
        registry.register_factory("ldap", "1.0.0", Arc::new(|_| Ok(Arc::new(MemoryConnector::new()))));
        registry.init_instance("i1", "c1", "ldap", "1.0.0", serde_json::json!({})).unwrap();

        let result = dispatch(&registry, "i1", "frobnicate", serde_json::json!({})).await;
        assert!(matches!(result, Err(Error::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn search_rejects_exists_node_carrying_a_value() {
        let registry = Registry::new();
        registry.register_factory("ldap", "1.0.0", Arc::new(|_| Ok(Arc::new(MemoryConnector::new()))));
        registry.init_instance("i1", "c1", "ldap", "1.0.0", serde_json::json!({})).unwrap();

        let result = dispatch(
            &registry,
            "i1",
            "search",
            serde_json::json!({
                "objectClass": "User",
                "filter": {"type": "CMP", "op": "EXISTS", "path": ["mail"], "value": "x"},
            }),
        )
        .await;
        assert!(matches!(result, Err(Error::ValidationFailed(_))));
    }
}
