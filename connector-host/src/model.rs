//! Uniform operation protocol data model: attribute values, connector
//! objects, schema, option bags, and sync tokens.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single attribute value. Complex values nest recursively; lists are
/// either all-primitive or all-complex, never mixed, which is enforced
/// on the way in rather than encoded in the type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<AttributeValue>),
    Complex(IndexMap<String, AttributeValue>),
    ComplexList(Vec<IndexMap<String, AttributeValue>>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

/// A single object surfaced by a connector: a user, group, or any other
/// remote entity identified within its `object_class`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorObject {
    pub object_class: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeValue>,
}

impl ConnectorObject {
    /// The sentinel tombstone shape used in sync results for deleted
    /// objects (`attributes: {"__DELETED__": true}`).
    pub fn deleted(object_class: impl Into<String>, uid: impl Into<String>) -> Self {
        let mut attributes = IndexMap::new();
        attributes.insert("__DELETED__".to_string(), AttributeValue::Bool(true));
        Self {
            object_class: object_class.into(),
            uid: uid.into(),
            name: None,
            attributes,
        }
    }
}

/// The declared type of a schema attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Integer,
    Boolean,
    Datetime,
    Reference,
    Complex,
}

/// One attribute definition within an `ObjectClassInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub multi_valued: bool,
    #[serde(default = "default_true")]
    pub creatable: bool,
    #[serde(default = "default_true")]
    pub updateable: bool,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default = "default_true")]
    pub returned_by_default: bool,
    /// Only meaningful when `attr_type == Complex`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_attributes: Option<Vec<SchemaAttribute>>,
}

fn default_true() -> bool {
    true
}

/// The operations an object class honors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SupportedOp {
    Create,
    Update,
    Delete,
    Get,
    Search,
    Sync,
}

/// One object class exposed by a connector's schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectClassInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_name: Option<String>,
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,
    #[serde(default = "default_name_attribute")]
    pub name_attribute: String,
    #[serde(default)]
    pub supports: Vec<SupportedOp>,
    #[serde(default)]
    pub attributes: Vec<SchemaAttribute>,
}

fn default_id_attribute() -> String {
    "id".to_string()
}

fn default_name_attribute() -> String {
    "displayName".to_string()
}

/// Feature flags a connector's schema advertises.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SchemaFeatures {
    #[serde(default)]
    pub paging: bool,
    #[serde(default)]
    pub sorting: bool,
    #[serde(default)]
    pub script_on_connector: bool,
    #[serde(default)]
    pub resolve_username: bool,
    #[serde(default)]
    pub complex_attributes: bool,
}

/// Full schema for a connector instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub object_classes: Vec<ObjectClassInfo>,
    #[serde(default)]
    pub features: SchemaFeatures,
}

impl Schema {
    /// Returned when the connector implementation has no `schema` hook.
    pub fn empty_with_complex_attributes() -> Self {
        Schema {
            object_classes: Vec::new(),
            features: SchemaFeatures {
                complex_attributes: true,
                ..Default::default()
            },
        }
    }
}

/// Sort order for `sortKeys` / `sortBy`+`sortOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

/// Search container scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    Object,
    OneLevel,
    Subtree,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub object_class: String,
    pub uid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TotalPagedResultsPolicy {
    None,
    Estimate,
    Exact,
}

/// The full recognized option bag for uniform operations. Every field
/// is optional; unrecognized keys in the wire payload are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_to_get: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paged_results_offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paged_results_cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_keys: Option<Vec<SortKey>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_paged_results_policy: Option<TotalPagedResultsPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_with_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_serial: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u32>,
}

impl OperationOptions {
    /// Sorted, deduplicated projection list; used verbatim as part of
    /// `get`'s cache key so differing projections never collide.
    pub fn canonical_attributes_to_get(&self) -> Vec<String> {
        let mut attrs = self.attributes_to_get.clone().unwrap_or_default();
        attrs.sort();
        attrs.dedup();
        attrs
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::Error;
        if let Some(size) = self.page_size {
            if !(1..=500).contains(&size) {
                return Err(Error::ValidationFailed(format!(
                    "pageSize must be between 1 and 500, got {size}"
                )));
            }
        }
        if let Some(keys) = &self.sort_keys {
            if keys.len() > 5 {
                return Err(Error::ValidationFailed(
                    "sortKeys supports at most 5 entries".to_string(),
                ));
            }
        }
        if let Some(timeout) = self.timeout_ms {
            if !(100..=120_000).contains(&timeout) {
                return Err(Error::ValidationFailed(format!(
                    "timeoutMs must be between 100 and 120000, got {timeout}"
                )));
            }
        }
        Ok(())
    }
}

/// Opaque continuation marker for delta sync; never interpreted by the
/// host, only passed through to the connector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncToken {
    pub value: String,
}

/// Result of a list-mode search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchListResult {
    pub results: Vec<ConnectorObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<u32>,
}

/// Result of a streaming-mode search once paging completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchStreamResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paged_results_cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_paged_results: Option<i64>,
}

/// Result of a `sync` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub token: SyncToken,
    pub changes: Vec<ConnectorObject>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_attributes_sorts_and_dedupes() {
        let mut opts = OperationOptions::default();
        opts.attributes_to_get = Some(vec!["name".into(), "mail".into(), "name".into()]);
        assert_eq!(opts.canonical_attributes_to_get(), vec!["mail", "name"]);
    }

    #[test]
    fn options_reject_out_of_range_page_size() {
        let mut opts = OperationOptions::default();
        opts.page_size = Some(0);
        assert!(opts.validate().is_err());
        opts.page_size = Some(501);
        assert!(opts.validate().is_err());
        opts.page_size = Some(50);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn deleted_object_carries_tombstone_attribute() {
        let obj = ConnectorObject::deleted("User", "u1");
        assert_eq!(
            obj.attributes.get("__DELETED__"),
            Some(&AttributeValue::Bool(true))
        );
    }
}
