//! Filter AST: a bounded predicate tree parsed from untrusted JSON and
//! translated to backend-specific query dialects.

pub mod odata;
pub mod sql;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub use odata::ODataTranslator;
pub use sql::SqlTranslator;

const MAX_PATH_SEGMENTS: usize = 8;
const MAX_PATH_SEGMENT_LEN: usize = 128;
const MAX_IN_VALUES: usize = 100;
const MAX_BOOLEAN_CHILDREN: usize = 50;
const MAX_DEPTH: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CmpOp {
    Eq,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Exists,
}

/// A primitive filter value: string, integer, or boolean (no null, no
/// nesting — filters compare against scalar attribute values).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl FilterValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(FilterValue::Str(s.clone())),
            Value::Bool(b) => Some(FilterValue::Bool(*b)),
            Value::Number(n) => n.as_i64().map(FilterValue::Int),
            _ => None,
        }
    }
}

/// The validated predicate tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Filter {
    #[serde(rename = "CMP")]
    Cmp {
        op: CmpOp,
        path: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<FilterValueOrList>,
    },
    #[serde(rename = "AND")]
    And { nodes: Vec<Filter> },
    #[serde(rename = "OR")]
    Or { nodes: Vec<Filter> },
    #[serde(rename = "NOT")]
    Not { node: Box<Filter> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValueOrList {
    Single(FilterValue),
    List(Vec<FilterValue>),
}

/// Parse and validate an untrusted JSON payload into a `Filter`, enforcing
/// every shape/bound invariant from the protocol: unknown tags and
/// operators are rejected, `EXISTS` forbids a value, `IN` requires a
/// non-empty bounded array, paths are length- and depth-bounded, and
/// boolean combinators are bounded in both fan-out and nesting depth.
pub fn parse(value: &Value) -> Result<Filter> {
    parse_at_depth(value, 0)
}

fn parse_at_depth(value: &Value, depth: u32) -> Result<Filter> {
    if depth > MAX_DEPTH {
        return Err(Error::ValidationFailed(
            "filter tree exceeds maximum depth".to_string(),
        ));
    }

    let obj = value
        .as_object()
        .ok_or_else(|| Error::ValidationFailed("filter node must be an object".to_string()))?;

    let tag = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::ValidationFailed("filter node missing \"type\"".to_string()))?;

    match tag {
        "CMP" => parse_cmp(obj),
        "AND" => parse_bool(obj, depth, true),
        "OR" => parse_bool(obj, depth, false),
        "NOT" => parse_not(obj, depth),
        other => Err(Error::ValidationFailed(format!(
            "unknown filter node type: {other}"
        ))),
    }
}

fn parse_cmp(obj: &serde_json::Map<String, Value>) -> Result<Filter> {
    let op_str = obj
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::ValidationFailed("CMP node missing \"op\"".to_string()))?;
    let op = parse_op(op_str)?;

    let path = obj
        .get("path")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::ValidationFailed("CMP node missing \"path\"".to_string()))?;
    let path = parse_path(path)?;

    let raw_value = obj.get("value");

    let value = match op {
        CmpOp::Exists => {
            if raw_value.is_some() && !matches!(raw_value, Some(Value::Null)) {
                return Err(Error::ValidationFailed(
                    "EXISTS must not carry a value".to_string(),
                ));
            }
            None
        }
        CmpOp::In => {
            let arr = raw_value
                .and_then(Value::as_array)
                .ok_or_else(|| Error::ValidationFailed("IN requires an array value".to_string()))?;
            if arr.is_empty() || arr.len() > MAX_IN_VALUES {
                return Err(Error::ValidationFailed(format!(
                    "IN value array must have 1..{MAX_IN_VALUES} entries"
                )));
            }
            let values: Option<Vec<FilterValue>> =
                arr.iter().map(FilterValue::from_json).collect();
            let values = values.ok_or_else(|| {
                Error::ValidationFailed("IN array must contain only primitives".to_string())
            })?;
            Some(FilterValueOrList::List(values))
        }
        _ => {
            let raw_value = raw_value.ok_or_else(|| {
                Error::ValidationFailed(format!("{op_str} requires a value"))
            })?;
            let v = FilterValue::from_json(raw_value).ok_or_else(|| {
                Error::ValidationFailed(format!("{op_str} value must be a primitive"))
            })?;
            Some(FilterValueOrList::Single(v))
        }
    };

    Ok(Filter::Cmp { op, path, value })
}

fn parse_op(raw: &str) -> Result<CmpOp> {
    match raw {
        "EQ" => Ok(CmpOp::Eq),
        "CONTAINS" => Ok(CmpOp::Contains),
        "STARTS_WITH" => Ok(CmpOp::StartsWith),
        "ENDS_WITH" => Ok(CmpOp::EndsWith),
        "GT" => Ok(CmpOp::Gt),
        "GTE" => Ok(CmpOp::Gte),
        "LT" => Ok(CmpOp::Lt),
        "LTE" => Ok(CmpOp::Lte),
        "IN" => Ok(CmpOp::In),
        "EXISTS" => Ok(CmpOp::Exists),
        other => Err(Error::ValidationFailed(format!(
            "unknown comparison operator: {other}"
        ))),
    }
}

fn parse_path(raw: &[Value]) -> Result<Vec<String>> {
    if raw.is_empty() || raw.len() > MAX_PATH_SEGMENTS {
        return Err(Error::ValidationFailed(format!(
            "path must have 1..{MAX_PATH_SEGMENTS} segments"
        )));
    }
    raw.iter()
        .map(|segment| {
            let s = segment.as_str().ok_or_else(|| {
                Error::ValidationFailed("path segments must be strings".to_string())
            })?;
            if s.is_empty() || s.len() > MAX_PATH_SEGMENT_LEN {
                return Err(Error::ValidationFailed(format!(
                    "path segment must be 1..{MAX_PATH_SEGMENT_LEN} chars, got {}",
                    s.len()
                )));
            }
            Ok(s.to_string())
        })
        .collect()
}

fn parse_bool(obj: &serde_json::Map<String, Value>, depth: u32, is_and: bool) -> Result<Filter> {
    let nodes = obj
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::ValidationFailed("boolean node missing \"nodes\"".to_string()))?;
    if nodes.is_empty() || nodes.len() > MAX_BOOLEAN_CHILDREN {
        return Err(Error::ValidationFailed(format!(
            "boolean node must have 1..{MAX_BOOLEAN_CHILDREN} children"
        )));
    }
    let parsed: Result<Vec<Filter>> = nodes
        .iter()
        .map(|n| parse_at_depth(n, depth + 1))
        .collect();
    let parsed = parsed?;
    Ok(if is_and {
        Filter::And { nodes: parsed }
    } else {
        Filter::Or { nodes: parsed }
    })
}

fn parse_not(obj: &serde_json::Map<String, Value>, depth: u32) -> Result<Filter> {
    let node = obj
        .get("node")
        .ok_or_else(|| Error::ValidationFailed("NOT node missing \"node\"".to_string()))?;
    let parsed = parse_at_depth(node, depth + 1)?;
    Ok(Filter::Not {
        node: Box::new(parsed),
    })
}
