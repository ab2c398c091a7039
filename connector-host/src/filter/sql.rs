//! Parameterized SQL translator.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{CmpOp, Filter, FilterValue, FilterValueOrList};
use crate::error::{Error, Result};

static COLUMN_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"[A-Za-z0-9_]+"$"#).unwrap());

/// A parameterized SQL fragment plus the bound parameter values and the
/// next free placeholder index, so callers can compose several
/// translations into one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<FilterValue>,
    pub next_index: u32,
}

/// Translates a validated `Filter` into a parameterized SQL fragment
/// against a caller-supplied dotted-path-to-quoted-column map.
pub struct SqlTranslator<'a> {
    columns: &'a HashMap<String, String>,
}

impl<'a> SqlTranslator<'a> {
    pub fn new(columns: &'a HashMap<String, String>) -> Self {
        Self { columns }
    }

    pub fn translate(&self, filter: &Filter, start_index: u32) -> Result<SqlFragment> {
        match filter {
            Filter::Cmp { op, path, value } => self.translate_cmp(*op, path, value.as_ref(), start_index),
            Filter::And { nodes } => self.translate_join(nodes, start_index, "AND"),
            Filter::Or { nodes } => self.translate_join(nodes, start_index, "OR"),
            Filter::Not { node } => {
                let inner = self.translate(node, start_index)?;
                Ok(SqlFragment {
                    sql: format!("NOT ({})", inner.sql),
                    params: inner.params,
                    next_index: inner.next_index,
                })
            }
        }
    }

    fn translate_join(&self, nodes: &[Filter], start_index: u32, joiner: &str) -> Result<SqlFragment> {
        let mut sql_parts = Vec::with_capacity(nodes.len());
        let mut params = Vec::new();
        let mut index = start_index;
        for node in nodes {
            let fragment = self.translate(node, index)?;
            sql_parts.push(fragment.sql);
            params.extend(fragment.params);
            index = fragment.next_index;
        }
        Ok(SqlFragment {
            sql: format!("({})", sql_parts.join(&format!(" {joiner} "))),
            params,
            next_index: index,
        })
    }

    fn translate_cmp(
        &self,
        op: CmpOp,
        path: &[String],
        value: Option<&FilterValueOrList>,
        start_index: u32,
    ) -> Result<SqlFragment> {
        let dotted = path.join(".");
        let column = self.columns.get(&dotted).ok_or_else(|| {
            Error::ValidationFailed(format!("path not allowed for this search: {dotted}"))
        })?;
        if !COLUMN_IDENT.is_match(column) {
            return Err(Error::ValidationFailed(format!(
                "column identifier failed safety check: {column}"
            )));
        }

        match op {
            CmpOp::Exists => Ok(SqlFragment {
                sql: format!("{column} IS NOT NULL"),
                params: Vec::new(),
                next_index: start_index,
            }),
            CmpOp::Eq => self.binary(column, "=", single(value)?, start_index),
            CmpOp::Gt => self.binary(column, ">", single(value)?, start_index),
            CmpOp::Gte => self.binary(column, ">=", single(value)?, start_index),
            CmpOp::Lt => self.binary(column, "<", single(value)?, start_index),
            CmpOp::Lte => self.binary(column, "<=", single(value)?, start_index),
            CmpOp::Contains => self.like(column, single(value)?, "%{}%", start_index),
            CmpOp::StartsWith => self.like(column, single(value)?, "{}%", start_index),
            CmpOp::EndsWith => self.like(column, single(value)?, "%{}", start_index),
            CmpOp::In => {
                let values = list(value)?;
                Ok(SqlFragment {
                    sql: format!("{column} = ANY(array[${}])", start_index),
                    params: values.to_vec(),
                    next_index: start_index + 1,
                })
            }
        }
    }

    fn binary(
        &self,
        column: &str,
        operator: &str,
        value: &FilterValue,
        index: u32,
    ) -> Result<SqlFragment> {
        Ok(SqlFragment {
            sql: format!("{column} {operator} ${index}"),
            params: vec![value.clone()],
            next_index: index + 1,
        })
    }

    fn like(
        &self,
        column: &str,
        value: &FilterValue,
        pattern: &str,
        index: u32,
    ) -> Result<SqlFragment> {
        let wrapped = match value {
            FilterValue::Str(s) => pattern.replace("{}", s),
            other => {
                return Err(Error::ValidationFailed(format!(
                    "LIKE requires a string value, got {other:?}"
                )))
            }
        };
        Ok(SqlFragment {
            sql: format!("{column} LIKE ${index}"),
            params: vec![FilterValue::Str(wrapped)],
            next_index: index + 1,
        })
    }
}

fn single(value: Option<&FilterValueOrList>) -> Result<&FilterValue> {
    match value {
        Some(FilterValueOrList::Single(v)) => Ok(v),
        _ => Err(Error::ValidationFailed(
            "expected a single scalar value".to_string(),
        )),
    }
}

fn list(value: Option<&FilterValueOrList>) -> Result<&[FilterValue]> {
    match value {
        Some(FilterValueOrList::List(v)) => Ok(v.as_slice()),
        _ => Err(Error::ValidationFailed(
            "expected a value list".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse;
    use serde_json::json;

    fn columns() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("name".to_string(), "\"name\"".to_string());
        m.insert("role".to_string(), "\"role\"".to_string());
        m
    }

    #[test]
    fn eq_emits_single_placeholder() {
        let filter = parse(&json!({"type":"CMP","op":"EQ","path":["name"],"value":"x"})).unwrap();
        let cols = columns();
        let translator = SqlTranslator::new(&cols);
        let frag = translator.translate(&filter, 1).unwrap();
        assert_eq!(frag.sql, "\"name\" = $1");
        assert_eq!(frag.params.len(), 1);
        assert_eq!(frag.next_index, 2);
    }

    #[test]
    fn unmapped_column_fails() {
        let filter = parse(&json!({"type":"CMP","op":"EQ","path":["unmapped"],"value":"x"})).unwrap();
        let cols = columns();
        let translator = SqlTranslator::new(&cols);
        assert!(translator.translate(&filter, 1).is_err());
    }

    #[test]
    fn params_length_matches_placeholder_count() {
        let filter = parse(&json!({
            "type":"AND",
            "nodes":[
                {"type":"CMP","op":"EQ","path":["name"],"value":"x"},
                {"type":"CMP","op":"EQ","path":["role"],"value":"admin"}
            ]
        }))
        .unwrap();
        let cols = columns();
        let translator = SqlTranslator::new(&cols);
        let frag = translator.translate(&filter, 1).unwrap();
        assert_eq!(frag.params.len(), 2);
        assert_eq!(frag.next_index, 3);
    }

    #[test]
    fn in_uses_any_array() {
        let filter =
            parse(&json!({"type":"CMP","op":"IN","path":["role"],"value":["a","b"]})).unwrap();
        let cols = columns();
        let translator = SqlTranslator::new(&cols);
        let frag = translator.translate(&filter, 1).unwrap();
        assert!(frag.sql.contains("= ANY(array[$1])"));
        assert_eq!(frag.params.len(), 2);
    }
}
