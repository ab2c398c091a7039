//! OData-like query-string translator.

use std::collections::HashSet;
use std::fmt::Write as _;

use super::{CmpOp, Filter, FilterValue, FilterValueOrList};
use crate::error::{Error, Result};

/// Translates a validated `Filter` into an OData-style query string
/// against a per-call allow-list of dotted paths.
pub struct ODataTranslator<'a> {
    allowed_paths: &'a HashSet<String>,
}

impl<'a> ODataTranslator<'a> {
    pub fn new(allowed_paths: &'a HashSet<String>) -> Self {
        Self { allowed_paths }
    }

    pub fn translate(&self, filter: &Filter) -> Result<String> {
        match filter {
            Filter::Cmp { op, path, value } => self.translate_cmp(*op, path, value.as_ref()),
            Filter::And { nodes } => self.translate_join(nodes, "and"),
            Filter::Or { nodes } => self.translate_join(nodes, "or"),
            Filter::Not { node } => {
                let inner = self.translate(node)?;
                Ok(format!("(not {inner})"))
            }
        }
    }

    fn translate_join(&self, nodes: &[Filter], joiner: &str) -> Result<String> {
        let mut parts = Vec::with_capacity(nodes.len());
        for node in nodes {
            parts.push(self.translate(node)?);
        }
        Ok(format!("({})", parts.join(&format!(" {joiner} "))))
    }

    fn translate_cmp(
        &self,
        op: CmpOp,
        path: &[String],
        value: Option<&FilterValueOrList>,
    ) -> Result<String> {
        if path.len() > 1 {
            return Err(Error::ValidationFailed(format!(
                "nested path not supported by query-string translator: {}",
                path.join(".")
            )));
        }
        let field = &path[0];
        if !self.allowed_paths.contains(field) {
            return Err(Error::ValidationFailed(format!(
                "path not allowed for this search: {field}"
            )));
        }

        match op {
            CmpOp::Exists => Ok(format!("{field} ne null")),
            CmpOp::Eq => Ok(format!("{field} eq {}", render_scalar(single(value)?))),
            CmpOp::Gt => Ok(format!("{field} gt {}", render_scalar(single(value)?))),
            CmpOp::Gte => Ok(format!("{field} ge {}", render_scalar(single(value)?))),
            CmpOp::Lt => Ok(format!("{field} lt {}", render_scalar(single(value)?))),
            CmpOp::Lte => Ok(format!("{field} le {}", render_scalar(single(value)?))),
            CmpOp::Contains => Ok(format!("contains({field}, {})", render_scalar(single(value)?))),
            CmpOp::StartsWith => {
                Ok(format!("startswith({field}, {})", render_scalar(single(value)?)))
            }
            CmpOp::EndsWith => {
                Ok(format!("endswith({field}, {})", render_scalar(single(value)?)))
            }
            CmpOp::In => {
                let values = list(value)?;
                let rendered: Vec<String> = values.iter().map(render_scalar).collect();
                let mut out = String::new();
                let _ = write!(out, "({})", rendered.join(", "));
                Ok(format!("{field} in {out}"))
            }
        }
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

/// Quote and escape a scalar for embedding in an OData filter string.
/// Single quotes inside string values are doubled, matching OData's own
/// escaping convention for literal quotes.
fn render_scalar(value: &FilterValue) -> String {
    match value {
        FilterValue::Str(s) => format!("'{}'", s.replace('\'', "''")),
        FilterValue::Int(i) => i.to_string(),
        FilterValue::Bool(b) => b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse;
    use serde_json::json;

    fn allow(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_quote_is_doubled() {
        let filter = parse(&json!({"type":"CMP","op":"EQ","path":["name"],"value":"O'Hara"}))
            .unwrap();
        let allowed = allow(&["name"]);
        let translator = ODataTranslator::new(&allowed);
        let output = translator.translate(&filter).unwrap();
        assert!(output.contains("'O''Hara'"));
    }

    #[test]
    fn nested_path_fails() {
        let filter = parse(&json!({"type":"CMP","op":"EQ","path":["a","b"],"value":"x"})).unwrap();
        let allowed = allow(&["a.b"]);
        let translator = ODataTranslator::new(&allowed);
        assert!(translator.translate(&filter).is_err());
    }

    #[test]
    fn not_wraps_in_parens() {
        let filter = parse(&json!({
            "type":"NOT",
            "node":{"type":"CMP","op":"EQ","path":["name"],"value":"x"}
        }))
        .unwrap();
        let allowed = allow(&["name"]);
        let translator = ODataTranslator::new(&allowed);
        let output = translator.translate(&filter).unwrap();
        assert!(output.starts_with("(not "));
    }

    #[test]
    fn and_join_parenthesizes() {
        let filter = parse(&json!({
            "type":"AND",
            "nodes":[
                {"type":"CMP","op":"EQ","path":["name"],"value":"x"},
                {"type":"CMP","op":"EQ","path":["role"],"value":"admin"}
            ]
        }))
        .unwrap();
        let allowed = allow(&["name", "role"]);
        let translator = ODataTranslator::new(&allowed);
        let output = translator.translate(&filter).unwrap();
        assert!(output.starts_with('(') && output.contains(" and "));
    }
}
