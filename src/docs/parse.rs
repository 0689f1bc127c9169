//! Structured doc comments.
//!
//! A doc comment is YAML up to the first `----`; anything after it is free text for humans.
//!
//! ```text
//! summary: Count widgets heavier than a threshold
//! http_methods: [GET, POST]
//! args:
//!   min_weight: 10
//! ----
//! Free-form notes.
//! ```

use crate::error::DocError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const DOC_DELIMITER: &str = "----";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DocBlock {
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Upper-case HTTP verbs; empty means the caller's default.
    pub http_methods: Vec<String>,
    /// Argument name → example value.
    pub args: BTreeMap<String, Value>,
    pub tags: Vec<String>,
}

/// Text before the delimiter, trimmed.
pub fn doc_head(text: &str) -> &str {
    text.split(DOC_DELIMITER).next().unwrap_or("").trim()
}

/// Parse a structured doc comment.
///
/// `Ok(None)` when there is no doc, when the text is not YAML, or when it is YAML but not a
/// mapping. A mapping with badly shaped fields is an error.
pub fn parse_doc(target: &str, text: Option<&str>) -> Result<Option<DocBlock>, DocError> {
    let Some(text) = text else { return Ok(None) };
    let head = doc_head(text);
    if head.is_empty() {
        return Ok(None);
    }
    let raw: serde_yaml::Value = match serde_yaml::from_str(head) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    if !raw.is_mapping() {
        return Ok(None);
    }
    serde_yaml::from_value(raw)
        .map(Some)
        .map_err(|source| DocError::Malformed {
            target: target.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mapping_before_delimiter() {
        let doc = parse_doc(
            "Widget.heavy",
            Some("summary: Heavy widgets\nhttp_methods: [GET]\nargs:\n  min: 3\n----\nnot: [yaml"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(doc.summary.as_deref(), Some("Heavy widgets"));
        assert_eq!(doc.http_methods, vec!["GET".to_string()]);
        assert_eq!(doc.args["min"], serde_json::json!(3));
    }

    #[test]
    fn unparseable_or_scalar_text_is_absent() {
        assert_eq!(parse_doc("x", Some("just prose about widgets")).unwrap(), None);
        assert_eq!(parse_doc("x", Some("key: [unclosed")).unwrap(), None);
        assert_eq!(parse_doc("x", Some("- a\n- b")).unwrap(), None);
        assert_eq!(parse_doc("x", None).unwrap(), None);
    }

    #[test]
    fn badly_shaped_mapping_is_an_error() {
        let err = parse_doc("Widget.heavy", Some("summary: [1, 2]")).unwrap_err();
        assert!(matches!(err, DocError::Malformed { .. }));
    }
}
