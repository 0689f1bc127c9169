//! Parsed request: path parameters, query string, raw body.

use crate::config::Entity;
use crate::error::ApiError;
use crate::store::{ListQuery, Record};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct ApiRequest {
    pub path: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Bytes,
}

impl ApiRequest {
    /// Assemble a request from extracted parts. Query and body failures become `ApiError`s so
    /// they are reported like any other handler error.
    pub fn from_parts(
        path: HashMap<String, String>,
        raw_query: Option<&str>,
        body: Result<Bytes, BytesRejection>,
    ) -> Result<Self, ApiError> {
        let query = match raw_query {
            Some(raw) => serde_urlencoded::from_str(raw)
                .map_err(|e| ApiError::validation(format!("Invalid query string: {}", e)))?,
            None => HashMap::new(),
        };
        let body = body.map_err(|e| ApiError::generic(e.status(), e.body_text()))?;
        Ok(ApiRequest { path, query, body })
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path.get(name).map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Body as JSON, whatever the content type. `None` for an empty body.
    pub fn json_body(&self) -> Result<Option<Value>, ApiError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&self.body)
            .map(Some)
            .map_err(|e| ApiError::validation(format!("Invalid JSON body: {}", e)))
    }

    /// `details=all` asks for full resource objects instead of identifiers.
    pub fn details_all(&self) -> bool {
        self.query_param("details") == Some("all")
    }

    /// Paging from `limit` and `page[offset]`.
    pub fn list_query(&self) -> Result<ListQuery, ApiError> {
        let limit = match self.query_param("limit") {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .map_err(|_| ApiError::validation(format!("Invalid limit: {}", raw)))?,
            ),
            None => None,
        };
        let offset = match self.query_param("page[offset]") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ApiError::validation(format!("Invalid page[offset]: {}", raw)))?,
            None => 0,
        };
        Ok(ListQuery { limit, offset })
    }

    /// Query parameters as a JSON map of strings.
    pub fn query_args(&self) -> Map<String, Value> {
        self.query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }
}

/// The `data` member of a JSON:API document.
pub fn data_member(body: Option<Value>) -> Result<Value, ApiError> {
    match body {
        Some(Value::Object(mut doc)) => doc
            .remove("data")
            .ok_or_else(|| ApiError::validation("Invalid data payload")),
        _ => Err(ApiError::validation("Invalid data payload")),
    }
}

/// Check `type` against the entity; absent types are allowed when `required` is false.
pub fn check_type(entity: &Entity, data: &Map<String, Value>, required: bool) -> Result<(), ApiError> {
    match data.get("type") {
        Some(Value::String(t)) if t == &entity.type_name => Ok(()),
        Some(Value::String(t)) if !t.is_empty() => Err(ApiError::validation(format!(
            "Invalid type '{}', expected '{}'",
            t, entity.type_name
        ))),
        None if !required => Ok(()),
        _ => Err(ApiError::validation("Invalid type")),
    }
}

/// Attribute map checked against the entity's columns.
///
/// `allow_keys` admits primary-key columns (creation of composite-key rows).
pub fn attributes(
    entity: &Entity,
    data: &Map<String, Value>,
    allow_keys: bool,
) -> Result<Record, ApiError> {
    let attrs = match data.get("attributes") {
        None | Some(Value::Null) => return Ok(Record::new()),
        Some(Value::Object(m)) => m,
        Some(_) => return Err(ApiError::validation("Invalid attributes object")),
    };
    let mut out = Record::new();
    for (name, value) in attrs {
        let ok = match entity.column(name) {
            Some(c) if c.primary_key => allow_keys,
            Some(c) => c.writable,
            None => false,
        };
        if !ok {
            return Err(ApiError::validation(format!(
                "Argument {} not valid for {}",
                name, entity.type_name
            )));
        }
        out.insert(name.clone(), value.clone());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(query: &[(&str, &str)], body: &str) -> ApiRequest {
        ApiRequest {
            path: HashMap::new(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn paging_parameters_are_validated() {
        let q = req(&[("limit", "5"), ("page[offset]", "10")], "").list_query().unwrap();
        assert_eq!(q, ListQuery { limit: Some(5), offset: 10 });
        assert_eq!(req(&[], "").list_query().unwrap().limit, None);
        assert!(req(&[("limit", "-1")], "").list_query().is_err());
        assert!(req(&[("page[offset]", "x")], "").list_query().is_err());
    }

    #[test]
    fn raw_query_is_decoded() {
        let r = ApiRequest::from_parts(
            HashMap::new(),
            Some("page%5Boffset%5D=2&details=all&name=a%20b"),
            Ok(Bytes::new()),
        )
        .unwrap();
        assert_eq!(r.query_param("page[offset]"), Some("2"));
        assert_eq!(r.query_param("name"), Some("a b"));
        assert!(r.details_all());

        let r = ApiRequest::from_parts(HashMap::new(), None, Ok(Bytes::new())).unwrap();
        assert!(r.query.is_empty());
    }

    #[test]
    fn empty_and_malformed_bodies() {
        assert_eq!(req(&[], "  \n").json_body().unwrap(), None);
        assert!(matches!(
            req(&[], "{not json").json_body(),
            Err(ApiError::Validation(_))
        ));
        assert!(data_member(Some(serde_json::json!({"meta": {}}))).is_err());
    }
}
