//! JSON:API documents: resource objects, links, and the response envelope.

use crate::config::Entity;
use crate::error::ApiError;
use crate::store::Record;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub const JSONAPI_CONTENT_TYPE: &str = "application/vnd.api+json";

#[derive(Serialize, Debug, Clone)]
pub struct ResourceObject {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub relationships: Map<String, Value>,
    pub links: SelfLink,
}

#[derive(Serialize, Debug, Clone)]
pub struct SelfLink {
    #[serde(rename = "self")]
    pub self_: String,
}

/// Resolved URL templates, filled in once routes are finalized.
#[derive(Clone, Debug, Default)]
pub struct LinkTable {
    /// type → (instance URL template, id placeholder)
    instance: HashMap<String, (String, String)>,
    collection: HashMap<String, String>,
    relationship_fmt: String,
}

impl LinkTable {
    pub fn new(relationship_fmt: impl Into<String>) -> Self {
        LinkTable {
            relationship_fmt: relationship_fmt.into(),
            ..Default::default()
        }
    }

    pub fn add_entity(&mut self, type_name: &str, collection: &str, instance: &str, id_param: &str) {
        self.collection
            .insert(type_name.to_string(), collection.to_string());
        self.instance.insert(
            type_name.to_string(),
            (instance.to_string(), format!("{{{}}}", id_param)),
        );
    }

    pub fn collection_url(&self, type_name: &str) -> String {
        self.collection.get(type_name).cloned().unwrap_or_default()
    }

    /// Instance URL, or empty when the type is not exposed.
    pub fn instance_url(&self, type_name: &str, id: &str) -> String {
        match self.instance.get(type_name) {
            Some((template, placeholder)) => template.replace(placeholder.as_str(), id),
            None => String::new(),
        }
    }

    pub fn related_url(&self, type_name: &str, id: &str, rel: &str) -> String {
        self.relationship_fmt
            .replace("{parent}", &self.instance_url(type_name, id))
            .replace("{rel}", rel)
    }
}

/// Build the resource object for a stored row.
pub fn resource_object(
    entity: &Entity,
    record: &Record,
    links: &LinkTable,
) -> Result<ResourceObject, ApiError> {
    let id = entity.identifier_of(record)?;
    let relationships = entity
        .relationships
        .iter()
        .map(|r| {
            (
                r.name.clone(),
                json!({ "links": { "related": links.related_url(&entity.type_name, &id, &r.name) } }),
            )
        })
        .collect();
    Ok(ResourceObject {
        links: SelfLink {
            self_: links.instance_url(&entity.type_name, &id),
        },
        attributes: entity.attributes_of(record),
        type_name: entity.type_name.clone(),
        relationships,
        id,
    })
}

/// `{id, type}` resource identifier object.
pub fn identifier_object(entity: &Entity, record: &Record) -> Result<Value, ApiError> {
    Ok(json!({ "id": entity.identifier_of(record)?, "type": entity.type_name }))
}

/// Status plus optional `Location` and JSON:API body.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        ApiResponse {
            status: StatusCode::OK,
            location: None,
            body: Some(body),
        }
    }

    pub fn created(body: Value, location: Option<String>) -> Self {
        ApiResponse {
            status: StatusCode::CREATED,
            location,
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        ApiResponse {
            status: StatusCode::NO_CONTENT,
            location: None,
            body: None,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            Some(body) => {
                let mut r = (self.status, Json(body)).into_response();
                r.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(JSONAPI_CONTENT_TYPE),
                );
                r
            }
            None => self.status.into_response(),
        };
        if let Some(location) = self.location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            response.headers_mut().insert(header::LOCATION, location);
        }
        response
    }
}

pub fn error_body(detail: &str) -> Value {
    json!({ "errors": [{ "detail": detail }] })
}

pub fn error_response(status: StatusCode, detail: &str) -> Response {
    let mut r = (status, Json(error_body(detail))).into_response();
    r.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSONAPI_CONTENT_TYPE),
    );
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_substitute_id_placeholders() {
        let mut links = LinkTable::new("{parent}/{rel}");
        links.add_entity("Widget", "/api/Widget/", "/api/Widget/{WidgetId}", "WidgetId");
        assert_eq!(links.instance_url("Widget", "abc"), "/api/Widget/abc");
        assert_eq!(
            links.related_url("Widget", "abc", "parts"),
            "/api/Widget/abc/parts"
        );
        assert_eq!(links.instance_url("Gadget", "abc"), "");
    }

    #[test]
    fn error_body_has_jsonapi_shape() {
        assert_eq!(
            error_body("Invalid WidgetId"),
            json!({"errors": [{"detail": "Invalid WidgetId"}]})
        );
    }

    #[test]
    fn error_responses_use_jsonapi_content_type() {
        let r = error_response(StatusCode::NOT_FOUND, "Widget 1 not found");
        assert_eq!(r.status(), StatusCode::NOT_FOUND);
        assert_eq!(r.headers()[header::CONTENT_TYPE], JSONAPI_CONTENT_TYPE);
    }

    #[test]
    fn no_content_has_no_body_and_location_is_set() {
        let r = ApiResponse::no_content().into_response();
        assert_eq!(r.status(), StatusCode::NO_CONTENT);

        let r = ApiResponse::created(json!({}), Some("/api/Widget/1".into())).into_response();
        assert_eq!(r.headers()[header::LOCATION], "/api/Widget/1");
    }
}
