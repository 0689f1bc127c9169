//! Documentation Object: every documented operation, keyed by URL template and verb.
//!
//! Filled during exposure, then frozen into an OpenAPI document when the router is built.

use crate::error::DocError;
use crate::resource::Verb;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use utoipa::openapi::{
    content::ContentBuilder,
    info::InfoBuilder,
    path::{OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder, PathsBuilder},
    request_body::RequestBodyBuilder,
    response::{ResponseBuilder, ResponsesBuilder},
    schema::{ComponentsBuilder, ObjectBuilder, Schema, SchemaFormat, SchemaType, Type},
    tag::TagBuilder,
    OpenApi, OpenApiBuilder, Ref, RefOr, Required,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamIn {
    Path,
    Query,
    /// Request body; `schema` names a definition.
    Body,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamDoc {
    pub name: String,
    pub location: ParamIn,
    /// OpenAPI primitive type.
    pub param_type: String,
    pub format: Option<String>,
    pub default: Option<Value>,
    pub required: bool,
    pub description: Option<String>,
    pub schema: Option<String>,
}

impl ParamDoc {
    pub fn path(name: impl Into<String>, default: Option<Value>) -> Self {
        ParamDoc {
            name: name.into(),
            location: ParamIn::Path,
            param_type: "string".into(),
            format: None,
            default,
            required: true,
            description: None,
            schema: None,
        }
    }

    pub fn query(name: impl Into<String>, param_type: &str, description: impl Into<String>) -> Self {
        ParamDoc {
            name: name.into(),
            location: ParamIn::Query,
            param_type: param_type.into(),
            format: None,
            default: None,
            required: false,
            description: Some(description.into()),
            schema: None,
        }
    }

    pub fn body(schema: impl Into<String>, description: impl Into<String>) -> Self {
        ParamDoc {
            name: "POST body".into(),
            location: ParamIn::Body,
            param_type: "object".into(),
            format: None,
            default: None,
            required: true,
            description: Some(description.into()),
            schema: Some(schema.into()),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResponseDoc {
    pub status: u16,
    pub description: String,
}

impl ResponseDoc {
    pub fn new(status: u16, description: impl Into<String>) -> Self {
        ResponseDoc {
            status,
            description: description.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OperationDoc {
    pub summary: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub parameters: Vec<ParamDoc>,
    pub responses: Vec<ResponseDoc>,
    /// Assigned on registration.
    pub operation_id: String,
}

#[derive(Clone, Debug, Default)]
pub struct DocRegistry {
    paths: BTreeMap<String, BTreeMap<Verb, OperationDoc>>,
    definitions: BTreeMap<String, Value>,
    tags: Vec<(String, Option<String>)>,
    operation_ids: HashMap<String, u32>,
}

impl DocRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next operation id for a summary: alphanumerics of the summary plus a running counter.
    pub fn operation_id(&mut self, summary: &str) -> String {
        let key: String = summary.chars().filter(|c| c.is_alphanumeric()).collect();
        let n = match self.operation_ids.get_mut(&key) {
            Some(n) => {
                *n += 1;
                *n
            }
            None => {
                self.operation_ids.insert(key.clone(), 0);
                0
            }
        };
        format!("{}_{}", key, n)
    }

    pub fn add_tag(&mut self, name: &str, description: Option<String>) {
        if !self.tags.iter().any(|(n, _)| n == name) {
            self.tags.push((name.to_string(), description));
        }
    }

    pub fn add_definition(&mut self, name: impl Into<String>, schema: Value) -> Result<(), DocError> {
        let name = name.into();
        validate_definition(&name, &schema)?;
        self.definitions.insert(name, schema);
        Ok(())
    }

    /// Register one operation and return its operation id.
    ///
    /// Path parameters whose placeholder is not in `template` are dropped and duplicate
    /// parameters are collapsed before the operation is validated.
    pub fn register(
        &mut self,
        template: &str,
        verb: Verb,
        mut op: OperationDoc,
    ) -> Result<String, DocError> {
        let path = swagger_path(template)?;
        let mut params: Vec<ParamDoc> = Vec::with_capacity(op.parameters.len());
        for p in op.parameters.drain(..) {
            if p.location == ParamIn::Path && !path.contains(&format!("{{{}}}", p.name)) {
                continue;
            }
            if !params.contains(&p) {
                params.push(p);
            }
        }
        op.parameters = params;
        validate_operation(&path, &op)?;
        for p in &op.parameters {
            if let Some(schema) = &p.schema {
                if !self.definitions.contains_key(schema) {
                    return Err(DocError::InvalidPathItem {
                        path: path.clone(),
                        reason: format!("body parameter references unknown definition {}", schema),
                    });
                }
            }
        }
        op.operation_id = self.operation_id(&op.summary);
        let id = op.operation_id.clone();
        self.paths.entry(path).or_default().insert(verb, op);
        Ok(id)
    }

    pub fn paths(&self) -> &BTreeMap<String, BTreeMap<Verb, OperationDoc>> {
        &self.paths
    }

    pub fn operation(&self, template: &str, verb: Verb) -> Option<&OperationDoc> {
        self.paths.get(template).and_then(|ops| ops.get(&verb))
    }

    pub fn definitions(&self) -> &BTreeMap<String, Value> {
        &self.definitions
    }

    /// Re-check the whole object before it is frozen.
    pub fn validate(&self) -> Result<(), DocError> {
        for (path, item) in &self.paths {
            validate_path_item(path, item)?;
        }
        validate_definitions(&self.definitions)
    }

    /// Render the accumulated documentation as an OpenAPI document.
    pub fn build_openapi(&self, title: &str, version: &str) -> OpenApi {
        tracing::info!(
            paths = self.paths.len(),
            definitions = self.definitions.len(),
            "building OpenAPI document"
        );
        let mut paths = PathsBuilder::new();
        for (path, ops) in &self.paths {
            let mut item = PathItemBuilder::new();
            for (verb, op) in ops {
                item = item.operation(verb.http_method(), build_operation(op));
            }
            paths = paths.path(path.clone(), item.build());
        }

        let mut components = ComponentsBuilder::new();
        for (name, schema) in &self.definitions {
            match serde_json::from_value::<RefOr<Schema>>(schema.clone()) {
                Ok(s) => components = components.schema(name.clone(), s),
                Err(e) => tracing::warn!(definition = %name, error = %e, "skipping definition"),
            }
        }

        let tags = self
            .tags
            .iter()
            .map(|(name, description)| {
                TagBuilder::new()
                    .name(name.clone())
                    .description(description.clone())
                    .build()
            })
            .collect::<Vec<_>>();

        OpenApiBuilder::new()
            .info(InfoBuilder::new().title(title).version(version).build())
            .paths(paths.build())
            .components(Some(components.build()))
            .tags(Some(tags))
            .build()
    }
}

fn build_operation(op: &OperationDoc) -> utoipa::openapi::path::Operation {
    let mut builder = OperationBuilder::new()
        .operation_id(Some(op.operation_id.clone()))
        .summary(Some(op.summary.clone()))
        .description(op.description.clone());
    for tag in &op.tags {
        builder = builder.tag(tag.clone());
    }
    for p in &op.parameters {
        let in_ = match p.location {
            ParamIn::Path => ParameterIn::Path,
            ParamIn::Query => ParameterIn::Query,
            ParamIn::Body => {
                if let Some(name) = &p.schema {
                    let content = ContentBuilder::new()
                        .schema(Some(RefOr::Ref(Ref::from_schema_name(name.clone()))))
                        .build();
                    let body = RequestBodyBuilder::new()
                        .description(p.description.clone())
                        .content(crate::response::JSONAPI_CONTENT_TYPE, content)
                        .required(Some(Required::True))
                        .build();
                    builder = builder.request_body(Some(body));
                }
                continue;
            }
        };
        let schema_type = match p.param_type.as_str() {
            "integer" => SchemaType::Type(Type::Integer),
            "number" => SchemaType::Type(Type::Number),
            "boolean" => SchemaType::Type(Type::Boolean),
            _ => SchemaType::Type(Type::String),
        };
        let schema = ObjectBuilder::new()
            .schema_type(schema_type)
            .format(p.format.clone().map(SchemaFormat::Custom))
            .default(p.default.clone())
            .build();
        let param = ParameterBuilder::new()
            .name(&p.name)
            .parameter_in(in_)
            .required(if p.required {
                Required::True
            } else {
                Required::False
            })
            .description(p.description.clone())
            .schema(Some(Schema::Object(schema)))
            .build();
        builder = builder.parameter(param);
    }
    let mut responses = ResponsesBuilder::new();
    for r in &op.responses {
        responses = responses.response(
            r.status.to_string(),
            ResponseBuilder::new().description(&r.description).build(),
        );
    }
    builder.responses(responses.build()).build()
}

const DEFINITION_NAME: &str = r"^[A-Za-z0-9._-]+$";

fn validate_definition(name: &str, schema: &Value) -> Result<(), DocError> {
    let re = Regex::new(DEFINITION_NAME).map_err(|e| DocError::InvalidDefinition {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    if !re.is_match(name) {
        return Err(DocError::InvalidDefinition {
            name: name.to_string(),
            reason: "name must match [A-Za-z0-9._-]+".into(),
        });
    }
    if !schema.is_object() {
        return Err(DocError::InvalidDefinition {
            name: name.to_string(),
            reason: "schema must be an object".into(),
        });
    }
    Ok(())
}

/// Check every definition of a definitions object.
pub fn validate_definitions(definitions: &BTreeMap<String, Value>) -> Result<(), DocError> {
    definitions
        .iter()
        .try_for_each(|(name, schema)| validate_definition(name, schema))
}

fn validate_operation(path: &str, op: &OperationDoc) -> Result<(), DocError> {
    let invalid = |reason: String| DocError::InvalidPathItem {
        path: path.to_string(),
        reason,
    };
    if op.responses.is_empty() {
        return Err(invalid(format!("'{}' has no responses", op.summary)));
    }
    for p in &op.parameters {
        if p.name.is_empty() {
            return Err(invalid("unnamed parameter".into()));
        }
        if p.location == ParamIn::Path && !p.required {
            return Err(invalid(format!("path parameter {} must be required", p.name)));
        }
        if p.location == ParamIn::Body && p.schema.is_none() {
            return Err(invalid("body parameter without schema".into()));
        }
    }
    Ok(())
}

/// Check a path item (all operations on one template).
pub fn validate_path_item(path: &str, item: &BTreeMap<Verb, OperationDoc>) -> Result<(), DocError> {
    item.values().try_for_each(|op| validate_operation(path, op))
}

/// The documented path for a URL template. Templates must be absolute.
pub fn swagger_path(template: &str) -> Result<String, DocError> {
    if !template.starts_with('/') {
        return Err(DocError::InvalidPath(template.to_string()));
    }
    Ok(template.to_string())
}

/// Router path for a URL template: `{Name}` becomes `:Name`.
pub fn axum_path(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c == '{' {
            out.push(':');
            for n in chars.by_ref() {
                if n == '}' {
                    break;
                }
                out.push(n);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(summary: &str, params: Vec<ParamDoc>) -> OperationDoc {
        OperationDoc {
            summary: summary.into(),
            parameters: params,
            responses: vec![ResponseDoc::new(200, "ok")],
            ..Default::default()
        }
    }

    #[test]
    fn operation_ids_count_per_normalized_summary() {
        let mut reg = DocRegistry::new();
        assert_eq!(reg.operation_id("Retrieve a Widget object"), "RetrieveaWidgetobject_0");
        assert_eq!(reg.operation_id("Retrieve a Widget-object!"), "RetrieveaWidgetobject_1");
        assert_eq!(reg.operation_id("Other"), "Other_0");
    }

    #[test]
    fn path_params_missing_from_template_are_dropped() {
        let mut reg = DocRegistry::new();
        let params = vec![
            ParamDoc::path("WidgetId", None),
            ParamDoc::query("limit", "integer", "page size"),
            ParamDoc::query("limit", "integer", "page size"),
        ];
        reg.register("/api/Widget/", Verb::Get, op("List", params)).unwrap();
        let stored = reg.operation("/api/Widget/", Verb::Get).unwrap();
        assert_eq!(stored.parameters.len(), 1);
        assert_eq!(stored.parameters[0].name, "limit");
    }

    #[test]
    fn relative_paths_and_bad_definitions_are_rejected() {
        let mut reg = DocRegistry::new();
        assert!(matches!(
            reg.register("api/Widget", Verb::Get, op("x", vec![])),
            Err(DocError::InvalidPath(_))
        ));
        assert!(reg.add_definition("has space", json!({})).is_err());
        assert!(reg.add_definition("ok_name", json!("string")).is_err());
        assert!(reg
            .register("/a", Verb::Post, op("x", vec![ParamDoc::body("missing", "b")]))
            .is_err());
    }

    #[test]
    fn operations_without_responses_are_rejected() {
        let mut reg = DocRegistry::new();
        let mut o = op("x", vec![]);
        o.responses.clear();
        assert!(matches!(
            reg.register("/a", Verb::Get, o),
            Err(DocError::InvalidPathItem { .. })
        ));
    }

    #[test]
    fn axum_path_rewrites_placeholders() {
        assert_eq!(
            axum_path("/api/Node/{NodeId}/children/{NodeId2}"),
            "/api/Node/:NodeId/children/:NodeId2"
        );
    }

    #[test]
    fn openapi_document_carries_paths_bodies_and_components() {
        let mut reg = DocRegistry::new();
        reg.add_definition("Widget_post_body_1", json!({"type": "object"}))
            .unwrap();
        reg.add_tag("Widget", Some("Widgets".into()));
        reg.register(
            "/api/Widget/",
            Verb::Post,
            op("Create a Widget object", vec![ParamDoc::body("Widget_post_body_1", "body")]),
        )
        .unwrap();
        reg.register(
            "/api/Widget/{WidgetId}",
            Verb::Get,
            op("Retrieve a Widget object", vec![ParamDoc::path("WidgetId", None)]),
        )
        .unwrap();

        let doc = serde_json::to_value(reg.build_openapi("t", "1")).unwrap();
        let post = doc.pointer("/paths/~1api~1Widget~1/post").unwrap();
        assert_eq!(post["operationId"], "CreateaWidgetobject_0");
        assert!(post["requestBody"].is_object());
        let get = doc.pointer("/paths/~1api~1Widget~1{WidgetId}/get").unwrap();
        assert_eq!(get["parameters"][0]["in"], "path");
        assert!(doc
            .pointer("/components/schemas/Widget_post_body_1")
            .is_some());
        assert_eq!(doc["tags"][0]["name"], "Widget");
    }
}
