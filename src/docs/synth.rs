//! Operation documentation synthesized from entity, relationship and method metadata.
//!
//! Request bodies get a definition of their own, named
//! `<Type>_<verb>_<purpose>_<unique suffix>`, so two synthesized schemas never collide.

use super::parse::DocBlock;
use super::registry::{DocRegistry, OperationDoc, ParamDoc, ResponseDoc};
use crate::config::{ApiMethod, Cardinality, Entity, MethodBinding, RelationshipDescriptor};
use crate::error::DocError;
use crate::resource::Verb;
use serde_json::{json, Map, Value};

fn definition_name(type_name: &str, verb: Verb, purpose: &str) -> String {
    format!(
        "{}_{}_{}_{}",
        type_name,
        verb.doc_name(),
        purpose,
        uuid::Uuid::new_v4().simple()
    )
}

/// Sample attribute values and their property schemas.
fn sample_attributes(entity: &Entity) -> (Map<String, Value>, Map<String, Value>) {
    let mut sample = Map::new();
    let mut properties = Map::new();
    for c in entity.writable_columns() {
        sample.insert(c.name.clone(), c.sample_value());
        properties.insert(c.name.clone(), json!({ "type": c.kind.doc_type() }));
    }
    (sample, properties)
}

fn id_param(entity: &Entity, name: &str) -> ParamDoc {
    ParamDoc::path(name, Some(Value::String(entity.id_strategy.generate())))
}

fn error_responses(responses: &mut Vec<ResponseDoc>) {
    responses.push(ResponseDoc::new(400, "Bad Request"));
    responses.push(ResponseDoc::new(500, "Internal Server Error"));
}

/// Query parameters every collection GET understands.
pub fn collection_params(entity: &Entity) -> Vec<ParamDoc> {
    let mut params = vec![
        ParamDoc::query("details", "string", "'all' returns full objects instead of identifiers"),
        ParamDoc::query("limit", "integer", "Maximum number of items"),
        ParamDoc::query("page[offset]", "integer", "Number of items to skip"),
        ParamDoc::query("include", "string", "Related relationships to include (csv)"),
        ParamDoc::query(
            format!("fields[{}]", entity.type_name),
            "string",
            "Fields to be selected (csv)",
        ),
        ParamDoc::query("sort", "string", "Sort order"),
    ];
    for c in &entity.columns {
        params.push(ParamDoc::query(
            format!("filter[{}]", c.name),
            "string",
            format!("{} attribute filter (csv)", c.name),
        ));
    }
    params
}

/// Documentation of one verb on an entity's collection or instance URL.
pub fn entity_operation(
    registry: &mut DocRegistry,
    entity: &Entity,
    id_name: &str,
    verb: Verb,
) -> Result<OperationDoc, DocError> {
    let t = &entity.type_name;
    let mut parameters = vec![id_param(entity, id_name)];
    let mut responses = Vec::new();
    let summary = match verb {
        Verb::Get => {
            responses.push(ResponseDoc::new(200, "Request fulfilled, document follows"));
            responses.push(ResponseDoc::new(404, "Not Found"));
            format!("Retrieve a {} object", t)
        }
        Verb::Post => {
            parameters.push(ParamDoc::body(
                entity_body(registry, entity, verb, false)?,
                format!("{} attributes", t),
            ));
            responses.push(ResponseDoc::new(201, "Object Created"));
            format!("Create a {} object", t)
        }
        Verb::Patch => {
            parameters.push(ParamDoc::body(
                entity_body(registry, entity, verb, true)?,
                format!("{} attributes", t),
            ));
            responses.push(ResponseDoc::new(201, "Object Updated"));
            responses.push(ResponseDoc::new(404, "Not Found"));
            format!("Update a {} object", t)
        }
        Verb::Delete => {
            responses.push(ResponseDoc::new(204, "Object Deleted"));
            responses.push(ResponseDoc::new(404, "Not Found"));
            format!("Delete a {} object", t)
        }
    };
    error_responses(&mut responses);
    Ok(OperationDoc {
        summary,
        description: None,
        tags: vec![t.clone()],
        parameters,
        responses,
        operation_id: String::new(),
    })
}

fn entity_body(
    registry: &mut DocRegistry,
    entity: &Entity,
    verb: Verb,
    with_id: bool,
) -> Result<String, DocError> {
    let (sample, properties) = sample_attributes(entity);
    let mut data = json!({ "type": entity.type_name, "attributes": sample });
    if with_id {
        data["id"] = Value::String(entity.id_strategy.generate());
    }
    let schema = json!({
        "type": "object",
        "properties": {
            "data": {
                "type": "object",
                "properties": {
                    "type": { "type": "string" },
                    "id": { "type": "string" },
                    "attributes": { "type": "object", "properties": properties },
                },
            },
        },
        "example": { "data": data },
    });
    let name = definition_name(&entity.type_name, verb, "body");
    registry.add_definition(name.clone(), schema)?;
    Ok(name)
}

/// Documentation of one verb on a relationship URL (root or child).
pub fn relationship_operation(
    registry: &mut DocRegistry,
    rel: &RelationshipDescriptor,
    parent_name: &str,
    child_name: &str,
    verb: Verb,
) -> Result<OperationDoc, DocError> {
    let parent = &rel.parent.type_name;
    let mut parameters = vec![
        id_param(&rel.parent, parent_name),
        id_param(&rel.child, child_name),
    ];
    let mut responses = Vec::new();
    let summary = match verb {
        Verb::Get => {
            responses.push(ResponseDoc::new(200, "Request fulfilled, document follows"));
            responses.push(ResponseDoc::new(404, "Not Found"));
            format!("Retrieve a {} object", rel.name)
        }
        Verb::Post => {
            parameters.push(ParamDoc::body(
                relationship_body(registry, rel, verb)?,
                format!("{} identifiers", rel.child.type_name),
            ));
            responses.push(ResponseDoc::new(201, "Relationship Updated"));
            format!("Update {}", rel.name)
        }
        Verb::Patch => {
            parameters.push(ParamDoc::body(
                relationship_body(registry, rel, verb)?,
                format!("{} object", rel.child.type_name),
            ));
            responses.push(ResponseDoc::new(201, "Object Updated"));
            format!("Update a {} object", rel.name)
        }
        Verb::Delete => {
            responses.push(ResponseDoc::new(204, "Object Removed"));
            format!("Delete from {} {}", parent, rel.name)
        }
    };
    error_responses(&mut responses);
    Ok(OperationDoc {
        summary,
        description: Some(format!(
            "{} {} ({})",
            parent,
            rel.name,
            match rel.cardinality {
                Cardinality::ToOne => "to-one",
                Cardinality::ToMany => "to-many",
            }
        )),
        tags: vec![parent.clone()],
        parameters,
        responses,
        operation_id: String::new(),
    })
}

fn relationship_body(
    registry: &mut DocRegistry,
    rel: &RelationshipDescriptor,
    verb: Verb,
) -> Result<String, DocError> {
    let item = json!({ "type": rel.child.type_name, "id": rel.child.id_strategy.generate() });
    let example = match (verb, rel.cardinality) {
        (Verb::Post, Cardinality::ToMany) => json!({ "data": [item] }),
        (Verb::Patch, _) => {
            let (sample, _) = sample_attributes(&rel.child);
            let mut item = item;
            item["attributes"] = Value::Object(sample);
            json!({ "data": item })
        }
        _ => json!({ "data": item }),
    };
    let schema = json!({ "type": "object", "example": example });
    let name = definition_name(&rel.parent.type_name, verb, &rel.name);
    registry.add_definition(name.clone(), schema)?;
    Ok(name)
}

/// Documentation of one verb of a custom method.
pub fn method_operation(
    registry: &mut DocRegistry,
    entity: &Entity,
    method: &ApiMethod,
    doc: Option<&DocBlock>,
    id_name: &str,
    verb: Verb,
) -> Result<OperationDoc, DocError> {
    let summary = doc
        .and_then(|d| d.summary.clone())
        .unwrap_or_else(|| format!("Invoke {}.{}", entity.type_name, method.name));
    let mut tags = doc.map(|d| d.tags.clone()).unwrap_or_default();
    if tags.is_empty() {
        tags.push(entity.type_name.clone());
    }
    let args = doc.map(|d| d.args.clone()).unwrap_or_default();

    let mut parameters = Vec::new();
    if method.binding == MethodBinding::Instance {
        parameters.push(id_param(entity, id_name));
    }
    match verb {
        Verb::Post => {
            let schema = json!({
                "type": "object",
                "properties": { "meta": { "type": "object" } },
                "example": { "meta": { "method": method.name, "args": args } },
            });
            let name = definition_name(&entity.type_name, verb, &method.name);
            registry.add_definition(name.clone(), schema)?;
            parameters.push(ParamDoc::body(name, format!("{} arguments", method.name)));
        }
        _ => {
            for (arg, example) in &args {
                parameters.push(
                    ParamDoc::query(arg.clone(), "string", format!("{} argument", arg))
                        .with_default(example.clone()),
                );
            }
        }
    }
    let mut responses = vec![ResponseDoc::new(200, "Success")];
    error_responses(&mut responses);
    Ok(OperationDoc {
        summary,
        description: doc.and_then(|d| d.description.clone()),
        tags,
        parameters,
        responses,
        operation_id: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ModelConfig};
    use crate::docs::registry::ParamIn;

    fn model() -> crate::config::Model {
        let config = ModelConfig::from_json_str(
            r#"{"entities":[{"type":"Node","table":"nodes","columns":[
                {"name":"id","kind":"uuid","primary_key":true},
                {"name":"label","example":"root"},
                {"name":"parent_id","kind":"uuid"}],
              "relationships":[{"name":"children","target":"Node","cardinality":"to_many","foreign_key":"parent_id"}]}]}"#,
        )
        .unwrap();
        resolve(&config).unwrap()
    }

    #[test]
    fn post_body_uses_fresh_definition_with_sample_values() {
        let m = model();
        let node = m.entity("Node").unwrap();
        let mut reg = DocRegistry::new();
        let a = entity_operation(&mut reg, node, "NodeId", Verb::Post).unwrap();
        let b = entity_operation(&mut reg, node, "NodeId", Verb::Post).unwrap();
        let body_a = a.parameters.iter().find(|p| p.location == ParamIn::Body).unwrap();
        let body_b = b.parameters.iter().find(|p| p.location == ParamIn::Body).unwrap();
        assert_ne!(body_a.schema, body_b.schema);
        assert!(body_a.schema.as_deref().unwrap().starts_with("Node_post_body_"));

        let schema = &reg.definitions()[body_a.schema.as_deref().unwrap()];
        assert_eq!(schema["example"]["data"]["attributes"]["label"], "root");
        assert_eq!(a.summary, "Create a Node object");
    }

    #[test]
    fn relationship_summaries_and_params() {
        let m = model();
        let rel = m.relationship("Node", "children").unwrap();
        let mut reg = DocRegistry::new();
        let op = relationship_operation(&mut reg, &rel, "NodeId", "NodeId2", Verb::Delete).unwrap();
        assert_eq!(op.summary, "Delete from Node children");
        let names: Vec<_> = op.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["NodeId", "NodeId2"]);
    }

    #[test]
    fn collection_params_cover_every_column() {
        let m = model();
        let params = collection_params(m.entity("Node").unwrap());
        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"fields[Node]"));
        assert!(names.contains(&"filter[parent_id]"));
        assert!(names.contains(&"page[offset]"));
    }
}
