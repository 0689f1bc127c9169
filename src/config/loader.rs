//! Load model config from JSON and resolve it into runtime entities.

use crate::config::resolved::{Column, Entity, Linkage, Model, Relationship};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use crate::id::strategy_by_name;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Build the resolved model (validates first).
pub fn resolve(config: &ModelConfig) -> Result<Model, ConfigError> {
    validate(config)?;

    let mut entities = Vec::with_capacity(config.entities.len());
    let mut entity_by_type = HashMap::new();

    for e in &config.entities {
        let columns: Vec<Column> = e
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                kind: c.kind,
                primary_key: c.primary_key,
                nullable: c.nullable,
                writable: c.writable,
                has_default: c.has_default,
                example: c.example.clone(),
            })
            .collect();
        let pk_columns = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        let relationships = e.relationships.iter().map(resolve_relationship).collect();
        let id_strategy =
            strategy_by_name(&e.id_strategy).ok_or_else(|| ConfigError::MissingReference {
                kind: "id strategy",
                id: e.id_strategy.clone(),
            })?;

        let entity = Arc::new(Entity {
            type_name: e.type_name.clone(),
            table_name: e.table.clone(),
            schema_name: e.schema.clone(),
            doc: e.doc.clone(),
            columns,
            pk_columns,
            relationships,
            methods: Vec::new(),
            id_strategy,
        });
        entity_by_type.insert(e.type_name.clone(), entity.clone());
        entities.push(entity);
    }

    Ok(Model {
        entities,
        entity_by_type,
    })
}

fn resolve_relationship(r: &RelationshipConfig) -> Relationship {
    let linkage = match (&r.association, &r.foreign_key, r.cardinality) {
        (Some(a), _, _) => Linkage::Association {
            table: a.table.clone(),
            parent_column: a.parent_column.clone(),
            child_column: a.child_column.clone(),
        },
        (None, Some(fk), Cardinality::ToMany) => Linkage::ChildColumn(fk.clone()),
        (None, Some(fk), Cardinality::ToOne) => Linkage::ParentColumn(fk.clone()),
        // validate() rejects relationships without a linkage
        (None, None, _) => Linkage::ChildColumn(String::new()),
    };
    Relationship {
        name: r.name.clone(),
        target: r.target.clone(),
        cardinality: r.cardinality,
        linkage,
    }
}

/// Read a model file (JSON with an `entities` array).
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<ModelConfig, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    ModelConfig::from_json_str(&raw)
}
