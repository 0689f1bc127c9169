//! Model validation: referential integrity between entities, columns and relationships.

use crate::config::{Cardinality, EntityConfig, ModelConfig};
use crate::error::ConfigError;
use crate::id::strategy_by_name;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &ModelConfig) -> Result<(), ConfigError> {
    let mut types = HashSet::new();
    let mut tables = HashSet::new();
    for e in &config.entities {
        if !types.insert(e.type_name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "entity type",
                name: e.type_name.clone(),
            });
        }
        let qualified = format!("{}.{}", e.schema.as_deref().unwrap_or(""), e.table);
        if !tables.insert(qualified) {
            return Err(ConfigError::Duplicate {
                kind: "table",
                name: e.table.clone(),
            });
        }
    }
    let by_type: HashMap<&str, &EntityConfig> = config
        .entities
        .iter()
        .map(|e| (e.type_name.as_str(), e))
        .collect();

    for e in &config.entities {
        validate_columns(e)?;
        if strategy_by_name(&e.id_strategy).is_none() {
            return Err(ConfigError::Validation(format!(
                "{}: unknown id strategy '{}'",
                e.type_name, e.id_strategy
            )));
        }

        let mut rel_names = HashSet::new();
        for r in &e.relationships {
            if !rel_names.insert(r.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "relationship",
                    name: format!("{}.{}", e.type_name, r.name),
                });
            }
            let target = by_type
                .get(r.target.as_str())
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "entity type",
                    id: r.target.clone(),
                })?;
            let rel = format!("{}.{}", e.type_name, r.name);
            match (&r.foreign_key, &r.association, r.cardinality) {
                (Some(fk), None, Cardinality::ToMany) => {
                    require_column(target, fk, &rel)?;
                    require_single_key(e, &rel)?;
                }
                (Some(fk), None, Cardinality::ToOne) => {
                    require_column(e, fk, &rel)?;
                    require_single_key(target, &rel)?;
                }
                (None, Some(assoc), Cardinality::ToMany) => {
                    if assoc.table.is_empty()
                        || assoc.parent_column.is_empty()
                        || assoc.child_column.is_empty()
                    {
                        return Err(ConfigError::Validation(format!(
                            "{}: association needs table, parent_column and child_column",
                            rel
                        )));
                    }
                    require_single_key(e, &rel)?;
                    require_single_key(target, &rel)?;
                }
                (None, Some(_), Cardinality::ToOne) => {
                    return Err(ConfigError::Validation(format!(
                        "{}: to_one relationships cannot use an association table",
                        rel
                    )));
                }
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "{}: exactly one of foreign_key or association is required",
                        rel
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_columns(e: &EntityConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for c in &e.columns {
        if !names.insert(c.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "column",
                name: format!("{}.{}", e.type_name, c.name),
            });
        }
    }
    if !e.columns.iter().any(|c| c.primary_key) {
        return Err(ConfigError::InvalidPrimaryKey {
            entity: e.type_name.clone(),
            column: "<none>".into(),
        });
    }
    Ok(())
}

fn require_column(e: &EntityConfig, column: &str, rel: &str) -> Result<(), ConfigError> {
    if e.columns.iter().any(|c| c.name == column) {
        Ok(())
    } else {
        Err(ConfigError::MissingReference {
            kind: "column",
            id: format!("{}.{} (relationship {})", e.type_name, column, rel),
        })
    }
}

fn require_single_key(e: &EntityConfig, rel: &str) -> Result<(), ConfigError> {
    if e.columns.iter().filter(|c| c.primary_key).count() == 1 {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{}: {} must have a single-column primary key",
            rel, e.type_name
        )))
    }
}
