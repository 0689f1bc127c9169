//! Resolved entity model: config validated and flattened for runtime use.
//! Built once at startup; exposure and handlers only ever read it.

use crate::config::{Cardinality, ColumnKind};
use crate::error::{ApiError, ConfigError};
use crate::id::{IdStrategy, PrimaryKey};
use crate::store::{Record, UnitOfWork};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub primary_key: bool,
    pub nullable: bool,
    pub writable: bool,
    pub has_default: bool,
    pub example: Option<Value>,
}

impl Column {
    /// Example value for documentation: configured example, else a kind-specific sample.
    pub fn sample_value(&self) -> Value {
        if let Some(v) = &self.example {
            return v.clone();
        }
        match self.kind {
            ColumnKind::String => Value::String(String::new()),
            ColumnKind::Integer => Value::from(0),
            ColumnKind::Number => Value::from(0.0),
            ColumnKind::Boolean => Value::Bool(false),
            ColumnKind::Uuid => Value::String(uuid::Uuid::nil().to_string()),
            ColumnKind::Datetime => Value::String("1970-01-01T00:00:00Z".into()),
            ColumnKind::Json => Value::Object(Map::new()),
        }
    }

    /// Convert a textual key component into the column's JSON representation.
    pub fn coerce(&self, raw: &str) -> Value {
        match self.kind {
            ColumnKind::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            _ => Value::String(raw.to_string()),
        }
    }
}

/// How two entities are linked in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Linkage {
    /// Column on the child holding the parent's key (one-to-many).
    ChildColumn(String),
    /// Column on the parent holding the child's key (many-to-one).
    ParentColumn(String),
    /// Link table (many-to-many).
    Association {
        table: String,
        parent_column: String,
        child_column: String,
    },
}

#[derive(Clone, Debug)]
pub struct Relationship {
    pub name: String,
    /// Type name of the related entity.
    pub target: String,
    pub cardinality: Cardinality,
    pub linkage: Linkage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodBinding {
    /// Invoked on the entity type: `<prefix>/<table>/<method>`.
    Class,
    /// Invoked on one instance: `<prefix>/<table>/<id>/<method>`.
    Instance,
}

/// Arguments handed to a custom method.
pub struct MethodCall<'a> {
    pub entity: &'a Entity,
    /// Resolved instance for instance-bound calls.
    pub instance: Option<Record>,
    /// Keyword arguments from `meta.args` or the query string.
    pub args: Map<String, Value>,
    pub uow: &'a mut dyn UnitOfWork,
}

#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn invoke(&self, call: MethodCall<'_>) -> Result<Value, ApiError>;
}

/// Custom business method exposed next to an entity.
#[derive(Clone)]
pub struct ApiMethod {
    pub name: String,
    pub binding: MethodBinding,
    /// Only public (documented) methods are exposed and invocable.
    pub public: bool,
    /// Structured (YAML) doc comment.
    pub doc: Option<String>,
    pub handler: Arc<dyn MethodHandler>,
}

impl ApiMethod {
    /// A public method with the given binding.
    pub fn new(
        name: impl Into<String>,
        binding: MethodBinding,
        handler: Arc<dyn MethodHandler>,
    ) -> Self {
        ApiMethod {
            name: name.into(),
            binding,
            public: true,
            doc: None,
            handler,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }
}

impl std::fmt::Debug for ApiMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMethod")
            .field("name", &self.name)
            .field("binding", &self.binding)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct Entity {
    pub type_name: String,
    pub table_name: String,
    pub schema_name: Option<String>,
    pub doc: Option<String>,
    /// Declared column order.
    pub columns: Vec<Column>,
    /// Primary-key column names in declared order.
    pub pk_columns: Vec<String>,
    pub relationships: Vec<Relationship>,
    pub methods: Vec<ApiMethod>,
    pub id_strategy: Arc<dyn IdStrategy>,
}

impl Entity {
    /// URL parameter name for this entity's id, e.g. `WidgetId`.
    pub fn object_id(&self, suffix: &str) -> String {
        format!("{}{}", self.type_name, suffix)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Non-key columns, in declared order.
    pub fn attribute_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    pub fn writable_columns(&self) -> impl Iterator<Item = &Column> {
        self.attribute_columns().filter(|c| c.writable)
    }

    pub fn single_pk(&self) -> Option<&Column> {
        match self.pk_columns.as_slice() {
            [only] => self.column(only),
            _ => None,
        }
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&ApiMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn public_methods(&self) -> impl Iterator<Item = &ApiMethod> {
        self.methods.iter().filter(|m| m.public)
    }

    /// Attribute map (non-key columns) of a stored row.
    pub fn attributes_of(&self, record: &Record) -> Map<String, Value> {
        self.attribute_columns()
            .map(|c| {
                (
                    c.name.clone(),
                    record.get(&c.name).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }

    pub fn identifier_of(&self, record: &Record) -> Result<String, ApiError> {
        self.id_strategy.identifier_of(&self.pk_columns, record)
    }

    /// Validate an identifier and split it into typed key values.
    pub fn key_of(&self, identifier: &str) -> Result<Vec<(String, Value)>, ApiError> {
        let canonical = self.id_strategy.validate(identifier)?;
        let pks: PrimaryKey = self.id_strategy.pks_from(&self.pk_columns, &canonical)?;
        Ok(pks
            .into_iter()
            .map(|(col, raw)| {
                let v = self
                    .column(&col)
                    .map(|c| c.coerce(&raw))
                    .unwrap_or(Value::String(raw));
                (col, v)
            })
            .collect())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Model {
    pub entities: Vec<Arc<Entity>>,
    pub entity_by_type: HashMap<String, Arc<Entity>>,
}

impl Model {
    pub fn entity(&self, type_name: &str) -> Option<&Arc<Entity>> {
        self.entity_by_type.get(type_name)
    }

    /// Attach a custom method to an entity. Call before handing the model to the exposure engine.
    pub fn with_method(mut self, type_name: &str, method: ApiMethod) -> Result<Self, ConfigError> {
        let pos = self
            .entities
            .iter()
            .position(|e| e.type_name == type_name)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "entity type",
                id: type_name.to_string(),
            })?;
        if self.entities[pos].method(&method.name).is_some() {
            return Err(ConfigError::Duplicate {
                kind: "method",
                name: format!("{}.{}", type_name, method.name),
            });
        }
        Arc::make_mut(&mut self.entities[pos]).methods.push(method);
        self.entity_by_type
            .insert(type_name.to_string(), self.entities[pos].clone());
        Ok(self)
    }
}

/// A relationship resolved against both of its entities.
#[derive(Clone, Debug)]
pub struct RelationshipDescriptor {
    pub name: String,
    pub parent: Arc<Entity>,
    pub child: Arc<Entity>,
    pub cardinality: Cardinality,
    pub linkage: Linkage,
}

impl RelationshipDescriptor {
    /// Parent and child are the same entity (e.g. a tree of nodes).
    pub fn self_referencing(&self) -> bool {
        self.parent.type_name == self.child.type_name
    }
}

impl Model {
    pub fn relationship(&self, parent_type: &str, rel: &str) -> Option<RelationshipDescriptor> {
        let parent = self.entity(parent_type)?;
        let r = parent.relationship(rel)?;
        let child = self.entity(&r.target)?;
        Some(RelationshipDescriptor {
            name: r.name.clone(),
            parent: parent.clone(),
            child: child.clone(),
            cardinality: r.cardinality,
            linkage: r.linkage.clone(),
        })
    }
}
