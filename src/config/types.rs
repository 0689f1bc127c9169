//! Raw model config types: the mapped entity definitions as they arrive in JSON.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    String,
    Integer,
    Number,
    Boolean,
    Uuid,
    Datetime,
    Json,
}

impl ColumnKind {
    /// OpenAPI primitive type name.
    pub fn doc_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Number => "number",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Json => "object",
            ColumnKind::String | ColumnKind::Uuid | ColumnKind::Datetime => "string",
        }
    }

    /// PostgreSQL type used for parameter casts.
    pub fn pg_type(&self) -> &'static str {
        match self {
            ColumnKind::String => "text",
            ColumnKind::Integer => "bigint",
            ColumnKind::Number => "double precision",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Uuid => "uuid",
            ColumnKind::Datetime => "timestamptz",
            ColumnKind::Json => "jsonb",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: ColumnKind,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default = "default_true")]
    pub writable: bool,
    /// Whether the store fills the column when omitted (serial, gen_random_uuid(), NOW()).
    #[serde(default)]
    pub has_default: bool,
    /// Sample value used in generated documentation.
    #[serde(default)]
    pub example: Option<serde_json::Value>,
}

fn default_kind() -> ColumnKind {
    ColumnKind::String
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssociationConfig {
    pub table: String,
    pub parent_column: String,
    pub child_column: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub name: String,
    /// Type name of the related entity.
    pub target: String,
    pub cardinality: Cardinality,
    /// to_many: column on the target holding our id. to_one: our column holding the target id.
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub association: Option<AssociationConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Exposed JSON:API type, e.g. "Widget".
    #[serde(rename = "type")]
    pub type_name: String,
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// Structured (YAML) doc comment.
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default = "default_id_strategy")]
    pub id_strategy: String,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
}

fn default_id_strategy() -> String {
    "uuid".into()
}

/// All entity definitions for one API.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub entities: Vec<EntityConfig>,
}

impl ModelConfig {
    pub fn from_json_str(s: &str) -> Result<Self, crate::error::ConfigError> {
        serde_json::from_str(s).map_err(|e| crate::error::ConfigError::Load(e.to_string()))
    }
}
