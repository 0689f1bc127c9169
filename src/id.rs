//! Resource identifiers derived from primary-key values.
//!
//! An identifier is the entity's primary-key values, in declared column order, joined by
//! the strategy's delimiter. Strategies decide how fresh identifiers are generated and
//! which component shapes are accepted; all of them must round-trip
//! `identifier_of(pks_from(id)) == id` for canonical ids.

use crate::error::ApiError;
use crate::store::Record;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default delimiter between primary-key components.
pub const DEFAULT_DELIMITER: &str = ",";

/// Primary-key column/value pairs in declared column order.
pub type PrimaryKey = Vec<(String, String)>;

pub trait IdStrategy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// A fresh identifier component.
    fn generate(&self) -> String;

    /// Check one component and return its canonical form.
    fn validate_component(&self, component: &str) -> Result<String, ApiError>;

    fn delimiter(&self) -> &str {
        DEFAULT_DELIMITER
    }

    /// Validate a full identifier and return its canonical form.
    fn validate(&self, candidate: &str) -> Result<String, ApiError> {
        if candidate.is_empty() {
            return Err(ApiError::validation("Invalid ID"));
        }
        let mut parts = Vec::new();
        for component in candidate.split(self.delimiter()) {
            if component.is_empty() {
                return Err(ApiError::validation("Invalid ID"));
            }
            parts.push(self.validate_component(component)?);
        }
        Ok(parts.join(self.delimiter()))
    }

    /// Join the record's primary-key values in declared order.
    fn identifier_of(&self, pk_columns: &[String], record: &Record) -> Result<String, ApiError> {
        let mut values = Vec::with_capacity(pk_columns.len());
        for pk in pk_columns {
            let v = match record.get(pk) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => {
                    return Err(ApiError::Internal(format!(
                        "missing primary key value for '{}'",
                        pk
                    )))
                }
            };
            values.push(v);
        }
        Ok(values.join(self.delimiter()))
    }

    /// Split an identifier and zip it against the declared primary-key columns.
    fn pks_from(&self, pk_columns: &[String], identifier: &str) -> Result<PrimaryKey, ApiError> {
        let values: Vec<&str> = identifier.split(self.delimiter()).collect();
        if values.len() != pk_columns.len() {
            return Err(ApiError::validation(format!(
                "Invalid ID: expected {} component(s), got {}",
                pk_columns.len(),
                values.len()
            )));
        }
        Ok(pk_columns
            .iter()
            .cloned()
            .zip(values.into_iter().map(str::to_string))
            .collect())
    }
}

/// Random version-4 UUIDs. Collision resistance is that of random UUIDs, nothing stronger.
#[derive(Debug, Default, Clone)]
pub struct UuidIds;

impl IdStrategy for UuidIds {
    fn name(&self) -> &'static str {
        "uuid"
    }

    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn validate_component(&self, component: &str) -> Result<String, ApiError> {
        let u = uuid::Uuid::parse_str(component).map_err(|_| ApiError::validation("Invalid ID"))?;
        if u.get_version_num() != 4 {
            return Err(ApiError::validation("Invalid ID"));
        }
        Ok(u.hyphenated().to_string())
    }
}

/// Hex SHA-256 of the current time and a process-local counter.
///
/// Not cryptographically meaningful; it only demonstrates a non-UUID id shape.
#[derive(Debug, Default)]
pub struct Sha256Ids {
    counter: AtomicU64,
}

impl IdStrategy for Sha256Ids {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn generate(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.f").to_string();
        let mut hasher = Sha256::new();
        hasher.update(now.as_bytes());
        hasher.update(n.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn validate_component(&self, component: &str) -> Result<String, ApiError> {
        if component.len() != 64 || !component.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ApiError::validation("Invalid ID"));
        }
        Ok(component.to_ascii_lowercase())
    }
}

/// Any non-empty component is accepted as-is. For integer or natural keys.
#[derive(Debug, Default, Clone)]
pub struct PlainIds;

impl IdStrategy for PlainIds {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn validate_component(&self, component: &str) -> Result<String, ApiError> {
        Ok(component.to_string())
    }
}

/// Strategy by configured name.
pub fn strategy_by_name(name: &str) -> Option<Arc<dyn IdStrategy>> {
    match name {
        "uuid" => Some(Arc::new(UuidIds)),
        "sha256" => Some(Arc::new(Sha256Ids::default())),
        "plain" => Some(Arc::new(PlainIds)),
        _ => None,
    }
}
