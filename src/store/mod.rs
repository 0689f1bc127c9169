//! Backing-store seam: a `Store` opens one `UnitOfWork` per request.
//!
//! Rows travel as JSON maps keyed by column name. Keys are `(column, value)` pairs in
//! declared primary-key order, already coerced to the column's kind.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::{Entity, RelationshipDescriptor};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

/// Primary-key values in declared column order.
pub type KeyValues = Vec<(String, Value)>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// `None` returns every row from `offset` on.
    pub limit: Option<u64>,
    pub offset: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Readiness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// One transaction. Dropping it without `commit` discards its changes.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn list(&mut self, entity: &Entity, query: ListQuery) -> Result<Vec<Record>, StoreError>;

    async fn count(&mut self, entity: &Entity) -> Result<u64, StoreError>;

    async fn get(&mut self, entity: &Entity, key: &[(String, Value)]) -> Result<Option<Record>, StoreError>;

    /// Insert a row. Omitted defaulted columns are filled by the store.
    async fn insert(&mut self, entity: &Entity, values: Record) -> Result<Record, StoreError>;

    /// Update non-key columns; `None` when no row has this key.
    async fn update(
        &mut self,
        entity: &Entity,
        key: &[(String, Value)],
        values: Record,
    ) -> Result<Option<Record>, StoreError>;

    /// `false` when no row had this key.
    async fn delete(&mut self, entity: &Entity, key: &[(String, Value)]) -> Result<bool, StoreError>;

    /// Children currently related to `parent`.
    async fn related(
        &mut self,
        rel: &RelationshipDescriptor,
        parent: &Record,
    ) -> Result<Vec<Record>, StoreError>;

    async fn link(
        &mut self,
        rel: &RelationshipDescriptor,
        parent: &Record,
        child: &Record,
    ) -> Result<(), StoreError>;

    /// `false` when the child was not related to the parent.
    async fn unlink(
        &mut self,
        rel: &RelationshipDescriptor,
        parent: &Record,
        child: &Record,
    ) -> Result<bool, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Value of the single primary-key column of `entity` in `record`.
pub(crate) fn single_key_value(entity: &Entity, record: &Record) -> Result<Value, StoreError> {
    let pk = entity.pk_columns.first().ok_or_else(|| StoreError::UnknownColumn {
        table: entity.table_name.clone(),
        column: "<primary key>".into(),
    })?;
    Ok(record.get(pk).cloned().unwrap_or(Value::Null))
}

/// Key pairs for a stored row.
pub(crate) fn key_of_record(entity: &Entity, record: &Record) -> KeyValues {
    entity
        .pk_columns
        .iter()
        .map(|c| (c.clone(), record.get(c).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// Reject columns the entity does not declare.
pub(crate) fn check_columns(entity: &Entity, values: &Record) -> Result<(), StoreError> {
    match values.keys().find(|k| entity.column(k).is_none()) {
        Some(unknown) => Err(StoreError::UnknownColumn {
            table: entity.table_name.clone(),
            column: unknown.clone(),
        }),
        None => Ok(()),
    }
}
