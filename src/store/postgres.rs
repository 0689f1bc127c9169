//! PostgreSQL store: one sqlx transaction per unit-of-work.

use super::{key_of_record, single_key_value, ListQuery, Record, Store, UnitOfWork};
use crate::config::{Entity, Linkage, RelationshipDescriptor};
use crate::error::StoreError;
use crate::sql::{self, text_param, AssociationRef, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(PgStore { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgUnitOfWork {
    /// `None` once committed or rolled back.
    tx: Option<Transaction<'static, Postgres>>,
}

fn closed() -> StoreError {
    StoreError::Unavailable("transaction already finished".into())
}

impl PgUnitOfWork {
    async fn fetch_all(&mut self, q: &QueryBuf) -> Result<Vec<Record>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let tx = self.tx.as_mut().ok_or_else(closed)?;
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(text_param(p));
        }
        let rows = query.fetch_all(&mut **tx).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn fetch_optional(&mut self, q: &QueryBuf) -> Result<Option<Record>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let tx = self.tx.as_mut().ok_or_else(closed)?;
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(text_param(p));
        }
        let row = query.fetch_optional(&mut **tx).await?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn execute(&mut self, q: &QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let tx = self.tx.as_mut().ok_or_else(closed)?;
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(text_param(p));
        }
        let done = query.execute(&mut **tx).await?;
        Ok(done.rows_affected())
    }
}

fn association<'a>(rel: &'a RelationshipDescriptor) -> Option<AssociationRef<'a>> {
    match &rel.linkage {
        Linkage::Association {
            table,
            parent_column,
            child_column,
        } => Some(AssociationRef {
            schema: rel.parent.schema_name.as_deref(),
            table,
            parent_column,
            child_column,
            parent_type: pk_type(&rel.parent),
            child_type: pk_type(&rel.child),
        }),
        _ => None,
    }
}

fn pk_type(entity: &Entity) -> &'static str {
    entity
        .single_pk()
        .map(|c| c.kind.pg_type())
        .unwrap_or("text")
}

/// Unique violations become conflicts; everything else stays a database error.
fn classify(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Db(e),
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn list(&mut self, entity: &Entity, query: ListQuery) -> Result<Vec<Record>, StoreError> {
        let q = sql::select_list(entity, query.limit, query.offset);
        self.fetch_all(&q).await
    }

    async fn count(&mut self, entity: &Entity) -> Result<u64, StoreError> {
        let q = sql::count(entity);
        tracing::debug!(sql = %q.sql, "query");
        let tx = self.tx.as_mut().ok_or_else(closed)?;
        let (n,): (i64,) = sqlx::query_as(&q.sql).fetch_one(&mut **tx).await?;
        Ok(n.max(0) as u64)
    }

    async fn get(&mut self, entity: &Entity, key: &[(String, Value)]) -> Result<Option<Record>, StoreError> {
        let q = sql::select_by_key(entity, key);
        self.fetch_optional(&q).await
    }

    async fn insert(&mut self, entity: &Entity, values: Record) -> Result<Record, StoreError> {
        super::check_columns(entity, &values)?;
        let q = sql::insert(entity, &values);
        match self.fetch_optional(&q).await {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err(StoreError::Db(sqlx::Error::RowNotFound)),
            Err(StoreError::Db(e)) => Err(classify(e)),
            Err(e) => Err(e),
        }
    }

    async fn update(
        &mut self,
        entity: &Entity,
        key: &[(String, Value)],
        values: Record,
    ) -> Result<Option<Record>, StoreError> {
        super::check_columns(entity, &values)?;
        let q = sql::update(entity, key, &values);
        self.fetch_optional(&q).await.map_err(|e| match e {
            StoreError::Db(e) => classify(e),
            other => other,
        })
    }

    async fn delete(&mut self, entity: &Entity, key: &[(String, Value)]) -> Result<bool, StoreError> {
        let q = sql::delete(entity, key);
        Ok(self.fetch_optional(&q).await?.is_some())
    }

    async fn related(
        &mut self,
        rel: &RelationshipDescriptor,
        parent: &Record,
    ) -> Result<Vec<Record>, StoreError> {
        match &rel.linkage {
            Linkage::ChildColumn(fk) => {
                let pv = single_key_value(&rel.parent, parent)?;
                if pv.is_null() {
                    return Ok(Vec::new());
                }
                self.fetch_all(&sql::select_where(&rel.child, fk, &pv)).await
            }
            Linkage::ParentColumn(fk) => {
                let target = parent.get(fk).cloned().unwrap_or(Value::Null);
                if target.is_null() {
                    return Ok(Vec::new());
                }
                let child_pk = &rel.child.pk_columns[0];
                self.fetch_all(&sql::select_where(&rel.child, child_pk, &target))
                    .await
            }
            Linkage::Association { .. } => {
                let pv = single_key_value(&rel.parent, parent)?;
                let q = match association(rel) {
                    Some(assoc) => sql::select_associated(&rel.child, &assoc, &pv),
                    None => return Ok(Vec::new()),
                };
                self.fetch_all(&q).await
            }
        }
    }

    async fn link(
        &mut self,
        rel: &RelationshipDescriptor,
        parent: &Record,
        child: &Record,
    ) -> Result<(), StoreError> {
        let q = match &rel.linkage {
            Linkage::ChildColumn(fk) => {
                let pv = single_key_value(&rel.parent, parent)?;
                sql::set_column(&rel.child, &key_of_record(&rel.child, child), fk, &pv)
            }
            Linkage::ParentColumn(fk) => {
                let cv = single_key_value(&rel.child, child)?;
                sql::set_column(&rel.parent, &key_of_record(&rel.parent, parent), fk, &cv)
            }
            Linkage::Association { .. } => {
                let pv = single_key_value(&rel.parent, parent)?;
                let cv = single_key_value(&rel.child, child)?;
                match association(rel) {
                    Some(assoc) => sql::insert_link(&assoc, &pv, &cv),
                    None => return Ok(()),
                }
            }
        };
        self.execute(&q).await?;
        Ok(())
    }

    async fn unlink(
        &mut self,
        rel: &RelationshipDescriptor,
        parent: &Record,
        child: &Record,
    ) -> Result<bool, StoreError> {
        match &rel.linkage {
            Linkage::ChildColumn(fk) => {
                let pv = single_key_value(&rel.parent, parent)?;
                if pv.is_null() || child.get(fk) != Some(&pv) {
                    return Ok(false);
                }
                let q = sql::set_column(&rel.child, &key_of_record(&rel.child, child), fk, &Value::Null);
                Ok(self.execute(&q).await? > 0)
            }
            Linkage::ParentColumn(fk) => {
                let cv = single_key_value(&rel.child, child)?;
                if cv.is_null() || parent.get(fk) != Some(&cv) {
                    return Ok(false);
                }
                let q = sql::set_column(&rel.parent, &key_of_record(&rel.parent, parent), fk, &Value::Null);
                Ok(self.execute(&q).await? > 0)
            }
            Linkage::Association { .. } => {
                let pv = single_key_value(&rel.parent, parent)?;
                let cv = single_key_value(&rel.child, child)?;
                let q = match association(rel) {
                    Some(assoc) => sql::delete_link(&assoc, &pv, &cv),
                    None => return Ok(false),
                };
                Ok(self.execute(&q).await? > 0)
            }
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or_else(closed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => {
                tx.rollback().await?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn row_to_record(row: &PgRow) -> Record {
    use sqlx::{Column, Row};
    let mut map = Record::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

/// Decode one cell by trying the column kinds the model can declare.
fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
