//! In-process store for tests and demos.
//!
//! A unit-of-work holds the store lock for its whole lifetime and edits a private copy of
//! the tables; `commit` writes the copy back, `rollback` or drop throws it away.
//! Units of work are therefore serialized.

use super::{check_columns, key_of_record, single_key_value, ListQuery, Record, Store, UnitOfWork};
use crate::config::{ColumnKind, Entity, Linkage, RelationshipDescriptor};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Record>>,
    /// Link tables: (parent key, child key) pairs.
    links: HashMap<String, Vec<(Value, Value)>>,
    sequences: HashMap<String, i64>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn table_key(schema: Option<&str>, table: &str) -> String {
    format!("{}.{}", schema.unwrap_or(""), table)
}

fn entity_key(entity: &Entity) -> String {
    table_key(entity.schema_name.as_deref(), &entity.table_name)
}

fn matches_key(record: &Record, key: &[(String, Value)]) -> bool {
    key.iter().all(|(c, v)| record.get(c) == Some(v))
}

impl MemoryUnitOfWork {
    fn rows(&self, entity: &Entity) -> &[Record] {
        self.working
            .rows
            .get(&entity_key(entity))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn rows_mut(&mut self, entity: &Entity) -> &mut Vec<Record> {
        self.working.rows.entry(entity_key(entity)).or_default()
    }

    fn row_mut(&mut self, entity: &Entity, key: &[(String, Value)]) -> Option<&mut Record> {
        self.rows_mut(entity).iter_mut().find(|r| matches_key(r, key))
    }

    fn next_sequence(&mut self, entity: &Entity, column: &str) -> i64 {
        let seq = self
            .working
            .sequences
            .entry(format!("{}.{}", entity_key(entity), column))
            .or_insert(0);
        *seq += 1;
        *seq
    }

    fn bump_sequence(&mut self, entity: &Entity, column: &str, seen: i64) {
        let seq = self
            .working
            .sequences
            .entry(format!("{}.{}", entity_key(entity), column))
            .or_insert(0);
        *seq = (*seq).max(seen);
    }

    /// Fill omitted columns the way a database default would.
    fn fill_defaults(&mut self, entity: &Entity, values: &mut Record) {
        for c in &entity.columns {
            if values.contains_key(&c.name) {
                if let (ColumnKind::Integer, true, Some(n)) =
                    (c.kind, c.has_default, values[&c.name].as_i64())
                {
                    self.bump_sequence(entity, &c.name, n);
                }
                continue;
            }
            let v = if !c.has_default {
                Value::Null
            } else {
                match c.kind {
                    ColumnKind::Integer => Value::from(self.next_sequence(entity, &c.name)),
                    ColumnKind::Uuid | ColumnKind::String => {
                        Value::String(uuid::Uuid::new_v4().to_string())
                    }
                    ColumnKind::Datetime => Value::String(chrono::Utc::now().to_rfc3339()),
                    _ => Value::Null,
                }
            };
            values.insert(c.name.clone(), v);
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn list(&mut self, entity: &Entity, query: ListQuery) -> Result<Vec<Record>, StoreError> {
        let rows = self.rows(entity).iter().skip(query.offset as usize);
        Ok(match query.limit {
            Some(n) => rows.take(n as usize).cloned().collect(),
            None => rows.cloned().collect(),
        })
    }

    async fn count(&mut self, entity: &Entity) -> Result<u64, StoreError> {
        Ok(self.rows(entity).len() as u64)
    }

    async fn get(&mut self, entity: &Entity, key: &[(String, Value)]) -> Result<Option<Record>, StoreError> {
        Ok(self.rows(entity).iter().find(|r| matches_key(r, key)).cloned())
    }

    async fn insert(&mut self, entity: &Entity, mut values: Record) -> Result<Record, StoreError> {
        check_columns(entity, &values)?;
        self.fill_defaults(entity, &mut values);
        let key = key_of_record(entity, &values);
        if let Some((col, _)) = key.iter().find(|(_, v)| v.is_null()) {
            return Err(StoreError::Conflict(format!(
                "null value in primary key column \"{}\"",
                col
            )));
        }
        if self.rows(entity).iter().any(|r| matches_key(r, &key)) {
            return Err(StoreError::Conflict(format!(
                "duplicate key value in \"{}\"",
                entity.table_name
            )));
        }
        self.rows_mut(entity).push(values.clone());
        Ok(values)
    }

    async fn update(
        &mut self,
        entity: &Entity,
        key: &[(String, Value)],
        values: Record,
    ) -> Result<Option<Record>, StoreError> {
        check_columns(entity, &values)?;
        let Some(row) = self.row_mut(entity, key) else {
            return Ok(None);
        };
        for (k, v) in values {
            if !entity.pk_columns.contains(&k) {
                row.insert(k, v);
            }
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&mut self, entity: &Entity, key: &[(String, Value)]) -> Result<bool, StoreError> {
        let rows = self.rows_mut(entity);
        let before = rows.len();
        rows.retain(|r| !matches_key(r, key));
        Ok(rows.len() != before)
    }

    async fn related(
        &mut self,
        rel: &RelationshipDescriptor,
        parent: &Record,
    ) -> Result<Vec<Record>, StoreError> {
        let children = self.rows(&rel.child);
        Ok(match &rel.linkage {
            Linkage::ChildColumn(fk) => {
                let pv = single_key_value(&rel.parent, parent)?;
                if pv.is_null() {
                    return Ok(Vec::new());
                }
                children
                    .iter()
                    .filter(|c| c.get(fk) == Some(&pv))
                    .cloned()
                    .collect()
            }
            Linkage::ParentColumn(fk) => {
                let target = parent.get(fk).cloned().unwrap_or(Value::Null);
                if target.is_null() {
                    return Ok(Vec::new());
                }
                let child_pk = &rel.child.pk_columns[0];
                children
                    .iter()
                    .filter(|c| c.get(child_pk) == Some(&target))
                    .cloned()
                    .collect()
            }
            Linkage::Association { table, .. } => {
                let pv = single_key_value(&rel.parent, parent)?;
                let linked: Vec<&Value> = self
                    .working
                    .links
                    .get(&table_key(rel.parent.schema_name.as_deref(), table))
                    .map(|pairs| pairs.iter().filter(|(p, _)| *p == pv).map(|(_, c)| c).collect())
                    .unwrap_or_default();
                let child_pk = &rel.child.pk_columns[0];
                children
                    .iter()
                    .filter(|c| c.get(child_pk).is_some_and(|v| linked.contains(&v)))
                    .cloned()
                    .collect()
            }
        })
    }

    async fn link(
        &mut self,
        rel: &RelationshipDescriptor,
        parent: &Record,
        child: &Record,
    ) -> Result<(), StoreError> {
        match &rel.linkage {
            Linkage::ChildColumn(fk) => {
                let pv = single_key_value(&rel.parent, parent)?;
                let key = key_of_record(&rel.child, child);
                if let Some(row) = self.row_mut(&rel.child, &key) {
                    row.insert(fk.clone(), pv);
                }
            }
            Linkage::ParentColumn(fk) => {
                let cv = single_key_value(&rel.child, child)?;
                let key = key_of_record(&rel.parent, parent);
                if let Some(row) = self.row_mut(&rel.parent, &key) {
                    row.insert(fk.clone(), cv);
                }
            }
            Linkage::Association { table, .. } => {
                let pair = (
                    single_key_value(&rel.parent, parent)?,
                    single_key_value(&rel.child, child)?,
                );
                let pairs = self
                    .working
                    .links
                    .entry(table_key(rel.parent.schema_name.as_deref(), table))
                    .or_default();
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
        }
        Ok(())
    }

    async fn unlink(
        &mut self,
        rel: &RelationshipDescriptor,
        parent: &Record,
        child: &Record,
    ) -> Result<bool, StoreError> {
        Ok(match &rel.linkage {
            Linkage::ChildColumn(fk) => {
                let pv = single_key_value(&rel.parent, parent)?;
                let key = key_of_record(&rel.child, child);
                match self.row_mut(&rel.child, &key) {
                    Some(row) if !pv.is_null() && row.get(fk) == Some(&pv) => {
                        row.insert(fk.clone(), Value::Null);
                        true
                    }
                    _ => false,
                }
            }
            Linkage::ParentColumn(fk) => {
                let cv = single_key_value(&rel.child, child)?;
                let key = key_of_record(&rel.parent, parent);
                match self.row_mut(&rel.parent, &key) {
                    Some(row) if !cv.is_null() && row.get(fk) == Some(&cv) => {
                        row.insert(fk.clone(), Value::Null);
                        true
                    }
                    _ => false,
                }
            }
            Linkage::Association { table, .. } => {
                let pair = (
                    single_key_value(&rel.parent, parent)?,
                    single_key_value(&rel.child, child)?,
                );
                match self
                    .working
                    .links
                    .get_mut(&table_key(rel.parent.schema_name.as_deref(), table))
                {
                    Some(pairs) => {
                        let before = pairs.len();
                        pairs.retain(|p| *p != pair);
                        pairs.len() != before
                    }
                    None => false,
                }
            }
        })
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        *self.guard = self.working.clone();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.working = (*self.guard).clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, Model, ModelConfig};
    use serde_json::json;

    fn model() -> Model {
        let config = ModelConfig::from_json_str(
            r#"{"entities":[
              {"type":"Author","table":"authors","id_strategy":"plain","columns":[
                  {"name":"id","kind":"integer","primary_key":true,"has_default":true},
                  {"name":"name"}],
               "relationships":[
                  {"name":"books","target":"Book","cardinality":"to_many","foreign_key":"author_id"},
                  {"name":"tags","target":"Tag","cardinality":"to_many",
                   "association":{"table":"author_tags","parent_column":"author_id","child_column":"tag_id"}}]},
              {"type":"Book","table":"books","id_strategy":"plain","columns":[
                  {"name":"id","kind":"integer","primary_key":true,"has_default":true},
                  {"name":"title"},
                  {"name":"author_id","kind":"integer"}],
               "relationships":[
                  {"name":"author","target":"Author","cardinality":"to_one","foreign_key":"author_id"}]},
              {"type":"Tag","table":"tags","id_strategy":"plain","columns":[
                  {"name":"id","kind":"integer","primary_key":true,"has_default":true}]}]}"#,
        )
        .unwrap();
        resolve(&config).unwrap()
    }

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn commit_persists_and_drop_discards() {
        let m = model();
        let author = m.entity("Author").unwrap();
        let store = MemoryStore::new();

        let mut uow = store.begin().await.unwrap();
        let row = uow.insert(author, rec(json!({"name": "Le Guin"}))).await.unwrap();
        assert_eq!(row["id"], json!(1));
        uow.commit().await.unwrap();
        drop(uow);

        let mut uow = store.begin().await.unwrap();
        uow.insert(author, rec(json!({"name": "Banks"}))).await.unwrap();
        drop(uow);

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.count(author).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_keys_conflict() {
        let m = model();
        let author = m.entity("Author").unwrap();
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert(author, rec(json!({"id": 5, "name": "a"}))).await.unwrap();
        let err = uow
            .insert(author, rec(json!({"id": 5, "name": "b"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        // explicit ids advance the sequence
        let next = uow.insert(author, rec(json!({"name": "c"}))).await.unwrap();
        assert_eq!(next["id"], json!(6));
    }

    #[tokio::test]
    async fn links_through_foreign_keys_and_link_tables() {
        let m = model();
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let author = uow
            .insert(m.entity("Author").unwrap(), rec(json!({"name": "a"})))
            .await
            .unwrap();
        let book = uow
            .insert(m.entity("Book").unwrap(), rec(json!({"title": "t"})))
            .await
            .unwrap();
        let tag = uow.insert(m.entity("Tag").unwrap(), Record::new()).await.unwrap();

        let books = m.relationship("Author", "books").unwrap();
        uow.link(&books, &author, &book).await.unwrap();
        assert_eq!(uow.related(&books, &author).await.unwrap().len(), 1);
        assert!(uow.unlink(&books, &author, &book).await.unwrap());
        assert!(!uow.unlink(&books, &author, &book).await.unwrap());

        let tags = m.relationship("Author", "tags").unwrap();
        uow.link(&tags, &author, &tag).await.unwrap();
        uow.link(&tags, &author, &tag).await.unwrap();
        assert_eq!(uow.related(&tags, &author).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn to_one_links_through_the_parent_row() {
        let m = model();
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let authors = m.entity("Author").unwrap();
        let a1 = uow.insert(authors, rec(json!({"name": "a"}))).await.unwrap();
        let a2 = uow.insert(authors, rec(json!({"name": "b"}))).await.unwrap();
        let book = uow
            .insert(m.entity("Book").unwrap(), rec(json!({"title": "t"})))
            .await
            .unwrap();

        let author = m.relationship("Book", "author").unwrap();
        assert!(uow.related(&author, &book).await.unwrap().is_empty());

        uow.link(&author, &book, &a1).await.unwrap();
        let key = vec![("id".to_string(), book["id"].clone())];
        let book = uow.get(&author.parent, &key).await.unwrap().unwrap();
        assert_eq!(book["author_id"], a1["id"]);
        assert_eq!(uow.related(&author, &book).await.unwrap(), vec![a1.clone()]);

        // only the current target is unlinked
        assert!(!uow.unlink(&author, &book, &a2).await.unwrap());
        assert!(uow.unlink(&author, &book, &a1).await.unwrap());
        let book = uow.get(&author.parent, &key).await.unwrap().unwrap();
        assert_eq!(book["author_id"], Value::Null);
    }

    #[tokio::test]
    async fn unknown_columns_are_rejected() {
        let m = model();
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let err = uow
            .insert(m.entity("Tag").unwrap(), rec(json!({"colour": "red"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }
}
