//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a resolved entity.

use crate::config::Entity;
use crate::store::Record;
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from the model).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Schema-qualified table name; unqualified when no schema is configured.
fn qualified_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(s) => format!("{}.{}", quoted(s), quoted(table)),
        None => quoted(table),
    }
}

fn entity_table(entity: &Entity) -> String {
    qualified_table(entity.schema_name.as_deref(), &entity.table_name)
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a value and return its cast placeholder, e.g. `$3::uuid`.
    fn placeholder(&mut self, v: Value, pg_type: &str) -> String {
        self.params.push(v);
        format!("${}::{}", self.params.len(), pg_type)
    }
}

fn pg_type_of(entity: &Entity, column: &str) -> &'static str {
    entity
        .column(column)
        .map(|c| c.kind.pg_type())
        .unwrap_or("text")
}

fn select_column_list(entity: &Entity) -> String {
    entity
        .columns
        .iter()
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn order_by_key(entity: &Entity) -> String {
    entity
        .pk_columns
        .iter()
        .map(|c| quoted(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_predicate(q: &mut QueryBuf, entity: &Entity, key: &[(String, Value)]) -> String {
    key.iter()
        .map(|(col, v)| {
            let ph = q.placeholder(v.clone(), pg_type_of(entity, col));
            format!("{} = {}", quoted(col), ph)
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// SELECT page ordered by primary key.
pub fn select_list(entity: &Entity, limit: Option<u64>, offset: u64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = if offset > 0 {
        format!(" OFFSET {}", offset)
    } else {
        String::new()
    };
    q.sql = format!(
        "SELECT {} FROM {} ORDER BY {}{}{}",
        select_column_list(entity),
        entity_table(entity),
        order_by_key(entity),
        limit_clause,
        offset_clause
    );
    q
}

pub fn count(entity: &Entity) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("SELECT COUNT(*) FROM {}", entity_table(entity));
    q
}

/// SELECT one row by (possibly composite) primary key.
pub fn select_by_key(entity: &Entity, key: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pred = key_predicate(&mut q, entity, key);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_column_list(entity),
        entity_table(entity),
        pred
    );
    q
}

/// SELECT rows where one column equals a value, ordered by primary key.
pub fn select_where(entity: &Entity, column: &str, value: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(value.clone(), pg_type_of(entity, column));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {} ORDER BY {}",
        select_column_list(entity),
        entity_table(entity),
        quoted(column),
        ph,
        order_by_key(entity)
    );
    q
}

/// Link-table endpoints: table plus the parent and child columns.
pub struct AssociationRef<'a> {
    pub schema: Option<&'a str>,
    pub table: &'a str,
    pub parent_column: &'a str,
    pub child_column: &'a str,
    pub parent_type: &'static str,
    pub child_type: &'static str,
}

/// SELECT children linked to one parent through a link table.
pub fn select_associated(child: &Entity, assoc: &AssociationRef<'_>, parent_key: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(parent_key.clone(), assoc.parent_type);
    let child_pk = &child.pk_columns[0];
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN (SELECT {} FROM {} WHERE {} = {}) ORDER BY {}",
        select_column_list(child),
        entity_table(child),
        quoted(child_pk),
        quoted(assoc.child_column),
        qualified_table(assoc.schema, assoc.table),
        quoted(assoc.parent_column),
        ph,
        order_by_key(child)
    );
    q
}

/// INSERT the given columns; omitted columns take their database default.
pub fn insert(entity: &Entity, values: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        let Some(v) = values.get(&c.name) else { continue };
        placeholders.push(q.placeholder(v.clone(), c.kind.pg_type()));
        cols.push(quoted(&c.name));
    }
    let returning = select_column_list(entity);
    q.sql = if cols.is_empty() {
        format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING {}",
            entity_table(entity),
            returning
        )
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            entity_table(entity),
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE non-key columns present in `values`. Falls back to a plain SELECT when nothing is set.
pub fn update(entity: &Entity, key: &[(String, Value)], values: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in entity.attribute_columns() {
        let Some(v) = values.get(&c.name) else { continue };
        let ph = q.placeholder(v.clone(), c.kind.pg_type());
        sets.push(format!("{} = {}", quoted(&c.name), ph));
    }
    if sets.is_empty() {
        return select_by_key(entity, key);
    }
    let pred = key_predicate(&mut q, entity, key);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING {}",
        entity_table(entity),
        sets.join(", "),
        pred,
        select_column_list(entity)
    );
    q
}

pub fn delete(entity: &Entity, key: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pred = key_predicate(&mut q, entity, key);
    q.sql = format!(
        "DELETE FROM {} WHERE {} RETURNING {}",
        entity_table(entity),
        pred,
        order_by_key(entity)
    );
    q
}

/// Set one column (possibly to NULL) on the row with the given key.
pub fn set_column(entity: &Entity, key: &[(String, Value)], column: &str, value: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(value.clone(), pg_type_of(entity, column));
    let pred = key_predicate(&mut q, entity, key);
    q.sql = format!(
        "UPDATE {} SET {} = {} WHERE {}",
        entity_table(entity),
        quoted(column),
        ph,
        pred
    );
    q
}

/// Insert a link row unless it already exists.
pub fn insert_link(assoc: &AssociationRef<'_>, parent_key: &Value, child_key: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let p = q.placeholder(parent_key.clone(), assoc.parent_type);
    let c = q.placeholder(child_key.clone(), assoc.child_type);
    let table = qualified_table(assoc.schema, assoc.table);
    q.sql = format!(
        "INSERT INTO {t} ({pc}, {cc}) SELECT {p}, {c} WHERE NOT EXISTS (SELECT 1 FROM {t} WHERE {pc} = {p} AND {cc} = {c})",
        t = table,
        pc = quoted(assoc.parent_column),
        cc = quoted(assoc.child_column),
        p = p,
        c = c
    );
    q
}

pub fn delete_link(assoc: &AssociationRef<'_>, parent_key: &Value, child_key: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let p = q.placeholder(parent_key.clone(), assoc.parent_type);
    let c = q.placeholder(child_key.clone(), assoc.child_type);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} AND {} = {}",
        qualified_table(assoc.schema, assoc.table),
        quoted(assoc.parent_column),
        p,
        quoted(assoc.child_column),
        c
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ModelConfig};
    use serde_json::json;
    use std::sync::Arc;

    fn widget() -> Arc<Entity> {
        let config = ModelConfig::from_json_str(
            r#"{"entities":[{"type":"Widget","table":"widgets","schema":"app","columns":[
                {"name":"id","kind":"integer","primary_key":true,"has_default":true},
                {"name":"name"},
                {"name":"weight","kind":"number"}]}]}"#,
        )
        .unwrap();
        resolve(&config).unwrap().entity("Widget").unwrap().clone()
    }

    #[test]
    fn select_by_key_casts_parameters() {
        let q = select_by_key(&widget(), &[("id".into(), json!(4))]);
        assert_eq!(
            q.sql,
            r#"SELECT "id", "name", "weight" FROM "app"."widgets" WHERE "id" = $1::bigint"#
        );
        assert_eq!(q.params, vec![json!(4)]);
    }

    #[test]
    fn insert_skips_omitted_columns() {
        let mut values = Record::new();
        values.insert("name".into(), json!("bolt"));
        let q = insert(&widget(), &values);
        assert_eq!(
            q.sql,
            r#"INSERT INTO "app"."widgets" ("name") VALUES ($1::text) RETURNING "id", "name", "weight""#
        );
    }

    #[test]
    fn update_without_attributes_is_a_select() {
        let q = update(&widget(), &[("id".into(), json!(1))], &Record::new());
        assert!(q.sql.starts_with("SELECT "));
    }

    #[test]
    fn set_column_binds_null_with_column_type() {
        let q = set_column(&widget(), &[("id".into(), json!(7))], "weight", &Value::Null);
        assert_eq!(
            q.sql,
            r#"UPDATE "app"."widgets" SET "weight" = $1::double precision WHERE "id" = $2::bigint"#
        );
        assert_eq!(q.params, vec![Value::Null, json!(7)]);
    }

    #[test]
    fn list_pages_by_primary_key() {
        let q = select_list(&widget(), Some(10), 20);
        assert!(q.sql.ends_with(r#"ORDER BY "id" LIMIT 10 OFFSET 20"#));
        assert!(q.params.is_empty());
    }
}
