//! Relationship handlers: `<parent>/<rel>` and `<parent>/<rel>/<childId>`.

use super::request::{attributes, check_type, data_member};
use super::{ApiRequest, Ctx};
use crate::config::{Cardinality, RelationshipDescriptor};
use crate::error::ApiError;
use crate::response::{identifier_object, resource_object, ApiResponse};
use crate::store::Record;
use serde_json::{json, Map, Value};

/// The relationship a request addresses, with its URL parameter names.
pub struct Target<'a> {
    pub rel: &'a RelationshipDescriptor,
    pub parent_param: &'a str,
    pub child_param: &'a str,
}

impl Target<'_> {
    async fn parent(&self, ctx: &mut Ctx<'_>, req: &ApiRequest) -> Result<(String, Record), ApiError> {
        let id = req
            .path_param(self.parent_param)
            .ok_or_else(|| ApiError::validation("Invalid Parent Id"))?;
        let row = ctx
            .load(&self.rel.parent, id, || ApiError::validation("Invalid Parent Id"))
            .await?;
        let id = self.rel.parent.identifier_of(&row)?;
        Ok((id, row))
    }

    fn related_url(&self, ctx: &Ctx<'_>, parent_id: &str) -> String {
        ctx.links
            .related_url(&self.rel.parent.type_name, parent_id, &self.rel.name)
    }

    fn is_member(&self, members: &[Record], child: &Record) -> bool {
        let Ok(id) = self.rel.child.identifier_of(child) else {
            return false;
        };
        members
            .iter()
            .any(|m| self.rel.child.identifier_of(m).ok().as_deref() == Some(id.as_str()))
    }
}

pub async fn get(ctx: &mut Ctx<'_>, target: &Target<'_>, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
    let rel = target.rel;
    let (parent_id, parent) = target.parent(ctx, req).await?;
    let self_link = target.related_url(ctx, &parent_id);
    let members = ctx.uow.related(rel, &parent).await?;

    if let Some(child_id) = req.path_param(target.child_param) {
        let key = rel
            .child
            .key_of(child_id)
            .map_err(|_| ApiError::validation(format!("Invalid {}", target.child_param)))?;
        let child = match ctx.uow.get(&rel.child, &key).await? {
            Some(child) if target.is_member(&members, &child) => child,
            _ => {
                return Err(ApiError::NotFound(format!(
                    "{} {} is not in {}.{}",
                    rel.child.type_name, child_id, rel.parent.type_name, rel.name
                )))
            }
        };
        let obj = resource_object(&rel.child, &child, ctx.links)?;
        return Ok(ApiResponse::ok(json!({ "data": obj, "links": { "self": self_link } })));
    }

    if rel.cardinality == Cardinality::ToOne {
        let data = match members.first() {
            Some(child) => json!(resource_object(&rel.child, child, ctx.links)?),
            None => Value::Null,
        };
        return Ok(ApiResponse::ok(json!({ "data": data, "links": { "self": self_link } })));
    }

    let query = req.list_query()?;
    let count = members.len();
    let page = members
        .iter()
        .skip(query.offset as usize)
        .take(query.limit.map_or(usize::MAX, |n| n as usize));
    let data = if req.details_all() {
        page.map(|c| resource_object(&rel.child, c, ctx.links).map(|o| json!(o)))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        page.map(|c| identifier_object(&rel.child, c))
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(ApiResponse::ok(json!({
        "data": data,
        "links": { "self": self_link },
        "meta": { "count": count },
    })))
}

/// One `{type, id}` entry of a relationship payload.
fn child_ref<'v>(target: &Target<'_>, item: &'v Value) -> Result<&'v str, String> {
    let obj = item
        .as_object()
        .ok_or_else(|| "Invalid relationship item".to_string())?;
    if let Some(t) = obj.get("type").and_then(Value::as_str) {
        if t != target.rel.child.type_name {
            return Err(format!(
                "Invalid type '{}', expected '{}'",
                t, target.rel.child.type_name
            ));
        }
    }
    obj.get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Invalid {}", target.child_param))
}

/// Add children to the relationship. Children that fail to resolve are reported in
/// `meta.errors` without aborting the others.
pub async fn post(ctx: &mut Ctx<'_>, target: &Target<'_>, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
    let rel = target.rel;
    let (parent_id, parent) = target.parent(ctx, req).await?;
    let items = match data_member(req.json_body()?)? {
        Value::Array(items) => items,
        Value::Null if rel.cardinality == Cardinality::ToOne => {
            for current in ctx.uow.related(rel, &parent).await? {
                ctx.uow.unlink(rel, &parent, &current).await?;
            }
            return Ok(ApiResponse::created(
                json!({ "data": Value::Null, "links": { "self": target.related_url(ctx, &parent_id) } }),
                None,
            ));
        }
        obj @ Value::Object(_) => vec![obj],
        _ => return Err(ApiError::validation("Invalid data payload")),
    };
    if rel.cardinality == Cardinality::ToOne && items.len() > 1 {
        return Err(ApiError::validation(format!(
            "{}.{} holds a single object",
            rel.parent.type_name, rel.name
        )));
    }

    let mut members = ctx.uow.related(rel, &parent).await?;
    let mut linked = Vec::new();
    let mut errors = Vec::new();
    for item in &items {
        let child_id = match child_ref(target, item) {
            Ok(id) => id,
            Err(detail) => {
                errors.push(json!({ "detail": detail }));
                continue;
            }
        };
        let child = match rel.child.key_of(child_id) {
            Ok(key) => ctx.uow.get(&rel.child, &key).await?,
            Err(_) => None,
        };
        let Some(child) = child else {
            errors.push(json!({
                "detail": format!("Invalid {} id '{}'", rel.child.type_name, child_id)
            }));
            continue;
        };
        if !target.is_member(&members, &child) {
            if rel.cardinality == Cardinality::ToOne {
                for current in members.drain(..) {
                    ctx.uow.unlink(rel, &parent, &current).await?;
                }
            }
            ctx.uow.link(rel, &parent, &child).await?;
            members.push(child.clone());
        }
        linked.push(identifier_object(&rel.child, &child)?);
    }

    let mut meta = Map::new();
    meta.insert("errors".into(), Value::Array(errors));
    Ok(ApiResponse::created(
        json!({
            "data": linked,
            "links": { "self": target.related_url(ctx, &parent_id) },
            "meta": meta,
        }),
        None,
    ))
}

/// Upsert one child and link it: update the child if it exists, create it otherwise.
pub async fn patch(ctx: &mut Ctx<'_>, target: &Target<'_>, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
    let rel = target.rel;
    let child_entity = &rel.child;
    let (_, parent) = target.parent(ctx, req).await?;
    let data = data_member(req.json_body()?)?;
    let data = data
        .as_object()
        .ok_or_else(|| ApiError::validation("Invalid data object"))?;
    check_type(child_entity, data, false)?;
    let child_id = data
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::validation(format!("Invalid {}", target.child_param)))?;
    let key = child_entity
        .key_of(child_id)
        .map_err(|_| ApiError::validation(format!("Invalid {}", target.child_param)))?;
    let values = attributes(child_entity, data, false)?;

    let child = match ctx.uow.update(child_entity, &key, values.clone()).await? {
        Some(row) => row,
        None => {
            let mut values = values;
            values.extend(key.iter().cloned());
            ctx.uow.insert(child_entity, values).await?
        }
    };
    let members = ctx.uow.related(rel, &parent).await?;
    if !target.is_member(&members, &child) {
        if rel.cardinality == Cardinality::ToOne {
            for current in &members {
                ctx.uow.unlink(rel, &parent, current).await?;
            }
        }
        ctx.uow.link(rel, &parent, &child).await?;
    }
    let child = ctx.uow.get(child_entity, &key).await?.unwrap_or(child);
    let obj = resource_object(child_entity, &child, ctx.links)?;
    let location = obj.links.self_.clone();
    Ok(ApiResponse::created(
        json!({ "data": obj }),
        Some(location).filter(|l| !l.is_empty()),
    ))
}

/// Remove one child from the relationship. Unknown or unrelated children are a logged no-op.
pub async fn delete(ctx: &mut Ctx<'_>, target: &Target<'_>, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
    let rel = target.rel;
    let (parent_id, parent) = target.parent(ctx, req).await?;
    let child_id = req
        .path_param(target.child_param)
        .ok_or_else(|| ApiError::validation(format!("Invalid {}", target.child_param)))?;
    let key = rel
        .child
        .key_of(child_id)
        .map_err(|_| ApiError::validation(format!("Invalid {}", target.child_param)))?;

    let Some(child) = ctx.uow.get(&rel.child, &key).await? else {
        tracing::warn!(
            parent = %parent_id,
            child = %child_id,
            relationship = %rel.name,
            "child not found, nothing to delete"
        );
        return Ok(ApiResponse::no_content());
    };
    if !ctx.uow.unlink(rel, &parent, &child).await? {
        tracing::warn!(
            parent = %parent_id,
            child = %child_id,
            relationship = %rel.name,
            "child not in relationship, nothing to delete"
        );
    }
    Ok(ApiResponse::no_content())
}
