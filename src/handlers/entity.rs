//! Collection and instance handlers: list, read, create, update, delete.

use super::request::{attributes, check_type, data_member};
use super::{ApiRequest, Ctx};
use crate::config::Entity;
use crate::error::ApiError;
use crate::response::{identifier_object, resource_object, ApiResponse};
use serde_json::{json, Value};

fn invalid_id(id_param: &str) -> impl FnOnce() -> ApiError + '_ {
    move || ApiError::validation(format!("Invalid {}", id_param))
}

pub async fn get(
    ctx: &mut Ctx<'_>,
    entity: &Entity,
    id_param: &str,
    req: &ApiRequest,
) -> Result<ApiResponse, ApiError> {
    if let Some(id) = req.path_param(id_param) {
        let row = ctx.load(entity, id, invalid_id(id_param)).await?;
        let obj = resource_object(entity, &row, ctx.links)?;
        let self_link = obj.links.self_.clone();
        return Ok(ApiResponse::ok(json!({
            "data": obj,
            "links": { "self": self_link },
        })));
    }

    let query = req.list_query()?;
    let rows = ctx.uow.list(entity, query).await?;
    let count = ctx.uow.count(entity).await?;
    let data = if req.details_all() {
        rows.iter()
            .map(|r| resource_object(entity, r, ctx.links).map(|o| json!(o)))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        rows.iter()
            .map(|r| identifier_object(entity, r))
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(ApiResponse::ok(json!({
        "data": data,
        "links": { "self": ctx.links.collection_url(&entity.type_name) },
        "meta": { "count": count },
    })))
}

/// Create an object, or update it when the URL carries an id.
pub async fn post(
    ctx: &mut Ctx<'_>,
    entity: &Entity,
    id_param: &str,
    req: &ApiRequest,
) -> Result<ApiResponse, ApiError> {
    if req.path_param(id_param).is_some() {
        return patch(ctx, entity, id_param, req).await;
    }
    let data = data_member(req.json_body()?)?;
    let data = data
        .as_object()
        .ok_or_else(|| ApiError::validation("Invalid data object"))?;
    check_type(entity, data, true)?;
    let mut values = attributes(entity, data, entity.pk_columns.len() > 1)?;

    match data.get("id") {
        Some(Value::String(id)) => {
            let key = entity.key_of(id)?;
            values.extend(key);
        }
        Some(Value::Null) | None => {
            if let Some(pk) = entity.single_pk().filter(|c| !c.has_default) {
                let generated = entity.id_strategy.generate();
                values.insert(pk.name.clone(), pk.coerce(&generated));
            }
        }
        Some(_) => return Err(ApiError::validation("Invalid ID")),
    }

    let row = ctx.uow.insert(entity, values).await?;
    let obj = resource_object(entity, &row, ctx.links)?;
    let location = obj.links.self_.clone();
    tracing::debug!(entity = %entity.type_name, id = %obj.id, "created");
    Ok(ApiResponse::created(
        json!({ "data": obj, "links": { "self": location } }),
        Some(location),
    ))
}

/// Update attributes of an existing object. Responds 201 with the updated object.
pub async fn patch(
    ctx: &mut Ctx<'_>,
    entity: &Entity,
    id_param: &str,
    req: &ApiRequest,
) -> Result<ApiResponse, ApiError> {
    let id = req
        .path_param(id_param)
        .ok_or_else(invalid_id(id_param))?;
    let data = data_member(req.json_body()?)?;
    let data = data
        .as_object()
        .ok_or_else(|| ApiError::validation("Invalid data object"))?;
    check_type(entity, data, false)?;

    let path_id = entity.id_strategy.validate(id).map_err(|_| invalid_id(id_param)())?;
    match data.get("id").and_then(Value::as_str) {
        Some(body_id) if entity.id_strategy.validate(body_id).ok().as_deref() == Some(path_id.as_str()) => {}
        _ => return Err(ApiError::validation("Invalid ID: body id does not match URL")),
    }

    let key = entity.key_of(&path_id)?;
    let values = attributes(entity, data, false)?;
    let row = ctx
        .uow
        .update(entity, &key, values)
        .await?
        .ok_or_else(invalid_id(id_param))?;
    let obj = resource_object(entity, &row, ctx.links)?;
    let location = obj.links.self_.clone();
    Ok(ApiResponse::created(
        json!({ "data": obj, "links": { "self": location } }),
        Some(location),
    ))
}

pub async fn delete(
    ctx: &mut Ctx<'_>,
    entity: &Entity,
    id_param: &str,
    req: &ApiRequest,
) -> Result<ApiResponse, ApiError> {
    let id = req
        .path_param(id_param)
        .ok_or_else(|| ApiError::NotFound(format!("Invalid {}", id_param)))?;
    let key = entity.key_of(id).map_err(|_| invalid_id(id_param)())?;
    if !ctx.uow.delete(entity, &key).await? {
        return Err(ApiError::NotFound(format!(
            "{} {} not found",
            entity.type_name, id
        )));
    }
    Ok(ApiResponse::no_content())
}
