//! Custom method invocation.

use super::{ApiRequest, Ctx};
use crate::config::{Entity, MethodBinding, MethodCall};
use crate::error::ApiError;
use crate::resource::Verb;
use crate::response::ApiResponse;
use serde_json::{json, Map, Value};

/// Keyword arguments: `meta.args` of a POST body, else the query string.
fn call_args(verb: Verb, req: &ApiRequest) -> Result<Map<String, Value>, ApiError> {
    if verb != Verb::Post {
        return Ok(req.query_args());
    }
    let Some(body) = req.json_body()? else {
        return Ok(req.query_args());
    };
    match body.pointer("/meta/args") {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(args)) => Ok(args.clone()),
        Some(_) => Err(ApiError::validation("Invalid meta.args: expected an object")),
    }
}

pub async fn call(
    ctx: &mut Ctx<'_>,
    entity: &Entity,
    name: &str,
    id_param: &str,
    verb: Verb,
    req: &ApiRequest,
) -> Result<ApiResponse, ApiError> {
    let method = entity
        .method(name)
        .ok_or_else(|| ApiError::validation(format!("Invalid method \"{}\"", name)))?;
    if !method.public {
        return Err(ApiError::validation("Method is not public"));
    }
    let args = call_args(verb, req)?;

    let id = req
        .path_param(id_param)
        .or_else(|| req.query_param("id").filter(|s| !s.is_empty()));
    let instance = match id {
        Some(id) => Some(ctx.load(entity, id, || ApiError::validation("Invalid ID")).await?),
        None if method.binding == MethodBinding::Instance => {
            return Err(ApiError::validation("Invalid ID"));
        }
        None => None,
    };

    tracing::debug!(entity = %entity.type_name, method = %name, "invoking method");
    let result = method
        .handler
        .invoke(MethodCall {
            entity,
            instance,
            args,
            uow: &mut *ctx.uow,
        })
        .await?;
    Ok(ApiResponse::ok(json!({ "meta": { "result": result } })))
}
