//! JSON:API request handlers for entities, relationships and custom methods.

pub mod entity;
pub mod method;
pub mod relationship;
pub mod request;

pub use request::ApiRequest;

use crate::config::Entity;
use crate::error::ApiError;
use crate::resource::{Resource, Verb};
use crate::response::{ApiResponse, LinkTable};
use crate::store::{Record, UnitOfWork};

/// Per-request handler context.
pub struct Ctx<'a> {
    pub uow: &'a mut dyn UnitOfWork,
    pub links: &'a LinkTable,
}

impl Ctx<'_> {
    /// Resolve an identifier to a stored row. Invalid and unknown ids both yield `invalid`.
    pub(crate) async fn load(
        &mut self,
        entity: &Entity,
        id: &str,
        invalid: impl FnOnce() -> ApiError,
    ) -> Result<Record, ApiError> {
        let Ok(key) = entity.key_of(id) else {
            return Err(invalid());
        };
        match self.uow.get(entity, &key).await? {
            Some(row) => Ok(row),
            None => Err(invalid()),
        }
    }
}

pub async fn dispatch(
    resource: &Resource,
    ctx: &mut Ctx<'_>,
    verb: Verb,
    req: &ApiRequest,
) -> Result<ApiResponse, ApiError> {
    match resource {
        Resource::Entity { entity, id_param } => match verb {
            Verb::Get => entity::get(ctx, entity, id_param, req).await,
            Verb::Post => entity::post(ctx, entity, id_param, req).await,
            Verb::Patch => entity::patch(ctx, entity, id_param, req).await,
            Verb::Delete => entity::delete(ctx, entity, id_param, req).await,
        },
        Resource::Relationship {
            rel,
            parent_param,
            child_param,
        } => {
            let target = relationship::Target {
                rel,
                parent_param,
                child_param,
            };
            match verb {
                Verb::Get => relationship::get(ctx, &target, req).await,
                Verb::Post => relationship::post(ctx, &target, req).await,
                Verb::Patch => relationship::patch(ctx, &target, req).await,
                Verb::Delete => relationship::delete(ctx, &target, req).await,
            }
        }
        Resource::Method {
            entity,
            method,
            id_param,
        } => method::call(ctx, entity, method, id_param, verb, req).await,
    }
}
