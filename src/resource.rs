//! Resource classes: one generic handler parameterized by what it serves.
//!
//! Every request to a resource class runs the same chain, in this order:
//! 1. documentation: attached once, at registration (see `routes::expose`);
//! 2. cross-origin header: added to every response, errors included;
//! 3. error translation: the handler runs inside a unit-of-work that is committed on
//!    success and rolled back on failure, and failures become `{"errors": [...]}`.

use crate::config::{Entity, RelationshipDescriptor};
use crate::error::ApiError;
use crate::handlers::{self, ApiRequest, Ctx};
use crate::response::{error_response, ApiResponse};
use crate::state::ApiState;
use axum::http::{header, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodFilter;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    Get,
    Post,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    /// Lower-case name used in documentation definitions.
    pub fn doc_name(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Post => "post",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Verb> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Verb::Get),
            "POST" => Some(Verb::Post),
            "PATCH" => Some(Verb::Patch),
            "DELETE" => Some(Verb::Delete),
            _ => None,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
        }
    }

    pub fn filter(&self) -> MethodFilter {
        match self {
            Verb::Get => MethodFilter::GET,
            Verb::Post => MethodFilter::POST,
            Verb::Patch => MethodFilter::PATCH,
            Verb::Delete => MethodFilter::DELETE,
        }
    }

    pub fn http_method(&self) -> utoipa::openapi::HttpMethod {
        use utoipa::openapi::HttpMethod;
        match self {
            Verb::Get => HttpMethod::Get,
            Verb::Post => HttpMethod::Post,
            Verb::Patch => HttpMethod::Patch,
            Verb::Delete => HttpMethod::Delete,
        }
    }
}

/// What a resource class serves.
#[derive(Clone, Debug)]
pub enum Resource {
    /// Collection and instance URLs of one entity.
    Entity {
        entity: Arc<Entity>,
        id_param: String,
    },
    /// Relationship root and child URLs.
    Relationship {
        rel: RelationshipDescriptor,
        parent_param: String,
        child_param: String,
    },
    /// A custom method; `id_param` is only present in instance-method URLs.
    Method {
        entity: Arc<Entity>,
        method: String,
        id_param: String,
    },
}

impl Resource {
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Entity { .. } => "entity",
            Resource::Relationship { .. } => "relationship",
            Resource::Method { .. } => "method",
        }
    }
}

#[derive(Debug)]
pub struct ResourceClass {
    pub name: String,
    pub resource: Resource,
}

impl ResourceClass {
    pub fn new(name: impl Into<String>, resource: Resource) -> Arc<Self> {
        Arc::new(ResourceClass {
            name: name.into(),
            resource,
        })
    }

    /// Run one request. A request that could not be assembled is reported through the same
    /// error translation as a failing handler.
    pub async fn call(
        &self,
        state: &ApiState,
        verb: Verb,
        req: Result<ApiRequest, ApiError>,
    ) -> Response {
        let result = match req {
            Ok(req) => self.execute(state, verb, &req).await,
            Err(e) => Err(e),
        };
        let response = match result {
            Ok(r) => r.into_response(),
            Err(e) => {
                let (status, detail) = e.status_and_detail(state.settings.verbose_errors);
                tracing::error!(
                    resource = %self.name,
                    verb = verb.as_str(),
                    status = status.as_u16(),
                    error = %e,
                    "request failed"
                );
                error_response(status, &detail)
            }
        };
        with_cors(response, state.settings.cors_domain.as_deref())
    }

    async fn execute(&self, state: &ApiState, verb: Verb, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut uow = state.store.begin().await?;
        let result = {
            let mut ctx = Ctx {
                uow: uow.as_mut(),
                links: &state.links,
            };
            handlers::dispatch(&self.resource, &mut ctx, verb, req).await
        };
        match result {
            Ok(r) => {
                uow.commit().await?;
                Ok(r)
            }
            Err(e) => {
                if let Err(rb) = uow.rollback().await {
                    tracing::warn!(resource = %self.name, error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

fn with_cors(mut response: Response, domain: Option<&str>) -> Response {
    if let Some(v) = domain.and_then(|d| HeaderValue::from_str(d).ok()) {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, v);
    }
    response
}
