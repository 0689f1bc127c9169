//! JSON:API SDK: REST endpoints and OpenAPI documentation generated from entity model
//! definitions.
//!
//! Describe entities in a [`ModelConfig`], resolve it into a [`Model`], attach custom
//! methods, then hand it with a [`Store`] to [`Api`] and expose what should be served.

pub mod config;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod id;
pub mod resource;
pub mod response;
pub mod routes;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{
    load_from_path, resolve, ApiMethod, ApiSettings, Entity, MethodBinding, MethodCall,
    MethodHandler, Model, ModelConfig,
};
pub use docs::DocRegistry;
pub use error::{ApiError, ConfigError, DocError, ExposeError, StoreError};
pub use id::{strategy_by_name, IdStrategy};
pub use resource::Verb;
pub use response::{error_body, JSONAPI_CONTENT_TYPE};
pub use routes::{common_routes, Api};
pub use state::ApiState;
pub use store::{MemoryStore, PgStore, Record, Store, UnitOfWork};
