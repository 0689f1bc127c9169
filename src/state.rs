//! Shared state for all generated routes. Built once when the router is finalized.

use crate::config::ApiSettings;
use crate::response::LinkTable;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn Store>,
    pub settings: Arc<ApiSettings>,
    /// Instance and relationship URL templates of every exposed type.
    pub links: Arc<LinkTable>,
}
