pub mod common;
pub mod expose;
pub mod url;

pub use common::common_routes;
pub use expose::{Api, RouteEntry, RouteTable};
