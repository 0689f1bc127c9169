//! Example server: a small inventory model exposed as JSON:API with Swagger docs.
//! Uses PostgreSQL when DATABASE_URL is set (tables must already exist), else an in-memory store.

use async_trait::async_trait;
use jsonapi_sdk::{
    resolve, Api, ApiError, ApiMethod, ApiSettings, MemoryStore, MethodBinding, MethodCall,
    MethodHandler, ModelConfig, PgStore, Store,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const MODEL: &str = r#"{
  "entities": [
    {
      "type": "Warehouse",
      "table": "warehouses",
      "doc": "description: Storage sites",
      "columns": [
        { "name": "id", "kind": "uuid", "primary_key": true },
        { "name": "name", "example": "Main depot" }
      ],
      "relationships": [
        { "name": "items", "target": "Item", "cardinality": "to_many", "foreign_key": "warehouse_id" }
      ]
    },
    {
      "type": "Item",
      "table": "items",
      "columns": [
        { "name": "id", "kind": "uuid", "primary_key": true },
        { "name": "sku", "example": "SKU-001" },
        { "name": "quantity", "kind": "integer", "example": 10 },
        { "name": "warehouse_id", "kind": "uuid" }
      ],
      "relationships": [
        { "name": "warehouse", "target": "Warehouse", "cardinality": "to_one", "foreign_key": "warehouse_id" }
      ]
    }
  ]
}"#;

/// Total quantity of every item.
struct StockTotal;

#[async_trait]
impl MethodHandler for StockTotal {
    async fn invoke(&self, mut call: MethodCall<'_>) -> Result<Value, ApiError> {
        let rows = call.uow.list(call.entity, Default::default()).await?;
        let total: i64 = rows
            .iter()
            .filter_map(|r| r.get("quantity").and_then(Value::as_i64))
            .sum();
        Ok(json!({ "total": total }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jsonapi_sdk=info".parse()?))
        .init();

    let store: Arc<dyn Store> = match std::env::var("DATABASE_URL") {
        Ok(url) => Arc::new(PgStore::connect(&url).await?),
        Err(_) => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let model = resolve(&ModelConfig::from_json_str(MODEL)?)?.with_method(
        "Item",
        ApiMethod::new("stock_total", MethodBinding::Class, Arc::new(StockTotal))
            .with_doc("summary: Total stock over all items\nhttp_methods: [GET, POST]"),
    )?;

    let settings = ApiSettings::from_env();
    let mut api = Api::new(settings, store, model);
    api.expose_all("")?;
    let app = api.into_router()?;

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
