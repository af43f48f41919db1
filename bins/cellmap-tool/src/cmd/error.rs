use cellmap_api::StoreError;
use cellmap_engine::{EngineError, SchemaError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
