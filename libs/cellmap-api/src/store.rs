use std::sync::Arc;

use crate::bytes::CellMap;
use crate::error::StoreError;
use crate::request::{Get, RowMutation, RowResult, Scan};

/// The sorted-table store, as seen by the mapping engine.
///
/// The engine never opens, pools or retries connections; an implementation
/// owns all of that. Every call either returns or fails, and the engine
/// assumes nothing about latency or thread-safety beyond the `Send + Sync`
/// bound needed to share one handle.
pub trait CellStore: Send + Sync {
    /// Point lookup. An absent row yields an empty map.
    fn get(&self, table: &str, family: &str, get: &Get) -> Result<CellMap, StoreError>;

    /// Rows of `scan.range` in key order. Rows with no selected cells are
    /// omitted.
    fn scan(&self, table: &str, family: &str, scan: &Scan) -> Result<Vec<RowResult>, StoreError>;

    /// Apply all puts and increments of one row.
    fn mutate(&self, table: &str, family: &str, mutation: &RowMutation) -> Result<(), StoreError>;
}

/// Creates a store from its section of the engine configuration.
pub trait StoreFactory: Send + Sync {
    fn create(&self, config: Option<&serde_json::Value>) -> Result<Arc<dyn CellStore>, StoreError>;
}
