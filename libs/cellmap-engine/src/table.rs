use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use cellmap_api::{CellStore, Printable};

use crate::config::TableConfig;
use crate::error::EngineError;
use crate::mutation::MutationSchema;
use crate::query::QuerySchema;
use crate::result::{Parsed, ResultSchema};

/// A table of objects `T`, queried by `Q`, bound to a store.
pub struct MappedTable<T, Q> {
    name: String,
    family: String,
    mutation: MutationSchema<T>,
    query: QuerySchema<Q>,
    result: ResultSchema<T>,
    store: Arc<dyn CellStore>,
}

impl<T, Q> std::fmt::Debug for MappedTable<T, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedTable")
            .field("name", &self.name)
            .field("family", &self.family)
            .finish()
    }
}

impl<T, Q> MappedTable<T, Q> {
    pub fn new(
        config: &TableConfig,
        mutation: MutationSchema<T>,
        query: QuerySchema<Q>,
        result: ResultSchema<T>,
        store: Arc<dyn CellStore>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            family: config.family.clone(),
            mutation,
            query,
            result,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn mutation_schema(&self) -> &MutationSchema<T> {
        &self.mutation
    }

    pub fn query_schema(&self) -> &QuerySchema<Q> {
        &self.query
    }

    pub fn result_schema(&self) -> &ResultSchema<T> {
        &self.result
    }

    /// Write one object. Returns `false` when it contributed no cell and
    /// nothing was sent to the store.
    pub fn put(&self, obj: &T) -> Result<bool, EngineError> {
        let Some(mutation) = self.mutation.to_mutation(obj)? else {
            return Ok(false);
        };
        self.store
            .mutate(&self.name, &self.family, &mutation)
            .map_err(|e| EngineError::Store(e.with_context(format!("put {}", self.name))))?;
        tracing::debug!(
            table = %self.name,
            row_key = ?Printable(&mutation.row_key),
            puts = mutation.puts.len(),
            increments = mutation.increments.len(),
            "applied mutation"
        );
        Ok(true)
    }

    /// Write every object in order; stops at the first failure. Returns the
    /// number of mutations sent.
    pub fn put_all<'a>(&self, objs: impl IntoIterator<Item = &'a T>) -> Result<usize, EngineError>
    where
        T: 'a,
    {
        let mut written = 0;
        for obj in objs {
            if self.put(obj)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Point lookup. `None` when the row holds no selected cell.
    pub fn get(&self, query: &Q) -> Result<Option<Parsed<T>>, EngineError> {
        let get = self.query.to_get(query)?;
        let cells = self
            .store
            .get(&self.name, &self.family, &get)
            .map_err(|e| EngineError::Store(e.with_context(format!("get {}", self.name))))?;
        if cells.is_empty() {
            return Ok(None);
        }
        self.result.parse(&get.row_key, &cells).map(Some)
    }

    pub fn get_all<'a>(
        &self,
        queries: impl IntoIterator<Item = &'a Q>,
    ) -> Result<Vec<Option<Parsed<T>>>, EngineError>
    where
        Q: 'a,
    {
        queries.into_iter().map(|q| self.get(q)).collect()
    }

    /// Every row in the query's scan range, in key order.
    pub fn scan(&self, query: &Q) -> Result<Vec<Parsed<T>>, EngineError> {
        let scan = self.query.to_scan(query)?;
        let rows = self
            .store
            .scan(&self.name, &self.family, &scan)
            .map_err(|e| EngineError::Store(e.with_context(format!("scan {}", self.name))))?;
        tracing::debug!(
            table = %self.name,
            start = ?Printable(&scan.range.start),
            rows = rows.len(),
            "scanned"
        );
        rows.iter().map(|row| self.result.parse_row(row)).collect()
    }
}

/// Named tables of any object type.
///
/// Uses interior mutability so tables can be added after startup.
#[derive(Default)]
pub struct TableRegistry {
    tables: std::sync::RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl std::fmt::Debug for TableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableRegistry")
            .field("tables", &self.table_names())
            .finish()
    }
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under its name, replacing any previous one.
    pub fn register<T, Q>(&self, table: MappedTable<T, Q>) -> Arc<MappedTable<T, Q>>
    where
        T: Send + Sync + 'static,
        Q: Send + Sync + 'static,
    {
        let table = Arc::new(table);
        let mut guard = match self.tables.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("table registry write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        tracing::info!(table = %table.name(), family = %table.family(), "registered table");
        guard.insert(table.name().to_string(), table.clone());
        table
    }

    /// The table named `name`, if it maps objects `T` queried by `Q`.
    pub fn get<T, Q>(&self, name: &str) -> Result<Arc<MappedTable<T, Q>>, EngineError>
    where
        T: Send + Sync + 'static,
        Q: Send + Sync + 'static,
    {
        let guard = match self.tables.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("table registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let table = guard
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))?;
        table.downcast::<MappedTable<T, Q>>().map_err(|_| {
            EngineError::Config(format!(
                "table {name} does not map {}",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn table_names(&self) -> Vec<String> {
        let guard = match self.tables.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("table registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        let guard = match self.tables.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("table registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.contains_key(name)
    }
}
