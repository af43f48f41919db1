use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cellmap_api::codec::decode_i64;
use cellmap_api::{
    CellMap, CellStore, ColumnPrefixFilter, ColumnSelection, Get, Printable, RowMutation,
    RowResult, Scan, StoreError, StoreFactory,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryStoreConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_versions() -> usize {
    3
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryStoreConfig {
    /// Versions kept per cell, newest first.
    #[serde(default = "default_max_versions")]
    pub max_versions: usize,

    /// Tables created up front.
    #[serde(default)]
    pub tables: Vec<String>,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_versions: default_max_versions(),
            tables: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStore
// ═══════════════════════════════════════════════════════════════

/// All versions of one cell, newest first.
type Versions = Vec<(i64, Vec<u8>)>;

/// Cells of one row keyed by (family, qualifier).
type Row = BTreeMap<(String, Vec<u8>), Versions>;

type Table = BTreeMap<Vec<u8>, Row>;

/// In-process sorted table store.
///
/// Rows are kept in byte order, every cell keeps up to `max_versions`
/// timestamped versions and reads see the newest one. Counters are 8-byte
/// big-endian cells.
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    max_versions: usize,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("max_versions", &self.max_versions)
            .finish()
    }
}

impl MemoryStore {
    pub fn new(max_versions: usize) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            max_versions: max_versions.max(1),
        }
    }

    pub fn from_config(config: &MemoryStoreConfig) -> Self {
        let store = Self::new(config.max_versions);
        for table in &config.tables {
            store.create_table(table);
        }
        store
    }

    /// Create an empty table; an existing table is left untouched.
    pub fn create_table(&self, name: &str) {
        let mut tables = self.write();
        if !tables.contains_key(name) {
            tracing::debug!(table = name, "creating table");
            tables.insert(name.to_string(), Table::new());
        }
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Every stored version of one cell, newest first.
    pub fn versions(
        &self,
        table: &str,
        row_key: &[u8],
        family: &str,
        qualifier: &[u8],
    ) -> Result<Vec<(i64, Vec<u8>)>, StoreError> {
        let tables = self.read();
        let table = lookup(&tables, table)?;
        let key = (family.to_string(), qualifier.to_vec());
        Ok(table
            .get(row_key)
            .and_then(|row| row.get(&key))
            .cloned()
            .unwrap_or_default())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Table>> {
        match self.tables.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory store read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Table>> {
        match self.tables.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory store write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn insert_version(&self, versions: &mut Versions, timestamp: i64, value: Vec<u8>) {
        match versions.binary_search_by(|(ts, _)| timestamp.cmp(ts)) {
            Ok(i) => versions[i].1 = value,
            Err(i) => versions.insert(i, (timestamp, value)),
        }
        versions.truncate(self.max_versions);
    }
}

fn lookup<'a>(tables: &'a HashMap<String, Table>, name: &str) -> Result<&'a Table, StoreError> {
    tables
        .get(name)
        .ok_or_else(|| StoreError::not_found(format!("table {name}")))
}

/// Newest value of every cell of `row` in `family` passing the selection
/// and the filter.
fn select(
    row: &Row,
    family: &str,
    selection: &ColumnSelection,
    filter: Option<&ColumnPrefixFilter>,
) -> CellMap {
    row.iter()
        .filter(|((f, q), _)| {
            f == family && selection.includes(q) && filter.is_none_or(|filter| filter.matches(q))
        })
        .filter_map(|((_, q), versions)| versions.first().map(|(_, v)| (q.clone(), v.clone())))
        .collect()
}

impl CellStore for MemoryStore {
    fn get(&self, table: &str, family: &str, get: &Get) -> Result<CellMap, StoreError> {
        let tables = self.read();
        let table = lookup(&tables, table)?;
        Ok(table
            .get(&get.row_key)
            .map(|row| select(row, family, &get.selection, get.filter.as_ref()))
            .unwrap_or_default())
    }

    fn scan(&self, table: &str, family: &str, scan: &Scan) -> Result<Vec<RowResult>, StoreError> {
        let tables = self.read();
        let table = lookup(&tables, table)?;
        let start = Bound::Included(scan.range.start.as_slice());
        let stop = match &scan.range.stop {
            Some(stop) if stop.as_slice() <= scan.range.start.as_slice() => return Ok(Vec::new()),
            Some(stop) => Bound::Excluded(stop.as_slice()),
            None => Bound::Unbounded,
        };
        Ok(table
            .range::<[u8], _>((start, stop))
            .filter_map(|(key, row)| {
                let cells = select(row, family, &scan.selection, scan.filter.as_ref());
                (!cells.is_empty()).then(|| RowResult {
                    row_key: key.clone(),
                    cells,
                })
            })
            .collect())
    }

    /// Puts and increments of one row apply together: a bad counter rejects
    /// the whole mutation before anything is written.
    fn mutate(&self, table: &str, family: &str, mutation: &RowMutation) -> Result<(), StoreError> {
        let mut tables = self.write();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::not_found(format!("table {table}")))?;

        let mut counters = Vec::with_capacity(mutation.increments.len());
        {
            let row = table.get(&mutation.row_key);
            for (qualifier, cell) in &mutation.increments {
                let key = (family.to_string(), qualifier.clone());
                let (current, newest) = match row.and_then(|r| r.get(&key)).and_then(|v| v.first()) {
                    Some((ts, bytes)) => {
                        let current = decode_i64("counter", bytes).map_err(|e| {
                            StoreError::corrupt(format!("{}: {}", Printable(qualifier), e.message))
                        })?;
                        (current, Some(*ts))
                    }
                    None => (0, None),
                };
                let next = current.checked_add(cell.value).ok_or_else(|| {
                    StoreError::rejected(format!("counter {} overflows", Printable(qualifier)))
                })?;
                // The sum always becomes the newest version, even when the
                // increment carries an older timestamp.
                let timestamp = newest.map_or(cell.timestamp, |ts| ts.max(cell.timestamp));
                counters.push((key, timestamp, next));
            }
        }

        let row = table.entry(mutation.row_key.clone()).or_default();
        for (qualifier, cell) in &mutation.puts {
            let versions = row.entry((family.to_string(), qualifier.clone())).or_default();
            self.insert_version(versions, cell.timestamp, cell.value.clone());
        }
        for (key, timestamp, value) in counters {
            let versions = row.entry(key).or_default();
            self.insert_version(versions, timestamp, value.to_be_bytes().to_vec());
        }
        tracing::trace!(
            row_key = ?Printable(&mutation.row_key),
            puts = mutation.puts.len(),
            increments = mutation.increments.len(),
            "mutated row"
        );
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStoreFactory
// ═══════════════════════════════════════════════════════════════

pub struct MemoryStoreFactory;

impl StoreFactory for MemoryStoreFactory {
    fn create(&self, config: Option<&serde_json::Value>) -> Result<Arc<dyn CellStore>, StoreError> {
        let config: MemoryStoreConfig = match config {
            None => MemoryStoreConfig::default(),
            Some(value) => serde_json::from_value(value.clone())?,
        };
        Ok(Arc::new(MemoryStore::from_config(&config)))
    }
}
