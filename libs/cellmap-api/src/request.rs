use std::collections::{BTreeMap, BTreeSet};

use crate::bytes::{CellMap, compare, is_prefix_of, row_after, successor};

/// Columns to fetch from the family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelection {
    /// Exactly these qualifiers. May be empty (row-key-only schemas).
    Qualifiers(BTreeSet<Vec<u8>>),
    /// The whole column family.
    Family,
}

impl ColumnSelection {
    pub fn includes(&self, qualifier: &[u8]) -> bool {
        match self {
            ColumnSelection::Qualifiers(set) => set.contains(qualifier),
            ColumnSelection::Family => true,
        }
    }
}

/// Server-side column filter: keep cells whose qualifier starts with any
/// of the prefixes, plus the listed fixed qualifiers that a whole-family
/// fetch would otherwise lose.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnPrefixFilter {
    pub prefixes: BTreeSet<Vec<u8>>,
    pub qualifiers: BTreeSet<Vec<u8>>,
}

impl ColumnPrefixFilter {
    pub fn matches(&self, qualifier: &[u8]) -> bool {
        self.qualifiers.contains(qualifier)
            || self.prefixes.iter().any(|p| is_prefix_of(p, qualifier))
    }
}

/// Half-open row range `[start, stop)`; `stop = None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    pub start: Vec<u8>,
    pub stop: Option<Vec<u8>>,
}

impl ScanRange {
    /// Every row whose key starts with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        Self {
            start: prefix.to_vec(),
            stop: successor(prefix),
        }
    }

    /// Exactly the row `key`.
    pub fn single_row(key: &[u8]) -> Self {
        Self {
            start: key.to_vec(),
            stop: Some(row_after(key)),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        compare(&self.start, key).is_le()
            && self
                .stop
                .as_deref()
                .is_none_or(|stop| compare(key, stop).is_lt())
    }
}

/// Point lookup of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Get {
    pub row_key: Vec<u8>,
    pub selection: ColumnSelection,
    pub filter: Option<ColumnPrefixFilter>,
}

/// Range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub range: ScanRange,
    pub selection: ColumnSelection,
    pub filter: Option<ColumnPrefixFilter>,
}

/// A cell value with the timestamp it is written at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell<V> {
    pub value: V,
    pub timestamp: i64,
}

/// Value writes for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub row_key: Vec<u8>,
    pub cells: BTreeMap<Vec<u8>, Cell<Vec<u8>>>,
}

/// Atomic counter increments for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub row_key: Vec<u8>,
    pub cells: BTreeMap<Vec<u8>, Cell<i64>>,
}

/// Everything one object contributes to its row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMutation {
    pub row_key: Vec<u8>,
    pub puts: BTreeMap<Vec<u8>, Cell<Vec<u8>>>,
    pub increments: BTreeMap<Vec<u8>, Cell<i64>>,
}

impl RowMutation {
    /// Combine a put and an increment for the same row; `None` when both
    /// are absent.
    pub fn from_parts(put: Option<Put>, increment: Option<Increment>) -> Option<Self> {
        match (put, increment) {
            (None, None) => None,
            (Some(put), None) => Some(Self {
                row_key: put.row_key,
                puts: put.cells,
                increments: BTreeMap::new(),
            }),
            (None, Some(inc)) => Some(Self {
                row_key: inc.row_key,
                puts: BTreeMap::new(),
                increments: inc.cells,
            }),
            (Some(put), Some(inc)) => Some(Self {
                row_key: put.row_key,
                puts: put.cells,
                increments: inc.cells,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.increments.is_empty()
    }
}

/// One fetched row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowResult {
    pub row_key: Vec<u8>,
    pub cells: CellMap,
}
