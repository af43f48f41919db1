use std::collections::BTreeMap;

use cellmap_api::PrefixTable;

use crate::field::{FieldSpec, TimestampFn};

/// Per-cell timestamp resolution for one mutation schema.
///
/// Fixed qualifiers are registered for exact lookup, prefix groups for
/// longest-prefix lookup, each together with the timestamp it captured
/// (possibly none). A qualifier resolves to its exact column if one is
/// registered, otherwise to the longest registered prefix of it. A field
/// that captured no timestamp, or whose timestamp yields nothing for the
/// object, falls back to the row-level timestamp.
pub struct TimestampTable<T> {
    row: Option<TimestampFn<T>>,
    qualifiers: BTreeMap<Vec<u8>, Option<TimestampFn<T>>>,
    prefixes: PrefixTable<Option<TimestampFn<T>>>,
}

impl<T> std::fmt::Debug for TimestampTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampTable")
            .field("row", &self.row.is_some())
            .field("qualifiers", &self.qualifiers.len())
            .field("prefixes", &self.prefixes.len())
            .finish()
    }
}

impl<T> TimestampTable<T> {
    pub fn new(row: Option<TimestampFn<T>>) -> Self {
        Self {
            row,
            qualifiers: BTreeMap::new(),
            prefixes: PrefixTable::new(),
        }
    }

    pub fn from_fields(row: Option<TimestampFn<T>>, fields: &[FieldSpec<T>]) -> Self {
        let mut table = Self::new(row);
        for field in fields {
            let timestamp = field.timestamp().cloned();
            if field.is_prefix_group() {
                table.register_prefix(field.column(), timestamp);
            } else {
                table.register_qualifier(field.column(), timestamp);
            }
        }
        table
    }

    pub fn register_qualifier(&mut self, qualifier: &[u8], timestamp: Option<TimestampFn<T>>) {
        self.qualifiers.insert(qualifier.to_vec(), timestamp);
    }

    pub fn register_prefix(&mut self, prefix: &[u8], timestamp: Option<TimestampFn<T>>) {
        self.prefixes.insert(prefix.to_vec(), timestamp);
    }

    /// Registered column that owns `qualifier`: the exact qualifier, else
    /// the longest prefix.
    pub fn owner(&self, qualifier: &[u8]) -> Option<&[u8]> {
        match self.qualifiers.get_key_value(qualifier) {
            Some((column, _)) => Some(column.as_slice()),
            None => self.prefixes.longest_match(qualifier).map(|(prefix, _)| prefix),
        }
    }

    pub fn resolve(&self, qualifier: &[u8], obj: &T) -> Option<i64> {
        let captured = match self.qualifiers.get(qualifier) {
            Some(ts) => ts.as_ref(),
            None => self.prefixes.longest_match(qualifier).and_then(|(_, ts)| ts.as_ref()),
        };
        captured
            .and_then(|ts| ts(obj))
            .or_else(|| self.row.as_ref().and_then(|ts| ts(obj)))
    }
}
