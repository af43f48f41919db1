use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cellmap_api::bytes::concat;
use cellmap_api::codec::decode_i64;
use cellmap_api::{
    CellMap, Codec, CodecError, CodecRegistry, CounterMapCodec, EntryError, LongCodec, MapCodec,
    PrefixTable, Printable, RowResult,
};

use crate::config::{DecodeErrorPolicy, SchemaOptions, UnknownCellPolicy};
use crate::error::{EngineError, SchemaError};
use crate::layout::ColumnLayout;

type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;
type CellSetter<T> = Arc<dyn Fn(&mut T, &[u8]) -> Result<(), CodecError> + Send + Sync>;

/// Decodes a prefix group's suffix map into the object. Strict decoding
/// fails on the first bad entry; lossy decoding returns the bad entries and
/// leaves the object untouched when no entry decodes.
type GroupSetter<T> =
    Arc<dyn Fn(&mut T, &CellMap, DecodeErrorPolicy) -> Result<Vec<EntryError>, EntryError> + Send + Sync>;

/// A parsed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub value: T,
    /// Whether any column or prefix setter ran. `false` means the row had
    /// no cell this schema knows.
    pub populated: bool,
}

/// Fluent builder for a [`ResultSchema`] producing objects `T`.
pub struct ResultBuilder<'r, T> {
    registry: &'r CodecRegistry,
    options: SchemaOptions,
    layout: ColumnLayout,
    factory: Factory<T>,
    row_key: Option<CellSetter<T>>,
    columns: BTreeMap<Vec<u8>, CellSetter<T>>,
    groups: Vec<(Vec<u8>, GroupSetter<T>)>,
    error: Option<SchemaError>,
}

impl<'r, T: 'static> ResultBuilder<'r, T> {
    /// `factory` creates the empty object every parse starts from.
    pub fn new(registry: &'r CodecRegistry, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::with_options(registry, SchemaOptions::default(), factory)
    }

    pub fn with_options(
        registry: &'r CodecRegistry,
        options: SchemaOptions,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            registry,
            options,
            layout: ColumnLayout::new(options.overlap),
            factory: Arc::new(factory),
            row_key: None,
            columns: BTreeMap::new(),
            groups: Vec::new(),
            error: None,
        }
    }

    pub fn from_row_key<K: 'static>(self, setter: impl Fn(&mut T, K) + Send + Sync + 'static) -> Self {
        match self.registry.require::<K>() {
            Ok(codec) => self.from_row_key_as(setter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn from_row_key_as<K: 'static>(
        mut self,
        setter: impl Fn(&mut T, K) + Send + Sync + 'static,
        codec: Arc<dyn Codec<K>>,
    ) -> Self {
        let set: CellSetter<T> = Arc::new(move |obj: &mut T, bytes: &[u8]| -> Result<(), CodecError> {
            setter(obj, codec.decode(bytes)?);
            Ok(())
        });
        self.row_key = Some(set);
        self
    }

    pub fn from_column<V: 'static>(
        self,
        qualifier: impl Into<Vec<u8>>,
        setter: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        match self.registry.require::<V>() {
            Ok(codec) => self.from_column_as(qualifier, setter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn from_column_as<V: 'static>(
        self,
        qualifier: impl Into<Vec<u8>>,
        setter: impl Fn(&mut T, V) + Send + Sync + 'static,
        codec: Arc<dyn Codec<V>>,
    ) -> Self {
        let set: CellSetter<T> = Arc::new(move |obj: &mut T, bytes: &[u8]| -> Result<(), CodecError> {
            setter(obj, codec.decode(bytes)?);
            Ok(())
        });
        self.add_column(qualifier.into(), set)
    }

    /// Counter cell: an 8-byte big-endian integer read through a long codec.
    pub fn from_counter<V: 'static>(
        self,
        qualifier: impl Into<Vec<u8>>,
        setter: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        match self.registry.require_long::<V>() {
            Ok(codec) => self.from_counter_as(qualifier, setter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn from_counter_as<V: 'static>(
        self,
        qualifier: impl Into<Vec<u8>>,
        setter: impl Fn(&mut T, V) + Send + Sync + 'static,
        codec: Arc<dyn LongCodec<V>>,
    ) -> Self {
        let set: CellSetter<T> = Arc::new(move |obj: &mut T, bytes: &[u8]| -> Result<(), CodecError> {
            let long = decode_i64(codec.name(), bytes)?;
            setter(obj, codec.from_long(long)?);
            Ok(())
        });
        self.add_column(qualifier.into(), set)
    }

    /// Prefix group: the setter receives every matching cell keyed by the
    /// qualifier with the prefix removed.
    pub fn from_prefix<K: Ord + 'static, V: 'static>(
        self,
        prefix: impl Into<Vec<u8>>,
        setter: impl Fn(&mut T, BTreeMap<K, V>) + Send + Sync + 'static,
    ) -> Self {
        match self.registry.map_codec::<K, V>() {
            Ok(codec) => self.from_prefix_as(prefix, setter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn from_prefix_as<K: Ord + 'static, V: 'static>(
        self,
        prefix: impl Into<Vec<u8>>,
        setter: impl Fn(&mut T, BTreeMap<K, V>) + Send + Sync + 'static,
        codec: MapCodec<K, V>,
    ) -> Self {
        let set: GroupSetter<T> = Arc::new(
            move |obj: &mut T, cells: &CellMap, policy: DecodeErrorPolicy| -> Result<Vec<EntryError>, EntryError> {
                let (map, skipped) = match policy {
                    DecodeErrorPolicy::Fail => (codec.decode_map(cells)?, Vec::new()),
                    DecodeErrorPolicy::SkipCell => codec.decode_map_lossy(cells),
                };
                if map.is_empty() && !skipped.is_empty() {
                    return Ok(skipped);
                }
                setter(obj, map);
                Ok(skipped)
            },
        );
        self.add_group(prefix.into(), set)
    }

    /// Prefix group handed over undecoded.
    pub fn from_prefix_raw(
        self,
        prefix: impl Into<Vec<u8>>,
        setter: impl Fn(&mut T, CellMap) + Send + Sync + 'static,
    ) -> Self {
        let set: GroupSetter<T> = Arc::new(
            move |obj: &mut T, cells: &CellMap, _: DecodeErrorPolicy| -> Result<Vec<EntryError>, EntryError> {
                setter(obj, cells.clone());
                Ok(Vec::new())
            },
        );
        self.add_group(prefix.into(), set)
    }

    /// Prefix group of counter cells.
    pub fn from_counters<K: Ord + 'static, V: 'static>(
        self,
        prefix: impl Into<Vec<u8>>,
        setter: impl Fn(&mut T, BTreeMap<K, V>) + Send + Sync + 'static,
    ) -> Self {
        match self.registry.counter_map_codec::<K, V>() {
            Ok(codec) => self.from_counters_as(prefix, setter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn from_counters_as<K: Ord + 'static, V: 'static>(
        self,
        prefix: impl Into<Vec<u8>>,
        setter: impl Fn(&mut T, BTreeMap<K, V>) + Send + Sync + 'static,
        codec: CounterMapCodec<K, V>,
    ) -> Self {
        let set: GroupSetter<T> = Arc::new(
            move |obj: &mut T, cells: &CellMap, policy: DecodeErrorPolicy| -> Result<Vec<EntryError>, EntryError> {
                let (map, skipped) = match policy {
                    DecodeErrorPolicy::Fail => (codec.decode_counters(cells)?, Vec::new()),
                    DecodeErrorPolicy::SkipCell => codec.decode_counters_lossy(cells),
                };
                if map.is_empty() && !skipped.is_empty() {
                    return Ok(skipped);
                }
                setter(obj, map);
                Ok(skipped)
            },
        );
        self.add_group(prefix.into(), set)
    }

    pub fn build(self) -> Result<ResultSchema<T>, SchemaError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.columns.is_empty() && self.groups.is_empty() {
            return Err(SchemaError::Incomplete("no column or prefix setter registered"));
        }
        let group_index = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, (prefix, _))| (prefix.clone(), i))
            .collect();
        tracing::debug!(
            columns = self.columns.len(),
            groups = self.groups.len(),
            row_key = self.row_key.is_some(),
            "built result schema"
        );
        Ok(ResultSchema {
            options: self.options,
            factory: self.factory,
            row_key: self.row_key,
            qualifiers: self.layout.qualifiers().clone(),
            prefixes: self.layout.prefixes(),
            columns: self.columns,
            group_index,
            groups: self.groups,
        })
    }

    fn add_column(mut self, qualifier: Vec<u8>, set: CellSetter<T>) -> Self {
        if self.error.is_some() {
            return self;
        }
        if let Err(e) = self.layout.add_qualifier(&qualifier) {
            return self.fail(e);
        }
        self.columns.insert(qualifier, set);
        self
    }

    fn add_group(mut self, prefix: Vec<u8>, set: GroupSetter<T>) -> Self {
        if self.error.is_some() {
            return self;
        }
        if let Err(e) = self.layout.add_prefix(&prefix) {
            return self.fail(e);
        }
        self.groups.push((prefix, set));
        self
    }

    fn fail(mut self, error: SchemaError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }
}

/// Immutable row → object mapping.
pub struct ResultSchema<T> {
    options: SchemaOptions,
    factory: Factory<T>,
    row_key: Option<CellSetter<T>>,
    qualifiers: BTreeSet<Vec<u8>>,
    prefixes: BTreeSet<Vec<u8>>,
    columns: BTreeMap<Vec<u8>, CellSetter<T>>,
    group_index: PrefixTable<usize>,
    groups: Vec<(Vec<u8>, GroupSetter<T>)>,
}

impl<T> std::fmt::Debug for ResultSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSchema")
            .field("options", &self.options)
            .field("qualifiers", &self.qualifiers.iter().map(|q| Printable(q)).collect::<Vec<_>>())
            .field("prefixes", &self.prefixes.iter().map(|p| Printable(p)).collect::<Vec<_>>())
            .field("row_key", &self.row_key.is_some())
            .finish()
    }
}

impl<T> ResultSchema<T> {
    pub fn qualifiers(&self) -> &BTreeSet<Vec<u8>> {
        &self.qualifiers
    }

    pub fn prefixes(&self) -> &BTreeSet<Vec<u8>> {
        &self.prefixes
    }

    /// Build an object from one row.
    ///
    /// A cell routes to the setter of its exact qualifier, else to the
    /// prefix group with the longest matching prefix. Group cells are
    /// collected first and handed to each group's setter once, keyed by
    /// suffix. Cells matching nothing follow the unknown-cell policy; cells
    /// that fail to decode follow the decode-error policy.
    pub fn parse(&self, row_key: &[u8], cells: &CellMap) -> Result<Parsed<T>, EngineError> {
        let mut obj = (self.factory)();
        let mut populated = false;

        if let Some(set) = &self.row_key {
            set(&mut obj, row_key).map_err(|e| EngineError::Codec(e.with_context("row key")))?;
        }

        let mut buckets: Vec<CellMap> = vec![CellMap::new(); self.groups.len()];
        for (qualifier, value) in cells {
            if let Some(set) = self.columns.get(qualifier) {
                match set(&mut obj, value) {
                    Ok(()) => populated = true,
                    Err(source) => self.decode_failed(qualifier, source)?,
                }
            } else if let Some((prefix, &group)) = self.group_index.longest_match(qualifier) {
                buckets[group].insert(qualifier[prefix.len()..].to_vec(), value.clone());
            } else {
                match self.options.unknown_cells {
                    UnknownCellPolicy::Ignore => {
                        tracing::trace!(qualifier = ?Printable(qualifier), "ignoring unmapped cell");
                    }
                    UnknownCellPolicy::Reject => {
                        return Err(EngineError::UnknownCell {
                            qualifier: qualifier.clone(),
                        });
                    }
                }
            }
        }

        for ((prefix, set), bucket) in self.groups.iter().zip(&buckets) {
            if bucket.is_empty() {
                continue;
            }
            let skipped = set(&mut obj, bucket, self.options.decode_errors).map_err(|e| {
                EngineError::Decode {
                    qualifier: concat(prefix, &e.key),
                    source: e.source,
                }
            })?;
            // Every entry skipped means the setter never ran.
            if skipped.len() < bucket.len() {
                populated = true;
            }
            for entry in skipped {
                tracing::trace!(
                    qualifier = ?Printable(&concat(prefix, &entry.key)),
                    error = %entry.source,
                    "skipping undecodable cell"
                );
            }
        }

        Ok(Parsed { value: obj, populated })
    }

    pub fn parse_row(&self, row: &RowResult) -> Result<Parsed<T>, EngineError> {
        self.parse(&row.row_key, &row.cells)
    }

    fn decode_failed(&self, qualifier: &[u8], source: CodecError) -> Result<(), EngineError> {
        match self.options.decode_errors {
            DecodeErrorPolicy::Fail => Err(EngineError::Decode {
                qualifier: qualifier.to_vec(),
                source,
            }),
            DecodeErrorPolicy::SkipCell => {
                tracing::trace!(
                    qualifier = ?Printable(qualifier),
                    error = %source,
                    "skipping undecodable cell"
                );
                Ok(())
            }
        }
    }
}
