use std::collections::BTreeMap;
use std::sync::Arc;

use cellmap_api::bytes::concat;
use cellmap_api::{CellMap, Codec, CodecError, CounterMapCodec, DeltaMap, LongCodec, MapCodec, Printable};

/// Per-object timestamp source.
pub type TimestampFn<T> = Arc<dyn Fn(&T) -> Option<i64> + Send + Sync>;

pub(crate) type ValueFn<T> = Arc<dyn Fn(&T) -> Result<Option<Vec<u8>>, CodecError> + Send + Sync>;
pub(crate) type DeltaFn<T> = Arc<dyn Fn(&T) -> Result<Option<i64>, CodecError> + Send + Sync>;
pub(crate) type CellsFn<T> = Arc<dyn Fn(&T) -> Result<CellMap, CodecError> + Send + Sync>;
pub(crate) type DeltasFn<T> = Arc<dyn Fn(&T) -> Result<DeltaMap, CodecError> + Send + Sync>;

/// What a field writes.
pub enum FieldKind<T> {
    /// One value cell at a fixed qualifier.
    Value(ValueFn<T>),
    /// One increment cell at a fixed qualifier.
    Delta(DeltaFn<T>),
    /// One cell per map entry at `prefix ++ suffix`.
    PrefixGroup(GroupSource<T>),
}

/// Contents of a prefix group.
pub enum GroupSource<T> {
    Values(CellsFn<T>),
    Deltas(DeltasFn<T>),
}

/// One mapped field of a mutation schema.
///
/// `column` is the qualifier for `Value`/`Delta` fields and the qualifier
/// prefix for `PrefixGroup` fields. The timestamp is the one registered
/// when the field was added.
pub struct FieldSpec<T> {
    column: Vec<u8>,
    kind: FieldKind<T>,
    timestamp: Option<TimestampFn<T>>,
}

impl<T> std::fmt::Debug for FieldSpec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            FieldKind::Value(_) => "value",
            FieldKind::Delta(_) => "delta",
            FieldKind::PrefixGroup(GroupSource::Values(_)) => "values",
            FieldKind::PrefixGroup(GroupSource::Deltas(_)) => "deltas",
        };
        f.debug_struct("FieldSpec")
            .field("column", &Printable(&self.column))
            .field("kind", &kind)
            .field("timestamp", &self.timestamp.is_some())
            .finish()
    }
}

impl<T: 'static> FieldSpec<T> {
    pub fn value<V: 'static>(
        qualifier: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<V> + Send + Sync + 'static,
        codec: Arc<dyn Codec<V>>,
    ) -> Self {
        let encode: ValueFn<T> = Arc::new(move |obj: &T| match getter(obj) {
            Some(v) => codec.encode(&v).map(Some),
            None => Ok(None),
        });
        Self::new(qualifier.into(), FieldKind::Value(encode))
    }

    pub fn delta<V: 'static>(
        qualifier: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<V> + Send + Sync + 'static,
        codec: Arc<dyn LongCodec<V>>,
    ) -> Self {
        let encode: DeltaFn<T> = Arc::new(move |obj: &T| match getter(obj) {
            Some(v) => codec.to_long(&v).map(Some),
            None => Ok(None),
        });
        Self::new(qualifier.into(), FieldKind::Delta(encode))
    }

    pub fn values<K: Ord + 'static, V: 'static>(
        prefix: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<BTreeMap<K, V>> + Send + Sync + 'static,
        codec: MapCodec<K, V>,
    ) -> Self {
        let encode: CellsFn<T> = Arc::new(move |obj: &T| match getter(obj) {
            Some(map) => codec.encode_map(&map),
            None => Ok(CellMap::new()),
        });
        Self::new(prefix.into(), FieldKind::PrefixGroup(GroupSource::Values(encode)))
    }

    /// Prefix group over already-encoded suffix → value bytes.
    pub fn raw_values(
        prefix: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<CellMap> + Send + Sync + 'static,
    ) -> Self {
        let encode: CellsFn<T> = Arc::new(move |obj: &T| Ok(getter(obj).unwrap_or_default()));
        Self::new(prefix.into(), FieldKind::PrefixGroup(GroupSource::Values(encode)))
    }

    pub fn deltas<K: Ord + 'static, V: 'static>(
        prefix: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<BTreeMap<K, V>> + Send + Sync + 'static,
        codec: CounterMapCodec<K, V>,
    ) -> Self {
        let encode: DeltasFn<T> = Arc::new(move |obj: &T| match getter(obj) {
            Some(map) => codec.encode_deltas(&map),
            None => Ok(DeltaMap::new()),
        });
        Self::new(prefix.into(), FieldKind::PrefixGroup(GroupSource::Deltas(encode)))
    }
}

impl<T> FieldSpec<T> {
    fn new(column: Vec<u8>, kind: FieldKind<T>) -> Self {
        Self {
            column,
            kind,
            timestamp: None,
        }
    }

    /// Attach the timestamp source captured at registration.
    pub fn with_timestamp(mut self, timestamp: Option<TimestampFn<T>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn column(&self) -> &[u8] {
        &self.column
    }

    pub fn kind(&self) -> &FieldKind<T> {
        &self.kind
    }

    pub fn timestamp(&self) -> Option<&TimestampFn<T>> {
        self.timestamp.as_ref()
    }

    pub fn is_prefix_group(&self) -> bool {
        matches!(self.kind, FieldKind::PrefixGroup(_))
    }

    /// Value cells of `obj`, keyed by full qualifier. Absent values
    /// contribute nothing.
    pub(crate) fn put_cells(&self, obj: &T, out: &mut CellMap) -> Result<(), CodecError> {
        let ctx = || format!("field {}", Printable(&self.column));
        match &self.kind {
            FieldKind::Value(encode) => {
                if let Some(bytes) = encode(obj).map_err(|e| e.with_context(ctx()))? {
                    out.insert(self.column.clone(), bytes);
                }
            }
            FieldKind::PrefixGroup(GroupSource::Values(encode)) => {
                for (suffix, bytes) in encode(obj).map_err(|e| e.with_context(ctx()))? {
                    out.insert(concat(&self.column, &suffix), bytes);
                }
            }
            FieldKind::Delta(_) | FieldKind::PrefixGroup(GroupSource::Deltas(_)) => {}
        }
        Ok(())
    }

    /// Increment cells of `obj`. A delta of exactly zero is absent.
    pub(crate) fn increment_cells(&self, obj: &T, out: &mut DeltaMap) -> Result<(), CodecError> {
        let ctx = || format!("field {}", Printable(&self.column));
        match &self.kind {
            FieldKind::Delta(encode) => {
                if let Some(delta) = encode(obj).map_err(|e| e.with_context(ctx()))? {
                    if delta != 0 {
                        out.insert(self.column.clone(), delta);
                    }
                }
            }
            FieldKind::PrefixGroup(GroupSource::Deltas(encode)) => {
                for (suffix, delta) in encode(obj).map_err(|e| e.with_context(ctx()))? {
                    if delta != 0 {
                        out.insert(concat(&self.column, &suffix), delta);
                    }
                }
            }
            FieldKind::Value(_) | FieldKind::PrefixGroup(GroupSource::Values(_)) => {}
        }
        Ok(())
    }
}
