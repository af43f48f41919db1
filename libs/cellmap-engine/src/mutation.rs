use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cellmap_api::{
    Cell, CellMap, Codec, CodecRegistry, CounterMapCodec, DeltaMap, Increment, LongCodec,
    MapCodec, Printable, Put, RowMutation,
};

use crate::config::SchemaOptions;
use crate::error::{EngineError, SchemaError};
use crate::field::{FieldSpec, TimestampFn};
use crate::layout::ColumnLayout;
use crate::row_key::{RowKeyFn, require_row_key, row_key_fn};
use crate::timestamp::TimestampTable;

/// Fluent builder for a [`MutationSchema`].
///
/// Each field captures the timestamp registered by the most recent
/// `with_timestamp` call at the moment it is added; later calls only affect
/// fields added after them. Errors from any call are held and reported by
/// `build()`.
pub struct MutationBuilder<'r, T> {
    registry: &'r CodecRegistry,
    layout: ColumnLayout,
    row_key: Option<RowKeyFn<T>>,
    row_timestamp: Option<TimestampFn<T>>,
    current_timestamp: Option<TimestampFn<T>>,
    fields: Vec<FieldSpec<T>>,
    error: Option<SchemaError>,
}

impl<'r, T: 'static> MutationBuilder<'r, T> {
    pub fn new(registry: &'r CodecRegistry) -> Self {
        Self::with_options(registry, SchemaOptions::default())
    }

    pub fn with_options(registry: &'r CodecRegistry, options: SchemaOptions) -> Self {
        Self {
            registry,
            layout: ColumnLayout::new(options.overlap),
            row_key: None,
            row_timestamp: None,
            current_timestamp: None,
            fields: Vec::new(),
            error: None,
        }
    }

    /// Row key from a typed getter, encoded with the registry's codec for `K`.
    pub fn with_row_key<K: 'static>(
        self,
        getter: impl Fn(&T) -> Option<K> + Send + Sync + 'static,
    ) -> Self {
        match self.registry.require::<K>() {
            Ok(codec) => self.with_row_key_as(getter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn with_row_key_as<K: 'static>(
        mut self,
        getter: impl Fn(&T) -> Option<K> + Send + Sync + 'static,
        codec: Arc<dyn Codec<K>>,
    ) -> Self {
        self.row_key = Some(row_key_fn(getter, codec));
        self
    }

    /// Row-level default timestamp, used by every cell whose field resolves
    /// no timestamp of its own.
    pub fn with_row_timestamp(
        mut self,
        timestamp: impl Fn(&T) -> Option<i64> + Send + Sync + 'static,
    ) -> Self {
        self.row_timestamp = Some(Arc::new(timestamp));
        self
    }

    /// Timestamp captured by every field added after this call.
    pub fn with_timestamp(
        mut self,
        timestamp: impl Fn(&T) -> Option<i64> + Send + Sync + 'static,
    ) -> Self {
        self.current_timestamp = Some(Arc::new(timestamp));
        self
    }

    /// Fields added after this call capture no timestamp.
    pub fn without_timestamp(mut self) -> Self {
        self.current_timestamp = None;
        self
    }

    pub fn with_value<V: 'static>(
        self,
        qualifier: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<V> + Send + Sync + 'static,
    ) -> Self {
        match self.registry.require::<V>() {
            Ok(codec) => self.with_value_as(qualifier, getter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn with_value_as<V: 'static>(
        self,
        qualifier: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<V> + Send + Sync + 'static,
        codec: Arc<dyn Codec<V>>,
    ) -> Self {
        self.with_field(FieldSpec::value(qualifier, getter, codec))
    }

    pub fn with_delta<V: 'static>(
        self,
        qualifier: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<V> + Send + Sync + 'static,
    ) -> Self {
        match self.registry.require_long::<V>() {
            Ok(codec) => self.with_delta_as(qualifier, getter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn with_delta_as<V: 'static>(
        self,
        qualifier: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<V> + Send + Sync + 'static,
        codec: Arc<dyn LongCodec<V>>,
    ) -> Self {
        self.with_field(FieldSpec::delta(qualifier, getter, codec))
    }

    /// Prefix group of value cells; map keys become qualifier suffixes.
    pub fn with_values<K: Ord + 'static, V: 'static>(
        self,
        prefix: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<BTreeMap<K, V>> + Send + Sync + 'static,
    ) -> Self {
        match self.registry.map_codec::<K, V>() {
            Ok(codec) => self.with_values_as(prefix, getter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn with_values_as<K: Ord + 'static, V: 'static>(
        self,
        prefix: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<BTreeMap<K, V>> + Send + Sync + 'static,
        codec: MapCodec<K, V>,
    ) -> Self {
        self.with_field(FieldSpec::values(prefix, getter, codec))
    }

    pub fn with_raw_values(
        self,
        prefix: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<CellMap> + Send + Sync + 'static,
    ) -> Self {
        self.with_field(FieldSpec::raw_values(prefix, getter))
    }

    /// Prefix group of increment cells.
    pub fn with_deltas<K: Ord + 'static, V: 'static>(
        self,
        prefix: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<BTreeMap<K, V>> + Send + Sync + 'static,
    ) -> Self {
        match self.registry.counter_map_codec::<K, V>() {
            Ok(codec) => self.with_deltas_as(prefix, getter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn with_deltas_as<K: Ord + 'static, V: 'static>(
        self,
        prefix: impl Into<Vec<u8>>,
        getter: impl Fn(&T) -> Option<BTreeMap<K, V>> + Send + Sync + 'static,
        codec: CounterMapCodec<K, V>,
    ) -> Self {
        self.with_field(FieldSpec::deltas(prefix, getter, codec))
    }

    /// Add a prepared field. A field without its own timestamp captures the
    /// current one.
    pub fn with_field(mut self, field: FieldSpec<T>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let added = if field.is_prefix_group() {
            if self.row_key.is_none() {
                return self.fail(SchemaError::OutOfOrder(
                    "row key must be registered before prefix groups",
                ));
            }
            self.layout.add_prefix(field.column())
        } else {
            self.layout.add_qualifier(field.column())
        };
        if let Err(e) = added {
            return self.fail(e);
        }
        let field = if field.timestamp().is_some() {
            field
        } else {
            let current = self.current_timestamp.clone();
            field.with_timestamp(current)
        };
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Result<MutationSchema<T>, SchemaError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let row_key = self
            .row_key
            .ok_or(SchemaError::Incomplete("no row key registered"))?;
        if self.fields.is_empty() {
            return Err(SchemaError::Incomplete("no value or delta field registered"));
        }
        let timestamps = TimestampTable::from_fields(self.row_timestamp, &self.fields);
        tracing::debug!(
            fields = self.fields.len(),
            qualifiers = self.layout.qualifiers().len(),
            "built mutation schema"
        );
        Ok(MutationSchema {
            row_key,
            qualifiers: self.layout.qualifiers().clone(),
            prefixes: self.layout.prefixes(),
            fields: self.fields,
            timestamps,
        })
    }

    fn fail(mut self, error: SchemaError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }
}

/// Immutable object → mutation mapping. Shareable across threads; every
/// call allocates its own output.
pub struct MutationSchema<T> {
    row_key: RowKeyFn<T>,
    fields: Vec<FieldSpec<T>>,
    timestamps: TimestampTable<T>,
    qualifiers: BTreeSet<Vec<u8>>,
    prefixes: BTreeSet<Vec<u8>>,
}

impl<T> std::fmt::Debug for MutationSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationSchema")
            .field("fields", &self.fields)
            .field("timestamps", &self.timestamps)
            .finish()
    }
}

impl<T> MutationSchema<T> {
    pub fn row_key(&self, obj: &T) -> Result<Vec<u8>, EngineError> {
        require_row_key(&self.row_key, obj)
    }

    pub fn fields(&self) -> &[FieldSpec<T>] {
        &self.fields
    }

    /// Fixed qualifiers of value and delta fields.
    pub fn qualifiers(&self) -> &BTreeSet<Vec<u8>> {
        &self.qualifiers
    }

    /// Prefixes of prefix-group fields.
    pub fn prefixes(&self) -> &BTreeSet<Vec<u8>> {
        &self.prefixes
    }

    pub fn resolve_timestamp(&self, qualifier: &[u8], obj: &T) -> Option<i64> {
        self.timestamps.resolve(qualifier, obj)
    }

    /// Value cells of `obj`. `Ok(None)` when no field contributed a cell.
    pub fn to_put_cells(&self, obj: &T) -> Result<Option<Put>, EngineError> {
        let row_key = self.row_key(obj)?;
        let mut values = CellMap::new();
        for field in &self.fields {
            let mut emitted = CellMap::new();
            field.put_cells(obj, &mut emitted)?;
            self.claim(field, emitted, &mut values)?;
        }
        if values.is_empty() {
            return Ok(None);
        }
        let cells = self.stamp(values, obj)?;
        tracing::trace!(row_key = ?Printable(&row_key), cells = cells.len(), "put cells");
        Ok(Some(Put { row_key, cells }))
    }

    /// Increment cells of `obj`; zero deltas are dropped. `Ok(None)` when no
    /// field contributed a cell.
    pub fn to_increment_cells(&self, obj: &T) -> Result<Option<Increment>, EngineError> {
        let row_key = self.row_key(obj)?;
        let mut deltas = DeltaMap::new();
        for field in &self.fields {
            let mut emitted = DeltaMap::new();
            field.increment_cells(obj, &mut emitted)?;
            self.claim(field, emitted, &mut deltas)?;
        }
        if deltas.is_empty() {
            return Ok(None);
        }
        let cells = self.stamp(deltas, obj)?;
        tracing::trace!(row_key = ?Printable(&row_key), cells = cells.len(), "increment cells");
        Ok(Some(Increment { row_key, cells }))
    }

    /// Puts and increments of `obj` as one row mutation.
    pub fn to_mutation(&self, obj: &T) -> Result<Option<RowMutation>, EngineError> {
        let put = self.to_put_cells(obj)?;
        let increment = self.to_increment_cells(obj)?;
        Ok(RowMutation::from_parts(put, increment))
    }

    /// One mutation per object that contributes cells, in input order.
    pub fn to_mutations<'a>(
        &self,
        objs: impl IntoIterator<Item = &'a T>,
    ) -> Result<Vec<RowMutation>, EngineError>
    where
        T: 'a,
    {
        let mut out = Vec::new();
        for obj in objs {
            if let Some(m) = self.to_mutation(obj)? {
                out.push(m);
            }
        }
        Ok(out)
    }

    /// Move the cells `field` emitted into `out`. Under nested prefixes a
    /// suffix can land on a qualifier owned by another column, which would
    /// overwrite that column's cell and parse back into the wrong field.
    fn claim<V>(
        &self,
        field: &FieldSpec<T>,
        emitted: BTreeMap<Vec<u8>, V>,
        out: &mut BTreeMap<Vec<u8>, V>,
    ) -> Result<(), EngineError> {
        for (qualifier, value) in emitted {
            if self.timestamps.owner(&qualifier) != Some(field.column()) {
                return Err(EngineError::AmbiguousCell {
                    qualifier,
                    column: field.column().to_vec(),
                });
            }
            out.insert(qualifier, value);
        }
        Ok(())
    }

    /// Attach a timestamp to every cell; any unresolvable cell rejects the
    /// whole set.
    fn stamp<V>(
        &self,
        cells: BTreeMap<Vec<u8>, V>,
        obj: &T,
    ) -> Result<BTreeMap<Vec<u8>, Cell<V>>, EngineError> {
        let mut out = BTreeMap::new();
        for (qualifier, value) in cells {
            let Some(timestamp) = self.timestamps.resolve(&qualifier, obj) else {
                return Err(EngineError::MissingTimestamp { qualifier });
            };
            out.insert(qualifier, Cell { value, timestamp });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlapPolicy;

    #[derive(Debug, Clone, Default)]
    struct User {
        id: Option<String>,
        name: Option<String>,
        tags: BTreeMap<String, String>,
        logins: i64,
        updated: i64,
    }

    fn ann() -> User {
        User {
            id: Some("u1".into()),
            name: Some("Ann".into()),
            tags: [("x", "1"), ("y", "2")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            logins: 0,
            updated: 100,
        }
    }

    fn schema(registry: &CodecRegistry) -> MutationSchema<User> {
        MutationBuilder::new(registry)
            .with_row_key(|u: &User| u.id.clone())
            .with_row_timestamp(|u: &User| Some(u.updated))
            .with_value("name", |u: &User| u.name.clone())
            .with_values("tag:", |u: &User| Some(u.tags.clone()))
            .with_delta("logins", |u: &User| Some(u.logins))
            .build()
            .unwrap()
    }

    #[test]
    fn put_cells_cover_values_and_groups() {
        let registry = CodecRegistry::with_defaults();
        let put = schema(&registry).to_put_cells(&ann()).unwrap().unwrap();
        assert_eq!(put.row_key, b"u1".to_vec());
        let cells: Vec<(Vec<u8>, Vec<u8>)> = put
            .cells
            .into_iter()
            .map(|(q, c)| (q, c.value))
            .collect();
        assert_eq!(
            cells,
            vec![
                (b"name".to_vec(), b"Ann".to_vec()),
                (b"tag:x".to_vec(), b"1".to_vec()),
                (b"tag:y".to_vec(), b"2".to_vec()),
            ]
        );
    }

    #[test]
    fn put_cells_are_deterministic() {
        let registry = CodecRegistry::with_defaults();
        let schema = schema(&registry);
        let user = ann();
        assert_eq!(
            schema.to_put_cells(&user).unwrap(),
            schema.to_put_cells(&user).unwrap()
        );
    }

    #[test]
    fn missing_row_key_fails_before_anything_else() {
        let registry = CodecRegistry::with_defaults();
        let user = User {
            id: None,
            ..ann()
        };
        assert!(matches!(
            schema(&registry).to_put_cells(&user),
            Err(EngineError::MissingRowKey)
        ));
    }

    #[test]
    fn no_cells_means_no_mutation() {
        let registry = CodecRegistry::with_defaults();
        let user = User {
            id: Some("u2".into()),
            ..User::default()
        };
        let schema = schema(&registry);
        assert_eq!(schema.to_put_cells(&user).unwrap(), None);
        assert_eq!(schema.to_increment_cells(&user).unwrap(), None);
        assert_eq!(schema.to_mutation(&user).unwrap(), None);
    }

    #[test]
    fn increments_suppress_zero_and_keep_negative() {
        let registry = CodecRegistry::with_defaults();
        let schema = schema(&registry);
        assert_eq!(schema.to_increment_cells(&ann()).unwrap(), None);

        let user = User { logins: -1, ..ann() };
        let inc = schema.to_increment_cells(&user).unwrap().unwrap();
        assert_eq!(inc.cells.len(), 1);
        assert_eq!(inc.cells[&b"logins".to_vec()], Cell { value: -1, timestamp: 100 });
    }

    #[test]
    fn timestamps_are_snapshotted_at_registration() {
        let registry = CodecRegistry::with_defaults();
        let schema = MutationBuilder::new(&registry)
            .with_row_key(|u: &User| u.id.clone())
            .with_row_timestamp(|_: &User| Some(0))
            .with_value("name", |u: &User| u.name.clone())
            .with_timestamp(|_: &User| Some(5))
            .with_values("tag:", |u: &User| Some(u.tags.clone()))
            .build()
            .unwrap();

        let put = schema.to_put_cells(&ann()).unwrap().unwrap();
        assert_eq!(put.cells[&b"name".to_vec()].timestamp, 0);
        assert_eq!(put.cells[&b"tag:x".to_vec()].timestamp, 5);
    }

    #[test]
    fn nested_prefix_timestamps_resolve_to_the_longest() {
        let registry = CodecRegistry::with_defaults();
        let options = SchemaOptions {
            overlap: OverlapPolicy::LongestPrefix,
            ..SchemaOptions::default()
        };
        let schema = MutationBuilder::with_options(&registry, options)
            .with_row_key(|u: &User| u.id.clone())
            .with_row_timestamp(|_: &User| Some(0))
            .with_timestamp(|_: &User| Some(1))
            .with_values("a", |u: &User| Some(u.tags.clone()))
            .with_timestamp(|_: &User| Some(2))
            .with_values("ab", |u: &User| Some(u.tags.clone()))
            .build()
            .unwrap();

        let user = ann();
        assert_eq!(schema.resolve_timestamp(b"ab1", &user), Some(2));
        assert_eq!(schema.resolve_timestamp(b"ac", &user), Some(1));
        assert_eq!(schema.resolve_timestamp(b"b", &user), Some(0));
    }

    fn nested(registry: &CodecRegistry) -> MutationBuilder<'_, User> {
        let options = SchemaOptions {
            overlap: OverlapPolicy::LongestPrefix,
            ..SchemaOptions::default()
        };
        MutationBuilder::with_options(registry, options)
            .with_row_key(|u: &User| u.id.clone())
            .with_row_timestamp(|_: &User| Some(0))
    }

    fn raw(entries: &[(&str, &str)]) -> CellMap {
        entries
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn nested_groups_reject_colliding_suffixes() {
        let registry = CodecRegistry::with_defaults();
        let schema = nested(&registry)
            .with_raw_values("a", |_: &User| Some(raw(&[("b1", "outer")])))
            .with_raw_values("ab", |_: &User| Some(raw(&[("1", "inner")])))
            .build()
            .unwrap();

        match schema.to_put_cells(&ann()) {
            Err(EngineError::AmbiguousCell { qualifier, column }) => {
                assert_eq!(qualifier, b"ab1".to_vec());
                assert_eq!(column, b"a".to_vec());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_groups_keep_disjoint_suffixes() {
        let registry = CodecRegistry::with_defaults();
        let schema = nested(&registry)
            .with_raw_values("a", |_: &User| Some(raw(&[("c", "outer")])))
            .with_raw_values("ab", |_: &User| Some(raw(&[("1", "inner")])))
            .build()
            .unwrap();

        let put = schema.to_put_cells(&ann()).unwrap().unwrap();
        let qualifiers: Vec<Vec<u8>> = put.cells.keys().cloned().collect();
        assert_eq!(qualifiers, vec![b"ab1".to_vec(), b"ac".to_vec()]);
    }

    #[test]
    fn group_suffix_cannot_shadow_a_fixed_qualifier() {
        let registry = CodecRegistry::with_defaults();
        let schema = nested(&registry)
            .with_timestamp(|_: &User| Some(1))
            .with_raw_values("a", |u: &User| u.name.as_ref().map(|n| raw(&[(n.as_str(), "v")])))
            .with_timestamp(|_: &User| Some(2))
            .with_value("ab", |_: &User| Some("fixed".to_string()))
            .build()
            .unwrap();

        let mut user = ann();
        user.name = Some("b".into());
        assert!(matches!(
            schema.to_put_cells(&user),
            Err(EngineError::AmbiguousCell { qualifier, .. }) if qualifier == b"ab"
        ));

        user.name = Some("bx".into());
        let put = schema.to_put_cells(&user).unwrap().unwrap();
        assert_eq!(put.cells[&b"ab".to_vec()].timestamp, 2);
        assert_eq!(put.cells[&b"abx".to_vec()].timestamp, 1);
    }

    #[test]
    fn nested_delta_groups_reject_colliding_suffixes() {
        let registry = CodecRegistry::with_defaults();
        let schema = nested(&registry)
            .with_deltas("a", |_: &User| Some(BTreeMap::from([("b1".to_string(), 1i64)])))
            .with_deltas("ab", |_: &User| Some(BTreeMap::from([("1".to_string(), 2i64)])))
            .build()
            .unwrap();

        assert!(matches!(
            schema.to_increment_cells(&ann()),
            Err(EngineError::AmbiguousCell { qualifier, .. }) if qualifier == b"ab1"
        ));
    }

    #[test]
    fn missing_timestamp_rejects_the_mutation() {
        let registry = CodecRegistry::with_defaults();
        let schema = MutationBuilder::new(&registry)
            .with_row_key(|u: &User| u.id.clone())
            .with_timestamp(|u: &User| Some(u.updated))
            .with_value("name", |u: &User| u.name.clone())
            .without_timestamp()
            .with_values("tag:", |u: &User| Some(u.tags.clone()))
            .build()
            .unwrap();

        match schema.to_put_cells(&ann()) {
            Err(EngineError::MissingTimestamp { qualifier }) => assert_eq!(qualifier, b"tag:x".to_vec()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn build_requires_row_key_and_fields() {
        let registry = CodecRegistry::with_defaults();
        let err = MutationBuilder::<User>::new(&registry)
            .with_value("name", |u: &User| u.name.clone())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::Incomplete("no row key registered"));

        let err = MutationBuilder::<User>::new(&registry)
            .with_row_key(|u: &User| u.id.clone())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::Incomplete("no value or delta field registered"));
    }

    #[test]
    fn prefix_groups_need_the_row_key_first() {
        let registry = CodecRegistry::with_defaults();
        let err = MutationBuilder::<User>::new(&registry)
            .with_values("tag:", |u: &User| Some(u.tags.clone()))
            .with_row_key(|u: &User| u.id.clone())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::OutOfOrder(_)));
    }

    #[test]
    fn overlapping_columns_fail_the_build() {
        let registry = CodecRegistry::with_defaults();
        let err = MutationBuilder::<User>::new(&registry)
            .with_row_key(|u: &User| u.id.clone())
            .with_values("tag:", |u: &User| Some(u.tags.clone()))
            .with_value("tag:main", |u: &User| u.name.clone())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::Ambiguous { .. }));
    }

    #[test]
    fn unregistered_type_fails_the_build() {
        let registry = CodecRegistry::new();
        let err = MutationBuilder::<User>::new(&registry)
            .with_row_key(|u: &User| u.id.clone())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingCodec(_)));
    }
}
