use std::collections::BTreeSet;
use std::sync::Arc;

use cellmap_api::{
    Codec, CodecRegistry, ColumnPrefixFilter, ColumnSelection, Get, Printable, Scan, ScanRange,
};

use crate::config::SchemaOptions;
use crate::error::{EngineError, SchemaError};
use crate::layout::ColumnLayout;
use crate::result::ResultSchema;
use crate::row_key::{RowKeyFn, require_row_key, row_key_fn};

/// Fluent builder for a [`QuerySchema`] over query objects `Q`.
pub struct QueryBuilder<'r, Q> {
    registry: &'r CodecRegistry,
    layout: ColumnLayout,
    row_key: Option<RowKeyFn<Q>>,
    scan_key_size: Option<usize>,
    error: Option<SchemaError>,
}

impl<'r, Q: 'static> QueryBuilder<'r, Q> {
    pub fn new(registry: &'r CodecRegistry) -> Self {
        Self::with_options(registry, SchemaOptions::default())
    }

    pub fn with_options(registry: &'r CodecRegistry, options: SchemaOptions) -> Self {
        Self {
            registry,
            layout: ColumnLayout::new(options.overlap),
            row_key: None,
            scan_key_size: None,
            error: None,
        }
    }

    pub fn with_row_key<K: 'static>(
        self,
        getter: impl Fn(&Q) -> Option<K> + Send + Sync + 'static,
    ) -> Self {
        match self.registry.require::<K>() {
            Ok(codec) => self.with_row_key_as(getter, codec),
            Err(e) => self.fail(e.into()),
        }
    }

    pub fn with_row_key_as<K: 'static>(
        mut self,
        getter: impl Fn(&Q) -> Option<K> + Send + Sync + 'static,
        codec: Arc<dyn Codec<K>>,
    ) -> Self {
        self.row_key = Some(row_key_fn(getter, codec));
        self
    }

    /// Fetch one fixed qualifier.
    pub fn with_column(mut self, qualifier: impl Into<Vec<u8>>) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.layout.add_qualifier(&qualifier.into()) {
                return self.fail(e);
            }
        }
        self
    }

    pub fn with_columns<I>(self, qualifiers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Vec<u8>>,
    {
        qualifiers.into_iter().fold(self, |b, q| b.with_column(q))
    }

    /// Fetch every qualifier starting with `prefix`. Widens the selection to
    /// the whole family.
    pub fn with_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.layout.add_prefix(&prefix.into()) {
                return self.fail(e);
            }
        }
        self
    }

    /// Scan every row sharing the first `size` bytes of the query's row key.
    pub fn with_scan_key_size(mut self, size: usize) -> Self {
        self.scan_key_size = Some(size);
        self
    }

    /// Fetch exactly what `schema` can parse.
    pub fn with_columns_of<T>(self, schema: &ResultSchema<T>) -> Self {
        let qualifiers: Vec<Vec<u8>> = schema.qualifiers().iter().cloned().collect();
        let prefixes: Vec<Vec<u8>> = schema.prefixes().iter().cloned().collect();
        let with_qualifiers = self.with_columns(qualifiers);
        prefixes.into_iter().fold(with_qualifiers, |b, p| b.with_prefix(p))
    }

    pub fn build(self) -> Result<QuerySchema<Q>, SchemaError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let row_key = self
            .row_key
            .ok_or(SchemaError::Incomplete("no row key registered"))?;
        let prefixes = self.layout.prefixes();
        let filter = (!prefixes.is_empty()).then(|| ColumnPrefixFilter {
            prefixes: prefixes.clone(),
            qualifiers: self.layout.qualifiers().clone(),
        });
        tracing::debug!(
            qualifiers = self.layout.qualifiers().len(),
            prefixes = prefixes.len(),
            scan_key_size = ?self.scan_key_size,
            "built query schema"
        );
        Ok(QuerySchema {
            row_key,
            qualifiers: self.layout.qualifiers().clone(),
            prefixes,
            filter,
            scan_key_size: self.scan_key_size,
        })
    }

    fn fail(mut self, error: SchemaError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }
}

/// Immutable query object → store request mapping.
pub struct QuerySchema<Q> {
    row_key: RowKeyFn<Q>,
    qualifiers: BTreeSet<Vec<u8>>,
    prefixes: BTreeSet<Vec<u8>>,
    filter: Option<ColumnPrefixFilter>,
    scan_key_size: Option<usize>,
}

impl<Q> std::fmt::Debug for QuerySchema<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySchema")
            .field("qualifiers", &self.qualifiers.iter().map(|q| Printable(q)).collect::<Vec<_>>())
            .field("prefixes", &self.prefixes.iter().map(|p| Printable(p)).collect::<Vec<_>>())
            .field("scan_key_size", &self.scan_key_size)
            .finish()
    }
}

impl<Q> QuerySchema<Q> {
    pub fn to_row_key(&self, query: &Q) -> Result<Vec<u8>, EngineError> {
        require_row_key(&self.row_key, query)
    }

    /// Exactly the fixed qualifiers when no prefix is registered (possibly
    /// none at all), otherwise the whole family.
    pub fn select_columns(&self) -> ColumnSelection {
        if self.prefixes.is_empty() {
            ColumnSelection::Qualifiers(self.qualifiers.clone())
        } else {
            ColumnSelection::Family
        }
    }

    /// Filter over every registered prefix, keeping the fixed qualifiers
    /// too; `None` without prefixes.
    pub fn to_filter(&self) -> Option<ColumnPrefixFilter> {
        self.filter.clone()
    }

    pub fn scan_key_size(&self) -> Option<usize> {
        self.scan_key_size
    }

    /// Prefix range over the first `scan_key_size` bytes of the row key, or
    /// the single row when no size is configured. A size beyond the key's
    /// length uses the whole key as the prefix.
    pub fn to_scan_range(&self, query: &Q) -> Result<ScanRange, EngineError> {
        let row_key = self.to_row_key(query)?;
        Ok(match self.scan_key_size {
            Some(size) => ScanRange::prefix(&row_key[..size.min(row_key.len())]),
            None => ScanRange::single_row(&row_key),
        })
    }

    /// One range per query, in input order; overlapping ranges are kept.
    pub fn to_scan_ranges<'a>(
        &self,
        queries: impl IntoIterator<Item = &'a Q>,
    ) -> Result<Vec<ScanRange>, EngineError>
    where
        Q: 'a,
    {
        queries.into_iter().map(|q| self.to_scan_range(q)).collect()
    }

    pub fn to_get(&self, query: &Q) -> Result<Get, EngineError> {
        Ok(Get {
            row_key: self.to_row_key(query)?,
            selection: self.select_columns(),
            filter: self.to_filter(),
        })
    }

    pub fn to_scan(&self, query: &Q) -> Result<Scan, EngineError> {
        Ok(Scan {
            range: self.to_scan_range(query)?,
            selection: self.select_columns(),
            filter: self.to_filter(),
        })
    }

    pub fn to_scans<'a>(
        &self,
        queries: impl IntoIterator<Item = &'a Q>,
    ) -> Result<Vec<Scan>, EngineError>
    where
        Q: 'a,
    {
        queries.into_iter().map(|q| self.to_scan(q)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ByKey(Option<String>);

    fn key_of(q: &ByKey) -> Option<String> {
        q.0.clone()
    }

    #[test]
    fn fixed_qualifiers_are_selected_exactly() {
        let registry = CodecRegistry::with_defaults();
        let schema = QueryBuilder::new(&registry)
            .with_row_key(key_of)
            .with_columns(["name", "age"])
            .build()
            .unwrap();

        assert_eq!(
            schema.select_columns(),
            ColumnSelection::Qualifiers([b"age".to_vec(), b"name".to_vec()].into())
        );
        assert_eq!(schema.to_filter(), None);
    }

    #[test]
    fn row_key_only_schema_selects_nothing() {
        let registry = CodecRegistry::with_defaults();
        let schema = QueryBuilder::new(&registry).with_row_key(key_of).build().unwrap();
        assert_eq!(schema.select_columns(), ColumnSelection::Qualifiers(BTreeSet::new()));
    }

    #[test]
    fn prefixes_widen_to_the_family_and_filter() {
        let registry = CodecRegistry::with_defaults();
        let schema = QueryBuilder::new(&registry)
            .with_row_key(key_of)
            .with_column("name")
            .with_prefix("tag:")
            .build()
            .unwrap();

        let get = schema.to_get(&ByKey(Some("u1".into()))).unwrap();
        assert_eq!(get.row_key, b"u1".to_vec());
        assert_eq!(get.selection, ColumnSelection::Family);
        assert_eq!(
            get.filter,
            Some(ColumnPrefixFilter {
                prefixes: [b"tag:".to_vec()].into(),
                qualifiers: [b"name".to_vec()].into(),
            })
        );
    }

    #[test]
    fn scan_key_size_slices_the_row_key() {
        let registry = CodecRegistry::with_defaults();
        let schema = QueryBuilder::new(&registry)
            .with_row_key(key_of)
            .with_scan_key_size(2)
            .build()
            .unwrap();

        let range = schema.to_scan_range(&ByKey(Some("u1-2024".into()))).unwrap();
        assert_eq!(range.start, b"u1".to_vec());
        assert_eq!(range.stop, Some(b"u2".to_vec()));

        // shorter than the size: whole key is the prefix
        let range = schema.to_scan_range(&ByKey(Some("u".into()))).unwrap();
        assert_eq!(range, ScanRange::prefix(b"u"));
    }

    #[test]
    fn without_scan_key_size_the_range_is_one_row() {
        let registry = CodecRegistry::with_defaults();
        let schema = QueryBuilder::new(&registry).with_row_key(key_of).build().unwrap();
        let range = schema.to_scan_range(&ByKey(Some("u1".into()))).unwrap();
        assert_eq!(range, ScanRange::single_row(b"u1"));
    }

    #[test]
    fn batched_ranges_are_not_merged() {
        let registry = CodecRegistry::with_defaults();
        let schema = QueryBuilder::new(&registry)
            .with_row_key(key_of)
            .with_scan_key_size(2)
            .build()
            .unwrap();

        let queries = [ByKey(Some("u1-a".into())), ByKey(Some("u1-b".into()))];
        let ranges = schema.to_scan_ranges(&queries).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0], ranges[1]);
    }

    #[test]
    fn absent_row_key_fails_every_operation() {
        let registry = CodecRegistry::with_defaults();
        let schema = QueryBuilder::new(&registry).with_row_key(key_of).build().unwrap();
        let missing = ByKey(None);
        assert!(matches!(schema.to_row_key(&missing), Err(EngineError::MissingRowKey)));
        assert!(matches!(schema.to_get(&missing), Err(EngineError::MissingRowKey)));
        assert!(matches!(
            schema.to_scans(&[ByKey(Some("a".into())), missing]),
            Err(EngineError::MissingRowKey)
        ));
    }

    #[test]
    fn build_without_row_key_fails() {
        let registry = CodecRegistry::with_defaults();
        let err = QueryBuilder::<ByKey>::new(&registry).with_column("name").build().unwrap_err();
        assert_eq!(err, SchemaError::Incomplete("no row key registered"));
    }
}
