use std::collections::BTreeSet;

use cellmap_api::PrefixTable;
use cellmap_api::bytes::is_prefix_of;

use crate::config::OverlapPolicy;
use crate::error::SchemaError;

/// Registered fixed qualifiers and prefixes of one schema, validated as
/// they are added.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnLayout {
    qualifiers: BTreeSet<Vec<u8>>,
    prefixes: PrefixTable<()>,
    overlap: OverlapPolicy,
}

impl ColumnLayout {
    pub(crate) fn new(overlap: OverlapPolicy) -> Self {
        Self {
            overlap,
            ..Self::default()
        }
    }

    pub(crate) fn add_qualifier(&mut self, qualifier: &[u8]) -> Result<(), SchemaError> {
        if self.qualifiers.contains(qualifier) {
            return Err(SchemaError::Duplicate(qualifier.to_vec()));
        }
        if self.overlap == OverlapPolicy::Reject {
            if let Some((prefix, _)) = self.prefixes.longest_match(qualifier) {
                return Err(SchemaError::Ambiguous {
                    first: prefix.to_vec(),
                    second: qualifier.to_vec(),
                });
            }
        }
        self.qualifiers.insert(qualifier.to_vec());
        Ok(())
    }

    pub(crate) fn add_prefix(&mut self, prefix: &[u8]) -> Result<(), SchemaError> {
        if self.prefixes.contains(prefix) {
            return Err(SchemaError::Duplicate(prefix.to_vec()));
        }
        if self.overlap == OverlapPolicy::Reject {
            if let Some((outer, _)) = self.prefixes.longest_match(prefix) {
                return Err(SchemaError::Ambiguous {
                    first: outer.to_vec(),
                    second: prefix.to_vec(),
                });
            }
            if let Some(inner) = self.prefixes.first_extension(prefix) {
                return Err(SchemaError::Ambiguous {
                    first: prefix.to_vec(),
                    second: inner.to_vec(),
                });
            }
            if let Some(qualifier) = self
                .qualifiers
                .range(prefix.to_vec()..)
                .next()
                .filter(|q| is_prefix_of(prefix, q))
            {
                return Err(SchemaError::Ambiguous {
                    first: prefix.to_vec(),
                    second: qualifier.clone(),
                });
            }
        }
        self.prefixes.insert(prefix.to_vec(), ());
        Ok(())
    }

    pub(crate) fn qualifiers(&self) -> &BTreeSet<Vec<u8>> {
        &self.qualifiers
    }

    pub(crate) fn prefixes(&self) -> BTreeSet<Vec<u8>> {
        self.prefixes.keys().map(<[u8]>::to_vec).collect()
    }
}
