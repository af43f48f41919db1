use std::sync::Arc;

use cellmap_api::{Codec, CodecError};

use crate::error::EngineError;

/// Object → row key. `Ok(None)` means the object has no key.
pub(crate) type RowKeyFn<T> =
    Arc<dyn Fn(&T) -> Result<Option<Vec<u8>>, CodecError> + Send + Sync>;

pub(crate) fn row_key_fn<T: 'static, K: 'static>(
    getter: impl Fn(&T) -> Option<K> + Send + Sync + 'static,
    codec: Arc<dyn Codec<K>>,
) -> RowKeyFn<T> {
    Arc::new(move |obj: &T| match getter(obj) {
        Some(key) => codec.encode(&key).map(Some),
        None => Ok(None),
    })
}

/// Evaluate a row key generator; an absent key fails the operation.
pub(crate) fn require_row_key<T>(row_key: &RowKeyFn<T>, obj: &T) -> Result<Vec<u8>, EngineError> {
    row_key(obj)
        .map_err(|e| EngineError::Codec(e.with_context("row key")))?
        .ok_or(EngineError::MissingRowKey)
}
