use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bytes::{CellMap, DeltaMap, Printable};
use crate::codec::{Codec, LongCodec, Utf8Codec, decode_i64};
use crate::error::CodecError;

/// One entry of a byte map that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryError {
    /// Raw key (qualifier suffix) of the failing entry.
    pub key: Vec<u8>,
    pub source: CodecError,
}

/// Typed map ↔ byte map, one key codec and one value codec.
///
/// Backs prefix groups: keys are qualifier suffixes, values are cell
/// values. `MapCodec::strings()` is the string → string map codec.
pub struct MapCodec<K, V> {
    keys: Arc<dyn Codec<K>>,
    values: Arc<dyn Codec<V>>,
}

impl<K, V> Clone for MapCodec<K, V> {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
            values: Arc::clone(&self.values),
        }
    }
}

impl<K, V> std::fmt::Debug for MapCodec<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapCodec")
            .field("keys", &self.keys.name())
            .field("values", &self.values.name())
            .finish()
    }
}

impl MapCodec<String, String> {
    pub fn strings() -> Self {
        Self::new(Arc::new(Utf8Codec), Arc::new(Utf8Codec))
    }
}

impl<K: Ord, V> MapCodec<K, V> {
    pub fn new(keys: Arc<dyn Codec<K>>, values: Arc<dyn Codec<V>>) -> Self {
        Self { keys, values }
    }

    pub fn encode_map(&self, map: &BTreeMap<K, V>) -> Result<CellMap, CodecError> {
        let mut cells = CellMap::new();
        for (key, value) in map {
            let key = self.keys.encode(key)?;
            let value = self
                .values
                .encode(value)
                .map_err(|e| e.with_context(format!("entry {:?}", Printable(&key))))?;
            cells.insert(key, value);
        }
        Ok(cells)
    }

    /// Strict decode: the first malformed entry fails the whole map.
    pub fn decode_map(&self, cells: &CellMap) -> Result<BTreeMap<K, V>, EntryError> {
        let mut map = BTreeMap::new();
        for (key, value) in cells {
            let entry = self.decode_entry(key, value)?;
            map.insert(entry.0, entry.1);
        }
        Ok(map)
    }

    /// Lenient decode: malformed entries are returned beside the map.
    pub fn decode_map_lossy(&self, cells: &CellMap) -> (BTreeMap<K, V>, Vec<EntryError>) {
        let mut map = BTreeMap::new();
        let mut failed = Vec::new();
        for (key, value) in cells {
            match self.decode_entry(key, value) {
                Ok((k, v)) => {
                    map.insert(k, v);
                }
                Err(e) => failed.push(e),
            }
        }
        (map, failed)
    }

    fn decode_entry(&self, key: &[u8], value: &[u8]) -> Result<(K, V), EntryError> {
        let fail = |source: CodecError| EntryError {
            key: key.to_vec(),
            source,
        };
        let k = self.keys.decode(key).map_err(fail)?;
        let v = self.values.decode(value).map_err(fail)?;
        Ok((k, v))
    }
}

/// Typed map ↔ counter cells: keys through a `Codec`, values through a
/// `LongCodec`, stored as 8-byte big-endian integers.
pub struct CounterMapCodec<K, V> {
    keys: Arc<dyn Codec<K>>,
    values: Arc<dyn LongCodec<V>>,
}

impl<K, V> Clone for CounterMapCodec<K, V> {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
            values: Arc::clone(&self.values),
        }
    }
}

impl<K, V> std::fmt::Debug for CounterMapCodec<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterMapCodec")
            .field("keys", &self.keys.name())
            .field("values", &self.values.name())
            .finish()
    }
}

impl<K: Ord, V> CounterMapCodec<K, V> {
    pub fn new(keys: Arc<dyn Codec<K>>, values: Arc<dyn LongCodec<V>>) -> Self {
        Self { keys, values }
    }

    pub fn encode_deltas(&self, map: &BTreeMap<K, V>) -> Result<DeltaMap, CodecError> {
        let mut deltas = DeltaMap::new();
        for (key, value) in map {
            deltas.insert(self.keys.encode(key)?, self.values.to_long(value)?);
        }
        Ok(deltas)
    }

    pub fn decode_counters(&self, cells: &CellMap) -> Result<BTreeMap<K, V>, EntryError> {
        let mut map = BTreeMap::new();
        for (key, value) in cells {
            let (k, v) = self.decode_entry(key, value)?;
            map.insert(k, v);
        }
        Ok(map)
    }

    pub fn decode_counters_lossy(&self, cells: &CellMap) -> (BTreeMap<K, V>, Vec<EntryError>) {
        let mut map = BTreeMap::new();
        let mut failed = Vec::new();
        for (key, value) in cells {
            match self.decode_entry(key, value) {
                Ok((k, v)) => {
                    map.insert(k, v);
                }
                Err(e) => failed.push(e),
            }
        }
        (map, failed)
    }

    fn decode_entry(&self, key: &[u8], value: &[u8]) -> Result<(K, V), EntryError> {
        let fail = |source: CodecError| EntryError {
            key: key.to_vec(),
            source,
        };
        let k = self.keys.decode(key).map_err(fail)?;
        let raw = decode_i64("counter", value).map_err(fail)?;
        let v = self.values.from_long(raw).map_err(fail)?;
        Ok((k, v))
    }
}
