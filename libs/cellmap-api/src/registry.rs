use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::codec::{BoolCodec, BytesCodec, Codec, I64Codec, LongCodec, Utf8Codec};
use crate::map::{CounterMapCodec, MapCodec};
use crate::time::{DurationCodec, InstantCodec};

/// Default codecs keyed by Rust type.
///
/// An explicit value handed to every schema builder; there is no
/// process-wide default. Builders look codecs up once, at registration,
/// so a registry may be dropped or changed after `build()` without
/// affecting built schemas.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    long_codecs: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.codecs.len())
            .field("long_codecs", &self.long_codecs.len())
            .finish()
    }
}

impl CodecRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in codecs: `Vec<u8>`, `String`, `i64`,
    /// `bool`, `DateTime<Utc>`, `TimeDelta`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register::<Vec<u8>>(Arc::new(BytesCodec))
            .register::<String>(Arc::new(Utf8Codec))
            .register::<i64>(Arc::new(I64Codec))
            .register::<bool>(Arc::new(BoolCodec))
            .register::<DateTime<Utc>>(Arc::new(InstantCodec))
            .register::<TimeDelta>(Arc::new(DurationCodec))
            .register_long::<i64>(Arc::new(I64Codec))
            .register_long::<bool>(Arc::new(BoolCodec))
            .register_long::<DateTime<Utc>>(Arc::new(InstantCodec))
            .register_long::<TimeDelta>(Arc::new(DurationCodec));
        registry
    }

    /// Register (or replace) the byte codec for `T`.
    pub fn register<T: 'static>(&mut self, codec: Arc<dyn Codec<T>>) -> &mut Self {
        self.codecs.insert(TypeId::of::<T>(), Box::new(codec));
        self
    }

    /// Register (or replace) the long codec for `T`.
    pub fn register_long<T: 'static>(&mut self, codec: Arc<dyn LongCodec<T>>) -> &mut Self {
        self.long_codecs.insert(TypeId::of::<T>(), Box::new(codec));
        self
    }

    pub fn codec<T: 'static>(&self) -> Option<Arc<dyn Codec<T>>> {
        self.codecs
            .get(&TypeId::of::<T>())
            .and_then(|c| c.downcast_ref::<Arc<dyn Codec<T>>>())
            .cloned()
    }

    pub fn long_codec<T: 'static>(&self) -> Option<Arc<dyn LongCodec<T>>> {
        self.long_codecs
            .get(&TypeId::of::<T>())
            .and_then(|c| c.downcast_ref::<Arc<dyn LongCodec<T>>>())
            .cloned()
    }

    /// Map codec assembled from the registered key and value codecs.
    pub fn map_codec<K: Ord + 'static, V: 'static>(&self) -> Result<MapCodec<K, V>, MissingCodec> {
        Ok(MapCodec::new(self.require::<K>()?, self.require::<V>()?))
    }

    /// Counter map codec assembled from the registered key codec and value
    /// long codec.
    pub fn counter_map_codec<K: Ord + 'static, V: 'static>(
        &self,
    ) -> Result<CounterMapCodec<K, V>, MissingCodec> {
        Ok(CounterMapCodec::new(self.require::<K>()?, self.require_long::<V>()?))
    }

    pub fn require<T: 'static>(&self) -> Result<Arc<dyn Codec<T>>, MissingCodec> {
        self.codec::<T>().ok_or(MissingCodec {
            type_name: type_name::<T>(),
            long: false,
        })
    }

    pub fn require_long<T: 'static>(&self) -> Result<Arc<dyn LongCodec<T>>, MissingCodec> {
        self.long_codec::<T>().ok_or(MissingCodec {
            type_name: type_name::<T>(),
            long: true,
        })
    }
}

/// No codec registered for the requested type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingCodec {
    pub type_name: &'static str,
    /// `true` when a `LongCodec` was requested.
    pub long: bool,
}

impl std::fmt::Display for MissingCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.long { "long codec" } else { "codec" };
        write!(f, "no {kind} registered for {}", self.type_name)
    }
}

impl std::error::Error for MissingCodec {}
