pub mod bytes;
pub mod codec;
pub mod error;
pub mod json;
pub mod map;
pub mod registry;
pub mod request;
pub mod store;
pub mod time;

pub use bytes::{CellMap, DeltaMap, PrefixTable, Printable};
pub use codec::{BoolCodec, BytesCodec, Codec, I64Codec, LongCodec, Utf8Codec};
pub use error::{CodecError, ErrorKind, StoreError, StoreErrorKind};
pub use json::JsonCodec;
pub use map::{CounterMapCodec, EntryError, MapCodec};
pub use registry::{CodecRegistry, MissingCodec};
pub use request::{
    Cell, ColumnPrefixFilter, ColumnSelection, Get, Increment, Put, RowMutation, RowResult, Scan,
    ScanRange,
};
pub use store::{CellStore, StoreFactory};
pub use time::{DurationCodec, InstantCodec};
