pub mod config;
pub mod error;
pub mod field;
mod layout;
pub mod mutation;
pub mod query;
pub mod result;
mod row_key;
pub mod table;
pub mod timestamp;

pub use config::{
    ConfigParser, DecodeErrorPolicy, EngineConfig, OverlapPolicy, SchemaOptions, TableConfig,
    TomlParser, UnknownCellPolicy,
};
pub use error::{EngineError, SchemaError};
pub use field::{FieldKind, FieldSpec, GroupSource, TimestampFn};
pub use mutation::{MutationBuilder, MutationSchema};
pub use query::{QueryBuilder, QuerySchema};
pub use result::{Parsed, ResultBuilder, ResultSchema};
pub use table::{MappedTable, TableRegistry};
pub use timestamp::TimestampTable;
