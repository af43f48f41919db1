use cellmap_api::{CodecError, MissingCodec, Printable, StoreError};

/// Schema construction failure. Raised only by `build()`; a schema that
/// fails to build is never partially usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema incomplete: {0}")]
    Incomplete(&'static str),

    #[error("ambiguous columns {} and {}", Printable(.first), Printable(.second))]
    Ambiguous { first: Vec<u8>, second: Vec<u8> },

    #[error("column {} registered twice", Printable(.0))]
    Duplicate(Vec<u8>),

    #[error("{0}")]
    OutOfOrder(&'static str),

    #[error(transparent)]
    MissingCodec(#[from] MissingCodec),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("row key generator returned no key")]
    MissingRowKey,

    #[error("no timestamp resolvable for cell {}", Printable(.qualifier))]
    MissingTimestamp { qualifier: Vec<u8> },

    #[error("cannot decode cell {}: {source}", Printable(.qualifier))]
    Decode {
        qualifier: Vec<u8>,
        #[source]
        source: CodecError,
    },

    #[error("unmapped cell {}", Printable(.qualifier))]
    UnknownCell { qualifier: Vec<u8> },

    #[error(
        "cell {} written by column {} belongs to another column",
        Printable(.qualifier),
        Printable(.column)
    )]
    AmbiguousCell { qualifier: Vec<u8>, column: Vec<u8> },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// For `Codec` and `Store` variants, context is added to the inner error.
    /// For message variants, context is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Codec(e) => EngineError::Codec(e.with_context(ctx)),
            EngineError::Store(e) => EngineError::Store(e.with_context(ctx)),
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            EngineError::TableNotFound(msg) => EngineError::TableNotFound(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
