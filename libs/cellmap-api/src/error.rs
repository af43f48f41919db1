use std::fmt;

/// Error kind for codec failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fixed-width value with the wrong number of bytes.
    Length,
    Utf8,
    /// Unparsable text form (ISO-8601 instant or duration).
    Format,
    Json,
    /// Well-formed input whose value is outside the legal range.
    Range,
}

/// Error returned by every `Codec` / `LongCodec` method.
///
/// Raised on malformed input instead of producing a silently wrong value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CodecError {
    pub fn length(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Length, message: msg.into() }
    }

    pub fn utf8(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Utf8, message: msg.into() }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    pub fn json(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Json, message: msg.into() }
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Range, message: msg.into() }
    }

    /// Expect exactly `expected` bytes.
    pub fn check_width(codec: &str, expected: usize, bytes: &[u8]) -> Result<(), Self> {
        if bytes.len() == expected {
            Ok(())
        } else {
            Err(Self::length(format!(
                "{codec}: expected {expected} bytes, got {}",
                bytes.len()
            )))
        }
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CodecError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → CodecError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self::json(e.to_string())
    }
}

impl From<std::str::Utf8Error> for CodecError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::utf8(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for CodecError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::utf8(e.to_string())
    }
}

impl From<chrono::ParseError> for CodecError {
    fn from(e: chrono::ParseError) -> Self {
        Self::format(e.to_string())
    }
}

/// Store error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    Io,
    NotFound,
    /// Stored bytes the store itself cannot interpret (e.g. a non-counter
    /// cell targeted by an increment).
    Corrupt,
    Rejected,
}

/// Failure reported by a `CellStore` collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: StoreErrorKind::Io, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self { kind: StoreErrorKind::NotFound, message: msg.into() }
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self { kind: StoreErrorKind::Corrupt, message: msg.into() }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self { kind: StoreErrorKind::Rejected, message: msg.into() }
    }

    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::rejected(e.to_string())
    }
}
