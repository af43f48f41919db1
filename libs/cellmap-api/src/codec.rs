use crate::error::CodecError;

/// Bidirectional converter between a typed value and a cell's bytes.
///
/// Law: `decode(encode(x)) == x` for every legal `x`. A present but empty
/// value (e.g. `""`) encodes to a zero-length byte string, never to
/// "absent"; absence is expressed by the field getter returning `None`.
pub trait Codec<T>: Send + Sync {
    /// Short name for logs and error context.
    fn name(&self) -> &'static str;

    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Converter between a typed value and a 64-bit integer.
///
/// Used for counter (increment) cells and timestamps.
pub trait LongCodec<T>: Send + Sync {
    fn name(&self) -> &'static str;

    fn to_long(&self, value: &T) -> Result<i64, CodecError>;

    fn from_long(&self, value: i64) -> Result<T, CodecError>;
}

/// Width of every 64-bit cell (counters, `i64`, `bool`).
pub const LONG_WIDTH: usize = 8;

/// Decode a big-endian 64-bit cell.
pub fn decode_i64(codec: &str, bytes: &[u8]) -> Result<i64, CodecError> {
    CodecError::check_width(codec, LONG_WIDTH, bytes)?;
    let mut buf = [0u8; LONG_WIDTH];
    buf.copy_from_slice(bytes);
    Ok(i64::from_be_bytes(buf))
}

// ═══════════════════════════════════════════════════════════════
//  Raw bytes
// ═══════════════════════════════════════════════════════════════

/// Identity codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    fn name(&self) -> &'static str {
        "bytes"
    }

    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }
}

// ═══════════════════════════════════════════════════════════════
//  UTF-8 string
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl Codec<String> for Utf8Codec {
    fn name(&self) -> &'static str {
        "utf8"
    }

    fn encode(&self, value: &String) -> Result<Vec<u8>, CodecError> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, CodecError> {
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Big-endian i64
// ═══════════════════════════════════════════════════════════════

/// Eight big-endian bytes; the layout of the store's native counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct I64Codec;

impl Codec<i64> for I64Codec {
    fn name(&self) -> &'static str {
        "i64"
    }

    fn encode(&self, value: &i64) -> Result<Vec<u8>, CodecError> {
        Ok(value.to_be_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<i64, CodecError> {
        decode_i64("i64", bytes)
    }
}

impl LongCodec<i64> for I64Codec {
    fn name(&self) -> &'static str {
        "i64"
    }

    fn to_long(&self, value: &i64) -> Result<i64, CodecError> {
        Ok(*value)
    }

    fn from_long(&self, value: i64) -> Result<i64, CodecError> {
        Ok(value)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Boolean
// ═══════════════════════════════════════════════════════════════

/// `false`/`true` as the 64-bit integers 0/1.
///
/// Any other integer is rejected rather than coerced.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolCodec;

impl BoolCodec {
    fn from_int(value: i64) -> Result<bool, CodecError> {
        match value {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::range(format!("bool: expected 0 or 1, got {other}"))),
        }
    }
}

impl Codec<bool> for BoolCodec {
    fn name(&self) -> &'static str {
        "bool"
    }

    fn encode(&self, value: &bool) -> Result<Vec<u8>, CodecError> {
        Ok(i64::from(*value).to_be_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<bool, CodecError> {
        Self::from_int(decode_i64("bool", bytes)?)
    }
}

impl LongCodec<bool> for BoolCodec {
    fn name(&self) -> &'static str {
        "bool"
    }

    fn to_long(&self, value: &bool) -> Result<i64, CodecError> {
        Ok(i64::from(*value))
    }

    fn from_long(&self, value: i64) -> Result<bool, CodecError> {
        Self::from_int(value)
    }
}
