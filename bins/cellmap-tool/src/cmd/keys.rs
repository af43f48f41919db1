use std::sync::Arc;

use cellmap_api::bytes;
use cellmap_api::{BytesCodec, CodecRegistry, Printable, ScanRange};
use cellmap_engine::QueryBuilder;

use super::error::ToolError;

/// How key arguments are written on the command line.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFormat {
    #[default]
    Utf8,
    Hex,
}

pub fn parse_key(input: &str, format: KeyFormat) -> Result<Vec<u8>, ToolError> {
    match format {
        KeyFormat::Utf8 => Ok(input.as_bytes().to_vec()),
        KeyFormat::Hex => {
            if input.len() % 2 != 0 {
                return Err(ToolError::InvalidKey(format!("odd hex length in {input:?}")));
            }
            (0..input.len())
                .step_by(2)
                .map(|i| {
                    input
                        .get(i..i + 2)
                        .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                        .ok_or_else(|| ToolError::InvalidKey(format!("bad hex in {input:?}")))
                })
                .collect()
        }
    }
}

pub fn to_hex(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

fn describe(key: &[u8]) -> String {
    format!("{} (hex {})", Printable(key), to_hex(key))
}

/// Exclusive upper bound of every key starting with `key`.
pub fn successor(key: &[u8]) -> String {
    match bytes::successor(key) {
        Some(next) => describe(&next),
        None => "unbounded (key is empty or all 0xff)".to_string(),
    }
}

/// Scan range a query with this row key and scan-key size produces.
pub fn scan_range(key: &[u8], size: Option<usize>) -> Result<ScanRange, ToolError> {
    let registry = CodecRegistry::new();
    let builder = QueryBuilder::new(&registry)
        .with_row_key_as(|k: &Vec<u8>| Some(k.clone()), Arc::new(BytesCodec));
    let builder = match size {
        Some(size) => builder.with_scan_key_size(size),
        None => builder,
    };
    let schema = builder.build()?;
    Ok(schema.to_scan_range(&key.to_vec())?)
}

pub fn format_range(range: &ScanRange) -> String {
    let stop = match &range.stop {
        Some(stop) => describe(stop),
        None => "unbounded".to_string(),
    };
    format!("start: {}\nstop:  {stop}", describe(&range.start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_utf8() {
        assert_eq!(parse_key("u1", KeyFormat::Utf8).unwrap(), b"u1".to_vec());
        assert_eq!(parse_key("00ff7A", KeyFormat::Hex).unwrap(), vec![0x00, 0xff, 0x7a]);
        assert!(parse_key("0", KeyFormat::Hex).is_err());
        assert!(parse_key("zz", KeyFormat::Hex).is_err());
    }

    #[test]
    fn successor_reports_unbounded_keys() {
        assert_eq!(successor(b"u1"), "u2 (hex 7532)");
        assert_eq!(successor(&[0xff]), "unbounded (key is empty or all 0xff)");
    }

    #[test]
    fn scan_range_uses_the_key_prefix() {
        let range = scan_range(b"u1-2024", Some(2)).unwrap();
        assert_eq!(range.start, b"u1".to_vec());
        assert_eq!(range.stop, Some(b"u2".to_vec()));

        let range = scan_range(b"u1", None).unwrap();
        assert_eq!(range.stop, Some(b"u1\x00".to_vec()));
        assert_eq!(format_range(&range), "start: u1 (hex 7531)\nstop:  u1\\x00 (hex 753100)");
    }
}
