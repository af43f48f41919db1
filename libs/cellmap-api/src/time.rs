use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

use crate::codec::{Codec, LongCodec};
use crate::error::CodecError;

// ═══════════════════════════════════════════════════════════════
//  Instant
// ═══════════════════════════════════════════════════════════════

/// ISO-8601 / RFC 3339 instant, always written in UTC with a `Z` suffix
/// and as many fractional digits as needed.
///
/// As a long: milliseconds since the Unix epoch (sub-millisecond
/// precision is dropped on that path only).
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantCodec;

impl Codec<DateTime<Utc>> for InstantCodec {
    fn name(&self) -> &'static str {
        "instant"
    }

    fn encode(&self, value: &DateTime<Utc>) -> Result<Vec<u8>, CodecError> {
        Ok(value
            .to_rfc3339_opts(SecondsFormat::AutoSi, true)
            .into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<DateTime<Utc>, CodecError> {
        let text = std::str::from_utf8(bytes)?;
        let parsed = DateTime::parse_from_rfc3339(text)
            .map_err(|e| CodecError::from(e).with_context(format!("instant {text:?}")))?;
        Ok(parsed.with_timezone(&Utc))
    }
}

impl LongCodec<DateTime<Utc>> for InstantCodec {
    fn name(&self) -> &'static str {
        "instant"
    }

    fn to_long(&self, value: &DateTime<Utc>) -> Result<i64, CodecError> {
        Ok(value.timestamp_millis())
    }

    fn from_long(&self, value: i64) -> Result<DateTime<Utc>, CodecError> {
        DateTime::from_timestamp_millis(value)
            .ok_or_else(|| CodecError::range(format!("instant: {value} ms is out of range")))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Duration
// ═══════════════════════════════════════════════════════════════

/// ISO-8601 duration in the `[-]PnDTnHnMn.nS` subset.
///
/// Encoding never emits days (`PT48H`), decoding accepts them. As a long:
/// whole milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationCodec;

impl Codec<TimeDelta> for DurationCodec {
    fn name(&self) -> &'static str {
        "duration"
    }

    fn encode(&self, value: &TimeDelta) -> Result<Vec<u8>, CodecError> {
        Ok(format_duration(value).into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<TimeDelta, CodecError> {
        let text = std::str::from_utf8(bytes)?;
        parse_duration(text).map_err(|e| e.with_context(format!("duration {text:?}")))
    }
}

impl LongCodec<TimeDelta> for DurationCodec {
    fn name(&self) -> &'static str {
        "duration"
    }

    fn to_long(&self, value: &TimeDelta) -> Result<i64, CodecError> {
        Ok(value.num_milliseconds())
    }

    fn from_long(&self, value: i64) -> Result<TimeDelta, CodecError> {
        TimeDelta::try_milliseconds(value)
            .ok_or_else(|| CodecError::range(format!("duration: {value} ms is out of range")))
    }
}

fn format_duration(value: &TimeDelta) -> String {
    let negative = *value < TimeDelta::zero();
    let abs = value.abs();
    let total = abs.num_seconds();
    let nanos = abs.subsec_nanos();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if seconds > 0 || nanos > 0 || (hours == 0 && minutes == 0) {
        out.push_str(&seconds.to_string());
        if nanos > 0 {
            let fraction = format!("{nanos:09}");
            out.push('.');
            out.push_str(fraction.trim_end_matches('0'));
        }
        out.push('S');
    }
    out
}

fn parse_duration(text: &str) -> Result<TimeDelta, CodecError> {
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let rest = rest
        .strip_prefix('P')
        .ok_or_else(|| CodecError::format("missing 'P' designator"))?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return Err(CodecError::format("empty time part after 'T'"));
            }
            (date, Some(time))
        }
        None => (rest, None),
    };

    let overflow = || CodecError::range("duration overflows");
    let mut total = TimeDelta::zero();
    let mut components = 0usize;

    for (number, unit) in components_of(date_part)? {
        let amount: i64 = number
            .parse()
            .map_err(|_| CodecError::format(format!("bad number {number:?}")))?;
        let part = match unit {
            'D' => TimeDelta::try_days(amount).ok_or_else(overflow)?,
            other => return Err(CodecError::format(format!("unsupported date unit '{other}'"))),
        };
        total = total.checked_add(&part).ok_or_else(overflow)?;
        components += 1;
    }

    for (number, unit) in components_of(time_part.unwrap_or(""))? {
        let part = match unit {
            'H' | 'M' => {
                let amount: i64 = number
                    .parse()
                    .map_err(|_| CodecError::format(format!("bad number {number:?}")))?;
                if unit == 'H' {
                    TimeDelta::try_hours(amount).ok_or_else(overflow)?
                } else {
                    TimeDelta::try_minutes(amount).ok_or_else(overflow)?
                }
            }
            'S' => parse_seconds(number)?,
            other => return Err(CodecError::format(format!("unsupported time unit '{other}'"))),
        };
        total = total.checked_add(&part).ok_or_else(overflow)?;
        components += 1;
    }

    if components == 0 {
        return Err(CodecError::format("no duration components"));
    }
    Ok(if negative { -total } else { total })
}

/// Split `"1H30M"` into `[("1", 'H'), ("30", 'M')]`.
fn components_of(part: &str) -> Result<Vec<(&str, char)>, CodecError> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, ch) in part.char_indices() {
        if ch.is_ascii_digit() || ch == '.' {
            continue;
        }
        let number = &part[start..idx];
        if number.is_empty() {
            return Err(CodecError::format(format!("unit '{ch}' without a number")));
        }
        out.push((number, ch));
        start = idx + ch.len_utf8();
    }
    if start != part.len() {
        return Err(CodecError::format(format!("trailing number {:?}", &part[start..])));
    }
    Ok(out)
}

fn parse_seconds(number: &str) -> Result<TimeDelta, CodecError> {
    let bad = || CodecError::format(format!("bad seconds {number:?}"));
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let seconds: i64 = whole.parse().map_err(|_| bad())?;
    let nanos: u32 = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}").parse().map_err(|_| bad())?
    };
    TimeDelta::new(seconds, nanos).ok_or_else(|| CodecError::range("duration overflows"))
}
