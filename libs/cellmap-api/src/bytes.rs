use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

/// Sorted qualifier → value cells of one row.
pub type CellMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Sorted qualifier → increment cells of one row.
pub type DeltaMap = BTreeMap<Vec<u8>, i64>;

/// Unsigned lexicographic comparison; on a common-prefix tie the shorter
/// operand sorts first.
///
/// This is the order of every row key, qualifier and container in the crate.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    let shared = a.len().min(b.len());
    for i in 0..shared {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// `true` iff `s` begins with every byte of `prefix`.
pub fn is_prefix_of(prefix: &[u8], s: &[u8]) -> bool {
    s.len() >= prefix.len() && s[..prefix.len()] == *prefix
}

/// Smallest byte string strictly greater than every string that starts
/// with `prefix`.
///
/// Trailing `0xFF` bytes are dropped and the last remaining byte is
/// incremented. `None` when no such string exists (empty or all-`0xFF`
/// prefix): the range above the prefix is unbounded.
pub fn successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let pos = prefix.iter().rposition(|&b| b != 0xFF)?;
    let mut end = Vec::with_capacity(pos + 1);
    end.extend_from_slice(&prefix[..pos]);
    end.push(prefix[pos] + 1);
    Some(end)
}

/// Smallest byte string strictly greater than `key` itself: `key ++ 0x00`.
pub fn row_after(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0x00);
    next
}

/// Length of the longest common prefix of `a` and `b`.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// `prefix ++ suffix`.
pub fn concat(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + suffix.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(suffix);
    out
}

/// Display adapter for keys and qualifiers in logs and error messages.
///
/// Printable ASCII is shown as-is, everything else as `\xNN`.
pub struct Printable<'a>(pub &'a [u8]);

impl fmt::Display for Printable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02X}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Printable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Sorted prefix → value table with longest-prefix lookup.
///
/// Lookups are floor probes on the sorted keys, so nested prefixes
/// (`"a"` and `"ab"`) resolve deterministically to the longest match.
#[derive(Debug, Clone)]
pub struct PrefixTable<V> {
    entries: BTreeMap<Vec<u8>, V>,
}

impl<V> Default for PrefixTable<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> PrefixTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous value for the same prefix.
    pub fn insert(&mut self, prefix: impl Into<Vec<u8>>, value: V) -> Option<V> {
        self.entries.insert(prefix.into(), value)
    }

    /// Exact lookup.
    pub fn get(&self, prefix: &[u8]) -> Option<&V> {
        self.entries.get(prefix)
    }

    pub fn contains(&self, prefix: &[u8]) -> bool {
        self.entries.contains_key(prefix)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.keys().map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &V)> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v))
    }

    /// Longest registered prefix of `key`, with its value.
    ///
    /// Each probe takes the greatest entry `<= probe`. A candidate that is
    /// not a prefix of `key` shares `n` bytes with it, and nothing between
    /// `key[..n]` and the candidate can be a prefix of `key`, so the next
    /// probe is `key[..n]`. `n` strictly shrinks, so at most `key.len() + 1`
    /// probes run.
    pub fn longest_match(&self, key: &[u8]) -> Option<(&[u8], &V)> {
        let mut probe = key;
        loop {
            let (candidate, value) = self
                .entries
                .range::<[u8], _>((Bound::Unbounded, Bound::Included(probe)))
                .next_back()?;
            if is_prefix_of(candidate, key) {
                return Some((candidate.as_slice(), value));
            }
            probe = &key[..common_prefix_len(candidate, key)];
        }
    }

    /// First registered entry that has `prefix` as a prefix (including
    /// `prefix` itself).
    pub fn first_extension(&self, prefix: &[u8]) -> Option<&[u8]> {
        self.entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.as_slice())
            .filter(|k| is_prefix_of(prefix, k))
    }
}

impl<V> FromIterator<(Vec<u8>, V)> for PrefixTable<V> {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
