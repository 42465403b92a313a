//! Byte-key helpers shared by backends and views.

/// Concatenate `prefix` and `key` into a fresh buffer.
pub fn join_key(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + key.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(key);
    out
}

/// Smallest key that is greater than every key starting with `prefix`.
///
/// Returns `None` when no such key exists (empty prefix, or a prefix made
/// only of `0xff` bytes), i.e. the range is unbounded above.
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut limit = prefix.to_vec();
    while let Some(last) = limit.pop() {
        if last < 0xff {
            limit.push(last + 1);
            return Some(limit);
        }
    }
    None
}

/// Whether `key` falls in `[start, end)`. An empty `end` is unbounded.
pub fn in_range(key: &[u8], start: &[u8], end: &[u8]) -> bool {
    key >= start && (end.is_empty() || key < end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_concatenates() {
        assert_eq!(join_key(b"ab", b"cd"), b"abcd".to_vec());
        assert_eq!(join_key(b"", b"cd"), b"cd".to_vec());
        assert_eq!(join_key(b"ab", b""), b"ab".to_vec());
    }

    #[test]
    fn upper_bound_increments_last_byte() {
        assert_eq!(prefix_upper_bound(b"abc"), Some(b"abd".to_vec()));
        assert_eq!(prefix_upper_bound(&[0x01, 0xff]), Some(vec![0x02]));
    }

    #[test]
    fn upper_bound_of_unbounded_prefixes() {
        assert_eq!(prefix_upper_bound(b""), None);
        assert_eq!(prefix_upper_bound(&[0xff, 0xff]), None);
    }

    #[test]
    fn range_membership() {
        assert!(in_range(b"b", b"a", b"c"));
        assert!(in_range(b"a", b"a", b"c"));
        assert!(!in_range(b"c", b"a", b"c"));
        assert!(in_range(b"zzz", b"a", b""));
        assert!(!in_range(b"0", b"a", b""));
    }
}
