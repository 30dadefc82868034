//! Text format for the Overlay's deletion log: one `d<absolute-path>` line per deleted name.

use std::collections::BTreeSet;

/// Parses a deletion log blob into the set of deleted paths. Lines that don't start with `d`
/// are ignored, matching the format's forward-compatibility note.
pub fn parse(bytes: &[u8]) -> BTreeSet<String> {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .filter_map(|line| line.strip_prefix('d'))
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}

/// Serializes a set of deleted paths back into the deletion log format.
pub fn serialize(deleted: &BTreeSet<String>) -> Vec<u8> {
    let mut out = String::new();
    for path in deleted {
        out.push('d');
        out.push_str(path);
        out.push('\n');
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_d_prefixed_lines() {
        let log = b"d/a.txt\nsomething else\nd/b/c\n";
        let deleted = parse(log);
        assert_eq!(deleted.len(), 2);
        assert!(deleted.contains("/a.txt"));
        assert!(deleted.contains("/b/c"));
    }

    #[test]
    fn round_trips_through_serialize() {
        let mut deleted = BTreeSet::new();
        deleted.insert("/x".to_string());
        deleted.insert("/y/z".to_string());
        let bytes = serialize(&deleted);
        assert_eq!(parse(&bytes), deleted);
    }

    #[test]
    fn empty_log_parses_to_empty_set() {
        assert!(parse(b"").is_empty());
    }
}
