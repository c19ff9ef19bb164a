//! Encoding of the three key families the database holds, matching
//! `fake.c`'s `make_datum` call sites exactly: `inode <path>`, `stat
//! <inode>`, and the fixed sentinel `db inode`.

use relative_path::RelativePath;

/// The sentinel key recording the database file's own inode number at the
/// time it was last written, used to detect inode renumbering across a
/// filesystem copy (spec §4.6).
pub const DB_INODE_SENTINEL_KEY: &[u8] = b"db inode";

/// Build the `inode <path>` key for a guest path.
pub fn path_key(path: &RelativePath) -> Vec<u8> {
    format!("inode {path}").into_bytes()
}

/// Build the `stat <inode>` key for a host inode number.
pub fn stat_key(inode: u64) -> Vec<u8> {
    format!("stat {inode}").into_bytes()
}

/// Encode an inode number the way it's stored as a key/value payload:
/// decimal ASCII, matching `make_datum(..., "%lu", inode)`.
pub fn encode_inode(inode: u64) -> Vec<u8> {
    inode.to_string().into_bytes()
}

/// Decode an inode number previously encoded with [`encode_inode`].
pub fn decode_inode(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes)
        .ok()?
        .trim_end_matches('\0')
        .parse()
        .ok()
}

/// If `key` is an `inode <path>` key, return the path portion.
pub fn strip_path_prefix(key: &[u8]) -> Option<&[u8]> {
    key.strip_prefix(b"inode ")
}

/// If `key` is a `stat <inode>` key, return the inode portion.
pub fn strip_stat_prefix(key: &[u8]) -> Option<&[u8]> {
    key.strip_prefix(b"stat ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_key_matches_expected_format() {
        let p = RelativePath::new("a/b");
        assert_eq!(path_key(p), b"inode a/b".to_vec());
    }

    #[test]
    fn inode_roundtrips_through_ascii() {
        let encoded = encode_inode(42);
        assert_eq!(decode_inode(&encoded), Some(42));
    }

    #[test]
    fn strip_prefixes_recognize_key_family() {
        assert_eq!(strip_path_prefix(b"inode foo"), Some(&b"foo"[..]));
        assert_eq!(strip_stat_prefix(b"stat 7"), Some(&b"7"[..]));
        assert_eq!(strip_path_prefix(b"stat 7"), None);
    }
}
