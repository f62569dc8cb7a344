use sha2::{Digest, Sha256};

/// Stable fingerprint of submitted file content: SHA-256 over the raw
/// bytes, lowercase hex. This is the result-cache key, so no normalization
/// of the input is ever applied.
pub fn fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(fingerprint(b"const a = 1;"), fingerprint(b"const a = 1;"));
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let fp = fingerprint(b"");
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn whitespace_changes_the_fingerprint() {
        assert_ne!(fingerprint(b"a=1"), fingerprint(b"a = 1"));
    }
}
