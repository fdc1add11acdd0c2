//! Content checksums for data files and downloaded lightcurves.

use sha2::{Digest, Sha256};

/// SHA-256 of `content` as lowercase hex.
pub fn calculate_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Short prefix used in content-addressed file names.
pub fn short_checksum(content: &[u8]) -> String {
    let mut full = calculate_checksum(content);
    full.truncate(8);
    full
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = b"tic_id,ra\n1,2.0\n";
        assert_eq!(calculate_checksum(content), calculate_checksum(content));
        assert_eq!(calculate_checksum(content).len(), 64);
    }

    #[test]
    fn test_different_content_different_checksum() {
        assert_ne!(calculate_checksum(b"a"), calculate_checksum(b"b"));
    }

    #[test]
    fn test_short_checksum_is_prefix() {
        let content = b"SIMPLE  =                    T";
        assert!(calculate_checksum(content).starts_with(&short_checksum(content)));
        assert_eq!(short_checksum(content).len(), 8);
    }
}
