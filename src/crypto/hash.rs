/// SHA-256 hashing utilities.
///
/// SHA-256 is used throughout the system for:
/// - claim content hashes over canonical bytes
/// - bundle hashes over manifest skeletons plus companion artifacts
/// - Merkle tree construction for daily anchoring
use sha2::{Digest, Sha256};

/// Identifier of the hashing algorithm, recorded in every manifest so a
/// future algorithm change cannot be confused with tampering.
pub const ALGORITHM_ID: &str = "sha256-v1";

/// Hash arbitrary data with SHA-256.
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash the concatenation of two byte slices without allocating.
pub fn hash_concat(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let data = b"attestor claim payload";
        assert_eq!(hash(data), hash(data));
    }

    #[test]
    fn test_hash_different_inputs() {
        assert_ne!(hash(b"hello"), hash(b"world"));
    }

    #[test]
    fn test_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            hex::encode(hash(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_concat_matches_joined() {
        let joined = [b"left".as_slice(), b"right".as_slice()].concat();
        assert_eq!(hash_concat(b"left", b"right"), hash(&joined));
    }
}
