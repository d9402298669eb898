/// SHA-256 Merkle tree with duplicate-last-leaf padding.
///
/// Leaves are claim content hashes and enter the tree as-is. Internal nodes
/// are SHA-256(left || right), combined pairwise left-to-right; a level with
/// an odd count pairs its last node with a copy of itself. A single leaf is
/// its own root.
///
/// An empty leaf set is an explicit error, never an implicit zero hash:
/// anchoring a vacuous root would be indistinguishable from anchoring real
/// claims.
use crate::crypto::hash;
use crate::error::{AttestError, Result};

/// Hash two child nodes to produce a parent.
pub fn internal_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    hash::hash_concat(left, right)
}

/// A SHA-256 Merkle tree. Always non-empty.
pub struct MerkleTree {
    /// All levels of the tree. levels[0] = leaves, levels[last] = [root].
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build a tree from pre-computed leaf hashes.
    pub fn from_leaf_hashes(leaves: Vec<[u8; 32]>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(AttestError::EmptyMerkleInput);
        }

        let mut levels = vec![leaves];

        while levels.last().map_or(0, Vec::len) > 1 {
            let current = levels.last().map_or(&[][..], Vec::as_slice);
            let mut next = Vec::with_capacity(current.len().div_ceil(2));

            let mut i = 0;
            while i < current.len() {
                let left = current[i];
                // Odd node: pair with a duplicate of itself
                let right = if i + 1 < current.len() {
                    current[i + 1]
                } else {
                    current[i]
                };
                next.push(internal_hash(&left, &right));
                i += 2;
            }

            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// The Merkle root.
    pub fn root(&self) -> [u8; 32] {
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// The leaf hashes.
    pub fn leaves(&self) -> &[[u8; 32]] {
        &self.levels[0]
    }

    pub(crate) fn levels(&self) -> &[Vec<[u8; 32]>] {
        &self.levels
    }
}

/// Compute the root over a set of leaf hashes.
pub fn merkle_root(leaves: &[[u8; 32]]) -> Result<[u8; 32]> {
    MerkleTree::from_leaf_hashes(leaves.to_vec()).map(|tree| tree.root())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(matches!(
            merkle_root(&[]),
            Err(AttestError::EmptyMerkleInput)
        ));
    }

    #[test]
    fn test_single_leaf_is_its_own_root() {
        assert_eq!(merkle_root(&[leaf(1)]).unwrap(), leaf(1));
    }

    #[test]
    fn test_two_leaves() {
        let expected = internal_hash(&leaf(1), &leaf(2));
        assert_eq!(merkle_root(&[leaf(1), leaf(2)]).unwrap(), expected);
    }

    #[test]
    fn test_three_leaves_duplicates_last() {
        // Level 0: [a, b, c]
        // Level 1: [H(a||b), H(c||c)]
        // Level 2: [H(level1[0] || level1[1])]
        let h_ab = internal_hash(&leaf(1), &leaf(2));
        let h_cc = internal_hash(&leaf(3), &leaf(3));
        let expected = internal_hash(&h_ab, &h_cc);
        assert_eq!(merkle_root(&[leaf(1), leaf(2), leaf(3)]).unwrap(), expected);
    }

    #[test]
    fn test_five_leaves() {
        // Level 0: [a, b, c, d, e]
        // Level 1: [H(a||b), H(c||d), H(e||e)]
        // Level 2: [H(l1_0||l1_1), H(l1_2||l1_2)]
        // Level 3: [H(l2_0||l2_1)]
        let l1_0 = internal_hash(&leaf(1), &leaf(2));
        let l1_1 = internal_hash(&leaf(3), &leaf(4));
        let l1_2 = internal_hash(&leaf(5), &leaf(5));
        let l2_0 = internal_hash(&l1_0, &l1_1);
        let l2_1 = internal_hash(&l1_2, &l1_2);
        let expected = internal_hash(&l2_0, &l2_1);

        let leaves = [leaf(1), leaf(2), leaf(3), leaf(4), leaf(5)];
        assert_eq!(merkle_root(&leaves).unwrap(), expected);
    }

    #[test]
    fn test_deterministic() {
        let leaves = [leaf(9), leaf(8), leaf(7)];
        assert_eq!(merkle_root(&leaves).unwrap(), merkle_root(&leaves).unwrap());
    }

    #[test]
    fn test_leaf_order_matters() {
        let forward = merkle_root(&[leaf(1), leaf(2)]).unwrap();
        let reversed = merkle_root(&[leaf(2), leaf(1)]).unwrap();
        assert_ne!(forward, reversed);
    }
}
