/// Merkle inclusion proofs: audit a single claim hash against an anchored
/// day root without the rest of the day's claims.
use serde::{Deserialize, Serialize};

use super::tree::{internal_hash, MerkleTree};

/// Position of a sibling relative to the node being proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Left,
    Right,
}

/// An inclusion proof for a single leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub leaf_hash: [u8; 32],
    pub siblings: Vec<(Position, [u8; 32])>,
}

impl MerkleTree {
    /// Generate an inclusion proof for the leaf at `index`.
    pub fn prove(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }

        let levels = self.levels();
        let mut siblings = Vec::new();
        let mut idx = index;

        for level in &levels[..levels.len().saturating_sub(1)] {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            // Odd level end: the sibling is the duplicated node itself
            let sibling = if sibling_idx < level.len() {
                level[sibling_idx]
            } else {
                level[idx]
            };
            let position = if idx % 2 == 0 {
                Position::Right
            } else {
                Position::Left
            };
            siblings.push((position, sibling));

            idx /= 2;
        }

        Some(MerkleProof {
            leaf_index: index,
            leaf_hash: self.leaves()[index],
            siblings,
        })
    }
}

/// Verify an inclusion proof against a known root.
pub fn verify_proof(root: &[u8; 32], proof: &MerkleProof) -> bool {
    let mut current = proof.leaf_hash;

    for (position, sibling) in &proof.siblings {
        current = match position {
            Position::Left => internal_hash(sibling, &current),
            Position::Right => internal_hash(&current, sibling),
        };
    }

    &current == root
}
