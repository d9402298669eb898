/// SHA-256 Merkle trees over a day's claim content hashes.
pub mod proof;
pub mod tree;

pub use tree::{merkle_root, MerkleTree};
