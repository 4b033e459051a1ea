use rs_merkle::{algorithms::Sha256, MerkleTree};

use super::hash::Hash;

/// Calculates the Merkle root of a list of pre-hashed leaves.
///
/// An empty list has the zero root.
pub fn calculate_merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }

    let leaves_arr: Vec<[u8; 32]> = leaves.iter().map(|l| l.0).collect();
    let tree = MerkleTree::<Sha256>::from_leaves(&leaves_arr);

    tree.root().map(Hash).unwrap_or(Hash::ZERO)
}
