//! Ticket commitment tree.
//!
//! A binary SHA-256 tree over ticket commitment hashes. When the leaf count is
//! not a power of two the last leaf is repeated until it is, so a batch of
//! `[a, b, c]` hashes as `[a, b, c, c]`. Parents are `sha256(left || right)`,
//! children in position order.
//!
//! A built tree is never mutated; a new draw cycle builds a new tree.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{LotteryError, Result};

pub type Hash = [u8; 32];

pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Parent node hash; order matters.
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut h = Sha256::new();
    h.update(left);
    h.update(right);
    h.finalize().into()
}

/// Inclusion proof for one leaf. `siblings` runs from the leaf level upward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: u32,
    pub siblings: Vec<Hash>,
}

/// Inclusion proof for several leaves at once.
///
/// Verification walks the tree level by level over the known positions in
/// ascending order. At each merge step the next flag says whether the
/// sibling is already known (`true`: another claimed leaf or a node computed
/// from them) or must be taken from `siblings` (`false`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiProof {
    /// Sorted, distinct leaf positions.
    pub leaf_indices: Vec<u32>,
    pub siblings: Vec<Hash>,
    pub flags: Vec<bool>,
    /// Leaves in the tree before padding.
    pub leaf_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitmentTree {
    leaf_count: usize,
    // layers[0] holds the padded leaves, the last layer holds the root.
    layers: Vec<Vec<Hash>>,
}

impl CommitmentTree {
    pub fn build(leaves: &[Hash]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(LotteryError::InvalidArgument(
                "commitment tree needs at least one leaf".to_string(),
            ));
        }
        if u32::try_from(leaves.len()).is_err() {
            return Err(LotteryError::InvalidArgument(format!(
                "{} leaves exceed the u32 index range",
                leaves.len()
            )));
        }

        let width = leaves.len().next_power_of_two();
        let mut level = leaves.to_vec();
        let last = leaves[leaves.len() - 1];
        level.resize(width, last);

        let mut layers = vec![level];
        while layers[layers.len() - 1].len() > 1 {
            let next = layers[layers.len() - 1]
                .chunks_exact(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            layers.push(next);
        }

        log::debug!(
            "built commitment tree: {} leaves, {} levels",
            leaves.len(),
            layers.len()
        );
        Ok(Self {
            leaf_count: leaves.len(),
            layers,
        })
    }

    pub fn root(&self) -> Hash {
        self.layers[self.layers.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Unpadded leaves in insertion order.
    pub fn leaves(&self) -> &[Hash] {
        &self.layers[0][..self.leaf_count]
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.leaf_count {
            return Err(LotteryError::InvalidArgument(format!(
                "leaf index {} out of range for {} leaves",
                index, self.leaf_count
            )));
        }
        Ok(())
    }

    pub fn prove_single(&self, index: usize) -> Result<MerkleProof> {
        self.check_index(index)?;
        let mut position = index;
        let mut siblings = Vec::with_capacity(self.layers.len() - 1);
        for layer in &self.layers[..self.layers.len() - 1] {
            siblings.push(layer[position ^ 1]);
            position /= 2;
        }
        Ok(MerkleProof {
            leaf_index: index as u32,
            siblings,
        })
    }

    /// Multi-proof over `indices`. Duplicates are ignored; order does not matter.
    pub fn prove(&self, indices: &[usize]) -> Result<MultiProof> {
        if indices.is_empty() {
            return Err(LotteryError::InvalidArgument(
                "multi-proof needs at least one leaf index".to_string(),
            ));
        }
        let mut known: Vec<usize> = indices.to_vec();
        known.sort_unstable();
        known.dedup();
        for index in &known {
            self.check_index(*index)?;
        }
        let leaf_indices = known.iter().map(|i| *i as u32).collect();

        let mut siblings = Vec::new();
        let mut flags = Vec::new();
        for layer in &self.layers[..self.layers.len() - 1] {
            let mut parents = Vec::with_capacity(known.len());
            let mut i = 0;
            while i < known.len() {
                let position = known[i];
                let sibling = position ^ 1;
                if position % 2 == 0 && known.get(i + 1) == Some(&sibling) {
                    flags.push(true);
                    i += 2;
                } else {
                    flags.push(false);
                    siblings.push(layer[sibling]);
                    i += 1;
                }
                parents.push(position / 2);
            }
            known = parents;
        }

        Ok(MultiProof {
            leaf_indices,
            siblings,
            flags,
            leaf_count: self.leaf_count as u32,
        })
    }
}

/// Levels above the leaves in a tree of `leaf_count` leaves.
fn depth(leaf_count: u32) -> usize {
    (leaf_count as u64).next_power_of_two().trailing_zeros() as usize
}

/// Check a single-leaf proof against `root` of a tree of `leaf_count` leaves.
pub fn verify_single(root: &Hash, leaf_count: u32, proof: &MerkleProof, leaf: &Hash) -> bool {
    if proof.leaf_index >= leaf_count || proof.siblings.len() != depth(leaf_count) {
        return false;
    }
    let mut position = proof.leaf_index;
    let mut current = *leaf;
    for sibling in &proof.siblings {
        current = if position % 2 == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
        position /= 2;
    }
    current == *root
}

/// Rebuild the root from `leaves` (one per entry of `proof.leaf_indices`, same
/// order) and compare it with `root`.
///
/// `leaf_count` is the committed ticket count stored next to the root. The
/// tree shape comes from it alone; a proof carrying any other count fails, so
/// padding slots can never be claimed as tickets. Any structural
/// inconsistency in the proof is a failed verification, never a panic.
pub fn verify(root: &Hash, leaf_count: u32, proof: &MultiProof, leaves: &[Hash]) -> bool {
    if leaf_count == 0
        || proof.leaf_count != leaf_count
        || proof.leaf_indices.is_empty()
        || proof.leaf_indices.len() != leaves.len()
    {
        return false;
    }
    if proof.leaf_indices.windows(2).any(|w| w[0] >= w[1]) {
        return false;
    }
    if *proof.leaf_indices.last().unwrap_or(&u32::MAX) >= leaf_count {
        return false;
    }

    let mut known: Vec<(u64, Hash)> = proof
        .leaf_indices
        .iter()
        .map(|i| *i as u64)
        .zip(leaves.iter().copied())
        .collect();
    let mut siblings = proof.siblings.iter();
    let mut flags = proof.flags.iter();

    for _ in 0..depth(leaf_count) {
        let mut parents = Vec::with_capacity(known.len());
        let mut i = 0;
        while i < known.len() {
            let (position, hash) = known[i];
            let Some(&from_known) = flags.next() else {
                return false;
            };
            let sibling_hash = if from_known {
                match known.get(i + 1) {
                    Some(&(next, next_hash)) if position % 2 == 0 && next == position + 1 => {
                        i += 2;
                        next_hash
                    }
                    _ => return false,
                }
            } else {
                let Some(sibling) = siblings.next() else {
                    return false;
                };
                i += 1;
                *sibling
            };
            let parent = if position % 2 == 0 {
                hash_pair(&hash, &sibling_hash)
            } else {
                hash_pair(&sibling_hash, &hash)
            };
            parents.push((position / 2, parent));
        }
        known = parents;
    }

    siblings.next().is_none()
        && flags.next().is_none()
        && known.len() == 1
        && known[0] == (0, *root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u32) -> Vec<Hash> {
        (1..=n).map(|i| sha256(i.to_string().as_bytes())).collect()
    }

    #[test]
    fn test_root_of_single_leaf_is_the_leaf() {
        let l = leaves(1);
        let tree = CommitmentTree::build(&l).unwrap();
        assert_eq!(tree.root(), l[0]);
        assert!(verify(&tree.root(), 1, &tree.prove(&[0]).unwrap(), &l));
    }

    #[test]
    fn test_padding_duplicates_last_leaf() {
        let l = leaves(3);
        let tree = CommitmentTree::build(&l).unwrap();
        let expected = hash_pair(&hash_pair(&l[0], &l[1]), &hash_pair(&l[2], &l[2]));
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.leaves(), &l[..]);

        let padded = CommitmentTree::build(&[l[0], l[1], l[2], l[2]]).unwrap();
        assert_eq!(padded.root(), tree.root());
    }

    #[test]
    fn test_empty_tree_rejected() {
        assert!(matches!(
            CommitmentTree::build(&[]),
            Err(LotteryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_every_leaf_proves() {
        for n in 1..=9 {
            let l = leaves(n);
            let tree = CommitmentTree::build(&l).unwrap();
            for (i, leaf) in l.iter().enumerate() {
                let multi = tree.prove(&[i]).unwrap();
                assert!(verify(&tree.root(), n, &multi, &[*leaf]), "n={} i={}", n, i);
                let single = tree.prove_single(i).unwrap();
                assert!(verify_single(&tree.root(), n, &single, leaf), "n={} i={}", n, i);
            }
        }
    }

    #[test]
    fn test_bit_flip_in_sibling_fails() {
        let l = leaves(5);
        let tree = CommitmentTree::build(&l).unwrap();
        for i in 0..l.len() {
            let proof = tree.prove(&[i]).unwrap();
            for s in 0..proof.siblings.len() {
                for bit in [0usize, 77, 255] {
                    let mut tampered = proof.clone();
                    tampered.siblings[s][bit / 8] ^= 1 << (bit % 8);
                    assert!(!verify(&tree.root(), 5, &tampered, &[l[i]]));
                }
            }
            let single = tree.prove_single(i).unwrap();
            let mut tampered = single.clone();
            tampered.siblings[0][0] ^= 0x80;
            assert!(!verify_single(&tree.root(), 5, &tampered, &l[i]));
        }
    }

    #[test]
    fn test_multi_proof_subsets() {
        let l = leaves(6);
        let tree = CommitmentTree::build(&l).unwrap();
        let subsets: Vec<Vec<usize>> = vec![
            vec![0, 1],
            vec![0, 2],
            vec![1, 4, 5],
            vec![0, 1, 2, 3, 4, 5],
            vec![5, 3, 3],
        ];
        for subset in subsets {
            let proof = tree.prove(&subset).unwrap();
            let claimed: Vec<Hash> = proof
                .leaf_indices
                .iter()
                .map(|i| l[*i as usize])
                .collect();
            assert!(verify(&tree.root(), 6, &proof, &claimed), "{:?}", subset);
        }
    }

    #[test]
    fn test_full_multi_proof_needs_no_siblings() {
        let l = leaves(4);
        let tree = CommitmentTree::build(&l).unwrap();
        let proof = tree.prove(&[0, 1, 2, 3]).unwrap();
        assert!(proof.siblings.is_empty());
        assert!(proof.flags.iter().all(|f| *f));
    }

    #[test]
    fn test_multi_proof_rejects_wrong_leaves_and_shapes() {
        let l = leaves(4);
        let tree = CommitmentTree::build(&l).unwrap();
        let proof = tree.prove(&[0, 2]).unwrap();
        assert!(verify(&tree.root(), 4, &proof, &[l[0], l[2]]));
        assert!(!verify(&tree.root(), 4, &proof, &[l[2], l[0]]));
        assert!(!verify(&tree.root(), 4, &proof, &[l[0], l[1]]));
        assert!(!verify(&tree.root(), 4, &proof, &[l[0]]));

        let mut extra = proof.clone();
        extra.siblings.push([0; 32]);
        assert!(!verify(&tree.root(), 4, &extra, &[l[0], l[2]]));

        let mut flipped = proof.clone();
        flipped.flags[0] = !flipped.flags[0];
        assert!(!verify(&tree.root(), 4, &flipped, &[l[0], l[2]]));

        let mut out_of_range = proof;
        out_of_range.leaf_indices = vec![0, 4];
        assert!(!verify(&tree.root(), 4, &out_of_range, &[l[0], l[2]]));
    }

    #[test]
    fn test_padding_slot_cannot_be_claimed() {
        let l = leaves(3);
        let tree = CommitmentTree::build(&l).unwrap();
        let proof = tree.prove(&[2]).unwrap();
        assert!(verify(&tree.root(), 3, &proof, &[l[2]]));

        // [a, b, c] hashes like [a, b, c, c]; slot 3 is padding
        let mut phantom = proof.clone();
        phantom.leaf_indices = vec![3];
        phantom.leaf_count = 4;
        assert!(!verify(&tree.root(), 3, &phantom, &[l[2]]));

        let mut twice = proof.clone();
        twice.leaf_indices = vec![2, 3];
        twice.leaf_count = 4;
        twice.flags = vec![true, false];
        twice.siblings = vec![hash_pair(&l[0], &l[1])];
        assert!(verify(&tree.root(), 4, &twice, &[l[2], l[2]]));
        assert!(!verify(&tree.root(), 3, &twice, &[l[2], l[2]]));

        // a stale count on an otherwise valid proof
        let mut stale = proof;
        stale.leaf_count = 4;
        assert!(!verify(&tree.root(), 3, &stale, &[l[2]]));
    }

    #[test]
    fn test_single_proof_depth_is_fixed() {
        let l = leaves(4);
        let tree = CommitmentTree::build(&l).unwrap();
        let inner = MerkleProof {
            leaf_index: 0,
            siblings: vec![hash_pair(&l[2], &l[3])],
        };
        assert!(!verify_single(&tree.root(), 4, &inner, &hash_pair(&l[0], &l[1])));

        let three = CommitmentTree::build(&l[..3]).unwrap();
        let mut padding = three.prove_single(2).unwrap();
        assert!(verify_single(&three.root(), 3, &padding, &l[2]));
        padding.leaf_index = 3;
        assert!(!verify_single(&three.root(), 3, &padding, &l[2]));
    }

    #[test]
    fn test_prove_rejects_bad_indices() {
        let tree = CommitmentTree::build(&leaves(3)).unwrap();
        assert!(matches!(tree.prove(&[]), Err(LotteryError::InvalidArgument(_))));
        // index 3 exists only as padding
        assert!(matches!(tree.prove(&[3]), Err(LotteryError::InvalidArgument(_))));
        assert!(tree.prove_single(3).is_err());
    }
}
