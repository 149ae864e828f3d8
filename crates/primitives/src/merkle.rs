//! Binary merkle tree over byte leaves, as used for a block's data hash.
//!
//! Leaves are hashed as `H(0x00 || leaf)` and inner nodes as `H(0x01 || left || right)`. A tree of
//! `n > 1` leaves is split so that the left subtree holds the largest power of two strictly less
//! than `n` leaves. The root of an empty tree is the hash of the empty string.

use sha2::{Digest, Sha256};

use crate::hash::B256;

const LEAF_PREFIX: u8 = 0x00;
const INNER_PREFIX: u8 = 0x01;

/// Computes the merkle root of the given leaves.
pub fn merkle_root<T: AsRef<[u8]>>(leaves: &[T]) -> B256 {
    match leaves.len() {
        0 => B256::digest([]),
        1 => leaf_hash(leaves[0].as_ref()),
        n => {
            let k = split_point(n);
            let left = merkle_root(&leaves[..k]);
            let right = merkle_root(&leaves[k..]);
            inner_hash(&left, &right)
        }
    }
}

pub(crate) fn leaf_hash(leaf: &[u8]) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(leaf);
    B256::new(hasher.finalize().into())
}

pub(crate) fn inner_hash(left: &B256, right: &B256) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update([INNER_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    B256::new(hasher.finalize().into())
}

// largest power of two strictly less than `n`. `n` must be > 1.
fn split_point(n: usize) -> usize {
    debug_assert!(n > 1);
    n.next_power_of_two() / 2
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(2, 1)]
    #[case(3, 2)]
    #[case(4, 2)]
    #[case(5, 4)]
    #[case(8, 4)]
    #[case(9, 8)]
    fn split(#[case] n: usize, #[case] expected: usize) {
        assert_eq!(split_point(n), expected);
    }

    #[test]
    fn empty_and_single() {
        let empty: [&[u8]; 0] = [];
        assert_eq!(merkle_root(&empty), B256::digest([]));
        assert_eq!(merkle_root(&[b"tx"]), leaf_hash(b"tx"));
        assert_ne!(merkle_root(&[b"tx"]), B256::digest(b"tx"));
    }

    #[test]
    fn three_leaves_shape() {
        let leaves = [b"a", b"b", b"c"];
        let expected = inner_hash(
            &inner_hash(&leaf_hash(b"a"), &leaf_hash(b"b")),
            &leaf_hash(b"c"),
        );
        assert_eq!(merkle_root(&leaves), expected);
    }

    #[test]
    fn order_matters() {
        assert_ne!(merkle_root(&[b"a", b"b"]), merkle_root(&[b"b", b"a"]));
    }
}
