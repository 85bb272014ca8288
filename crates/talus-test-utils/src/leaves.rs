//! Leaf generation.
//!
//! A minimal hashing MMR appender so tests can fill massifs with real peak
//! structure. The engine itself never hashes; these helpers stand in for the
//! external MMR library that production appenders use.

use sha2::{Digest, Sha256};

use talus_core::error::Result;
use talus_core::massif::{MassifContext, NODE_SIZE};
use talus_core::mmr;

/// Deterministic leaf content: `H(prefix || n)`.
pub fn leaf_value(prefix: &str, n: u64) -> [u8; NODE_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(n.to_be_bytes());
    hasher.finalize().into()
}

/// Appends a leaf and the interior nodes it completes, returning the leaf's
/// MMR index.
///
/// Interior nodes whose left child lives in an earlier massif resolve it
/// from the peak index area, exactly as a production appender would.
pub fn append_leaf(
    mc: &mut MassifContext,
    value: &[u8; NODE_SIZE],
    id_timestamp: u64,
) -> Result<u64> {
    let mut size = mc.mmr_size();
    let leaf_mmr_index = size;

    mc.append_node(value);
    size += 1;

    let mut height = 0u8;
    while mmr::index_height(size) > height {
        let left_pos = size - (2 << height);
        let right_pos = size - 1;
        let left = mc.node_or_ancestor_peak(left_pos)?;
        let right = mc.node_or_ancestor_peak(right_pos)?;
        mc.append_node(&hash_children(&left, &right));
        size += 1;
        height += 1;
    }

    mc.set_last_id_timestamp(id_timestamp);
    Ok(leaf_mmr_index)
}

fn hash_children(left: &[u8; NODE_SIZE], right: &[u8; NODE_SIZE]) -> [u8; NODE_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filling_a_height_three_massif_takes_four_leaves() {
        let mut mc = MassifContext::new_first(1, 3);
        for n in 0..4u64 {
            append_leaf(&mut mc, &leaf_value("test", n), (n + 1) << 20).unwrap();
        }
        // 4 leaves + 3 interior nodes
        assert_eq!(mc.count(), 7);
        assert!(!mc.has_capacity());
        assert_eq!(mc.last_id_timestamp(), 4 << 20);
    }

    #[test]
    fn leaves_land_at_their_mmr_indices() {
        let mut mc = MassifContext::new_first(1, 4);
        for n in 0..8u64 {
            let at = append_leaf(&mut mc, &leaf_value("test", n), n + 1).unwrap();
            assert_eq!(at, mmr::mmr_index(n), "leaf {n}");
        }
        assert_eq!(mc.count(), 15);
    }

    #[test]
    fn cross_massif_merges_use_the_peak_area() {
        // fill massif 0 of height 3 (leaves 0..4), roll over, then add the
        // leaf whose spur merges with massif 0's root
        let mut m0 = MassifContext::new_first(1, 3);
        for n in 0..4u64 {
            append_leaf(&mut m0, &leaf_value("test", n), n + 1).unwrap();
        }
        let mut m1 = m0.start_next_massif().unwrap();
        for n in 4..8u64 {
            append_leaf(&mut m1, &leaf_value("test", n), n + 1).unwrap();
        }
        // leaf 7 completes the 15 node mmr over leaves 0..8; its top node
        // hashes massif 0's root (node 6) with massif 1's subtree root
        assert_eq!(m1.count(), 8);
        let expected_top = hash_children(
            &m0.get_node(6).unwrap(),
            &m1.get_node(13).unwrap(),
        );
        assert_eq!(m1.get_node(14).unwrap(), expected_top);
    }
}
