use ethers::types::{H256, U256};

use super::hash::{keccak256, keccak_packed_u256};
use crate::models::StakeStats;

/// Leaf committed to by the eligibility tree:
/// `keccak256(abi.encodePacked(stakeId, hp, attack))`.
pub fn stake_leaf(stake_id: u64, stats: StakeStats) -> H256 {
    keccak_packed_u256(&[
        U256::from(stake_id),
        U256::from(stats.hp),
        U256::from(stats.attack),
    ])
}

// Internal helper that supports `hash_pair_sorted` operations.
fn hash_pair_sorted(left: H256, right: H256) -> H256 {
    let (a, b) = if left <= right {
        (left, right)
    } else {
        (right, left)
    };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(a.as_bytes());
    buf[32..].copy_from_slice(b.as_bytes());
    keccak256(&buf)
}

/// Sorted-pair keccak proof check, the scheme the settlement contract uses.
pub fn verify_proof(root: H256, leaf: H256, proof: &[H256]) -> bool {
    let computed = proof
        .iter()
        .fold(leaf, |current, sibling| hash_pair_sorted(current, *sibling));
    computed == root
}

pub fn verify_stake_proof(root: H256, stake_id: u64, stats: StakeStats, proof: &[H256]) -> bool {
    verify_proof(root, stake_leaf(stake_id, stats), proof)
}

#[cfg(test)]
pub(crate) struct TestTree {
    pub root: H256,
    pub levels: Vec<Vec<H256>>,
}

#[cfg(test)]
impl TestTree {
    pub fn build(mut leaves: Vec<H256>) -> Self {
        leaves.sort();
        let mut levels = vec![leaves];
        while levels.last().map(Vec::len).unwrap_or(0) > 1 {
            let current = levels.last().unwrap();
            let next: Vec<H256> = current
                .chunks(2)
                .map(|pair| hash_pair_sorted(pair[0], *pair.get(1).unwrap_or(&pair[0])))
                .collect();
            levels.push(next);
        }
        let root = levels.last().unwrap()[0];
        Self { root, levels }
    }

    pub fn proof(&self, leaf: H256) -> Vec<H256> {
        let mut index = self.levels[0].iter().position(|l| *l == leaf).unwrap();
        let mut proof = Vec::new();
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if index % 2 == 0 { index + 1 } else { index - 1 };
            proof.push(*level.get(sibling).unwrap_or(&level[index]));
            index /= 2;
        }
        proof
    }
}
