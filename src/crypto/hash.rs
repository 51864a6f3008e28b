use ethers::types::{H256, U256};
use sha3::{Digest, Keccak256};

/// Keccak256 of raw bytes
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

/// `keccak256(abi.encodePacked(uint256...))`
pub fn keccak_packed_u256(values: &[U256]) -> H256 {
    let mut packed = Vec::with_capacity(values.len() * 32);
    for value in values {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        packed.extend_from_slice(&word);
    }
    keccak256(&packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak256_matches_empty_string_vector() {
        let digest = keccak256(b"");
        assert_eq!(
            format!("0x{}", hex::encode(digest.as_bytes())),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn packed_u256_matches_ethers_abi_encoding() {
        let values = [U256::from(5u64), U256::from(100u64), U256::from(20u64)];
        let tokens: Vec<ethers::abi::Token> =
            values.iter().map(|v| ethers::abi::Token::Uint(*v)).collect();
        let expected = H256::from(ethers::utils::keccak256(ethers::abi::encode(&tokens)));
        assert_eq!(keccak_packed_u256(&values), expected);
    }
}
