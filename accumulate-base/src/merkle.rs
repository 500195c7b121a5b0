use crate::hash::{sha256, Hash256};

/// Build a Merkle tree over the leaves and return the root hash.
///
/// An odd leaf at any level is paired with itself. Zero leaves produce the
/// zero hash.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    match leaves.len() {
        0 => Hash256::ZERO,
        1 => leaves[0],
        _ => {
            let mut level: Vec<Hash256> = leaves.to_vec();
            while level.len() > 1 {
                let mut next = Vec::with_capacity((level.len() + 1) / 2);
                for chunk in level.chunks(2) {
                    let left = chunk[0].as_slice();
                    let right = if chunk.len() == 2 {
                        chunk[1].as_slice()
                    } else {
                        left
                    };
                    let mut buffer = [0u8; 64];
                    buffer[..32].copy_from_slice(left);
                    buffer[32..].copy_from_slice(right);
                    next.push(Hash256::new(sha256(buffer)));
                }
                level = next;
            }
            level[0]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256_typed;

    #[test]
    fn merkle_root_empty() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn merkle_root_single() {
        let hash = sha256_typed(b"acc");
        assert_eq!(merkle_root(&[hash]), hash);
    }

    #[test]
    fn merkle_root_is_order_sensitive() {
        let a = sha256_typed(b"a");
        let b = sha256_typed(b"b");
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn merkle_root_odd_leaf_count() {
        let leaves: Vec<_> = (0u64..5)
            .map(|v| sha256_typed(v.to_le_bytes()))
            .collect();
        let root = merkle_root(&leaves);
        assert_ne!(root, Hash256::ZERO);
        // Deterministic for the same input.
        assert_eq!(root, merkle_root(&leaves));
    }
}
