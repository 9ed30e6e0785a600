//! Merkle root over transaction hashes.
//!
//! The fold works on the hex digest strings themselves: each pair of
//! adjacent digests is concatenated as text and hashed with SHA-256. A
//! layer of odd length pairs its last element with itself (Bitcoin-style
//! duplication). The empty list folds to `SHA256("")`.
//!
//! This construction is part of the wire format: swapping text
//! concatenation for byte concatenation, or duplication for promotion,
//! changes every stored `merkle_root`.

use crate::crypto::hash::sha256_hex;

/// Fold an ordered list of hex transaction hashes into the Merkle root.
pub fn merkle_root(hashes: &[String]) -> String {
    if hashes.is_empty() {
        return sha256_hex(b"");
    }

    let mut layer = hashes.to_vec();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(sha256_hex(format!("{left}{right}").as_bytes()));
        }
        layer = next;
    }

    layer.swap_remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(data: &str) -> String {
        sha256_hex(data.as_bytes())
    }

    #[test]
    fn empty_list_folds_to_hash_of_nothing() {
        assert_eq!(
            merkle_root(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn single_hash_is_its_own_root() {
        let only = h("tx-1");
        assert_eq!(merkle_root(&[only.clone()]), only);
    }

    #[test]
    fn pair_folds_over_text_concatenation() {
        let a = h("tx-a");
        let b = h("tx-b");
        let expected = sha256_hex(format!("{a}{b}").as_bytes());
        assert_eq!(merkle_root(&[a, b]), expected);
    }

    #[test]
    fn odd_layer_duplicates_last_element() {
        let a = h("tx-a");
        let b = h("tx-b");
        let c = h("tx-c");

        let ab = sha256_hex(format!("{a}{b}").as_bytes());
        let cc = sha256_hex(format!("{c}{c}").as_bytes());
        let expected = sha256_hex(format!("{ab}{cc}").as_bytes());

        assert_eq!(merkle_root(&[a, b, c]), expected);
    }

    #[test]
    fn root_is_order_sensitive() {
        let a = h("tx-a");
        let b = h("tx-b");
        assert_ne!(
            merkle_root(&[a.clone(), b.clone()]),
            merkle_root(&[b, a])
        );
    }

    #[test]
    fn root_is_deterministic() {
        let hashes: Vec<String> = (0..7).map(|i| h(&format!("tx-{i}"))).collect();
        assert_eq!(merkle_root(&hashes), merkle_root(&hashes));
    }

    #[test]
    fn five_leaves_fold_consistently() {
        // Hand-folded expectation for a two-level odd tree.
        let leaves: Vec<String> = (0..5).map(|i| h(&format!("tx-{i}"))).collect();

        let l01 = sha256_hex(format!("{}{}", leaves[0], leaves[1]).as_bytes());
        let l23 = sha256_hex(format!("{}{}", leaves[2], leaves[3]).as_bytes());
        let l44 = sha256_hex(format!("{}{}", leaves[4], leaves[4]).as_bytes());

        let m0 = sha256_hex(format!("{l01}{l23}").as_bytes());
        let m1 = sha256_hex(format!("{l44}{l44}").as_bytes());

        let expected = sha256_hex(format!("{m0}{m1}").as_bytes());
        assert_eq!(merkle_root(&leaves), expected);
    }
}
