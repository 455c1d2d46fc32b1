//! Decorator for a cryptographic hasher that implements the tree-specific hashing logic.

use commonware_cryptography::Hasher as CHasher;

/// Prefix prepended to the encoding of a leaf preimage before hashing.
const LEAF_PREFIX: u8 = 0;

/// Prefix prepended to the digests of two children before hashing.
const NODE_PREFIX: u8 = 1;

/// A trait for computing the leaf and node digests of a fixed-depth binary Merkle tree.
pub trait Hasher<H: CHasher>: Send + Sync {
    /// Computes the digest of a leaf given the encoding of its preimage.
    fn leaf_digest(&mut self, element: &[u8]) -> H::Digest;

    /// Computes the digest of a node given the digests of its children.
    fn node_digest(&mut self, left: &H::Digest, right: &H::Digest) -> H::Digest;

    /// Access the inner [CHasher] hasher.
    fn inner(&mut self) -> &mut H;
}

/// The standard hasher, which separates leaves from internal nodes with a one-byte prefix.
#[derive(Clone)]
pub struct Standard<H: CHasher> {
    hasher: H,
}

impl<H: CHasher> Default for Standard<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: CHasher> Standard<H> {
    /// Creates a new [Standard] hasher.
    pub fn new() -> Self {
        Self { hasher: H::new() }
    }

    /// Returns the digest of an empty subtree at every height from 0 (an empty leaf, whose
    /// preimage encodes to `empty_leaf`) through `depth` (the root of an empty tree).
    pub fn zero_digests(&mut self, depth: u8, empty_leaf: &[u8]) -> Vec<H::Digest> {
        let mut digests = Vec::with_capacity(depth as usize + 1);
        let mut digest = self.leaf_digest(empty_leaf);
        digests.push(digest);
        for _ in 0..depth {
            digest = self.node_digest(&digest, &digest);
            digests.push(digest);
        }
        digests
    }
}

impl<H: CHasher> Hasher<H> for Standard<H> {
    fn leaf_digest(&mut self, element: &[u8]) -> H::Digest {
        self.hasher.update(&[LEAF_PREFIX]);
        self.hasher.update(element);
        self.hasher.finalize()
    }

    fn node_digest(&mut self, left: &H::Digest, right: &H::Digest) -> H::Digest {
        self.hasher.update(&[NODE_PREFIX]);
        self.hasher.update(left.as_ref());
        self.hasher.update(right.as_ref());
        self.hasher.finalize()
    }

    fn inner(&mut self) -> &mut H {
        &mut self.hasher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_cryptography::Sha256;

    fn test_digest<H: CHasher>(value: u8) -> H::Digest {
        let mut hasher = H::new();
        hasher.update(&[value]);
        hasher.finalize()
    }

    #[test]
    fn test_leaf_digest_sha256() {
        let mut hasher = Standard::<Sha256>::new();
        let out = hasher.leaf_digest(b"element");
        assert_ne!(out, test_digest::<Sha256>(0), "hash should be non-zero");

        let out2 = hasher.leaf_digest(b"element");
        assert_eq!(out, out2, "hash should be re-computed consistently");

        let out2 = hasher.leaf_digest(b"elemenu");
        assert_ne!(out, out2, "hash should change with different input");
    }

    #[test]
    fn test_node_digest_sha256() {
        let mut hasher = Standard::<Sha256>::new();
        let d1 = test_digest::<Sha256>(1);
        let d2 = test_digest::<Sha256>(2);
        let d3 = test_digest::<Sha256>(3);

        let out = hasher.node_digest(&d1, &d2);
        assert_eq!(out, hasher.node_digest(&d1, &d2));
        assert_ne!(out, hasher.node_digest(&d3, &d2));
        assert_ne!(out, hasher.node_digest(&d1, &d3));
        assert_ne!(
            out,
            hasher.node_digest(&d2, &d1),
            "hash should change when swapping order of inputs"
        );
    }

    #[test]
    fn test_leaf_and_node_domains_differ() {
        let mut hasher = Standard::<Sha256>::new();
        let d1 = test_digest::<Sha256>(1);
        let d2 = test_digest::<Sha256>(2);
        let mut concatenated = d1.as_ref().to_vec();
        concatenated.extend_from_slice(d2.as_ref());
        assert_ne!(
            hasher.leaf_digest(&concatenated),
            hasher.node_digest(&d1, &d2)
        );
    }

    #[test]
    fn test_inner_hasher() {
        let mut hasher = Standard::<Sha256>::new();
        hasher.inner().update(&[7]);
        assert_eq!(hasher.inner().finalize(), test_digest::<Sha256>(7));

        // The inner hasher is reset after every digest.
        let leaf = hasher.leaf_digest(b"element");
        hasher.inner().update(&[LEAF_PREFIX]);
        hasher.inner().update(b"element");
        assert_eq!(hasher.inner().finalize(), leaf);
    }

    #[test]
    fn test_zero_digests() {
        let mut hasher = Standard::<Sha256>::new();
        let zeros = hasher.zero_digests(4, &[0u8; 8]);
        assert_eq!(zeros.len(), 5);
        assert_eq!(zeros[0], hasher.leaf_digest(&[0u8; 8]));
        for height in 1..zeros.len() {
            let below = zeros[height - 1];
            assert_eq!(zeros[height], hasher.node_digest(&below, &below));
        }
    }
}
