//! Sibling-path inclusion proofs over a fixed-depth binary Merkle tree.

use crate::{hasher::Hasher, merkle::MAX_DEPTH};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::{Digest, Hasher as CHasher};

/// The sibling digests needed to recompute the root of a tree from one of its leaves, ordered from
/// the leaf level up to (but excluding) the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof<D: Digest> {
    /// The index of the leaf the proof is for.
    pub index: u64,

    /// One sibling digest per level of the tree.
    pub digests: Vec<D>,
}

impl<D: Digest> Proof<D> {
    /// The depth of the tree this proof was generated against.
    pub fn depth(&self) -> usize {
        self.digests.len()
    }

    /// Recompute the root implied by this proof for a leaf with the given digest.
    pub fn root_from_digest<H, S>(&self, hasher: &mut S, leaf: &D) -> D
    where
        H: CHasher<Digest = D>,
        S: Hasher<H>,
    {
        let mut digest = *leaf;
        for (height, sibling) in self.digests.iter().enumerate() {
            digest = if (self.index >> height) & 1 == 0 {
                hasher.node_digest(&digest, sibling)
            } else {
                hasher.node_digest(sibling, &digest)
            };
        }
        digest
    }

    /// Return true if this proof shows that `element` (the encoding of a leaf preimage) is stored
    /// at `self.index` in the tree with the given root.
    pub fn verify<H, S>(&self, hasher: &mut S, element: &[u8], root: &D) -> bool
    where
        H: CHasher<Digest = D>,
        S: Hasher<H>,
    {
        let leaf = hasher.leaf_digest(element);
        self.root_from_digest(hasher, &leaf) == *root
    }
}

impl<D: Digest> Write for Proof<D> {
    fn write(&self, buf: &mut impl BufMut) {
        self.index.write(buf);
        (self.digests.len() as u8).write(buf);
        for digest in &self.digests {
            digest.write(buf);
        }
    }
}

impl<D: Digest> EncodeSize for Proof<D> {
    fn encode_size(&self) -> usize {
        u64::SIZE + u8::SIZE + self.digests.len() * D::SIZE
    }
}

impl<D: Digest> Read for Proof<D> {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let index = u64::read(buf)?;
        let len = u8::read(buf)?;
        if len > MAX_DEPTH {
            return Err(CodecError::Invalid(
                "imt::merkle::Proof",
                "more digests than the maximum depth",
            ));
        }
        if index >> len != 0 {
            return Err(CodecError::Invalid(
                "imt::merkle::Proof",
                "index does not fit the proof depth",
            ));
        }
        let mut digests = Vec::with_capacity(len as usize);
        for _ in 0..len {
            digests.push(D::read(buf)?);
        }
        Ok(Self { index, digests })
    }
}
