//! Leaf preimages of an indexed Merkle tree and the factories that build them.
//!
//! A _preimage_ is the structured record whose canonical encoding is hashed into a leaf. Every
//! preimage carries a key and an optional [Next] pointer to the leaf holding the next largest key,
//! so the leaves of a tree form a sorted singly linked list over tree indices. A preimage without a
//! successor is the current maximum.
//!
//! The set of leaf kinds is closed: [nullifier] leaves carry only a key, while [public_data] leaves
//! also carry a value stored under their key. Trees are generic over a [Factory], which is the only
//! way an indexed tree constructs or decodes preimages.

use bytes::{Buf, BufMut};
use commonware_codec::{DecodeExt, Error as CodecError, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::sha256;
use std::{fmt::Debug, hash::Hash};
use thiserror::Error;

pub mod nullifier;
pub mod public_data;

/// Errors that can occur when building or decoding a preimage.
#[derive(Error, Debug)]
pub enum Error {
    #[error("successor key and index must both be present or both be absent")]
    InconsistentSuccessor,
    #[error("decoding failed: {0}")]
    Decoding(#[from] CodecError),
}

/// A fixed-width, totally ordered item that can be stored in a preimage.
pub trait Element:
    Clone + Ord + Hash + Debug + Send + Sync + 'static + Write + Read<Cfg = ()> + FixedSize
{
    /// The smallest element, whose encoding is all zeros.
    fn zero() -> Self;
}

impl Element for u32 {
    fn zero() -> Self {
        0
    }
}

impl Element for u64 {
    fn zero() -> Self {
        0
    }
}

impl Element for u128 {
    fn zero() -> Self {
        0
    }
}

impl Element for sha256::Digest {
    fn zero() -> Self {
        Self::from([0u8; 32])
    }
}

/// A pointer to the leaf holding the next largest key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Next<K: Element> {
    pub key: K,
    pub index: u64,
}

impl<K: Element> Next<K> {
    /// The encoded size of an optional successor: a presence byte, a key and an index.
    pub const SIZE: usize = bool::SIZE + K::SIZE + u64::SIZE;

    /// Combine a successor key and index, which must either both be present or both be absent.
    pub fn from_parts(key: Option<K>, index: Option<u64>) -> Result<Option<Self>, Error> {
        match (key, index) {
            (Some(key), Some(index)) => Ok(Some(Self { key, index })),
            (None, None) => Ok(None),
            _ => Err(Error::InconsistentSuccessor),
        }
    }
}

/// Write an optional successor. An absent successor is written as zeros of the same width.
pub(crate) fn write_next<K: Element>(next: &Option<Next<K>>, buf: &mut impl BufMut) {
    match next {
        Some(next) => {
            true.write(buf);
            next.key.write(buf);
            next.index.write(buf);
        }
        None => {
            false.write(buf);
            K::zero().write(buf);
            0u64.write(buf);
        }
    }
}

/// Read an optional successor written by [write_next].
pub(crate) fn read_next<K: Element>(buf: &mut impl Buf) -> Result<Option<Next<K>>, CodecError> {
    let present = bool::read(buf)?;
    let key = K::read(buf)?;
    let index = u64::read(buf)?;
    if present {
        return Ok(Some(Next { key, index }));
    }
    if key != K::zero() || index != 0 {
        return Err(CodecError::Invalid(
            "imt::preimage::Next",
            "absent successor with non-zero padding",
        ));
    }
    Ok(None)
}

mod private {
    pub trait Sealed {}
}

/// The record stored at a leaf of an indexed Merkle tree.
pub trait Preimage:
    Clone + Debug + PartialEq + Eq + Send + Sync + 'static + Write + Read<Cfg = ()> + FixedSize
{
    /// The ordering key of the preimage.
    type Key: Element;

    /// The application-level leaf the preimage was built from.
    type Leaf: Clone + Debug + PartialEq + Eq + Send + Sync + 'static;

    /// The key of this preimage.
    fn key(&self) -> &Self::Key;

    /// The successor of this preimage, or None if it holds the largest key.
    fn next(&self) -> Option<&Next<Self::Key>>;

    /// Point this preimage at a new successor.
    fn set_next(&mut self, next: Option<Next<Self::Key>>);

    /// The leaf this preimage was built from.
    fn leaf(&self) -> Self::Leaf;

    /// Whether this is the empty preimage held by never-written slots.
    fn is_empty(&self) -> bool;
}

/// Builds and decodes the preimages of one leaf kind.
pub trait Factory: Clone + Send + Sync + 'static + private::Sealed {
    /// The ordering key of the leaf kind.
    type Key: Element;

    /// The application-level leaf inserted into a tree.
    type Leaf: Clone + Debug + PartialEq + Eq + Send + Sync + 'static;

    /// The preimage built from a leaf.
    type Preimage: Preimage<Key = Self::Key, Leaf = Self::Leaf>;

    /// The key a leaf is ordered by.
    fn key_of(leaf: &Self::Leaf) -> &Self::Key;

    /// Build a preimage from a leaf and its successor pointer, where `next_key` and `next_index`
    /// must either both be present or both be absent.
    fn from_leaf(
        &self,
        leaf: Self::Leaf,
        next_key: Option<Self::Key>,
        next_index: Option<u64>,
    ) -> Result<Self::Preimage, Error>;

    /// Decode a preimage from its canonical encoding.
    fn from_buffer(&self, buf: &[u8]) -> Result<Self::Preimage, Error> {
        Self::Preimage::decode(buf).map_err(Error::Decoding)
    }

    /// The preimage of a slot that has never been written.
    fn empty(&self) -> Self::Preimage;

    /// Return an independent copy of `preimage`.
    fn clone_preimage(&self, preimage: &Self::Preimage) -> Self::Preimage {
        preimage.clone()
    }
}

/// The key type of a [Factory].
pub type KeyOf<F> = <F as Factory>::Key;

/// The leaf type of a [Factory].
pub type LeafOf<F> = <F as Factory>::Leaf;

/// The preimage type of a [Factory].
pub type PreimageOf<F> = <F as Factory>::Preimage;

/// Return true if `key` falls strictly between the key of `preimage` and that of its successor,
/// meaning `preimage` is the low leaf that proves `key` is absent.
pub fn proves_absence<P: Preimage>(preimage: &P, key: &P::Key) -> bool {
    if preimage.key() >= key {
        return false;
    }
    match preimage.next() {
        Some(next) => *key < next.key,
        None => true,
    }
}
