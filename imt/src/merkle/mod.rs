//! A fixed-depth, append-only binary Merkle tree with a commit/rollback boundary.
//!
//! # Terminology
//!
//! A tree of depth `d` has `2^d` leaf slots, filled densely from index 0. Each node is identified
//! by its _height_ (0 for leaves, `d` for the root) and its _index_ within that height. Slots that
//! have never been written hold the digest of an empty leaf, so the root of a partially-filled tree
//! is well defined.
//!
//! # Committed and uncommitted state
//!
//! Writes ([Tree::append_leaves], [Tree::update_leaf]) land in an _overlay_ of pending node digests.
//! Every read takes an `uncommitted` flag: when set, the overlay is consulted before committed state;
//! when unset, the overlay is ignored entirely. [Tree::commit] folds the overlay into committed state
//! and [Tree::rollback] discards it.
//!
//! # History
//!
//! Every commit starts a new [Epoch] and every committed node retains each of its versions, so the
//! root, leaves and sibling paths of any retained epoch can be recovered without copying the tree.
//! Epoch 0 is always the empty tree. [Tree::prune] forgets epochs that are no longer needed.

use crate::{
    hasher::{Hasher, Standard},
    history::Versions,
};
use commonware_cryptography::Hasher as CHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

mod proof;
pub use proof::Proof;

/// The maximum supported depth of a tree.
pub const MAX_DEPTH: u8 = 63;

/// A counter identifying a committed state of a tree.
pub type Epoch = u64;

/// Errors that can occur when interacting with a [Tree].
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid depth: {0}")]
    InvalidDepth(u8),
    #[error("capacity exceeded: {size} leaves + {requested} > {capacity}")]
    CapacityExceeded {
        size: u64,
        requested: u64,
        capacity: u64,
    },
    #[error("index out of range: {index} >= {size}")]
    IndexOutOfRange { index: u64, size: u64 },
    #[error("unknown epoch: {0}")]
    UnknownEpoch(Epoch),
}

/// The location of a node within the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Address {
    height: u8,
    index: u64,
}

impl Address {
    const fn new(height: u8, index: u64) -> Self {
        Self { height, index }
    }
}

/// The root and leaf count of a committed state.
#[derive(Clone, Copy, Debug)]
struct State<D> {
    root: D,
    size: u64,
}

/// Implementation of a fixed-depth binary Merkle tree.
pub struct Tree<H: CHasher> {
    hasher: Standard<H>,
    depth: u8,

    // The digest of an empty subtree at each height, from an empty leaf up to an empty root.
    zeros: Vec<H::Digest>,

    // Every committed version of every node that has ever been written.
    nodes: HashMap<Address, Versions<H::Digest>>,

    // The number of committed leaves.
    size: u64,

    // The retained committed states.
    epochs: BTreeMap<Epoch, State<H::Digest>>,

    // Node digests written since the last commit.
    overlay: HashMap<Address, H::Digest>,

    // The number of leaves including those appended since the last commit.
    pending_size: u64,
}

impl<H: CHasher> Tree<H> {
    /// Return a new (empty) tree of the given depth, where never-written slots hold a leaf whose
    /// preimage encodes to `empty_leaf`.
    pub fn new(depth: u8, empty_leaf: &[u8]) -> Result<Self, Error> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(Error::InvalidDepth(depth));
        }
        let mut hasher = Standard::new();
        let zeros = hasher.zero_digests(depth, empty_leaf);
        let mut epochs = BTreeMap::new();
        epochs.insert(
            0,
            State {
                root: zeros[depth as usize],
                size: 0,
            },
        );

        Ok(Self {
            hasher,
            depth,
            zeros,
            nodes: HashMap::new(),
            size: 0,
            epochs,
            overlay: HashMap::new(),
            pending_size: 0,
        })
    }

    /// The depth of the tree (the length of every sibling path).
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// The maximum number of leaves the tree can hold.
    pub fn capacity(&self) -> u64 {
        1 << self.depth
    }

    /// The number of leaves in the tree, which is also the index of the next appended leaf.
    pub fn size(&self, uncommitted: bool) -> u64 {
        if uncommitted {
            self.pending_size
        } else {
            self.size
        }
    }

    /// Whether there are writes that have been neither committed nor rolled back.
    pub fn has_pending(&self) -> bool {
        !self.overlay.is_empty() || self.pending_size != self.size
    }

    fn node(&self, address: Address, uncommitted: bool) -> H::Digest {
        if uncommitted {
            if let Some(digest) = self.overlay.get(&address) {
                return *digest;
            }
        }
        self.nodes
            .get(&address)
            .and_then(|versions| versions.latest())
            .copied()
            .unwrap_or(self.zeros[address.height as usize])
    }

    fn historical_node(&self, address: Address, epoch: Epoch) -> H::Digest {
        self.nodes
            .get(&address)
            .and_then(|versions| versions.at(epoch))
            .copied()
            .unwrap_or(self.zeros[address.height as usize])
    }

    /// Append the given elements (encoded leaf preimages) at consecutive indices, returning the
    /// index of the first. The tree is left unchanged if they do not all fit.
    pub fn append_leaves<E: AsRef<[u8]>>(&mut self, elements: &[E]) -> Result<u64, Error> {
        let start = self.pending_size;
        let requested = elements.len() as u64;
        if requested > self.capacity() - start {
            return Err(Error::CapacityExceeded {
                size: start,
                requested,
                capacity: self.capacity(),
            });
        }

        let mut dirty = BTreeSet::new();
        for (offset, element) in elements.iter().enumerate() {
            let index = start + offset as u64;
            let digest = self.hasher.leaf_digest(element.as_ref());
            self.overlay.insert(Address::new(0, index), digest);
            dirty.insert(index);
        }
        self.pending_size += requested;
        self.rehash(dirty);

        Ok(start)
    }

    /// Replace the element stored at an existing leaf.
    pub fn update_leaf(&mut self, index: u64, element: &[u8]) -> Result<(), Error> {
        if index >= self.pending_size {
            return Err(Error::IndexOutOfRange {
                index,
                size: self.pending_size,
            });
        }
        let digest = self.hasher.leaf_digest(element);
        self.overlay.insert(Address::new(0, index), digest);
        self.rehash(BTreeSet::from([index]));

        Ok(())
    }

    /// Recompute every ancestor of the given (already written) leaves in the overlay, one height
    /// at a time so shared ancestors are hashed once.
    fn rehash(&mut self, mut dirty: BTreeSet<u64>) {
        for height in 0..self.depth {
            let parents: BTreeSet<u64> = dirty.iter().map(|index| index >> 1).collect();
            for &parent in &parents {
                let left = self.node(Address::new(height, parent << 1), true);
                let right = self.node(Address::new(height, (parent << 1) | 1), true);
                let digest = self.hasher.node_digest(&left, &right);
                self.overlay.insert(Address::new(height + 1, parent), digest);
            }
            dirty = parents;
        }
    }

    /// The digest of the leaf at `index`, or None if no leaf has been written there.
    pub fn leaf(&self, index: u64, uncommitted: bool) -> Option<H::Digest> {
        if index >= self.size(uncommitted) {
            return None;
        }
        Some(self.node(Address::new(0, index), uncommitted))
    }

    /// The root of the tree.
    pub fn root(&self, uncommitted: bool) -> H::Digest {
        self.node(Address::new(self.depth, 0), uncommitted)
    }

    /// The sibling path of the leaf slot at `index`, which need not have been written yet.
    pub fn proof(&self, index: u64, uncommitted: bool) -> Result<Proof<H::Digest>, Error> {
        if index >= self.capacity() {
            return Err(Error::IndexOutOfRange {
                index,
                size: self.capacity(),
            });
        }
        let digests = (0..self.depth)
            .map(|height| self.node(Address::new(height, (index >> height) ^ 1), uncommitted))
            .collect();

        Ok(Proof { index, digests })
    }

    /// Fold the overlay into committed state, returning the epoch of the new committed state.
    pub fn commit(&mut self) -> Epoch {
        let epoch = self.latest_epoch() + 1;
        let written = self.overlay.len();
        for (address, digest) in self.overlay.drain() {
            match self.nodes.get_mut(&address) {
                Some(versions) => versions.push(epoch, digest),
                None => {
                    self.nodes.insert(address, Versions::new(epoch, digest));
                }
            }
        }
        self.size = self.pending_size;
        let root = self.root(false);
        self.epochs.insert(
            epoch,
            State {
                root,
                size: self.size,
            },
        );
        debug!(epoch, size = self.size, written, %root, "committed tree");

        epoch
    }

    /// Discard every write since the last commit.
    pub fn rollback(&mut self) {
        if self.has_pending() {
            warn!(
                nodes = self.overlay.len(),
                leaves = self.pending_size - self.size,
                "discarding uncommitted writes"
            );
        }
        self.overlay.clear();
        self.pending_size = self.size;
    }

    /// The epoch of the most recent commit.
    pub fn latest_epoch(&self) -> Epoch {
        self.epochs
            .last_key_value()
            .map(|(epoch, _)| *epoch)
            .expect("the latest epoch is never pruned")
    }

    /// The oldest epoch that has not been pruned.
    pub fn oldest_epoch(&self) -> Epoch {
        self.epochs
            .first_key_value()
            .map(|(epoch, _)| *epoch)
            .expect("the latest epoch is never pruned")
    }

    fn state(&self, epoch: Epoch) -> Result<&State<H::Digest>, Error> {
        self.epochs.get(&epoch).ok_or(Error::UnknownEpoch(epoch))
    }

    /// The most recent retained epoch whose root is `root`, if any.
    pub fn epoch_of(&self, root: &H::Digest) -> Option<Epoch> {
        self.epochs
            .iter()
            .rev()
            .find(|(_, state)| state.root == *root)
            .map(|(epoch, _)| *epoch)
    }

    /// The root of the tree as of `epoch`.
    pub fn historical_root(&self, epoch: Epoch) -> Result<H::Digest, Error> {
        self.state(epoch).map(|state| state.root)
    }

    /// The number of leaves in the tree as of `epoch`.
    pub fn historical_size(&self, epoch: Epoch) -> Result<u64, Error> {
        self.state(epoch).map(|state| state.size)
    }

    /// The digest of the leaf at `index` as of `epoch`.
    pub fn historical_leaf(&self, index: u64, epoch: Epoch) -> Result<H::Digest, Error> {
        let size = self.historical_size(epoch)?;
        if index >= size {
            return Err(Error::IndexOutOfRange { index, size });
        }
        Ok(self.historical_node(Address::new(0, index), epoch))
    }

    /// The sibling path of the leaf at `index` as of `epoch`. Only leaves that existed at `epoch`
    /// can be proven.
    pub fn historical_proof(&self, index: u64, epoch: Epoch) -> Result<Proof<H::Digest>, Error> {
        let size = self.historical_size(epoch)?;
        if index >= size {
            return Err(Error::IndexOutOfRange { index, size });
        }
        let digests = (0..self.depth)
            .map(|height| self.historical_node(Address::new(height, (index >> height) ^ 1), epoch))
            .collect();

        Ok(Proof { index, digests })
    }

    /// Forget every epoch before `epoch`, which must be retained. Node versions that can no
    /// longer be observed by a retained epoch are dropped.
    pub fn prune(&mut self, epoch: Epoch) -> Result<(), Error> {
        self.state(epoch)?;
        if epoch == self.oldest_epoch() {
            return Ok(());
        }
        let retained = self.epochs.split_off(&epoch);
        let pruned = self.epochs.len();
        self.epochs = retained;
        for versions in self.nodes.values_mut() {
            versions.compact(epoch);
        }
        debug!(epoch, pruned, "pruned epochs");

        Ok(())
    }
}
