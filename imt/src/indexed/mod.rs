//! An indexed Merkle tree: a [merkle::Tree] whose leaves form a sorted linked list.
//!
//! Each leaf stores a [Preimage] whose [Next] pointer names the leaf holding the next largest key.
//! Inserting a key finds its _low leaf_ (the leaf holding the largest smaller key), relinks the low
//! leaf to point at the new leaf and appends the new leaf with the low leaf's old successor. The
//! sibling path of the low leaf before it was relinked proves the key was absent, and the sibling
//! path of the new leaf after it was appended proves where it landed.
//!
//! # Committed and uncommitted state
//!
//! Insertions only ever write to an uncommitted overlay (in both the tree of digests and the table
//! of preimages). Every read takes an `uncommitted` flag selecting whether the overlay is visible.
//! [Tree::commit] makes the overlay durable under a new [Epoch] and [Tree::rollback] discards it, so
//! any number of batches can be composed before a single commit.
//!
//! # Keys smaller than every leaf
//!
//! A key smaller than every key in the tree has no low leaf. Such a key is appended pointing at the
//! current minimum and no leaf is relinked, so the chain simply gains a new head. Trees configured
//! with a zero leaf ([Config::zero_leaf]) hold the smallest possible key at index 0 and therefore
//! never take this path.
//!
//! # Example
//!
//! ```rust
//! use commonware_cryptography::Sha256;
//! use commonware_imt::{
//!     indexed::{Config, Previous, Tree, Witness},
//!     preimage::nullifier,
//! };
//!
//! let cfg = Config { depth: 16, zero_leaf: true };
//! let mut tree = Tree::<_, Sha256>::init(nullifier::Factory::<u64>::new(), cfg).unwrap();
//!
//! let result = tree.batch_insert(&[Some(30), Some(10), Some(30), None], 2, true).unwrap();
//! assert_eq!(result.inserted(), 2);
//! assert!(matches!(result.witnesses[2], Witness::Present { index: 2, .. }));
//!
//! tree.commit();
//! assert_eq!(
//!     tree.find_index_of_previous_key(&20, false),
//!     Some(Previous { index: 1, already_present: false }),
//! );
//! ```

use crate::{
    history::Versions,
    merkle::{self, Epoch, Proof},
    preimage::{self, Factory, KeyOf, LeafOf, Next, Preimage, PreimageOf},
};
use commonware_codec::Encode;
use commonware_cryptography::Hasher as CHasher;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, warn};

mod batch;
pub use batch::{BatchInsertionResult, LowLeafWitness, Witness};
mod snapshot;
pub use snapshot::{Checkpoint, Snapshot};

/// Errors that can occur when interacting with an indexed [Tree].
#[derive(Error, Debug)]
pub enum Error {
    #[error("merkle error: {0}")]
    Merkle(#[from] merkle::Error),
    #[error("preimage error: {0}")]
    Preimage(#[from] preimage::Error),
    #[error("invalid batch size: {len} leaves for subtree height {subtree_height}")]
    InvalidBatchSize { len: usize, subtree_height: u8 },
    #[error("uncommitted changes pending")]
    PendingChanges,
    #[error("unknown snapshot: {0}")]
    UnknownSnapshot(String),
    #[error("index out of range: {index} >= {size}")]
    IndexOutOfRange { index: u64, size: u64 },
}

/// Configuration for an indexed [Tree].
#[derive(Clone, Debug)]
pub struct Config {
    /// The depth of the tree, which holds at most `2^depth` leaves.
    pub depth: u8,

    /// If set, the empty preimage (holding the smallest key) is committed at index 0 when the
    /// tree is initialized.
    pub zero_leaf: bool,
}

/// The result of a predecessor search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Previous {
    /// The index of the leaf holding the largest key not exceeding the searched key.
    pub index: u64,

    /// Whether that leaf holds exactly the searched key.
    pub already_present: bool,
}

/// The witness type of a tree built with factory `F` and hasher `H`.
pub type WitnessOf<F, H> = Witness<PreimageOf<F>, <H as CHasher>::Digest>;

/// The batch insertion result type of a tree built with factory `F` and hasher `H`.
pub type ResultOf<F, H> = BatchInsertionResult<PreimageOf<F>, <H as CHasher>::Digest>;

/// An indexed Merkle tree over the leaf kind built by `F`.
pub struct Tree<F: Factory, H: CHasher> {
    factory: F,
    merkle: merkle::Tree<H>,

    // Every committed version of the preimage at each index.
    leaves: Vec<Versions<PreimageOf<F>>>,

    // The index of every committed key.
    keys: BTreeMap<KeyOf<F>, u64>,

    // Preimages written (appended or relinked) since the last commit.
    pending_leaves: BTreeMap<u64, PreimageOf<F>>,

    // The index of every key appended since the last commit.
    pending_keys: BTreeMap<KeyOf<F>, u64>,
}

impl<F: Factory, H: CHasher> Tree<F, H> {
    /// Initialize a new tree with the given configuration.
    pub fn init(factory: F, cfg: Config) -> Result<Self, Error> {
        let empty = factory.empty();
        let merkle = merkle::Tree::new(cfg.depth, &empty.encode())?;
        let mut tree = Self {
            factory,
            merkle,
            leaves: Vec::new(),
            keys: BTreeMap::new(),
            pending_leaves: BTreeMap::new(),
            pending_keys: BTreeMap::new(),
        };
        if cfg.zero_leaf {
            tree.append(empty)?;
            tree.commit();
        }

        Ok(tree)
    }

    /// The factory used to build this tree's preimages.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// The depth of the tree.
    pub fn depth(&self) -> u8 {
        self.merkle.depth()
    }

    /// The maximum number of leaves the tree can hold.
    pub fn capacity(&self) -> u64 {
        self.merkle.capacity()
    }

    /// The number of leaves in the tree.
    pub fn size(&self, uncommitted: bool) -> u64 {
        self.merkle.size(uncommitted)
    }

    /// The root of the tree.
    pub fn root(&self, uncommitted: bool) -> H::Digest {
        self.merkle.root(uncommitted)
    }

    /// The sibling path of the leaf slot at `index`.
    pub fn proof(&self, index: u64, uncommitted: bool) -> Result<Proof<H::Digest>, Error> {
        Ok(self.merkle.proof(index, uncommitted)?)
    }

    /// The digest of the leaf at `index`, or None if it has not been written.
    pub fn leaf_digest(&self, index: u64, uncommitted: bool) -> Option<H::Digest> {
        self.merkle.leaf(index, uncommitted)
    }

    /// The epoch of the most recent commit.
    pub fn latest_epoch(&self) -> Epoch {
        self.merkle.latest_epoch()
    }

    /// Whether there are insertions that have been neither committed nor rolled back.
    pub fn has_pending(&self) -> bool {
        self.merkle.has_pending() || !self.pending_leaves.is_empty()
    }

    fn preimage(&self, index: u64, uncommitted: bool) -> Option<&PreimageOf<F>> {
        if uncommitted {
            if let Some(preimage) = self.pending_leaves.get(&index) {
                return Some(preimage);
            }
        }
        self.leaves
            .get(index as usize)
            .and_then(|versions| versions.latest())
    }

    /// A copy of the preimage at `index`, or None if it has not been written.
    pub fn get_latest_leaf_preimage_copy(
        &self,
        index: u64,
        uncommitted: bool,
    ) -> Option<PreimageOf<F>> {
        self.preimage(index, uncommitted)
            .map(|preimage| self.factory.clone_preimage(preimage))
    }

    fn latest(&self, index: u64) -> Result<PreimageOf<F>, Error> {
        self.get_latest_leaf_preimage_copy(index, true)
            .ok_or(Error::IndexOutOfRange {
                index,
                size: self.size(true),
            })
    }

    /// The index of the leaf holding the largest key not exceeding `key`, or None if every key
    /// in the tree is larger (or the tree is empty).
    pub fn find_index_of_previous_key(
        &self,
        key: &KeyOf<F>,
        uncommitted: bool,
    ) -> Option<Previous> {
        let committed = self.keys.range(..=key).next_back();
        let pending = match uncommitted {
            true => self.pending_keys.range(..=key).next_back(),
            false => None,
        };
        let (found, index) = match (committed, pending) {
            (Some(committed), Some(pending)) => committed.max(pending),
            (Some(found), None) | (None, Some(found)) => found,
            (None, None) => return None,
        };

        Some(Previous {
            index: *index,
            already_present: found == key,
        })
    }

    /// The index of the leaf holding exactly `key`, if any.
    pub fn find_leaf_index(&self, key: &KeyOf<F>, uncommitted: bool) -> Option<u64> {
        if uncommitted {
            if let Some(index) = self.pending_keys.get(key) {
                return Some(*index);
            }
        }
        self.keys.get(key).copied()
    }

    /// The key and index of the smallest leaf.
    fn minimum(&self, uncommitted: bool) -> Option<(&KeyOf<F>, u64)> {
        let committed = self.keys.first_key_value();
        let pending = match uncommitted {
            true => self.pending_keys.first_key_value(),
            false => None,
        };
        [committed, pending]
            .into_iter()
            .flatten()
            .min()
            .map(|(key, index)| (key, *index))
    }

    /// Iterate over the leaves in ascending key order by following successor pointers from the
    /// smallest leaf.
    pub fn iter_sorted(
        &self,
        uncommitted: bool,
    ) -> impl Iterator<Item = (u64, &PreimageOf<F>)> + '_ {
        let first = self.minimum(uncommitted).and_then(|(_, index)| {
            self.preimage(index, uncommitted)
                .map(|preimage| (index, preimage))
        });
        std::iter::successors(first, move |(_, preimage)| {
            let index = preimage.next()?.index;
            self.preimage(index, uncommitted)
                .map(|preimage| (index, preimage))
        })
    }

    /// Fail if appending every distinct absent key among `leaves` would exceed capacity.
    fn check_capacity<'a>(
        &self,
        leaves: impl Iterator<Item = &'a LeafOf<F>>,
    ) -> Result<(), Error>
    where
        LeafOf<F>: 'a,
    {
        let fresh: BTreeSet<&KeyOf<F>> = leaves
            .map(F::key_of)
            .filter(|key| self.find_leaf_index(key, true).is_none())
            .collect();
        let size = self.size(true);
        let capacity = self.capacity();
        let requested = fresh.len() as u64;
        if requested > capacity - size {
            return Err(merkle::Error::CapacityExceeded {
                size,
                requested,
                capacity,
            }
            .into());
        }
        Ok(())
    }

    /// Append a preimage at the next free index.
    fn append(&mut self, preimage: PreimageOf<F>) -> Result<u64, Error> {
        let index = self.merkle.append_leaves(&[preimage.encode()])?;
        self.pending_keys.insert(preimage.key().clone(), index);
        self.pending_leaves.insert(index, preimage);
        Ok(index)
    }

    /// Overwrite the preimage at an existing index.
    fn relink(&mut self, index: u64, preimage: PreimageOf<F>) -> Result<(), Error> {
        self.merkle.update_leaf(index, &preimage.encode())?;
        self.pending_leaves.insert(index, preimage);
        Ok(())
    }

    /// Insert a single leaf whose capacity has already been checked.
    fn insert_one(&mut self, leaf: LeafOf<F>) -> Result<WitnessOf<F, H>, Error> {
        let key = F::key_of(&leaf).clone();
        let previous = self.find_index_of_previous_key(&key, true);

        // The key is already present: nothing to write.
        if let Some(Previous {
            index,
            already_present: true,
        }) = previous
        {
            return Ok(Witness::Present {
                index,
                preimage: self.latest(index)?,
                proof: self.merkle.proof(index, true)?,
            });
        }

        // No leaf holds a smaller key: the new leaf becomes the head of the chain.
        let Some(Previous { index: low, .. }) = previous else {
            let (next_key, next_index) = self
                .minimum(true)
                .map(|(key, index)| (key.clone(), index))
                .unzip();
            let preimage = self.factory.from_leaf(leaf, next_key, next_index)?;
            let index = self.append(self.factory.clone_preimage(&preimage))?;
            return Ok(Witness::Inserted {
                index,
                preimage,
                low_leaf: None,
                proof: self.merkle.proof(index, true)?,
            });
        };

        let low_preimage = self.latest(low)?;
        let low_proof = self.merkle.proof(low, true)?;
        let index = self.size(true);
        let (next_key, next_index) = low_preimage
            .next()
            .map(|next| (next.key.clone(), next.index))
            .unzip();
        let preimage = self.factory.from_leaf(leaf, next_key, next_index)?;
        let mut relinked = self.factory.clone_preimage(&low_preimage);
        relinked.set_next(Some(Next { key, index }));

        self.relink(low, relinked)?;
        self.append(self.factory.clone_preimage(&preimage))?;

        Ok(Witness::Inserted {
            index,
            preimage,
            low_leaf: Some(LowLeafWitness {
                index: low,
                preimage: low_preimage,
                proof: low_proof,
            }),
            proof: self.merkle.proof(index, true)?,
        })
    }

    /// Insert a batch of `2^subtree_height` leaves, where `None` entries are padding.
    ///
    /// Leaves are inserted in ascending key order (ties broken by position), each one observing
    /// the writes of those before it. A key that is already present (in the tree or earlier in
    /// the batch) is not inserted again. The batch is validated before anything is written, so
    /// a failed call leaves the tree untouched.
    ///
    /// Writes are always uncommitted. If `uncommitted` is false, the batch is only accepted when
    /// there is no pending overlay.
    pub fn batch_insert(
        &mut self,
        leaves: &[Option<LeafOf<F>>],
        subtree_height: u8,
        uncommitted: bool,
    ) -> Result<ResultOf<F, H>, Error> {
        if subtree_height > self.depth() || leaves.len() as u64 != 1 << subtree_height {
            return Err(Error::InvalidBatchSize {
                len: leaves.len(),
                subtree_height,
            });
        }
        if !uncommitted && self.has_pending() {
            return Err(Error::PendingChanges);
        }
        self.check_capacity(leaves.iter().flatten())?;

        let start_size = self.size(true);
        let mut entries: Vec<(usize, &LeafOf<F>)> = leaves
            .iter()
            .enumerate()
            .filter_map(|(position, leaf)| leaf.as_ref().map(|leaf| (position, leaf)))
            .collect();
        entries.sort_by(|(_, a), (_, b)| F::key_of(a).cmp(F::key_of(b)));

        let mut witnesses: Vec<WitnessOf<F, H>> = leaves.iter().map(|_| Witness::Padding).collect();
        for (position, leaf) in &entries {
            witnesses[*position] = self.insert_one((*leaf).clone())?;
        }
        let result = BatchInsertionResult {
            root: self.merkle.root(true),
            start_size,
            witnesses,
            sorted_indexes: entries.iter().map(|(position, _)| *position).collect(),
        };
        debug!(
            start_size,
            inserted = result.inserted(),
            padding = leaves.len() - entries.len(),
            root = %result.root,
            "inserted batch"
        );

        Ok(result)
    }

    /// Insert a single leaf.
    pub fn insert(&mut self, leaf: LeafOf<F>) -> Result<WitnessOf<F, H>, Error> {
        self.check_capacity(std::iter::once(&leaf))?;
        self.insert_one(leaf)
    }

    /// Insert each leaf in the order given, returning one witness per leaf.
    pub fn append_leaves(&mut self, leaves: &[LeafOf<F>]) -> Result<Vec<WitnessOf<F, H>>, Error> {
        self.check_capacity(leaves.iter())?;
        leaves
            .iter()
            .map(|leaf| self.insert_one(leaf.clone()))
            .collect()
    }

    /// Make every uncommitted insertion durable, returning the new epoch.
    pub fn commit(&mut self) -> Epoch {
        let epoch = self.merkle.commit();
        let written = self.pending_leaves.len();
        for (index, preimage) in std::mem::take(&mut self.pending_leaves) {
            match self.leaves.get_mut(index as usize) {
                Some(versions) => versions.push(epoch, preimage),
                None => self.leaves.push(Versions::new(epoch, preimage)),
            }
        }
        self.keys.append(&mut self.pending_keys);
        debug_assert_eq!(self.leaves.len() as u64, self.merkle.size(false));
        debug!(epoch, written, size = self.leaves.len(), "committed indexed tree");

        epoch
    }

    /// Discard every uncommitted insertion.
    pub fn rollback(&mut self) {
        if !self.pending_leaves.is_empty() {
            warn!(
                preimages = self.pending_leaves.len(),
                keys = self.pending_keys.len(),
                "rolling back indexed tree"
            );
        }
        self.merkle.rollback();
        self.pending_leaves.clear();
        self.pending_keys.clear();
    }

    /// Forget every epoch before `epoch`. Snapshots of pruned epochs can no longer be built.
    pub fn prune(&mut self, epoch: Epoch) -> Result<(), Error> {
        self.merkle.prune(epoch)?;
        for versions in &mut self.leaves {
            versions.compact(epoch);
        }
        Ok(())
    }
}
