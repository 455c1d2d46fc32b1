//! Read-only views of an indexed tree as of a retained commit.
//!
//! A [Snapshot] borrows the tree's version history rather than copying it, so building one is
//! constant time and never affects previously built snapshots. A snapshot only observes leaves
//! that existed when its epoch was committed, even after the live tree has grown past them.

use super::{Error, Previous, Tree};
use crate::{
    merkle::{Epoch, Proof},
    preimage::{Factory, KeyOf, PreimageOf},
};
use commonware_cryptography::Hasher as CHasher;

/// Selects a committed state of a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Checkpoint<D> {
    /// The state committed at this epoch.
    Epoch(Epoch),

    /// The most recently committed state with this root.
    Root(D),
}

/// A read-only view of a [Tree] as of a retained epoch.
pub struct Snapshot<'a, F: Factory, H: CHasher> {
    tree: &'a Tree<F, H>,
    epoch: Epoch,
    root: H::Digest,
    size: u64,
}

impl<F: Factory, H: CHasher> Clone for Snapshot<'_, F, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F: Factory, H: CHasher> Copy for Snapshot<'_, F, H> {}

impl<F: Factory, H: CHasher> Tree<F, H> {
    /// Return a view of the tree as of `checkpoint`, which must not have been pruned.
    pub fn snapshot(
        &self,
        checkpoint: Checkpoint<H::Digest>,
    ) -> Result<Snapshot<'_, F, H>, Error> {
        let epoch = match checkpoint {
            Checkpoint::Epoch(epoch) => epoch,
            Checkpoint::Root(root) => self
                .merkle
                .epoch_of(&root)
                .ok_or_else(|| Error::UnknownSnapshot(format!("{checkpoint:?}")))?,
        };
        let unknown = |_| Error::UnknownSnapshot(format!("{checkpoint:?}"));
        let root = self.merkle.historical_root(epoch).map_err(unknown)?;
        let size = self.merkle.historical_size(epoch).map_err(unknown)?;

        Ok(Snapshot {
            tree: self,
            epoch,
            root,
            size,
        })
    }
}

impl<F: Factory, H: CHasher> Snapshot<'_, F, H> {
    /// The epoch this snapshot observes.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// The root of the tree as of this snapshot.
    pub fn root(&self) -> H::Digest {
        self.root
    }

    /// The number of leaves in the tree as of this snapshot.
    pub fn size(&self) -> u64 {
        self.size
    }

    fn check(&self, index: u64) -> Result<(), Error> {
        if index >= self.size {
            return Err(Error::IndexOutOfRange {
                index,
                size: self.size,
            });
        }
        Ok(())
    }

    /// The sibling path of the leaf at `index`.
    pub fn proof(&self, index: u64) -> Result<Proof<H::Digest>, Error> {
        self.check(index)?;
        Ok(self.tree.merkle.historical_proof(index, self.epoch)?)
    }

    /// The digest of the leaf at `index`.
    pub fn leaf_digest(&self, index: u64) -> Result<H::Digest, Error> {
        self.check(index)?;
        Ok(self.tree.merkle.historical_leaf(index, self.epoch)?)
    }

    /// A copy of the preimage stored at `index`.
    pub fn leaf_preimage(&self, index: u64) -> Result<PreimageOf<F>, Error> {
        self.check(index)?;
        self.tree
            .leaves
            .get(index as usize)
            .and_then(|versions| versions.at(self.epoch))
            .map(|preimage| self.tree.factory.clone_preimage(preimage))
            .ok_or(Error::IndexOutOfRange {
                index,
                size: self.size,
            })
    }

    /// The index of the leaf holding the largest key not exceeding `key`, or None if every key
    /// in the snapshot is larger.
    pub fn find_index_of_previous_key(&self, key: &KeyOf<F>) -> Option<Previous> {
        self.tree
            .keys
            .range(..=key)
            .rev()
            .find(|(_, index)| **index < self.size)
            .map(|(found, index)| Previous {
                index: *index,
                already_present: found == key,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hasher::Standard,
        indexed::Config,
        preimage::{nullifier, Preimage as _},
    };
    use commonware_codec::Encode;
    use commonware_cryptography::Sha256;
    use commonware_macros::test_traced;

    type Nullifiers = Tree<nullifier::Factory<u64>, Sha256>;

    fn tree() -> Nullifiers {
        Tree::init(
            nullifier::Factory::new(),
            Config {
                depth: 8,
                zero_leaf: true,
            },
        )
        .unwrap()
    }

    #[test_traced]
    fn test_snapshot_immutability() {
        let mut tree = tree();
        for key in [10, 30] {
            tree.insert(key).unwrap();
        }
        let first = tree.commit();
        let root = tree.root(false);

        let before = tree.snapshot(Checkpoint::Epoch(first)).unwrap();
        let preimages: Vec<_> = (0..3).map(|i| before.leaf_preimage(i).unwrap()).collect();
        let proofs: Vec<_> = (0..3).map(|i| before.proof(i).unwrap()).collect();
        assert_eq!(before.size(), 3);
        assert_eq!(before.root(), root);

        // Relink leaves that existed at the first epoch and grow past its frontier.
        tree.insert(20).unwrap();
        tree.insert(40).unwrap();
        let second = tree.commit();
        let after = tree.snapshot(Checkpoint::Epoch(second)).unwrap();
        assert_eq!(after.size(), 5);
        assert_ne!(after.root(), root);

        let before = tree.snapshot(Checkpoint::Epoch(first)).unwrap();
        assert_eq!(before.root(), root);
        for i in 0..3 {
            assert_eq!(before.leaf_preimage(i).unwrap(), preimages[i as usize]);
            assert_eq!(before.proof(i).unwrap(), proofs[i as usize]);
        }
        assert!(matches!(
            before.leaf_preimage(3),
            Err(Error::IndexOutOfRange { index: 3, size: 3 })
        ));
        assert!(matches!(
            before.proof(4),
            Err(Error::IndexOutOfRange { index: 4, size: 3 })
        ));

        // Every proof of the first snapshot verifies against its root.
        let mut hasher = Standard::<Sha256>::new();
        for i in 0..3 {
            let preimage = before.leaf_preimage(i).unwrap();
            assert!(before
                .proof(i)
                .unwrap()
                .verify(&mut hasher, &preimage.encode(), &root));
            assert_eq!(
                before.leaf_digest(i).unwrap(),
                tree.merkle.historical_leaf(i, first).unwrap()
            );
        }
    }

    #[test]
    fn test_snapshot_by_root() {
        let mut tree = tree();
        tree.insert(7).unwrap();
        let epoch = tree.commit();
        let root = tree.root(false);
        tree.insert(8).unwrap();
        tree.commit();

        let snapshot = tree.snapshot(Checkpoint::Root(root)).unwrap();
        assert_eq!(snapshot.epoch(), epoch);
        assert_eq!(snapshot.size(), 2);

        // Snapshots are cheap copies of a reference.
        let copy = snapshot;
        assert_eq!(copy.epoch(), snapshot.epoch());

        let unknown = <Sha256 as CHasher>::Digest::from([7u8; 32]);
        assert!(matches!(
            tree.snapshot(Checkpoint::Root(unknown)),
            Err(Error::UnknownSnapshot(_))
        ));
        assert!(matches!(
            tree.snapshot(Checkpoint::Epoch(99)),
            Err(Error::UnknownSnapshot(_))
        ));
    }

    #[test]
    fn test_snapshot_previous_key() {
        let mut tree = tree();
        tree.insert(10).unwrap();
        let epoch = tree.commit();
        tree.insert(20).unwrap();
        tree.commit();

        // Keys inserted after the snapshot are invisible to it.
        let snapshot = tree.snapshot(Checkpoint::Epoch(epoch)).unwrap();
        assert_eq!(
            snapshot.find_index_of_previous_key(&25),
            Some(Previous {
                index: 1,
                already_present: false
            })
        );
        assert_eq!(
            snapshot.find_index_of_previous_key(&10),
            Some(Previous {
                index: 1,
                already_present: true
            })
        );
        assert_eq!(
            tree.find_index_of_previous_key(&25, false),
            Some(Previous {
                index: 2,
                already_present: false
            })
        );

        // The low leaf at the snapshot proves absence as of the snapshot.
        let low = snapshot.leaf_preimage(1).unwrap();
        assert_eq!(low.next(), None);
        assert!(crate::preimage::proves_absence(&low, &25));
    }

    #[test]
    fn test_snapshot_after_prune() {
        let mut tree = tree();
        let mut epochs = Vec::new();
        for key in 1..=4u64 {
            tree.insert(key * 10).unwrap();
            epochs.push(tree.commit());
        }
        let kept = tree.snapshot(Checkpoint::Epoch(epochs[2])).unwrap();
        let preimage = kept.leaf_preimage(2).unwrap();
        let proof = kept.proof(2).unwrap();

        tree.prune(epochs[2]).unwrap();
        assert!(matches!(
            tree.snapshot(Checkpoint::Epoch(epochs[1])),
            Err(Error::UnknownSnapshot(_))
        ));
        let kept = tree.snapshot(Checkpoint::Epoch(epochs[2])).unwrap();
        assert_eq!(kept.leaf_preimage(2).unwrap(), preimage);
        assert_eq!(kept.proof(2).unwrap(), proof);
    }
}
