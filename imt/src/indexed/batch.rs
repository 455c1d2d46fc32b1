//! Witnesses produced by batch insertion.

use crate::merkle::Proof;
use commonware_cryptography::Digest;

/// The state of a low leaf immediately before it was relinked to a newly inserted successor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowLeafWitness<P, D: Digest> {
    /// The index of the low leaf.
    pub index: u64,

    /// The low leaf's preimage before it was relinked.
    pub preimage: P,

    /// The low leaf's sibling path before it was relinked.
    pub proof: Proof<D>,
}

/// The outcome of inserting one entry of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Witness<P, D: Digest> {
    /// The key was absent and has been appended at `index`.
    Inserted {
        index: u64,

        /// The preimage of the new leaf.
        preimage: P,

        /// The low leaf that now points at the new leaf, or None if the key is smaller than every
        /// key that preceded it (no leaf was relinked).
        low_leaf: Option<LowLeafWitness<P, D>>,

        /// The sibling path of the new leaf just after it was appended.
        proof: Proof<D>,
    },

    /// The key was already in the tree (or earlier in the batch) at `index`, which was left
    /// untouched.
    Present {
        index: u64,
        preimage: P,
        proof: Proof<D>,
    },

    /// A padding entry.
    Padding,
}

impl<P, D: Digest> Witness<P, D> {
    /// The index of the leaf holding the entry's key, if the entry was not padding.
    pub fn index(&self) -> Option<u64> {
        match self {
            Self::Inserted { index, .. } | Self::Present { index, .. } => Some(*index),
            Self::Padding => None,
        }
    }
}

/// The result of a batch insertion.
#[derive(Clone, Debug)]
pub struct BatchInsertionResult<P, D: Digest> {
    /// The root after every entry was inserted (including uncommitted writes).
    pub root: D,

    /// The number of leaves before the batch was inserted.
    pub start_size: u64,

    /// One witness per batch entry, in the order the entries were given.
    pub witnesses: Vec<Witness<P, D>>,

    /// The positions of the non-padding entries in the order they were processed (ascending by
    /// key, ties broken by position).
    pub sorted_indexes: Vec<usize>,
}

impl<P, D: Digest> BatchInsertionResult<P, D> {
    /// The number of leaves appended by the batch.
    pub fn inserted(&self) -> usize {
        self.witnesses
            .iter()
            .filter(|witness| matches!(witness, Witness::Inserted { .. }))
            .count()
    }

    /// The low leaf witness of every entry, in batch order. Entries that did not relink a low leaf
    /// yield None.
    pub fn low_leaf_witnesses(&self) -> impl Iterator<Item = Option<&LowLeafWitness<P, D>>> {
        self.witnesses.iter().map(|witness| match witness {
            Witness::Inserted { low_leaf, .. } => low_leaf.as_ref(),
            _ => None,
        })
    }

    /// The sibling path of every newly appended leaf, in batch order.
    pub fn insertion_witnesses(&self) -> impl Iterator<Item = (u64, &Proof<D>)> {
        self.witnesses.iter().filter_map(|witness| match witness {
            Witness::Inserted { index, proof, .. } => Some((*index, proof)),
            _ => None,
        })
    }
}
