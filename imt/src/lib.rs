//! Maintain an indexed Merkle tree with membership and non-membership witnesses.
//!
//! An indexed Merkle tree is a fixed-depth, append-only binary Merkle tree whose leaves are
//! structured records (_preimages_). Each preimage carries a key and a pointer to the leaf holding
//! the next largest key, so that following these pointers from the smallest key visits every leaf
//! in ascending key order. A single root therefore commits to a sorted set, and the leaf whose key
//! immediately precedes some absent key (its _low leaf_) proves that key's absence.
//!
//! # Overview
//!
//! * [merkle::Tree] is the underlying fixed-depth tree. It separates committed state from an
//!   uncommitted overlay and keeps a versioned history of every committed node.
//! * [preimage] defines the closed set of leaf kinds ([preimage::nullifier],
//!   [preimage::public_data]) and the [preimage::Factory] capability used to build them.
//! * [indexed::Tree] maintains the sorted-list invariant over the merkle tree: predecessor search,
//!   batch insertion with witnesses, commit and rollback.
//! * [indexed::Snapshot] answers queries against any retained committed state.
//!
//! # Status
//!
//! `commonware-imt` is **ALPHA** software and is not yet recommended for production use. Developers
//! should expect breaking changes and occasional instability.

pub mod hasher;
mod history;
pub mod indexed;
pub mod merkle;
pub mod preimage;
