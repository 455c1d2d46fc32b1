//! Per-item version history keyed by the epoch at which each version was committed.

use crate::merkle::Epoch;

/// The committed versions of a single item, in increasing epoch order.
#[derive(Clone, Debug)]
pub(crate) struct Versions<T> {
    entries: Vec<(Epoch, T)>,
}

impl<T> Versions<T> {
    /// Create a history whose first version was committed at `epoch`.
    pub(crate) fn new(epoch: Epoch, value: T) -> Self {
        Self {
            entries: vec![(epoch, value)],
        }
    }

    /// Record a new version. Epochs must be pushed in increasing order.
    pub(crate) fn push(&mut self, epoch: Epoch, value: T) {
        debug_assert!(self.entries.last().is_none_or(|(last, _)| *last < epoch));
        self.entries.push((epoch, value));
    }

    /// The most recently committed version.
    pub(crate) fn latest(&self) -> Option<&T> {
        self.entries.last().map(|(_, value)| value)
    }

    /// The version that was current as of `epoch`, if the item existed then.
    pub(crate) fn at(&self, epoch: Epoch) -> Option<&T> {
        let end = self.entries.partition_point(|(e, _)| *e <= epoch);
        if end == 0 {
            return None;
        }
        Some(&self.entries[end - 1].1)
    }

    /// Discard every version that can no longer be observed by an epoch at or after `floor`.
    ///
    /// The newest version committed before `floor` is retained since it remains current at
    /// `floor`.
    pub(crate) fn compact(&mut self, floor: Epoch) {
        let before = self.entries.partition_point(|(e, _)| *e < floor);
        if before > 1 {
            self.entries.drain(..before - 1);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
