//! Nullifier leaves, which carry nothing but their key.

use super::{private::Sealed, read_next, write_next, Element, Error, Next};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, Error as CodecError, FixedSize, Read, ReadExt, Write};
use commonware_utils::hex;
use std::{fmt, marker::PhantomData};

/// The preimage of a nullifier leaf.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Preimage<K: Element> {
    pub key: K,
    pub next: Option<Next<K>>,
}

impl<K: Element> super::Preimage for Preimage<K> {
    type Key = K;
    type Leaf = K;

    fn key(&self) -> &K {
        &self.key
    }

    fn next(&self) -> Option<&Next<K>> {
        self.next.as_ref()
    }

    fn set_next(&mut self, next: Option<Next<K>>) {
        self.next = next;
    }

    fn leaf(&self) -> K {
        self.key.clone()
    }

    fn is_empty(&self) -> bool {
        self.key == K::zero() && self.next.is_none()
    }
}

impl<K: Element> FixedSize for Preimage<K> {
    const SIZE: usize = K::SIZE + Next::<K>::SIZE;
}

impl<K: Element> Write for Preimage<K> {
    fn write(&self, buf: &mut impl BufMut) {
        self.key.write(buf);
        write_next(&self.next, buf);
    }
}

impl<K: Element> Read for Preimage<K> {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let key = K::read(buf)?;
        let next = read_next(buf)?;
        Ok(Self { key, next })
    }
}

impl<K: Element> fmt::Display for Preimage<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.next {
            Some(next) => write!(
                f,
                "[key:{} next:{}@{}]",
                hex(&self.key.encode()),
                hex(&next.key.encode()),
                next.index
            ),
            None => write!(f, "[key:{} next:none]", hex(&self.key.encode())),
        }
    }
}

/// Builds nullifier preimages keyed by `K`.
pub struct Factory<K: Element> {
    _key: PhantomData<K>,
}

impl<K: Element> Factory<K> {
    pub fn new() -> Self {
        Self { _key: PhantomData }
    }
}

impl<K: Element> Default for Factory<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Element> Clone for Factory<K> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<K: Element> Sealed for Factory<K> {}

impl<K: Element> super::Factory for Factory<K> {
    type Key = K;
    type Leaf = K;
    type Preimage = Preimage<K>;

    fn key_of(leaf: &K) -> &K {
        leaf
    }

    fn from_leaf(
        &self,
        leaf: K,
        next_key: Option<K>,
        next_index: Option<u64>,
    ) -> Result<Preimage<K>, Error> {
        Ok(Preimage {
            key: leaf,
            next: Next::from_parts(next_key, next_index)?,
        })
    }

    fn empty(&self) -> Preimage<K> {
        Preimage {
            key: K::zero(),
            next: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preimage::{Factory as _, Preimage as _};
    use commonware_cryptography::sha256;

    #[test]
    fn test_nullifier_from_leaf() {
        let factory = Factory::<u64>::new();
        let preimage = factory.from_leaf(42, Some(50), Some(7)).unwrap();
        assert_eq!(*preimage.key(), 42);
        assert_eq!(preimage.next(), Some(&Next { key: 50, index: 7 }));
        assert_eq!(preimage.leaf(), 42);
        assert!(!preimage.is_empty());

        let max = factory.from_leaf(42, None, None).unwrap();
        assert_eq!(max.next(), None);

        assert!(matches!(
            factory.from_leaf(42, Some(50), None),
            Err(Error::InconsistentSuccessor)
        ));
    }

    #[test]
    fn test_nullifier_empty() {
        let factory = Factory::<sha256::Digest>::new();
        let empty = factory.empty();
        assert!(empty.is_empty());
        assert_eq!(empty.encode().as_ref(), vec![0u8; Preimage::<sha256::Digest>::SIZE]);
    }

    #[test]
    fn test_nullifier_codec() {
        let factory = Factory::<u64>::new();
        let preimage = factory.from_leaf(42, Some(50), Some(7)).unwrap();
        let encoded = preimage.encode();
        assert_eq!(encoded.len(), Preimage::<u64>::SIZE);
        assert_eq!(factory.from_buffer(&encoded).unwrap(), preimage);

        // Truncated input.
        assert!(matches!(
            factory.from_buffer(&encoded[..encoded.len() - 1]),
            Err(Error::Decoding(CodecError::EndOfBuffer))
        ));

        // Trailing input.
        let mut extended = encoded.to_vec();
        extended.push(0);
        assert!(matches!(
            factory.from_buffer(&extended),
            Err(Error::Decoding(CodecError::ExtraData(1)))
        ));
    }

    #[test]
    fn test_nullifier_clone_is_independent() {
        let factory = Factory::<u64>::new();
        let original = factory.from_leaf(1, None, None).unwrap();
        let mut copy = factory.clone_preimage(&original);
        copy.set_next(Some(Next { key: 9, index: 2 }));
        assert_eq!(original.next(), None);
        assert_eq!(copy.next(), Some(&Next { key: 9, index: 2 }));
    }

    #[test]
    fn test_nullifier_display() {
        let factory = Factory::<u64>::new();
        let preimage = factory.from_leaf(1, Some(9), Some(2)).unwrap();
        assert_eq!(
            preimage.to_string(),
            "[key:0000000000000001 next:0000000000000009@2]"
        );
        assert_eq!(
            factory.empty().to_string(),
            "[key:0000000000000000 next:none]"
        );
    }
}
