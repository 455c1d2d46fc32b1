//! Public data leaves, which store a value under a slot key.
//!
//! Slots are ordered by key. Inserting a slot that is already present leaves its stored value
//! untouched.

use super::{private::Sealed, read_next, write_next, Element, Error, Next};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, Error as CodecError, FixedSize, Read, ReadExt, Write};
use commonware_utils::hex;
use std::{fmt, marker::PhantomData};

/// A value written to a slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Leaf<K: Element, V: Element> {
    pub slot: K,
    pub value: V,
}

impl<K: Element, V: Element> Leaf<K, V> {
    pub fn new(slot: K, value: V) -> Self {
        Self { slot, value }
    }
}

/// The preimage of a public data leaf.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Preimage<K: Element, V: Element> {
    pub slot: K,
    pub value: V,
    pub next: Option<Next<K>>,
}

impl<K: Element, V: Element> super::Preimage for Preimage<K, V> {
    type Key = K;
    type Leaf = Leaf<K, V>;

    fn key(&self) -> &K {
        &self.slot
    }

    fn next(&self) -> Option<&Next<K>> {
        self.next.as_ref()
    }

    fn set_next(&mut self, next: Option<Next<K>>) {
        self.next = next;
    }

    fn leaf(&self) -> Leaf<K, V> {
        Leaf::new(self.slot.clone(), self.value.clone())
    }

    fn is_empty(&self) -> bool {
        self.slot == K::zero() && self.value == V::zero() && self.next.is_none()
    }
}

impl<K: Element, V: Element> FixedSize for Preimage<K, V> {
    const SIZE: usize = K::SIZE + V::SIZE + Next::<K>::SIZE;
}

impl<K: Element, V: Element> Write for Preimage<K, V> {
    fn write(&self, buf: &mut impl BufMut) {
        self.slot.write(buf);
        self.value.write(buf);
        write_next(&self.next, buf);
    }
}

impl<K: Element, V: Element> Read for Preimage<K, V> {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let slot = K::read(buf)?;
        let value = V::read(buf)?;
        let next = read_next(buf)?;
        Ok(Self { slot, value, next })
    }
}

impl<K: Element, V: Element> fmt::Display for Preimage<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[slot:{} value:{} ",
            hex(&self.slot.encode()),
            hex(&self.value.encode())
        )?;
        match &self.next {
            Some(next) => write!(f, "next:{}@{}]", hex(&next.key.encode()), next.index),
            None => write!(f, "next:none]"),
        }
    }
}

/// Builds public data preimages with slots of type `K` and values of type `V`.
pub struct Factory<K: Element, V: Element> {
    _phantom: PhantomData<(K, V)>,
}

impl<K: Element, V: Element> Factory<K, V> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<K: Element, V: Element> Default for Factory<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Element, V: Element> Clone for Factory<K, V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<K: Element, V: Element> Sealed for Factory<K, V> {}

impl<K: Element, V: Element> super::Factory for Factory<K, V> {
    type Key = K;
    type Leaf = Leaf<K, V>;
    type Preimage = Preimage<K, V>;

    fn key_of(leaf: &Leaf<K, V>) -> &K {
        &leaf.slot
    }

    fn from_leaf(
        &self,
        leaf: Leaf<K, V>,
        next_key: Option<K>,
        next_index: Option<u64>,
    ) -> Result<Preimage<K, V>, Error> {
        Ok(Preimage {
            slot: leaf.slot,
            value: leaf.value,
            next: Next::from_parts(next_key, next_index)?,
        })
    }

    fn empty(&self) -> Preimage<K, V> {
        Preimage {
            slot: K::zero(),
            value: V::zero(),
            next: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preimage::{Factory as _, Preimage as _};
    use commonware_cryptography::sha256;

    type Digest = sha256::Digest;

    fn digest(value: u8) -> Digest {
        Digest::from([value; 32])
    }

    #[test]
    fn test_public_data_from_leaf() {
        let factory = Factory::<Digest, u128>::new();
        let preimage = factory
            .from_leaf(Leaf::new(digest(3), 99), Some(digest(8)), Some(4))
            .unwrap();
        assert_eq!(*preimage.key(), digest(3));
        assert_eq!(preimage.leaf(), Leaf::new(digest(3), 99));
        assert_eq!(
            preimage.next(),
            Some(&Next {
                key: digest(8),
                index: 4
            })
        );
        assert!(matches!(
            factory.from_leaf(Leaf::new(digest(3), 99), None, Some(4)),
            Err(Error::InconsistentSuccessor)
        ));
    }

    #[test]
    fn test_public_data_empty() {
        let factory = Factory::<u64, u64>::new();
        assert!(factory.empty().is_empty());

        // A zero slot holding a non-zero value is not empty.
        let preimage = factory.from_leaf(Leaf::new(0, 1), None, None).unwrap();
        assert!(!preimage.is_empty());
    }

    #[test]
    fn test_public_data_codec() {
        let factory = Factory::<Digest, u128>::new();
        let preimage = factory
            .from_leaf(Leaf::new(digest(3), 99), Some(digest(8)), Some(4))
            .unwrap();
        let encoded = preimage.encode();
        assert_eq!(encoded.len(), 32 + 16 + 1 + 32 + 8);
        assert_eq!(factory.from_buffer(&encoded).unwrap(), preimage);

        assert!(matches!(
            factory.from_buffer(&encoded[..10]),
            Err(Error::Decoding(CodecError::EndOfBuffer))
        ));
    }

    #[test]
    fn test_public_data_display() {
        let factory = Factory::<u32, u32>::new();
        let preimage = factory.from_leaf(Leaf::new(5, 6), Some(9), Some(1)).unwrap();
        assert_eq!(
            preimage.to_string(),
            "[slot:00000005 value:00000006 next:00000009@1]"
        );
    }
}
