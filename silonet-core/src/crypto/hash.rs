//! Digests of record identifiers.
//!
//! The record id column of a dataset is digested with `SHA256` before the digests are embedded
//! in the curve for blinding. The digests also give the aligned intersection a canonical order
//! that does not leak upload order.
//!
//! See the [crypto module] documentation since this is a private module anyways.
//!
//! [crypto module]: crate::crypto

use sodiumoxide::crypto::hash::sha256;

use super::ByteObject;

#[derive(Hash, Eq, Ord, PartialEq, Copy, Clone, PartialOrd, Debug)]
/// A `SHA256` digest of a record identifier.
pub struct RecordDigest(sha256::Digest);

impl RecordDigest {
    /// Digests the message `m`.
    pub fn digest(m: &[u8]) -> Self {
        Self(sha256::hash(m))
    }
}

impl ByteObject for RecordDigest {
    const LENGTH: usize = sha256::DIGESTBYTES;

    fn zeroed() -> Self {
        Self(sha256::Digest([0_u8; sha256::DIGESTBYTES]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        sha256::Digest::from_slice(bytes).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digests_are_stable() {
        let fst = RecordDigest::digest(b"record-17");
        let snd = RecordDigest::digest(b"record-17");
        assert_eq!(fst, snd);
        assert_eq!(fst.as_slice().len(), RecordDigest::LENGTH);
        assert_ne!(fst, RecordDigest::digest(b"record-18"));
    }
}
