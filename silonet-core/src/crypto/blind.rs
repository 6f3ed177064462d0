//! Wrappers around the [sodiumoxide] scalar multiplication primitives.
//!
//! During set alignment every party blinds the digests of its record identifiers with a secret
//! scalar. Blinding commutes, so a digest that has been blinded by every party ends up as the same
//! group element regardless of the order in which the factors were applied. Matching those final
//! elements reveals the intersection and nothing else.
//!
//! See the [crypto module] documentation since this is a private module anyways.
//!
//! [sodiumoxide]: https://docs.rs/sodiumoxide/
//! [crypto module]: crate::crypto

use derive_more::{AsMut, AsRef, From};
use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::scalarmult::{scalarmult, GroupElement, Scalar, GROUPELEMENTBYTES};
use thiserror::Error;

use super::{hash::RecordDigest, ByteObject};

#[derive(Error, Debug, Eq, PartialEq)]
#[error("blinding of a record digest failed: the point is of low order")]
/// An error related to the blinding of a record digest.
pub struct BlindingError;

#[derive(AsRef, AsMut, From, Serialize, Deserialize, Eq, PartialEq, Clone, Debug)]
/// A `C25519` secret scalar with which a party blinds record digests.
///
/// When this goes out of scope, its contents will be zeroed out.
pub struct BlindingFactor(Scalar);

impl ByteObject for BlindingFactor {
    const LENGTH: usize = sodiumoxide::crypto::scalarmult::SCALARBYTES;

    fn zeroed() -> Self {
        Self(Scalar([0_u8; Self::LENGTH]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        Scalar::from_slice(bytes).map(Self)
    }
}

impl BlindingFactor {
    /// Blinds the given point with this factor.
    ///
    /// Blinding by two factors commutes:
    /// `a.blind(&b.blind(&p)?)? == b.blind(&a.blind(&p)?)?`.
    ///
    /// # Errors
    /// Fails if the point is of low order, in which case the result would leak the factor.
    pub fn blind(&self, point: &BlindedPoint) -> Result<BlindedPoint, BlindingError> {
        scalarmult(&self.0, point.as_ref())
            .map(BlindedPoint)
            .map_err(|_| BlindingError)
    }
}

#[derive(AsRef, AsMut, From, Serialize, Deserialize, Eq, PartialEq, Clone, Debug)]
/// A record digest embedded in the `C25519` group, possibly blinded by one or more factors.
pub struct BlindedPoint(GroupElement);

impl std::hash::Hash for BlindedPoint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl Ord for BlindedPoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_slice().cmp(other.as_slice())
    }
}

impl PartialOrd for BlindedPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl ByteObject for BlindedPoint {
    const LENGTH: usize = GROUPELEMENTBYTES;

    fn zeroed() -> Self {
        Self(GroupElement([0_u8; GROUPELEMENTBYTES]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        GroupElement::from_slice(bytes).map(Self)
    }
}

impl BlindedPoint {
    /// Embeds a record digest as a group element.
    ///
    /// The digest bytes are taken as the `u`-coordinate of a curve point; the `C25519` ladder is
    /// defined for every 32-byte string, so no rejection sampling is needed.
    pub fn from_digest(digest: &RecordDigest) -> Self {
        // safe unwrap: digest and group element length coincide
        Self::from_slice_unchecked(digest.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blinding_commutes() {
        let a = BlindingFactor::generate();
        let b = BlindingFactor::generate();
        let point = BlindedPoint::from_digest(&RecordDigest::digest(b"record-0"));
        let ab = b.blind(&a.blind(&point).unwrap()).unwrap();
        let ba = a.blind(&b.blind(&point).unwrap()).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_blinding_separates_digests() {
        let a = BlindingFactor::generate();
        let p = a
            .blind(&BlindedPoint::from_digest(&RecordDigest::digest(b"record-0")))
            .unwrap();
        let q = a
            .blind(&BlindedPoint::from_digest(&RecordDigest::digest(b"record-1")))
            .unwrap();
        assert_ne!(p, q);
    }

    #[test]
    fn test_low_order_point_is_rejected() {
        let a = BlindingFactor::generate();
        assert_eq!(a.blind(&BlindedPoint::zeroed()), Err(BlindingError));
    }
}
