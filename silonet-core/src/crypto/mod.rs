//! Thin struct wrappers around the [sodiumoxide] primitives this crate uses.
//!
//! Three primitives are wrapped: the `C25519` key pairs that cipher seeds are sealed to, the
//! `C25519` scalar multiplication that blinds record identifiers during set alignment, and the
//! `SHA256` digest of record identifiers. The [`ByteObject`] trait gives all of them a common
//! byte-level interface.
//!
//! # Examples
//! ## Sealing of messages
//! ```
//! # use silonet_core::crypto::SealingKeyPair;
//! let keys = SealingKeyPair::generate();
//! let message = b"round 7 cipher seed".to_vec();
//! let sealed = keys.public.seal(&message);
//! assert_eq!(message, keys.secret.unseal(&sealed, &keys.public).unwrap());
//! ```
//!
//! ## Blinding of record digests
//! ```
//! # use silonet_core::crypto::{BlindedPoint, BlindingFactor, RecordDigest};
//! let factor = BlindingFactor::generate();
//! let point = BlindedPoint::from_digest(&RecordDigest::digest(b"record-17"));
//! let blinded = factor.blind(&point).unwrap();
//! assert_ne!(point, blinded);
//! ```
//!
//! [sodiumoxide]: https://docs.rs/sodiumoxide/

pub(crate) mod blind;
pub(crate) mod hash;
pub(crate) mod prng;
pub(crate) mod seal;

use sodiumoxide::randombytes::randombytes;

pub use self::{
    blind::{BlindedPoint, BlindingError, BlindingFactor},
    hash::RecordDigest,
    prng::generate_integer,
    seal::{
        PublicSealingKey,
        SealingKeyPair,
        SealingKeySeed,
        SecretSealingKey,
        UnsealError,
        SEALBYTES,
    },
};

/// Fixed-length byte values that the crypto types are built from.
pub trait ByteObject: Sized {
    /// The length of the value in bytes.
    const LENGTH: usize;

    /// A value with every byte set to `0`.
    fn zeroed() -> Self;

    /// The raw bytes of the value.
    fn as_slice(&self) -> &[u8];

    /// Reads a value from `bytes`.
    ///
    /// # Errors
    /// Returns `None` if `bytes` is not exactly [`LENGTH`] long.
    ///
    /// [`LENGTH`]: ByteObject::LENGTH
    fn from_slice(bytes: &[u8]) -> Option<Self>;

    /// Reads a value from `bytes`.
    ///
    /// # Panics
    /// Panics if `bytes` is not exactly [`LENGTH`] long.
    ///
    /// [`LENGTH`]: ByteObject::LENGTH
    fn from_slice_unchecked(bytes: &[u8]) -> Self {
        Self::from_slice(bytes).unwrap()
    }

    /// Draws a fresh value with random bytes.
    fn generate() -> Self {
        // safe unwrap: randombytes yields exactly LENGTH bytes
        Self::from_slice_unchecked(randombytes(Self::LENGTH).as_slice())
    }

    /// A value with every byte set to `value`.
    fn fill_with(value: u8) -> Self {
        Self::from_slice_unchecked(&vec![value; Self::LENGTH])
    }
}
