//! Cipher seeds and mask expansion.
//!
//! See the [cipher module] documentation since this is a private module anyways.
//!
//! [cipher module]: crate::cipher

use std::iter;

use derive_more::{AsMut, AsRef};
use num::bigint::BigUint;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::box_;

use crate::{
    cipher::suite::CipherSuite,
    crypto::{seal::UnsealError, generate_integer, ByteObject, SEALBYTES},
    CoordinatorPublicKey,
    CoordinatorSecretKey,
};

#[derive(AsRef, AsMut, Clone, Debug, PartialEq, Eq)]
/// A seed to expand a cipher mask from.
///
/// When this goes out of scope, its contents will be zeroed out.
pub struct CipherSeed(box_::Seed);

impl ByteObject for CipherSeed {
    const LENGTH: usize = box_::SEEDBYTES;

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        box_::Seed::from_slice(bytes).map(Self)
    }

    fn zeroed() -> Self {
        Self(box_::Seed([0_u8; Self::LENGTH]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl CipherSeed {
    /// Gets this seed as an array.
    pub fn as_array(&self) -> [u8; Self::LENGTH] {
        (self.0).0
    }

    /// Seals this seed to the given coordinator key as a [`SealedCipherSeed`].
    pub fn seal(&self, pk: &CoordinatorPublicKey) -> SealedCipherSeed {
        // safe unwrap: length of slice is guaranteed by constants
        SealedCipherSeed::from_slice_unchecked(pk.seal(self.as_slice()).as_slice())
    }

    /// Expands a mask of given length from this seed wrt the cipher suite.
    ///
    /// Every element of the mask is a uniformly random element of the suite's finite group.
    pub fn derive_mask(&self, len: usize, suite: CipherSuite) -> Vec<BigUint> {
        let order = suite.order();
        let mut prng = ChaCha20Rng::from_seed(self.as_array());
        iter::repeat_with(|| generate_integer(&mut prng, &order))
            .take(len)
            .collect()
    }
}

#[derive(AsRef, AsMut, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// A cipher seed sealed to a coordinator key.
pub struct SealedCipherSeed(Vec<u8>);

impl From<Vec<u8>> for SealedCipherSeed {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl ByteObject for SealedCipherSeed {
    const LENGTH: usize = SEALBYTES + CipherSeed::LENGTH;

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == Self::LENGTH {
            Some(Self(bytes.to_vec()))
        } else {
            None
        }
    }

    fn zeroed() -> Self {
        Self(vec![0_u8; Self::LENGTH])
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl SealedCipherSeed {
    /// Unseals this seed as a [`CipherSeed`].
    ///
    /// # Errors
    /// Fails if the unsealing fails.
    pub fn unseal(
        &self,
        pk: &CoordinatorPublicKey,
        sk: &CoordinatorSecretKey,
    ) -> Result<CipherSeed, UnsealError> {
        CipherSeed::from_slice(sk.unseal(self.as_slice(), pk)?.as_slice()).ok_or(UnsealError)
    }
}
