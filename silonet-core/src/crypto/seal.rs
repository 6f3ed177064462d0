//! Key pairs for sealing cipher seeds to the coordinator.
//!
//! Every round the coordinator provisions a fresh `C25519` key pair and publishes the public
//! half. Parties seal the seed of their dataset mask to that key, so only the coordinator of
//! the round can recover it.
//!
//! See the [crypto module] documentation since this is a private module anyways.
//!
//! [crypto module]: crate::crypto

use derive_more::AsRef;
use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::{box_, sealedbox};

use super::ByteObject;

/// Number of additional bytes in a sealed message compared to the plaintext.
pub const SEALBYTES: usize = sealedbox::SEALBYTES;

/// An error related to unsealing a message.
#[derive(thiserror::Error, Debug)]
#[error("unsealing of a message failed")]
pub struct UnsealError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A `C25519` key pair of a round.
pub struct SealingKeyPair {
    /// The public half, published to the parties.
    pub public: PublicSealingKey,
    /// The secret half, kept by the coordinator.
    pub secret: SecretSealingKey,
}

impl SealingKeyPair {
    /// Generates a new random `C25519` key pair.
    pub fn generate() -> Self {
        let (pk, sk) = box_::gen_keypair();
        Self {
            public: PublicSealingKey(pk),
            secret: SecretSealingKey(sk),
        }
    }

    /// Deterministically derives a `C25519` key pair from a seed.
    pub fn derive_from_seed(seed: &SealingKeySeed) -> Self {
        let (pk, sk) = box_::keypair_from_seed(seed.as_ref());
        Self {
            public: PublicSealingKey(pk),
            secret: SecretSealingKey(sk),
        }
    }
}

#[derive(AsRef, Serialize, Deserialize, Hash, Eq, Ord, PartialEq, Copy, Clone, PartialOrd, Debug)]
/// The public half of a round's `C25519` key pair.
pub struct PublicSealingKey(box_::PublicKey);

impl PublicSealingKey {
    /// Seals a message `m` to this key.
    ///
    /// The resulting ciphertext length is [`SEALBYTES`]` + m.len()`. An ephemeral key pair is
    /// created for the message and its public key is attached to the ciphertext; the ephemeral
    /// secret key is zeroed out before this function returns.
    pub fn seal(&self, m: &[u8]) -> Vec<u8> {
        sealedbox::seal(m, self.as_ref())
    }
}

impl ByteObject for PublicSealingKey {
    const LENGTH: usize = box_::PUBLICKEYBYTES;

    fn zeroed() -> Self {
        Self(box_::PublicKey([0_u8; box_::PUBLICKEYBYTES]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        box_::PublicKey::from_slice(bytes).map(Self)
    }
}

#[derive(AsRef, Serialize, Deserialize, Eq, PartialEq, Clone, Debug)]
/// The secret half of a round's `C25519` key pair.
///
/// When this goes out of scope, its contents will be zeroed out.
pub struct SecretSealingKey(box_::SecretKey);

impl SecretSealingKey {
    /// Unseals a ciphertext `c` that was sealed to the associated public key.
    ///
    /// # Errors
    /// Fails if `c` was not sealed to this key pair or is malformed.
    pub fn unseal(&self, c: &[u8], pk: &PublicSealingKey) -> Result<Vec<u8>, UnsealError> {
        sealedbox::open(c, pk.as_ref(), self.as_ref()).map_err(|_| UnsealError)
    }
}

impl ByteObject for SecretSealingKey {
    const LENGTH: usize = box_::SECRETKEYBYTES;

    fn zeroed() -> Self {
        Self(box_::SecretKey([0_u8; box_::SECRETKEYBYTES]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        box_::SecretKey::from_slice(bytes).map(Self)
    }
}

#[derive(AsRef, Serialize, Deserialize, Eq, PartialEq, Clone)]
/// A seed to derive a `C25519` key pair from.
///
/// When this goes out of scope, its contents will be zeroed out.
pub struct SealingKeySeed(box_::Seed);

impl ByteObject for SealingKeySeed {
    const LENGTH: usize = box_::SEEDBYTES;

    fn zeroed() -> Self {
        Self(box_::Seed([0; box_::SEEDBYTES]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        box_::Seed::from_slice(bytes).map(Self)
    }
}
