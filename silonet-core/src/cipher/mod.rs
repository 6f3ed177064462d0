//! Encryption, addition and decryption of datasets.
//!
//! # Datasets and words
//! A [`Dataset`](crate::dataset::Dataset) is encrypted value by value: every `f64` is embedded as
//! an element of a finite group and masked with a uniformly random element of that same group.
//! The embedding is a fixed-point shift that preserves every finite `f64` exactly, so decryption
//! does not lose information. The masked elements are called the *words* of the
//! [`Ciphertext`].
//!
//! # Cipher suites
//! The [`CipherSuite`] fixes the order of the finite group. The order leaves headroom for the sum
//! of up to `capacity` encoded values, which is what makes the codec additively homomorphic:
//! ciphertexts of identical shape can be summed word by word without decryption and the sum
//! decrypts to the element-wise sum of the folded datasets. Ciphertext addition is driven by an
//! [`Aggregation`](crate::aggregate::Aggregation).
//!
//! # Cipher contexts
//! Every ciphertext carries a [`CipherContext`] declaring the contributing party, the dataset
//! shape, the number of folded datasets and the suite. Decryption and addition check the words
//! and seeds against the context and fail with a [`DecodeError`] on any contradiction; the shape
//! is never inferred from the buffer length.
//!
//! # Seeds
//! The mask of a ciphertext is expanded from a random 32-byte [`CipherSeed`] which is sealed to
//! the coordinator's public key. Only the coordinator that provisioned the round can unseal the
//! seeds, re-expand the masks and decrypt:
//!
//! ```
//! use silonet_core::{
//!     cipher::{decrypt, CipherSuite, Encryptor},
//!     crypto::SealingKeyPair,
//!     dataset::Dataset,
//!     PartyId,
//! };
//!
//! let keys = SealingKeyPair::generate();
//! let dataset = Dataset::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
//!
//! let ciphertext = Encryptor::new(CipherSuite::default()).encrypt(
//!     &dataset,
//!     PartyId(0),
//!     &keys.public,
//! );
//! assert_eq!(decrypt(&ciphertext, &keys).unwrap(), dataset);
//! ```

pub(crate) mod object;
pub(crate) mod scheme;
pub(crate) mod seed;
pub(crate) mod suite;

pub use self::{
    object::{CipherContext, Ciphertext, InvalidCiphertextError},
    scheme::{decrypt, DecodeError, Encryptor},
    seed::{CipherSeed, SealedCipherSeed},
    suite::CipherSuite,
};
