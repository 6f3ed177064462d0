//! Ciphertext objects.
//!
//! See the [cipher module] documentation since this is a private module anyways.
//!
//! [cipher module]: crate::cipher

use num::bigint::BigUint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cipher::{seed::SealedCipherSeed, suite::CipherSuite},
    PartyId,
};

#[derive(Error, Debug)]
#[error("the ciphertext is invalid: data is incompatible with its cipher context")]
/// Errors related to invalid ciphertexts.
pub struct InvalidCiphertextError;

/// The validated description of what a ciphertext contains.
///
/// The context travels with the ciphertext and is checked on every decryption and every
/// addition. The shape of the encrypted dataset is taken from here, never inferred from the
/// length of the word buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CipherContext {
    /// The party which contributed the first dataset of this ciphertext.
    pub party: PartyId,
    /// Number of rows of the encrypted dataset.
    pub rows: usize,
    /// Number of columns of the encrypted dataset.
    pub cols: usize,
    /// Number of datasets folded into this ciphertext.
    pub nb_datasets: usize,
    /// The cipher suite the words are embedded in.
    pub suite: CipherSuite,
}

impl CipherContext {
    /// Gets the number of words of a conforming ciphertext.
    pub fn word_count(&self) -> usize {
        self.rows * self.cols
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// An encrypted dataset, or a sum of encrypted datasets.
pub struct Ciphertext {
    /// The masked words, one per dataset value, in row-major order.
    pub words: Vec<BigUint>,
    /// The sealed seeds of the masks applied to the words, one per folded dataset.
    pub seeds: Vec<SealedCipherSeed>,
    /// The validated context of this ciphertext.
    pub context: CipherContext,
}

impl Ciphertext {
    /// Creates a new ciphertext from the given context, words and sealed seeds.
    pub fn new(context: CipherContext, words: Vec<BigUint>, seeds: Vec<SealedCipherSeed>) -> Self {
        Self {
            words,
            seeds,
            context,
        }
    }

    /// Creates a new ciphertext from the given context, words and sealed seeds.
    ///
    /// # Errors
    /// Fails if the words or seeds don't conform to the given context.
    pub fn new_checked(
        context: CipherContext,
        words: Vec<BigUint>,
        seeds: Vec<SealedCipherSeed>,
    ) -> Result<Self, InvalidCiphertextError> {
        let object = Self::new(context, words, seeds);
        if object.is_valid() {
            Ok(object)
        } else {
            Err(InvalidCiphertextError)
        }
    }

    /// Checks if the words and seeds of this ciphertext conform to its context.
    pub fn is_valid(&self) -> bool {
        let order = self.context.suite.order();
        self.words.len() == self.context.word_count()
            && self.seeds.len() == self.context.nb_datasets
            && self.context.nb_datasets >= 1
            && self.context.nb_datasets <= self.context.suite.capacity
            && self.words.iter().all(|word| word < &order)
    }
}

#[cfg(test)]
mod tests {
    use num::traits::Zero;

    use super::*;

    fn context(rows: usize, cols: usize) -> CipherContext {
        CipherContext {
            party: PartyId(0),
            rows,
            cols,
            nb_datasets: 1,
            suite: CipherSuite::default(),
        }
    }

    #[test]
    fn test_valid_ciphertext() {
        let object = Ciphertext::new_checked(
            context(2, 3),
            vec![BigUint::zero(); 6],
            vec![SealedCipherSeed::zeroed()],
        );
        assert!(object.is_ok());
    }

    #[test]
    fn test_word_count_mismatch() {
        let object = Ciphertext::new_checked(
            context(2, 3),
            vec![BigUint::zero(); 5],
            vec![SealedCipherSeed::zeroed()],
        );
        assert!(object.is_err());
    }

    #[test]
    fn test_seed_count_mismatch() {
        let object = Ciphertext::new_checked(context(2, 3), vec![BigUint::zero(); 6], vec![]);
        assert!(object.is_err());
    }

    #[test]
    fn test_word_outside_group() {
        let mut words = vec![BigUint::zero(); 6];
        words[3] = CipherSuite::default().order();
        let object =
            Ciphertext::new_checked(context(2, 3), words, vec![SealedCipherSeed::zeroed()]);
        assert!(object.is_err());
    }
}
