//! Secure element-wise aggregation of datasets.
//!
//! Aggregation combines equally shaped datasets by element-wise addition without any
//! contribution being materialized in the clear inside the fold: every dataset is masked under a
//! fresh seed the moment it enters, only masked words are combined, and the running sum is
//! decrypted once at the end. The masks cancel exactly, so the fold computes the exact sum of
//! the embedded values and rounds it once per element. For two datasets the result is identical
//! to direct element-wise `f64` addition.
//!
//! ```
//! use silonet_core::{
//!     aggregate, cipher::CipherSuite, crypto::SealingKeyPair, dataset::Dataset, PartyId,
//! };
//!
//! let keys = SealingKeyPair::generate();
//! let left = Dataset::from_rows(vec![vec![0.1, 2.0]]).unwrap();
//! let right = Dataset::from_rows(vec![vec![0.2, 3.0]]).unwrap();
//!
//! let sum = aggregate::sum(
//!     &[(PartyId(0), left), (PartyId(1), right)],
//!     &keys,
//!     CipherSuite::default(),
//! )
//! .unwrap();
//! assert_eq!(sum.as_slice(), &[0.1 + 0.2, 5.0]);
//! ```

use thiserror::Error;

use crate::{
    cipher::{decrypt, CipherContext, Ciphertext, CipherSuite, DecodeError, Encryptor},
    crypto::SealingKeyPair,
    dataset::Dataset,
    PartyId,
};

#[derive(Debug, Error)]
/// Errors related to the aggregation of encrypted datasets.
pub enum AggregationError {
    /// There is nothing to aggregate.
    #[error("no dataset to aggregate")]
    NoDataset,

    /// The shapes of the aggregated datasets differ.
    #[error("the ciphertexts have mismatching shapes: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Shape of the running sum.
        expected: (usize, usize),
        /// Shape of the rejected ciphertext.
        actual: (usize, usize),
    },

    /// The cipher suites of the aggregated datasets differ.
    #[error("the ciphertexts belong to different cipher suites")]
    SuiteMismatch,

    /// The fold would exceed the suite capacity.
    #[error("too many datasets were aggregated for the cipher suite capacity")]
    TooManyDatasets,

    /// The ciphertext contradicts its own context.
    #[error("the ciphertext to aggregate is invalid")]
    InvalidObject,

    /// The aggregate could not be decrypted.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Clone)]
/// An aggregator for encrypted datasets.
pub struct Aggregation {
    object: Ciphertext,
}

impl From<Ciphertext> for Aggregation {
    fn from(object: Ciphertext) -> Self {
        Self { object }
    }
}

impl From<Aggregation> for Ciphertext {
    fn from(aggregation: Aggregation) -> Self {
        aggregation.object
    }
}

impl Aggregation {
    /// Creates a new, empty aggregator for ciphertexts of the given shape and suite.
    pub fn new(rows: usize, cols: usize, suite: CipherSuite) -> Self {
        // the placeholder context is replaced by the first contribution
        let context = CipherContext {
            party: PartyId(0),
            rows,
            cols,
            nb_datasets: 0,
            suite,
        };
        Self {
            object: Ciphertext::new(context, Vec::new(), Vec::new()),
        }
    }

    /// Gets the context of the running sum.
    pub fn context(&self) -> &CipherContext {
        &self.object.context
    }

    /// Gets the number of datasets folded so far.
    pub fn nb_datasets(&self) -> usize {
        self.object.context.nb_datasets
    }

    /// Validates if aggregation of the running sum with the given `object` may be safely
    /// performed.
    ///
    /// This should be checked before calling [`aggregate()`], since aggregation may return
    /// garbage values otherwise.
    ///
    /// # Errors
    /// Fails in one of the following cases:
    /// - The cipher suites of the running sum and of the `object` don't coincide.
    /// - The shapes of the running sum and of the `object` don't coincide.
    /// - The new number of folded datasets would exceed the suite capacity.
    /// - The `object` itself is invalid.
    ///
    /// [`aggregate()`]: Aggregation::aggregate
    pub fn validate_aggregation(&self, object: &Ciphertext) -> Result<(), AggregationError> {
        let context = &self.object.context;
        if context.suite != object.context.suite {
            return Err(AggregationError::SuiteMismatch);
        }

        if context.rows != object.context.rows || context.cols != object.context.cols {
            return Err(AggregationError::ShapeMismatch {
                expected: (context.rows, context.cols),
                actual: (object.context.rows, object.context.cols),
            });
        }

        if context.nb_datasets + object.context.nb_datasets > context.suite.capacity {
            return Err(AggregationError::TooManyDatasets);
        }

        if !object.is_valid() {
            return Err(AggregationError::InvalidObject);
        }

        Ok(())
    }

    /// Folds the given `object` into the running sum.
    ///
    /// It should be checked that [`validate_aggregation()`] succeeds before calling this, since
    /// aggregation may return garbage values otherwise.
    ///
    /// [`validate_aggregation()`]: Aggregation::validate_aggregation
    pub fn aggregate(&mut self, object: Ciphertext) {
        if self.object.context.nb_datasets == 0 {
            self.object = object;
            return;
        }

        let order = self.object.context.suite.order();
        for (word, other) in self.object.words.iter_mut().zip(object.words.into_iter()) {
            *word = (&*word + other) % &order;
        }
        self.object.seeds.extend(object.seeds);
        self.object.context.nb_datasets += object.context.nb_datasets;
    }
}

/// Securely sums the given equally shaped datasets element-wise.
///
/// The orchestrator routes single-dataset rounds around the aggregator; the fold itself accepts
/// any positive number of datasets up to the suite capacity. Zero-row datasets sum to a zero-row
/// dataset.
///
/// # Errors
/// Fails with an [`AggregationError`] if there is no dataset, if the shapes differ, or if the
/// fold would exceed the suite capacity.
pub fn sum(
    datasets: &[(PartyId, Dataset)],
    keys: &SealingKeyPair,
    suite: CipherSuite,
) -> Result<Dataset, AggregationError> {
    let (rows, cols) = datasets
        .first()
        .ok_or(AggregationError::NoDataset)?
        .1
        .shape();
    let mut aggregation = Aggregation::new(rows, cols, suite);
    for (party, dataset) in datasets {
        let ciphertext = Encryptor::new(suite).encrypt(dataset, *party, &keys.public);
        aggregation.validate_aggregation(&ciphertext)?;
        aggregation.aggregate(ciphertext);
    }
    Ok(decrypt(&Ciphertext::from(aggregation), keys)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SealingKeyPair {
        SealingKeyPair::generate()
    }

    fn pairs(datasets: Vec<Dataset>) -> Vec<(PartyId, Dataset)> {
        datasets
            .into_iter()
            .enumerate()
            .map(|(party, dataset)| (PartyId(party as u32), dataset))
            .collect()
    }

    #[test]
    fn test_sum_equals_elementwise_addition() {
        let keys = keys();
        let left = Dataset::from_rows(vec![vec![0.1, -3.5], vec![1e300, f64::from_bits(1)]]).unwrap();
        let right = Dataset::from_rows(vec![vec![0.2, 2.25], vec![-1e299, 0.0]]).unwrap();
        let expected: Vec<f64> = left
            .as_slice()
            .iter()
            .zip(right.as_slice())
            .map(|(a, b)| a + b)
            .collect();

        let sum = sum(
            &pairs(vec![left, right]),
            &keys,
            CipherSuite::default(),
        )
        .unwrap();
        assert_eq!(sum.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_sum_is_commutative() {
        let keys = keys();
        let left = Dataset::from_rows(vec![vec![0.1, 0.7, -2.5]]).unwrap();
        let right = Dataset::from_rows(vec![vec![0.2, -0.7, 4.75]]).unwrap();
        let suite = CipherSuite::default();

        let fst = sum(&pairs(vec![left.clone(), right.clone()]), &keys, suite).unwrap();
        let snd = sum(&pairs(vec![right, left]), &keys, suite).unwrap();
        assert_eq!(fst, snd);
    }

    #[test]
    fn test_sum_of_many() {
        let keys = keys();
        let datasets = (1..=5)
            .map(|i| Dataset::from_rows(vec![vec![i as f64, 10. * i as f64]]).unwrap())
            .collect();
        let sum = sum(&pairs(datasets), &keys, CipherSuite::default()).unwrap();
        assert_eq!(sum.as_slice(), &[15., 150.]);
    }

    #[test]
    fn test_sum_of_zero_row_datasets() {
        let keys = keys();
        let datasets = vec![Dataset::empty(3), Dataset::empty(3)];
        let sum = sum(&pairs(datasets), &keys, CipherSuite::default()).unwrap();
        assert_eq!(sum.shape(), (0, 3));
    }

    #[test]
    fn test_sum_of_nothing() {
        assert!(matches!(
            sum(&[], &keys(), CipherSuite::default()),
            Err(AggregationError::NoDataset),
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let keys = keys();
        let left = Dataset::from_rows(vec![vec![1., 2.]]).unwrap();
        let right = Dataset::from_rows(vec![vec![1., 2., 3.]]).unwrap();
        assert!(matches!(
            sum(&pairs(vec![left, right]), &keys, CipherSuite::default()),
            Err(AggregationError::ShapeMismatch {
                expected: (1, 2),
                actual: (1, 3),
            }),
        ));
    }

    #[test]
    fn test_capacity_is_enforced() {
        let keys = keys();
        let datasets = (0..3)
            .map(|_| Dataset::from_rows(vec![vec![1.]]).unwrap())
            .collect();
        assert!(matches!(
            sum(&pairs(datasets), &keys, CipherSuite { capacity: 2 }),
            Err(AggregationError::TooManyDatasets),
        ));
    }

    #[test]
    fn test_aggregation_tracks_contributions() {
        let keys = keys();
        let suite = CipherSuite::default();
        let dataset = Dataset::from_rows(vec![vec![1., 2.]]).unwrap();
        let mut aggregation = Aggregation::new(1, 2, suite);
        assert_eq!(aggregation.nb_datasets(), 0);

        for party in 0..3 {
            let ciphertext =
                Encryptor::new(suite).encrypt(&dataset, PartyId(party), &keys.public);
            aggregation.validate_aggregation(&ciphertext).unwrap();
            aggregation.aggregate(ciphertext);
        }
        assert_eq!(aggregation.nb_datasets(), 3);
        assert_eq!(aggregation.context().party, PartyId(0));

        let object = Ciphertext::from(aggregation);
        assert_eq!(object.seeds.len(), 3);
        assert!(object.is_valid());
    }
}
