//! Differentially private noising of aggregated datasets.
//!
//! The noiser perturbs every element of a dataset with a sample drawn from a Laplace
//! distribution centered at zero. The noise scale is `sensitivity / epsilon`, where `epsilon`
//! is the privacy budget of the round. Smaller budgets yield stronger noise. Sampling is
//! deterministic per seed, so a noise dataset can be reproduced, encrypted and folded into an
//! aggregate like any other contribution.
//!
//! ```
//! use silonet_core::{dataset::Dataset, noise::Noiser};
//!
//! let dataset = Dataset::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
//! let noised = Noiser::new(1.0).add_noise(&dataset, 1.0).unwrap();
//! assert_eq!(noised.shape(), dataset.shape());
//! assert!(noised.as_slice().iter().all(|value| value.is_finite()));
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

use crate::{cipher::CipherSeed, crypto::ByteObject, dataset::Dataset};

#[derive(Debug, Error, PartialEq, Eq)]
/// Errors related to the noising of datasets.
pub enum NoiseError {
    /// The privacy budget is not positive.
    #[error("the privacy budget must be positive")]
    InvalidPrivacyBudget,

    /// A noise value or a noised sum left the representable range.
    #[error("the sampled noise or the noised sum is not finite")]
    NoiseOverflow,
}

/// A seeded sampler of Laplace noise.
#[derive(Debug, Clone)]
pub struct Noiser {
    sensitivity: f64,
    seed: CipherSeed,
}

impl Noiser {
    /// Creates a noiser for the given query sensitivity with a fresh random seed.
    pub fn new(sensitivity: f64) -> Self {
        Self::with_seed(sensitivity, CipherSeed::generate())
    }

    /// Creates a noiser for the given query sensitivity from an existing seed.
    pub fn with_seed(sensitivity: f64, seed: CipherSeed) -> Self {
        Self { sensitivity, seed }
    }

    /// Samples a dataset of the given shape with Laplace noise of scale
    /// `sensitivity / epsilon`.
    ///
    /// # Errors
    /// Fails with [`NoiseError::InvalidPrivacyBudget`] if `epsilon` is not positive and with
    /// [`NoiseError::NoiseOverflow`] if the scale or a sample is not finite.
    pub fn sample_noise(
        &self,
        rows: usize,
        cols: usize,
        epsilon: f64,
    ) -> Result<Dataset, NoiseError> {
        if !(epsilon > 0.) {
            return Err(NoiseError::InvalidPrivacyBudget);
        }
        let scale = self.sensitivity / epsilon;
        if !scale.is_finite() {
            return Err(NoiseError::NoiseOverflow);
        }

        let mut rng = ChaCha20Rng::from_seed(self.seed.as_array());
        let mut data = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            let sample = laplace(&mut rng, scale);
            if !sample.is_finite() {
                return Err(NoiseError::NoiseOverflow);
            }
            data.push(sample);
        }
        Ok(Dataset::from_raw_parts(rows, cols, data))
    }

    /// Perturbs every element of the dataset with fresh Laplace noise of scale
    /// `sensitivity / epsilon`.
    ///
    /// # Errors
    /// Fails with [`NoiseError::InvalidPrivacyBudget`] if `epsilon` is not positive and with
    /// [`NoiseError::NoiseOverflow`] if a sample or a noised sum is not finite.
    pub fn add_noise(&self, dataset: &Dataset, epsilon: f64) -> Result<Dataset, NoiseError> {
        let noise = self.sample_noise(dataset.rows(), dataset.cols(), epsilon)?;
        let data = dataset
            .as_slice()
            .iter()
            .zip(noise.as_slice())
            .map(|(value, noise)| {
                let sum = value + noise;
                if sum.is_finite() {
                    Ok(sum)
                } else {
                    Err(NoiseError::NoiseOverflow)
                }
            })
            .collect::<Result<Vec<f64>, NoiseError>>()?;
        Ok(Dataset::from_raw_parts(
            dataset.rows(),
            dataset.cols(),
            data,
        ))
    }
}

/// Draws one sample from Laplace(0, `scale`) by inverse transform sampling.
fn laplace(rng: &mut ChaCha20Rng, scale: f64) -> f64 {
    let uniform = rng.gen::<f64>() - 0.5;
    -scale * uniform.signum() * (1. - 2. * uniform.abs()).ln()
}
