//! Validation gates for datasets, privacy settings and model outputs.
//!
//! Nothing enters a round without passing one of these checks: uploaded rows go through
//! [`validate_data`], the declared privacy settings through [`validate_privacy_settings`] and
//! every trainer submission through [`validate_model_output`]. The checks are pure functions;
//! the enforcement points live in the coordinator.
//!
//! Privacy settings are closed enums. A settings object with any field outside its enumerated
//! set is rejected wholesale, never partially accepted or silently downgraded.

use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    dataset::{Dataset, DatasetError},
    model::Tensor,
};

#[derive(Debug, Error, PartialEq, Eq)]
/// Errors related to the validation gates.
pub enum ValidationError {
    /// The rows do not form a rectangular matrix.
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// A value is NaN or infinite.
    #[error("the value at ({row}, {col}) is not finite")]
    NotFinite {
        /// Row of the offending value.
        row: usize,
        /// Column of the offending value.
        col: usize,
    },

    /// A tensor declares a shape its weights do not have.
    #[error("the tensor contradicts its declared shape")]
    TensorShape,

    /// The differential privacy level is outside its enumerated set.
    #[error("unknown differential privacy level {0:?}")]
    UnknownPrivacyLevel(String),

    /// The encryption method is outside its enumerated set.
    #[error("unknown encryption method {0:?}")]
    UnknownEncryptionMethod(String),

    /// The SMPC protocol is outside its enumerated set.
    #[error("unknown SMPC protocol {0:?}")]
    UnknownSmpcProtocol(String),

    /// The PSI protocol is outside its enumerated set.
    #[error("unknown PSI protocol {0:?}")]
    UnknownPsiProtocol(String),
}

/// The differential privacy level of a round.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivacyLevel {
    /// Weak noise, most utility.
    Low,
    /// Balanced noise.
    Medium,
    /// Strong noise, least utility.
    High,
}

impl FromStr for PrivacyLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(PrivacyLevel::Low),
            "Medium" => Ok(PrivacyLevel::Medium),
            "High" => Ok(PrivacyLevel::High),
            _ => Err(ValidationError::UnknownPrivacyLevel(s.into())),
        }
    }
}

/// The method encrypting datasets at rest and in transit.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionMethod {
    /// Additively homomorphic encryption, the only method ciphertext addition works under.
    #[display(fmt = "PHE")]
    #[serde(rename = "PHE")]
    Phe,

    /// SHA-2 digests for integrity pinning.
    #[display(fmt = "SHA-256")]
    #[serde(rename = "SHA-256")]
    Sha256,

    /// SHA-3 digests for integrity pinning.
    #[display(fmt = "SHA3-256")]
    #[serde(rename = "SHA3-256")]
    Sha3_256,

    /// BLAKE2b digests for integrity pinning.
    #[display(fmt = "BLAKE2b")]
    #[serde(rename = "BLAKE2b")]
    Blake2b,
}

impl FromStr for EncryptionMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PHE" => Ok(EncryptionMethod::Phe),
            "SHA-256" => Ok(EncryptionMethod::Sha256),
            "SHA3-256" => Ok(EncryptionMethod::Sha3_256),
            "BLAKE2b" => Ok(EncryptionMethod::Blake2b),
            _ => Err(ValidationError::UnknownEncryptionMethod(s.into())),
        }
    }
}

/// The protocol securing the multi-party aggregation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmpcProtocol {
    /// The ABY mixed protocol framework.
    #[display(fmt = "ABY")]
    #[serde(rename = "ABY")]
    Aby,

    /// The Cheetah two party framework.
    Cheetah,

    /// Naor-Pinkas oblivious transfer.
    #[display(fmt = "Naor-Pinkas OT")]
    #[serde(rename = "Naor-Pinkas OT")]
    NaorPinkasOt,

    /// IKNP oblivious transfer extension.
    #[display(fmt = "IKNP OT")]
    #[serde(rename = "IKNP OT")]
    IknpOt,

    /// KKRT oblivious transfer extension.
    #[display(fmt = "KKRT OT")]
    #[serde(rename = "KKRT OT")]
    KkrtOt,

    /// Shuffling of secret shares.
    #[display(fmt = "Secret-Shared Shuffle")]
    #[serde(rename = "Secret-Shared Shuffle")]
    SecretSharedShuffle,
}

impl FromStr for SmpcProtocol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ABY" => Ok(SmpcProtocol::Aby),
            "Cheetah" => Ok(SmpcProtocol::Cheetah),
            "Naor-Pinkas OT" => Ok(SmpcProtocol::NaorPinkasOt),
            "IKNP OT" => Ok(SmpcProtocol::IknpOt),
            "KKRT OT" => Ok(SmpcProtocol::KkrtOt),
            "Secret-Shared Shuffle" => Ok(SmpcProtocol::SecretSharedShuffle),
            _ => Err(ValidationError::UnknownSmpcProtocol(s.into())),
        }
    }
}

/// The protocol aligning record sets across parties.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PsiProtocol {
    /// Diffie-Hellman double masking of record digests.
    #[display(fmt = "ECDH-PSI")]
    #[serde(rename = "ECDH-PSI")]
    EcdhPsi,

    /// KKRT batched oblivious PRF.
    #[display(fmt = "KKRT-PSI")]
    #[serde(rename = "KKRT-PSI")]
    KkrtPsi,

    /// Generic circuit based intersection.
    #[display(fmt = "Circuit-PSI")]
    #[serde(rename = "Circuit-PSI")]
    CircuitPsi,
}

impl FromStr for PsiProtocol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ECDH-PSI" => Ok(PsiProtocol::EcdhPsi),
            "KKRT-PSI" => Ok(PsiProtocol::KkrtPsi),
            "Circuit-PSI" => Ok(PsiProtocol::CircuitPsi),
            _ => Err(ValidationError::UnknownPsiProtocol(s.into())),
        }
    }
}

/// The validated privacy settings of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    /// The differential privacy level.
    pub level: PrivacyLevel,
    /// The encryption method.
    pub encryption: EncryptionMethod,
    /// The SMPC protocol.
    pub smpc: SmpcProtocol,
    /// The PSI protocol.
    pub psi: PsiProtocol,
}

/// Privacy settings as they arrive over the wire, fields not yet checked against their
/// enumerated sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPrivacySettings {
    /// The claimed differential privacy level.
    #[serde(rename = "differentialPrivacyLevel")]
    pub level: String,
    /// The claimed encryption method.
    #[serde(rename = "encryptionMethod")]
    pub encryption: String,
    /// The claimed SMPC protocol.
    #[serde(rename = "smpcProtocol")]
    pub smpc: String,
    /// The claimed PSI protocol.
    #[serde(rename = "psiProtocol")]
    pub psi: String,
}

/// Checks the four privacy settings fields against their enumerated sets.
///
/// The checks are independent of each other; the settings are rejected wholesale if any single
/// field fails.
///
/// # Errors
/// Fails with the `Unknown*` [`ValidationError`] of the first field outside its set.
pub fn validate_privacy_settings(
    settings: &RawPrivacySettings,
) -> Result<PrivacySettings, ValidationError> {
    Ok(PrivacySettings {
        level: settings.level.parse()?,
        encryption: settings.encryption.parse()?,
        smpc: settings.smpc.parse()?,
        psi: settings.psi.parse()?,
    })
}

/// Checks that every value of the dataset is finite.
///
/// # Errors
/// Fails with [`ValidationError::NotFinite`] at the first NaN or infinite value.
pub fn validate_dataset(dataset: &Dataset) -> Result<(), ValidationError> {
    for (idx, value) in dataset.as_slice().iter().enumerate() {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite {
                row: idx / dataset.cols(),
                col: idx % dataset.cols(),
            });
        }
    }
    Ok(())
}

/// Turns uploaded rows into a validated dataset.
///
/// # Errors
/// Fails if the rows do not form a rectangular matrix or if any value is NaN or infinite.
pub fn validate_data(rows: Vec<Vec<f64>>) -> Result<Dataset, ValidationError> {
    let dataset = Dataset::from_rows(rows)?;
    validate_dataset(&dataset)?;
    Ok(dataset)
}

/// Checks a trained tensor before its values are exposed externally.
///
/// The same rules as for uploaded data apply: the declared shape must be consistent and every
/// weight must be finite.
///
/// # Errors
/// Fails with [`ValidationError::TensorShape`] or [`ValidationError::NotFinite`].
pub fn validate_model_output(tensor: &Tensor) -> Result<(), ValidationError> {
    if !tensor.is_valid() {
        return Err(ValidationError::TensorShape);
    }
    for (idx, value) in tensor.as_slice().iter().enumerate() {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite {
                row: idx / tensor.cols(),
                col: idx % tensor.cols(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_settings() -> RawPrivacySettings {
        RawPrivacySettings {
            level: "Medium".to_string(),
            encryption: "PHE".to_string(),
            smpc: "ABY".to_string(),
            psi: "ECDH-PSI".to_string(),
        }
    }

    #[test]
    fn test_validate_data() {
        let dataset = validate_data(vec![vec![1., 2.], vec![3., 4.]]).unwrap();
        assert_eq!(dataset.shape(), (2, 2));
    }

    #[test]
    fn test_validate_data_rejects_ragged_rows() {
        assert_eq!(
            validate_data(vec![vec![1., 2.], vec![3.]]),
            Err(ValidationError::Dataset(DatasetError::Ragged {
                row: 1,
                expected: 2,
                actual: 1,
            })),
        );
    }

    #[test]
    fn test_validate_data_rejects_non_finite_values() {
        assert_eq!(
            validate_data(vec![vec![1., 2., 3.], vec![4., 5., f64::NAN]]),
            Err(ValidationError::NotFinite { row: 1, col: 2 }),
        );
        assert_eq!(
            validate_data(vec![vec![f64::INFINITY]]),
            Err(ValidationError::NotFinite { row: 0, col: 0 }),
        );
    }

    #[test]
    fn test_settings_spellings_round_trip() {
        let spellings = [
            "Low",
            "Medium",
            "High",
            "PHE",
            "SHA-256",
            "SHA3-256",
            "BLAKE2b",
            "ABY",
            "Cheetah",
            "Naor-Pinkas OT",
            "IKNP OT",
            "KKRT OT",
            "Secret-Shared Shuffle",
            "ECDH-PSI",
            "KKRT-PSI",
            "Circuit-PSI",
        ];
        for spelling in &spellings[..3] {
            assert_eq!(spelling.parse::<PrivacyLevel>().unwrap().to_string(), *spelling);
        }
        for spelling in &spellings[3..7] {
            assert_eq!(
                spelling.parse::<EncryptionMethod>().unwrap().to_string(),
                *spelling,
            );
        }
        for spelling in &spellings[7..13] {
            assert_eq!(spelling.parse::<SmpcProtocol>().unwrap().to_string(), *spelling);
        }
        for spelling in &spellings[13..] {
            assert_eq!(spelling.parse::<PsiProtocol>().unwrap().to_string(), *spelling);
        }
    }

    #[test]
    fn test_settings_accepted() {
        assert_eq!(
            validate_privacy_settings(&raw_settings()),
            Ok(PrivacySettings {
                level: PrivacyLevel::Medium,
                encryption: EncryptionMethod::Phe,
                smpc: SmpcProtocol::Aby,
                psi: PsiProtocol::EcdhPsi,
            }),
        );
    }

    #[test]
    fn test_settings_rejected_wholesale() {
        let mut settings = raw_settings();
        settings.level = "Extreme".to_string();
        assert_eq!(
            validate_privacy_settings(&settings),
            Err(ValidationError::UnknownPrivacyLevel("Extreme".to_string())),
        );

        let mut settings = raw_settings();
        settings.encryption = "ROT13".to_string();
        assert_eq!(
            validate_privacy_settings(&settings),
            Err(ValidationError::UnknownEncryptionMethod("ROT13".to_string())),
        );

        let mut settings = raw_settings();
        settings.smpc = "aby".to_string();
        assert_eq!(
            validate_privacy_settings(&settings),
            Err(ValidationError::UnknownSmpcProtocol("aby".to_string())),
        );

        let mut settings = raw_settings();
        settings.psi = "ECDH".to_string();
        assert_eq!(
            validate_privacy_settings(&settings),
            Err(ValidationError::UnknownPsiProtocol("ECDH".to_string())),
        );
    }

    #[test]
    fn test_validate_model_output() {
        let tensor = Tensor::new(2, 2, vec![0.5, -1., 2., 0.]);
        assert_eq!(validate_model_output(&tensor), Ok(()));

        let tensor = Tensor::new(2, 2, vec![0.5, -1., f64::NAN, 0.]);
        assert_eq!(
            validate_model_output(&tensor),
            Err(ValidationError::NotFinite { row: 1, col: 0 }),
        );
    }
}
