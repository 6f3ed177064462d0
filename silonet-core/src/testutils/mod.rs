//! This module provides helpers for generating test fixtures such as
//! datasets, privacy settings, key material and model artifacts.

use crate::{
    common::{RoundParameters, RoundSeed},
    crypto::{ByteObject, SealingKeyPair, SealingKeySeed},
    dataset::Dataset,
    model::{ModelArtifact, TaskType},
    validation::{
        EncryptionMethod,
        PrivacyLevel,
        PrivacySettings,
        PsiProtocol,
        RawPrivacySettings,
        SmpcProtocol,
    },
};

/// Generates a dataset of the given shape with distinct finite values.
///
/// The record identifiers (first column) are distinct across rows.
pub fn dataset(rows: usize, cols: usize) -> Dataset {
    let data = (0..rows * cols).map(|i| i as f64 / 2.).collect();
    Dataset::from_raw_parts(rows, cols, data)
}

/// Generates a dataset whose record identifiers are the given ones.
pub fn dataset_with_ids(ids: &[f64], cols: usize) -> Dataset {
    assert!(cols >= 1);
    let data = ids
        .iter()
        .flat_map(|id| (0..cols).map(move |col| id + col as f64 / 4.))
        .collect();
    Dataset::from_raw_parts(ids.len(), cols, data)
}

/// The deterministic coordinator key pair of the tests.
pub fn coordinator_keys() -> SealingKeyPair {
    SealingKeyPair::derive_from_seed(&SealingKeySeed::fill_with(0xcc))
}

/// Generates privacy settings accepted by every pipeline stage.
pub fn settings() -> PrivacySettings {
    PrivacySettings {
        level: PrivacyLevel::Medium,
        encryption: EncryptionMethod::Phe,
        smpc: SmpcProtocol::Aby,
        psi: PsiProtocol::EcdhPsi,
    }
}

/// Generates the wire form of [`settings()`].
pub fn raw_settings() -> RawPrivacySettings {
    RawPrivacySettings {
        level: "Medium".to_string(),
        encryption: "PHE".to_string(),
        smpc: "ABY".to_string(),
        psi: "ECDH-PSI".to_string(),
    }
}

/// Generates round parameters with the deterministic coordinator key.
pub fn round_parameters() -> RoundParameters {
    RoundParameters {
        pk: coordinator_keys().public,
        seed: RoundSeed::fill_with(0x0f),
        epsilon: 1.,
        settings: settings(),
        task: TaskType::FraudDetection,
    }
}

/// Generates a small model artifact with a few graph nodes.
pub fn model(task: TaskType) -> ModelArtifact {
    let mut artifact = ModelArtifact::new(task, 3);
    artifact.add_edges(vec![(0, 1), (1, 2)]);
    artifact
}
