#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/silonet/silonet/master/assets/logo.png",
    issue_tracker_base_url = "https://github.com/silonet/silonet/issues/"
)]
//! # Silonet: Joint Models Across Data Silos, Without Sharing Data
//!
//! ###### tags: Privacy, PSI, Secure Aggregation, Differential Privacy, Machine Learning
//!
//! Several organisations hold overlapping records about the same
//! entities - banks about the same customers, hospitals about the same
//! patients, publishers about the same articles - and would all benefit
//! from a model trained on the union of their knowledge. None of them
//! can hand their raw records to anyone else. Silonet is the pipeline
//! that closes this gap, written entirely in Rust.
//!
//! ## What the pipeline does
//!
//! A training round composes four privacy techniques in a fixed order,
//! so that no single component has to carry the whole guarantee:
//!
//! - **Private set intersection** aligns the records that the
//!   participating silos have in common, without revealing to any party
//!   which of its records the others do *not* hold.
//! - **Secure multi-party aggregation** combines the aligned records by
//!   element-wise addition under additive masking, so no party's values
//!   are ever materialized outside the computation.
//! - **Additively homomorphic encryption** keeps datasets opaque at
//!   rest and in transit; ciphertexts of equal shape can be added
//!   without decryption, which is what lets noise enter the pipeline
//!   while the aggregate is still sealed.
//! - **Differential privacy** injects calibrated Laplace noise before
//!   the aggregate is ever handed to a trainer, bounding what any
//!   released model can leak about a single record.
//!
//! The model itself is an interchangeable black box behind the trainer
//! boundary; the value of this crate is the pipeline, not the network
//! architecture.
//!
//! ## This crate
//!
//! `silonet-core` contains the pure, I/O-free primitives of the
//! pipeline: datasets and their validation, the cryptographic codec,
//! the set aligner, the secure aggregator and the privacy noiser. The
//! coordinator that sequences them over a network lives in
//! `silonet-server`.

pub mod aggregate;
pub mod align;
pub mod cipher;
pub mod common;
pub mod crypto;
pub mod dataset;
pub mod model;
pub mod noise;
#[cfg(feature = "testutils")]
#[cfg_attr(docsrs, doc(cfg(feature = "testutils")))]
pub mod testutils;
pub mod validation;

use derive_more::{AsRef, Display, From, Into};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::crypto::seal::{PublicSealingKey, SecretSealingKey};

#[derive(Error, Debug)]
#[error("initialization failed: insufficient system entropy to generate secrets")]
/// An error related to insufficient system entropy for secrets at program startup.
pub struct InitError;

/// A public encryption key that identifies a coordinator. Cipher seeds
/// are sealed to this key.
pub type CoordinatorPublicKey = PublicSealingKey;

/// A secret encryption key that belongs to the public key of a
/// coordinator.
pub type CoordinatorSecretKey = SecretSealingKey;

/// An integer identifying a participating data holder within a round.
///
/// The party id determines which share of a secret or identity a node
/// may see; it is carried in every cipher context and alignment
/// exchange rather than inferred from transport metadata.
#[derive(
    Debug, Display, Clone, Copy, From, Into, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize,
    Deserialize,
)]
pub struct PartyId(pub u32);

/// The name under which a joint model and its round state are kept.
///
/// Projects are independent of each other: each has its own keys, its
/// own staged datasets and its own model.
#[derive(
    Debug, Display, Clone, From, Into, AsRef, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize,
    Deserialize,
)]
pub struct ProjectName(String);

impl ProjectName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}
