#![cfg_attr(docsrs, feature(doc_cfg))]
//! # Silonet: joint models over siloed data
//!
//! Silonet lets several data holders train a joint model without revealing their raw records
//! to each other. Each party uploads an encrypted dataset to the coordinator; the coordinator
//! aligns the overlapping records with private set intersection, combines the aligned rows
//! with secure multi-party aggregation under additively homomorphic encryption, perturbs the
//! result with calibrated differential privacy noise, and only then hands the dataset to the
//! trainer serving the deployment.
//!
//! This crate implements the coordinator:
//! - [`state_machine`] drives one pipeline per project through its phases, from staging
//!   uploads over alignment, aggregation and noising to the trained model,
//! - [`services`] spawns and registers the per-project pipelines,
//! - [`rest`] exposes the HTTP surface the parties, the trainer and the operators talk to,
//! - [`lifecycle`] applies incremental, decremental and reweighting updates to persisted
//!   models and retrains them,
//! - [`storage`] persists pipeline state, staged datasets, round event logs, models and
//!   checkpoints in Redis or in memory,
//! - [`trainer`] is the boundary over which prepared payloads reach the trainer,
//! - [`settings`] loads and validates the configuration,
//! - [`metrics`] records round and training measurements to InfluxDB.
//!
//! The privacy primitives themselves, from the dataset validator over the additively
//! homomorphic codec to the alignment, aggregation and noising routines, live in the
//! `silonet-core` crate.

pub mod lifecycle;
pub mod metrics;
pub mod rest;
pub mod services;
pub mod settings;
pub mod state_machine;
pub mod storage;
pub mod trainer;
