//! Storage API.

use async_trait::async_trait;
use derive_more::Deref;
use displaydoc::Display;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::{coordinator::CoordinatorState, events::RoundEventRecord};
use silonet_core::{
    cipher::Ciphertext,
    model::{Checkpoint, ModelArtifact},
    validation::PrivacySettings,
    PartyId,
    ProjectName,
};

/// An encrypted dataset staged for the next round, together with the privacy settings its
/// party declared for it.
///
/// The settings travel with the ciphertext so that a round can refuse to mix datasets whose
/// parties disagree on the protocols, instead of silently folding them under one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedDataset {
    /// The privacy settings declared by the party.
    pub settings: PrivacySettings,
    /// The encrypted dataset.
    pub dataset: Ciphertext,
}

/// The error type for storage operations that are not directly related to application domain.
/// These include, for example IO errors like broken pipe, file not found, out-of-memory, etc.
pub type StorageError = anyhow::Error;

/// The result of the storage operation.
pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
/// An abstract project storage.
///
/// A project storage keeps the round state of every project: its coordinator state, the
/// datasets staged for the next round and the round event log.
pub trait ProjectStorage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Sets a [`CoordinatorState`] for the project it belongs to.
    ///
    /// # Behavior
    ///
    /// - If no state has been set yet, set the state and return `StorageResult::Ok(())`.
    /// - If a state already exists, override the state and return `StorageResult::Ok(())`.
    async fn set_coordinator_state(&mut self, state: &CoordinatorState) -> StorageResult<()>;

    /// Returns the [`CoordinatorState`] of a project.
    ///
    /// # Behavior
    ///
    /// - If no state has been set yet, return `StorageResult::Ok(Option::None)`.
    /// - If a state exists, return `StorageResult::Ok(Some(CoordinatorState))`.
    async fn coordinator_state(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Option<CoordinatorState>>;

    /// Stages an encrypted dataset of a party for the next round of a project.
    ///
    /// # Behavior
    ///
    /// - If the dataset has been successfully staged, return `StorageResult::Ok(DatasetAdd)`
    ///   containing a `Result::Ok(())`.
    /// - If the party already staged a dataset for this round, return the corresponding
    ///   `StorageResult::Ok(DatasetAdd)` containing a `Result::Err(DatasetAddError)`.
    async fn add_staged_dataset(
        &mut self,
        project: &ProjectName,
        party: PartyId,
        dataset: &StagedDataset,
    ) -> StorageResult<DatasetAdd>;

    /// Returns the staged datasets of a project, sorted by party id in ascending order.
    ///
    /// # Behavior
    ///
    /// - If no dataset is staged, return `StorageResult::Ok(Vec::new())`.
    async fn staged_datasets(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Vec<(PartyId, StagedDataset)>>;

    /// Returns the number of staged datasets of a project.
    async fn staged_count(&mut self, project: &ProjectName) -> StorageResult<u64>;

    /// Deletes the staged datasets of a project.
    async fn delete_staged_datasets(&mut self, project: &ProjectName) -> StorageResult<()>;

    /// Appends a [`RoundEventRecord`] to the event log of a project.
    async fn append_round_event(
        &mut self,
        project: &ProjectName,
        event: &RoundEventRecord,
    ) -> StorageResult<()>;

    /// Returns the event log of a project in insertion order.
    ///
    /// # Behavior
    ///
    /// - If no event has been recorded yet, return `StorageResult::Ok(Vec::new())`.
    async fn round_events(&mut self, project: &ProjectName)
        -> StorageResult<Vec<RoundEventRecord>>;

    /// Deletes all data of a project. This includes the coordinator state, the staged
    /// datasets and the event log.
    async fn delete_project_data(&mut self, project: &ProjectName) -> StorageResult<()>;

    /// Checks if the [`ProjectStorage`] is ready to process requests.
    ///
    /// # Behavior
    ///
    /// If the [`ProjectStorage`] is ready to process requests, return `StorageResult::Ok(())`.
    /// If the [`ProjectStorage`] cannot process requests because of a connection error,
    /// for example, return `StorageResult::Err(error)`.
    async fn is_ready(&mut self) -> StorageResult<()>;
}

#[async_trait]
/// An abstract model and checkpoint storage.
pub trait CheckpointStorage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Sets the current model of a project.
    ///
    /// # Behavior
    ///
    /// - If no model has been set yet, set the model and return `StorageResult::Ok(())`.
    /// - If a model already exists, override the model and return `StorageResult::Ok(())`.
    async fn set_model(
        &mut self,
        project: &ProjectName,
        model: &ModelArtifact,
    ) -> StorageResult<()>;

    /// Returns the current model of a project.
    ///
    /// # Behavior
    ///
    /// - If the model does not exist, return `StorageResult::Ok(Option::None)`.
    /// - If the model exists, return `StorageResult::Ok(Option::Some(ModelArtifact))`.
    async fn model(&mut self, project: &ProjectName) -> StorageResult<Option<ModelArtifact>>;

    /// Sets the checkpoint of a project.
    ///
    /// # Behavior
    ///
    /// A project has a single checkpoint slot: saving a checkpoint overwrites the previous
    /// one. Return `StorageResult::Ok(())` once the slot has been written.
    async fn set_checkpoint(
        &mut self,
        project: &ProjectName,
        checkpoint: &Checkpoint,
    ) -> StorageResult<()>;

    /// Returns the checkpoint of a project.
    ///
    /// # Behavior
    ///
    /// - If no checkpoint has been saved yet, return `StorageResult::Ok(Option::None)`.
    /// - If a checkpoint exists, return `StorageResult::Ok(Option::Some(Checkpoint))`.
    async fn checkpoint(&mut self, project: &ProjectName) -> StorageResult<Option<Checkpoint>>;

    /// Creates the storage key under which the checkpoint of a project is kept.
    fn checkpoint_key(project: &ProjectName) -> String {
        format!("checkpoints/{}_checkpoint", project)
    }

    /// Checks if the [`CheckpointStorage`] is ready to process requests.
    ///
    /// # Behavior
    ///
    /// If the [`CheckpointStorage`] is ready to process requests, return `StorageResult::Ok(())`.
    /// If the [`CheckpointStorage`] cannot process requests because of a connection error,
    /// for example, return `StorageResult::Err(error)`.
    async fn is_ready(&mut self) -> StorageResult<()>;
}

#[async_trait]
pub trait Storage: ProjectStorage + CheckpointStorage {
    /// Checks if the [`ProjectStorage`] and [`CheckpointStorage`] are ready to process
    /// requests.
    ///
    /// # Behavior
    ///
    /// If all inner services are ready to process requests,
    /// return `StorageResult::Ok(())`.
    /// If any inner service cannot process requests because of a connection error,
    /// for example, return `StorageResult::Err(error)`.
    async fn is_ready(&mut self) -> StorageResult<()>;
}

/// A wrapper that contains the result of the "add staged dataset" operation.
#[derive(Deref)]
pub struct DatasetAdd(pub(crate) Result<(), DatasetAddError>);

impl DatasetAdd {
    /// Unwraps this wrapper, returning the underlying result.
    pub fn into_inner(self) -> Result<(), DatasetAddError> {
        self.0
    }
}

/// Error that can occur when staging a dataset for a round.
#[derive(Display, Error, Debug, TryFromPrimitive)]
#[repr(i64)]
pub enum DatasetAddError {
    /// the party already staged a dataset for this round
    AlreadyStaged = 0,
}
