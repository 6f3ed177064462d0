//! A generic store.

use async_trait::async_trait;

use crate::{
    state_machine::{coordinator::CoordinatorState, events::RoundEventRecord},
    storage::{
        CheckpointStorage,
        DatasetAdd,
        ProjectStorage,
        StagedDataset,
        Storage,
        StorageResult,
    },
};
use silonet_core::{
    model::{Checkpoint, ModelArtifact},
    PartyId,
    ProjectName,
};

#[derive(Clone)]
/// A generic store.
pub struct Store<P, C>
where
    P: ProjectStorage,
    C: CheckpointStorage,
{
    /// A project store.
    project: P,
    /// A model and checkpoint store.
    checkpoint: C,
}

impl<P, C> Store<P, C>
where
    P: ProjectStorage,
    C: CheckpointStorage,
{
    /// Creates a new [`Store`].
    pub fn new(project: P, checkpoint: C) -> Self {
        Self {
            project,
            checkpoint,
        }
    }
}

#[async_trait]
impl<P, C> ProjectStorage for Store<P, C>
where
    P: ProjectStorage,
    C: CheckpointStorage,
{
    async fn set_coordinator_state(&mut self, state: &CoordinatorState) -> StorageResult<()> {
        self.project.set_coordinator_state(state).await
    }

    async fn coordinator_state(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Option<CoordinatorState>> {
        self.project.coordinator_state(project).await
    }

    async fn add_staged_dataset(
        &mut self,
        project: &ProjectName,
        party: PartyId,
        dataset: &StagedDataset,
    ) -> StorageResult<DatasetAdd> {
        self.project.add_staged_dataset(project, party, dataset).await
    }

    async fn staged_datasets(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Vec<(PartyId, StagedDataset)>> {
        self.project.staged_datasets(project).await
    }

    async fn staged_count(&mut self, project: &ProjectName) -> StorageResult<u64> {
        self.project.staged_count(project).await
    }

    async fn delete_staged_datasets(&mut self, project: &ProjectName) -> StorageResult<()> {
        self.project.delete_staged_datasets(project).await
    }

    async fn append_round_event(
        &mut self,
        project: &ProjectName,
        event: &RoundEventRecord,
    ) -> StorageResult<()> {
        self.project.append_round_event(project, event).await
    }

    async fn round_events(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Vec<RoundEventRecord>> {
        self.project.round_events(project).await
    }

    async fn delete_project_data(&mut self, project: &ProjectName) -> StorageResult<()> {
        self.project.delete_project_data(project).await
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        self.project.is_ready().await
    }
}

#[async_trait]
impl<P, C> CheckpointStorage for Store<P, C>
where
    P: ProjectStorage,
    C: CheckpointStorage,
{
    async fn set_model(
        &mut self,
        project: &ProjectName,
        model: &ModelArtifact,
    ) -> StorageResult<()> {
        self.checkpoint.set_model(project, model).await
    }

    async fn model(&mut self, project: &ProjectName) -> StorageResult<Option<ModelArtifact>> {
        self.checkpoint.model(project).await
    }

    async fn set_checkpoint(
        &mut self,
        project: &ProjectName,
        checkpoint: &Checkpoint,
    ) -> StorageResult<()> {
        self.checkpoint.set_checkpoint(project, checkpoint).await
    }

    async fn checkpoint(&mut self, project: &ProjectName) -> StorageResult<Option<Checkpoint>> {
        self.checkpoint.checkpoint(project).await
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        self.checkpoint.is_ready().await
    }
}

#[async_trait]
impl<P, C> Storage for Store<P, C>
where
    P: ProjectStorage,
    C: CheckpointStorage,
{
    async fn is_ready(&mut self) -> StorageResult<()> {
        tokio::try_join!(self.project.is_ready(), self.checkpoint.is_ready()).map(|_| ())
    }
}
