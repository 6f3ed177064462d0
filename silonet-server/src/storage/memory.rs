//! An in-memory [`ProjectStorage`] and [`CheckpointStorage`].
//!
//! The store keeps everything behind a shared mutex, which makes it unsuitable for
//! anything but tests and local development.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    state_machine::{coordinator::CoordinatorState, events::RoundEventRecord},
    storage::{
        CheckpointStorage,
        DatasetAdd,
        DatasetAddError,
        ProjectStorage,
        StagedDataset,
        StorageResult,
    },
};
use silonet_core::{
    model::{Checkpoint, ModelArtifact},
    PartyId,
    ProjectName,
};

#[derive(Clone, Default)]
/// An in-memory project store.
pub struct ProjectStore {
    projects: Arc<Mutex<HashMap<ProjectName, ProjectData>>>,
}

#[derive(Default)]
struct ProjectData {
    state: Option<CoordinatorState>,
    staged: BTreeMap<PartyId, StagedDataset>,
    events: Vec<RoundEventRecord>,
}

impl ProjectStore {
    /// Creates a new empty [`ProjectStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStorage for ProjectStore {
    async fn set_coordinator_state(&mut self, state: &CoordinatorState) -> StorageResult<()> {
        let mut projects = self.projects.lock().unwrap();
        projects.entry(state.project.clone()).or_default().state = Some(state.clone());
        Ok(())
    }

    async fn coordinator_state(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Option<CoordinatorState>> {
        let projects = self.projects.lock().unwrap();
        Ok(projects.get(project).and_then(|data| data.state.clone()))
    }

    async fn add_staged_dataset(
        &mut self,
        project: &ProjectName,
        party: PartyId,
        dataset: &StagedDataset,
    ) -> StorageResult<DatasetAdd> {
        let mut projects = self.projects.lock().unwrap();
        let staged = &mut projects.entry(project.clone()).or_default().staged;
        if staged.contains_key(&party) {
            return Ok(DatasetAdd(Err(DatasetAddError::AlreadyStaged)));
        }
        staged.insert(party, dataset.clone());
        Ok(DatasetAdd(Ok(())))
    }

    async fn staged_datasets(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Vec<(PartyId, StagedDataset)>> {
        let projects = self.projects.lock().unwrap();
        let datasets = projects
            .get(project)
            .map(|data| {
                data.staged
                    .iter()
                    .map(|(party, dataset)| (*party, dataset.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(datasets)
    }

    async fn staged_count(&mut self, project: &ProjectName) -> StorageResult<u64> {
        let projects = self.projects.lock().unwrap();
        Ok(projects
            .get(project)
            .map(|data| data.staged.len() as u64)
            .unwrap_or(0))
    }

    async fn delete_staged_datasets(&mut self, project: &ProjectName) -> StorageResult<()> {
        let mut projects = self.projects.lock().unwrap();
        if let Some(data) = projects.get_mut(project) {
            data.staged.clear();
        }
        Ok(())
    }

    async fn append_round_event(
        &mut self,
        project: &ProjectName,
        event: &RoundEventRecord,
    ) -> StorageResult<()> {
        let mut projects = self.projects.lock().unwrap();
        projects
            .entry(project.clone())
            .or_default()
            .events
            .push(event.clone());
        Ok(())
    }

    async fn round_events(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Vec<RoundEventRecord>> {
        let projects = self.projects.lock().unwrap();
        Ok(projects
            .get(project)
            .map(|data| data.events.clone())
            .unwrap_or_default())
    }

    async fn delete_project_data(&mut self, project: &ProjectName) -> StorageResult<()> {
        let mut projects = self.projects.lock().unwrap();
        projects.remove(project);
        Ok(())
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
/// An in-memory model and checkpoint store.
pub struct CheckpointStore {
    models: Arc<Mutex<HashMap<ProjectName, ModelArtifact>>>,
    checkpoints: Arc<Mutex<HashMap<String, Checkpoint>>>,
}

impl CheckpointStore {
    /// Creates a new empty [`CheckpointStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStorage for CheckpointStore {
    async fn set_model(
        &mut self,
        project: &ProjectName,
        model: &ModelArtifact,
    ) -> StorageResult<()> {
        let mut models = self.models.lock().unwrap();
        models.insert(project.clone(), model.clone());
        Ok(())
    }

    async fn model(&mut self, project: &ProjectName) -> StorageResult<Option<ModelArtifact>> {
        let models = self.models.lock().unwrap();
        Ok(models.get(project).cloned())
    }

    async fn set_checkpoint(
        &mut self,
        project: &ProjectName,
        checkpoint: &Checkpoint,
    ) -> StorageResult<()> {
        let mut checkpoints = self.checkpoints.lock().unwrap();
        checkpoints.insert(Self::checkpoint_key(project), checkpoint.clone());
        Ok(())
    }

    async fn checkpoint(&mut self, project: &ProjectName) -> StorageResult<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.lock().unwrap();
        Ok(checkpoints.get(&Self::checkpoint_key(project)).cloned())
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
