//! This module implements the services the coordinator provides on top of the
//! per-project pipelines.
//!
//! The [`PipelineRegistry`] runs one pipeline state machine per project. It spawns a
//! pipeline on demand and hands out a [`PipelineHandle`] with which the REST layer
//! reaches the running machine:
//!
//! - the request sender for passing messages down to the state machine,
//! - the event subscriber for the round data the state machine broadcasts.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    settings::{PipelineSettings, PrivacySettings, TrainerSettings},
    state_machine::{
        events::EventSubscriber,
        RequestSender,
        StateMachineInitializationError,
        StateMachineInitializer,
    },
    storage::Storage,
};
use silonet_core::{model::TaskType, ProjectName};

/// Error that can occur when spawning the pipeline of a project.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("a pipeline is already serving the project")]
    AlreadyServed,
    #[error("initializing the pipeline failed: {0}")]
    Init(#[from] StateMachineInitializationError),
}

/// A handle onto the running pipeline of one project.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    /// A sender for requests to the pipeline.
    pub request_tx: RequestSender,
    /// A subscriber to the events the pipeline broadcasts.
    pub events: EventSubscriber,
}

/// A registry that runs one pipeline per project.
pub struct PipelineRegistry<T> {
    pipeline_settings: PipelineSettings,
    privacy_settings: PrivacySettings,
    trainer_settings: TrainerSettings,
    store: T,
    handles: Mutex<HashMap<ProjectName, PipelineHandle>>,
}

impl<T> PipelineRegistry<T>
where
    T: Storage,
{
    /// Creates a new registry without any running pipelines.
    pub fn new(
        pipeline_settings: PipelineSettings,
        privacy_settings: PrivacySettings,
        trainer_settings: TrainerSettings,
        store: T,
    ) -> Self {
        Self {
            pipeline_settings,
            privacy_settings,
            trainer_settings,
            store,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns a new pipeline for the project and returns a handle onto it.
    ///
    /// Fails if a pipeline is already serving the project.
    pub async fn serve(
        &self,
        project: ProjectName,
        task: TaskType,
    ) -> Result<PipelineHandle, ServiceError> {
        let mut handles = self.handles.lock().await;
        if handles.contains_key(&project) {
            return Err(ServiceError::AlreadyServed);
        }

        let handle = self.spawn(project.clone(), task).await?;
        handles.insert(project, handle.clone());
        Ok(handle)
    }

    /// Returns the handle onto the pipeline of the project, spawning the pipeline
    /// first if the project is new.
    pub async fn handle_or_serve(
        &self,
        project: ProjectName,
        task: TaskType,
    ) -> Result<PipelineHandle, ServiceError> {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(&project) {
            return Ok(handle.clone());
        }

        let handle = self.spawn(project.clone(), task).await?;
        handles.insert(project, handle.clone());
        Ok(handle)
    }

    /// Returns the handle onto the pipeline of the project, if one is running.
    pub async fn handle(&self, project: &ProjectName) -> Option<PipelineHandle> {
        self.handles.lock().await.get(project).cloned()
    }

    async fn spawn(
        &self,
        project: ProjectName,
        task: TaskType,
    ) -> Result<PipelineHandle, ServiceError> {
        let (state_machine, request_tx, events) = StateMachineInitializer::new(
            project.clone(),
            task,
            self.pipeline_settings,
            self.privacy_settings,
            self.trainer_settings,
            self.store.clone(),
        )
        .init()
        .await?;

        info!("spawning the pipeline of project {}", project);
        tokio::spawn(state_machine.run());

        Ok(PipelineHandle { request_tx, events })
    }
}
