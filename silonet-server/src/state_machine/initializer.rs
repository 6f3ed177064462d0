use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::{
    settings::{PipelineSettings, PrivacySettings, TrainerSettings},
    state_machine::{
        coordinator::CoordinatorState,
        events::{EventPublisher, EventSubscriber, ModelUpdate},
        phases::{Idle, PhaseName, PhaseState, Shared},
        requests::{RequestReceiver, RequestSender},
        StateMachine,
    },
    storage::{Storage, StorageError},
};
use silonet_core::{model::TaskType, ProjectName};

type StateMachineInitializationResult<T> = Result<T, StateMachineInitializationError>;

/// Error that can occur during the initialization of the [`StateMachine`].
#[derive(Debug, Error)]
pub enum StateMachineInitializationError {
    #[error("initializing crypto library failed")]
    CryptoInit,
    #[error("deleting project data failed: {0}")]
    DeleteProjectData(StorageError),
    #[error("fetching the project model failed: {0}")]
    FetchModel(StorageError),
}

/// The state machine initializer that initializes a new state machine for a project.
pub struct StateMachineInitializer<T>
where
    T: Storage,
{
    project: ProjectName,
    task: TaskType,
    pipeline_settings: PipelineSettings,
    privacy_settings: PrivacySettings,
    trainer_settings: TrainerSettings,

    store: T,
}

impl<T> StateMachineInitializer<T>
where
    T: Storage,
{
    /// Creates a new [`StateMachineInitializer`].
    pub fn new(
        project: ProjectName,
        task: TaskType,
        pipeline_settings: PipelineSettings,
        privacy_settings: PrivacySettings,
        trainer_settings: TrainerSettings,
        store: T,
    ) -> Self {
        Self {
            project,
            task,
            pipeline_settings,
            privacy_settings,
            trainer_settings,
            store,
        }
    }

    /// Initializes a new [`StateMachine`] with the given settings.
    ///
    /// Round data a previous run of the project left behind is discarded, a round is atomic
    /// across restarts as well. A model trained for the project earlier is picked up again.
    pub async fn init(
        mut self,
    ) -> StateMachineInitializationResult<(StateMachine<T>, RequestSender, EventSubscriber)> {
        // crucial: init must be called before anything else in this module
        sodiumoxide::init().or(Err(StateMachineInitializationError::CryptoInit))?;

        let (coordinator_state, model) = self.from_settings().await?;
        Ok(self.init_state_machine(coordinator_state, model))
    }

    // Creates a new [`CoordinatorState`] from the given settings and deletes the round data of
    // the project.
    pub(in crate::state_machine) async fn from_settings(
        &mut self,
    ) -> StateMachineInitializationResult<(CoordinatorState, ModelUpdate)> {
        self.store
            .delete_project_data(&self.project)
            .await
            .map_err(StateMachineInitializationError::DeleteProjectData)?;

        let model = match self
            .store
            .model(&self.project)
            .await
            .map_err(StateMachineInitializationError::FetchModel)?
        {
            Some(model) => {
                debug!("picking up the model trained for the project earlier");
                ModelUpdate::New(Arc::new(model))
            }
            None => ModelUpdate::Invalidate,
        };

        Ok((
            CoordinatorState::new(
                self.project.clone(),
                self.task,
                self.pipeline_settings,
                self.privacy_settings,
                self.trainer_settings,
            ),
            model,
        ))
    }

    // Initializes a new [`StateMachine`] with its components.
    fn init_state_machine(
        self,
        coordinator_state: CoordinatorState,
        model: ModelUpdate,
    ) -> (StateMachine<T>, RequestSender, EventSubscriber) {
        let (event_publisher, event_subscriber) = EventPublisher::init(
            coordinator_state.round_id,
            coordinator_state.keys.clone(),
            coordinator_state.round_params.clone(),
            PhaseName::Idle,
            model,
        );

        let (request_rx, request_tx) = RequestReceiver::new();

        let shared = Shared::new(coordinator_state, event_publisher, request_rx, self.store);

        let state_machine = StateMachine::from(PhaseState::<Idle, _>::new(shared));
        (state_machine, request_tx, event_subscriber)
    }
}
