use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    metric,
    metrics::Measurement,
    state_machine::{
        phases::{Handler, Phase, PhaseError, PhaseName, PhaseState, Shared, Validating},
        requests::{RequestError, StartRequest, StateMachineRequest, UploadRequest},
        StateMachine,
    },
    storage::{StagedDataset, Storage, StorageError},
};
use silonet_core::{
    cipher::Encryptor,
    common::RoundSeed,
    crypto::{ByteObject, SealingKeyPair},
    validation::{validate_data, validate_privacy_settings},
};

/// Error that occurs during the idle phase.
#[derive(Error, Debug)]
pub enum IdleError {
    #[error("setting the coordinator state failed: {0}")]
    SetCoordinatorState(StorageError),
}

/// The idle state.
///
/// The coordinator sits here between rounds: parties stage their encrypted datasets and one of
/// them eventually starts the round.
#[derive(Debug, Default)]
pub struct Idle {
    /// Whether a start signal has been received.
    started: bool,
    /// The privacy budget the start signal dictated, if any.
    epsilon_override: Option<f64>,
    /// The strictest privacy budget declared by an uploading party, if any.
    declared: Option<f64>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Idle, T>
where
    T: Storage,
{
    const NAME: PhaseName = PhaseName::Idle;

    /// Stages datasets until a start signal arrives, then moves to the next state.
    ///
    /// See the [module level documentation](../index.html) for more details.
    async fn run(&mut self) -> Result<(), PhaseError> {
        info!("updating the keys");
        self.gen_round_keypair();

        info!("resetting the round parameters");
        self.reset_round_params();

        self.shared
            .store
            .set_coordinator_state(&self.shared.state)
            .await
            .map_err(IdleError::SetCoordinatorState)?;

        let events = &mut self.shared.events;

        info!("broadcasting new keys");
        events.broadcast_keys(self.shared.state.keys.clone());

        info!("broadcasting new round parameters");
        events.broadcast_params(self.shared.state.round_params.clone());

        metric!(Measurement::RoundTotalNumber, self.shared.state.round_id);

        info!("waiting for dataset uploads and a start signal");
        while !self.private.started {
            self.process_next().await?;
        }

        // a start override beats the declared budgets, the strictest declared budget beats
        // the configured default
        let epsilon = self
            .private
            .epsilon_override
            .or(self.private.declared)
            .unwrap_or(self.shared.state.privacy.default_epsilon);
        self.shared.state.round_params.epsilon = epsilon;

        self.shared
            .store
            .set_coordinator_state(&self.shared.state)
            .await
            .map_err(IdleError::SetCoordinatorState)?;

        info!("broadcasting the negotiated round parameters");
        self.shared
            .events
            .broadcast_params(self.shared.state.round_params.clone());

        metric!(
            Measurement::RoundEpsilon,
            epsilon,
            ("round_id", self.shared.state.round_id),
            ("phase", Self::NAME as u8)
        );

        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        Some(PhaseState::<Validating, _>::new(self.shared).into())
    }
}

#[async_trait]
impl<T> Handler for PhaseState<Idle, T>
where
    T: Storage,
{
    /// Handles an [`UploadRequest`] or a [`StartRequest`].
    ///
    /// Trained model requests are rejected.
    async fn handle_request(&mut self, req: StateMachineRequest) -> Result<(), RequestError> {
        match req {
            StateMachineRequest::Upload(upload) => self.handle_upload(upload).await,
            StateMachineRequest::Start(start) => self.handle_start(start).await,
            StateMachineRequest::Trained(_) => Err(RequestError::MessageRejected),
        }
    }
}

impl<T> PhaseState<Idle, T> {
    /// Creates a new idle state.
    pub fn new(mut shared: Shared<T>) -> Self {
        // Since some events are emitted very early, the round id must
        // be correct when the idle phase starts. Therefore, we update
        // it here, when instantiating the idle PhaseState.
        shared.set_round_id(shared.round_id() + 1);
        debug!("new round ID = {}", shared.round_id());
        Self {
            private: Idle {
                started: false,
                epsilon_override: None,
                declared: None,
            },
            shared,
        }
    }

    /// Generates fresh round credentials.
    fn gen_round_keypair(&mut self) {
        self.shared.state.keys = SealingKeyPair::generate();
        self.shared.state.round_params.pk = self.shared.state.keys.public;
    }

    /// Rolls a fresh round seed and resets the round parameters to the configured defaults.
    fn reset_round_params(&mut self) {
        let privacy = self.shared.state.privacy;
        let seed = RoundSeed::generate();
        debug!("new round seed = {}", hex::encode(seed.as_slice()));
        self.shared.state.round_params.seed = seed;
        self.shared.state.round_params.epsilon = privacy.default_epsilon;
        self.shared.state.round_params.settings = privacy.settings;
    }
}

impl<T> PhaseState<Idle, T>
where
    T: Storage,
{
    /// Handles an upload request.
    async fn handle_upload(&mut self, req: UploadRequest) -> Result<(), RequestError> {
        let UploadRequest {
            party_id,
            task,
            settings,
            epsilon,
            rows,
        } = req;

        if task != self.shared.state.round_params.task {
            return Err(RequestError::TaskMismatch);
        }

        let settings = validate_privacy_settings(&settings)?;
        validate_epsilon(epsilon)?;
        let dataset = validate_data(rows)?;

        let project = self.shared.state.project.clone();
        let count = self.shared.store.staged_count(&project).await?;
        // one share of the cipher capacity is reserved for the noise ciphertext
        if count as usize >= self.shared.state.pipeline.capacity - 1 {
            return Err(RequestError::PipelineFull);
        }

        debug!("encrypting the dataset of party {} under the round key", party_id);
        let ciphertext = Encryptor::new(self.shared.state.suite()).encrypt(
            &dataset,
            party_id,
            &self.shared.state.round_params.pk,
        );

        let staged = StagedDataset {
            settings,
            dataset: ciphertext,
        };
        self.shared
            .store
            .add_staged_dataset(&project, party_id, &staged)
            .await?
            .into_inner()?;

        if let Some(e) = epsilon {
            // several parties may declare different budgets: the strictest one wins
            self.private.declared = Some(match self.private.declared {
                Some(declared) => declared.min(e),
                None => e,
            });
        }

        Ok(())
    }

    /// Handles a start request.
    async fn handle_start(&mut self, req: StartRequest) -> Result<(), RequestError> {
        validate_epsilon(req.epsilon)?;

        let count = self
            .shared
            .store
            .staged_count(&self.shared.state.project)
            .await?;
        if count == 0 {
            return Err(RequestError::MessageRejected);
        }

        self.private.epsilon_override = req.epsilon;
        self.private.started = true;
        Ok(())
    }
}

/// Checks that a declared privacy budget is positive.
fn validate_epsilon(epsilon: Option<f64>) -> Result<(), RequestError> {
    match epsilon {
        Some(e) if !(e.is_finite() && e > 0.) => Err(RequestError::InvalidPrivacyBudget),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use serial_test::serial;

    use super::*;
    use crate::{
        state_machine::{
            events::Event,
            tests::{builder::StateMachineBuilder, utils},
        },
        storage::tests::init_store,
    };
    use silonet_core::model::TaskType;

    #[tokio::test]
    #[serial]
    async fn integration_round_id_is_updated_when_idle_phase_runs() {
        let store = init_store().await;
        let coordinator_state = utils::coordinator_state();
        let (shared, request_tx, event_subscriber) = utils::init_shared(coordinator_state, store);

        let keys = event_subscriber.keys_listener();
        let id = keys.get_latest().round_id;
        assert_eq!(id, 0);

        let mut idle_phase = PhaseState::<Idle, _>::new(shared);
        let handle = tokio::spawn(async move {
            idle_phase.run().await.unwrap();
            idle_phase
        });

        utils::send_upload(&request_tx, 0).await.unwrap();
        utils::send_start(&request_tx).await.unwrap();
        let idle_phase = handle.await.unwrap();
        assert!(idle_phase.private.started);

        let id = keys.get_latest().round_id;
        assert_eq!(id, 1);
    }

    #[tokio::test]
    #[serial]
    async fn integration_idle_to_validating() {
        let store = init_store().await;
        let (state_machine, request_tx, events) = StateMachineBuilder::new(store.clone())
            .with_round_id(2)
            .build();
        assert!(state_machine.is_idle());

        let initial_round_params = events.params_listener().get_latest().event;
        let initial_keys = events.keys_listener().get_latest().event;
        let initial_seed = initial_round_params.seed.clone();

        let handle = tokio::spawn(state_machine.next());
        utils::send_upload(&request_tx, 0).await.unwrap();
        utils::send_start(&request_tx).await.unwrap();
        let state_machine = handle.await.unwrap().unwrap();
        assert!(state_machine.is_validating());

        let PhaseState { shared, .. } = state_machine.into_validating_phase_state();

        let new_round_params = shared.state.round_params.clone();
        let new_keys = shared.state.keys.clone();

        // Make sure the seed and keys have updated
        assert_ne!(initial_seed, new_round_params.seed);
        assert_ne!(initial_keys, new_keys);

        fn expected_event<T>(event: T) -> Event<T> {
            Event { round_id: 2, event }
        }

        // Check all the events that should be emitted during the idle
        // phase
        assert_eq!(
            events.phase_listener().get_latest(),
            expected_event(PhaseName::Idle)
        );

        assert_eq!(
            events.keys_listener().get_latest(),
            expected_event(new_keys),
        );

        assert_eq!(
            events.params_listener().get_latest(),
            expected_event(new_round_params)
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_upload_rejections() {
        let store = init_store().await;
        let coordinator_state = utils::coordinator_state();
        let (shared, _request_tx, _events) = utils::init_shared(coordinator_state, store);
        let mut idle = PhaseState::<Idle, _>::new(shared);

        // an upload for the wrong task
        let mut req = utils::upload_request(0);
        req.task = TaskType::FakeNewsDetection;
        let err = idle.handle_upload(req).await.unwrap_err();
        assert!(matches!(err, RequestError::TaskMismatch));

        // an upload with a protocol spelling outside the closed set
        let mut req = utils::upload_request(0);
        req.settings.psi = "ECDH".to_string();
        let err = idle.handle_upload(req).await.unwrap_err();
        assert!(matches!(err, RequestError::Validation(_)));

        // an upload with a non-positive budget
        let mut req = utils::upload_request(0);
        req.epsilon = Some(0.);
        let err = idle.handle_upload(req).await.unwrap_err();
        assert!(matches!(err, RequestError::InvalidPrivacyBudget));

        // an upload with an undefined budget
        let mut req = utils::upload_request(0);
        req.epsilon = Some(f64::NAN);
        let err = idle.handle_upload(req).await.unwrap_err();
        assert!(matches!(err, RequestError::InvalidPrivacyBudget));

        // nothing should have been staged
        let count = idle
            .shared
            .store
            .staged_count(&idle.shared.state.project)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    #[serial]
    async fn test_each_party_stages_once() {
        let store = init_store().await;
        let coordinator_state = utils::coordinator_state();
        let (shared, _request_tx, _events) = utils::init_shared(coordinator_state, store);
        let mut idle = PhaseState::<Idle, _>::new(shared);

        idle.handle_upload(utils::upload_request(0)).await.unwrap();
        let err = idle
            .handle_upload(utils::upload_request(0))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::DatasetAdd(_)));
    }

    #[tokio::test]
    #[serial]
    async fn test_capacity_reserves_noise_share() {
        let store = init_store().await;
        let mut coordinator_state = utils::coordinator_state();
        coordinator_state.pipeline.capacity = 2;
        let (shared, _request_tx, _events) = utils::init_shared(coordinator_state, store);
        let mut idle = PhaseState::<Idle, _>::new(shared);

        idle.handle_upload(utils::upload_request(0)).await.unwrap();
        let err = idle
            .handle_upload(utils::upload_request(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::PipelineFull));
    }

    #[tokio::test]
    #[serial]
    async fn test_strictest_declared_budget_wins() {
        let store = init_store().await;
        let coordinator_state = utils::coordinator_state();
        let (shared, _request_tx, _events) = utils::init_shared(coordinator_state, store);
        let mut idle = PhaseState::<Idle, _>::new(shared);

        let mut req = utils::upload_request(0);
        req.epsilon = Some(2.);
        idle.handle_upload(req).await.unwrap();

        let mut req = utils::upload_request(1);
        req.epsilon = Some(0.5);
        idle.handle_upload(req).await.unwrap();

        let mut req = utils::upload_request(2);
        req.epsilon = Some(1.5);
        idle.handle_upload(req).await.unwrap();

        assert_eq!(idle.private.declared, Some(0.5));
    }

    #[tokio::test]
    #[serial]
    async fn test_start_without_datasets_is_rejected() {
        let store = init_store().await;
        let coordinator_state = utils::coordinator_state();
        let (shared, _request_tx, _events) = utils::init_shared(coordinator_state, store);
        let mut idle = PhaseState::<Idle, _>::new(shared);

        let err = idle
            .handle_start(StartRequest { epsilon: None })
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::MessageRejected));
        assert!(!idle.private.started);

        idle.handle_upload(utils::upload_request(0)).await.unwrap();
        idle.handle_start(StartRequest { epsilon: Some(0.1) })
            .await
            .unwrap();
        assert!(idle.private.started);
        assert_eq!(idle.private.epsilon_override, Some(0.1));
    }
}
