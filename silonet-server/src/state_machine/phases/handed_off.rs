use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

use crate::{
    metric,
    state_machine::{
        events::ModelUpdate,
        phases::{Handler, Idle, Phase, PhaseError, PhaseName, PhaseState, Shared},
        requests::{RequestError, StateMachineRequest, TrainedRequest},
        StateMachine,
    },
    storage::{Storage, StorageError},
};
use silonet_core::validation::validate_model_output;

/// Error that occurs during the handover phase.
#[derive(Error, Debug)]
pub enum HandedOffError {
    #[error("clearing the staged datasets failed: {0}")]
    DeleteStagedDatasets(StorageError),
}

/// The handover state.
///
/// The round waits for its trainer to report back, then persists the trained model and releases
/// it to subscribers.
#[derive(Debug)]
pub struct HandedOff {
    /// Whether a trained model has been reported for the round.
    trained: bool,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<HandedOff, T>
where
    Self: Handler,
    T: Storage,
{
    const NAME: PhaseName = PhaseName::HandedOff;

    async fn run(&mut self) -> Result<(), PhaseError> {
        let time = self.shared.state.pipeline.timeout;
        debug!("in handover phase for max {} seconds", time);
        timeout(Duration::from_secs(time), self.process_until_trained()).await??;

        // the staged datasets have served their round
        info!("clearing the staged datasets of the completed round");
        self.shared
            .store
            .delete_staged_datasets(&self.shared.state.project)
            .await
            .map_err(HandedOffError::DeleteStagedDatasets)?;

        self.shared
            .record_event(Self::NAME, "round completed")
            .await;
        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        Some(PhaseState::<Idle, _>::new(self.shared).into())
    }
}

#[async_trait]
impl<T> Handler for PhaseState<HandedOff, T>
where
    T: Storage,
{
    /// Handles a [`TrainedRequest`].
    ///
    /// Uploads and start signals are rejected during the handover.
    async fn handle_request(&mut self, req: StateMachineRequest) -> Result<(), RequestError> {
        match req {
            StateMachineRequest::Trained(trained_req) => self.handle_trained(trained_req).await,
            _ => Err(RequestError::MessageRejected),
        }
    }
}

impl<T> PhaseState<HandedOff, T>
where
    Self: Handler + Phase<T>,
    T: Storage,
{
    /// Processes requests until the trained model has been reported.
    async fn process_until_trained(&mut self) -> Result<(), PhaseError> {
        while !self.private.trained {
            debug!("waiting for the trained model");
            self.process_next().await?;
        }
        Ok(())
    }
}

impl<T> PhaseState<HandedOff, T>
where
    T: Storage,
{
    /// Creates a new handover state.
    pub fn new(shared: Shared<T>) -> Self {
        Self {
            private: HandedOff { trained: false },
            shared,
        }
    }

    /// Persists and releases the trained model of the round.
    async fn handle_trained(&mut self, req: TrainedRequest) -> Result<(), RequestError> {
        let TrainedRequest { artifact, metrics } = req;
        if artifact.task != self.shared.state.round_params.task {
            return Err(RequestError::TaskMismatch);
        }
        for tensor in artifact.tensors.values() {
            validate_model_output(tensor)?;
        }

        self.shared
            .store
            .set_model(&self.shared.state.project, &artifact)
            .await?;

        for epoch in metrics {
            metric!(
                training: self.shared.state.project.as_str(),
                epoch.epoch,
                epoch.loss,
                epoch.accuracy,
            );
            let message = format!(
                "epoch {}: loss {:.4}, accuracy {:.4}",
                epoch.epoch, epoch.loss, epoch.accuracy,
            );
            self.shared.record_event(Self::NAME, message).await;
        }

        info!("broadcasting the trained model");
        self.shared
            .events
            .broadcast_model(ModelUpdate::New(Arc::new(artifact)));
        self.private.trained = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::{
        state_machine::tests::{utils, StateMachineBuilder},
        storage::{tests::init_store, CheckpointStorage},
    };
    use silonet_core::{model::Tensor, testutils, TaskType};

    #[tokio::test]
    #[serial]
    async fn integration_handed_off_to_idle_when_trained() {
        let store = init_store().await;
        let (state_machine, request_tx, events) = StateMachineBuilder::new(store.clone())
            .with_phase(HandedOff { trained: false })
            .build();
        assert!(state_machine.is_handed_off());

        let transition = tokio::spawn(async move { state_machine.next().await });
        let artifact = testutils::model(TaskType::FraudDetection);
        utils::send_trained(&request_tx, artifact.clone())
            .await
            .unwrap();
        // Safe unwrap: the state machine is still running
        let state_machine = transition.await.unwrap().unwrap();
        assert!(state_machine.is_idle());

        let mut store = store;
        assert_eq!(
            store.model(&utils::project()).await.unwrap(),
            Some(artifact.clone()),
        );
        match events.model_listener().get_latest().event {
            ModelUpdate::New(model) => assert_eq!(*model, artifact),
            ModelUpdate::Invalidate => panic!("expected a new model"),
        }
    }

    #[tokio::test]
    #[serial]
    async fn integration_handover_times_out_without_a_report() {
        let store = init_store().await;
        let (state_machine, _request_tx, _events) = StateMachineBuilder::new(store)
            .with_timeout(1)
            .with_phase(HandedOff { trained: false })
            .build();

        // the request sender is kept alive, so only the timeout can fail the phase
        let state_machine = state_machine.next().await.unwrap();
        assert!(state_machine.is_failure());
    }

    #[tokio::test]
    #[serial]
    async fn test_trained_report_rejections() {
        let store = init_store().await;
        let (shared, _request_tx, _events) = utils::init_shared(utils::coordinator_state(), store);
        let mut phase = PhaseState::<HandedOff, _>::new(shared);

        // the round trains fraud detection
        let trained = utils::trained_request(testutils::model(TaskType::FakeNewsDetection));
        let err = phase.handle_request(trained.into()).await.unwrap_err();
        assert!(matches!(err, RequestError::TaskMismatch));

        let mut artifact = testutils::model(TaskType::FraudDetection);
        artifact
            .tensors
            .insert("dense_0".to_string(), Tensor::new(1, 1, vec![f64::NAN]));
        let trained = utils::trained_request(artifact);
        let err = phase.handle_request(trained.into()).await.unwrap_err();
        assert!(matches!(err, RequestError::Validation(_)));

        let err = phase
            .handle_request(utils::upload_request(0).into())
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::MessageRejected));
        assert!(!phase.private.trained);
    }
}
