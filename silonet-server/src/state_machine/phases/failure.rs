use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::delay_for;
use tracing::{error, info, warn};

use crate::{
    event,
    state_machine::{
        events::PayloadUpdate,
        phases::{
            AggregatingError,
            AligningError,
            EncryptingError,
            HandedOffError,
            Idle,
            IdleError,
            NoisingError,
            Phase,
            PhaseName,
            PhaseState,
            ReadyError,
            Shared,
            Shutdown,
            SoloDecryptError,
            ValidatingError,
        },
        StateMachine,
    },
    storage::Storage,
};

/// Everything that can bring a round down.
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("request channel error: {0}")]
    RequestChannel(&'static str),
    #[error("phase timeout")]
    PhaseTimeout(#[from] tokio::time::Elapsed),
    #[error("idle phase failed: {0}")]
    Idle(#[from] IdleError),
    #[error("validating phase failed: {0}")]
    Validating(#[from] ValidatingError),
    #[error("solo decrypt phase failed: {0}")]
    SoloDecrypt(#[from] SoloDecryptError),
    #[error("aligning phase failed: {0}")]
    Aligning(#[from] AligningError),
    #[error("aggregating phase failed: {0}")]
    Aggregating(#[from] AggregatingError),
    #[error("encrypting phase failed: {0}")]
    Encrypting(#[from] EncryptingError),
    #[error("noising phase failed: {0}")]
    Noising(#[from] NoisingError),
    #[error("ready phase failed: {0}")]
    Ready(#[from] ReadyError),
    #[error("handover phase failed: {0}")]
    HandedOff(#[from] HandedOffError),
}

/// The failure state.
#[derive(Debug)]
pub struct Failure {
    error: PhaseError,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Failure, T>
where
    T: Storage,
{
    const NAME: PhaseName = PhaseName::Failure;

    async fn run(&mut self) -> Result<(), PhaseError> {
        error!("phase state error: {}", self.private.error);
        event!("Phase error", self.private.error.to_string());
        let message = format!("round failed: {}", self.private.error);
        self.shared.record_event(PhaseName::Failure, message).await;

        info!("broadcasting invalidation of the training payload");
        self.shared
            .events
            .broadcast_payload(PayloadUpdate::Invalidate);

        self.wait_for_store_readiness().await;

        // a round is atomic: whatever was staged for it is dropped with it
        info!("discarding the staged datasets of the abandoned round");
        if let Err(err) = self
            .shared
            .store
            .delete_staged_datasets(&self.shared.state.project)
            .await
        {
            warn!("failed to discard the staged datasets: {}", err);
        }

        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        Some(match self.private.error {
            PhaseError::RequestChannel(_) => PhaseState::<Shutdown, _>::new(self.shared).into(),
            _ => PhaseState::<Idle, _>::new(self.shared).into(),
        })
    }
}

impl<T> PhaseState<Failure, T> {
    /// Creates a new failure phase.
    pub fn new(shared: Shared<T>, error: PhaseError) -> Self {
        Self {
            private: Failure { error },
            shared,
        }
    }
}

impl<T> PhaseState<Failure, T>
where
    T: Storage,
{
    /// Blocks until the store answers again. The cleanup below must not be
    /// skipped just because storage is briefly unreachable.
    async fn wait_for_store_readiness(&mut self) {
        while let Err(err) = <T as Storage>::is_ready(&mut self.shared.store).await {
            error!("store is not reachable: {}", err);
            info!("retrying in 5 sec");
            delay_for(Duration::from_secs(5)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::{
        state_machine::tests::{builder::StateMachineBuilder, utils},
        storage::{tests::init_store, ProjectStorage},
    };

    #[tokio::test]
    #[serial]
    async fn integration_failure_to_shutdown() {
        let store = init_store().await;
        let (state_machine, _request_tx, events) = StateMachineBuilder::new(store.clone())
            .with_phase(Failure {
                error: PhaseError::RequestChannel(""),
            })
            .build();
        assert!(state_machine.is_failure());

        let state_machine = state_machine.next().await.unwrap();
        assert!(state_machine.is_shutdown());

        // Check all the events that should be emitted during the failure phase
        assert_eq!(
            events.phase_listener().get_latest().event,
            PhaseName::Failure,
        );
        assert_eq!(
            events.payload_listener().get_latest().event,
            PayloadUpdate::Invalidate,
        );
    }

    #[tokio::test]
    #[serial]
    async fn integration_failure_clears_staged_datasets() {
        let mut store = init_store().await;
        let project = utils::project();
        utils::stage_datasets(&mut store, &project, &[0, 1]).await;

        let (state_machine, _request_tx, _events) = StateMachineBuilder::new(store.clone())
            .with_phase(Failure {
                error: PhaseError::PhaseTimeout(utils::elapsed().await),
            })
            .build();

        let state_machine = state_machine.next().await.unwrap();
        assert!(state_machine.is_idle());

        assert_eq!(store.staged_count(&project).await.unwrap(), 0);
    }
}
