use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::{
    state_machine::{
        events::PayloadUpdate,
        phases::{HandedOff, Phase, PhaseError, PhaseName, PhaseState, Shared},
        StateMachine,
    },
    storage::{Storage, StorageError},
    trainer::TrainingPayload,
};
use silonet_core::{
    cipher::{decrypt, Ciphertext, DecodeError},
    validation::{validate_dataset, ValidationError},
};

/// Error that occurs during the ready phase.
#[derive(Error, Debug)]
pub enum ReadyError {
    #[error("decrypting the noised aggregate failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("the noised aggregate is invalid: {0}")]
    Validation(#[from] ValidationError),
    #[error("fetching the project model failed: {0}")]
    FetchModel(StorageError),
}

/// The ready state.
///
/// The noised aggregate is decrypted exactly once and released to the round's trainer. This is
/// the only point of the pipeline where a dataset leaves the ciphertext space.
#[derive(Debug)]
pub struct Ready {
    /// The aggregate with its noise share folded in.
    noised: Ciphertext,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Ready, T>
where
    T: Storage,
{
    const NAME: PhaseName = PhaseName::Ready;

    async fn run(&mut self) -> Result<(), PhaseError> {
        let dataset =
            decrypt(&self.private.noised, &self.shared.state.keys).map_err(ReadyError::Decode)?;
        validate_dataset(&dataset).map_err(ReadyError::Validation)?;

        let model = self
            .shared
            .store
            .model(&self.shared.state.project)
            .await
            .map_err(ReadyError::FetchModel)?;

        let (rows, cols) = dataset.shape();
        info!("releasing a {}x{} noised aggregate for training", rows, cols);
        let payload = TrainingPayload {
            project: self.shared.state.project.clone(),
            task: self.shared.state.round_params.task,
            model,
            dataset,
            epochs: self.shared.state.trainer.epochs,
        };
        self.shared
            .events
            .broadcast_payload(PayloadUpdate::New(Arc::new(payload)));
        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        Some(PhaseState::<HandedOff, _>::new(self.shared).into())
    }
}

impl<T> PhaseState<Ready, T> {
    /// Creates a new ready state.
    pub fn new(shared: Shared<T>, noised: Ciphertext) -> Self {
        Self {
            private: Ready { noised },
            shared,
        }
    }
}
