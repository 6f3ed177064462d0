use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::{
    state_machine::{
        phases::{Aggregating, Phase, PhaseError, PhaseName, PhaseState, Shared},
        StateMachine,
    },
    storage::{StagedDataset, Storage},
};
use silonet_core::{
    cipher::{decrypt, DecodeError},
    dataset::Dataset,
    validation::{validate_dataset, ValidationError},
    PartyId,
};

/// Error that occurs during the solo decrypt phase.
#[derive(Error, Debug)]
pub enum SoloDecryptError {
    #[error("no dataset to decrypt")]
    NoDataset,
    #[error("decrypting the dataset failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("the decrypted dataset is invalid: {0}")]
    Validation(#[from] ValidationError),
}

/// The solo decrypt state.
///
/// A round with a single party has nothing to align or to sum across parties. Its dataset is
/// decrypted directly and the pipeline proceeds with noising alone.
#[derive(Debug)]
pub struct SoloDecrypt {
    /// The sole staged dataset of the round.
    staged: Vec<(PartyId, StagedDataset)>,
    /// The decrypted dataset.
    decrypted: Vec<(PartyId, Dataset)>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<SoloDecrypt, T>
where
    T: Storage,
{
    const NAME: PhaseName = PhaseName::SoloDecrypt;

    async fn run(&mut self) -> Result<(), PhaseError> {
        let (party, staged) = self
            .private
            .staged
            .pop()
            .ok_or(SoloDecryptError::NoDataset)?;

        info!("decrypting the dataset of party {}", party);
        let dataset =
            decrypt(&staged.dataset, &self.shared.state.keys).map_err(SoloDecryptError::Decode)?;
        validate_dataset(&dataset).map_err(SoloDecryptError::Validation)?;

        self.private.decrypted.push((party, dataset));
        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        Some(PhaseState::<Aggregating, _>::new(self.shared, self.private.decrypted).into())
    }
}

impl<T> PhaseState<SoloDecrypt, T> {
    /// Creates a new solo decrypt state.
    pub fn new(shared: Shared<T>, staged: Vec<(PartyId, StagedDataset)>) -> Self {
        Self {
            private: SoloDecrypt {
                staged,
                decrypted: Vec::new(),
            },
            shared,
        }
    }
}
