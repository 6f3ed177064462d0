use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::{
    state_machine::{
        phases::{Aligning, Phase, PhaseError, PhaseName, PhaseState, Shared, SoloDecrypt},
        StateMachine,
    },
    storage::{StagedDataset, Storage, StorageError},
};
use silonet_core::PartyId;

/// Error that occurs during the validating phase.
#[derive(Error, Debug)]
pub enum ValidatingError {
    #[error("loading the staged datasets failed: {0}")]
    LoadStagedDatasets(StorageError),
    #[error("no dataset has been staged for the round")]
    NoDataset,
    #[error("{0} datasets have been staged but the round can fold at most {1}")]
    TooManyDatasets(usize, usize),
    #[error("the ciphertext of party {0} is malformed")]
    InvalidCiphertext(PartyId),
    #[error("the dataset of party {0} has a mismatching shape")]
    ShapeMismatch(PartyId),
    #[error("party {0} declared privacy settings that differ from its peers")]
    SettingsMismatch(PartyId),
}

/// The validating state.
#[derive(Debug)]
pub struct Validating {
    /// The staged datasets that passed validation, sorted by party id.
    datasets: Vec<(PartyId, StagedDataset)>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Validating, T>
where
    T: Storage,
{
    const NAME: PhaseName = PhaseName::Validating;

    /// Checks the staged datasets against each other and pins the round settings.
    async fn run(&mut self) -> Result<(), PhaseError> {
        let datasets = self
            .shared
            .store
            .staged_datasets(&self.shared.state.project)
            .await
            .map_err(ValidatingError::LoadStagedDatasets)?;

        info!("validating {} staged datasets", datasets.len());
        if datasets.is_empty() {
            return Err(ValidatingError::NoDataset.into());
        }
        // the noise ciphertext must still fit into the round
        let max = self.shared.state.pipeline.capacity - 1;
        if datasets.len() > max {
            return Err(ValidatingError::TooManyDatasets(datasets.len(), max).into());
        }

        let (_, first) = &datasets[0];
        let cols = first.dataset.context.cols;
        let settings = first.settings;
        for (party, staged) in &datasets {
            if !staged.dataset.is_valid() {
                return Err(ValidatingError::InvalidCiphertext(*party).into());
            }
            if staged.dataset.context.cols != cols {
                return Err(ValidatingError::ShapeMismatch(*party).into());
            }
            // peers must agree on the protocols, one of them never silently wins
            if staged.settings != settings {
                return Err(ValidatingError::SettingsMismatch(*party).into());
            }
        }

        // the round runs under the settings the parties agreed on
        self.shared.state.round_params.settings = settings;
        info!("broadcasting the agreed round parameters");
        self.shared
            .events
            .broadcast_params(self.shared.state.round_params.clone());

        self.private.datasets = datasets;
        Ok(())
    }

    /// A single dataset skips the alignment and goes straight to the solo decrypt path.
    fn next(self) -> Option<StateMachine<T>> {
        Some(if self.private.datasets.len() == 1 {
            PhaseState::<SoloDecrypt, _>::new(self.shared, self.private.datasets).into()
        } else {
            PhaseState::<Aligning, _>::new(self.shared, self.private.datasets).into()
        })
    }
}

impl<T> PhaseState<Validating, T> {
    /// Creates a new validating state.
    pub fn new(shared: Shared<T>) -> Self {
        Self {
            private: Validating {
                datasets: Vec::new(),
            },
            shared,
        }
    }
}
