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
    align::{agree_protocol, intersect, AlignmentError},
    cipher::{decrypt, DecodeError},
    dataset::Dataset,
    validation::{validate_dataset, ValidationError},
    PartyId,
};

/// Error that occurs during the aligning phase.
#[derive(Error, Debug)]
pub enum AligningError {
    #[error("decrypting a dataset failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("a decrypted dataset is invalid: {0}")]
    Validation(#[from] ValidationError),
    #[error("aligning the datasets failed: {0}")]
    Alignment(#[from] AlignmentError),
}

/// The aligning state.
///
/// The staged datasets are decrypted and each party's view is restricted to the records all
/// parties share, in one agreed record order.
#[derive(Debug)]
pub struct Aligning {
    /// The staged datasets of the round.
    staged: Vec<(PartyId, StagedDataset)>,
    /// The aligned views, one per party.
    aligned: Vec<(PartyId, Dataset)>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Aligning, T>
where
    T: Storage,
{
    const NAME: PhaseName = PhaseName::Aligning;

    async fn run(&mut self) -> Result<(), PhaseError> {
        let protocol = agree_protocol(
            self.private
                .staged
                .iter()
                .map(|(_, staged)| staged.settings.psi),
        )
        .map_err(AligningError::Alignment)?;
        info!(
            "aligning {} datasets over {}",
            self.private.staged.len(),
            protocol,
        );

        let mut datasets = Vec::with_capacity(self.private.staged.len());
        for (party, staged) in self.private.staged.drain(..) {
            let dataset =
                decrypt(&staged.dataset, &self.shared.state.keys).map_err(AligningError::Decode)?;
            validate_dataset(&dataset).map_err(AligningError::Validation)?;
            datasets.push((party, dataset));
        }

        for (party, _) in &datasets {
            let aligned =
                intersect(&datasets, *party, protocol).map_err(AligningError::Alignment)?;
            self.private.aligned.push((*party, aligned));
        }
        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        Some(PhaseState::<Aggregating, _>::new(self.shared, self.private.aligned).into())
    }
}

impl<T> PhaseState<Aligning, T> {
    /// Creates a new aligning state.
    pub fn new(shared: Shared<T>, staged: Vec<(PartyId, StagedDataset)>) -> Self {
        Self {
            private: Aligning {
                staged,
                aligned: Vec::new(),
            },
            shared,
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::{state_machine::tests::utils, storage::tests::init_store};
    use silonet_core::{
        cipher::Encryptor,
        testutils,
        validation::{PrivacySettings, PsiProtocol},
    };

    fn stage(
        dataset: &Dataset,
        party: u32,
        settings: PrivacySettings,
        shared: &Shared<impl Storage>,
    ) -> (PartyId, StagedDataset) {
        let ciphertext = Encryptor::new(shared.state.suite()).encrypt(
            dataset,
            PartyId(party),
            &shared.state.keys.public,
        );
        (
            PartyId(party),
            StagedDataset {
                settings,
                dataset: ciphertext,
            },
        )
    }

    #[tokio::test]
    #[serial]
    async fn test_aligns_each_party_to_the_shared_records() {
        let store = init_store().await;
        let (shared, _request_tx, _events) = utils::init_shared(utils::coordinator_state(), store);

        let first = testutils::dataset_with_ids(&[1., 2., 3., 4.], 3);
        let second = testutils::dataset_with_ids(&[4., 2., 9.], 3);
        let staged = vec![
            stage(&first, 0, testutils::settings(), &shared),
            stage(&second, 1, testutils::settings(), &shared),
        ];

        let mut phase = PhaseState::<Aligning, _>::new(shared, staged);
        phase.run().await.unwrap();

        assert_eq!(phase.private.aligned.len(), 2);
        for (party, aligned) in &phase.private.aligned {
            let mut ids: Vec<f64> = aligned.record_ids().collect();
            ids.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(ids, vec![2., 4.], "party {}", party);
        }
        // both views list the shared records in the same order
        assert_eq!(
            phase.private.aligned[0].1.record_ids().collect::<Vec<_>>(),
            phase.private.aligned[1].1.record_ids().collect::<Vec<_>>(),
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_disjoint_datasets_align_to_zero_records() {
        let store = init_store().await;
        let (shared, _request_tx, _events) = utils::init_shared(utils::coordinator_state(), store);

        let first = testutils::dataset_with_ids(&[1., 2.], 3);
        let second = testutils::dataset_with_ids(&[3., 4.], 3);
        let staged = vec![
            stage(&first, 0, testutils::settings(), &shared),
            stage(&second, 1, testutils::settings(), &shared),
        ];

        let mut phase = PhaseState::<Aligning, _>::new(shared, staged);
        phase.run().await.unwrap();

        for (_, aligned) in &phase.private.aligned {
            assert_eq!(aligned.shape(), (0, 3));
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_unimplemented_protocol_fails_the_round() {
        let store = init_store().await;
        let (shared, _request_tx, _events) = utils::init_shared(utils::coordinator_state(), store);

        let settings = PrivacySettings {
            psi: PsiProtocol::KkrtPsi,
            ..testutils::settings()
        };
        let dataset = testutils::dataset_with_ids(&[1., 2.], 3);
        let staged = vec![
            stage(&dataset, 0, settings, &shared),
            stage(&dataset, 1, settings, &shared),
        ];

        let mut phase = PhaseState::<Aligning, _>::new(shared, staged);
        let err = phase.run().await.unwrap_err();
        assert!(matches!(
            err,
            PhaseError::Aligning(AligningError::Alignment(AlignmentError::Unsupported(
                PsiProtocol::KkrtPsi,
            ))),
        ));
    }
}
