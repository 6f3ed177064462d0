use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::{
    state_machine::{
        phases::{Noising, Phase, PhaseError, PhaseName, PhaseState, Shared},
        StateMachine,
    },
    storage::Storage,
};
use silonet_core::{
    cipher::{Ciphertext, Encryptor},
    dataset::Dataset,
    validation::{validate_dataset, ValidationError},
    PartyId,
};

/// Error that occurs during the encrypting phase.
#[derive(Error, Debug)]
pub enum EncryptingError {
    #[error("the aggregate is invalid: {0}")]
    Validation(#[from] ValidationError),
}

/// The encrypting state.
///
/// The aggregate is put back under the round key so that the noise can be folded into it without
/// the unnoised aggregate ever being handed on in the clear.
#[derive(Debug)]
pub struct Encrypting {
    /// The element-wise sum of the views.
    aggregate: Dataset,
    /// The aggregate under the round key.
    ciphertext: Option<Ciphertext>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Encrypting, T>
where
    T: Storage,
{
    const NAME: PhaseName = PhaseName::Encrypting;

    async fn run(&mut self) -> Result<(), PhaseError> {
        // an overflowed sum must not be bounded back into the finite range
        validate_dataset(&self.private.aggregate).map_err(EncryptingError::Validation)?;

        let (rows, cols) = self.private.aggregate.shape();
        info!("encrypting the {}x{} aggregate under the round key", rows, cols);
        let ciphertext = Encryptor::new(self.shared.state.suite()).encrypt(
            &self.private.aggregate,
            PartyId(0),
            &self.shared.state.round_params.pk,
        );

        self.private.ciphertext = Some(ciphertext);
        Ok(())
    }

    fn next(mut self) -> Option<StateMachine<T>> {
        // Safe unwrap: PhaseState::<Encrypting>::run always sets Some(ciphertext)
        let ciphertext = self.private.ciphertext.take().unwrap();
        Some(PhaseState::<Noising, _>::new(self.shared, ciphertext).into())
    }
}

impl<T> PhaseState<Encrypting, T> {
    /// Creates a new encrypting state.
    pub fn new(shared: Shared<T>, aggregate: Dataset) -> Self {
        Self {
            private: Encrypting {
                aggregate,
                ciphertext: None,
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
    use silonet_core::{cipher::decrypt, testutils};

    #[tokio::test]
    #[serial]
    async fn test_encrypts_the_aggregate_under_the_round_key() {
        let store = init_store().await;
        let coordinator_state = utils::coordinator_state();
        let keys = coordinator_state.keys.clone();
        let (shared, _request_tx, _events) = utils::init_shared(coordinator_state, store);

        let aggregate = testutils::dataset(4, 3);
        let mut phase = PhaseState::<Encrypting, _>::new(shared, aggregate.clone());
        phase.run().await.unwrap();

        // Safe unwrap: the phase task has run
        let ciphertext = phase.private.ciphertext.take().unwrap();
        assert!(ciphertext.is_valid());
        assert_eq!(ciphertext.context.party, PartyId(0));
        assert_eq!(decrypt(&ciphertext, &keys).unwrap(), aggregate);
    }

    #[tokio::test]
    #[serial]
    async fn test_an_overflowed_aggregate_fails_the_round() {
        let store = init_store().await;
        let (shared, _request_tx, _events) = utils::init_shared(utils::coordinator_state(), store);

        let aggregate = Dataset::from_raw_parts(1, 2, vec![1., f64::INFINITY]);
        let mut phase = PhaseState::<Encrypting, _>::new(shared, aggregate);

        let err = phase.run().await.unwrap_err();
        assert!(matches!(
            err,
            PhaseError::Encrypting(EncryptingError::Validation(_)),
        ));
    }
}
