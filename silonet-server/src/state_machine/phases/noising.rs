use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::{
    state_machine::{
        phases::{Phase, PhaseError, PhaseName, PhaseState, Ready, Shared},
        StateMachine,
    },
    storage::Storage,
};
use silonet_core::{
    aggregate::{Aggregation, AggregationError},
    cipher::{Ciphertext, Encryptor},
    noise::{NoiseError, Noiser},
    PartyId,
};

/// Error that occurs during the noising phase.
#[derive(Error, Debug)]
pub enum NoisingError {
    #[error("sampling the noise failed: {0}")]
    Noise(#[from] NoiseError),
    #[error("folding the noise into the aggregate failed: {0}")]
    Aggregation(#[from] AggregationError),
}

/// The noising state.
///
/// A share of Laplace noise matching the round's privacy budget is folded into the encrypted
/// aggregate. The aggregate is only ever decrypted with its noise share already in place.
#[derive(Debug)]
pub struct Noising {
    /// The aggregate under the round key.
    aggregate: Ciphertext,
    /// The aggregate with its noise share folded in.
    noised: Option<Ciphertext>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Noising, T>
where
    T: Storage,
{
    const NAME: PhaseName = PhaseName::Noising;

    async fn run(&mut self) -> Result<(), PhaseError> {
        let context = &self.private.aggregate.context;
        let (rows, cols, suite) = (context.rows, context.cols, context.suite);
        let epsilon = self.shared.state.round_params.epsilon;
        info!(
            "noising the {}x{} aggregate with privacy budget {}",
            rows, cols, epsilon,
        );

        let noise = Noiser::new(self.shared.state.privacy.sensitivity)
            .sample_noise(rows, cols, epsilon)
            .map_err(NoisingError::Noise)?;
        let noise = Encryptor::new(suite).encrypt(
            &noise,
            PartyId(0),
            &self.shared.state.round_params.pk,
        );

        let aggregate = self.private.aggregate.clone();
        let mut aggregation = Aggregation::new(rows, cols, suite);
        aggregation
            .validate_aggregation(&aggregate)
            .map_err(NoisingError::Aggregation)?;
        aggregation.aggregate(aggregate);
        aggregation
            .validate_aggregation(&noise)
            .map_err(NoisingError::Aggregation)?;
        aggregation.aggregate(noise);

        self.private.noised = Some(aggregation.into());
        Ok(())
    }

    fn next(mut self) -> Option<StateMachine<T>> {
        // Safe unwrap: PhaseState::<Noising>::run always sets Some(noised)
        let noised = self.private.noised.take().unwrap();
        Some(PhaseState::<Ready, _>::new(self.shared, noised).into())
    }
}

impl<T> PhaseState<Noising, T> {
    /// Creates a new noising state.
    pub fn new(shared: Shared<T>, aggregate: Ciphertext) -> Self {
        Self {
            private: Noising {
                aggregate,
                noised: None,
            },
            shared,
        }
    }
}
