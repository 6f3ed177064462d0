use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::{
    state_machine::{
        phases::{Encrypting, Phase, PhaseError, PhaseName, PhaseState, Shared},
        StateMachine,
    },
    storage::Storage,
};
use silonet_core::{
    aggregate::{sum, AggregationError},
    dataset::Dataset,
    PartyId,
};

/// Error that occurs during the aggregating phase.
#[derive(Error, Debug)]
pub enum AggregatingError {
    #[error("summing the datasets failed: {0}")]
    Aggregation(#[from] AggregationError),
}

/// The aggregating state.
///
/// The aligned views are summed element-wise without any party's view being exposed on its own.
#[derive(Debug)]
pub struct Aggregating {
    /// The aligned views, one per party.
    datasets: Vec<(PartyId, Dataset)>,
    /// The element-wise sum of the views.
    aggregate: Option<Dataset>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Aggregating, T>
where
    T: Storage,
{
    const NAME: PhaseName = PhaseName::Aggregating;

    async fn run(&mut self) -> Result<(), PhaseError> {
        info!("aggregating {} datasets", self.private.datasets.len());
        let aggregate = if self.private.datasets.len() == 1 {
            // a lone dataset is its own sum
            self.private.datasets.swap_remove(0).1
        } else {
            sum(
                &self.private.datasets,
                &self.shared.state.keys,
                self.shared.state.suite(),
            )
            .map_err(AggregatingError::Aggregation)?
        };

        self.private.aggregate = Some(aggregate);
        Ok(())
    }

    fn next(mut self) -> Option<StateMachine<T>> {
        // Safe unwrap: PhaseState::<Aggregating>::run always sets Some(aggregate)
        let aggregate = self.private.aggregate.take().unwrap();
        Some(PhaseState::<Encrypting, _>::new(self.shared, aggregate).into())
    }
}

impl<T> PhaseState<Aggregating, T> {
    /// Creates a new aggregating state.
    pub fn new(shared: Shared<T>, datasets: Vec<(PartyId, Dataset)>) -> Self {
        Self {
            private: Aggregating {
                datasets,
                aggregate: None,
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
    use silonet_core::testutils;

    #[tokio::test]
    #[serial]
    async fn test_sums_the_views_elementwise() {
        let store = init_store().await;
        let (shared, _request_tx, _events) = utils::init_shared(utils::coordinator_state(), store);

        let dataset = testutils::dataset(4, 3);
        let doubled = Dataset::from_raw_parts(
            4,
            3,
            dataset.as_slice().iter().map(|value| value * 2.).collect(),
        );
        let datasets = vec![(PartyId(0), dataset.clone()), (PartyId(1), dataset)];

        let mut phase = PhaseState::<Aggregating, _>::new(shared, datasets);
        phase.run().await.unwrap();

        assert_eq!(phase.private.aggregate, Some(doubled));
    }

    #[tokio::test]
    #[serial]
    async fn test_a_lone_dataset_is_its_own_sum() {
        let store = init_store().await;
        let (shared, _request_tx, _events) = utils::init_shared(utils::coordinator_state(), store);

        let dataset = testutils::dataset(4, 3);
        let datasets = vec![(PartyId(7), dataset.clone())];

        let mut phase = PhaseState::<Aggregating, _>::new(shared, datasets);
        phase.run().await.unwrap();

        assert_eq!(phase.private.aggregate, Some(dataset));
    }

    #[tokio::test]
    #[serial]
    async fn test_mismatching_shapes_fail_the_round() {
        let store = init_store().await;
        let (shared, _request_tx, _events) = utils::init_shared(utils::coordinator_state(), store);

        let datasets = vec![
            (PartyId(0), testutils::dataset(4, 3)),
            (PartyId(1), testutils::dataset(4, 2)),
        ];

        let mut phase = PhaseState::<Aggregating, _>::new(shared, datasets);
        let err = phase.run().await.unwrap_err();
        assert!(matches!(
            err,
            PhaseError::Aggregating(AggregatingError::Aggregation(_)),
        ));
    }
}
