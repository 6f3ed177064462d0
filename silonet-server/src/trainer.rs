//! The boundary between the coordinator and the model trainer.
//!
//! The trainer itself is an opaque collaborator: it consumes a prepared dataset together with
//! the task it was assembled for and reports back a trained [`ModelArtifact`] and its per-epoch
//! metrics. The coordinator never looks inside the training step, it only validates the
//! artifact that comes back.
//!
//! Within a round the hand-off runs over the state machine: the [`Ready`] phase publishes a
//! [`TrainingPayload`] and the [`HandedOff`] phase waits for the trained artifact to be
//! reported. Outside of rounds, the [lifecycle] retrains through the [`ModelTrainer`] trait;
//! the [`ChannelTrainer`] implementation forwards those jobs to the remote trainer serving the
//! deployment.
//!
//! [`Ready`]: crate::state_machine::phases::Ready
//! [`HandedOff`]: crate::state_machine::phases::HandedOff
//! [lifecycle]: crate::lifecycle

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use silonet_core::{
    dataset::Dataset,
    model::{ModelArtifact, TaskType},
    ProjectName,
};

/// The dataset a round prepared for training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPayload {
    /// The project the payload belongs to.
    pub project: ProjectName,
    /// The task the payload was prepared for.
    pub task: TaskType,
    /// The model to continue from, `None` on the first round of a project.
    pub model: Option<ModelArtifact>,
    /// The aligned, aggregated and noised dataset.
    pub dataset: Dataset,
    /// The number of epochs to train for.
    pub epochs: usize,
}

/// The metrics of one training epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The number of the epoch, starting at `1`.
    pub epoch: u64,
    /// The training loss at the end of the epoch.
    pub loss: f64,
    /// The training accuracy at the end of the epoch.
    pub accuracy: f64,
}

/// A trained model artifact together with its per-epoch metrics.
pub type TrainedModel = (ModelArtifact, Vec<EpochMetrics>);

/// Error that occurs while training through the trainer boundary.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no trainer is serving the deployment")]
    TrainerGone,
}

/// The model trainer boundary.
#[async_trait]
pub trait ModelTrainer {
    /// Trains the model on the prepared dataset for the given number of epochs.
    ///
    /// This is a potentially slow call. Dropping the returned future cancels the job: no
    /// partial result is observed by the caller.
    async fn train(
        &mut self,
        project: &ProjectName,
        model: ModelArtifact,
        dataset: &Dataset,
        epochs: usize,
    ) -> Result<TrainedModel, TrainingError>;
}

/// A training job forwarded to the trainer serving the deployment.
#[derive(Debug)]
pub struct TrainingJob {
    /// The project the model belongs to.
    pub project: ProjectName,
    /// The model to continue from.
    pub model: ModelArtifact,
    /// The dataset to train on.
    pub dataset: Dataset,
    /// The number of epochs to train for.
    pub epochs: usize,
    /// The reply half over which the trained model is expected.
    pub reply: oneshot::Sender<TrainedModel>,
}

/// A [`ModelTrainer`] that forwards its jobs over a channel to the trainer serving the
/// deployment.
///
/// The serving side consumes the receiver half returned by [`new()`]: it picks a job up,
/// trains and resolves the job over its reply channel.
///
/// [`new()`]: ChannelTrainer::new
#[derive(Debug, Clone)]
pub struct ChannelTrainer(mpsc::UnboundedSender<TrainingJob>);

impl ChannelTrainer {
    /// Creates a new trainer handle and the receiver half its jobs arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TrainingJob>) {
        let (jobs, job_rx) = mpsc::unbounded_channel::<TrainingJob>();
        (Self(jobs), job_rx)
    }
}

#[async_trait]
impl ModelTrainer for ChannelTrainer {
    async fn train(
        &mut self,
        project: &ProjectName,
        model: ModelArtifact,
        dataset: &Dataset,
        epochs: usize,
    ) -> Result<TrainedModel, TrainingError> {
        let (reply, response) = oneshot::channel::<TrainedModel>();
        let job = TrainingJob {
            project: project.clone(),
            model,
            dataset: dataset.clone(),
            epochs,
            reply,
        };
        self.0.send(job).map_err(|_| TrainingError::TrainerGone)?;

        debug!("waiting for the trained model of project {}", project);
        response.await.map_err(|_| TrainingError::TrainerGone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silonet_core::testutils;

    #[tokio::test]
    async fn test_jobs_resolve_over_the_reply_channel() {
        let (mut trainer, mut job_rx) = ChannelTrainer::new();

        let serving_side = tokio::spawn(async move {
            let job = job_rx.recv().await.unwrap();
            assert_eq!(job.project, ProjectName::from("test-project"));
            assert_eq!(job.epochs, 3);

            let mut artifact = job.model;
            artifact.decay_learning_rate();
            let metrics = vec![EpochMetrics {
                epoch: 1,
                loss: 0.4,
                accuracy: 0.8,
            }];
            job.reply.send((artifact, metrics)).unwrap();
        });

        let model = testutils::model(TaskType::FraudDetection);
        let dataset = testutils::dataset(4, 3);
        let (artifact, metrics) = trainer
            .train(&ProjectName::from("test-project"), model.clone(), &dataset, 3)
            .await
            .unwrap();
        serving_side.await.unwrap();

        assert_eq!(artifact.learning_rate, model.learning_rate * 0.9);
        assert_eq!(metrics.len(), 1);
    }

    #[tokio::test]
    async fn test_training_fails_without_a_serving_side() {
        let (mut trainer, job_rx) = ChannelTrainer::new();
        drop(job_rx);

        let model = testutils::model(TaskType::FraudDetection);
        let dataset = testutils::dataset(4, 3);
        let err = trainer
            .train(&ProjectName::from("test-project"), model, &dataset, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, TrainingError::TrainerGone));
    }
}
