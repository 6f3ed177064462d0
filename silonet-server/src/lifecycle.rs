//! Model lifecycle operations.
//!
//! The lifecycle manager mutates the persisted model of a project between rounds: it
//! checkpoints and reverts weights, grows the model graph, approximately unlearns data points
//! and rescales per-node weights. Every operation loads the model from storage, applies its
//! change and persists the result, so a failed operation never leaves a half-applied model
//! behind. Operations on the same project are serialized through a per-project lock; a save
//! and a revert can never interleave into a torn read of the checkpoint slot.
//!
//! Retraining goes through the [`ModelTrainer`] boundary. The per-epoch metrics the trainer
//! reports are emitted to the metrics sink and mirrored into the project's event log, both
//! best-effort.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    metric,
    state_machine::{
        events::RoundEventRecord,
        phases::PhaseName,
    },
    storage::{Storage, StorageError},
    trainer::{EpochMetrics, ModelTrainer, TrainingError},
};
use silonet_core::{
    dataset::Dataset,
    model::{ModelArtifact, UnknownNodeError},
    validation::{validate_model_output, ValidationError},
    ProjectName,
};

/// Error that occurs during a lifecycle operation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no model has been trained for the project")]
    NoModel,
    #[error("no checkpoint has been saved for the project")]
    NoCheckpoint,
    #[error(transparent)]
    UnknownNode(#[from] UnknownNodeError),
    #[error("the trained model is invalid: {0}")]
    Validation(#[from] ValidationError),
    #[error("training failed: {0}")]
    Training(#[from] TrainingError),
    #[error("storage request failed: {0}")]
    Storage(#[from] StorageError),
}

/// The per-project locks that serialize lifecycle operations.
#[derive(Clone, Debug, Default)]
struct ProjectLocks(Arc<Mutex<HashMap<ProjectName, Arc<tokio::sync::Mutex<()>>>>>);

impl ProjectLocks {
    fn for_project(&self, project: &ProjectName) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.0.lock().unwrap();
        locks
            .entry(project.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// The lifecycle manager of the persisted models.
#[derive(Debug, Clone)]
pub struct Lifecycle<T, R> {
    /// The store the models and checkpoints are persisted in.
    store: T,
    /// The trainer the retraining passes go through.
    trainer: R,
    /// The number of epochs of a retraining pass.
    epochs: usize,
    locks: ProjectLocks,
}

impl<T, R> Lifecycle<T, R>
where
    T: Storage,
    R: ModelTrainer,
{
    /// Creates a new lifecycle manager.
    pub fn new(store: T, trainer: R, epochs: usize) -> Self {
        Self {
            store,
            trainer,
            epochs,
            locks: ProjectLocks::default(),
        }
    }

    /// Persists the current weights of the project's model.
    ///
    /// A prior checkpoint of the project is overwritten, there is one slot per project.
    ///
    /// # Errors
    /// Fails with [`LifecycleError::NoModel`] if no model has been trained for the project.
    pub async fn save_checkpoint(&mut self, project: &ProjectName) -> Result<(), LifecycleError> {
        let lock = self.locks.for_project(project);
        let _guard = lock.lock().await;

        let model = self.model(project).await?;
        self.store
            .set_checkpoint(project, &model.checkpoint())
            .await?;
        info!("checkpointed the model of project {}", project);
        Ok(())
    }

    /// Replaces the weights of the project's model with the last checkpointed ones.
    ///
    /// The task, the learning rate and the graph of the model are kept as they are.
    ///
    /// # Errors
    /// Fails with [`LifecycleError::NoCheckpoint`] if no checkpoint has been saved for the
    /// project.
    pub async fn revert_to_checkpoint(
        &mut self,
        project: &ProjectName,
    ) -> Result<ModelArtifact, LifecycleError> {
        let lock = self.locks.for_project(project);
        let _guard = lock.lock().await;

        let mut model = self.model(project).await?;
        let checkpoint = self
            .store
            .checkpoint(project)
            .await?
            .ok_or(LifecycleError::NoCheckpoint)?;
        model.restore(checkpoint);
        self.store.set_model(project, &model).await?;
        info!("reverted the model of project {} to its checkpoint", project);
        Ok(model)
    }

    /// Grows the model graph and retrains the model on the given dataset.
    ///
    /// If the caller flags concept drift, the learning rate is decayed before the retraining
    /// pass. The decay is a fixed multiplicative policy, not an adaptive detector.
    pub async fn incremental_update(
        &mut self,
        project: &ProjectName,
        new_nodes: Vec<u32>,
        new_edges: Vec<(u32, u32)>,
        concept_drift: bool,
        dataset: &Dataset,
    ) -> Result<ModelArtifact, LifecycleError> {
        let lock = self.locks.for_project(project);
        let _guard = lock.lock().await;

        let mut model = self.model(project).await?;
        model.add_nodes(new_nodes);
        model.add_edges(new_edges);
        if concept_drift {
            model.decay_learning_rate();
            debug!(
                "decayed the learning rate of project {} to {}",
                project, model.learning_rate,
            );
        }
        self.retrain(project, model, dataset).await
    }

    /// Approximately unlearns the given points and retrains on the reduced dataset.
    ///
    /// The weight adjustment subtracted per forgotten point is an approximation of the point's
    /// training contribution; the retraining pass then runs on the dataset with the rows of
    /// `points_to_remove` dropped.
    pub async fn decremental_update(
        &mut self,
        project: &ProjectName,
        points_to_forget: &[Vec<f64>],
        points_to_remove: &[f64],
        dataset: &Dataset,
    ) -> Result<ModelArtifact, LifecycleError> {
        let lock = self.locks.for_project(project);
        let _guard = lock.lock().await;

        let mut model = self.model(project).await?;
        for point in points_to_forget {
            model.forget_point(point);
        }
        info!(
            "forgot {} points of project {}, dropping {} records",
            points_to_forget.len(),
            project,
            points_to_remove.len(),
        );

        let reduced = dataset.filter_rows(|row| !points_to_remove.contains(&row[0]));
        self.retrain(project, model, &reduced).await
    }

    /// Scales the weight entries of the given nodes by the supplied multipliers.
    ///
    /// # Errors
    /// Fails with [`LifecycleError::UnknownNode`] if any key does not correspond to an
    /// existing model node. The persisted model is unchanged in that case.
    pub async fn adjust_weights(
        &mut self,
        project: &ProjectName,
        weights_by_node: &BTreeMap<u32, f64>,
    ) -> Result<ModelArtifact, LifecycleError> {
        let lock = self.locks.for_project(project);
        let _guard = lock.lock().await;

        let mut model = self.model(project).await?;
        model.adjust_weights(weights_by_node)?;
        self.store.set_model(project, &model).await?;
        info!(
            "adjusted the weights of {} nodes of project {}",
            weights_by_node.len(),
            project,
        );
        Ok(model)
    }

    /// Loads the model of the project.
    async fn model(&mut self, project: &ProjectName) -> Result<ModelArtifact, LifecycleError> {
        self.store
            .model(project)
            .await?
            .ok_or(LifecycleError::NoModel)
    }

    /// Retrains the model through the trainer boundary and persists the artifact.
    async fn retrain(
        &mut self,
        project: &ProjectName,
        model: ModelArtifact,
        dataset: &Dataset,
    ) -> Result<ModelArtifact, LifecycleError> {
        info!(
            "retraining the model of project {} for {} epochs",
            project, self.epochs,
        );
        let (artifact, metrics) = self
            .trainer
            .train(project, model, dataset, self.epochs)
            .await?;
        for tensor in artifact.tensors.values() {
            validate_model_output(tensor)?;
        }

        self.store.set_model(project, &artifact).await?;
        self.record_metrics(project, &metrics).await;
        Ok(artifact)
    }

    /// Emits the per-epoch training metrics and mirrors them into the project's event log.
    ///
    /// Both sinks are best-effort: a failed append is logged, never fatal.
    async fn record_metrics(&mut self, project: &ProjectName, metrics: &[EpochMetrics]) {
        let round_id = match self.store.coordinator_state(project).await {
            Ok(Some(state)) => state.round_id,
            Ok(None) => 0,
            Err(err) => {
                warn!("failed to look up the round id of project {}: {}", project, err);
                0
            }
        };

        for epoch in metrics {
            metric!(
                training: project.as_str(),
                epoch.epoch,
                epoch.loss,
                epoch.accuracy,
            );
            let message = format!(
                "epoch {}: loss {:.4}, accuracy {:.4}",
                epoch.epoch, epoch.loss, epoch.accuracy,
            );
            let record = RoundEventRecord::new(round_id, PhaseName::Idle, message);
            if let Err(err) = self.store.append_round_event(project, &record).await {
                warn!("failed to append round event: {}", err);
            }
        }
    }
}
