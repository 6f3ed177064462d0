//! Model artifacts and their lifecycle arithmetic.
//!
//! A [`ModelArtifact`] is the coordinator side state of a trained model: a task tag, the
//! learning rate, the named weight tensors and the graph bookkeeping for incremental growth.
//! Training itself happens behind the trainer boundary; this module owns the weight arithmetic
//! applied between training calls (structural growth, learning rate decay on concept drift,
//! approximate forgetting and per-node adjustment) and the checkpointing of weights.

use std::collections::{BTreeMap, BTreeSet};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The learning rate of a freshly created model.
pub const INITIAL_LEARNING_RATE: f64 = 0.01;

/// The factor by which the learning rate shrinks when concept drift is flagged.
pub const DRIFT_DECAY: f64 = 0.9;

/// The proportionality factor of the weight adjustment for a forgotten point.
pub const FORGET_FACTOR: f64 = 0.01;

/// The number of epochs of the brief retrain after rows were removed.
pub const RETRAIN_EPOCHS: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("the node {0} does not exist in the model")]
/// The error returned when a weight adjustment addresses a node the model does not have.
pub struct UnknownNodeError(pub u32);

/// The tasks a model can be trained for.
///
/// Each task fixes the layer widths of the initial model. Unknown task tags fail at
/// deserialization, not at training time.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    /// Classification of fraudulent transactions.
    #[display(fmt = "Fraud Detection")]
    #[serde(rename = "Fraud Detection")]
    FraudDetection,

    /// Classification of fabricated articles.
    #[display(fmt = "Fake News Detection")]
    #[serde(rename = "Fake News Detection")]
    FakeNewsDetection,
}

impl TaskType {
    /// The layer widths of the initial model for this task.
    pub fn layer_layout(self) -> &'static [usize] {
        match self {
            TaskType::FraudDetection => &[32, 16, 2],
            TaskType::FakeNewsDetection => &[64, 32, 2],
        }
    }
}

/// A rectangular weight tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Tensor {
    /// Creates a tensor from its shape and row-major weights.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        debug_assert_eq!(rows * cols, data.len());
        Self { rows, cols, data }
    }

    /// Creates a zero initialized tensor of the given shape.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.; rows * cols],
        }
    }

    /// Checks if the weights are consistent with the declared shape.
    ///
    /// Deserialized tensors must pass this before their weights are trusted.
    pub fn is_valid(&self) -> bool {
        self.data.len() == self.rows * self.cols
    }

    /// Gets the number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Gets the number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Gets the shape as `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Gets the weights as a row-major slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Gets the weights as a mutable row-major slice.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    fn scale_column(&mut self, col: usize, factor: f64) {
        for row in 0..self.rows {
            self.data[row * self.cols + col] *= factor;
        }
    }
}

/// A persisted snapshot of a model's weights.
///
/// Created on save, consumed on revert, never mutated in place. One slot per project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The weight tensors by name.
    pub tensors: BTreeMap<String, Tensor>,
}

/// The trained state of a model owned by the lifecycle manager of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// The task the model is trained for.
    pub task: TaskType,
    /// The current learning rate.
    pub learning_rate: f64,
    /// The graph nodes the model embeds.
    pub nodes: BTreeSet<u32>,
    /// The undirected graph edges, stored with the smaller node first.
    pub edges: BTreeSet<(u32, u32)>,
    /// The weight tensors by name.
    pub tensors: BTreeMap<String, Tensor>,
}

impl ModelArtifact {
    /// Creates the initial model for a task.
    ///
    /// One zero initialized kernel is laid out per layer of the task's [`layer_layout()`],
    /// starting from the feature width `columns` of the prepared dataset.
    ///
    /// [`layer_layout()`]: TaskType::layer_layout
    pub fn new(task: TaskType, columns: usize) -> Self {
        let mut tensors = BTreeMap::new();
        let mut input = columns;
        for (layer, width) in task.layer_layout().iter().enumerate() {
            tensors.insert(format!("dense_{}", layer), Tensor::zeros(input, *width));
            input = *width;
        }
        Self {
            task,
            learning_rate: INITIAL_LEARNING_RATE,
            nodes: BTreeSet::new(),
            edges: BTreeSet::new(),
            tensors,
        }
    }

    /// Adds the given nodes to the model graph.
    pub fn add_nodes(&mut self, new_nodes: impl IntoIterator<Item = u32>) {
        self.nodes.extend(new_nodes);
    }

    /// Adds the given edges to the model graph.
    ///
    /// Endpoints missing from the node set are inserted along the way.
    pub fn add_edges(&mut self, new_edges: impl IntoIterator<Item = (u32, u32)>) {
        for (fst, snd) in new_edges {
            self.nodes.insert(fst);
            self.nodes.insert(snd);
            let edge = if fst <= snd { (fst, snd) } else { (snd, fst) };
            self.edges.insert(edge);
        }
    }

    /// Shrinks the learning rate by [`DRIFT_DECAY`].
    ///
    /// This is a fixed multiplicative decay policy applied when the caller flags concept
    /// drift, not an adaptive detector.
    pub fn decay_learning_rate(&mut self) {
        self.learning_rate *= DRIFT_DECAY;
    }

    /// Subtracts the adjustment for one forgotten point from every weight tensor.
    ///
    /// The adjustment is the point's feature vector scaled by [`FORGET_FACTOR`], cycled over
    /// the weights of each tensor. This approximates unlearning of the point; it is not exact
    /// unlearning and carries no cryptographic guarantee.
    pub fn forget_point(&mut self, point: &[f64]) {
        if point.is_empty() {
            return;
        }
        for tensor in self.tensors.values_mut() {
            for (idx, weight) in tensor.as_mut_slice().iter_mut().enumerate() {
                *weight -= FORGET_FACTOR * point[idx % point.len()];
            }
        }
    }

    /// Scales the weight entries of the given nodes by the supplied multipliers.
    ///
    /// A node's weight entries are the column it occupies in each tensor wide enough to hold
    /// it.
    ///
    /// # Errors
    /// Fails with an [`UnknownNodeError`] if any key does not correspond to an existing model
    /// node. No tensor is modified in that case.
    pub fn adjust_weights(
        &mut self,
        weights_by_node: &BTreeMap<u32, f64>,
    ) -> Result<(), UnknownNodeError> {
        // reject wholesale before touching any tensor
        if let Some(node) = weights_by_node
            .keys()
            .find(|node| !self.nodes.contains(node))
        {
            return Err(UnknownNodeError(*node));
        }

        for (node, multiplier) in weights_by_node {
            for tensor in self.tensors.values_mut() {
                if (*node as usize) < tensor.cols {
                    tensor.scale_column(*node as usize, *multiplier);
                }
            }
        }
        Ok(())
    }

    /// Snapshots the current weights.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            tensors: self.tensors.clone(),
        }
    }

    /// Replaces the current weights with the checkpointed ones.
    ///
    /// The task, the learning rate and the graph are kept as they are.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.tensors = checkpoint.tensors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_spellings() {
        assert_eq!(TaskType::FraudDetection.to_string(), "Fraud Detection");
        assert_eq!(
            TaskType::FakeNewsDetection.to_string(),
            "Fake News Detection",
        );
    }

    #[test]
    fn test_layer_layouts() {
        assert_eq!(TaskType::FraudDetection.layer_layout(), &[32, 16, 2]);
        assert_eq!(TaskType::FakeNewsDetection.layer_layout(), &[64, 32, 2]);
    }

    #[test]
    fn test_initial_model() {
        let model = ModelArtifact::new(TaskType::FraudDetection, 5);
        assert_eq!(model.learning_rate, INITIAL_LEARNING_RATE);
        assert!(model.nodes.is_empty());
        assert_eq!(model.tensors.len(), 3);
        assert_eq!(model.tensors["dense_0"].shape(), (5, 32));
        assert_eq!(model.tensors["dense_1"].shape(), (32, 16));
        assert_eq!(model.tensors["dense_2"].shape(), (16, 2));
        assert!(model.tensors.values().all(Tensor::is_valid));
    }

    #[test]
    fn test_add_edges_inserts_endpoints() {
        let mut model = ModelArtifact::new(TaskType::FraudDetection, 2);
        model.add_nodes(vec![0]);
        model.add_edges(vec![(2, 1), (1, 2), (0, 3)]);
        assert_eq!(model.nodes, vec![0, 1, 2, 3].into_iter().collect());
        assert_eq!(model.edges, vec![(0, 3), (1, 2)].into_iter().collect());
    }

    #[test]
    fn test_learning_rate_decay() {
        let mut model = ModelArtifact::new(TaskType::FraudDetection, 2);
        model.decay_learning_rate();
        assert_eq!(model.learning_rate, INITIAL_LEARNING_RATE * DRIFT_DECAY);
    }

    #[test]
    fn test_forget_point_cycles_the_adjustment() {
        let mut model = ModelArtifact::new(TaskType::FraudDetection, 2);
        model.tensors = vec![("w".to_string(), Tensor::zeros(1, 3))]
            .into_iter()
            .collect();
        model.forget_point(&[1., 2.]);
        assert_eq!(model.tensors["w"].as_slice(), &[-0.01, -0.02, -0.01]);
        model.forget_point(&[]);
        assert_eq!(model.tensors["w"].as_slice(), &[-0.01, -0.02, -0.01]);
    }

    #[test]
    fn test_adjust_weights_scales_the_node_column() {
        let mut model = ModelArtifact::new(TaskType::FraudDetection, 2);
        model.add_nodes(vec![1, 40]);
        model.tensors = vec![("w".to_string(), Tensor::new(2, 3, vec![1.; 6]))]
            .into_iter()
            .collect();

        let weights = vec![(1, 2.)].into_iter().collect();
        model.adjust_weights(&weights).unwrap();
        assert_eq!(model.tensors["w"].as_slice(), &[1., 2., 1., 1., 2., 1.]);

        // a node beyond every tensor width leaves the weights alone
        let weights = vec![(40, 3.)].into_iter().collect();
        model.adjust_weights(&weights).unwrap();
        assert_eq!(model.tensors["w"].as_slice(), &[1., 2., 1., 1., 2., 1.]);
    }

    #[test]
    fn test_adjust_weights_rejects_unknown_nodes_wholesale() {
        let mut model = ModelArtifact::new(TaskType::FraudDetection, 2);
        model.add_nodes(vec![0]);
        model.tensors = vec![("w".to_string(), Tensor::new(1, 2, vec![1., 1.]))]
            .into_iter()
            .collect();

        let weights = vec![(0, 2.), (7, 2.)].into_iter().collect();
        assert_eq!(model.adjust_weights(&weights), Err(UnknownNodeError(7)));
        assert_eq!(model.tensors["w"].as_slice(), &[1., 1.]);
    }

    #[test]
    fn test_checkpoint_restore_is_exact() {
        let mut model = ModelArtifact::new(TaskType::FakeNewsDetection, 4);
        model.forget_point(&[0.25, -1.5, 3., 0.125]);
        let checkpoint = model.checkpoint();
        let saved = model.tensors.clone();

        model.forget_point(&[1., 2., 3., 4.]);
        model.decay_learning_rate();
        assert_ne!(model.tensors, saved);

        model.restore(checkpoint);
        assert_eq!(model.tensors, saved);
        // only the weights are reverted
        assert_eq!(model.learning_rate, INITIAL_LEARNING_RATE * DRIFT_DECAY);
    }
}
