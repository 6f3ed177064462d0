//! Coordinator state and round parameter types.

use serde::{Deserialize, Serialize};

use crate::settings::{PipelineSettings, PrivacySettings, TrainerSettings};
use silonet_core::{
    cipher::CipherSuite,
    common::{RoundParameters, RoundSeed},
    crypto::{ByteObject, SealingKeyPair},
    model::TaskType,
    validation::PrivacySettings as PrivacyConfig,
    ProjectName,
};

/// The round pipeline parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineParameters {
    /// The maximal number of ciphertexts a round folds, the noise share included.
    pub capacity: usize,
    /// The amount of time (in seconds) the coordinator waits for a trained model.
    pub timeout: u64,
}

impl From<PipelineSettings> for PipelineParameters {
    fn from(pipeline: PipelineSettings) -> Self {
        let PipelineSettings { capacity, timeout } = pipeline;
        Self { capacity, timeout }
    }
}

/// The privacy parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrivacyParameters {
    /// The protocol settings under which a round runs unless its parties agree otherwise.
    pub settings: PrivacyConfig,
    /// The privacy budget of a round for which no party declared one.
    pub default_epsilon: f64,
    /// The query sensitivity of the noise added to a released aggregate.
    pub sensitivity: f64,
}

impl From<PrivacySettings> for PrivacyParameters {
    fn from(privacy: PrivacySettings) -> Self {
        Self {
            settings: privacy.into(),
            default_epsilon: privacy.default_epsilon,
            sensitivity: privacy.sensitivity,
        }
    }
}

/// The trainer parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainerParameters {
    /// The number of epochs of a retraining pass.
    pub epochs: usize,
}

impl From<TrainerSettings> for TrainerParameters {
    fn from(trainer: TrainerSettings) -> Self {
        let TrainerSettings { epochs } = trainer;
        Self { epochs }
    }
}

/// The coordinator state of one project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorState {
    /// The project this state belongs to.
    pub project: ProjectName,
    /// The credentials of the coordinator.
    pub keys: SealingKeyPair,
    /// Internal ID used to identify a round
    pub round_id: u64,
    /// The round parameters.
    pub round_params: RoundParameters,
    /// The pipeline parameters.
    pub pipeline: PipelineParameters,
    /// The privacy parameters.
    pub privacy: PrivacyParameters,
    /// The trainer parameters.
    pub trainer: TrainerParameters,
}

impl CoordinatorState {
    pub fn new(
        project: ProjectName,
        task: TaskType,
        pipeline_settings: PipelineSettings,
        privacy_settings: PrivacySettings,
        trainer_settings: TrainerSettings,
    ) -> Self {
        let keys = SealingKeyPair::generate();
        let privacy = PrivacyParameters::from(privacy_settings);
        let round_params = RoundParameters {
            pk: keys.public,
            seed: RoundSeed::zeroed(),
            epsilon: privacy.default_epsilon,
            settings: privacy.settings,
            task,
        };
        let round_id = 0;
        Self {
            project,
            keys,
            round_id,
            round_params,
            pipeline: pipeline_settings.into(),
            privacy,
            trainer: trainer_settings.into(),
        }
    }

    /// The cipher suite under which the datasets of a round are encrypted.
    pub fn suite(&self) -> CipherSuite {
        CipherSuite {
            capacity: self.pipeline.capacity,
        }
    }
}
