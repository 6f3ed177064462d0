use tracing::Span;

use crate::{
    settings::{PipelineSettings, PrivacySettings, TrainerSettings},
    state_machine::{
        coordinator::CoordinatorState,
        events::{EventPublisher, EventSubscriber, ModelUpdate, RoundEventRecord},
        phases::{PhaseName, Shared},
        requests::{
            RequestError,
            RequestReceiver,
            RequestSender,
            StartRequest,
            TrainedRequest,
            UploadRequest,
        },
    },
    trainer::EpochMetrics,
};
use silonet_core::{
    model::{ModelArtifact, TaskType},
    testutils,
    validation::{EncryptionMethod, PrivacyLevel, PsiProtocol, SmpcProtocol},
    PartyId,
    ProjectName,
};

pub use crate::storage::tests::utils::{stage_datasets, staged_dataset};

pub fn project() -> ProjectName {
    ProjectName::from("test-project")
}

pub fn pipeline_settings() -> PipelineSettings {
    PipelineSettings {
        capacity: 10,
        timeout: 60,
    }
}

pub fn privacy_settings() -> PrivacySettings {
    PrivacySettings {
        level: PrivacyLevel::Medium,
        encryption: EncryptionMethod::Phe,
        smpc: SmpcProtocol::Aby,
        psi: PsiProtocol::EcdhPsi,
        default_epsilon: 1.0,
        sensitivity: 1.0,
    }
}

pub fn trainer_settings() -> TrainerSettings {
    TrainerSettings { epochs: 5 }
}

pub fn coordinator_state() -> CoordinatorState {
    CoordinatorState::new(
        project(),
        TaskType::FraudDetection,
        pipeline_settings(),
        privacy_settings(),
        trainer_settings(),
    )
}

pub fn round_event(round_id: u64, message: &str) -> RoundEventRecord {
    RoundEventRecord::new(round_id, PhaseName::Idle, message)
}

pub fn init_shared<T>(
    coordinator_state: CoordinatorState,
    store: T,
) -> (Shared<T>, RequestSender, EventSubscriber) {
    let (event_publisher, event_subscriber) = EventPublisher::init(
        coordinator_state.round_id,
        coordinator_state.keys.clone(),
        coordinator_state.round_params.clone(),
        PhaseName::Idle,
        ModelUpdate::Invalidate,
    );

    let (request_rx, request_tx) = RequestReceiver::new();
    (
        Shared::new(coordinator_state, event_publisher, request_rx, store),
        request_tx,
        event_subscriber,
    )
}

pub fn upload_request(party: u32) -> UploadRequest {
    let rows = testutils::dataset(4, 3)
        .iter_rows()
        .map(<[f64]>::to_vec)
        .collect();
    UploadRequest {
        party_id: PartyId(party),
        task: TaskType::FraudDetection,
        settings: testutils::raw_settings(),
        epsilon: None,
        rows,
    }
}

pub fn trained_request(artifact: ModelArtifact) -> TrainedRequest {
    TrainedRequest {
        artifact,
        metrics: vec![
            EpochMetrics {
                epoch: 1,
                loss: 0.35,
                accuracy: 0.81,
            },
            EpochMetrics {
                epoch: 2,
                loss: 0.29,
                accuracy: 0.86,
            },
        ],
    }
}

pub async fn send_upload(request_tx: &RequestSender, party: u32) -> Result<(), RequestError> {
    request_tx
        .request(upload_request(party).into(), Span::none())
        .await
}

pub async fn send_start(request_tx: &RequestSender) -> Result<(), RequestError> {
    request_tx
        .request(StartRequest { epsilon: None }.into(), Span::none())
        .await
}

pub async fn send_trained(
    request_tx: &RequestSender,
    artifact: ModelArtifact,
) -> Result<(), RequestError> {
    request_tx
        .request(trained_request(artifact).into(), Span::none())
        .await
}

/// Produces the timeout error value without waiting for a real deadline.
pub async fn elapsed() -> tokio::time::Elapsed {
    tokio::time::timeout(std::time::Duration::from_millis(0), futures::future::pending::<()>())
        .await
        .unwrap_err()
}
