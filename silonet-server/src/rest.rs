//! The HTTP API of the coordinator.
//!
//! Parties drive their pipelines through the POST endpoints, the remote trainer serves the
//! deployment through `GET /payload` and `POST /trained`, and operators steer the model
//! lifecycle through the update endpoints. Requests and responses are bincode encoded.

use std::{
    collections::{BTreeMap, HashMap},
    convert::Infallible,
    sync::Arc,
};
#[cfg(feature = "tls")]
use std::path::PathBuf;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc::UnboundedReceiver, Mutex};
use tracing::{error, warn, Span};
use warp::{
    http::{Response, StatusCode},
    reply::Reply,
    Filter,
};
#[cfg(feature = "tls")]
use warp::{Server, TlsServer};

use crate::{
    lifecycle::Lifecycle,
    services::PipelineRegistry,
    settings::ApiSettings,
    state_machine::{
        events::PayloadUpdate,
        requests::{StartRequest, TrainedRequest, UploadRequest},
    },
    storage::{ProjectStorage, Storage},
    trainer::{EpochMetrics, ModelTrainer, TrainingJob, TrainingPayload},
};
use silonet_core::{
    dataset::Dataset,
    model::{ModelArtifact, TaskType},
    validation::RawPrivacySettings,
    PartyId, ProjectName,
};

/// The body of an upload request.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadBody {
    /// The project the dataset belongs to.
    pub project: ProjectName,
    /// The id of the uploading party.
    pub party_id: PartyId,
    /// The task the dataset was assembled for.
    pub task: TaskType,
    /// The privacy settings declared by the party.
    pub settings: RawPrivacySettings,
    /// The privacy budget the party wants spent on this round, if any.
    pub epsilon: Option<f64>,
    /// The rows of the dataset, record ids in the first column.
    pub rows: Vec<Vec<f64>>,
}

/// The body of a start request.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartBody {
    /// The project whose round is started.
    pub project: ProjectName,
    /// The privacy budget override for this round, if any.
    pub epsilon: Option<f64>,
}

/// The body of an incremental update request.
#[derive(Debug, Serialize, Deserialize)]
pub struct IncrementalBody {
    /// The project whose model is updated.
    pub project: ProjectName,
    /// The nodes to add to the model graph.
    pub new_nodes: Vec<u32>,
    /// The edges to add to the model graph.
    pub new_edges: Vec<(u32, u32)>,
    /// Whether the data distribution shifted and the learning rate is rescaled.
    pub concept_drift: bool,
}

/// The body of a decremental update request.
#[derive(Debug, Serialize, Deserialize)]
pub struct DecrementalBody {
    /// The project whose model is updated.
    pub project: ProjectName,
    /// The rows whose influence is unlearned.
    pub points_to_forget: Vec<Vec<f64>>,
    /// The record ids to drop from the model graph.
    pub points_to_remove: Vec<f64>,
}

/// The body of a weight adjustment request.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdjustBody {
    /// The project whose model is adjusted.
    pub project: ProjectName,
    /// The multipliers to apply, keyed by node id.
    pub multipliers: BTreeMap<u32, f64>,
}

/// The body of a checkpoint or revert request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectBody {
    /// The project the request refers to.
    pub project: ProjectName,
}

/// The body of a trained model report.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedBody {
    /// The model trained on the served payload.
    pub artifact: ModelArtifact,
    /// The per-epoch training metrics.
    pub metrics: Vec<EpochMetrics>,
}

/// The outcome reported for a POST request.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Whether the request was applied.
    pub success: bool,
    /// A short description of the outcome.
    pub message: String,
}

/// The pending training jobs of the lifecycle manager, keyed by project.
///
/// The lifecycle manager retrains through a [`ChannelTrainer`]; [`forward_jobs`] posts the
/// jobs coming out of its channel onto this board so that the remote trainer picks them up
/// through `GET /payload` and resolves them through `POST /trained`.
///
/// [`ChannelTrainer`]: crate::trainer::ChannelTrainer
#[derive(Debug, Clone)]
pub struct JobBoard(Arc<Mutex<HashMap<ProjectName, TrainingJob>>>);

impl Default for JobBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBoard {
    /// Creates a board without pending jobs.
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(HashMap::new())))
    }

    /// Posts a job, replacing a pending job of the same project.
    async fn post(&self, job: TrainingJob) {
        if let Some(stale) = self.0.lock().await.insert(job.project.clone(), job) {
            warn!("dropping a stale training job of project {}", stale.project);
        }
    }

    /// Returns the payload the pending job of the project asks to be trained on.
    async fn payload(&self, project: &ProjectName) -> Option<TrainingPayload> {
        self.0
            .lock()
            .await
            .get(project)
            .map(|job| TrainingPayload {
                project: job.project.clone(),
                task: job.model.task,
                model: Some(job.model.clone()),
                dataset: job.dataset.clone(),
                epochs: job.epochs,
            })
    }

    /// Takes the pending job of the project off the board.
    async fn take(&self, project: &ProjectName) -> Option<TrainingJob> {
        self.0.lock().await.remove(project)
    }
}

/// Posts every job the lifecycle manager hands to its trainer channel onto the board.
pub async fn forward_jobs(jobs: JobBoard, mut job_rx: UnboundedReceiver<TrainingJob>) {
    while let Some(job) = job_rx.recv().await {
        jobs.post(job).await;
    }
}

/// Starts a HTTP server at the given address, listening to POST requests that drive the
/// pipelines and the model lifecycle and to GET requests for round logs and payloads.
///
/// * `api_settings`: address of the server and optional certificate and key for TLS server
///   authentication.
/// * `registry`: registry of the running per-project pipelines.
/// * `lifecycle`: manager applying updates to the persisted models.
/// * `jobs`: board of the pending retraining jobs.
/// * `store`: storage the round event logs are read from.
///
/// # Errors
/// Fails if the TLS settings are invalid.
pub async fn serve<T, R>(
    api_settings: ApiSettings,
    registry: Arc<PipelineRegistry<T>>,
    lifecycle: Lifecycle<T, R>,
    jobs: JobBoard,
    store: T,
) -> Result<(), RestError>
where
    T: Storage,
    R: ModelTrainer + Clone + Send + Sync + 'static,
{
    let upload = warp::path!("upload")
        .and(warp::post())
        .and(body::<UploadBody>())
        .and(with_registry(registry.clone()))
        .and_then(handle_upload);

    let start = warp::path!("start")
        .and(warp::post())
        .and(body::<StartBody>())
        .and(with_registry(registry.clone()))
        .and_then(handle_start);

    let incremental = warp::path!("incremental")
        .and(warp::post())
        .and(body::<IncrementalBody>())
        .and(with_lifecycle(lifecycle.clone()))
        .and(with_registry(registry.clone()))
        .and_then(handle_incremental);

    let decremental = warp::path!("decremental")
        .and(warp::post())
        .and(body::<DecrementalBody>())
        .and(with_lifecycle(lifecycle.clone()))
        .and(with_registry(registry.clone()))
        .and_then(handle_decremental);

    let adjust = warp::path!("adjust")
        .and(warp::post())
        .and(body::<AdjustBody>())
        .and(with_lifecycle(lifecycle.clone()))
        .and_then(handle_adjust);

    let checkpoint = warp::path!("checkpoint")
        .and(warp::post())
        .and(body::<ProjectBody>())
        .and(with_lifecycle(lifecycle.clone()))
        .and_then(handle_checkpoint);

    let revert = warp::path!("revert")
        .and(warp::post())
        .and(body::<ProjectBody>())
        .and(with_lifecycle(lifecycle))
        .and_then(handle_revert);

    let logs = warp::path!("logs" / String)
        .and(warp::get())
        .and(with_store(store))
        .and_then(handle_logs);

    let payload = warp::path!("payload" / String)
        .and(warp::get())
        .and(with_jobs(jobs.clone()))
        .and(with_registry(registry.clone()))
        .and_then(handle_payload);

    let trained = warp::path!("trained" / String)
        .and(warp::post())
        .and(body::<TrainedBody>())
        .and(with_jobs(jobs))
        .and(with_registry(registry))
        .and_then(handle_trained);

    let routes = upload
        .or(start)
        .or(incremental)
        .or(decremental)
        .or(adjust)
        .or(checkpoint)
        .or(revert)
        .or(logs)
        .or(payload)
        .or(trained)
        .recover(handle_reject)
        .with(warp::log("http"));

    #[cfg(not(feature = "tls"))]
    return run_http(routes, api_settings)
        .await
        .map_err(RestError::from);
    #[cfg(feature = "tls")]
    return run_https(routes, api_settings).await;
}

/// Handles and responds to a dataset upload.
async fn handle_upload<T: Storage>(
    body: UploadBody,
    registry: Arc<PipelineRegistry<T>>,
) -> Result<impl warp::Reply, Infallible> {
    let UploadBody {
        project,
        party_id,
        task,
        settings,
        epsilon,
        rows,
    } = body;

    let handle = match registry.handle_or_serve(project, task).await {
        Ok(handle) => handle,
        Err(err) => {
            error!("failed to spawn the pipeline: {}", err);
            return Ok(status_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                err.to_string(),
            ));
        }
    };

    let request = UploadRequest {
        party_id,
        task,
        settings,
        epsilon,
        rows,
    };
    Ok(
        match handle
            .request_tx
            .request(request.into(), Span::current())
            .await
        {
            Ok(()) => status_reply(StatusCode::OK, true, "dataset staged".into()),
            Err(err) => status_reply(StatusCode::BAD_REQUEST, false, err.to_string()),
        },
    )
}

/// Handles and responds to a round start request.
async fn handle_start<T: Storage>(
    body: StartBody,
    registry: Arc<PipelineRegistry<T>>,
) -> Result<impl warp::Reply, Infallible> {
    let handle = match registry.handle(&body.project).await {
        Some(handle) => handle,
        None => {
            return Ok(status_reply(
                StatusCode::NOT_FOUND,
                false,
                "no pipeline is serving the project".into(),
            ))
        }
    };

    let request = StartRequest {
        epsilon: body.epsilon,
    };
    Ok(
        match handle
            .request_tx
            .request(request.into(), Span::current())
            .await
        {
            Ok(()) => status_reply(StatusCode::OK, true, "round started".into()),
            Err(err) => status_reply(StatusCode::BAD_REQUEST, false, err.to_string()),
        },
    )
}

/// Handles and responds to an incremental model update.
async fn handle_incremental<T, R>(
    body: IncrementalBody,
    mut lifecycle: Lifecycle<T, R>,
    registry: Arc<PipelineRegistry<T>>,
) -> Result<impl warp::Reply, Infallible>
where
    T: Storage,
    R: ModelTrainer + Send,
{
    let dataset = match latest_dataset(&registry, &body.project).await {
        Ok(dataset) => dataset,
        Err(reply) => return Ok(reply),
    };

    Ok(
        match lifecycle
            .incremental_update(
                &body.project,
                body.new_nodes,
                body.new_edges,
                body.concept_drift,
                &dataset,
            )
            .await
        {
            Ok(_) => status_reply(StatusCode::OK, true, "incremental update applied".into()),
            Err(err) => status_reply(StatusCode::BAD_REQUEST, false, err.to_string()),
        },
    )
}

/// Handles and responds to a decremental model update.
async fn handle_decremental<T, R>(
    body: DecrementalBody,
    mut lifecycle: Lifecycle<T, R>,
    registry: Arc<PipelineRegistry<T>>,
) -> Result<impl warp::Reply, Infallible>
where
    T: Storage,
    R: ModelTrainer + Send,
{
    let dataset = match latest_dataset(&registry, &body.project).await {
        Ok(dataset) => dataset,
        Err(reply) => return Ok(reply),
    };

    Ok(
        match lifecycle
            .decremental_update(
                &body.project,
                &body.points_to_forget,
                &body.points_to_remove,
                &dataset,
            )
            .await
        {
            Ok(_) => status_reply(StatusCode::OK, true, "decremental update applied".into()),
            Err(err) => status_reply(StatusCode::BAD_REQUEST, false, err.to_string()),
        },
    )
}

/// Handles and responds to a weight adjustment.
async fn handle_adjust<T, R>(
    body: AdjustBody,
    mut lifecycle: Lifecycle<T, R>,
) -> Result<impl warp::Reply, Infallible>
where
    T: Storage,
    R: ModelTrainer + Send,
{
    Ok(
        match lifecycle
            .adjust_weights(&body.project, &body.multipliers)
            .await
        {
            Ok(_) => status_reply(StatusCode::OK, true, "weights adjusted".into()),
            Err(err) => status_reply(StatusCode::BAD_REQUEST, false, err.to_string()),
        },
    )
}

/// Handles and responds to a checkpoint request.
async fn handle_checkpoint<T, R>(
    body: ProjectBody,
    mut lifecycle: Lifecycle<T, R>,
) -> Result<impl warp::Reply, Infallible>
where
    T: Storage,
    R: ModelTrainer + Send,
{
    Ok(match lifecycle.save_checkpoint(&body.project).await {
        Ok(()) => status_reply(StatusCode::OK, true, "checkpoint saved".into()),
        Err(err) => status_reply(StatusCode::BAD_REQUEST, false, err.to_string()),
    })
}

/// Handles and responds to a revert request.
async fn handle_revert<T, R>(
    body: ProjectBody,
    mut lifecycle: Lifecycle<T, R>,
) -> Result<impl warp::Reply, Infallible>
where
    T: Storage,
    R: ModelTrainer + Send,
{
    Ok(match lifecycle.revert_to_checkpoint(&body.project).await {
        Ok(_) => status_reply(StatusCode::OK, true, "model reverted".into()),
        Err(err) => status_reply(StatusCode::BAD_REQUEST, false, err.to_string()),
    })
}

/// Handles and responds to a request for the round event log of a project.
async fn handle_logs<T: Storage>(
    project: String,
    mut store: T,
) -> Result<impl warp::Reply, Infallible> {
    Ok(match store.round_events(&ProjectName::from(project)).await {
        Ok(events) => Response::builder()
            .header("Content-Type", "application/octet-stream")
            .status(StatusCode::OK)
            .body(bincode::serialize(&events).unwrap())
            .unwrap(),
        Err(err) => {
            warn!("failed to handle round log request: {:?}", err);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Vec::new())
                .unwrap()
        }
    })
}

/// Handles and responds to a request for the training payload of a project.
///
/// Pending retraining jobs take precedence over the pipeline broadcast so that the trainer
/// keeps seeing lifecycle jobs even while no pipeline is running.
async fn handle_payload<T: Storage>(
    project: String,
    jobs: JobBoard,
    registry: Arc<PipelineRegistry<T>>,
) -> Result<impl warp::Reply, Infallible> {
    let project = ProjectName::from(project);
    if let Some(payload) = jobs.payload(&project).await {
        return Ok(payload_reply(&payload));
    }

    let handle = match registry.handle(&project).await {
        Some(handle) => handle,
        None => {
            return Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Vec::new())
                .unwrap())
        }
    };

    Ok(match handle.events.payload_listener().get_latest().event {
        PayloadUpdate::New(payload) => payload_reply(payload.as_ref()),
        PayloadUpdate::Invalidate => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Vec::new())
            .unwrap(),
    })
}

/// Handles and responds to a trained model report.
///
/// A report resolves the pending retraining job of the project if there is one, otherwise it
/// is handed to the running pipeline.
async fn handle_trained<T: Storage>(
    project: String,
    body: TrainedBody,
    jobs: JobBoard,
    registry: Arc<PipelineRegistry<T>>,
) -> Result<impl warp::Reply, Infallible> {
    let project = ProjectName::from(project);
    if let Some(job) = jobs.take(&project).await {
        return Ok(match job.reply.send((body.artifact, body.metrics)) {
            Ok(()) => status_reply(StatusCode::OK, true, "trained model accepted".into()),
            Err(_) => status_reply(
                StatusCode::CONFLICT,
                false,
                "the training job is no longer awaited".into(),
            ),
        });
    }

    let handle = match registry.handle(&project).await {
        Some(handle) => handle,
        None => {
            return Ok(status_reply(
                StatusCode::NOT_FOUND,
                false,
                "no pipeline is serving the project".into(),
            ))
        }
    };

    let request = TrainedRequest {
        artifact: body.artifact,
        metrics: body.metrics,
    };
    Ok(
        match handle
            .request_tx
            .request(request.into(), Span::current())
            .await
        {
            Ok(()) => status_reply(StatusCode::OK, true, "trained model accepted".into()),
            Err(err) => status_reply(StatusCode::BAD_REQUEST, false, err.to_string()),
        },
    )
}

/// Looks up the dataset of the latest prepared payload of the project.
async fn latest_dataset<T: Storage>(
    registry: &PipelineRegistry<T>,
    project: &ProjectName,
) -> Result<Dataset, Response<Vec<u8>>> {
    let handle = match registry.handle(project).await {
        Some(handle) => handle,
        None => {
            return Err(status_reply(
                StatusCode::NOT_FOUND,
                false,
                "no pipeline is serving the project".into(),
            ))
        }
    };

    match handle.events.payload_listener().get_latest().event {
        PayloadUpdate::New(payload) => Ok(payload.dataset.clone()),
        PayloadUpdate::Invalidate => Err(status_reply(
            StatusCode::CONFLICT,
            false,
            "no payload has been prepared for the project yet".into(),
        )),
    }
}

/// Builds a bincode encoded [`StatusResponse`] reply.
fn status_reply(code: StatusCode, success: bool, message: String) -> Response<Vec<u8>> {
    let body = StatusResponse { success, message };
    Response::builder()
        .header("Content-Type", "application/octet-stream")
        .status(code)
        .body(bincode::serialize(&body).unwrap())
        .unwrap()
}

/// Builds a bincode encoded payload reply.
fn payload_reply(payload: &TrainingPayload) -> Response<Vec<u8>> {
    Response::builder()
        .header("Content-Type", "application/octet-stream")
        .status(StatusCode::OK)
        .body(bincode::serialize(payload).unwrap())
        .unwrap()
}

/// Converts the pipeline registry into a `warp` filter.
fn with_registry<T: Storage>(
    registry: Arc<PipelineRegistry<T>>,
) -> impl Filter<Extract = (Arc<PipelineRegistry<T>>,), Error = Infallible> + Clone {
    warp::any().map(move || registry.clone())
}

/// Converts the lifecycle manager into a `warp` filter.
fn with_lifecycle<T, R>(
    lifecycle: Lifecycle<T, R>,
) -> impl Filter<Extract = (Lifecycle<T, R>,), Error = Infallible> + Clone
where
    T: Storage,
    R: ModelTrainer + Clone + Send + Sync + 'static,
{
    warp::any().map(move || lifecycle.clone())
}

/// Converts the job board into a `warp` filter.
fn with_jobs(jobs: JobBoard) -> impl Filter<Extract = (JobBoard,), Error = Infallible> + Clone {
    warp::any().map(move || jobs.clone())
}

/// Converts the storage into a `warp` filter.
fn with_store<T: Storage>(store: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

/// Extracts a bincode encoded request body.
fn body<B: DeserializeOwned + Send>(
) -> impl Filter<Extract = (B,), Error = warp::Rejection> + Clone {
    warp::body::bytes().and_then(|bytes: Bytes| async move {
        bincode::deserialize::<B>(&bytes[..]).map_err(|_| warp::reject::custom(InvalidBody))
    })
}

#[derive(Debug)]
struct InvalidBody;

impl warp::reject::Reject for InvalidBody {}

/// Handles `warp` rejections of bad requests.
async fn handle_reject(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if let Some(InvalidBody) = err.find() {
        StatusCode::BAD_REQUEST
    } else {
        error!("unhandled rejection: {:?}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    // reply with empty body; the status code is the interesting part
    Ok(warp::reply::with_status(Vec::new(), code))
}

#[derive(Debug, Error)]
/// Errors of the rest server.
pub enum RestError {
    #[error("invalid TLS configuration was provided")]
    InvalidTlsConfig,
}

impl From<Infallible> for RestError {
    fn from(infallible: Infallible) -> RestError {
        match infallible {}
    }
}

#[cfg(feature = "tls")]
/// Configures a server for TLS server authentication.
///
/// # Errors
/// Fails if the TLS settings are invalid.
fn configure_tls<F>(
    server: Server<F>,
    tls_certificate: Option<PathBuf>,
    tls_key: Option<PathBuf>,
) -> Result<TlsServer<F>, RestError>
where
    F: Filter + Clone + Send + Sync + 'static,
    F::Extract: Reply,
{
    match (tls_certificate, tls_key) {
        (Some(cert), Some(key)) => Ok(server.tls().cert_path(cert).key_path(key)),
        _ => Err(RestError::InvalidTlsConfig),
    }
}

#[cfg(not(feature = "tls"))]
/// Runs a server with the provided filter routes.
async fn run_http<F>(filter: F, api_settings: ApiSettings) -> Result<(), Infallible>
where
    F: Filter + Clone + Send + Sync + 'static,
    F::Extract: Reply,
{
    warp::serve(filter).run(api_settings.bind_address).await;
    Ok(())
}

#[cfg(feature = "tls")]
/// Runs a TLS server with the provided filter routes.
///
/// # Errors
/// Fails if the TLS settings are invalid.
async fn run_https<F>(filter: F, api_settings: ApiSettings) -> Result<(), RestError>
where
    F: Filter + Clone + Send + Sync + 'static,
    F::Extract: Reply,
{
    configure_tls(
        warp::serve(filter),
        api_settings.tls_certificate,
        api_settings.tls_key,
    )?
    .run(api_settings.bind_address)
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::sync::{mpsc, oneshot};

    use super::*;
    use crate::{state_machine::tests::utils, trainer::TrainedModel};
    use silonet_core::testutils;

    fn pending_job(reply: oneshot::Sender<TrainedModel>) -> TrainingJob {
        TrainingJob {
            project: utils::project(),
            model: testutils::model(TaskType::FraudDetection),
            dataset: testutils::dataset(4, 3),
            epochs: 5,
            reply,
        }
    }

    #[tokio::test]
    async fn test_pending_jobs_serve_their_payload() {
        let jobs = JobBoard::new();
        assert!(jobs.payload(&utils::project()).await.is_none());

        let (reply, _response) = oneshot::channel();
        jobs.post(pending_job(reply)).await;

        let payload = jobs.payload(&utils::project()).await.unwrap();
        assert_eq!(payload.task, TaskType::FraudDetection);
        assert_eq!(
            payload.model,
            Some(testutils::model(TaskType::FraudDetection)),
        );
        assert_eq!(payload.epochs, 5);
        // the job stays on the board until it is taken
        assert!(jobs.payload(&utils::project()).await.is_some());
    }

    #[tokio::test]
    async fn test_taken_jobs_resolve_over_their_reply_channel() {
        let jobs = JobBoard::new();
        let (reply, response) = oneshot::channel();
        jobs.post(pending_job(reply)).await;

        let job = jobs.take(&utils::project()).await.unwrap();
        job.reply.send((job.model.clone(), vec![])).unwrap();

        let (artifact, metrics) = response.await.unwrap();
        assert_eq!(artifact, testutils::model(TaskType::FraudDetection));
        assert!(metrics.is_empty());
        assert!(jobs.take(&utils::project()).await.is_none());
    }

    #[tokio::test]
    async fn test_forwarded_jobs_land_on_the_board() {
        let jobs = JobBoard::new();
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (reply, _response) = oneshot::channel();
        job_tx.send(pending_job(reply)).unwrap();
        drop(job_tx);

        forward_jobs(jobs.clone(), job_rx).await;
        assert!(jobs.payload(&utils::project()).await.is_some());
    }
}
