//! The request channel between the services and the running state machine.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use derive_more::From;
use displaydoc::Display;
use futures::{future::FutureExt, Stream};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, Span};

use crate::{
    storage::{DatasetAddError, StorageError},
    trainer::EpochMetrics,
};
use silonet_core::{
    model::{ModelArtifact, TaskType},
    validation::{RawPrivacySettings, ValidationError},
    PartyId,
};

/// Errors which can occur while the state machine handles a request.
#[derive(Debug, Display, Error)]
pub enum RequestError {
    /// The message was rejected.
    MessageRejected,
    /// The message was discarded.
    MessageDiscarded,
    /// The dataset was uploaded for a different task than the one this project trains.
    TaskMismatch,
    /// The round cannot take further datasets.
    PipelineFull,
    /// The declared privacy budget is not positive.
    InvalidPrivacyBudget,
    /// The request could not be processed due to an internal error: {0}.
    InternalError(&'static str),
    /// Storage request failed: {0}.
    ProjectStorage(#[from] StorageError),
    /// Validation failed: {0}.
    Validation(#[from] ValidationError),
    /// Staging a dataset for the round failed: {0}.
    DatasetAdd(#[from] DatasetAddError),
}

/// An upload request.
#[derive(Debug)]
pub struct UploadRequest {
    /// The id of the party uploading the dataset.
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

/// A start request.
#[derive(Debug)]
pub struct StartRequest {
    /// The privacy budget override for this round, if any.
    pub epsilon: Option<f64>,
}

/// A trained model request.
#[derive(Debug)]
pub struct TrainedRequest {
    /// The model trained on the round's payload.
    pub artifact: ModelArtifact,
    /// The per-epoch training metrics.
    pub metrics: Vec<EpochMetrics>,
}

/// A [`StateMachine`] request.
///
/// [`StateMachine`]: crate::state_machine
#[derive(Debug, From)]
pub enum StateMachineRequest {
    Upload(UploadRequest),
    Start(StartRequest),
    Trained(TrainedRequest),
}

/// The sending half of the request channel.
///
/// Every service that talks to the state machine holds a clone of this handle.
#[derive(Clone, From, Debug)]
pub struct RequestSender(mpsc::UnboundedSender<(StateMachineRequest, Span, ResponseSender)>);

impl RequestSender {
    /// Submits a request and waits for the state machine to answer it.
    ///
    /// # Errors
    /// Fails if the state machine has shut down and the request channel is
    /// closed as a result.
    pub async fn request(&self, req: StateMachineRequest, span: Span) -> Result<(), RequestError> {
        let (resp_tx, resp_rx) = oneshot::channel::<Result<(), RequestError>>();
        self.0.send((req, span, resp_tx)).map_err(|_| {
            RequestError::InternalError(
                "failed to send request to the state machine: state machine is shutting down",
            )
        })?;
        resp_rx.await.map_err(|_| {
            RequestError::InternalError("failed to receive response from the state machine")
        })?
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Channel on which the state machine answers a [`StateMachineRequest`].
pub(in crate::state_machine) type ResponseSender = oneshot::Sender<Result<(), RequestError>>;

/// The receiving half of the request channel, owned by the state machine.
#[derive(From, Debug)]
pub struct RequestReceiver(mpsc::UnboundedReceiver<(StateMachineRequest, Span, ResponseSender)>);

impl Stream for RequestReceiver {
    type Item = (StateMachineRequest, Span, ResponseSender);

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        trace!("RequestReceiver: polling");
        Pin::new(&mut self.get_mut().0).poll_recv(cx)
    }
}

impl RequestReceiver {
    /// Creates a fresh request channel and returns both halves.
    pub fn new() -> (Self, RequestSender) {
        let (tx, rx) = mpsc::unbounded_channel::<(StateMachineRequest, Span, ResponseSender)>();
        (RequestReceiver::from(rx), RequestSender::from(tx))
    }

    /// Closes the channel so that no further requests can be submitted.
    /// Requests that are already queued can still be received.
    pub fn close(&mut self) {
        self.0.close()
    }

    /// Waits for the next request.
    pub async fn recv(&mut self) -> Option<(StateMachineRequest, Span, ResponseSender)> {
        self.0.recv().await
    }

    /// Retrieves the next request without blocking.
    pub fn try_recv(&mut self) -> Option<Option<(StateMachineRequest, Span, ResponseSender)>> {
        // `recv().now_or_never()` may miss messages that were sent just before
        // the call (https://github.com/tokio-rs/tokio/issues/3350). Queued
        // requests are picked up on the next poll, which is all the phases need.
        self.0.recv().now_or_never()
    }
}
