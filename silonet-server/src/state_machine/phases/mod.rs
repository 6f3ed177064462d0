//! The phases of the privacy pipeline.
//!
//! Each submodule implements one phase of the [`StateMachine`].
//!
//! [`StateMachine`]: crate::state_machine::StateMachine

mod aggregating;
mod aligning;
mod encrypting;
mod failure;
mod handed_off;
mod idle;
mod noising;
mod ready;
mod shutdown;
mod solo_decrypt;
mod validating;

use std::fmt;

use async_trait::async_trait;
use derive_more::Display;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, error_span, info, warn, Span};
use tracing_futures::Instrument;

pub use self::{
    aggregating::{Aggregating, AggregatingError},
    aligning::{Aligning, AligningError},
    encrypting::{Encrypting, EncryptingError},
    failure::{Failure, PhaseError},
    handed_off::{HandedOff, HandedOffError},
    idle::{Idle, IdleError},
    noising::{Noising, NoisingError},
    ready::{Ready, ReadyError},
    shutdown::Shutdown,
    solo_decrypt::{SoloDecrypt, SoloDecryptError},
    validating::{Validating, ValidatingError},
};
use crate::{
    metric,
    metrics::Measurement,
    state_machine::{
        coordinator::CoordinatorState,
        events::{EventPublisher, RoundEventRecord},
        requests::{RequestError, RequestReceiver, ResponseSender, StateMachineRequest},
        StateMachine,
    },
    storage::Storage,
};

/// The name of the current phase.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize, Deserialize)]
pub enum PhaseName {
    #[display(fmt = "Idle")]
    Idle,
    #[display(fmt = "Validating")]
    Validating,
    #[display(fmt = "SoloDecrypt")]
    SoloDecrypt,
    #[display(fmt = "Aligning")]
    Aligning,
    #[display(fmt = "Aggregating")]
    Aggregating,
    #[display(fmt = "Encrypting")]
    Encrypting,
    #[display(fmt = "Noising")]
    Noising,
    #[display(fmt = "Ready")]
    Ready,
    #[display(fmt = "HandedOff")]
    HandedOff,
    #[display(fmt = "Failure")]
    Failure,
    #[display(fmt = "Shutdown")]
    Shutdown,
}

/// One phase of the pipeline.
///
/// The state machine runs phases in sequence, and each phase decides its
/// successor. See the [module level documentation] for the transition graph.
///
/// [module level documentation]: crate::state_machine
#[async_trait]
pub trait Phase<T>
where
    T: Storage,
{
    /// The name under which the phase is reported.
    const NAME: PhaseName;

    /// Runs this phase to completion.
    async fn run(&mut self) -> Result<(), PhaseError>;

    /// Consumes the phase and yields the successor state, or `None` to stop.
    fn next(self) -> Option<StateMachine<T>>;
}

/// A trait that must be implemented by a state to handle a request.
#[async_trait]
pub trait Handler {
    /// Handles a request.
    ///
    /// # Errors
    /// Fails on validation and storage errors.
    async fn handle_request(&mut self, req: StateMachineRequest) -> Result<(), RequestError>;
}

/// State and I/O handles that every phase can reach.
pub struct Shared<T> {
    /// The coordinator state.
    pub(in crate::state_machine) state: CoordinatorState,
    /// The receiving half of the request channel.
    pub(in crate::state_machine) request_rx: RequestReceiver,
    /// The publisher for coordinator events.
    pub(in crate::state_machine) events: EventPublisher,
    /// The project and checkpoint store.
    pub(in crate::state_machine) store: T,
}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("state", &self.state)
            .field("request_rx", &self.request_rx)
            .field("events", &self.events)
            .finish()
    }
}

impl<T> Shared<T> {
    /// Bundles the shared state from its parts.
    pub fn new(
        coordinator_state: CoordinatorState,
        publisher: EventPublisher,
        request_rx: RequestReceiver,
        store: T,
    ) -> Self {
        Self {
            state: coordinator_state,
            request_rx,
            events: publisher,
            store,
        }
    }

    /// Moves the coordinator and the event publisher to the given round.
    pub fn set_round_id(&mut self, id: u64) {
        self.state.round_id = id;
        self.events.set_round_id(id);
    }

    /// The current round ID.
    pub fn round_id(&self) -> u64 {
        self.state.round_id
    }
}

impl<T> Shared<T>
where
    T: Storage,
{
    /// Appends an entry to the round event log of the project.
    ///
    /// A failing append is logged and otherwise ignored.
    pub async fn record_event(&mut self, phase: PhaseName, message: impl Into<String>) {
        let record = RoundEventRecord::new(self.state.round_id, phase, message);
        if let Err(err) = self
            .store
            .append_round_event(&self.state.project, &record)
            .await
        {
            warn!("failed to append round event: {}", err);
        }
    }
}

/// A phase of the pipeline together with the shared coordinator state.
///
/// `private` holds what only this phase needs, `shared` travels across
/// transitions.
pub struct PhaseState<S, T> {
    /// The phase dependent state.
    pub(in crate::state_machine) private: S,
    /// The handles common to all phases.
    pub(in crate::state_machine) shared: Shared<T>,
}

impl<S, T> PhaseState<S, T>
where
    Self: Handler + Phase<T>,
    S: Send,
    T: Storage,
{
    /// Processes the next available request.
    async fn process_next(&mut self) -> Result<(), PhaseError> {
        let (req, span, resp_tx) = self.next_request().await?;
        self.process_single(req, span, resp_tx).await;
        Ok(())
    }

    /// Processes a single request and answers it.
    async fn process_single(
        &mut self,
        req: StateMachineRequest,
        span: Span,
        resp_tx: ResponseSender,
    ) {
        let _span_guard = span.enter();

        let res = match self.handle_request(req).await {
            ok @ Ok(_) => {
                metric!(accepted: self.shared.state.round_id, Self::NAME);
                ok
            }
            error @ Err(_) => {
                metric!(rejected: self.shared.state.round_id, Self::NAME);
                error
            }
        };

        // the caller may have dropped the response receiver, nothing to do then
        let _ = resp_tx.send(res);
    }
}

impl<S, T> PhaseState<S, T>
where
    Self: Phase<T>,
    S: Send,
    T: Storage,
{
    /// Runs the phase tasks, discards the requests that the transition would
    /// orphan, and hands over to the successor phase.
    pub async fn run_phase(mut self) -> Option<StateMachine<T>> {
        let phase = <Self as Phase<_>>::NAME;
        let span = error_span!("run_phase", round_id = self.shared.round_id(), phase = %phase);

        async move {
            info!("starting phase");
            self.shared.events.broadcast_phase(phase);
            metric!(Measurement::Phase, phase as u8);
            self.shared.record_event(phase, "phase started").await;

            if let Err(err) = self.run().await {
                warn!("phase tasks failed");
                return Some(self.into_failure_state(err));
            }
            info!("phase completed");

            debug!("discarding outdated requests before transitioning");
            if let Err(err) = self.discard_outdated_requests() {
                warn!("failed to discard the outdated requests");
                match phase {
                    PhaseName::Failure | PhaseName::Shutdown => {
                        debug!("already in the {} phase, ignoring the discard error", phase);
                    }
                    _ => return Some(self.into_failure_state(err)),
                }
            }

            info!("moving on to the next phase");
            self.next()
        }
        .instrument(span)
        .await
    }

    /// Answers every request still queued with [`RequestError::MessageDiscarded`].
    ///
    /// Requests left over at the end of a phase would otherwise leak into the
    /// next one.
    fn discard_outdated_requests(&mut self) -> Result<(), PhaseError> {
        while let Some((_, span, resp_tx)) = self.try_next_request()? {
            let _span_guard = span.enter();
            debug!("discarding outdated request");
            metric!(discarded: self.shared.state.round_id, Self::NAME);
            let _ = resp_tx.send(Err(RequestError::MessageDiscarded));
        }
        Ok(())
    }
}

// Functions that are available to all states
impl<S, T> PhaseState<S, T> {
    /// Waits for the next [`StateMachineRequest`].
    ///
    /// # Errors
    /// Returns [`PhaseError::RequestChannel`] once every sender half is gone.
    async fn next_request(
        &mut self,
    ) -> Result<(StateMachineRequest, Span, ResponseSender), PhaseError> {
        debug!("waiting for the next incoming request");
        self.shared.request_rx.next().await.ok_or_else(|| {
            error!("request channel broken: all senders dropped");
            PhaseError::RequestChannel("all request senders have been dropped")
        })
    }

    fn try_next_request(
        &mut self,
    ) -> Result<Option<(StateMachineRequest, Span, ResponseSender)>, PhaseError> {
        match self.shared.request_rx.try_recv() {
            Some(Some(item)) => Ok(Some(item)),
            None => {
                debug!("no pending request");
                Ok(None)
            }
            Some(None) => {
                warn!("request channel shut down while draining");
                Err(PhaseError::RequestChannel(
                    "all request senders have been dropped",
                ))
            }
        }
    }

    fn into_failure_state(self, err: PhaseError) -> StateMachine<T> {
        PhaseState::<Failure, _>::new(self.shared, err).into()
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::{state_machine::tests::utils, storage::tests::init_store};

    #[tokio::test]
    #[serial]
    async fn integration_set_round_id_stamps_new_events() {
        let store = init_store().await;
        let coordinator_state = utils::coordinator_state();
        let (mut shared, _, event_subscriber) = utils::init_shared(coordinator_state, store);

        let phases = event_subscriber.phase_listener();
        // rounds start at 0
        assert_eq!(phases.get_latest().round_id, 0);

        shared.set_round_id(1);
        assert_eq!(shared.state.round_id, 1);

        // events published before the bump keep their round
        assert_eq!(phases.get_latest().round_id, 0);

        // and new ones carry the bumped round
        shared.events.broadcast_phase(PhaseName::Validating);
        assert_eq!(phases.get_latest().round_id, 1);
    }
}
