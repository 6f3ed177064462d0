//! Events that the coordinator broadcasts while a pipeline runs, and the
//! publisher/subscriber pair behind them.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use chrono::Utc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{state_machine::phases::PhaseName, trainer::TrainingPayload};
use silonet_core::{common::RoundParameters, crypto::SealingKeyPair, model::ModelArtifact};

/// An event along with the round it was emitted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<E> {
    /// The round this event belongs to.
    pub round_id: u64,
    /// The event payload.
    pub event: E,
}

/// Training payload update event.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadUpdate {
    Invalidate,
    New(Arc<TrainingPayload>),
}

/// Trained model update event.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelUpdate {
    Invalidate,
    New(Arc<ModelArtifact>),
}

/// An entry of the per-project round event log.
///
/// Unlike the broadcast events above, these records outlive the round: they are appended to
/// the project storage so that the history of a round remains auditable after the pipeline
/// has moved on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEventRecord {
    /// The round in which the event occurred.
    pub round_id: u64,
    /// The phase in which the event occurred.
    pub phase: PhaseName,
    /// A short description of the event.
    pub message: String,
    /// The Unix timestamp at which the event was recorded.
    pub timestamp: i64,
}

impl RoundEventRecord {
    /// Creates a new event record stamped with the current time.
    pub fn new(round_id: u64, phase: PhaseName, message: impl Into<String>) -> Self {
        Self {
            round_id,
            phase,
            message: message.into(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

fn channel<E: Clone>(round_id: u64, event: E) -> (EventBroadcaster<E>, EventListener<E>) {
    let (tx, rx) = watch::channel(Event { round_id, event });
    (tx.into(), rx.into())
}

/// Broadcasts coordinator events to every subscriber.
#[derive(Debug)]
pub struct EventPublisher {
    /// Round ID stamped onto every event.
    round_id: u64,
    keys_tx: EventBroadcaster<SealingKeyPair>,
    params_tx: EventBroadcaster<RoundParameters>,
    phase_tx: EventBroadcaster<PhaseName>,
    payload_tx: EventBroadcaster<PayloadUpdate>,
    model_tx: EventBroadcaster<ModelUpdate>,
}

/// Hands out [`EventListener`]s for the coordinator events.
#[derive(Debug, Clone)]
pub struct EventSubscriber {
    keys_rx: EventListener<SealingKeyPair>,
    params_rx: EventListener<RoundParameters>,
    phase_rx: EventListener<PhaseName>,
    payload_rx: EventListener<PayloadUpdate>,
    model_rx: EventListener<ModelUpdate>,
}

impl EventPublisher {
    /// Creates the publisher/subscriber pair, seeded with the given events.
    ///
    /// The payload channel always starts out invalidated, a payload only
    /// exists once a round has produced one.
    pub fn init(
        round_id: u64,
        keys: SealingKeyPair,
        params: RoundParameters,
        phase: PhaseName,
        model: ModelUpdate,
    ) -> (Self, EventSubscriber) {
        let (keys_tx, keys_rx) = channel(round_id, keys);
        let (params_tx, params_rx) = channel(round_id, params);
        let (phase_tx, phase_rx) = channel(round_id, phase);
        let (payload_tx, payload_rx) = channel(round_id, PayloadUpdate::Invalidate);
        let (model_tx, model_rx) = channel(round_id, model);

        let publisher = EventPublisher {
            round_id,
            keys_tx,
            params_tx,
            phase_tx,
            payload_tx,
            model_tx,
        };
        let subscriber = EventSubscriber {
            keys_rx,
            params_rx,
            phase_rx,
            payload_rx,
            model_rx,
        };
        (publisher, subscriber)
    }

    /// Sets the round ID stamped onto subsequent events.
    pub fn set_round_id(&mut self, id: u64) {
        self.round_id = id;
    }

    fn event<T>(&self, event: T) -> Event<T> {
        Event {
            round_id: self.round_id,
            event,
        }
    }

    /// Broadcasts the round key pair.
    pub fn broadcast_keys(&mut self, keys: SealingKeyPair) {
        self.keys_tx.broadcast(self.event(keys));
    }

    /// Broadcasts the round parameters.
    pub fn broadcast_params(&mut self, params: RoundParameters) {
        self.params_tx.broadcast(self.event(params));
    }

    /// Broadcasts a phase transition.
    pub fn broadcast_phase(&mut self, phase: PhaseName) {
        self.phase_tx.broadcast(self.event(phase));
    }

    /// Broadcasts a training payload update.
    pub fn broadcast_payload(&mut self, update: PayloadUpdate) {
        self.payload_tx.broadcast(self.event(update));
    }

    /// Broadcasts a trained model update.
    pub fn broadcast_model(&mut self, update: ModelUpdate) {
        self.model_tx.broadcast(self.event(update));
    }
}

impl EventSubscriber {
    /// Returns a listener for key pair events. The listener observes the
    /// secret key, so it must not escape the coordinator.
    pub fn keys_listener(&self) -> EventListener<SealingKeyPair> {
        self.keys_rx.clone()
    }

    /// Returns a listener for round parameter events.
    pub fn params_listener(&self) -> EventListener<RoundParameters> {
        self.params_rx.clone()
    }

    /// Returns a listener for phase transition events.
    pub fn phase_listener(&self) -> EventListener<PhaseName> {
        self.phase_rx.clone()
    }

    /// Returns a listener for training payload events.
    pub fn payload_listener(&self) -> EventListener<PayloadUpdate> {
        self.payload_rx.clone()
    }

    /// Returns a listener for trained model events.
    pub fn model_listener(&self) -> EventListener<ModelUpdate> {
        self.model_rx.clone()
    }
}

/// Observes one category of coordinator events.
///
/// [`get_latest`] returns the most recent event, and the [`Stream`] impl
/// yields each new one.
///
/// [`get_latest`]: EventListener::get_latest
#[derive(Debug, Clone)]
pub struct EventListener<E>(watch::Receiver<Event<E>>);

impl<E> From<watch::Receiver<Event<E>>> for EventListener<E> {
    fn from(receiver: watch::Receiver<Event<E>>) -> Self {
        EventListener(receiver)
    }
}

impl<E> EventListener<E>
where
    E: Clone,
{
    pub fn get_latest(&self) -> Event<E> {
        self.0.borrow().clone()
    }
}

impl<E: Clone> Stream for EventListener<E> {
    type Item = Event<E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.0).poll_next(cx)
    }
}

/// Sending half of an event channel.
#[derive(Debug)]
pub struct EventBroadcaster<E>(watch::Sender<Event<E>>);

impl<E> EventBroadcaster<E> {
    fn broadcast(&self, event: Event<E>) {
        // A send only fails when no listener is left, which is fine
        let _ = self.0.broadcast(event);
    }
}

impl<E> From<watch::Sender<Event<E>>> for EventBroadcaster<E> {
    fn from(sender: watch::Sender<Event<E>>) -> Self {
        Self(sender)
    }
}
