//! The state machine that controls the execution of a project's privacy pipeline.
//!
//! # Overview
//!
//! The [`StateMachine`] is responsible for executing the individual stages of the pipeline.
//! The main stages include: validating the staged datasets, aligning the parties' records,
//! summing the aligned views, noising the aggregate and handing the prepared payload over for
//! training.
//!
//! Furthermore, the [`StateMachine`] publishes pipeline events and handles pipeline errors.
//!
//! The [`StateMachine`] as well as the pipeline settings can be configured in the config file.
//! See [here][settings] for more details.
//!
//! # Phase states
//!
//! **Idle**
//!
//! Publishes [`PhaseName::Idle`], increments the `round id` by `1`, updates the
//! [`SealingKeyPair`] as well as the `seed`, publishes the [`SealingKeyPair`] and the
//! [`RoundParameters`], stages the datasets the parties upload and waits for a start signal.
//! The round's privacy budget is settled when the round starts: a start override beats the
//! strictest declared budget, which beats the configured default.
//!
//! **Validating**
//!
//! Publishes [`PhaseName::Validating`], loads the staged datasets and fails the round wholesale
//! if a ciphertext is malformed, the shapes contradict each other or the parties declared
//! diverging privacy settings. The settings the parties agreed on become the round's settings.
//!
//! **SoloDecrypt**
//!
//! Publishes [`PhaseName::SoloDecrypt`]. A round with a single party has nothing to align, so
//! its dataset is decrypted directly and handed to the aggregator as its own sum.
//!
//! **Aligning**
//!
//! Publishes [`PhaseName::Aligning`], decrypts the staged datasets and restricts every party's
//! view to the records all parties share, in one agreed record order.
//!
//! **Aggregating**
//!
//! Publishes [`PhaseName::Aggregating`] and sums the aligned views element-wise without any
//! party's view being exposed on its own.
//!
//! **Encrypting**
//!
//! Publishes [`PhaseName::Encrypting`] and puts the aggregate back under the round key, so the
//! noise can be folded in without the unnoised aggregate ever being handed on in the clear.
//!
//! **Noising**
//!
//! Publishes [`PhaseName::Noising`] and folds a share of Laplace noise matching the round's
//! privacy budget into the encrypted aggregate.
//!
//! **Ready**
//!
//! Publishes [`PhaseName::Ready`], decrypts the noised aggregate exactly once and releases it
//! to the round's trainer as the training payload.
//!
//! **HandedOff**
//!
//! Publishes [`PhaseName::HandedOff`], waits for the trainer to report back, persists and
//! publishes the trained model and completes the round.
//!
//! **Failure**
//!
//! Publishes [`PhaseName::Failure`] and handles [`PhaseError`]s that can occur during the
//! execution of the [`StateMachine`]. A round is atomic: its staged datasets are discarded and
//! the error is handled by restarting the round. However, if a [`PhaseError::RequestChannel`]
//! occurs, the [`StateMachine`] will shut down.
//!
//! **Shutdown**
//!
//! Publishes [`PhaseName::Shutdown`] and shuts down the [`StateMachine`]. During the shutdown,
//! the [`StateMachine`] performs a clean shutdown of the [Request][requests_idx] channel by
//! closing it and consuming all remaining messages.
//!
//! # Requests
//!
//! By initiating a new [`StateMachine`] via [`StateMachineInitializer::init()`], a new
//! [StateMachineRequest][requests_idx] channel is created, the function of which is to send
//! [`StateMachineRequest`]s to the [`StateMachine`]. The sender half of that channel
//! ([`RequestSender`]) is returned back to the caller of
//! [`StateMachineInitializer::init()`], whereas the receiver half ([`RequestReceiver`])
//! is used by the [`StateMachine`].
//!
//! See [here][requests] for more details.
//!
//! # Events
//!
//! During the execution of the pipeline, the [`StateMachine`] will publish various events
//! (see Phase states). Everyone who is interested in the events can subscribe to the respective
//! events via the [`EventSubscriber`]. An [`EventSubscriber`] is automatically created when a
//! new [`StateMachine`] is created through [`StateMachineInitializer::init()`].
//!
//! See [here][events] for more details.
//!
//! [settings]: ../settings/index.html
//! [`PhaseName::Idle`]: crate::state_machine::phases::PhaseName::Idle
//! [`PhaseName::Validating`]: crate::state_machine::phases::PhaseName::Validating
//! [`PhaseName::SoloDecrypt`]: crate::state_machine::phases::PhaseName::SoloDecrypt
//! [`PhaseName::Aligning`]: crate::state_machine::phases::PhaseName::Aligning
//! [`PhaseName::Aggregating`]: crate::state_machine::phases::PhaseName::Aggregating
//! [`PhaseName::Encrypting`]: crate::state_machine::phases::PhaseName::Encrypting
//! [`PhaseName::Noising`]: crate::state_machine::phases::PhaseName::Noising
//! [`PhaseName::Ready`]: crate::state_machine::phases::PhaseName::Ready
//! [`PhaseName::HandedOff`]: crate::state_machine::phases::PhaseName::HandedOff
//! [`PhaseName::Failure`]: crate::state_machine::phases::PhaseName::Failure
//! [`PhaseName::Shutdown`]: crate::state_machine::phases::PhaseName::Shutdown
//! [`PhaseError`]: crate::state_machine::phases::PhaseError
//! [`PhaseError::RequestChannel`]: crate::state_machine::phases::PhaseError::RequestChannel
//! [`SealingKeyPair`]: silonet_core::crypto::SealingKeyPair
//! [`RoundParameters`]: silonet_core::common::RoundParameters
//! [`StateMachineRequest`]: crate::state_machine::requests::StateMachineRequest
//! [`RequestReceiver`]: crate::state_machine::requests::RequestReceiver
//! [requests_idx]: ./requests/index.html
//! [requests]: ./requests/index.html
//! [events]: ./events/index.html

pub mod coordinator;
pub mod events;
mod initializer;
pub mod phases;
pub mod requests;

#[cfg(test)]
pub(crate) mod tests;

pub use self::{
    initializer::{StateMachineInitializationError, StateMachineInitializer},
    requests::{RequestError, RequestSender},
};

use derive_more::From;

use self::phases::{
    Aggregating,
    Aligning,
    Encrypting,
    Failure,
    HandedOff,
    Idle,
    Noising,
    PhaseState,
    Ready,
    Shutdown,
    SoloDecrypt,
    Validating,
};
use crate::storage::Storage;

/// The state machine with all its states.
#[derive(From)]
pub enum StateMachine<T> {
    Idle(PhaseState<Idle, T>),
    Validating(PhaseState<Validating, T>),
    SoloDecrypt(PhaseState<SoloDecrypt, T>),
    Aligning(PhaseState<Aligning, T>),
    Aggregating(PhaseState<Aggregating, T>),
    Encrypting(PhaseState<Encrypting, T>),
    Noising(PhaseState<Noising, T>),
    Ready(PhaseState<Ready, T>),
    HandedOff(PhaseState<HandedOff, T>),
    Failure(PhaseState<Failure, T>),
    Shutdown(PhaseState<Shutdown, T>),
}

impl<T> StateMachine<T>
where
    T: Storage,
{
    /// Moves the [`StateMachine`] to the next state and consumes the current one.
    /// Returns the next state or `None` if the [`StateMachine`] reached the state
    /// [`Shutdown`].
    pub async fn next(self) -> Option<Self> {
        match self {
            StateMachine::Idle(state) => state.run_phase().await,
            StateMachine::Validating(state) => state.run_phase().await,
            StateMachine::SoloDecrypt(state) => state.run_phase().await,
            StateMachine::Aligning(state) => state.run_phase().await,
            StateMachine::Aggregating(state) => state.run_phase().await,
            StateMachine::Encrypting(state) => state.run_phase().await,
            StateMachine::Noising(state) => state.run_phase().await,
            StateMachine::Ready(state) => state.run_phase().await,
            StateMachine::HandedOff(state) => state.run_phase().await,
            StateMachine::Failure(state) => state.run_phase().await,
            StateMachine::Shutdown(state) => state.run_phase().await,
        }
    }

    /// Runs the state machine until it shuts down.
    /// The [`StateMachine`] shuts down once all [`RequestSender`] have been dropped.
    pub async fn run(mut self) -> Option<()> {
        loop {
            self = self.next().await?;
        }
    }
}
