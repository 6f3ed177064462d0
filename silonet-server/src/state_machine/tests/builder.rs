use crate::{
    state_machine::{
        coordinator::CoordinatorState,
        events::EventSubscriber,
        phases::{self, Phase, PhaseState},
        requests::RequestSender,
        tests::utils,
        StateMachine,
    },
    storage::Storage,
};

pub struct StateMachineBuilder<P, S>
where
    S: Storage,
{
    coordinator_state: CoordinatorState,
    phase_state: P,
    store: S,
}

impl<S> StateMachineBuilder<phases::Idle, S>
where
    S: Storage,
{
    pub fn new(store: S) -> Self {
        Self {
            coordinator_state: utils::coordinator_state(),
            phase_state: phases::Idle::default(),
            store,
        }
    }
}

impl<P, S> StateMachineBuilder<P, S>
where
    PhaseState<P, S>: Phase<S>,
    StateMachine<S>: From<PhaseState<P, S>>,
    S: Storage,
{
    pub fn build(self) -> (StateMachine<S>, RequestSender, EventSubscriber) {
        let (mut shared, request_tx, event_subscriber) =
            utils::init_shared(self.coordinator_state, self.store);

        // Listeners must observe the state the phase is entered with
        let events = &mut shared.events;
        events.broadcast_keys(shared.state.keys.clone());
        events.broadcast_params(shared.state.round_params.clone());
        events.broadcast_phase(<PhaseState<P, _> as Phase<_>>::NAME);
        // Model and payload events carry the round ID, re-emit them under the new one
        events.broadcast_model(event_subscriber.model_listener().get_latest().event);
        events.broadcast_payload(event_subscriber.payload_listener().get_latest().event);

        let state_machine = StateMachine::from(PhaseState {
            private: self.phase_state,
            shared,
        });
        (state_machine, request_tx, event_subscriber)
    }

    pub fn with_round_id(mut self, id: u64) -> Self {
        self.coordinator_state.round_id = id;
        self
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.coordinator_state.pipeline.timeout = timeout;
        self
    }

    pub fn with_phase<P2>(self, phase_state: P2) -> StateMachineBuilder<P2, S> {
        StateMachineBuilder {
            coordinator_state: self.coordinator_state,
            phase_state,
            store: self.store,
        }
    }
}
