use crate::state_machine::{
    phases::{self, PhaseState},
    StateMachine,
};

impl<T> StateMachine<T> {
    pub fn is_idle(&self) -> bool {
        match self {
            StateMachine::Idle(_) => true,
            _ => false,
        }
    }

    pub fn is_validating(&self) -> bool {
        match self {
            StateMachine::Validating(_) => true,
            _ => false,
        }
    }

    pub fn into_validating_phase_state(self) -> PhaseState<phases::Validating, T> {
        match self {
            StateMachine::Validating(state) => state,
            _ => panic!("not in validating state"),
        }
    }

    pub fn is_solo_decrypt(&self) -> bool {
        match self {
            StateMachine::SoloDecrypt(_) => true,
            _ => false,
        }
    }

    pub fn is_aligning(&self) -> bool {
        match self {
            StateMachine::Aligning(_) => true,
            _ => false,
        }
    }

    pub fn is_aggregating(&self) -> bool {
        match self {
            StateMachine::Aggregating(_) => true,
            _ => false,
        }
    }

    pub fn is_encrypting(&self) -> bool {
        match self {
            StateMachine::Encrypting(_) => true,
            _ => false,
        }
    }

    pub fn is_noising(&self) -> bool {
        match self {
            StateMachine::Noising(_) => true,
            _ => false,
        }
    }

    pub fn is_ready(&self) -> bool {
        match self {
            StateMachine::Ready(_) => true,
            _ => false,
        }
    }

    pub fn is_handed_off(&self) -> bool {
        match self {
            StateMachine::HandedOff(_) => true,
            _ => false,
        }
    }

    pub fn is_failure(&self) -> bool {
        match self {
            StateMachine::Failure(_) => true,
            _ => false,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        match self {
            StateMachine::Shutdown(_) => true,
            _ => false,
        }
    }
}
