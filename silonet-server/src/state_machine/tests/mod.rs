//! State machine test utilities and full round drives.

pub mod builder;
pub mod impls;
pub mod utils;

pub use builder::StateMachineBuilder;
