//! Round parameters shared between the coordinator and the parties.

use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::box_;

use crate::{
    crypto::ByteObject, model::TaskType, validation::PrivacySettings, CoordinatorPublicKey,
};

/// The parameters of a training round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundParameters {
    /// The public key of the coordinator used for sealing cipher seeds.
    pub pk: CoordinatorPublicKey,
    /// The random round seed.
    pub seed: RoundSeed,
    /// The privacy budget spent on this round's released aggregate.
    pub epsilon: f64,
    /// The privacy settings every upload of this round must declare.
    pub settings: PrivacySettings,
    /// The task the prepared aggregate is handed off for.
    pub task: TaskType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// A seed for a round.
///
/// A fresh seed is drawn when a round opens. It is published with the round parameters and
/// identifies the round in the event log.
pub struct RoundSeed(box_::Seed);

impl ByteObject for RoundSeed {
    const LENGTH: usize = box_::SEEDBYTES;

    fn zeroed() -> Self {
        Self(box_::Seed([0_u8; Self::LENGTH]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        box_::Seed::from_slice(bytes).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_seeds_are_distinct() {
        assert_ne!(RoundSeed::generate(), RoundSeed::generate());
        assert_eq!(RoundSeed::zeroed().as_slice(), &[0_u8; 32][..]);
    }
}
