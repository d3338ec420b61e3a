pub mod store;

pub use store::{ChallengePurpose, ChallengeStore, ValidationMode};
