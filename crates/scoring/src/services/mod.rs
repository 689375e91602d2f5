pub mod commitment;
pub mod lifecycle;
pub mod normalizer;
pub mod scoring;
pub mod vote_ledger;

pub use lifecycle::{LifecycleSettings, ProjectLifecycle};
