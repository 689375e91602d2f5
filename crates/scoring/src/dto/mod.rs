pub mod analysis;
pub mod common;
pub mod dashboard;
pub mod finalize;
pub mod project;
pub mod vote;
