pub mod error;
pub mod sources;

pub use error::{CollectorError, Result};
pub use sources::git_service::GitServiceClient;
pub use sources::ledger::LedgerClient;
