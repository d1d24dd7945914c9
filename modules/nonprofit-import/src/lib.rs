pub mod checkpoint;
pub mod config;
pub mod document;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod types;

pub use checkpoint::Checkpoint;
pub use config::{Config, RunSettings};
pub use error::{ImportError, Result};
pub use orchestrator::{ImportOrchestrator, RunHandle, RunOutcome, RunRequest};
pub use progress::{ImportLogEntry, LogLevel, NoopObserver, ProgressObserver, ProgressSnapshot};
pub use store::{MemoryOrgStore, PgOrgStore};
pub use types::{ImportStats, RunState, SearchCriteria};
