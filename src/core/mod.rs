pub mod dedup;
pub mod models;
pub mod normalizer;
pub mod orchestrator;

pub use dedup::DedupEngine;
pub use models::{JobRecord, LOG_FIELDS, RawJobRecord, TERMINAL_RESULTS};
pub use normalizer::Normalizer;
pub use orchestrator::{Orchestrator, RunSummary};
