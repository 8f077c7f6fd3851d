pub mod analysis;
pub mod deps;
pub mod fetch;
pub mod ingest;
pub mod lease;
pub mod logging;
pub mod store;
pub mod summarizer;
pub mod sweep;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use analysis::{AnalysisConfig, AnalysisCoordinator, RunOutcome, RunPhase};
pub use deps::PipelineDeps;
pub use fetch::{fetch_all, FetchConfig, FetchOutcome, KnownState, StopReason};
pub use ingest::{IngestOutcome, Ingestor};
pub use summarizer::{BatchSummarizer, MergedSummary, SummarizeConfig};
pub use sweep::{EntityStatus, SweepReport};
pub use traits::{ReviewSource, ReviewStore, SummaryEngine, SummaryRequest};
