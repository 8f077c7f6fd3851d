use std::sync::Arc;

use typed_builder::TypedBuilder;

use reviewpulse_common::Config;

use crate::analysis::{AnalysisConfig, AnalysisCoordinator};
use crate::fetch::FetchConfig;
use crate::ingest::Ingestor;
use crate::summarizer::{BatchSummarizer, SummarizeConfig};
use crate::traits::{ReviewSource, ReviewStore, SummaryEngine};

/// Shared dependency container for the pipeline entry points.
///
/// Holds long-lived capabilities; ingestors and coordinators are built from
/// it per sweep. The summarization engine is optional because ingestion never
/// needs it.
#[derive(Clone, TypedBuilder)]
pub struct PipelineDeps {
    pub source: Arc<dyn ReviewSource>,
    pub store: Arc<dyn ReviewStore>,
    #[builder(default, setter(strip_option))]
    pub engine: Option<Arc<dyn SummaryEngine>>,
    #[builder(default)]
    pub fetch: FetchConfig,
    #[builder(default)]
    pub summarize: SummarizeConfig,
    #[builder(default)]
    pub analysis: AnalysisConfig,
}

impl PipelineDeps {
    /// Carry the env-driven knobs into the typed sub-configs.
    pub fn configs_from(config: &Config) -> (FetchConfig, SummarizeConfig, AnalysisConfig) {
        (
            FetchConfig::from_config(config),
            SummarizeConfig::from_config(config),
            AnalysisConfig::default(),
        )
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.source.clone(), self.store.clone(), self.fetch.clone())
            .with_lease_ttl(self.analysis.lease_ttl)
    }

    /// A coordinator, if a summarization engine is configured.
    pub fn coordinator(&self) -> Option<AnalysisCoordinator> {
        let engine = self.engine.clone()?;
        let summarizer = BatchSummarizer::new(engine, self.summarize.clone());
        Some(AnalysisCoordinator::new(
            self.store.clone(),
            summarizer,
            self.analysis.clone(),
        ))
    }
}
