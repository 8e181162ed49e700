use log::{error, info};

use crate::assembly::{assemble, CaseRecord};
use crate::assessment::{run_assessment, RiskOracle};
use crate::config::PipelineConfig;
use crate::crossref::run_cross_reference;
use crate::error::{CaseBuilderError, CaseStage, Result};
use crate::extraction::{run_extraction, ExtractionOracle};
use crate::history::HistoryStore;
use crate::ingestion::{DocumentInputs, DocumentSource, RawDocument};
use crate::state::{CaseState, IngestUpdate};

/// Runs ingest → extract → cross-reference → assess → assemble for one case.
///
/// A fresh [`CaseState`] is created per run and dropped once the record is
/// produced, so a pipeline value can be reused for any number of cases.
pub struct CasePipeline<D, E, R, H> {
    source: D,
    extraction_oracle: E,
    risk_oracle: R,
    history: H,
    config: PipelineConfig,
}

impl<D, E, R, H> CasePipeline<D, E, R, H>
where
    D: DocumentSource,
    E: ExtractionOracle,
    R: RiskOracle,
    H: HistoryStore,
{
    pub fn new(source: D, extraction_oracle: E, risk_oracle: R, history: H) -> Self {
        Self {
            source,
            extraction_oracle,
            risk_oracle,
            history,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn extraction_oracle(&self) -> &E {
        &self.extraction_oracle
    }

    pub fn risk_oracle(&self) -> &R {
        &self.risk_oracle
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub async fn run(&self, inputs: &DocumentInputs) -> Result<CaseRecord> {
        info!("Loading {} input file(s)", inputs.len());
        let documents = self.source.load(inputs).await.map_err(log_failure)?;
        self.run_with_documents(documents).await
    }

    pub async fn run_with_documents(&self, documents: Vec<RawDocument>) -> Result<CaseRecord> {
        let state = self.run_to_state(documents).await.map_err(log_failure)?;
        state.into_record().ok_or_else(|| {
            CaseBuilderError::structural(CaseStage::Assemble, "record", "no record was assembled")
        })
    }

    /// Runs every stage and returns the final state, record included.
    pub async fn run_to_state(&self, documents: Vec<RawDocument>) -> Result<CaseState> {
        let policy = self.config.policy();
        let mut state = CaseState::new();

        info!("Stage {}: {} document(s)", CaseStage::Ingest, documents.len());
        state.apply(IngestUpdate { documents })?;

        info!("Stage {}", CaseStage::Extract);
        let extracted = run_extraction(
            &state,
            &self.extraction_oracle,
            &policy,
            self.config.concurrent_oracle_calls,
        )
        .await?;
        state.apply(extracted)?;

        info!("Stage {}", CaseStage::CrossReference);
        let cross_referenced = run_cross_reference(&state, &self.history, &self.config.unknown_company);
        state.apply(cross_referenced)?;

        info!("Stage {}", CaseStage::Assess);
        let assessed = run_assessment(&state, &self.risk_oracle, &policy).await?;
        state.apply(assessed)?;

        info!("Stage {}", CaseStage::Assemble);
        let assembled = assemble(&state)?;
        state.apply(assembled)?;

        Ok(state)
    }
}

fn log_failure(err: CaseBuilderError) -> CaseBuilderError {
    match err.stage() {
        Some(stage) => error!("Case pipeline failed in {} stage: {}", stage, err),
        None => error!("Case pipeline failed: {}", err),
    }
    err
}
