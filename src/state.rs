//! The per-case accumulator threaded through the pipeline.
//!
//! Each stage reads what it needs from [`CaseState`] and returns a typed
//! update; [`CaseState::apply`] merges it. Slots are write-once: a stage can
//! fill its own slots, never rewrite another stage's.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::assembly::CaseRecord;
use crate::assessment::RiskAssessment;
use crate::error::{CaseBuilderError, CaseStage, Result};
use crate::history::HistoryLookupResult;
use crate::ingestion::RawDocument;
use crate::schema::{EntityData, FinancialData, InsuranceData};

/// The last stage that completed for a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelinePhase {
    Ingested,
    Extracted,
    CrossReferenced,
    Assessed,
    Assembled,
}

impl PipelinePhase {
    pub fn completed_by(stage: CaseStage) -> Self {
        match stage {
            CaseStage::Ingest => PipelinePhase::Ingested,
            CaseStage::Extract => PipelinePhase::Extracted,
            CaseStage::CrossReference => PipelinePhase::CrossReferenced,
            CaseStage::Assess => PipelinePhase::Assessed,
            CaseStage::Assemble => PipelinePhase::Assembled,
        }
    }

    /// The stage allowed to run after this phase, if any.
    pub fn next_stage(self) -> Option<CaseStage> {
        match self {
            PipelinePhase::Ingested => Some(CaseStage::Extract),
            PipelinePhase::Extracted => Some(CaseStage::CrossReference),
            PipelinePhase::CrossReferenced => Some(CaseStage::Assess),
            PipelinePhase::Assessed => Some(CaseStage::Assemble),
            PipelinePhase::Assembled => None,
        }
    }
}

/// The company lookup together with the name it was run for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompanyLookup {
    pub query: String,
    pub result: HistoryLookupResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestUpdate {
    pub documents: Vec<RawDocument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionUpdate {
    pub entity: EntityData,
    pub financial: FinancialData,
    pub insurance: InsuranceData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossReferenceUpdate {
    /// Keyed by IMO number.
    pub vessel_history: BTreeMap<String, HistoryLookupResult>,
    pub company_history: CompanyLookup,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentUpdate {
    /// `None` when there was nothing to assess.
    pub assessment: Option<RiskAssessment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyUpdate {
    pub record: CaseRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageUpdate {
    Ingest(IngestUpdate),
    Extract(ExtractionUpdate),
    CrossReference(CrossReferenceUpdate),
    Assess(AssessmentUpdate),
    Assemble(AssemblyUpdate),
}

impl StageUpdate {
    pub fn stage(&self) -> CaseStage {
        match self {
            StageUpdate::Ingest(_) => CaseStage::Ingest,
            StageUpdate::Extract(_) => CaseStage::Extract,
            StageUpdate::CrossReference(_) => CaseStage::CrossReference,
            StageUpdate::Assess(_) => CaseStage::Assess,
            StageUpdate::Assemble(_) => CaseStage::Assemble,
        }
    }
}

impl From<IngestUpdate> for StageUpdate {
    fn from(update: IngestUpdate) -> Self {
        StageUpdate::Ingest(update)
    }
}

impl From<ExtractionUpdate> for StageUpdate {
    fn from(update: ExtractionUpdate) -> Self {
        StageUpdate::Extract(update)
    }
}

impl From<CrossReferenceUpdate> for StageUpdate {
    fn from(update: CrossReferenceUpdate) -> Self {
        StageUpdate::CrossReference(update)
    }
}

impl From<AssessmentUpdate> for StageUpdate {
    fn from(update: AssessmentUpdate) -> Self {
        StageUpdate::Assess(update)
    }
}

impl From<AssemblyUpdate> for StageUpdate {
    fn from(update: AssemblyUpdate) -> Self {
        StageUpdate::Assemble(update)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseState {
    phase: Option<PipelinePhase>,
    documents: Option<Vec<RawDocument>>,
    entity: Option<EntityData>,
    financial: Option<FinancialData>,
    insurance: Option<InsuranceData>,
    vessel_history: Option<BTreeMap<String, HistoryLookupResult>>,
    company_history: Option<CompanyLookup>,
    assessment: Option<RiskAssessment>,
    record: Option<CaseRecord>,
}

impl CaseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until the ingest stage has been applied.
    pub fn phase(&self) -> Option<PipelinePhase> {
        self.phase
    }

    pub fn documents(&self) -> &[RawDocument] {
        self.documents.as_deref().unwrap_or(&[])
    }

    pub fn entity(&self) -> Option<&EntityData> {
        self.entity.as_ref()
    }

    pub fn financial(&self) -> Option<&FinancialData> {
        self.financial.as_ref()
    }

    pub fn insurance(&self) -> Option<&InsuranceData> {
        self.insurance.as_ref()
    }

    pub fn vessel_history(&self) -> Option<&BTreeMap<String, HistoryLookupResult>> {
        self.vessel_history.as_ref()
    }

    pub fn company_history(&self) -> Option<&CompanyLookup> {
        self.company_history.as_ref()
    }

    pub fn assessment(&self) -> Option<&RiskAssessment> {
        self.assessment.as_ref()
    }

    pub fn record(&self) -> Option<&CaseRecord> {
        self.record.as_ref()
    }

    pub fn into_record(self) -> Option<CaseRecord> {
        self.record
    }

    fn expected_stage(&self) -> Option<CaseStage> {
        match self.phase {
            None => Some(CaseStage::Ingest),
            Some(phase) => phase.next_stage(),
        }
    }

    fn has_completed(&self, stage: CaseStage) -> bool {
        self.phase
            .map(|phase| phase >= PipelinePhase::completed_by(stage))
            .unwrap_or(false)
    }

    /// Merges a stage's output.
    ///
    /// Re-applying an update identical to what the stage already wrote is a
    /// no-op. Any other write to a completed stage's slots, or an update for
    /// a stage whose predecessor has not completed, is rejected.
    pub fn apply(&mut self, update: impl Into<StageUpdate>) -> Result<()> {
        let update = update.into();
        let stage = update.stage();

        if self.has_completed(stage) {
            return if self.holds(&update) {
                Ok(())
            } else {
                Err(CaseBuilderError::SlotAlreadyFilled {
                    stage,
                    field: slot_name(stage).to_string(),
                })
            };
        }

        match self.expected_stage() {
            Some(expected) if expected == stage => {}
            Some(expected) => return Err(CaseBuilderError::OutOfOrder { expected, found: stage }),
            None => {
                return Err(CaseBuilderError::SlotAlreadyFilled {
                    stage,
                    field: slot_name(stage).to_string(),
                })
            }
        }

        match update {
            StageUpdate::Ingest(u) => self.documents = Some(u.documents),
            StageUpdate::Extract(u) => {
                self.entity = Some(u.entity);
                self.financial = Some(u.financial);
                self.insurance = Some(u.insurance);
            }
            StageUpdate::CrossReference(u) => {
                self.vessel_history = Some(u.vessel_history);
                self.company_history = Some(u.company_history);
            }
            StageUpdate::Assess(u) => self.assessment = u.assessment,
            StageUpdate::Assemble(u) => self.record = Some(u.record),
        }
        self.phase = Some(PipelinePhase::completed_by(stage));
        Ok(())
    }

    fn holds(&self, update: &StageUpdate) -> bool {
        match update {
            StageUpdate::Ingest(u) => self.documents.as_ref() == Some(&u.documents),
            StageUpdate::Extract(u) => {
                self.entity.as_ref() == Some(&u.entity)
                    && self.financial.as_ref() == Some(&u.financial)
                    && self.insurance.as_ref() == Some(&u.insurance)
            }
            StageUpdate::CrossReference(u) => {
                self.vessel_history.as_ref() == Some(&u.vessel_history)
                    && self.company_history.as_ref() == Some(&u.company_history)
            }
            StageUpdate::Assess(u) => self.assessment == u.assessment,
            StageUpdate::Assemble(u) => self.record.as_ref() == Some(&u.record),
        }
    }
}

fn slot_name(stage: CaseStage) -> &'static str {
    match stage {
        CaseStage::Ingest => "documents",
        CaseStage::Extract => "entity/financial/insurance",
        CaseStage::CrossReference => "vessel_history/company_history",
        CaseStage::Assess => "assessment",
        CaseStage::Assemble => "record",
    }
}
