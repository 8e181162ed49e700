//! # Maritime Case Builder
//!
//! Assembles a structured underwriting case record for maritime insurance
//! from a bundle of broker documents (PDF transcriptions, plain text,
//! spreadsheets).
//!
//! ## Pipeline
//!
//! Five stages run in a fixed order over one [`CaseState`]:
//!
//! - **Ingest**: a [`DocumentSource`] resolves input paths to raw text
//! - **Extract**: an [`ExtractionOracle`] fills the entity, financial and
//!   insurance schemas; amounts are normalized to base currency units
//! - **Cross-reference**: every distinct IMO number and the best-guess company
//!   are looked up in a [`HistoryStore`]
//! - **Assess**: a [`RiskOracle`] produces the narrative, score and points of
//!   attention
//! - **Assemble**: [`assemble`] merges everything into a [`CaseRecord`]
//!
//! Each stage returns a typed update; [`CaseState::apply`] rejects updates
//! that arrive out of order or try to rewrite another stage's output.
//!
//! ## Example
//!
//! ```rust,ignore
//! use maritime_case_builder::*;
//!
//! let pipeline = CasePipeline::new(
//!     FileDocumentSource::new(),
//!     my_extraction_oracle,
//!     my_risk_oracle,
//!     InMemoryHistoryStore::reference()?,
//! );
//! let inputs = DocumentInputs {
//!     text_paths: vec!["broker_email.txt".into()],
//!     spreadsheet_paths: vec!["fleet.csv".into()],
//!     ..Default::default()
//! };
//! let record = pipeline.run(&inputs).await?;
//! println!("{}", serde_json::to_string_pretty(&record)?);
//! ```
//!
//! With the `gemini` feature, [`llm`] provides oracles backed by the Gemini API.

pub mod assembly;
pub mod assessment;
pub mod config;
pub mod crossref;
pub mod error;
pub mod extraction;
pub mod history;
pub mod ingestion;
pub mod money;
pub mod oracle;
pub mod pipeline;
pub mod schema;
pub mod state;

#[cfg(feature = "gemini")]
pub mod llm;

pub use assembly::{assemble, parse_date, AgreementTerms, CaseObject, CaseRecord, VesselClaim};
pub use assessment::{
    run_assessment, AssessmentContext, AssessmentRequest, Decision, Recommendation, RiskAssessment,
    RiskOracle,
};
pub use config::PipelineConfig;
pub use crossref::{best_guess_company, distinct_vessel_ids, run_cross_reference, UNKNOWN_COMPANY};
pub use error::{CaseBuilderError, CaseStage, OracleError, Result};
pub use extraction::{run_extraction, ExtractionOracle, ExtractionRequest};
pub use history::*;
pub use ingestion::*;
pub use money::{normalize_amount, AmountError, MonetaryAmount};
pub use oracle::OraclePolicy;
pub use pipeline::CasePipeline;
pub use schema::*;
pub use state::*;
