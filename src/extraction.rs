use std::future::Future;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{CaseStage, OracleError, Result};
use crate::ingestion::concatenate_documents;
use crate::oracle::{parse_oracle_json, OraclePolicy};
use crate::schema::{EntityData, ExtractionSchema, FinancialData, InsuranceData, SchemaKind};
use crate::state::{CaseState, ExtractionUpdate};

/// One request to the extraction oracle: the full case text plus the shape
/// the answer must take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub schema: SchemaKind,
    pub response_schema: serde_json::Value,
    pub text: String,
}

impl ExtractionRequest {
    pub fn new(schema: SchemaKind, text: impl Into<String>) -> Result<Self> {
        Ok(Self {
            schema,
            response_schema: schema.response_schema()?,
            text: text.into(),
        })
    }
}

/// Turns text into a best-effort JSON instance of the requested schema.
///
/// Implementations must return amounts in base currency units and leave
/// out fields they cannot find rather than inventing zeros.
pub trait ExtractionOracle: Send + Sync {
    fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> impl Future<Output = std::result::Result<String, OracleError>> + Send;
}

async fn extract_record<T, O>(oracle: &O, policy: &OraclePolicy, text: &str) -> Result<T>
where
    T: ExtractionSchema,
    O: ExtractionOracle,
{
    let request = ExtractionRequest::new(T::KIND, text)?;
    let request = &request;
    let raw = policy
        .run(CaseStage::Extract, T::KIND.name(), move || oracle.extract(request))
        .await?;
    let record = parse_oracle_json::<T>(CaseStage::Extract, T::KIND.name(), &raw)?;
    debug!("Extracted {} record", T::KIND);
    Ok(record)
}

/// Runs the three schema extractions over the concatenated documents.
///
/// With `concurrent` set the three calls are in flight together; results
/// are still checked in entity, financial, insurance order so the reported
/// failure does not depend on completion order.
pub async fn run_extraction<O: ExtractionOracle>(
    state: &CaseState,
    oracle: &O,
    policy: &OraclePolicy,
    concurrent: bool,
) -> Result<ExtractionUpdate> {
    let documents = state.documents();
    if documents.is_empty() {
        info!("No documents ingested, skipping extraction");
        return Ok(ExtractionUpdate {
            entity: EntityData::default(),
            financial: FinancialData::default(),
            insurance: InsuranceData::default(),
        });
    }

    let text = concatenate_documents(documents);
    info!(
        "Extracting from {} document(s), {} characters",
        documents.len(),
        text.len()
    );

    let (entity, financial, insurance) = if concurrent {
        let (entity, financial, insurance) = futures::future::join3(
            extract_record::<EntityData, O>(oracle, policy, &text),
            extract_record::<FinancialData, O>(oracle, policy, &text),
            extract_record::<InsuranceData, O>(oracle, policy, &text),
        )
        .await;
        (entity?, financial?, insurance?)
    } else {
        let entity = extract_record::<EntityData, O>(oracle, policy, &text).await?;
        let financial = extract_record::<FinancialData, O>(oracle, policy, &text).await?;
        let insurance = extract_record::<InsuranceData, O>(oracle, policy, &text).await?;
        (entity, financial, insurance)
    };

    info!(
        "Extraction found {} company candidate(s), {} vessel(s), {} contact(s)",
        entity.companies.len(),
        entity.vessels.len(),
        entity.contacts.len()
    );

    Ok(ExtractionUpdate {
        entity,
        financial,
        insurance,
    })
}
