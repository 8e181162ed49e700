//! Risk assessment: builds the context handed to the risk oracle and
//! validates the narrative record it returns.

use std::fmt;
use std::future::Future;

use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{CaseBuilderError, CaseStage, OracleError, Result};
use crate::oracle::{parse_oracle_json, OraclePolicy};
use crate::schema::{response_schema_for, RiskBreakdown, RiskScore};
use crate::state::{AssessmentUpdate, CaseState};

pub const NOT_AVAILABLE: &str = "Not available";

pub const MIN_POINTS_OF_ATTENTION: usize = 3;
pub const MAX_POINTS_OF_ATTENTION: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[serde(alias = "Accept", alias = "ACCEPT")]
    Accept,
    #[serde(alias = "Reject", alias = "REJECT")]
    Reject,
    #[serde(alias = "Request More Information", alias = "Request-More-Information")]
    RequestMoreInformation,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Decision::Accept => "Accept",
            Decision::Reject => "Reject",
            Decision::RequestMoreInformation => "Request More Information",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Recommendation {
    pub decision: Decision,

    #[schemars(description = "Free-text justification for the decision")]
    pub justification: String,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.justification.trim().is_empty() {
            write!(f, "{}", self.decision)
        } else {
            write!(f, "{}: {}", self.decision, self.justification.trim())
        }
    }
}

/// The risk oracle's answer. Everything except the breakdown is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskAssessment {
    #[schemars(description = "Two to four sentence summary of the underwriting request")]
    pub request_summary: String,

    pub recommendation: Recommendation,

    #[schemars(
        description = "Overall risk from 1 to 10, 10 being highest risk. Use a neutral mid-range score when information is thin."
    )]
    pub overall_risk_score: RiskScore,

    #[schemars(description = "Three to five concrete points an underwriter should review")]
    pub points_of_attention: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Per-category scores derived from the available information")]
    pub risk_breakdown: Option<RiskBreakdown>,
}

impl RiskAssessment {
    pub fn validate(&self) -> Result<()> {
        if self.request_summary.trim().is_empty() {
            return Err(CaseBuilderError::structural(
                CaseStage::Assess,
                "request_summary",
                "summary is empty",
            ));
        }

        let points = self.points_of_attention.len();
        if !(MIN_POINTS_OF_ATTENTION..=MAX_POINTS_OF_ATTENTION).contains(&points) {
            return Err(CaseBuilderError::structural(
                CaseStage::Assess,
                "points_of_attention",
                format!(
                    "expected {}-{} points, got {}",
                    MIN_POINTS_OF_ATTENTION, MAX_POINTS_OF_ATTENTION, points
                ),
            ));
        }
        if let Some(i) = self.points_of_attention.iter().position(|p| p.trim().is_empty()) {
            return Err(CaseBuilderError::structural(
                CaseStage::Assess,
                format!("points_of_attention[{}]", i),
                "point is empty",
            ));
        }
        Ok(())
    }
}

/// Stringified case context in the fixed order the risk oracle sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentContext {
    pub company_info: String,
    pub vessel_info: String,
    pub reported_claims: String,
    pub verified_vessel_history: String,
    pub company_history: String,
    pub insurance_offer: String,
    pub agreement: String,
    pub premium: String,
}

fn stringify<T: Serialize + ?Sized>(value: Option<&T>) -> Result<String> {
    match value {
        Some(value) => Ok(serde_json::to_string_pretty(value)?),
        None => Ok(NOT_AVAILABLE.to_string()),
    }
}

fn non_empty<T>(items: &[T]) -> Option<&[T]> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

impl AssessmentContext {
    /// Missing upstream data renders as "Not available" rather than failing.
    pub fn from_state(state: &CaseState) -> Result<Self> {
        let entity = state.entity();
        let insurance = state.insurance();
        let financial = state.financial();

        Ok(Self {
            company_info: stringify(entity.and_then(|e| non_empty(&e.companies)))?,
            vessel_info: stringify(entity.and_then(|e| non_empty(&e.vessels)))?,
            reported_claims: stringify(insurance.and_then(|i| non_empty(&i.reported_claims)))?,
            verified_vessel_history: stringify(state.vessel_history().filter(|h| !h.is_empty()))?,
            company_history: stringify(state.company_history())?,
            insurance_offer: stringify(insurance.and_then(|i| i.offer.as_ref()))?,
            agreement: stringify(insurance.and_then(|i| i.agreement.as_ref()))?,
            premium: stringify(financial.and_then(|f| f.premium.as_ref()))?,
        })
    }

    pub fn sections(&self) -> [(&'static str, &str); 8] {
        [
            ("Company Information", self.company_info.as_str()),
            ("Vessel Information", self.vessel_info.as_str()),
            ("Reported Claims History", self.reported_claims.as_str()),
            ("Verified Vessel History", self.verified_vessel_history.as_str()),
            ("Company History", self.company_history.as_str()),
            ("Insurance Offer", self.insurance_offer.as_str()),
            ("Agreement", self.agreement.as_str()),
            ("Premium", self.premium.as_str()),
        ]
    }

    pub fn render(&self) -> String {
        self.sections()
            .iter()
            .map(|(title, body)| format!("## {}\n{}", title, body))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub context: AssessmentContext,
    pub response_schema: serde_json::Value,
}

impl AssessmentRequest {
    pub fn new(context: AssessmentContext) -> Result<Self> {
        Ok(Self {
            context,
            response_schema: response_schema_for::<RiskAssessment>()?,
        })
    }
}

/// Produces a narrative assessment as JSON matching [`RiskAssessment`].
pub trait RiskOracle: Send + Sync {
    fn assess(
        &self,
        request: &AssessmentRequest,
    ) -> impl Future<Output = std::result::Result<String, OracleError>> + Send;
}

/// Asks the risk oracle for an assessment of everything gathered so far.
///
/// A case with no documents has nothing to assess: the oracle is not called
/// and the assessment stays absent.
pub async fn run_assessment<R: RiskOracle>(
    state: &CaseState,
    oracle: &R,
    policy: &OraclePolicy,
) -> Result<AssessmentUpdate> {
    if state.documents().is_empty() {
        info!("No documents ingested, skipping risk assessment");
        return Ok(AssessmentUpdate { assessment: None });
    }

    let context = AssessmentContext::from_state(state)?;
    let request = AssessmentRequest::new(context)?;
    debug!("Assessment context is {} characters", request.context.render().len());

    let request = &request;
    let raw = policy
        .run(CaseStage::Assess, "risk assessment", move || oracle.assess(request))
        .await?;
    let assessment: RiskAssessment = parse_oracle_json(CaseStage::Assess, "assessment", &raw)?;
    assessment.validate()?;

    info!(
        "Risk assessment: score {}, recommendation {}",
        assessment.overall_risk_score.get(),
        assessment.recommendation.decision
    );
    Ok(AssessmentUpdate {
        assessment: Some(assessment),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{DocumentKind, RawDocument};
    use crate::schema::{EntityData, FinancialData, InsuranceData, VesselInfo};
    use crate::state::{CompanyLookup, CrossReferenceUpdate, ExtractionUpdate, IngestUpdate};
    use crate::history::HistoryLookupResult;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const VALID: &str = r#"{
        "request_summary": "Renewal of H&M cover for a single bulk carrier.",
        "recommendation": {"decision": "Request More Information", "justification": "Loss ratio not stated."},
        "overall_risk_score": 5,
        "points_of_attention": ["Missing loss ratio", "Vessel age unknown", "No survey report"]
    }"#;

    struct CannedRiskOracle {
        answer: String,
        seen: Mutex<Vec<AssessmentRequest>>,
    }

    impl CannedRiskOracle {
        fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl RiskOracle for CannedRiskOracle {
        async fn assess(&self, request: &AssessmentRequest) -> std::result::Result<String, OracleError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.answer.clone())
        }
    }

    fn cross_referenced(documents: Vec<RawDocument>, entity: EntityData) -> CaseState {
        let mut state = CaseState::new();
        state.apply(IngestUpdate { documents }).unwrap();
        state
            .apply(ExtractionUpdate {
                entity,
                financial: FinancialData::default(),
                insurance: InsuranceData::default(),
            })
            .unwrap();
        state
            .apply(CrossReferenceUpdate {
                vessel_history: BTreeMap::new(),
                company_history: CompanyLookup {
                    query: "Unknown Company".to_string(),
                    result: HistoryLookupResult::not_found("no history found for this company"),
                },
            })
            .unwrap();
        state
    }

    fn one_document() -> Vec<RawDocument> {
        vec![RawDocument::new("email.txt", DocumentKind::Text, "Please quote.")]
    }

    #[test]
    fn test_context_order_and_placeholders() {
        let state = cross_referenced(
            one_document(),
            EntityData {
                vessels: vec![VesselInfo {
                    vessel_name: Some("Nordic Star".to_string()),
                    imo_number: None,
                }],
                ..Default::default()
            },
        );
        let context = AssessmentContext::from_state(&state).unwrap();

        assert_eq!(context.company_info, NOT_AVAILABLE);
        assert!(context.vessel_info.contains("Nordic Star"));
        assert_eq!(context.verified_vessel_history, NOT_AVAILABLE);
        assert!(context.company_history.contains("Unknown Company"));

        let rendered = context.render();
        let titles: Vec<usize> = context
            .sections()
            .iter()
            .map(|(title, _)| rendered.find(&format!("## {}\n", title)).unwrap())
            .collect();
        let mut sorted = titles.clone();
        sorted.sort();
        assert_eq!(titles, sorted);

        // same state, same context
        assert_eq!(rendered, AssessmentContext::from_state(&state).unwrap().render());
    }

    #[tokio::test]
    async fn test_assessment_is_parsed_and_validated() {
        let oracle = CannedRiskOracle::new(VALID);
        let state = cross_referenced(one_document(), EntityData::default());

        let update = run_assessment(&state, &oracle, &OraclePolicy::default()).await.unwrap();
        let assessment = update.assessment.unwrap();

        assert_eq!(assessment.overall_risk_score.get(), 5);
        assert_eq!(assessment.recommendation.decision, Decision::RequestMoreInformation);
        assert_eq!(
            assessment.recommendation.to_string(),
            "Request More Information: Loss ratio not stated."
        );
        assert!(assessment.risk_breakdown.is_none());

        let seen = oracle.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].context.premium, NOT_AVAILABLE);
    }

    #[tokio::test]
    async fn test_too_few_points_is_structural() {
        let oracle = CannedRiskOracle::new(
            r#"{"request_summary": "x", "recommendation": {"decision": "accept", "justification": ""},
                "overall_risk_score": 3, "points_of_attention": ["only one"]}"#,
        );
        let state = cross_referenced(one_document(), EntityData::default());

        let err = run_assessment(&state, &oracle, &OraclePolicy::default())
            .await
            .unwrap_err();
        match err {
            CaseBuilderError::Structural { stage, field, .. } => {
                assert_eq!(stage, CaseStage::Assess);
                assert_eq!(field, "points_of_attention");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_structural() {
        let oracle = CannedRiskOracle::new(&VALID.replace("\"overall_risk_score\": 5", "\"overall_risk_score\": 12"));
        let state = cross_referenced(one_document(), EntityData::default());

        let err = run_assessment(&state, &oracle, &OraclePolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CaseBuilderError::Structural {
                stage: CaseStage::Assess,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_no_documents_skips_the_oracle() {
        let oracle = CannedRiskOracle::new(VALID);
        let state = cross_referenced(vec![], EntityData::default());

        let update = run_assessment(&state, &oracle, &OraclePolicy::default()).await.unwrap();
        assert!(update.assessment.is_none());
        assert!(oracle.seen.lock().unwrap().is_empty());
    }
}
