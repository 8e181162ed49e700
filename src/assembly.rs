//! Merges every stage's output into the final [`CaseRecord`].
//!
//! Field sources, first available wins:
//! - agreement, premium, loss ratio, reinsurance, contacts: extraction, else
//!   the zero-value default
//! - risk breakdown: extraction if it states any score, else the
//!   assessment's derived breakdown, else unset
//! - objects: one `{name, identifier}` pair per extracted vessel
//! - summary, recommendation, score, points of attention: assessment only

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{debug, info};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::assessment::Recommendation;
use crate::error::{CaseBuilderError, CaseStage, Result};
use crate::history::HistoryLookupResult;
use crate::money::MonetaryAmount;
use crate::schema::{
    Agreement, Contact, ImoNumber, LossRatio, Premium, Reinsurance, ReportedClaim, RiskBreakdown,
    RiskScore, VesselInfo,
};
use crate::state::{AssemblyUpdate, CaseState, CompanyLookup};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgreementTerms {
    pub id: Option<String>,
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub products: Vec<String>,
    pub our_share: Option<String>,
    pub installments: Option<u32>,
    pub conditions: Option<String>,
}

/// An insured item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaseObject {
    pub name: Option<String>,
    pub identifier: Option<ImoNumber>,
}

impl From<&VesselInfo> for CaseObject {
    fn from(vessel: &VesselInfo) -> Self {
        Self {
            name: vessel.vessel_name.clone(),
            identifier: vessel.imo_number.clone(),
        }
    }
}

/// A broker-reported claim with its date parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VesselClaim {
    pub vessel_name: Option<String>,
    pub imo_number: Option<ImoNumber>,
    pub date: Option<NaiveDate>,
    pub amount: Option<MonetaryAmount>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaseRecord {
    pub agreement: AgreementTerms,
    pub premium: Premium,
    pub loss_ratio: LossRatio,
    pub risk_breakdown: Option<RiskBreakdown>,
    pub reinsurance: Reinsurance,
    pub contacts: Vec<Contact>,
    pub objects: Vec<CaseObject>,
    pub reported_vessel_claims: Vec<VesselClaim>,
    /// Keyed by IMO number.
    pub verified_vessel_history: BTreeMap<String, HistoryLookupResult>,
    pub company_history: CompanyLookup,
    pub overall_risk_score: Option<RiskScore>,
    pub request_summary: Option<String>,
    pub recommendation: Option<Recommendation>,
    pub points_of_attention: Option<Vec<String>>,
}

impl CaseRecord {
    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = SchemaSettings::draft07()
            .into_generator()
            .into_root_schema_for::<CaseRecord>();
        serde_json::to_string_pretty(&schema)
    }
}

/// Parses a date as written by the extraction oracle. Blank means absent.
pub fn parse_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .map(Some)
        .ok_or_else(|| {
            CaseBuilderError::structural(
                CaseStage::Assemble,
                field,
                format!("'{}' is not a valid date (expected YYYY-MM-DD)", raw),
            )
        })
}

fn agreement_terms(agreement: Option<&Agreement>) -> Result<AgreementTerms> {
    let Some(agreement) = agreement else {
        return Ok(AgreementTerms::default());
    };
    let validity = agreement.validity.as_ref();

    Ok(AgreementTerms {
        id: agreement.id.clone(),
        name: agreement.name.clone(),
        start_date: parse_date(
            "agreement.validity.start_date",
            validity.and_then(|v| v.start_date.as_deref()),
        )?,
        end_date: parse_date(
            "agreement.validity.end_date",
            validity.and_then(|v| v.end_date.as_deref()),
        )?,
        products: agreement.products.clone(),
        our_share: agreement.our_share.clone(),
        installments: agreement.installments,
        conditions: agreement.conditions.clone(),
    })
}

fn vessel_claims(claims: &[ReportedClaim]) -> Result<Vec<VesselClaim>> {
    claims
        .iter()
        .enumerate()
        .map(|(i, claim)| {
            Ok(VesselClaim {
                vessel_name: claim.vessel_name.clone(),
                imo_number: claim.imo_number.clone(),
                date: parse_date(&format!("reported_claims[{}].date", i), claim.date.as_deref())?,
                amount: claim.amount,
                description: claim.description.clone(),
            })
        })
        .collect()
}

fn non_empty_breakdown(breakdown: Option<&RiskBreakdown>) -> Option<&RiskBreakdown> {
    breakdown.filter(|b| !b.is_empty())
}

/// Builds the case record from whatever the earlier stages produced.
///
/// Only malformed structural data (currently: dates) fails assembly;
/// missing upstream data yields defaults. The result depends only on the
/// state, so re-running on an unchanged state gives an identical record.
pub fn assemble(state: &CaseState) -> Result<AssemblyUpdate> {
    let entity = state.entity();
    let financial = state.financial();
    let insurance = state.insurance();
    let assessment = state.assessment();

    let agreement = agreement_terms(insurance.and_then(|i| i.agreement.as_ref()))?;
    let reported_vessel_claims = vessel_claims(insurance.map(|i| i.reported_claims.as_slice()).unwrap_or(&[]))?;

    let extracted_breakdown = non_empty_breakdown(insurance.and_then(|i| i.risk_breakdown.as_ref()));
    let derived_breakdown = non_empty_breakdown(assessment.and_then(|a| a.risk_breakdown.as_ref()));
    let risk_breakdown = match (extracted_breakdown, derived_breakdown) {
        (Some(extracted), _) => {
            debug!("Using risk breakdown stated in the documents");
            Some(extracted.clone())
        }
        (None, Some(derived)) => {
            debug!("Using risk breakdown derived by the assessment");
            Some(derived.clone())
        }
        (None, None) => None,
    };

    let record = CaseRecord {
        agreement,
        premium: financial.and_then(|f| f.premium.clone()).unwrap_or_default(),
        loss_ratio: financial.and_then(|f| f.loss_ratio.clone()).unwrap_or_default(),
        risk_breakdown,
        reinsurance: insurance.and_then(|i| i.reinsurance.clone()).unwrap_or_default(),
        contacts: entity.map(|e| e.contacts.clone()).unwrap_or_default(),
        objects: entity
            .map(|e| e.vessels.iter().map(CaseObject::from).collect())
            .unwrap_or_default(),
        reported_vessel_claims,
        verified_vessel_history: state.vessel_history().cloned().unwrap_or_default(),
        company_history: state.company_history().cloned().unwrap_or_default(),
        overall_risk_score: assessment.map(|a| a.overall_risk_score),
        request_summary: assessment.map(|a| a.request_summary.clone()),
        recommendation: assessment.map(|a| a.recommendation.clone()),
        points_of_attention: assessment.map(|a| a.points_of_attention.clone()),
    };

    info!(
        "Assembled case record: {} object(s), {} contact(s), {} verified vessel(s)",
        record.objects.len(),
        record.contacts.len(),
        record.verified_vessel_history.len()
    );
    Ok(AssemblyUpdate { record })
}
