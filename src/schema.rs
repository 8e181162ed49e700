//! Typed shapes requested from the extraction oracle.
//!
//! Every field is individually optional: the oracle returns whatever it can
//! find and leaves the rest out. Amounts go through [`MonetaryAmount`]'s
//! deserializer, so scale tokens are multiplied out at this boundary.

use std::fmt;

use schemars::gen::{SchemaGenerator, SchemaSettings};
use schemars::schema::{
    InstanceType, Metadata, NumberValidation, RootSchema, Schema, SchemaObject,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::money::{self, MonetaryAmount};

/// Null and missing lists both mean "nothing found".
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A seven-digit IMO ship identification number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct ImoNumber(String);

impl ImoNumber {
    /// Accepts "9123456", "IMO 9123456" and "IMO9123456".
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let without_prefix = trimmed
            .strip_prefix("IMO")
            .or_else(|| trimmed.strip_prefix("imo"))
            .unwrap_or(trimmed)
            .trim_start_matches([' ', ':', '.'])
            .trim();

        if without_prefix.len() == 7 && without_prefix.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(without_prefix.to_string()))
        } else {
            Err(format!(
                "invalid IMO number '{}': expected exactly 7 digits",
                raw
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImoNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ImoNumber> for String {
    fn from(imo: ImoNumber) -> Self {
        imo.0
    }
}

impl<'de> Deserialize<'de> for ImoNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Number(number) => number.to_string(),
        };
        ImoNumber::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Blank identifiers mean "not stated"; anything else must be a valid IMO.
fn optional_imo<'de, D>(deserializer: D) -> Result<Option<ImoNumber>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(value) => ImoNumber::deserialize(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl JsonSchema for ImoNumber {
    fn schema_name() -> String {
        "ImoNumber".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            metadata: Some(Box::new(Metadata {
                description: Some(
                    "The vessel's 7-digit IMO number, digits only (e.g. '9123456').".to_string(),
                ),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

/// A category score in [1, 10]; 10 is the highest risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct RiskScore(u8);

impl RiskScore {
    pub fn new(score: u8) -> Result<Self, String> {
        if (1..=10).contains(&score) {
            Ok(Self(score))
        } else {
            Err(format!("risk score {} is outside 1-10", score))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for RiskScore {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let score = u8::try_from(value).map_err(|_| format!("risk score {} is outside 1-10", value))?;
        RiskScore::new(score)
    }
}

impl JsonSchema for RiskScore {
    fn schema_name() -> String {
        "RiskScore".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::Integer.into()),
            number: Some(Box::new(NumberValidation {
                minimum: Some(1.0),
                maximum: Some(10.0),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

impl From<RiskScore> for u8 {
    fn from(score: RiskScore) -> Self {
        score.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskBreakdown {
    #[serde(default)]
    #[schemars(description = "Technical condition of the insured vessels (1-10, 10 = highest risk)")]
    pub technical_condition: Option<RiskScore>,

    #[serde(default)]
    #[schemars(description = "Operational quality of the shipowner (1-10)")]
    pub operational_quality: Option<RiskScore>,

    #[serde(default)]
    #[schemars(description = "Crew quality and training (1-10)")]
    pub crew_quality: Option<RiskScore>,

    #[serde(default)]
    #[schemars(description = "Management and technical management quality (1-10)")]
    pub management_quality: Option<RiskScore>,

    #[serde(default)]
    #[schemars(description = "Claims history (1-10)")]
    pub claims_history: Option<RiskScore>,

    #[serde(default)]
    #[schemars(description = "Financial stability of the company (1-10)")]
    pub financial_stability: Option<RiskScore>,
}

impl RiskBreakdown {
    /// True when no category carries a score.
    pub fn is_empty(&self) -> bool {
        self.technical_condition.is_none()
            && self.operational_quality.is_none()
            && self.crew_quality.is_none()
            && self.management_quality.is_none()
            && self.claims_history.is_none()
            && self.financial_stability.is_none()
    }
}

// ---------------------------------------------------------------------------
// Entity schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompanyInfo {
    #[serde(default)]
    #[schemars(description = "The legal name of the shipping company (the assured)")]
    pub company_name: Option<String>,

    #[serde(default)]
    #[schemars(description = "Company identifier or registration number, if stated")]
    pub company_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VesselInfo {
    #[serde(default)]
    #[schemars(description = "The name of the vessel as written in the documents")]
    pub vessel_name: Option<String>,

    #[serde(default, deserialize_with = "optional_imo")]
    pub imo_number: Option<ImoNumber>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Contact {
    #[serde(default)]
    #[schemars(description = "Full name of the contact person")]
    pub name: Option<String>,

    #[serde(default)]
    #[schemars(description = "Role, e.g. 'Broker', 'Claims Handler', 'Account Manager'")]
    pub role: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityData {
    #[serde(default, deserialize_with = "nullable_vec")]
    #[schemars(
        description = "Every company candidate in order of first appearance. The assured company first if it can be identified."
    )]
    pub companies: Vec<CompanyInfo>,

    #[serde(default, deserialize_with = "nullable_vec")]
    #[schemars(description = "Every vessel mentioned, in order of first appearance. Do not deduplicate.")]
    pub vessels: Vec<VesselInfo>,

    #[serde(default, deserialize_with = "nullable_vec")]
    #[schemars(description = "Contact persons (brokers, handlers, managers) found in the documents")]
    pub contacts: Vec<Contact>,
}

// ---------------------------------------------------------------------------
// Financial schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Premium {
    #[serde(default, deserialize_with = "money::deserialize_optional")]
    #[schemars(description = "Gross premium in base currency units")]
    pub gross_premium: Option<MonetaryAmount>,

    #[serde(default)]
    #[schemars(description = "Brokerage as a percentage, e.g. 15 for 15%")]
    pub brokerage_percent: Option<f64>,

    #[serde(default, deserialize_with = "money::deserialize_optional")]
    #[schemars(description = "Net premium after brokerage in base currency units")]
    pub net_premium: Option<MonetaryAmount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LossRatio {
    #[serde(default)]
    #[schemars(description = "Loss ratio as a percentage, e.g. 57 for 57%")]
    pub value_percent: Option<f64>,

    #[serde(default, deserialize_with = "money::deserialize_optional")]
    #[schemars(description = "Claims amount the loss ratio is based on")]
    pub claims: Option<MonetaryAmount>,

    #[serde(default, deserialize_with = "money::deserialize_optional")]
    #[schemars(description = "Premium amount the loss ratio is based on")]
    pub premium: Option<MonetaryAmount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialData {
    #[serde(default)]
    pub premium: Option<Premium>,

    #[serde(default)]
    pub loss_ratio: Option<LossRatio>,
}

// ---------------------------------------------------------------------------
// Insurance schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Validity {
    #[serde(default)]
    #[schemars(description = "Inception date in YYYY-MM-DD format")]
    pub start_date: Option<String>,

    #[serde(default)]
    #[schemars(description = "Expiry date in YYYY-MM-DD format")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Agreement {
    #[serde(default)]
    #[schemars(description = "Agreement or contract reference, e.g. '231454-01-R1'")]
    pub id: Option<String>,

    #[serde(default)]
    #[schemars(description = "Agreement name, e.g. 'Third Party Vessels'")]
    pub name: Option<String>,

    #[serde(default)]
    pub validity: Option<Validity>,

    #[serde(default, deserialize_with = "nullable_vec")]
    #[schemars(description = "Insurance products covered, e.g. 'H&M', 'LOH', 'WAR'")]
    pub products: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Our share of the risk as written, e.g. '100%'")]
    pub our_share: Option<String>,

    #[serde(default)]
    #[schemars(description = "Number of premium installments")]
    pub installments: Option<u32>,

    #[serde(default)]
    #[schemars(description = "Governing conditions, e.g. 'Nordic Plan'")]
    pub conditions: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InsuranceOffer {
    #[serde(default)]
    #[schemars(description = "Percentage of the total insurance being offered to us")]
    pub coverage_percentage: Option<f64>,

    #[serde(default, deserialize_with = "money::deserialize_optional")]
    #[schemars(description = "Offered premium in base currency units")]
    pub premium_amount: Option<MonetaryAmount>,

    #[serde(default)]
    #[schemars(description = "Type of cover, e.g. 'Hull & Machinery'")]
    pub coverage_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Reinsurance {
    #[serde(default, deserialize_with = "money::deserialize_optional")]
    #[schemars(description = "Net amount ceded to treaty (TTY)")]
    pub net_tty: Option<MonetaryAmount>,

    #[serde(default, deserialize_with = "money::deserialize_optional")]
    #[schemars(description = "Net amount ceded facultatively (FAC)")]
    pub net_fac: Option<MonetaryAmount>,

    #[serde(default, deserialize_with = "money::deserialize_optional")]
    #[schemars(description = "Net retention kept on our own account")]
    pub net_retention: Option<MonetaryAmount>,

    #[serde(default)]
    #[schemars(description = "Reinsurance commission as a percentage")]
    pub commission_percent: Option<f64>,
}

/// A claim as reported by the broker, before verification against history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReportedClaim {
    #[serde(default)]
    pub vessel_name: Option<String>,

    #[serde(default, deserialize_with = "optional_imo")]
    pub imo_number: Option<ImoNumber>,

    #[serde(default)]
    #[schemars(description = "Claim date in YYYY-MM-DD format")]
    pub date: Option<String>,

    #[serde(default, deserialize_with = "money::deserialize_optional")]
    pub amount: Option<MonetaryAmount>,

    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InsuranceData {
    #[serde(default)]
    pub agreement: Option<Agreement>,

    #[serde(default)]
    pub offer: Option<InsuranceOffer>,

    #[serde(default)]
    pub reinsurance: Option<Reinsurance>,

    #[serde(default, deserialize_with = "nullable_vec")]
    #[schemars(description = "Claims history as reported in the submission, in document order")]
    pub reported_claims: Vec<ReportedClaim>,

    #[serde(default)]
    #[schemars(
        description = "Per-category risk scores ONLY if the documents state them explicitly. Omit otherwise."
    )]
    pub risk_breakdown: Option<RiskBreakdown>,
}

// ---------------------------------------------------------------------------
// Schema plumbing
// ---------------------------------------------------------------------------

/// The three shapes requested from the extraction oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Entity,
    Financial,
    Insurance,
}

impl SchemaKind {
    pub const ALL: [SchemaKind; 3] = [SchemaKind::Entity, SchemaKind::Financial, SchemaKind::Insurance];

    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::Entity => "entity",
            SchemaKind::Financial => "financial",
            SchemaKind::Insurance => "insurance",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SchemaKind::Entity => "company, vessel and contact identity",
            SchemaKind::Financial => "premium figures and loss ratio",
            SchemaKind::Insurance => "agreement terms, offer, reinsurance, reported claims and stated risk scores",
        }
    }

    pub fn response_schema(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            SchemaKind::Entity => response_schema_for::<EntityData>(),
            SchemaKind::Financial => response_schema_for::<FinancialData>(),
            SchemaKind::Insurance => response_schema_for::<InsuranceData>(),
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Generates a self-contained JSON schema (no `$ref`, `$schema` or
/// `definitions`) suitable as a structured-output response schema.
pub fn response_schema_for<T: JsonSchema>() -> serde_json::Result<serde_json::Value> {
    let generator = SchemaSettings::openapi3()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator();
    clean_schema(generator.into_root_schema_for::<T>())
}

pub fn clean_schema(root: RootSchema) -> serde_json::Result<serde_json::Value> {
    let mut value = serde_json::to_value(root)?;
    strip_keys(&mut value);
    Ok(value)
}

fn strip_keys(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.remove("$schema");
            map.remove("definitions");
            map.remove("format");
            for child in map.values_mut() {
                strip_keys(child);
            }
        }
        serde_json::Value::Array(items) => {
            for child in items {
                strip_keys(child);
            }
        }
        _ => {}
    }
}

/// Implemented by the three extraction records so the extraction stage can
/// treat them uniformly.
pub trait ExtractionSchema: DeserializeOwned + Default {
    const KIND: SchemaKind;
}

impl ExtractionSchema for EntityData {
    const KIND: SchemaKind = SchemaKind::Entity;
}

impl ExtractionSchema for FinancialData {
    const KIND: SchemaKind = SchemaKind::Financial;
}

impl ExtractionSchema for InsuranceData {
    const KIND: SchemaKind = SchemaKind::Insurance;
}
