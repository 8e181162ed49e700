use std::collections::BTreeMap;
use std::io::Read;

use chrono::NaiveDate;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::money::MonetaryAmount;
use crate::schema::ImoNumber;

const DEFAULT_REFERENCE_DATA: &str = include_str!("../data/reference_history.json");

pub const VESSEL_NOT_FOUND: &str = "no history found for this identifier";
pub const COMPANY_NOT_FOUND: &str = "no history found for this company";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Severity {
    #[serde(alias = "low", alias = "LOW")]
    Low,
    #[serde(alias = "medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "high", alias = "HIGH")]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ClaimStatus {
    #[serde(alias = "paid", alias = "PAID")]
    Paid,
    #[serde(alias = "open", alias = "OPEN")]
    Open,
    #[serde(alias = "pending", alias = "PENDING")]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Incident {
    pub date: NaiveDate,
    pub description: String,
    pub severity: Severity,
}

/// Who a verified claim was raised against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimSubject {
    Vessel {
        imo_number: ImoNumber,
        #[serde(default)]
        vessel_name: Option<String>,
    },
    Company {
        company_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Claim {
    pub date: NaiveDate,
    pub amount: MonetaryAmount,
    pub status: ClaimStatus,
    pub description: String,
    pub subject: ClaimSubject,
}

/// Outcome of one history query. A miss is an empty result with an
/// explanatory message, never an absent value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistoryLookupResult {
    pub incidents: Vec<Incident>,
    pub claims: Vec<Claim>,
    pub message: String,
}

impl HistoryLookupResult {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            incidents: Vec::new(),
            claims: Vec::new(),
            message: message.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty() && self.claims.is_empty()
    }
}

/// Read-only query interface over the incident/claim reference dataset.
pub trait HistoryStore: Send + Sync {
    /// Exact match on the IMO identifier.
    fn lookup_vessel(&self, imo_number: &str) -> HistoryLookupResult;

    /// Case-insensitive containment match in either direction; the first
    /// entry in store order wins.
    fn lookup_company(&self, company_name: &str) -> HistoryLookupResult;
}

#[derive(Debug, Clone, Deserialize)]
struct ReferenceClaim {
    date: NaiveDate,
    amount: MonetaryAmount,
    status: ClaimStatus,
    description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ReferenceVessel {
    imo_number: ImoNumber,
    #[serde(default)]
    vessel_name: Option<String>,
    #[serde(default)]
    incidents: Vec<Incident>,
    #[serde(default)]
    claims: Vec<ReferenceClaim>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReferenceCompany {
    name: String,
    #[serde(default)]
    incidents: Vec<Incident>,
    #[serde(default)]
    claims: Vec<ReferenceClaim>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReferenceDataset {
    #[serde(default)]
    vessels: Vec<ReferenceVessel>,
    #[serde(default)]
    companies: Vec<ReferenceCompany>,
}

/// A fixed dataset held in memory. Companies keep their file order, which
/// is the tie-break for substring matches.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryStore {
    vessels: BTreeMap<String, HistoryLookupResult>,
    companies: Vec<(String, HistoryLookupResult)>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled reference dataset.
    pub fn reference() -> Result<Self> {
        Self::from_json_str(DEFAULT_REFERENCE_DATA)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let dataset: ReferenceDataset = serde_json::from_str(json)?;
        Ok(Self::from_dataset(dataset))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let dataset: ReferenceDataset = serde_json::from_reader(reader)?;
        Ok(Self::from_dataset(dataset))
    }

    fn from_dataset(dataset: ReferenceDataset) -> Self {
        let mut store = Self::new();
        for vessel in dataset.vessels {
            let subject = ClaimSubject::Vessel {
                imo_number: vessel.imo_number.clone(),
                vessel_name: vessel.vessel_name.clone(),
            };
            store.insert_vessel(vessel.imo_number, vessel.incidents, attach(vessel.claims, &subject));
        }
        for company in dataset.companies {
            let subject = ClaimSubject::Company {
                company_name: company.name.clone(),
            };
            let claims = attach(company.claims, &subject);
            store.push_company(company.name, company.incidents, claims);
        }
        store
    }

    pub fn insert_vessel(&mut self, imo_number: ImoNumber, incidents: Vec<Incident>, claims: Vec<Claim>) {
        let message = format!(
            "history found for IMO {}: {} incident(s), {} claim(s)",
            imo_number,
            incidents.len(),
            claims.len()
        );
        self.vessels.insert(
            imo_number.as_str().to_string(),
            HistoryLookupResult {
                incidents,
                claims,
                message,
            },
        );
    }

    /// Appends a company; later entries lose substring ties to earlier ones.
    pub fn push_company(&mut self, name: impl Into<String>, incidents: Vec<Incident>, claims: Vec<Claim>) {
        let name = name.into();
        let message = format!(
            "history found for company '{}': {} incident(s), {} claim(s)",
            name,
            incidents.len(),
            claims.len()
        );
        self.companies.push((
            name,
            HistoryLookupResult {
                incidents,
                claims,
                message,
            },
        ));
    }

    pub fn company_names(&self) -> impl Iterator<Item = &str> {
        self.companies.iter().map(|(name, _)| name.as_str())
    }
}

fn attach(claims: Vec<ReferenceClaim>, subject: &ClaimSubject) -> Vec<Claim> {
    claims
        .into_iter()
        .map(|c| Claim {
            date: c.date,
            amount: c.amount,
            status: c.status,
            description: c.description,
            subject: subject.clone(),
        })
        .collect()
}

/// Containment in either direction, ignoring case.
pub fn company_names_match(query: &str, candidate: &str) -> bool {
    let query = query.trim().to_lowercase();
    let candidate = candidate.trim().to_lowercase();
    if query.is_empty() || candidate.is_empty() {
        return false;
    }
    candidate.contains(&query) || query.contains(&candidate)
}

impl HistoryStore for InMemoryHistoryStore {
    fn lookup_vessel(&self, imo_number: &str) -> HistoryLookupResult {
        match self.vessels.get(imo_number) {
            Some(result) => {
                debug!("Vessel lookup hit for {}", imo_number);
                result.clone()
            }
            None => {
                debug!("Vessel lookup miss for {}", imo_number);
                HistoryLookupResult::not_found(VESSEL_NOT_FOUND)
            }
        }
    }

    fn lookup_company(&self, company_name: &str) -> HistoryLookupResult {
        match self
            .companies
            .iter()
            .find(|(name, _)| company_names_match(company_name, name))
        {
            Some((name, result)) => {
                debug!("Company lookup for '{}' matched '{}'", company_name, name);
                result.clone()
            }
            None => {
                debug!("Company lookup miss for '{}'", company_name);
                HistoryLookupResult::not_found(COMPANY_NOT_FOUND)
            }
        }
    }
}
