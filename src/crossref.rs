use std::collections::BTreeMap;

use log::{debug, info};

use crate::history::{HistoryLookupResult, HistoryStore};
use crate::schema::EntityData;
use crate::state::{CaseState, CompanyLookup, CrossReferenceUpdate};

pub const UNKNOWN_COMPANY: &str = "Unknown Company";

/// Distinct IMO numbers in order of first appearance.
pub fn distinct_vessel_ids(entity: &EntityData) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for imo in entity.vessels.iter().filter_map(|v| v.imo_number.as_ref()) {
        if !ids.iter().any(|seen| seen == imo.as_str()) {
            ids.push(imo.as_str().to_string());
        }
    }
    ids
}

/// The first company candidate with a usable name, or `fallback`.
pub fn best_guess_company(entity: &EntityData, fallback: &str) -> String {
    entity
        .companies
        .iter()
        .filter_map(|c| c.company_name.as_deref())
        .map(str::trim)
        .find(|name| !name.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Looks up every distinct extracted vessel and the best-guess company.
///
/// Missing extraction output is treated as "nothing extracted": no vessel
/// lookups, and the company lookup runs for `unknown_company`.
pub fn run_cross_reference<S: HistoryStore + ?Sized>(
    state: &CaseState,
    store: &S,
    unknown_company: &str,
) -> CrossReferenceUpdate {
    let empty = EntityData::default();
    let entity = state.entity().unwrap_or(&empty);

    let mut vessel_history: BTreeMap<String, HistoryLookupResult> = BTreeMap::new();
    for imo in distinct_vessel_ids(entity) {
        let result = store.lookup_vessel(&imo);
        debug!("IMO {}: {}", imo, result.message);
        vessel_history.insert(imo, result);
    }

    let query = best_guess_company(entity, unknown_company);
    let result = store.lookup_company(&query);
    info!(
        "Cross-referenced {} vessel(s); company '{}': {}",
        vessel_history.len(),
        query,
        result.message
    );

    CrossReferenceUpdate {
        vessel_history,
        company_history: CompanyLookup { query, result },
    }
}
