//! Calling external oracles: bounded retry, hard timeout, and turning their
//! raw text answers into typed records.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::error::{CaseBuilderError, CaseStage, OracleError, Result};

/// Retry and timeout budget applied to every oracle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OraclePolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for OraclePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_attempts: 2,
        }
    }
}

impl OraclePolicy {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Runs `call` until it succeeds, hits a non-transient error, or the
    /// attempt budget is spent. Each attempt is cut off after `timeout`.
    pub async fn run<F, Fut, T>(&self, stage: CaseStage, label: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, OracleError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("{} stage: calling {} (attempt {}/{})", stage, label, attempt, max_attempts);

            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    warn!("{} stage: {} failed ({}), retrying", stage, label, err);
                }
                Err(err) => {
                    return Err(CaseBuilderError::OracleFailed {
                        stage,
                        attempts: attempt,
                        source: err,
                    })
                }
            }
        }
    }
}

/// Cuts a model answer down to its outermost JSON object or array,
/// dropping markdown fences and chatter around it.
pub fn clean_json_output(raw: &str) -> String {
    let object = raw.find('{').zip(raw.rfind('}'));
    let array = raw.find('[').zip(raw.rfind(']'));

    let span = match (object, array) {
        (Some(o), Some(a)) => Some(if a.0 < o.0 { a } else { o }),
        (Some(o), None) => Some(o),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    };

    match span {
        Some((start, end)) if start <= end => raw[start..=end].to_string(),
        _ => raw.trim().to_string(),
    }
}

/// Parses an oracle answer into `T`. Anything that does not fit the schema
/// is a structural error attributed to `stage` and to the offending path
/// under `field`, e.g. `financial.premium.gross_premium`.
pub fn parse_oracle_json<T: DeserializeOwned>(stage: CaseStage, field: &str, raw: &str) -> Result<T> {
    let cleaned = clean_json_output(raw);
    let mut deserializer = serde_json::Deserializer::from_str(&cleaned);
    let value = serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        let path = e.path().to_string();
        let field = if path == "." {
            field.to_string()
        } else {
            format!("{}.{}", field, path)
        };
        CaseBuilderError::structural(stage, field, e.into_inner().to_string())
    })?;
    deserializer
        .end()
        .map_err(|e| CaseBuilderError::structural(stage, field, e.to_string()))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_clean_json_output_strips_fences() {
        let raw = "Here you go:\n```json\n{\"a\": [1, 2]}\n```";
        assert_eq!(clean_json_output(raw), "{\"a\": [1, 2]}");
        assert_eq!(clean_json_output("[{\"a\": 1}]"), "[{\"a\": 1}]");
        assert_eq!(clean_json_output("  nothing  "), "nothing");
    }

    #[test]
    fn test_parse_oracle_json_reports_field() {
        let err = parse_oracle_json::<serde_json::Value>(CaseStage::Extract, "entity", "not json")
            .unwrap_err();
        match err {
            CaseBuilderError::Structural { stage, field, .. } => {
                assert_eq!(stage, CaseStage::Extract);
                assert_eq!(field, "entity");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_oracle_json_reports_nested_path() {
        #[derive(Debug, serde::Deserialize)]
        struct Claim {
            #[allow(dead_code)]
            amount: u32,
        }
        #[derive(Debug, serde::Deserialize)]
        struct Claims {
            #[allow(dead_code)]
            claims: Vec<Claim>,
        }

        let err = parse_oracle_json::<Claims>(
            CaseStage::Extract,
            "insurance",
            r#"{"claims": [{"amount": 1}, {"amount": "lots"}]}"#,
        )
        .unwrap_err();
        match err {
            CaseBuilderError::Structural { field, .. } => {
                assert_eq!(field, "insurance.claims[1].amount");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_retry_then_success() {
        let calls = AtomicU32::new(0);
        let policy = OraclePolicy::new(Duration::from_secs(5), 2);

        let value = policy
            .run(CaseStage::Extract, "flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(OracleError::Transport("connection reset".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_fatal() {
        let calls = AtomicU32::new(0);
        let policy = OraclePolicy::new(Duration::from_millis(20), 2);

        let err = policy
            .run(CaseStage::Assess, "hanging", || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<std::result::Result<(), OracleError>>()
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match err {
            CaseBuilderError::OracleFailed { stage, attempts, source } => {
                assert_eq!(stage, CaseStage::Assess);
                assert_eq!(attempts, 2);
                assert!(matches!(source, OracleError::Timeout { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = OraclePolicy::default();

        let err = policy
            .run(CaseStage::Extract, "bad request", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(OracleError::Rejected {
                        status: 400,
                        body: "invalid schema".into(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, CaseBuilderError::OracleFailed { attempts: 1, .. }));
    }
}
