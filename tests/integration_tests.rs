use maritime_case_builder::*;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Extraction oracle that answers every schema from a fixed table.
struct ScriptedExtraction {
    answers: HashMap<SchemaKind, String>,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl ScriptedExtraction {
    fn new(entity: &str, financial: &str, insurance: &str) -> Self {
        let answers = [
            (SchemaKind::Entity, entity.to_string()),
            (SchemaKind::Financial, financial.to_string()),
            (SchemaKind::Insurance, insurance.to_string()),
        ]
        .into_iter()
        .collect();
        Self {
            answers,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn empty() -> Self {
        Self::new("{}", "{}", "{}")
    }

    fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ExtractionOracle for ScriptedExtraction {
    async fn extract(&self, request: &ExtractionRequest) -> std::result::Result<String, OracleError> {
        self.requests.lock().unwrap().push(request.clone());
        self.answers
            .get(&request.schema)
            .cloned()
            .ok_or(OracleError::EmptyResponse)
    }
}

struct ScriptedRisk {
    answer: String,
    requests: Mutex<Vec<AssessmentRequest>>,
}

impl ScriptedRisk {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl RiskOracle for ScriptedRisk {
    async fn assess(&self, request: &AssessmentRequest) -> std::result::Result<String, OracleError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.answer.clone())
    }
}

/// Risk oracle that never answers.
struct SilentRisk;

impl RiskOracle for SilentRisk {
    async fn assess(&self, _request: &AssessmentRequest) -> std::result::Result<String, OracleError> {
        std::future::pending::<()>().await;
        Err(OracleError::EmptyResponse)
    }
}

const ASSESSMENT_WITHOUT_BREAKDOWN: &str = r#"{
    "request_summary": "H&M renewal for SeaWay Carriers covering one general cargo vessel.",
    "recommendation": {"decision": "accept", "justification": "Claims are small and fully paid."},
    "overall_risk_score": 4,
    "points_of_attention": [
        "Two claims on Nordic Star in the last five years",
        "Loss ratio reported at 57%",
        "Confirm class status before binding"
    ]
}"#;

const ASSESSMENT_WITH_BREAKDOWN: &str = r#"{
    "request_summary": "H&M renewal for SeaWay Carriers covering one general cargo vessel.",
    "recommendation": {"decision": "Request More Information", "justification": "No survey report."},
    "overall_risk_score": 6,
    "points_of_attention": ["Fire in cargo hold 2023", "Piracy attempt 2021", "High severity history"],
    "risk_breakdown": {
        "technical_condition": 6, "operational_quality": 5, "crew_quality": 5,
        "management_quality": 4, "claims_history": 8, "financial_stability": 3
    }
}"#;

fn text_document(name: &str, text: &str) -> RawDocument {
    RawDocument::new(name, DocumentKind::Text, text)
}

fn broker_email() -> Vec<RawDocument> {
    vec![text_document(
        "broker_email.txt",
        "Dear underwriter, please quote H&M for SeaWay Carriers, MV Nordic Star (IMO 9123456). \
         Gross premium USD 2.5M, brokerage 15%.",
    )]
}

fn pipeline<E: ExtractionOracle, R: RiskOracle>(
    extraction: E,
    risk: R,
) -> CasePipeline<FileDocumentSource, E, R, InMemoryHistoryStore> {
    CasePipeline::new(
        FileDocumentSource::new(),
        extraction,
        risk,
        InMemoryHistoryStore::reference().unwrap(),
    )
}

#[tokio::test]
async fn test_zero_documents_yield_default_record() {
    let pipeline = pipeline(ScriptedExtraction::empty(), ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN));

    let record = pipeline.run(&DocumentInputs::default()).await.unwrap();

    assert_eq!(record.agreement, AgreementTerms::default());
    assert_eq!(record.premium, Premium::default());
    assert_eq!(record.loss_ratio, LossRatio::default());
    assert_eq!(record.reinsurance, Reinsurance::default());
    assert!(record.contacts.is_empty());
    assert!(record.objects.is_empty());
    assert!(record.verified_vessel_history.is_empty());
    assert!(record.risk_breakdown.is_none());
    assert!(record.request_summary.is_none());
    assert!(record.recommendation.is_none());
    assert!(record.overall_risk_score.is_none());
    assert!(record.points_of_attention.is_none());

    assert_eq!(record.company_history.query, UNKNOWN_COMPANY);
    assert_eq!(record.company_history.result.message, COMPANY_NOT_FOUND);
}

#[tokio::test]
async fn test_verified_vessel_history_is_attached() {
    let extraction = ScriptedExtraction::new(
        r#"{"companies": [{"company_name": "SeaWay Carriers"}],
            "vessels": [{"vessel_name": "Nordic Star", "imo_number": "IMO 9123456"}]}"#,
        r#"{"premium": {"gross_premium": "2.5M", "brokerage_percent": 15}}"#,
        r#"{"reported_claims": [
              {"vessel_name": "Nordic Star", "imo_number": "9123456", "date": "2022-05-16", "amount": "25K"},
              {"vessel_name": "Nordic Star", "imo_number": "9123456", "date": "2020-11-10", "amount": "USD 75,000"}
           ]}"#,
    );
    let pipeline = pipeline(extraction, ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN));

    let record = pipeline.run_with_documents(broker_email()).await.unwrap();

    let verified = &record.verified_vessel_history["9123456"];
    assert_eq!(verified.incidents.len(), 2);
    assert_eq!(verified.claims.len(), 2);
    let verified_amounts: Vec<f64> = verified.claims.iter().map(|c| c.amount.value()).collect();
    assert_eq!(verified_amounts, vec![25_000.0, 75_000.0]);

    let reported_amounts: Vec<f64> = record
        .reported_vessel_claims
        .iter()
        .map(|c| c.amount.unwrap().value())
        .collect();
    assert_eq!(reported_amounts, verified_amounts);

    assert_eq!(record.premium.gross_premium.unwrap().value(), 2_500_000.0);
    assert_eq!(record.objects.len(), 1);
    assert_eq!(record.objects[0].identifier.as_ref().unwrap().as_str(), "9123456");
    assert_eq!(record.company_history.result.claims.len(), 3);
    assert_eq!(record.overall_risk_score.map(|s| s.get()), Some(4));
}

#[tokio::test]
async fn test_extracted_breakdown_used_verbatim() {
    let extraction = ScriptedExtraction::new(
        "{}",
        "{}",
        r#"{"risk_breakdown": {
              "technical_condition": 2, "operational_quality": 3, "crew_quality": 2,
              "management_quality": 3, "claims_history": 4, "financial_stability": 2
           }}"#,
    );
    let pipeline = pipeline(extraction, ScriptedRisk::new(ASSESSMENT_WITH_BREAKDOWN));

    let record = pipeline.run_with_documents(broker_email()).await.unwrap();
    let breakdown = record.risk_breakdown.unwrap();

    let scores: Vec<u8> = [
        breakdown.technical_condition,
        breakdown.operational_quality,
        breakdown.crew_quality,
        breakdown.management_quality,
        breakdown.claims_history,
        breakdown.financial_stability,
    ]
    .iter()
    .map(|s| s.unwrap().get())
    .collect();
    assert_eq!(scores, vec![2, 3, 2, 3, 4, 2]);
}

#[tokio::test]
async fn test_derived_breakdown_used_when_none_extracted() {
    let pipeline = pipeline(
        ScriptedExtraction::empty(),
        ScriptedRisk::new(ASSESSMENT_WITH_BREAKDOWN),
    );

    let record = pipeline.run_with_documents(broker_email()).await.unwrap();
    let breakdown = record.risk_breakdown.unwrap();

    assert_eq!(breakdown.claims_history.unwrap().get(), 8);
    assert_eq!(breakdown.financial_stability.unwrap().get(), 3);
    assert_eq!(
        record.recommendation.unwrap().decision,
        Decision::RequestMoreInformation
    );
}

#[tokio::test]
async fn test_company_prefix_matches_reference_entry() {
    let extraction = ScriptedExtraction::new(
        r#"{"companies": [{"company_name": "Sea"}, {"company_name": "Bergen Shipping Company"}]}"#,
        "{}",
        "{}",
    );
    let pipeline = pipeline(extraction, ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN));

    let record = pipeline.run_with_documents(broker_email()).await.unwrap();

    assert_eq!(record.company_history.query, "Sea");
    assert!(record.company_history.result.message.contains("SeaWay Carriers"));
    assert_eq!(record.company_history.result.incidents.len(), 3);
}

#[tokio::test]
async fn test_risk_context_is_deterministic() {
    let entity = r#"{"companies": [{"company_name": "SeaWay Carriers"}],
                     "vessels": [{"vessel_name": "Cargo Express", "imo_number": "9345678"},
                                 {"vessel_name": "Nordic Star", "imo_number": "9123456"}]}"#;

    let first = pipeline(
        ScriptedExtraction::new(entity, "{}", "{}"),
        ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN),
    );
    let second = pipeline(
        ScriptedExtraction::new(entity, "{}", "{}"),
        ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN),
    );
    let record_a = first.run_with_documents(broker_email()).await.unwrap();
    let record_b = second.run_with_documents(broker_email()).await.unwrap();

    let context_a = first.risk_oracle().requests.lock().unwrap()[0].context.render();
    let context_b = second.risk_oracle().requests.lock().unwrap()[0].context.render();
    assert_eq!(context_a, context_b);
    assert!(context_a.contains("Fire in cargo hold"));
    assert!(context_a.find("## Company Information").unwrap() < context_a.find("## Premium").unwrap());

    assert_eq!(
        serde_json::to_string(&record_a).unwrap(),
        serde_json::to_string(&record_b).unwrap()
    );
}

#[tokio::test]
async fn test_assembly_is_idempotent_on_final_state() {
    let extraction = ScriptedExtraction::new(
        r#"{"vessels": [{"vessel_name": "Nordic Star", "imo_number": "9123456"}]}"#,
        r#"{"loss_ratio": {"value_percent": 57, "claims": "1.05M", "premium": "1.838M"}}"#,
        r#"{"agreement": {"id": "231454-01-R1", "validity": {"start_date": "2024-01-01", "end_date": "2024-12-31"}}}"#,
    );
    let pipeline = pipeline(extraction, ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN));

    let state = pipeline.run_to_state(broker_email()).await.unwrap();
    let again = assemble(&state).unwrap().record;

    assert_eq!(
        serde_json::to_string(state.record().unwrap()).unwrap(),
        serde_json::to_string(&again).unwrap()
    );

    let mut state = state;
    state.apply(AssemblyUpdate { record: again }).unwrap();
    assert_eq!(state.phase(), Some(PipelinePhase::Assembled));
}

#[tokio::test]
async fn test_malformed_amount_fails_extract_stage() {
    let extraction = ScriptedExtraction::new(
        "{}",
        r#"{"premium": {"gross_premium": "-2.5M"}}"#,
        "{}",
    );
    let risk = ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN);
    let pipeline = pipeline(extraction, risk);

    let err = pipeline.run_with_documents(broker_email()).await.unwrap_err();

    assert_eq!(err.stage(), Some(CaseStage::Extract));
    assert!(matches!(err, CaseBuilderError::Structural { ref field, .. } if field == "financial.premium.gross_premium"));
    assert_eq!(pipeline.risk_oracle().call_count(), 0);
}

#[tokio::test]
async fn test_malformed_date_fails_assemble_stage() {
    let extraction = ScriptedExtraction::new(
        "{}",
        "{}",
        r#"{"agreement": {"validity": {"start_date": "first of January"}}}"#,
    );
    let pipeline = pipeline(extraction, ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN));

    let err = pipeline.run_with_documents(broker_email()).await.unwrap_err();
    match err {
        CaseBuilderError::Structural { stage, field, .. } => {
            assert_eq!(stage, CaseStage::Assemble);
            assert_eq!(field, "agreement.validity.start_date");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_hanging_risk_oracle_times_out() {
    let config = PipelineConfig {
        timeout_secs: 1,
        max_attempts: 2,
        ..Default::default()
    };
    let pipeline = pipeline(ScriptedExtraction::empty(), SilentRisk).with_config(config);

    let started = tokio::time::Instant::now();
    let err = pipeline.run_with_documents(broker_email()).await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        CaseBuilderError::OracleFailed {
            stage,
            attempts,
            source,
        } => {
            assert_eq!(stage, CaseStage::Assess);
            assert_eq!(attempts, 2);
            assert_eq!(source, OracleError::Timeout { timeout_ms: 1000 });
        }
        other => panic!("unexpected error {:?}", other),
    }
    // two attempts of one (virtual) second each
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(3));
}

#[tokio::test]
async fn test_sequential_and_concurrent_extraction_agree() {
    let entity = r#"{"vessels": [{"vessel_name": "A", "imo_number": "9345678"}, {"vessel_name": "B"}]}"#;
    let financial = r#"{"premium": {"gross_premium": 1838274, "net_premium": "1.56M"}}"#;

    let sequential = pipeline(
        ScriptedExtraction::new(entity, financial, "{}"),
        ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN),
    )
    .with_config(PipelineConfig {
        concurrent_oracle_calls: false,
        ..Default::default()
    });
    let concurrent = pipeline(
        ScriptedExtraction::new(entity, financial, "{}"),
        ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN),
    );

    let a = sequential.run_with_documents(broker_email()).await.unwrap();
    let b = concurrent.run_with_documents(broker_email()).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(sequential.extraction_oracle().call_count(), 3);
    assert_eq!(concurrent.extraction_oracle().call_count(), 3);
}

#[tokio::test]
async fn test_end_to_end_from_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let email_path = dir.path().join("broker_email.txt");
    let fleet_path = dir.path().join("fleet.csv");
    std::fs::File::create(&email_path)?
        .write_all(b"Please quote H&M for Bergen Shipping Company.")?;
    std::fs::File::create(&fleet_path)?
        .write_all(b"Vessel,IMO,Sum insured\nCargo Express,9345678,40000000\n")?;

    let extraction = ScriptedExtraction::new(
        r#"{"companies": [{"company_name": "Bergen Shipping Company"}],
            "vessels": [{"vessel_name": "Cargo Express", "imo_number": 9345678}],
            "contacts": [{"name": "Kari Nordmann", "role": "Broker", "email": "kari@example.com"}]}"#,
        "{}",
        "{}",
    );
    let pipeline = pipeline(extraction, ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN));
    let inputs = DocumentInputs {
        pdf_paths: vec![],
        text_paths: vec![email_path],
        spreadsheet_paths: vec![fleet_path],
    };

    let record = pipeline.run(&inputs).await?;

    let requests = pipeline.extraction_oracle().requests.lock().unwrap().clone();
    assert!(requests[0].text.contains("### Document 0: broker_email.txt"));
    assert!(requests[0].text.contains("### Document 1: fleet.csv"));
    assert!(requests[0].text.contains("Cargo Express\t9345678\t40000000"));

    assert_eq!(record.contacts[0].role.as_deref(), Some("Broker"));
    assert_eq!(record.verified_vessel_history["9345678"].claims.len(), 3);
    assert_eq!(record.company_history.result.incidents.len(), 2);

    let json = serde_json::to_string_pretty(&record)?;
    println!("Assembled record:\n{}", json);
    Ok(())
}

#[tokio::test]
async fn test_missing_input_file_fails_ingest() {
    let pipeline = pipeline(ScriptedExtraction::empty(), ScriptedRisk::new(ASSESSMENT_WITHOUT_BREAKDOWN));
    let inputs = DocumentInputs {
        text_paths: vec!["does/not/exist.txt".into()],
        ..Default::default()
    };

    let err = pipeline.run(&inputs).await.unwrap_err();
    assert_eq!(err.stage(), Some(CaseStage::Ingest));
    assert_eq!(pipeline.extraction_oracle().call_count(), 0);
}
