use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info};

use crate::assessment::{AssessmentRequest, RiskOracle};
use crate::error::{CaseBuilderError, CaseStage, OracleError, Result};
use crate::extraction::{ExtractionOracle, ExtractionRequest};
use crate::ingestion::PdfTextReader;
use crate::llm::client::GeminiClient;
use crate::llm::prompts::{
    assessment_instructions, extraction_instructions, SYSTEM_PROMPT_EXTRACTION,
    SYSTEM_PROMPT_PDF_TRANSCRIPTION, SYSTEM_PROMPT_RISK_ASSESSMENT,
};
use crate::llm::types::{Blob, Content, GenerateContentRequest};
use crate::oracle::OraclePolicy;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// PDFs up to this size are sent inline; larger ones go through the Files API.
const INLINE_PDF_LIMIT: usize = 15 * 1024 * 1024;

pub struct GeminiExtractionOracle {
    client: GeminiClient,
    model: String,
    system_prompt: String,
}

impl GeminiExtractionOracle {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: SYSTEM_PROMPT_EXTRACTION.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn build_request(&self, request: &ExtractionRequest) -> GenerateContentRequest {
        let instructions = extraction_instructions(
            request.schema.name(),
            request.schema.description(),
            &request.text,
        );
        GenerateContentRequest::new(
            &self.system_prompt,
            vec![Content::user_text(instructions)],
            Some(request.response_schema.clone()),
            "application/json",
        )
    }
}

impl ExtractionOracle for GeminiExtractionOracle {
    async fn extract(&self, request: &ExtractionRequest) -> std::result::Result<String, OracleError> {
        self.client
            .generate(&self.model, &self.build_request(request))
            .await
    }
}

pub struct GeminiRiskOracle {
    client: GeminiClient,
    model: String,
}

impl GeminiRiskOracle {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn build_request(&self, request: &AssessmentRequest) -> GenerateContentRequest {
        GenerateContentRequest::new(
            SYSTEM_PROMPT_RISK_ASSESSMENT,
            vec![Content::user_text(assessment_instructions(&request.context.render()))],
            Some(request.response_schema.clone()),
            "application/json",
        )
    }
}

impl RiskOracle for GeminiRiskOracle {
    async fn assess(&self, request: &AssessmentRequest) -> std::result::Result<String, OracleError> {
        self.client
            .generate(&self.model, &self.build_request(request))
            .await
    }
}

/// Has the model transcribe a PDF to plain text.
pub struct GeminiPdfReader {
    client: GeminiClient,
    model: String,
    policy: OraclePolicy,
}

impl GeminiPdfReader {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            policy: OraclePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: OraclePolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn transcribe(&self, message: Content) -> std::result::Result<String, OracleError> {
        self.client
            .generate_content(
                &self.model,
                SYSTEM_PROMPT_PDF_TRANSCRIPTION,
                vec![message],
                None,
                "text/plain",
            )
            .await
    }
}

impl PdfTextReader for GeminiPdfReader {
    async fn read_pdf(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CaseBuilderError::Document {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        let prompt = format!("Transcribe \"{}\" to plain text.", display_name);

        let message = if bytes.len() <= INLINE_PDF_LIMIT {
            debug!("Sending {} inline ({} bytes)", display_name, bytes.len());
            Content::user_with_inline(
                prompt,
                Blob {
                    mime_type,
                    data: STANDARD.encode(&bytes),
                },
            )
        } else {
            let (name, mime, payload) = (&display_name, &mime_type, &bytes);
            let document = self
                .policy
                .run(CaseStage::Ingest, "pdf upload", move || {
                    self.client.upload_bytes(name, mime, payload.clone())
                })
                .await?;
            Content::user_with_document(prompt, &document)
        };

        let message = &message;
        let text = self
            .policy
            .run(CaseStage::Ingest, "pdf transcription", move || {
                self.transcribe(message.clone())
            })
            .await?;
        info!("Transcribed {} ({} characters)", display_name, text.len());
        Ok(text)
    }
}
