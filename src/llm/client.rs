use crate::error::OracleError;
use crate::llm::types::*;
use log::debug;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_UPLOAD_URL: &str = "https://generativelanguage.googleapis.com/upload/v1beta/files";

/// How many times an uploaded file's processing state is polled before giving up.
const MAX_STATE_POLLS: u32 = 60;
const STATE_POLL_INTERVAL: Duration = Duration::from_secs(2);

type OracleResult<T> = std::result::Result<T, OracleError>;

fn transport(err: reqwest::Error) -> OracleError {
    OracleError::Transport(err.to_string())
}

fn malformed(what: &str) -> OracleError {
    OracleError::Transport(format!("malformed Gemini response: {}", what))
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Points the client at another endpoint, e.g. a local proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Uploads through the resumable Files API and waits until the file is ACTIVE.
    pub async fn upload_bytes(
        &self,
        display_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> OracleResult<RemoteDocument> {
        let file_size = bytes.len();
        let start_url = format!("{}?key={}", GEMINI_UPLOAD_URL, self.api_key);
        let metadata = json!({ "file": { "display_name": display_name } });

        let init_res = self
            .client
            .post(&start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", file_size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .header("Content-Type", "application/json")
            .json(&metadata)
            .send()
            .await
            .map_err(transport)?;

        let init_status = init_res.status();
        if !init_status.is_success() {
            let body = init_res.text().await.map_err(transport)?;
            return Err(OracleError::Rejected {
                status: init_status.as_u16(),
                body,
            });
        }

        let upload_url = init_res
            .headers()
            .get("x-goog-upload-url")
            .ok_or_else(|| malformed("no upload URL in headers"))?
            .to_str()
            .map_err(|e| malformed(&e.to_string()))?
            .to_string();

        let upload_res = self
            .client
            .post(&upload_url)
            .header("Content-Length", file_size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;

        let upload_status = upload_res.status();
        if !upload_status.is_success() {
            let body = upload_res.text().await.map_err(transport)?;
            return Err(OracleError::Rejected {
                status: upload_status.as_u16(),
                body,
            });
        }

        let upload_body: serde_json::Value = upload_res.json().await.map_err(transport)?;
        let file_obj = upload_body
            .get("file")
            .ok_or_else(|| malformed("upload response missing 'file'"))?;

        let uri = file_obj
            .get("uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| malformed("upload response missing uri"))?
            .to_string();

        let name = file_obj
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| malformed("upload response missing name"))?
            .to_string();

        let mut state = file_obj
            .get("state")
            .and_then(|v| v.as_str())
            .unwrap_or("PROCESSING")
            .to_string();

        let mut polls = 0;
        while state != "ACTIVE" {
            if polls >= MAX_STATE_POLLS {
                return Err(OracleError::Timeout {
                    timeout_ms: (STATE_POLL_INTERVAL * MAX_STATE_POLLS).as_millis() as u64,
                });
            }
            polls += 1;
            sleep(STATE_POLL_INTERVAL).await;

            let check_url = format!("{}/{}?key={}", self.base_url, name, self.api_key);
            let check_res = self.client.get(&check_url).send().await.map_err(transport)?;
            let check_json: serde_json::Value = check_res.json().await.map_err(transport)?;
            let file_obj = check_json.get("file").unwrap_or(&check_json);
            state = file_obj
                .get("state")
                .and_then(|v| v.as_str())
                .unwrap_or("PROCESSING")
                .to_string();

            if state == "FAILED" {
                return Err(OracleError::Rejected {
                    status: 422,
                    body: format!("Gemini failed to process {}", display_name),
                });
            }
        }
        debug!("Uploaded {} as {}", display_name, name);

        Ok(RemoteDocument {
            uri,
            name,
            display_name: display_name.to_string(),
            mime_type: mime_type.to_string(),
            state,
        })
    }

    /// One `generateContent` call; returns the first candidate's text.
    pub async fn generate_content(
        &self,
        model: &str,
        system_prompt: &str,
        messages: Vec<Content>,
        response_schema: Option<serde_json::Value>,
        response_mime_type: &str,
    ) -> OracleResult<String> {
        let payload =
            GenerateContentRequest::new(system_prompt, messages, response_schema, response_mime_type);
        self.generate(model, &payload).await
    }

    /// Sends a prepared request to `model`.
    pub async fn generate(&self, model: &str, payload: &GenerateContentRequest) -> OracleResult<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let res = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;
        let status = res.status();

        if !status.is_success() {
            let body = res.text().await.map_err(transport)?;
            return Err(OracleError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateContentResponse = res.json().await.map_err(transport)?;
        body.first_text().ok_or(OracleError::EmptyResponse)
    }
}
