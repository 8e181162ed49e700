use std::future::Future;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{CaseBuilderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Text,
    Spreadsheet,
}

/// Plain text of one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub name: String,
    pub kind: DocumentKind,
    pub text: String,
}

impl RawDocument {
    pub fn new(name: impl Into<String>, kind: DocumentKind, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            text: text.into(),
        }
    }
}

/// The three path lists a case is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInputs {
    #[serde(default)]
    pub pdf_paths: Vec<PathBuf>,
    #[serde(default)]
    pub text_paths: Vec<PathBuf>,
    #[serde(default)]
    pub spreadsheet_paths: Vec<PathBuf>,
}

impl DocumentInputs {
    pub fn is_empty(&self) -> bool {
        self.pdf_paths.is_empty() && self.text_paths.is_empty() && self.spreadsheet_paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pdf_paths.len() + self.text_paths.len() + self.spreadsheet_paths.len()
    }
}

/// Resolves input paths to raw text, one document per file, in PDF, text,
/// spreadsheet order.
pub trait DocumentSource: Send + Sync {
    fn load(&self, inputs: &DocumentInputs) -> impl Future<Output = Result<Vec<RawDocument>>> + Send;
}

/// Turns a PDF into plain text.
pub trait PdfTextReader: Send + Sync {
    fn read_pdf(&self, path: &Path) -> impl Future<Output = Result<String>> + Send;
}

/// Placeholder reader for sources configured without PDF support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPdfReader;

impl PdfTextReader for NoPdfReader {
    async fn read_pdf(&self, path: &Path) -> Result<String> {
        Err(CaseBuilderError::Document {
            path: path.to_path_buf(),
            reason: "no PDF reader configured".to_string(),
        })
    }
}

/// Reads text and CSV files from disk; PDFs go through the injected reader.
#[derive(Debug, Clone, Default)]
pub struct FileDocumentSource<P = NoPdfReader> {
    pdf_reader: P,
}

impl FileDocumentSource<NoPdfReader> {
    pub fn new() -> Self {
        Self {
            pdf_reader: NoPdfReader,
        }
    }
}

impl<P: PdfTextReader> FileDocumentSource<P> {
    pub fn with_pdf_reader(pdf_reader: P) -> Self {
        Self { pdf_reader }
    }
}

impl<P: PdfTextReader> DocumentSource for FileDocumentSource<P> {
    async fn load(&self, inputs: &DocumentInputs) -> Result<Vec<RawDocument>> {
        let mut documents = Vec::with_capacity(inputs.len());

        for path in &inputs.pdf_paths {
            let text = self.pdf_reader.read_pdf(path).await?;
            documents.push(RawDocument::new(display_name(path), DocumentKind::Pdf, text));
        }

        for path in &inputs.text_paths {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| document_error(path, e))?;
            documents.push(RawDocument::new(display_name(path), DocumentKind::Text, text));
        }

        for path in &inputs.spreadsheet_paths {
            let text = read_spreadsheet(path).await?;
            documents.push(RawDocument::new(
                display_name(path),
                DocumentKind::Spreadsheet,
                text,
            ));
        }

        info!("Loaded {} document(s)", documents.len());
        Ok(documents)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

fn document_error(path: &Path, err: impl std::fmt::Display) -> CaseBuilderError {
    CaseBuilderError::Document {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

async fn read_spreadsheet(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" | "tsv" => {
            let bytes = tokio::fs::read(path).await.map_err(|e| document_error(path, e))?;
            let delimiter = if extension == "tsv" { b'\t' } else { b',' };
            csv_to_text(&bytes, delimiter).map_err(|e| document_error(path, e))
        }
        other => Err(document_error(
            path,
            format!(
                "unsupported spreadsheet format '{}': export the sheet as CSV",
                other
            ),
        )),
    }
}

/// Renders CSV rows as tab-separated lines.
pub fn csv_to_text(bytes: &[u8], delimiter: u8) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<&str> = record.iter().map(str::trim).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        lines.push(cells.join("\t"));
    }
    debug!("Rendered {} spreadsheet row(s)", lines.len());
    Ok(lines.join("\n"))
}

/// Joins documents into the single context string sent to the oracles.
/// Each document is introduced by a header naming it.
pub fn concatenate_documents(documents: &[RawDocument]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("### Document {}: {}\n{}", i, doc.name, doc.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
