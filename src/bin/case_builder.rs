//! Builds one underwriting case record from a bundle of broker documents.
//!
//! ```bash
//! GEMINI_API_KEY=... case-builder \
//!     --pdf submission.pdf --text broker_email.txt --spreadsheet fleet.csv \
//!     --output case.json
//! ```
//!
//! Logging is controlled by `RUST_LOG` (default `info`) and goes to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use maritime_case_builder::llm::{
    GeminiClient, GeminiExtractionOracle, GeminiPdfReader, GeminiRiskOracle, DEFAULT_MODEL,
};
use maritime_case_builder::{
    CaseBuilderError, CasePipeline, CaseRecord, DocumentInputs, FileDocumentSource,
    InMemoryHistoryStore, PipelineConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "case-builder",
    about = "Assemble a maritime underwriting case record from source documents"
)]
struct Args {
    /// PDF document (repeatable).
    #[arg(long = "pdf")]
    pdf_paths: Vec<PathBuf>,

    /// Plain-text document such as a broker email (repeatable).
    #[arg(long = "text")]
    text_paths: Vec<PathBuf>,

    /// Spreadsheet exported as CSV or TSV (repeatable).
    #[arg(long = "spreadsheet")]
    spreadsheet_paths: Vec<PathBuf>,

    /// JSON pipeline configuration; CASE_BUILDER_* variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gemini model used for every oracle call.
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Write the record here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the case record JSON schema and exit.
    #[arg(long, default_value_t = false)]
    print_schema: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig, CaseBuilderError> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

async fn run(args: Args) -> Result<(), CaseBuilderError> {
    let config = load_config(args.config.as_ref())?;
    let api_key = std::env::var("GEMINI_API_KEY")
        .map_err(|_| CaseBuilderError::Config("GEMINI_API_KEY must be set".to_string()))?;
    let client = GeminiClient::new(api_key);

    let source = FileDocumentSource::with_pdf_reader(
        GeminiPdfReader::new(client.clone(), &args.model).with_policy(config.policy()),
    );
    let pipeline = CasePipeline::new(
        source,
        GeminiExtractionOracle::new(client.clone(), &args.model),
        GeminiRiskOracle::new(client, &args.model),
        InMemoryHistoryStore::reference()?,
    )
    .with_config(config);

    let inputs = DocumentInputs {
        pdf_paths: args.pdf_paths,
        text_paths: args.text_paths,
        spreadsheet_paths: args.spreadsheet_paths,
    };
    let record = pipeline.run(&inputs).await?;
    let json = serde_json::to_string_pretty(&record)?;

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, json).await?;
            log::info!("Wrote case record to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    if args.print_schema {
        return match CaseRecord::schema_as_json() {
            Ok(schema) => {
                println!("{}", schema);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    init_tracing();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.stage() {
                Some(stage) => eprintln!("error: {} stage failed: {}", stage, e),
                None => eprintln!("error: {}", e),
            }
            ExitCode::FAILURE
        }
    }
}
