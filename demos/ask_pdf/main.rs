//! # Ask a PDF
//!
//! Loads a PDF into a [`Session`], then answers each question given on the
//! command line, printing the answer and the passages it was based on.
//!
//! Both models run locally and are downloaded from the HuggingFace Hub on
//! first use. Set `STUDYMATE_CONFIG` to a JSON file to override settings.
//!
//! Run: `cargo run --example ask_pdf -- notes.pdf "What is the main topic?"`

use anyhow::{Context, bail};
use studymate::telemetry::init_logging;
use studymate::{AskOutcome, QaPipeline, Session, StudyMateConfig};
use tracing::info;

fn main() -> anyhow::Result<()> {
    init_logging("info");

    let mut args = std::env::args().skip(1);
    let Some(pdf) = args.next() else {
        bail!("usage: ask_pdf <file.pdf> <question>...");
    };
    let questions: Vec<String> = args.collect();

    // -- 1. Configure ---------------------------------------------------------
    let config = match std::env::var("STUDYMATE_CONFIG") {
        Ok(path) => StudyMateConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        Err(_) => StudyMateConfig::default(),
    };
    info!(
        embedding_model = %config.embedding_model,
        generator_model = %config.generator.model_id,
        top_k = config.top_k,
        "starting"
    );

    // -- 2. Load the document -------------------------------------------------
    let mut session = Session::new(QaPipeline::from_config(config)?);
    let bytes = std::fs::read(&pdf).with_context(|| format!("failed to read {pdf}"))?;
    let outcome = session.upload(&pdf, &bytes);
    println!("{}", outcome.message());
    if !outcome.is_ready() {
        return Ok(());
    }

    // -- 3. Ask ---------------------------------------------------------------
    for question in &questions {
        println!("\nQ: {question}");
        match session.ask(question) {
            AskOutcome::Warning(warning) => println!("{warning}"),
            AskOutcome::Failed(error) => println!("Error: {error}"),
            AskOutcome::Answered(answer) => {
                println!("A: {}", answer.text);
                for source in &answer.sources {
                    println!("  [{} | {:.3}] {}", source.position, source.score, source.passage);
                }
            }
        }
    }

    Ok(())
}
