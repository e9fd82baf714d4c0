//! ratingscan - read a disability-rating decision letter and print the
//! extracted conditions as JSON.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use ratingscan::{
    build_processor, config, init_tracing, ExtractionEvent, ExtractionOptions, PipelineConfig,
};

#[derive(Parser)]
#[command(name = "ratingscan")]
#[command(about = "Extract rated and denied conditions from a rating decision letter")]
#[command(version)]
struct Cli {
    /// PDF, JPEG or PNG file to read
    file: PathBuf,

    /// Declared MIME type (detected from the file contents when omitted)
    #[arg(long)]
    media_type: Option<String>,

    /// Combined rating stated elsewhere, checked against the extracted conditions
    #[arg(long)]
    combined_rating: Option<u8>,

    /// Number of pages to OCR concurrently (default: 1)
    #[arg(long)]
    page_workers: Option<usize>,

    /// Run the OCR strategies of each page concurrently
    #[arg(long)]
    parallel_strategies: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let mut pipeline = PipelineConfig::from_env();
    if let Some(workers) = cli.page_workers {
        pipeline = pipeline.with_page_workers(workers);
    }
    if cli.parallel_strategies {
        pipeline = pipeline.with_parallel_strategies(true);
    }

    let processor =
        build_processor(pipeline).context("Failed to initialise the extraction pipeline")?;

    let options = ExtractionOptions {
        declared_media_type: cli.media_type,
        combined_rating: cli.combined_rating,
        ..Default::default()
    };

    let progress: &dyn Fn(ExtractionEvent) = &|event| match serde_json::to_string(&event) {
        Ok(json) => tracing::info!(event = %json, "Progress"),
        Err(e) => tracing::warn!(error = %e, "Unserializable progress event"),
    };

    let outcome = processor
        .process_file(&cli.file, &options, Some(progress))
        .with_context(|| format!("Failed to extract {}", cli.file.display()))?;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{json}");

    Ok(())
}
