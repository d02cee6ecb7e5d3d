//! oncolit — gene role classification over PubMed abstracts.
//! Entry point for the command-line binary.

mod config;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use oncolit_analysis::{
    analyze_gene_literature, Analyzer, BatchOptions, BatchStrategy, GeneLiteratureOutcome,
    GeneLiteratureRequest, PromptStyle,
};
use oncolit_common::{LoggingContext, LoggingSettings};
use oncolit_ingestion::sources::pubmed::PubMedClient;
use tracing::info;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "oncolit", version, about = "Classify a gene's role in cancer from PubMed abstracts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search PubMed for a gene and analyse every abstract found.
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Target gene symbol, e.g. PPP2R2A
    gene: String,

    /// PubMed query [default: "<GENE>[Title/Abstract] AND cancer[Title/Abstract]"]
    #[arg(long)]
    query: Option<String>,

    /// Maximum number of articles [default: pubmed.retmax]
    #[arg(long, value_name = "N")]
    max_results: Option<usize>,

    /// Model name [default: llm.model]
    #[arg(long)]
    model: Option<String>,

    #[arg(long, value_name = "simple|detailed")]
    prompt_style: Option<PromptStyle>,

    /// Concurrent model calls [default: analysis.max_concurrent]
    #[arg(long, value_name = "C")]
    max_concurrent: Option<usize>,

    #[arg(long, value_name = "chunked|windowed")]
    strategy: Option<BatchStrategy>,

    /// Earliest publication date, YYYY/MM/DD
    #[arg(long)]
    date_from: Option<String>,

    /// Latest publication date, YYYY/MM/DD
    #[arg(long)]
    date_to: Option<String>,

    /// Report directory [default: analysis.save_dir]
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Do not write a report file
    #[arg(long, conflicts_with = "save_dir")]
    no_save: bool,

    /// Show DEBUG logs on the console
    #[arg(short, long)]
    verbose: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn make_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message("analysing");
    pb
}

fn build_request(args: &AnalyzeArgs, config: &Config, progress: Option<ProgressBar>) -> GeneLiteratureRequest {
    let mut batch = BatchOptions::new(args.max_concurrent.unwrap_or(config.analysis.max_concurrent))
        .with_strategy(args.strategy.unwrap_or(config.analysis.strategy));
    batch.progress = progress;

    let mut request = GeneLiteratureRequest::new(args.gene.trim())
        .with_max_results(args.max_results.unwrap_or(config.pubmed.retmax))
        .with_date_range(args.date_from.clone(), args.date_to.clone())
        .with_batch_options(batch)
        .with_save_dir(args.save_dir.clone().unwrap_or_else(|| config.analysis.save_dir.clone()));
    if let Some(query) = &args.query {
        request = request.with_query(query.clone());
    }
    if args.no_save {
        request = request.without_save();
    }
    request
}

fn print_summary(outcome: &GeneLiteratureOutcome) {
    println!("Gene:     {}", outcome.gene);
    println!("Query:    {}", outcome.search_query);
    println!("Analysed: {}/{} articles", outcome.analyzed_articles, outcome.total_articles);

    if let Some(stats) = outcome.summary.stats() {
        let roles = &stats.role_distribution;
        let quality = &stats.quality_metrics;
        println!("Cancer types ({}): {}", stats.unique_cancer_types, stats.cancer_types_found.join(", "));
        println!(
            "Roles:    tumor_suppressor={} oncogene={} both={} unclear={}",
            roles.tumor_suppressor, roles.oncogene, roles.both, roles.unclear
        );
        println!(
            "High confidence: {} ({}%)  Needs full text: {} ({}%)",
            quality.high_confidence_count,
            quality.high_confidence_percentage,
            quality.needs_full_text_count,
            quality.needs_full_text_percentage
        );
    }
    if let Some(path) = &outcome.output_file {
        println!("Saved to: {}", path.display());
    }
}

async fn analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let mut logging = LoggingContext::new();
    logging.configure(LoggingSettings::from_env(args.verbose), false)?;
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let backend = config.build_backend(args.model.as_deref());
    let analyzer = Analyzer::new(backend)
        .with_config(config.analyzer_config(args.model.clone(), args.prompt_style));
    let source = PubMedClient::new(config.pubmed_config()?)?;

    let progress = (!args.no_progress).then(make_progress_bar);
    let request = build_request(&args, &config, progress.clone());

    let outcome = analyze_gene_literature(&request, &source, &analyzer).await;
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    print_summary(&outcome?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    match Cli::parse().command {
        Command::Analyze(args) => analyze(args).await,
    }
}
