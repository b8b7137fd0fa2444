//! Markdown Translator CLI - Command line tool for translating Markdown documents.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use md_translator_core::{
    BatchProgress, JobKind, ProgressRecord, Provider, Workbench, WorkbenchConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderOption {
    OpenAi,
    Anthropic,
    Ollama,
    Custom,
}

impl From<ProviderOption> for Provider {
    fn from(opt: ProviderOption) -> Self {
        match opt {
            ProviderOption::OpenAi => Self::OpenAi,
            ProviderOption::Anthropic => Self::Anthropic,
            ProviderOption::Ollama => Self::Ollama,
            ProviderOption::Custom => Self::Custom,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "md-translate")]
#[command(author, version, about = "Translate Markdown documents", long_about = None)]
struct Args {
    /// Input Markdown file
    #[arg(required_unless_present = "load_progress")]
    input: Option<PathBuf>,

    /// Output text file (default: input-translated.txt)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// LLM provider
    #[arg(short, long, value_enum, default_value = "custom")]
    provider: ProviderOption,

    /// API base URL (default depends on provider)
    #[arg(long, env = "MD_TRANSLATOR_API_BASE")]
    api_base: Option<String>,

    /// API key
    #[arg(long, env = "MD_TRANSLATOR_API_KEY")]
    api_key: Option<String>,

    /// Model name
    #[arg(long, env = "MD_TRANSLATOR_MODEL", default_value = "default_model")]
    model: String,

    /// Override the translate prompt template ({{text}} is replaced with
    /// the paragraph)
    #[arg(long)]
    translate_prompt: Option<String>,

    /// Override the proofread prompt template ({{text}} and {{translation}}
    /// are replaced)
    #[arg(long)]
    proofread_prompt: Option<String>,

    /// Proofread existing translations instead of translating
    #[arg(long)]
    proofread: bool,

    /// Delay between paragraphs in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Neighboring paragraphs passed as context on each side
    #[arg(long)]
    context: Option<usize>,

    /// Disable streamed responses
    #[arg(long)]
    no_stream: bool,

    /// Resume from a saved progress file instead of parsing Markdown
    #[arg(long)]
    load_progress: Option<PathBuf>,

    /// Save progress to this file after the run
    #[arg(long)]
    save_progress: Option<PathBuf>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        WorkbenchConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        WorkbenchConfig::load()
    };

    // Override config with CLI arguments
    config.client.provider = args.provider.into();
    if args.api_base.is_some() {
        config.client.api_base = args.api_base.clone();
    }
    if args.api_key.is_some() {
        config.client.api_key = args.api_key.clone();
    }
    config.client.model = args.model.clone();
    if args.no_stream {
        config.client.stream = false;
    }
    if let Some(prompt) = args.translate_prompt.clone() {
        config.translate_prompt = prompt;
    }
    if let Some(prompt) = args.proofread_prompt.clone() {
        config.proofread_prompt = prompt;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.batch_delay_ms = delay_ms;
    }
    if let Some(context) = args.context {
        config.context_window = context;
    }

    let workbench = Arc::new(Workbench::new(config));

    // Load input (saved progress takes precedence over Markdown)
    let unit_count = if let Some(progress_path) = &args.load_progress {
        let content = std::fs::read_to_string(progress_path)
            .context(format!("Failed to read progress: {}", progress_path.display()))?;
        let records: Vec<ProgressRecord> =
            serde_json::from_str(&content).context("Failed to parse progress file")?;
        info!("Resuming from {}", progress_path.display());
        workbench.load_progress(&records)
    } else {
        // required_unless_present guarantees the input is set here
        #[allow(clippy::expect_used)]
        let input = args.input.as_ref().expect("input argument required");
        let content = std::fs::read_to_string(input)
            .context(format!("Failed to read input: {}", input.display()))?;
        workbench.load_document(&content)
    };

    if unit_count == 0 {
        anyhow::bail!("No translatable paragraphs found");
    }
    info!("Document has {} units", unit_count);

    let kind = if args.proofread {
        JobKind::Proofread
    } else {
        JobKind::Translate
    };

    // Ctrl-C requests a cooperative stop: the in-flight paragraph drains,
    // the rest are skipped, and progress can still be saved
    {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Stop requested, finishing current paragraph");
                workbench.request_stop();
            }
        });
    }

    // Setup progress bar
    let planned = workbench
        .units()
        .iter()
        .filter(|u| u.needs_work())
        .count();
    #[allow(clippy::cast_possible_truncation)]
    let pb = ProgressBar::new(planned as u64);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    #[allow(clippy::cast_possible_truncation)]
    let on_progress = |progress: BatchProgress| {
        pb.set_position(progress.completed as u64);
        pb.set_message(format!("Paragraph {}", progress.unit_id + 1));
    };

    let report = workbench
        .run_batch(kind, None, Some(&on_progress))
        .await
        .context("Batch run failed to start")?;

    if report.stopped {
        pb.abandon_with_message("Stopped early");
    } else {
        pb.finish_with_message(format!("{kind} complete"));
    }

    for (unit_id, error) in &report.failed {
        warn!("Paragraph {} failed: {}", unit_id + 1, error);
    }

    // Save progress
    if let Some(progress_path) = &args.save_progress {
        let json = serde_json::to_string_pretty(&workbench.progress())
            .context("Failed to serialize progress")?;
        std::fs::write(progress_path, json)
            .context(format!("Failed to write progress: {}", progress_path.display()))?;
        info!("Progress saved to {}", progress_path.display());
    }

    // Determine output path
    let output_path = args.output.unwrap_or_else(|| {
        args.input.as_ref().map_or_else(
            || PathBuf::from("translated.txt"),
            |input| {
                let stem = input
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("output");
                input.with_file_name(format!("{stem}-translated.txt"))
            },
        )
    });

    // Save output
    std::fs::write(&output_path, workbench.export_text())
        .context(format!("Failed to write output: {}", output_path.display()))?;

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!(
            "Translated {} of {} paragraphs; output saved to: {}",
            report.completed,
            report.attempted,
            output_path.display()
        );
    }

    Ok(())
}
