use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use formsynth::ai::AzureOpenAiClient;
use formsynth::cli::{avm_command, batch_command, single_command};
use formsynth::config::{AiCredentials, SynthConfig};
use formsynth::context::RunContext;
use formsynth::logging::init_logging;
use formsynth::prompts::PromptLibrary;
use formsynth::SynthError;

#[derive(Parser)]
#[command(name = "formsynth")]
#[command(about = "Fill PDF forms and write property valuation reports with AI-generated synthetic data")]
#[command(version)]
struct Cli {
    /// Fillable PDF to generate variants for
    #[arg(long = "input_pdf")]
    input_pdf: Option<PathBuf>,

    /// Directory of fillable PDFs (takes precedence over --input_pdf)
    #[arg(long = "batch_directory")]
    batch_directory: Option<PathBuf>,

    /// Variants generated per document
    #[arg(long = "number_of_variants", default_value_t = 5)]
    number_of_variants: usize,

    /// Prompt configuration JSON
    #[arg(long = "prompt_filepath", default_value = "data/prompts.json")]
    prompt_filepath: PathBuf,

    #[arg(long = "output_directory", default_value = "output")]
    output_directory: PathBuf,

    /// Generate this many AVM reports instead of filling forms
    #[arg(long = "num_reports")]
    num_reports: Option<usize>,

    /// Skip re-reading filled PDFs to verify their values
    #[arg(long = "disable_validation")]
    disable_validation: bool,

    /// Font size of the field names drawn for label generation
    #[arg(long = "field_font_size", default_value_t = 8)]
    field_font_size: u32,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log_level")]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> Result<SynthConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = SynthConfig::load_from_file(path)?;
            config.apply_overrides(|key| std::env::var(key).ok());
            config
        }
        None => SynthConfig::load_from_env(),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

async fn run(cli: Cli, config: SynthConfig) -> Result<()> {
    if cli.num_reports.is_none() && cli.batch_directory.is_none() && cli.input_pdf.is_none() {
        return Err(SynthError::configuration(
            "one of --num_reports, --batch_directory or --input_pdf is required",
        )
        .into());
    }

    let credentials = AiCredentials::from_env()?;
    let prompts = PromptLibrary::load(&cli.prompt_filepath)?;
    let client = AzureOpenAiClient::new(
        credentials.clone(),
        Duration::from_secs(config.ai.request_timeout_secs),
    )?
    .with_truncation_margin(config.generation.truncation_margin);

    let context = RunContext::new(config, prompts, &cli.output_directory)
        .with_variants(cli.number_of_variants)
        .with_validation(!cli.disable_validation)
        .with_field_font_size(cli.field_font_size);

    if let Some(num_reports) = cli.num_reports {
        avm_command(&context, &client, &credentials, num_reports).await?;
    } else if let Some(batch_directory) = &cli.batch_directory {
        batch_command(&context, &client, &credentials, batch_directory).await?;
    } else if let Some(input_pdf) = &cli.input_pdf {
        single_command(&context, &client, &credentials, input_pdf)
            .await
            .with_context(|| format!("Failed to process {}", input_pdf.display()))?;
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _logging = init_logging(&config.logging)?;

    info!("🚀 Starting formsynth v{}", env!("CARGO_PKG_VERSION"));
    let result = run(cli, config).await;

    if let Err(e) = &result {
        match e.downcast_ref::<SynthError>() {
            Some(synth_error) => error!("{}", synth_error.user_message()),
            None => error!("{:#}", e),
        }
    }
    result
}
