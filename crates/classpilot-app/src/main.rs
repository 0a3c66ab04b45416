use std::{fs, path::Path, process, sync::Arc};

use classpilot_app::cli::{Cli, Commands, GenerateArgs, PromptArgs, RenderArgs};
use classpilot_app::config::{self, AppConfig};
use classpilot_app::error::AppError;
use classpilot_app::prompts::{self, SYSTEM_INSTRUCTION};
use classpilot_app::render;
use classpilot_app::services::{
    AssistService, CompletionClient, JobTracker, OpenAiCompletionClient, spawn_sweeper,
};
use classpilot_server::{DocumentKind, FormContext};
use tokio::sync::watch;
use tracing_subscriber::{filter::LevelFilter, fmt};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Serve(_)) => {
            let config = config::load()?;
            run_serve(config).await?;
        }
        Some(Commands::Prompt(args)) => {
            run_prompt(args)?;
        }
        Some(Commands::Render(args)) => {
            run_render(args)?;
        }
        Some(Commands::Generate(args)) => {
            let config = config::load()?;
            run_generate(config, args).await?;
        }
        None => {
            Cli::print_help();
        }
    }

    Ok(())
}

async fn run_serve(config: AppConfig) -> Result<(), AppError> {
    let api_key = config.resolve_api_key()?;
    let client = OpenAiCompletionClient::new(config.completion_settings(api_key))?;
    let tracker = Arc::new(JobTracker::new());
    let service = AssistService::new(
        Arc::clone(&tracker),
        Arc::new(client),
        config.completion.model.as_str(),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(Arc::clone(&tracker), config.sweeper(), stop_rx);

    tracing::info!(
        model = %config.completion.model,
        retention_secs = config.jobs.retention_secs,
        "starting classpilot"
    );
    let served = classpilot_server::serve(config.server.clone(), Arc::new(service)).await;

    if stop_tx.send(true).is_err() {
        tracing::debug!("sweeper already stopped");
    }
    if let Err(error) = sweeper.await {
        tracing::warn!(%error, "sweeper task ended abnormally");
    }

    let discarded = tracker.clear();
    tracing::info!(discarded, "request table cleared");

    served?;
    Ok(())
}

fn run_prompt(args: PromptArgs) -> Result<(), AppError> {
    let form = read_form(&args.form)?;
    let prompt = prompts::build_prompt(args.kind.into(), &form)?;
    println!("{prompt}");
    Ok(())
}

fn run_render(args: RenderArgs) -> Result<(), AppError> {
    let text = read_text(&args.input)?;
    let report = render::parse(args.kind.into(), &text);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_generate(config: AppConfig, args: GenerateArgs) -> Result<(), AppError> {
    let kind: DocumentKind = args.kind.into();
    let form = read_form(&args.form)?;
    let prompt = prompts::build_prompt(kind, &form)?;

    let api_key = config.resolve_api_key()?;
    let client = OpenAiCompletionClient::new(config.completion_settings(api_key))?;
    let text = client
        .complete(SYSTEM_INSTRUCTION, &prompt, &config.completion.model)
        .await?;

    if args.raw {
        println!("{text}");
        return Ok(());
    }

    let report = render::parse(kind, &text);
    if report.is_degraded() {
        tracing::warn!(
            warnings = report.warnings.len(),
            "rendered document is degraded"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_text(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path).map_err(|source| AppError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_form(path: &Path) -> Result<FormContext, AppError> {
    let raw = read_text(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.command.as_ref() {
        Some(Commands::Serve(_)) => match cli.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        _ => match cli.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
    }
}
