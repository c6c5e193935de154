use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use eyre::{Context, Result};
use log::info;

use botgate::config::{LoggingSettings, Settings, log_env_status};
use botgate::games::{TurtlePipeline, TwentyQPipeline};
use botgate::guard::InjectionGuard;
use botgate::health::BotHealthMonitor;
use botgate::http::{AppState, serve};
use botgate::llm::{LlmClient, UsageObserver};
use botgate::nlp::{KoreanNlp, NlpAnomalyScorer};
use botgate::prompt::PromptRegistry;
use botgate::session::{SessionManager, open_checkpoint_store};
use botgate::usage::{LlmMetrics, UsageRecorder, UsageRepository};

#[derive(Parser, Debug)]
#[command(name = "botgate", about = "LLM gateway for game bots")]
struct Cli {
    /// Override HTTP_HOST
    #[arg(long)]
    host: Option<String>,

    /// Override HTTP_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Prompt templates directory
    #[arg(long, default_value = "prompts")]
    prompts_dir: String,
}

fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    fs::create_dir_all(&settings.dir).context("Failed to create log directory")?;
    let log_file = Path::new(&settings.dir).join("botgate.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .parse_filters(&settings.level)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(host) = cli.host {
        settings.http.host = host;
    }
    if let Some(port) = cli.port {
        settings.http.port = port;
    }

    setup_logging(&settings.logging).context("Failed to setup logging")?;
    settings.validate().context("Invalid configuration")?;
    log_env_status(&settings);

    let settings = Arc::new(settings);

    // Usage tracking: in-memory metrics plus the shared daily table.
    let metrics = Arc::new(LlmMetrics::new());
    let repository = Arc::new(UsageRepository::new(settings.database.clone()));
    let recorder: Arc<dyn UsageObserver> =
        Arc::new(UsageRecorder::new(Arc::clone(&metrics), Arc::clone(&repository)));

    let llm = Arc::new(LlmClient::new(settings.llm.clone(), vec![recorder]));
    let nlp = Arc::new(KoreanNlp::new());
    let guard = Arc::new(InjectionGuard::new(
        settings.guard.clone(),
        Some(Arc::new(NlpAnomalyScorer(Arc::clone(&nlp)))),
    ));

    let store = open_checkpoint_store(&settings).await;
    let sessions = Arc::new(SessionManager::new(store, &settings.session));

    let prompts_dir = Path::new(&cli.prompts_dir);
    let twentyq_prompts = Arc::new(PromptRegistry::load(prompts_dir.join("twentyq"))?);
    let turtle_prompts = Arc::new(PromptRegistry::load(prompts_dir.join("turtle_soup"))?);

    let twentyq = Arc::new(TwentyQPipeline::new(
        Arc::clone(&llm),
        Arc::clone(&sessions),
        Arc::clone(&guard),
        twentyq_prompts,
        &settings,
    ));
    let turtle = Arc::new(TurtlePipeline::new(
        Arc::clone(&llm),
        Arc::clone(&sessions),
        Arc::clone(&guard),
        turtle_prompts,
        &settings,
    ));

    let monitor = BotHealthMonitor::new(settings.health.clone()).spawn();

    let state = AppState {
        settings,
        guard,
        nlp,
        llm,
        sessions,
        metrics,
        usage: repository,
        twentyq,
        turtle,
        started_at: Instant::now(),
    };

    let result = serve(state).await;

    if let Some(monitor) = monitor {
        monitor.stop().await;
    }

    result
}
