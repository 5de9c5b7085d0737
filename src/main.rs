use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dissertation_critic::{
    agents::{AgentCommunicationBus, PrimeOutcome, ReviewOrchestrator, SessionBridge},
    config::{Config, CredentialStatus, DEFAULT_CONFIG_TEMPLATE},
    llm::{GeminiProvider, GenerationService},
    reports::ReportGenerator,
    types::*,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dissertation-critic")]
#[command(about = "Multi-agent examiner panel for dissertation proposals")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(short, long, env = "DISSERTATION_CRITIC_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Critique a proposal PDF with the four reviewer agents
    Critique {
        /// Proposal file (PDF only)
        file: PathBuf,

        /// Output format (json, markdown, text); defaults to output.format
        #[arg(short, long)]
        output: Option<String>,

        /// Output file path (defaults to stdout)
        #[arg(short = 'f', long)]
        output_file: Option<PathBuf>,

        /// Directory to export the markdown report into
        #[arg(short, long)]
        export_dir: Option<PathBuf>,

        /// Continue into an examiner chat primed with the report
        #[arg(long)]
        chat: bool,
    },

    /// Talk to the examiner without a report loaded
    Chat,

    /// Show configuration, credential status and remote service health
    CheckConfig,

    /// Initialize configuration file
    Init {
        /// Configuration file path
        #[arg(short = 'f', long, default_value = "dissertation-critic.yml")]
        config_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level)?;

    info!("Starting dissertation critic");

    let config = load_config(cli.config.as_ref()).await?;
    if config.credential_status() == CredentialStatus::Missing {
        error!("{}", config.credential_status());
    }

    match cli.command {
        Commands::Critique {
            file,
            output,
            output_file,
            export_dir,
            chat,
        } => {
            critique(file, output, output_file, export_dir, chat, config).await?;
        }

        Commands::Chat => {
            let service = build_service(&config)?;
            let session = open_session(service.as_ref(), Arc::new(AgentCommunicationBus::new()), &config);
            run_chat(session).await?;
        }

        Commands::CheckConfig => {
            check_config(config).await?;
        }

        Commands::Init { config_file } => {
            init_config(config_file).await?;
        }
    }

    Ok(())
}

/// Initialize tracing with the specified log level
fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Invalid log level")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}

/// Load configuration from file (if any), then apply environment overrides
async fn load_config(config_path: Option<&PathBuf>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(path) = config_path {
        if path.exists() {
            info!("Loading configuration from: {:?}", path);
            config = Config::load_from_file(path).await?;
        } else {
            warn!("Configuration file not found: {:?}. Using defaults.", path);
        }
    }

    config.merge_with(Config::load_from_env()?);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_service(config: &Config) -> Result<Arc<dyn GenerationService>> {
    let provider =
        GeminiProvider::new(config.llm_config()).context("Failed to create Gemini client")?;
    Ok(Arc::new(provider))
}

fn open_session(
    service: &dyn GenerationService,
    communication_bus: Arc<AgentCommunicationBus>,
    config: &Config,
) -> Arc<SessionBridge> {
    Arc::new(SessionBridge::open(
        service,
        communication_bus,
        config.session_config(),
    ))
}

async fn critique(
    file: PathBuf,
    output: Option<String>,
    output_file: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    chat: bool,
    config: Config,
) -> Result<()> {
    let service = build_service(&config)?;
    let communication_bus = Arc::new(AgentCommunicationBus::new());
    let orchestrator = ReviewOrchestrator::new(
        service.clone(),
        communication_bus.clone(),
        config.orchestrator_config(),
    );

    if let Err(e) = orchestrator.select_document(&file).await {
        error!("Failed to load {:?}: {}", file, e);
        println!("❌ {}", e);
        std::process::exit(1);
    }

    println!(
        "🔍 Menganalisis {:?} dengan {} agen penguji...",
        file,
        ReviewerRole::ALL.len()
    );
    let progress = tokio::spawn(print_progress(communication_bus.subscribe()));
    debug!(
        "Progress display attached ({} bus subscribers)",
        communication_bus.subscriber_count()
    );

    let outcome = match orchestrator.start_analysis().await {
        Ok(outcome) => outcome,
        Err(e) => {
            progress.abort();
            return Err(e).context("Analysis could not start");
        }
    };
    if let Err(e) = progress.await {
        warn!("Progress reporter stopped: {}", e);
    }

    let format = output.unwrap_or_else(|| config.output.format.clone());
    output_report(&outcome, &format, output_file.as_ref()).await?;

    if let Some(directory) = export_dir.or_else(|| config.output.directory.clone()) {
        let artifact = ReportGenerator::new()
            .export_artifact(&outcome.report.text, Some(&outcome.document_name));
        let path = artifact.write_to(&directory).await?;
        println!("💾 Laporan diekspor ke {:?}", path);
    }

    if chat {
        let session = open_session(service.as_ref(), communication_bus, &config);
        match orchestrator.current_report().await {
            Some(report) => match session.prime_with_context(&report).await {
                PrimeOutcome::Primed | PrimeOutcome::AlreadyPrimed => {}
                PrimeOutcome::Failed(reason) => {
                    println!("⚠️  Konteks laporan gagal dimuat: {}", reason);
                }
            },
            None => println!("⚠️  Tidak ada laporan yang dapat dimuat ke sesi diskusi."),
        }
        run_chat(session).await?;
    }

    Ok(())
}

/// Print one line per agent as it settles, until the review completes
async fn print_progress(mut events: broadcast::Receiver<ReviewEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Progress display skipped {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event.kind {
            ReviewEventKind::AgentCompleted | ReviewEventKind::AgentFailed => {
                let role: Option<ReviewerRole> = serde_json::from_value(event.data["role"].clone()).ok();
                let (marker, status) = if event.kind == ReviewEventKind::AgentCompleted {
                    ("✅", AgentStatus::Completed)
                } else {
                    ("❌", AgentStatus::Failed)
                };
                if let Some(role) = role {
                    println!("  {} {}: {}", marker, role.display_name(), status.label());
                }
            }
            ReviewEventKind::SynthesisStarted => println!("🧠 Menyusun laporan akhir..."),
            ReviewEventKind::ReviewCompleted => break,
            _ => {}
        }
    }
}

async fn output_report(
    outcome: &ReviewOutcome,
    format: &str,
    output_file: Option<&PathBuf>,
) -> Result<()> {
    let content = ReportGenerator::new().generate(outcome, format)?;

    if let Some(file_path) = output_file {
        tokio::fs::write(file_path, &content)
            .await
            .with_context(|| format!("Failed to write output to: {:?}", file_path))?;
        info!("Report written to: {:?}", file_path);
    } else {
        println!("{}", content);
    }

    Ok(())
}

fn print_entry(entry: &TranscriptEntry) {
    match entry.role {
        TranscriptRole::User => {}
        TranscriptRole::Model => println!("\n🎓 {}\n", entry.content),
        TranscriptRole::System => println!("ℹ️  {}", entry.content),
    }
}

/// Line-based examiner chat on stdin; `exit` or `quit` ends it
async fn run_chat(session: Arc<SessionBridge>) -> Result<()> {
    for entry in session.transcript().await {
        print_entry(&entry);
    }
    if session.is_primed() {
        println!("🟢 Konteks laporan aktif");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        match session.send(line).await {
            Ok(entry) => print_entry(&entry),
            Err(e) => warn!("Message not sent: {}", e),
        }
    }

    info!("Chat session ended");
    Ok(())
}

async fn check_config(config: Config) -> Result<()> {
    println!("Configuration:");
    println!("  Analysis model: {}", config.gemini.analysis_model);
    println!("  Chat model: {}", config.gemini.chat_model);
    println!("  Chat search: {}", config.chat.search_enabled);
    match config.credential_status() {
        CredentialStatus::Configured => println!("  ✅ {}", config.credential_status()),
        CredentialStatus::Missing => println!("  ❌ {}", config.credential_status()),
    }

    let service = build_service(&config)?;
    let orchestrator = ReviewOrchestrator::new(
        service,
        Arc::new(AgentCommunicationBus::new()),
        config.orchestrator_config(),
    );

    let health_status = orchestrator.health_check().await;
    if health_status.healthy {
        info!("✅ System health check passed");
        println!("System Status: Healthy");
    } else {
        error!("❌ System health check failed");
        println!("System Status: Unhealthy");
    }
    for component in &health_status.components {
        println!(
            "  {}: {}",
            component.name,
            if component.healthy { "✅" } else { "❌" }
        );
        if let Some(detail) = &component.detail {
            println!("    {}", detail);
        }
    }

    if !health_status.healthy {
        std::process::exit(1);
    }
    Ok(())
}

/// Initialize configuration file
async fn init_config(config_file: PathBuf) -> Result<()> {
    info!("Initializing configuration file: {:?}", config_file);

    if config_file.exists() {
        warn!("Configuration file already exists: {:?}", config_file);
        print!("Overwrite existing file? (y/N): ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            info!("Configuration initialization cancelled");
            return Ok(());
        }
    }

    tokio::fs::write(&config_file, DEFAULT_CONFIG_TEMPLATE)
        .await
        .with_context(|| format!("Failed to write configuration file: {:?}", config_file))?;

    info!("Configuration file created successfully: {:?}", config_file);
    println!("Configuration file created: {:?}", config_file);
    println!("Edit this file to customize the examiner panel.");

    Ok(())
}
