mod gateway_cmd;
mod memory_commands;

use {
    clap::{Parser, Subcommand},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use huddle_config::HuddleConfig;

#[derive(Parser)]
#[command(name = "huddle", about = "Huddle — WeCom chat-bot gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Explicit config file (overrides discovery).
    #[arg(long, global = true, env = "HUDDLE_CONFIG")]
    config: Option<std::path::PathBuf>,

    // Gateway arguments (used when no subcommand is provided).
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (default when no subcommand is provided).
    Gateway,
    /// Check configuration and report which credentials are set.
    Check,
    /// Query a running gateway's status endpoint.
    Status,
    /// Send a test message to a user through WeCom.
    SendTest {
        /// Recipient user id.
        #[arg(long)]
        to: String,
        /// Message body.
        #[arg(short, long, default_value = "Test message from huddle.")]
        message: String,
    },
    /// Memory store management.
    Memory {
        #[command(subcommand)]
        action: memory_commands::MemoryAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<HuddleConfig> {
    match &cli.config {
        Some(path) => Ok(huddle_config::load_config(path)?),
        None => Ok(huddle_config::discover_and_load()),
    }
}

fn apply_overrides(config: &mut HuddleConfig, cli: &Cli) {
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; ignore a missing file.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut config = load_config(&cli)?;
    apply_overrides(&mut config, &cli);

    match cli.command {
        None | Some(Commands::Gateway) => gateway_cmd::run(config).await,
        Some(Commands::Check) => check(&config).await,
        Some(Commands::Status) => status(&config).await,
        Some(Commands::SendTest { to, message }) => send_test(&config, &to, &message).await,
        Some(Commands::Memory { action }) => memory_commands::run(&config, action).await,
    }
}

async fn check(config: &HuddleConfig) -> anyhow::Result<()> {
    let missing = config.missing_credentials();
    println!("server:        {}:{}", config.server.bind, config.server.port);
    println!("llm model:     {} via {}", config.llm.model, config.llm.base_url);
    println!(
        "session:       batch_timeout={}s conversation_timeout={}s max_sessions={}",
        config.session.batch_timeout_secs,
        config.session.conversation_timeout_secs,
        config.session.max_sessions
    );
    println!("memory db:     {}", config.memory.db_path.display());
    println!(
        "callback:      token {}",
        if config.wecom.callback_token.is_some() { "set" } else { "not set" }
    );
    if !missing.is_empty() {
        for name in &missing {
            println!("credentials:   {name} is NOT set");
        }
        anyhow::bail!("{} credential(s) missing", missing.len());
    }
    println!("credentials:   all set");

    let client = huddle_wecom::WecomClient::from_config(&config.wecom)?;
    client.probe().await?;
    println!("wecom api:     token fetch ok");
    Ok(())
}

async fn status(config: &HuddleConfig) -> anyhow::Result<()> {
    let host = match config.server.bind.as_str() {
        "::" | "0.0.0.0" | "" => "127.0.0.1".to_string(),
        h if h.contains(':') => format!("[{h}]"),
        h => h.to_string(),
    };
    let url = format!("http://{host}:{}/status", config.server.port);
    let body: serde_json::Value = reqwest::get(&url).await?.error_for_status()?.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn send_test(config: &HuddleConfig, to: &str, message: &str) -> anyhow::Result<()> {
    let client = huddle_wecom::WecomClient::from_config(&config.wecom)?;
    client.send_text(to, message).await?;
    println!("test message sent to {to}");
    Ok(())
}
