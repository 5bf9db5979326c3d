use anyhow::Context;
use cheatsheet::channels::TelegramChannel;
use cheatsheet::config::{self, Settings};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cheatsheet-bot")]
#[command(about = "Exam cheatsheet bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook gateway (function envelope on POST /, raw Telegram updates on POST /telegram/webhook).
    Serve {
        /// Config file path (default: CHEATSHEET_CONFIG_PATH or ~/.cheatsheet/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default: PORT env, config, or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Manage the Telegram webhook registration.
    Webhook {
        /// Config file path (default: CHEATSHEET_CONFIG_PATH or ~/.cheatsheet/config.json)
        #[arg(long, short, value_name = "PATH", global = true)]
        config: Option<std::path::PathBuf>,

        #[command(subcommand)]
        action: WebhookAction,
    },
}

#[derive(Subcommand)]
enum WebhookAction {
    /// Point Telegram at URL. The configured webhook secret, if any, is registered with it.
    Set {
        #[arg(long, value_name = "URL")]
        url: String,
    },
    /// Remove the webhook.
    Delete,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("cheatsheet-bot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Webhook { config, action }) => {
            if let Err(e) = run_webhook(config, action).await {
                log::error!("webhook failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(config_path: Option<std::path::PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    let mut settings = Settings::from_env(&config)?;
    if let Some(p) = port {
        settings.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (folder {}, prompt {})",
        settings.bind,
        settings.port,
        settings.folder_id,
        settings.prompt_path.display()
    );
    cheatsheet::gateway::run_gateway(settings).await
}

async fn run_webhook(
    config_path: Option<std::path::PathBuf>,
    action: WebhookAction,
) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let token = config::resolve_telegram_token(&config)
        .context("telegram bot token is not configured (set TELEGRAM_BOT_TOKEN or telegram.botToken)")?;
    let telegram = TelegramChannel::new(config::resolve_telegram_api_base(&config), token);
    match action {
        WebhookAction::Set { url } => {
            let secret = config::resolve_webhook_secret(&config);
            telegram
                .set_webhook(&url, secret.as_deref())
                .await
                .context("setWebhook")?;
            println!("webhook set to {}", url);
        }
        WebhookAction::Delete => {
            telegram.delete_webhook().await.context("deleteWebhook")?;
            println!("webhook deleted");
        }
    }
    Ok(())
}
