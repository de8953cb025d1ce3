//! Main Entrypoint for the Live Assistant
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Mounting the enabled features on one live session.
//! 3. Forwarding stdin lines as user turns until EOF or Ctrl+C.

use anyhow::Context;
use clap::Parser;
use gemini_live::{LiveSession, SessionError, SessionState};
use live_assistant::{
    Assistant,
    config::{Config, ReplyMode},
    console, endpoint,
    features::FeatureKind,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "assistant")]
#[command(about = "Console assistant on the Gemini Live API", long_about = None)]
#[command(version)]
struct Cli {
    /// Comma separated features to enable (calendar, email, youtube); overrides ASSISTANT_FEATURES
    #[arg(short, long)]
    features: Option<String>,
    /// Ask for text replies instead of audio
    #[arg(long)]
    text_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(list) = cli.features.as_deref() {
        config.features = FeatureKind::parse_list(list)
            .map_err(anyhow::Error::msg)
            .context("Invalid --features")?;
    }
    if cli.text_only {
        config.reply_mode = ReplyMode::Text;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(model = %config.model, reply_mode = ?config.reply_mode, "Configuration loaded.");

    // --- 3. Mount Features ---
    let assistant = Assistant::mount(
        LiveSession::new(),
        &config.model,
        config.reply_mode,
        config.voice_name.clone(),
        &config.features,
    );
    console::attach(&assistant.session);

    // --- 4. Connect ---
    assistant
        .session
        .connect(&endpoint(&config))
        .await
        .context("Failed to connect to the live endpoint")?;

    // --- 5. Forward stdin until EOF or Ctrl+C ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal. Disconnecting...");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("Input closed. Disconnecting...");
                    break;
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                match assistant.session.send_text(text) {
                    Ok(()) => {}
                    Err(SessionError::NotConnected) => {
                        warn!(state = ?assistant.session.state(), "Session is not streaming; input dropped");
                        if matches!(
                            assistant.session.state(),
                            SessionState::Closed | SessionState::Errored
                        ) {
                            break;
                        }
                    }
                    Err(e) => return Err(e).context("Failed to send text"),
                }
            }
        }
    }

    assistant.session.disconnect().await;
    assistant.unmount_all();
    Ok(())
}
