use anyhow::Result;
use clap::Parser;
use pausebuffer::cli::{Args, Command, ConsoleClient};
use pausebuffer::PauseBuffer;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pausebuffer={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args
        .load_config()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    tracing::info!(
        sent_limit = config.sent_limit,
        window_ticks = config.window_span(),
        throttle_high_ms = config.throttle_high.as_millis() as u64,
        throttle_low_ms = config.throttle_low.as_millis() as u64,
        threshold = config.threshold,
        "Starting pause buffer"
    );

    let buffer = PauseBuffer::with_config(ConsoleClient::new(), config)?;

    tokio::select! {
        result = run_console(&buffer) => result?,
        _ = shutdown_signal() => return Ok(()),
    }

    tokio::select! {
        _ = wait_until_drained(&buffer) => {
            tracing::info!("All queued calls delivered");
        },
        _ = shutdown_signal() => {},
    }

    Ok(())
}

async fn run_console(buffer: &PauseBuffer<ConsoleClient>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("{}", e);
                continue;
            }
        };

        match command {
            Command::Say { channel, message, priority } => {
                buffer.say_with_priority(&channel, &message, priority)
            }
            Command::Action { channel, message, priority } => {
                buffer.action_with_priority(&channel, &message, priority)
            }
            Command::Whisper { username, message } => buffer.whisper(&username, &message),
            Command::CanWhisper { username } => {
                println!("{}: {}", username, buffer.can_whisper_to(&username));
            }
            Command::Join { channel } => {
                buffer.client().join(&channel);
            }
            Command::Status => println!("{}", serde_json::to_string(&buffer.status())?),
            Command::Quit => break,
        }
    }

    Ok(())
}

async fn wait_until_drained(buffer: &PauseBuffer<ConsoleClient>) {
    while !buffer.status().is_drained() {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down");
        },
    }
}
