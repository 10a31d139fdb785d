//! Console front end used by the `pausebuffer` binary.

use crate::client::ChatClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::Priority;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "pausebuffer", about = "Dry-run a chat send schedule through the pause buffer")]
pub struct Args {
    /// JSON configuration file; PAUSEBUFFER_* environment variables are used otherwise
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Override the message count limit
    #[arg(long)]
    pub limit: Option<u32>,

    /// Override the high-traffic threshold
    #[arg(long)]
    pub threshold: Option<f64>,
}

impl Args {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::from_env()?,
        };

        if let Some(limit) = self.limit {
            config.set_sent_limit(limit);
        }
        if let Some(threshold) = self.threshold {
            config.set_threshold(threshold);
        }
        Ok(config)
    }
}

/// One line of console input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say {
        channel: String,
        message: String,
        priority: Priority,
    },
    Action {
        channel: String,
        message: String,
        priority: Priority,
    },
    Whisper {
        username: String,
        message: String,
    },
    CanWhisper {
        username: String,
    },
    Join {
        channel: String,
    },
    Status,
    Quit,
}

impl Command {
    /// Parse `verb[:priority] args...`; returns `Ok(None)` for blank lines
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (head, rest) = split_word(line);
        let (verb, priority) = match head.split_once(':') {
            Some((verb, raw)) => {
                let raw: i64 = raw
                    .parse()
                    .map_err(|_| Error::InvalidCommand(format!("bad priority in '{}'", head)))?;
                (verb, Priority::from_raw(raw))
            }
            None => (head, Priority::Normal),
        };

        let command = match verb {
            "say" | "action" => {
                let (channel, message) = split_word(rest);
                if channel.is_empty() || message.is_empty() {
                    return Err(Error::InvalidCommand(format!(
                        "usage: {}[:priority] <channel> <message>",
                        verb
                    )));
                }
                let (channel, message) = (channel.to_string(), message.to_string());
                if verb == "say" {
                    Command::Say { channel, message, priority }
                } else {
                    Command::Action { channel, message, priority }
                }
            }
            "whisper" => {
                let (username, message) = split_word(rest);
                if username.is_empty() || message.is_empty() {
                    return Err(Error::InvalidCommand(
                        "usage: whisper <user> <message>".to_string(),
                    ));
                }
                Command::Whisper {
                    username: username.to_string(),
                    message: message.to_string(),
                }
            }
            "can-whisper" => Command::CanWhisper {
                username: required_word(rest, "usage: can-whisper <user>")?,
            },
            "join" => Command::Join {
                channel: required_word(rest, "usage: join <channel>")?,
            },
            "status" => Command::Status,
            "quit" | "exit" => Command::Quit,
            other => return Err(Error::InvalidCommand(format!("unknown command '{}'", other))),
        };

        Ok(Some(command))
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn required_word(input: &str, usage: &str) -> Result<String> {
    let (word, _) = split_word(input);
    if word.is_empty() {
        return Err(Error::InvalidCommand(usage.to_string()));
    }
    Ok(word.to_string())
}

/// Chat client that logs every delivered call instead of sending it
pub struct ConsoleClient {
    started: Instant,
    channels: Mutex<Vec<String>>,
}

impl Default for ConsoleClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleClient {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            channels: Mutex::new(Vec::new()),
        }
    }

    /// Join a channel; not rate limited
    pub fn join(&self, channel: &str) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if !channels.iter().any(|c| c == channel) {
            channels.push(channel.to_string());
        }
        info!(channel, joined = channels.len(), "Joined channel");
        channels.len()
    }

    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl ChatClient for ConsoleClient {
    fn say(&self, channel: &str, message: &str) {
        println!("[{:>9.3}s] {} <say> {}", self.elapsed_secs(), channel, message);
    }

    fn action(&self, channel: &str, message: &str) {
        println!("[{:>9.3}s] {} <action> {}", self.elapsed_secs(), channel, message);
    }

    fn whisper(&self, username: &str, message: &str) {
        println!("[{:>9.3}s] @{} <whisper> {}", self.elapsed_secs(), username, message);
    }
}
