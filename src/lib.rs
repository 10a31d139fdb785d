pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod pause_buffer;
pub mod queue;
pub mod traffic;
pub mod whisper;
pub mod window;

pub use client::{ChatClient, ManagedAction, ManagedCall};
pub use config::{Config, ThrottleSettings};
pub use error::{Error, Result};
pub use pause_buffer::{BufferStatus, PauseBuffer};
pub use queue::Priority;
pub use whisper::WhisperRegistry;
