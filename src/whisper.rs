//! Direct-message limiting: a fixed send cadence per buffer and a cap on how
//! many distinct users may ever be messaged.

use crate::client::ChatClient;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{self, Instant};
use tracing::debug;

/// Distinct recipients a process may direct-message
pub const MAX_WHISPER_RECIPIENTS: usize = 40;

/// Spacing between consecutive direct messages from one buffer
pub const WHISPER_INTERVAL: Duration = Duration::from_millis(750);

static GLOBAL_REGISTRY: LazyLock<WhisperRegistry> = LazyLock::new(WhisperRegistry::new);

/// Grow-only set of users that have been direct-messaged.
///
/// Clones share the same set. Buffers use [`WhisperRegistry::global`] unless
/// given their own, so creating more buffers cannot raise the recipient cap.
#[derive(Debug, Clone, Default)]
pub struct WhisperRegistry {
    recipients: Arc<Mutex<HashSet<String>>>,
}

impl WhisperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process; it lives as long as the process
    pub fn global() -> Self {
        GLOBAL_REGISTRY.clone()
    }

    pub fn can_whisper_to(&self, username: &str) -> bool {
        let recipients = self.lock();
        recipients.len() < MAX_WHISPER_RECIPIENTS || recipients.contains(username)
    }

    /// Record `username` as a recipient if the cap allows it
    fn try_admit(&self, username: &str) -> bool {
        let mut recipients = self.lock();
        if recipients.contains(username) {
            return true;
        }
        if recipients.len() >= MAX_WHISPER_RECIPIENTS {
            return false;
        }
        recipients.insert(username.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.recipients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Paces direct messages of one buffer on a fixed virtual schedule.
pub(crate) struct WhisperLimiter<C> {
    client: Arc<C>,
    registry: WhisperRegistry,
    runtime: Handle,
    next_send_at: Mutex<Option<Instant>>,
}

impl<C: ChatClient> WhisperLimiter<C> {
    pub(crate) fn new(client: Arc<C>, registry: WhisperRegistry, runtime: Handle) -> Self {
        Self {
            client,
            registry,
            runtime,
            next_send_at: Mutex::new(None),
        }
    }

    pub(crate) fn registry(&self) -> &WhisperRegistry {
        &self.registry
    }

    /// Deliver now, or at the next free slot of the schedule.
    ///
    /// The schedule advances by [`WHISPER_INTERVAL`] per message no matter when
    /// earlier messages actually went out.
    pub(crate) fn whisper(&self, username: &str, message: &str) {
        if !self.registry.try_admit(username) {
            debug!(username, "Whisper recipient limit reached, dropping message");
            return;
        }

        let now = Instant::now();
        let mut next_send_at = self.next_send_at.lock().unwrap_or_else(PoisonError::into_inner);

        match *next_send_at {
            None => {
                self.client.whisper(username, message);
                *next_send_at = Some(now + WHISPER_INTERVAL);
            }
            Some(at) => {
                let client = Arc::clone(&self.client);
                let username = username.to_string();
                let message = message.to_string();
                debug!(
                    %username,
                    delay_ms = at.saturating_duration_since(now).as_millis() as u64,
                    "Scheduling whisper"
                );

                self.runtime.spawn(async move {
                    time::sleep_until(at.max(now)).await;
                    client.whisper(&username, &message);
                });
                *next_send_at = Some(at + WHISPER_INTERVAL);
            }
        }
    }
}
