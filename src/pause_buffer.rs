use crate::client::{ChatClient, ManagedAction, ManagedCall};
use crate::config::{Config, ThrottleSettings};
use crate::error::Result;
use crate::queue::{Priority, PriorityQueues, QueuedCall};
use crate::traffic::is_high_traffic;
use crate::whisper::{WhisperLimiter, WhisperRegistry};
use crate::window::SendWindow;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Length of one accounting tick
pub const TICK: Duration = Duration::from_secs(1);

/// Rate-limiting proxy around a chat client.
///
/// Channel messages are capped per sliding window, spaced by a throttle that
/// stiffens under load, and queued by priority when no slot is free. Direct
/// messages are paced separately. Every entry point returns immediately;
/// delivery happens later on the Tokio runtime the buffer was created in.
///
/// Dropping the buffer stops its ticker and discards queued calls.
pub struct PauseBuffer<C: ChatClient> {
    shared: Arc<Shared<C>>,
    whispers: WhisperLimiter<C>,
}

/// Snapshot of the buffer state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferStatus {
    pub tick_count: u64,
    pub sent: u32,
    pub queued_low: usize,
    pub queued_normal: usize,
    pub queued_high: usize,
    pub throttling: bool,
    pub ticker_running: bool,
}

impl BufferStatus {
    pub fn queued_total(&self) -> usize {
        self.queued_low + self.queued_normal + self.queued_high
    }

    /// Nothing queued and no throttle pause pending
    pub fn is_drained(&self) -> bool {
        self.queued_total() == 0 && !self.throttling
    }
}

struct Shared<C> {
    client: Arc<C>,
    runtime: Handle,
    state: Mutex<ManagerState>,
}

struct ManagerState {
    config: Config,
    window: SendWindow,
    queues: PriorityQueues,
    throttling: bool,
    ticker: Option<JoinHandle<()>>,
}

impl ManagerState {
    fn can_send(&self) -> bool {
        self.window.sent() + 1 < self.config.sent_limit && !self.throttling
    }

    fn is_high_traffic(&self, sent_override: Option<u32>) -> bool {
        is_high_traffic(
            self.config.threshold,
            self.config.sent_limit,
            sent_override.unwrap_or_else(|| self.window.sent()),
            self.queues.total_len(),
        )
    }
}

impl<C: ChatClient> PauseBuffer<C> {
    /// Wrap `client` with default settings and the process-wide whisper registry.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(client: C) -> Result<Self> {
        Self::with_options(client, Config::default(), WhisperRegistry::global())
    }

    pub fn with_config(client: C, config: Config) -> Result<Self> {
        Self::with_options(client, config, WhisperRegistry::global())
    }

    pub fn with_options(client: C, config: Config, registry: WhisperRegistry) -> Result<Self> {
        let runtime = Handle::try_current()?;
        let client = Arc::new(client);

        let shared = Arc::new(Shared {
            client: Arc::clone(&client),
            runtime: runtime.clone(),
            state: Mutex::new(ManagerState {
                config: config.clamped(),
                window: SendWindow::new(),
                queues: PriorityQueues::new(),
                throttling: false,
                ticker: None,
            }),
        });

        Ok(Self {
            shared,
            whispers: WhisperLimiter::new(client, registry, runtime),
        })
    }

    /// The wrapped client, for operations that are not rate limited
    pub fn client(&self) -> &C {
        &self.shared.client
    }

    pub fn say(&self, channel: &str, message: &str) {
        self.say_with_priority(channel, message, Priority::Normal);
    }

    pub fn say_with_priority(&self, channel: &str, message: &str, priority: Priority) {
        self.shared
            .dispatch(ManagedCall::new(ManagedAction::Say, channel, message), priority);
    }

    pub fn action(&self, channel: &str, message: &str) {
        self.action_with_priority(channel, message, Priority::Normal);
    }

    pub fn action_with_priority(&self, channel: &str, message: &str, priority: Priority) {
        self.shared
            .dispatch(ManagedCall::new(ManagedAction::Action, channel, message), priority);
    }

    /// Direct-message `username`, paced and subject to the recipient cap
    pub fn whisper(&self, username: &str, message: &str) {
        self.whispers.whisper(username, message);
    }

    pub fn can_whisper_to(&self, username: &str) -> bool {
        self.whispers.registry().can_whisper_to(username)
    }

    pub fn set_message_count_limit(&self, limit: u32) {
        self.shared.lock().config.set_sent_limit(limit);
    }

    pub fn set_message_count_duration(&self, ticks: u32) {
        self.shared.lock().config.set_sent_duration(ticks);
    }

    pub fn set_message_count_duration_buffer(&self, ticks: u32) {
        self.shared.lock().config.set_sent_duration_buffer(ticks);
    }

    pub fn set_throttle(&self, settings: ThrottleSettings) {
        self.shared.lock().config.set_throttle(settings);
    }

    pub fn set_threshold(&self, threshold: f64) {
        self.shared.lock().config.set_threshold(threshold);
    }

    pub fn set_low_priority_timeout(&self, ticks: u64) {
        self.shared.lock().config.set_low_priority_timeout(ticks);
    }

    pub fn config(&self) -> Config {
        self.shared.lock().config.clone()
    }

    pub fn status(&self) -> BufferStatus {
        let state = self.shared.lock();
        BufferStatus {
            tick_count: state.window.tick_count(),
            sent: state.window.sent(),
            queued_low: state.queues.len(Priority::Low),
            queued_normal: state.queues.len(Priority::Normal),
            queued_high: state.queues.len(Priority::High),
            throttling: state.throttling,
            ticker_running: state.ticker.is_some(),
        }
    }
}

impl<C: ChatClient> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(self: &Arc<Self>, call: ManagedCall, priority: Priority) {
        let mut state = self.lock();

        if priority == Priority::Low && state.is_high_traffic(None) {
            debug!(channel = %call.channel, "High traffic, dropping low-priority call");
            return;
        }

        if state.can_send() {
            self.send(&mut state, call, None);
        } else {
            let queued = QueuedCall {
                enqueued_at: state.window.tick_count(),
                sent_snapshot: state.window.sent(),
                call,
            };
            trace!(channel = %queued.call.channel, ?priority, "Queueing call");
            state.queues.push(priority, queued);
        }

        self.ensure_ticker(&mut state);
    }

    fn send(
        self: &Arc<Self>,
        state: &mut ManagerState,
        call: ManagedCall,
        sent_snapshot: Option<u32>,
    ) {
        if state.throttling {
            return;
        }

        state.window.record_send();
        trace!(channel = %call.channel, sent = state.window.sent(), "Sending call");
        call.invoke(&*self.client);

        let pause = if state.is_high_traffic(sent_snapshot) {
            state.config.throttle_high
        } else {
            state.config.throttle_low
        };
        if pause.is_zero() {
            return;
        }

        state.throttling = true;
        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            time::sleep(pause).await;
            if let Some(shared) = weak.upgrade() {
                shared.release_throttle();
            }
        });
    }

    fn release_throttle(self: &Arc<Self>) {
        let mut state = self.lock();
        state.throttling = false;
        self.drain(&mut state);
    }

    /// Deliver queued calls until no slot is free or nothing is left
    fn drain(self: &Arc<Self>, state: &mut ManagerState) {
        while state.can_send() {
            let tick_count = state.window.tick_count();
            let timeout = state.config.low_priority_timeout;
            let Some(queued) = state.queues.pop_next(tick_count, timeout) else {
                break;
            };
            self.send(state, queued.call, Some(queued.sent_snapshot));
        }
    }

    fn ensure_ticker(self: &Arc<Self>, state: &mut ManagerState) {
        if state.ticker.is_some() {
            return;
        }

        debug!("Starting window ticker");
        state.ticker = Some(self.runtime.spawn(run_ticker(Arc::downgrade(self))));
    }

    /// Advance the window by one tick; returns false once the ticker should stop
    fn on_tick(self: &Arc<Self>) -> bool {
        let mut state = self.lock();
        let span = state.config.window_span();

        let mut keep_running = true;
        if state.window.advance(span) {
            self.drain(&mut state);
            if state.window.sent() == 0 && state.queues.is_empty() {
                debug!("Window empty and nothing queued, stopping ticker");
                state.ticker = None;
                keep_running = false;
            }
        }
        state.window.finish_tick();
        keep_running
    }
}

async fn run_ticker<C: ChatClient>(weak: Weak<Shared<C>>) {
    let mut interval = time::interval_at(Instant::now() + TICK, TICK);
    loop {
        interval.tick().await;
        let Some(shared) = weak.upgrade() else {
            break;
        };
        if !shared.on_tick() {
            break;
        }
    }
}

impl<C> Drop for Shared<C> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Counter {
        sent: StdMutex<Vec<String>>,
    }

    impl ChatClient for Counter {
        fn say(&self, _channel: &str, message: &str) {
            self.sent.lock().unwrap().push(message.to_string());
        }

        fn action(&self, _channel: &str, message: &str) {
            self.sent.lock().unwrap().push(message.to_string());
        }

        fn whisper(&self, _username: &str, _message: &str) {}
    }

    fn buffer() -> PauseBuffer<Counter> {
        PauseBuffer::with_options(Counter::default(), Config::default(), WhisperRegistry::new())
            .unwrap()
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = PauseBuffer::new(Counter::default());
        assert!(matches!(result, Err(crate::Error::NoRuntime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_sends_and_starts_ticker() {
        let buffer = buffer();
        buffer.say("#chan", "hello");

        let status = buffer.status();
        assert_eq!(status.sent, 1);
        assert!(status.throttling);
        assert!(status.ticker_running);
        assert_eq!(status.queued_total(), 0);
        assert_eq!(*buffer.client().sent.lock().unwrap(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_call_is_queued_with_snapshot() {
        let buffer = buffer();
        buffer.say("#chan", "first");
        buffer.action_with_priority("#chan", "second", Priority::High);

        let status = buffer.status();
        assert_eq!(status.queued_high, 1);
        assert_eq!(status.queued_normal, 0);

        let mut state = buffer.shared.lock();
        assert!(!state.can_send());
        assert!(!state.is_high_traffic(None));

        let queued = state.queues.pop_next(0, 0).unwrap();
        assert_eq!(queued.sent_snapshot, 1);
        assert_eq!(queued.enqueued_at, 0);
        assert_eq!(queued.call.message, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_setters_clamp_values() {
        let buffer = buffer();
        buffer.set_message_count_limit(0);
        buffer.set_message_count_duration(0);
        buffer.set_message_count_duration_buffer(0);
        buffer.set_threshold(2.5);
        buffer.set_low_priority_timeout(9);
        buffer.set_throttle(ThrottleSettings {
            high: None,
            low: Some(Duration::from_millis(10)),
        });

        let config = buffer.config();
        assert_eq!(config.sent_limit, 2);
        assert_eq!(config.sent_duration, 1);
        assert_eq!(config.sent_duration_buffer, 1);
        assert_eq!(config.threshold, 1.0);
        assert_eq!(config.low_priority_timeout, 9);
        assert_eq!(config.throttle_high, Duration::from_millis(1500));
        assert_eq!(config.throttle_low, Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_once_window_empties() {
        let buffer = buffer();
        buffer.set_message_count_duration(1);
        buffer.set_message_count_duration_buffer(1);
        buffer.say("#chan", "only");

        time::sleep(Duration::from_millis(2500)).await;

        let status = buffer.status();
        assert_eq!(status.sent, 0);
        assert!(!status.ticker_running);
        assert_eq!(status.tick_count, 2);
    }
}
