use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const MIN_SENT_LIMIT: u32 = 2;
pub const MIN_SENT_DURATION: u32 = 1;
pub const MIN_SENT_DURATION_BUFFER: u32 = 1;

/// Rate limiting settings for one wrapped client.
///
/// Durations counted in ticks use the one-second ticker of the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sends allowed inside the tracked window (one slot is always kept free)
    pub sent_limit: u32,

    /// Window length in ticks
    pub sent_duration: u32,

    /// Extra ticks of history kept before a send ages out of the window
    pub sent_duration_buffer: u32,

    /// Pause after a send while traffic is high
    #[serde(with = "humantime_serde")]
    pub throttle_high: Duration,

    /// Pause after a send while traffic is low
    #[serde(with = "humantime_serde")]
    pub throttle_low: Duration,

    /// Fraction of `sent_limit - 1` at which traffic counts as high
    pub threshold: f64,

    /// Ticks a low-priority call may wait in queue; 0 disables expiry
    pub low_priority_timeout: u64,
}

/// Partial throttle update; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleSettings {
    #[serde(default, with = "humantime_serde")]
    pub high: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub low: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sent_limit: 20,
            sent_duration: 30,
            sent_duration_buffer: 5,
            throttle_high: Duration::from_millis(1500),
            throttle_low: Duration::from_millis(1500),
            threshold: 1.0,
            low_priority_timeout: 0,
        }
    }
}

impl ThrottleSettings {
    pub fn both(pause: Duration) -> Self {
        Self {
            high: Some(pause),
            low: Some(pause),
        }
    }
}

impl Config {
    /// Load configuration from `PAUSEBUFFER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, starting from defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(limit) = parse_var(&lookup, "PAUSEBUFFER_SENT_LIMIT")? {
            config.set_sent_limit(limit);
        }
        if let Some(duration) = parse_var(&lookup, "PAUSEBUFFER_SENT_DURATION")? {
            config.set_sent_duration(duration);
        }
        if let Some(buffer) = parse_var(&lookup, "PAUSEBUFFER_SENT_DURATION_BUFFER")? {
            config.set_sent_duration_buffer(buffer);
        }
        config.set_throttle(ThrottleSettings {
            high: parse_var(&lookup, "PAUSEBUFFER_THROTTLE_HIGH_MS")?.map(Duration::from_millis),
            low: parse_var(&lookup, "PAUSEBUFFER_THROTTLE_LOW_MS")?.map(Duration::from_millis),
        });
        if let Some(threshold) = parse_var(&lookup, "PAUSEBUFFER_THRESHOLD")? {
            config.set_threshold(threshold);
        }
        if let Some(ticks) = parse_var(&lookup, "PAUSEBUFFER_LOW_PRIORITY_TIMEOUT")? {
            config.set_low_priority_timeout(ticks);
        }

        Ok(config)
    }

    /// Load configuration from a JSON file; out-of-range values are clamped
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config.clamped())
    }

    /// Bring every field back into its valid range
    pub fn clamped(mut self) -> Self {
        self.set_sent_limit(self.sent_limit);
        self.set_sent_duration(self.sent_duration);
        self.set_sent_duration_buffer(self.sent_duration_buffer);
        self.set_threshold(self.threshold);
        self
    }

    pub fn set_sent_limit(&mut self, limit: u32) {
        self.sent_limit = limit.max(MIN_SENT_LIMIT);
    }

    pub fn set_sent_duration(&mut self, ticks: u32) {
        self.sent_duration = ticks.max(MIN_SENT_DURATION);
    }

    pub fn set_sent_duration_buffer(&mut self, ticks: u32) {
        self.sent_duration_buffer = ticks.max(MIN_SENT_DURATION_BUFFER);
    }

    pub fn set_throttle(&mut self, settings: ThrottleSettings) {
        if let Some(high) = settings.high {
            self.throttle_high = high;
        }
        if let Some(low) = settings.low {
            self.throttle_low = low;
        }
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = if threshold.is_nan() {
            Config::default().threshold
        } else {
            threshold.clamp(0.0, 1.0)
        };
    }

    pub fn set_low_priority_timeout(&mut self, ticks: u64) {
        self.low_priority_timeout = ticks;
    }

    /// Ticks of history a send is counted for before it ages out
    pub fn window_span(&self) -> usize {
        (self.sent_duration as usize) + (self.sent_duration_buffer as usize)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_config(key, &raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sent_limit, 20);
        assert_eq!(config.sent_duration, 30);
        assert_eq!(config.sent_duration_buffer, 5);
        assert_eq!(config.throttle_high, Duration::from_millis(1500));
        assert_eq!(config.throttle_low, Duration::from_millis(1500));
        assert_eq!(config.threshold, 1.0);
        assert_eq!(config.low_priority_timeout, 0);
        assert_eq!(config.window_span(), 35);
    }

    #[test]
    fn test_setters_clamp() {
        let mut config = Config::default();
        config.set_sent_limit(1);
        config.set_sent_duration(0);
        config.set_sent_duration_buffer(0);
        config.set_threshold(-0.5);
        assert_eq!(config.sent_limit, 2);
        assert_eq!(config.sent_duration, 1);
        assert_eq!(config.sent_duration_buffer, 1);
        assert_eq!(config.threshold, 0.0);

        config.set_threshold(7.0);
        assert_eq!(config.threshold, 1.0);
        config.set_threshold(f64::NAN);
        assert_eq!(config.threshold, 1.0);
    }

    #[test]
    fn test_partial_throttle_update() {
        let mut config = Config::default();
        config.set_throttle(ThrottleSettings {
            high: Some(Duration::from_secs(3)),
            low: None,
        });
        assert_eq!(config.throttle_high, Duration::from_secs(3));
        assert_eq!(config.throttle_low, Duration::from_millis(1500));

        config.set_throttle(ThrottleSettings::both(Duration::ZERO));
        assert_eq!(config.throttle_high, Duration::ZERO);
        assert_eq!(config.throttle_low, Duration::ZERO);
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("PAUSEBUFFER_SENT_LIMIT", "100"),
            ("PAUSEBUFFER_THROTTLE_LOW_MS", "250"),
            ("PAUSEBUFFER_THRESHOLD", "0.5"),
            ("PAUSEBUFFER_SENT_DURATION_BUFFER", "0"),
        ]))
        .unwrap();

        assert_eq!(config.sent_limit, 100);
        assert_eq!(config.throttle_low, Duration::from_millis(250));
        assert_eq!(config.throttle_high, Duration::from_millis(1500));
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.sent_duration_buffer, 1);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = Config::from_lookup(lookup(&[("PAUSEBUFFER_SENT_DURATION", "soon")]));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"sent_limit": 1, "throttle_high": "3s", "low_priority_timeout": 4}}"#
        )
        .unwrap();

        let config = Config::from_json_file(file.path()).unwrap();
        assert_eq!(config.sent_limit, 2);
        assert_eq!(config.throttle_high, Duration::from_secs(3));
        assert_eq!(config.throttle_low, Duration::from_millis(1500));
        assert_eq!(config.low_priority_timeout, 4);
    }
}
