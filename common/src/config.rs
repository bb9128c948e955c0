use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_HOSTNAME: &str = "cctlight";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StripConfig {
    pub pin: u8,
    pub led_count: usize,
    pub apply_on_boot: bool,
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            pin: 12,
            led_count: 22 * 2,
            apply_on_boot: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpConfig {
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 80 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub attempts: u32,
    pub poll_interval_ms: u64,
    pub reentry_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            poll_interval_ms: 1_000,
            reentry_delay_ms: 1_000,
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reentry_delay(&self) -> Duration {
        Duration::from_millis(self.reentry_delay_ms)
    }
}

// A bare `{ssid, psk, hostname}` record is a complete config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub ssid: String,
    #[serde(default)]
    pub psk: String,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub strip: StripConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            psk: String::new(),
            hostname: default_hostname(),
            strip: StripConfig::default(),
            http: HttpConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_slice(bytes)?;
        if config.ssid.trim().is_empty() {
            return Err(ConfigError::Empty("ssid"));
        }
        config.sanitize();
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        if self.hostname.trim().is_empty() {
            self.hostname = default_hostname();
        }

        self.strip.led_count = self.strip.led_count.max(1);
        self.supervisor.attempts = self.supervisor.attempts.max(1);
        self.supervisor.poll_interval_ms = self.supervisor.poll_interval_ms.max(100);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_credentials_record_uses_defaults() {
        let config = RuntimeConfig::from_json(
            br#"{"ssid":"home","psk":"secret","hostname":"desk-lamp"}"#,
        )
        .unwrap();

        assert_eq!(config.ssid, "home");
        assert_eq!(config.psk, "secret");
        assert_eq!(config.hostname, "desk-lamp");
        assert_eq!(config.strip, StripConfig::default());
        assert_eq!(config.supervisor.attempts, 10);
        assert_eq!(config.supervisor.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn sanitize_clamps_degenerate_values() {
        let config = RuntimeConfig::from_json(
            br#"{"ssid":"home","hostname":" ","strip":{"pin":5,"led_count":0,"apply_on_boot":true},
                "supervisor":{"attempts":0,"poll_interval_ms":1,"reentry_delay_ms":0}}"#,
        )
        .unwrap();

        assert_eq!(config.hostname, DEFAULT_HOSTNAME);
        assert_eq!(config.strip.led_count, 1);
        assert!(config.strip.apply_on_boot);
        assert_eq!(config.supervisor.attempts, 1);
        assert_eq!(config.supervisor.poll_interval_ms, 100);
    }

    #[test]
    fn missing_ssid_is_rejected() {
        let err = RuntimeConfig::from_json(br#"{"ssid":"","psk":"x"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Empty("ssid")));

        let err = RuntimeConfig::from_json(b"not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
