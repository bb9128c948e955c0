use std::{fmt, net::Ipv4Addr, thread, time::Duration};

use log::{debug, info, warn};

use crate::{config::RuntimeConfig, error::ConnectError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Option<Ipv4Addr>,
}

pub trait WifiRadio {
    type Error: fmt::Display;

    // Associated with an AP and holding an address.
    fn is_connected(&mut self) -> Result<bool, Self::Error>;
    fn activate(&mut self) -> Result<(), Self::Error>;
    fn set_hostname(&mut self, hostname: &str) -> Result<(), Self::Error>;
    fn connect(&mut self, ssid: &str, psk: &str) -> Result<(), Self::Error>;
    fn link_info(&mut self) -> Option<LinkInfo>;
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub ssid: String,
    pub psk: String,
    pub hostname: String,
    pub attempts: u32,
    pub poll_interval: Duration,
}

impl From<&RuntimeConfig> for LinkSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            ssid: config.ssid.clone(),
            psk: config.psk.clone(),
            hostname: config.hostname.clone(),
            attempts: config.supervisor.attempts,
            poll_interval: config.supervisor.poll_interval(),
        }
    }
}

pub struct ConnectivitySupervisor<R, S> {
    radio: R,
    sleeper: S,
    settings: LinkSettings,
    state: ConnectionState,
}

impl<R: WifiRadio, S: Sleeper> ConnectivitySupervisor<R, S> {
    pub fn new(radio: R, sleeper: S, settings: LinkSettings) -> Self {
        Self {
            radio,
            sleeper,
            settings,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn sleeper_mut(&mut self) -> &mut S {
        &mut self.sleeper
    }

    /// Brings the link up, polling its status once per interval for at most
    /// `attempts` polls.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        if self.poll() {
            self.state = ConnectionState::Connected;
            self.log_link();
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        info!("Connecting to an AP");
        info!("SSID: {}, PSK: (hidden)", self.settings.ssid);

        if let Err(err) = self.start_association() {
            warn!("Failed to connect: {err}");
            self.state = ConnectionState::Failed;
            return Err(err);
        }

        let attempts = self.settings.attempts;
        for attempt in 1..=attempts {
            if self.poll() {
                info!("Successfully connected");
                self.state = ConnectionState::Connected;
                self.log_link();
                return Ok(());
            }
            debug!("link not up yet ({attempt}/{attempts})");
            self.sleeper.sleep(self.settings.poll_interval);
        }

        warn!("Failed to connect: timed out");
        self.state = ConnectionState::Failed;
        Err(ConnectError::TimedOut { attempts })
    }

    fn start_association(&mut self) -> Result<(), ConnectError> {
        let radio_err = |err: R::Error| ConnectError::Radio(err.to_string());

        self.radio.activate().map_err(radio_err)?;
        self.radio
            .set_hostname(&self.settings.hostname)
            .map_err(radio_err)?;
        self.radio
            .connect(&self.settings.ssid, &self.settings.psk)
            .map_err(radio_err)
    }

    // A failing status query counts as "not connected yet".
    fn poll(&mut self) -> bool {
        match self.radio.is_connected() {
            Ok(connected) => connected,
            Err(err) => {
                warn!("link status query failed: {err}");
                false
            }
        }
    }

    fn log_link(&mut self) {
        if let Some(link) = self.radio.link_info() {
            let dns = link
                .dns
                .map_or_else(|| "-".to_string(), |dns| dns.to_string());
            info!(
                "Address: {}, Netmask: {}, GW: {}, DNS: {}",
                link.address, link.netmask, link.gateway, dns
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    pub(crate) struct ScriptedRadio {
        pub(crate) statuses: VecDeque<Result<bool, String>>,
        pub(crate) calls: Vec<String>,
        pub(crate) fail_call: Option<&'static str>,
        pub(crate) link_queries: usize,
    }

    impl ScriptedRadio {
        pub(crate) fn with_statuses(statuses: &[bool]) -> Self {
            Self {
                statuses: statuses.iter().map(|s| Ok(*s)).collect(),
                ..Self::default()
            }
        }

        fn record(&mut self, call: &'static str) -> Result<(), String> {
            self.calls.push(call.to_string());
            if self.fail_call == Some(call) {
                return Err(format!("{call} refused"));
            }
            Ok(())
        }
    }

    impl WifiRadio for ScriptedRadio {
        type Error = String;

        fn is_connected(&mut self) -> Result<bool, String> {
            self.statuses.pop_front().unwrap_or(Ok(false))
        }

        fn activate(&mut self) -> Result<(), String> {
            self.record("activate")
        }

        fn set_hostname(&mut self, hostname: &str) -> Result<(), String> {
            self.record("hostname")?;
            self.calls.push(hostname.to_string());
            Ok(())
        }

        fn connect(&mut self, ssid: &str, _psk: &str) -> Result<(), String> {
            self.record("connect")?;
            self.calls.push(ssid.to_string());
            Ok(())
        }

        fn link_info(&mut self) -> Option<LinkInfo> {
            self.link_queries += 1;
            Some(LinkInfo {
                address: Ipv4Addr::new(192, 168, 1, 40),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                gateway: Ipv4Addr::new(192, 168, 1, 1),
                dns: None,
            })
        }
    }

    #[derive(Default)]
    pub(crate) struct CountingSleeper {
        pub(crate) slept: Vec<Duration>,
    }

    impl Sleeper for CountingSleeper {
        fn sleep(&mut self, duration: Duration) {
            self.slept.push(duration);
        }
    }

    pub(crate) fn settings() -> LinkSettings {
        LinkSettings {
            ssid: "home".into(),
            psk: "secret".into(),
            hostname: "desk-lamp".into(),
            attempts: 10,
            poll_interval: Duration::from_secs(1),
        }
    }

    #[test]
    fn already_connected_skips_association() {
        let radio = ScriptedRadio::with_statuses(&[true]);
        let mut supervisor =
            ConnectivitySupervisor::new(radio, CountingSleeper::default(), settings());

        assert_eq!(supervisor.connect(), Ok(()));
        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert!(supervisor.radio.calls.is_empty());
        assert!(supervisor.sleeper.slept.is_empty());
        assert_eq!(supervisor.radio.link_queries, 1);
    }

    #[test]
    fn associates_in_order_and_stops_at_first_success() {
        // Initial check, then two failed polls before the link comes up.
        let radio = ScriptedRadio::with_statuses(&[false, false, false, true]);
        let mut supervisor =
            ConnectivitySupervisor::new(radio, CountingSleeper::default(), settings());

        assert_eq!(supervisor.connect(), Ok(()));
        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert_eq!(
            supervisor.radio.calls,
            vec!["activate", "hostname", "desk-lamp", "connect", "home"]
        );
        assert_eq!(supervisor.sleeper.slept, vec![Duration::from_secs(1); 2]);
        assert_eq!(supervisor.radio.link_queries, 1);
    }

    #[test]
    fn exhausting_attempts_fails() {
        let radio = ScriptedRadio::default();
        let mut supervisor =
            ConnectivitySupervisor::new(radio, CountingSleeper::default(), settings());

        assert_eq!(
            supervisor.connect(),
            Err(ConnectError::TimedOut { attempts: 10 })
        );
        assert_eq!(supervisor.state(), ConnectionState::Failed);
        assert_eq!(supervisor.sleeper.slept.len(), 10);
        assert_eq!(supervisor.radio.link_queries, 0);
        assert!(supervisor.radio.statuses.is_empty());
    }

    #[test]
    fn status_errors_count_as_failed_polls() {
        let mut radio = ScriptedRadio::default();
        radio.statuses = VecDeque::from(vec![
            Ok(false),
            Err("driver busy".to_string()),
            Ok(true),
        ]);
        let mut supervisor =
            ConnectivitySupervisor::new(radio, CountingSleeper::default(), settings());

        assert_eq!(supervisor.connect(), Ok(()));
        assert_eq!(supervisor.sleeper.slept.len(), 1);
    }

    #[test]
    fn radio_error_during_association_fails_without_polling() {
        let radio = ScriptedRadio {
            fail_call: Some("connect"),
            ..ScriptedRadio::default()
        };
        let mut supervisor =
            ConnectivitySupervisor::new(radio, CountingSleeper::default(), settings());

        assert_eq!(
            supervisor.connect(),
            Err(ConnectError::Radio("connect refused".to_string()))
        );
        assert_eq!(supervisor.state(), ConnectionState::Failed);
        assert!(supervisor.sleeper.slept.is_empty());
    }

    #[test]
    fn settings_follow_runtime_config() {
        let mut config = RuntimeConfig {
            ssid: "home".into(),
            ..RuntimeConfig::default()
        };
        config.supervisor.attempts = 3;
        config.supervisor.poll_interval_ms = 250;

        let settings = LinkSettings::from(&config);
        assert_eq!(settings.attempts, 3);
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.hostname, "cctlight");
    }
}
