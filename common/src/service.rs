use std::{fmt, time::Duration};

use log::{info, warn};

use crate::{
    error::ConnectError,
    supervisor::{ConnectivitySupervisor, Sleeper, WifiRadio},
};

pub trait Platform {
    type Error: fmt::Display;

    fn prepare_to_serve(&mut self);

    // Blocks until the server stops.
    fn serve(&mut self) -> Result<(), Self::Error>;

    fn restart(&mut self) -> !;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    LinkFailed(ConnectError),
    Stopped,
    ServeFailed(String),
}

pub fn run_cycle<R, S, P>(
    supervisor: &mut ConnectivitySupervisor<R, S>,
    platform: &mut P,
) -> CycleOutcome
where
    R: WifiRadio,
    S: Sleeper,
    P: Platform,
{
    if let Err(err) = supervisor.connect() {
        warn!("Failed to establish a Wi-Fi connection ({err}), resetting");
        return CycleOutcome::LinkFailed(err);
    }

    platform.prepare_to_serve();

    match platform.serve() {
        Ok(()) => {
            info!("Server stopped");
            CycleOutcome::Stopped
        }
        Err(err) => {
            warn!("Server failed: {err}");
            CycleOutcome::ServeFailed(err.to_string())
        }
    }
}

pub fn run<R, S, P>(
    supervisor: &mut ConnectivitySupervisor<R, S>,
    platform: &mut P,
    reentry_delay: Duration,
) -> !
where
    R: WifiRadio,
    S: Sleeper,
    P: Platform,
{
    loop {
        if let CycleOutcome::LinkFailed(_) = run_cycle(supervisor, platform) {
            platform.restart();
        }
        supervisor.sleeper_mut().sleep(reentry_delay);
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::supervisor::{
        tests::{settings, CountingSleeper, ScriptedRadio},
        ConnectionState,
    };

    #[derive(Default)]
    struct FakePlatform {
        prepared: usize,
        served: usize,
        serve_error: Option<&'static str>,
    }

    impl Platform for FakePlatform {
        type Error = String;

        fn prepare_to_serve(&mut self) {
            self.prepared += 1;
        }

        fn serve(&mut self) -> Result<(), String> {
            self.served += 1;
            match self.serve_error {
                Some(err) => Err(err.to_string()),
                None => Ok(()),
            }
        }

        fn restart(&mut self) -> ! {
            panic!("restart requested");
        }
    }

    #[test]
    fn connected_cycle_prepares_then_serves() {
        let radio = ScriptedRadio::with_statuses(&[false, true]);
        let mut supervisor =
            ConnectivitySupervisor::new(radio, CountingSleeper::default(), settings());
        let mut platform = FakePlatform::default();

        assert_eq!(run_cycle(&mut supervisor, &mut platform), CycleOutcome::Stopped);
        assert_eq!((platform.prepared, platform.served), (1, 1));
        assert_eq!(supervisor.state(), ConnectionState::Connected);
    }

    #[test]
    fn link_failure_skips_the_server() {
        let mut supervisor = ConnectivitySupervisor::new(
            ScriptedRadio::default(),
            CountingSleeper::default(),
            settings(),
        );
        let mut platform = FakePlatform::default();

        assert_eq!(
            run_cycle(&mut supervisor, &mut platform),
            CycleOutcome::LinkFailed(ConnectError::TimedOut { attempts: 10 })
        );
        assert_eq!((platform.prepared, platform.served), (0, 0));
    }

    #[test]
    fn serve_error_is_reported() {
        let radio = ScriptedRadio::with_statuses(&[true]);
        let mut supervisor =
            ConnectivitySupervisor::new(radio, CountingSleeper::default(), settings());
        let mut platform = FakePlatform {
            serve_error: Some("address in use"),
            ..FakePlatform::default()
        };

        assert_eq!(
            run_cycle(&mut supervisor, &mut platform),
            CycleOutcome::ServeFailed("address in use".to_string())
        );
    }

    #[test]
    fn reentry_reuses_a_live_link() {
        let radio = ScriptedRadio::with_statuses(&[false, true, true]);
        let mut supervisor =
            ConnectivitySupervisor::new(radio, CountingSleeper::default(), settings());
        let mut platform = FakePlatform::default();

        run_cycle(&mut supervisor, &mut platform);
        assert_eq!(run_cycle(&mut supervisor, &mut platform), CycleOutcome::Stopped);
        assert_eq!(platform.served, 2);
        assert!(supervisor.sleeper_mut().slept.is_empty());
    }

    #[test]
    #[should_panic(expected = "restart requested")]
    fn run_restarts_when_the_link_never_comes_up() {
        let mut supervisor = ConnectivitySupervisor::new(
            ScriptedRadio::default(),
            CountingSleeper::default(),
            settings(),
        );

        run(&mut supervisor, &mut FakePlatform::default(), Duration::from_secs(1));
    }

    #[test]
    fn run_waits_reentry_delay_between_cycles() {
        // Two served cycles on a live link, then the link is gone for good.
        let radio = ScriptedRadio::with_statuses(&[true, true]);
        let mut supervisor =
            ConnectivitySupervisor::new(radio, CountingSleeper::default(), settings());
        let mut platform = FakePlatform::default();
        let reentry = Duration::from_millis(250);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            run(&mut supervisor, &mut platform, reentry);
        }));

        assert!(result.is_err());
        assert_eq!((platform.prepared, platform.served), (2, 2));
        assert_eq!(supervisor.state(), ConnectionState::Failed);

        let slept = &supervisor.sleeper_mut().slept;
        assert_eq!(slept[..2].to_vec(), vec![reentry; 2]);
        assert_eq!(slept[2..].to_vec(), vec![Duration::from_secs(1); 10]);
    }
}
