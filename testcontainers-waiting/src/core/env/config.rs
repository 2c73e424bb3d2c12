use std::{str::FromStr, time::Duration};

use crate::core::env::GetEnvValue;

/// The startup timeout used when neither the strategy nor the environment sets one.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

const STARTUP_TIMEOUT_VAR: &str = "TESTCONTAINERS_STARTUP_TIMEOUT";
const POLL_INTERVAL_VAR: &str = "TESTCONTAINERS_POLL_INTERVAL";

#[derive(Debug, Default)]
pub(crate) struct Config {
    startup_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
}

impl Config {
    pub(crate) fn load<E>() -> Self
    where
        E: GetEnvValue,
    {
        let startup_timeout = parse_env::<E, u64>(STARTUP_TIMEOUT_VAR).map(Duration::from_secs);
        let poll_interval = parse_env::<E, u64>(POLL_INTERVAL_VAR)
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis);

        Config {
            startup_timeout,
            poll_interval,
        }
    }

    /// The default startup timeout. Resolved in the following order:
    ///  1. TESTCONTAINERS_STARTUP_TIMEOUT environment variable (seconds).
    ///  2. Else, [`DEFAULT_STARTUP_TIMEOUT`].
    pub(crate) fn startup_timeout(&self) -> Duration {
        self.startup_timeout.unwrap_or(DEFAULT_STARTUP_TIMEOUT)
    }

    /// The poll interval, from TESTCONTAINERS_POLL_INTERVAL (milliseconds) or the strategy's
    /// own default.
    pub(crate) fn poll_interval(&self, default: Duration) -> Duration {
        self.poll_interval.unwrap_or(default)
    }
}

fn parse_env<E, T>(key: &str) -> Option<T>
where
    E: GetEnvValue,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = E::get_env_value(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            log::warn!("Ignoring invalid value '{value}' of {key}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct EmptyEnv;

    impl GetEnvValue for EmptyEnv {
        fn get_env_value(_: &str) -> Option<String> {
            None
        }
    }

    #[derive(Debug)]
    struct GarbageEnv;

    impl GetEnvValue for GarbageEnv {
        fn get_env_value(key: &str) -> Option<String> {
            match key {
                STARTUP_TIMEOUT_VAR => Some("soon".to_owned()),
                POLL_INTERVAL_VAR => Some("0".to_owned()),
                _ => None,
            }
        }
    }

    #[derive(Debug)]
    struct FastPollEnv;

    impl GetEnvValue for FastPollEnv {
        fn get_env_value(key: &str) -> Option<String> {
            match key {
                POLL_INTERVAL_VAR => Some(" 25 ".to_owned()),
                _ => None,
            }
        }
    }

    #[test]
    fn defaults_apply_without_env() {
        let config = Config::load::<EmptyEnv>();

        assert_eq!(config.startup_timeout(), DEFAULT_STARTUP_TIMEOUT);
        assert_eq!(
            config.poll_interval(Duration::from_millis(500)),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn invalid_values_are_ignored() {
        let config = Config::load::<GarbageEnv>();

        assert_eq!(config.startup_timeout(), DEFAULT_STARTUP_TIMEOUT);
        assert_eq!(
            config.poll_interval(Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn poll_interval_is_read_in_millis() {
        let config = Config::load::<FastPollEnv>();

        assert_eq!(
            config.poll_interval(Duration::from_secs(1)),
            Duration::from_millis(25)
        );
    }
}
