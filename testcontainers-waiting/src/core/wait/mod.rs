use std::{env::var, fmt::Debug, time::Duration};

use async_trait::async_trait;

pub use health_strategy::DockerHealthcheckWaitStrategy;
pub use host_port_strategy::HostPortWaitStrategy;
#[cfg(feature = "http_wait")]
#[cfg_attr(docsrs, doc(cfg(feature = "http_wait")))]
pub use http_strategy::HttpWaitStrategy;
pub use log_strategy::LogMessageWaitStrategy;
pub use shell_strategy::ShellWaitStrategy;
pub use wait_all_strategy::{WaitAllMode, WaitAllStrategy};

use crate::core::{
    error::{ConfigurationError, Result},
    WaitTarget,
};

pub(crate) mod health_strategy;
pub(crate) mod host_port_strategy;
#[cfg(feature = "http_wait")]
pub(crate) mod http_strategy;
pub(crate) mod log_strategy;
pub(crate) mod poll;
pub(crate) mod shell_strategy;
pub(crate) mod wait_all_strategy;

/// A technique for deciding when a started container is ready to be used.
///
/// Strategies are configured up front, then [`WaitStrategy::wait_until_ready`] is called once
/// per target. Waiting borrows the strategy mutably, so a single strategy can never wait on
/// two targets at the same time.
#[async_trait]
pub trait WaitStrategy: Debug + Send + Sync {
    /// The technique this strategy implements, used in logs and errors.
    fn kind(&self) -> StrategyKind {
        StrategyKind::Custom
    }

    /// The maximum time [`WaitStrategy::wait_until_ready`] keeps polling.
    fn startup_timeout(&self) -> Duration;

    /// Changes the startup timeout.
    ///
    /// Fails for strategies that have no single timeout to change, see [`WaitAllMode`].
    fn set_startup_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<(), ConfigurationError>;

    /// Polls the target until it is ready or the startup timeout elapses.
    async fn wait_until_ready(&mut self, target: &dyn WaitTarget) -> Result<()>;
}

#[async_trait]
impl<S: WaitStrategy + ?Sized> WaitStrategy for Box<S> {
    fn kind(&self) -> StrategyKind {
        (**self).kind()
    }

    fn startup_timeout(&self) -> Duration {
        (**self).startup_timeout()
    }

    fn set_startup_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<(), ConfigurationError> {
        (**self).set_startup_timeout(timeout)
    }

    async fn wait_until_ready(&mut self, target: &dyn WaitTarget) -> Result<()> {
        (**self).wait_until_ready(target).await
    }
}

/// Identifies the technique behind a [`WaitStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, parse_display::Display)]
#[display(style = "snake_case")]
pub enum StrategyKind {
    LogMessage,
    HostPort,
    Http,
    Shell,
    Healthcheck,
    WaitAll,
    Nothing,
    Duration,
    /// A strategy implemented outside of this crate.
    Custom,
}

/// Represents a condition that needs to be met before a container is considered ready.
#[derive(Debug)]
pub enum WaitFor {
    /// An empty condition. Useful for default cases or fallbacks.
    Nothing,
    /// Wait for a certain amount of time.
    Duration { length: Duration },
    /// Wait for a pattern to appear in the container's logs.
    LogMessage(LogMessageWaitStrategy),
    /// Wait for the container's ports to accept TCP connections.
    HostPort(HostPortWaitStrategy),
    /// Wait for a certain HTTP response.
    #[cfg(feature = "http_wait")]
    #[cfg_attr(docsrs, doc(cfg(feature = "http_wait")))]
    Http(Box<HttpWaitStrategy>),
    /// Wait for a command executed inside the container to succeed.
    Shell(ShellWaitStrategy),
    /// Wait for the container's status to become `healthy`.
    Healthcheck(DockerHealthcheckWaitStrategy),
    /// Wait for several conditions, one after another.
    All(WaitAllStrategy),
}

impl WaitFor {
    /// Wait for the regular expression to match the container's logs once.
    pub fn log_message(regex: impl Into<String>) -> WaitFor {
        WaitFor::LogMessage(LogMessageWaitStrategy::new().with_regex(regex))
    }

    /// Wait for every exposed port of the container to accept connections.
    pub fn listening_port() -> WaitFor {
        WaitFor::HostPort(HostPortWaitStrategy::new())
    }

    /// Wait for the given container ports to accept connections.
    pub fn listening_ports(ports: impl IntoIterator<Item = u16>) -> WaitFor {
        WaitFor::HostPort(HostPortWaitStrategy::new().with_ports(ports))
    }

    /// Wait for a certain HTTP response.
    #[cfg(feature = "http_wait")]
    #[cfg_attr(docsrs, doc(cfg(feature = "http_wait")))]
    pub fn http(http_strategy: HttpWaitStrategy) -> WaitFor {
        WaitFor::Http(Box::new(http_strategy))
    }

    /// Wait for the shell command to exit with status 0 inside the container.
    pub fn successful_command(command: impl Into<String>) -> WaitFor {
        WaitFor::Shell(ShellWaitStrategy::new().with_command(command))
    }

    /// Wait for the container to become healthy.
    pub fn healthcheck() -> WaitFor {
        WaitFor::Healthcheck(DockerHealthcheckWaitStrategy::new())
    }

    /// Wait for all strategies of the composite.
    pub fn all(strategy: WaitAllStrategy) -> WaitFor {
        WaitFor::All(strategy)
    }

    /// Wait for a certain amount of seconds.
    ///
    /// Prefer waiting for a specific condition, a fixed delay is either too long or too short.
    pub fn seconds(length: u64) -> WaitFor {
        WaitFor::Duration {
            length: Duration::from_secs(length),
        }
    }

    /// Wait for a certain amount of millis.
    ///
    /// Prefer waiting for a specific condition, a fixed delay is either too long or too short.
    pub fn millis(length: u64) -> WaitFor {
        WaitFor::Duration {
            length: Duration::from_millis(length),
        }
    }

    /// Wait for a certain amount of millis specified in the environment variable.
    ///
    /// Prefer waiting for a specific condition, a fixed delay is either too long or too short.
    pub fn millis_in_env_var(name: &'static str) -> WaitFor {
        let additional_sleep_period = var(name).map(|value| value.parse());

        (|| {
            let length = additional_sleep_period.ok()?.ok()?;

            Some(WaitFor::Duration {
                length: Duration::from_millis(length),
            })
        })()
        .unwrap_or(WaitFor::Nothing)
    }

    fn strategy(&self) -> Option<&dyn WaitStrategy> {
        match self {
            WaitFor::Nothing | WaitFor::Duration { .. } => None,
            WaitFor::LogMessage(strategy) => Some(strategy),
            WaitFor::HostPort(strategy) => Some(strategy),
            #[cfg(feature = "http_wait")]
            WaitFor::Http(strategy) => Some(&**strategy),
            WaitFor::Shell(strategy) => Some(strategy),
            WaitFor::Healthcheck(strategy) => Some(strategy),
            WaitFor::All(strategy) => Some(strategy),
        }
    }

    fn strategy_mut(&mut self) -> Option<&mut dyn WaitStrategy> {
        match self {
            WaitFor::Nothing | WaitFor::Duration { .. } => None,
            WaitFor::LogMessage(strategy) => Some(strategy),
            WaitFor::HostPort(strategy) => Some(strategy),
            #[cfg(feature = "http_wait")]
            WaitFor::Http(strategy) => Some(&mut **strategy),
            WaitFor::Shell(strategy) => Some(strategy),
            WaitFor::Healthcheck(strategy) => Some(strategy),
            WaitFor::All(strategy) => Some(strategy),
        }
    }
}

#[async_trait]
impl WaitStrategy for WaitFor {
    fn kind(&self) -> StrategyKind {
        match self {
            WaitFor::Nothing => StrategyKind::Nothing,
            WaitFor::Duration { .. } => StrategyKind::Duration,
            other => other
                .strategy()
                .map_or(StrategyKind::Custom, |strategy| strategy.kind()),
        }
    }

    fn startup_timeout(&self) -> Duration {
        match self {
            WaitFor::Nothing => Duration::ZERO,
            WaitFor::Duration { length } => *length,
            other => other
                .strategy()
                .map_or(Duration::ZERO, |strategy| strategy.startup_timeout()),
        }
    }

    fn set_startup_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<(), ConfigurationError> {
        match self.strategy_mut() {
            Some(strategy) => strategy.set_startup_timeout(timeout),
            // fixed conditions have nothing to time out
            None => Ok(()),
        }
    }

    async fn wait_until_ready(&mut self, target: &dyn WaitTarget) -> Result<()> {
        match self {
            WaitFor::Nothing => Ok(()),
            WaitFor::Duration { length } => {
                log::debug!(
                    "Sleeping for {length:?} before considering container {} ready",
                    target.container_id()
                );
                tokio::time::sleep(*length).await;
                Ok(())
            }
            other => match other.strategy_mut() {
                Some(strategy) => strategy.wait_until_ready(target).await,
                None => Ok(()),
            },
        }
    }
}

impl From<LogMessageWaitStrategy> for WaitFor {
    fn from(value: LogMessageWaitStrategy) -> Self {
        Self::LogMessage(value)
    }
}

impl From<HostPortWaitStrategy> for WaitFor {
    fn from(value: HostPortWaitStrategy) -> Self {
        Self::HostPort(value)
    }
}

#[cfg(feature = "http_wait")]
impl From<HttpWaitStrategy> for WaitFor {
    fn from(value: HttpWaitStrategy) -> Self {
        Self::Http(Box::new(value))
    }
}

impl From<ShellWaitStrategy> for WaitFor {
    fn from(value: ShellWaitStrategy) -> Self {
        Self::Shell(value)
    }
}

impl From<DockerHealthcheckWaitStrategy> for WaitFor {
    fn from(value: DockerHealthcheckWaitStrategy) -> Self {
        Self::Healthcheck(value)
    }
}

impl From<WaitAllStrategy> for WaitFor {
    fn from(value: WaitAllStrategy) -> Self {
        Self::All(value)
    }
}
