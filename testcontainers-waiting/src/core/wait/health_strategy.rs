use std::time::Duration;

use async_trait::async_trait;

use crate::core::{
    env::{Config, Os},
    error::{ConfigurationError, Result},
    wait::{poll::PollLoop, StrategyKind, WaitStrategy},
    WaitTarget,
};

/// Waits for the container's own healthcheck to report `healthy`.
///
/// Images without a healthcheck fail right away instead of waiting for the timeout.
#[derive(Debug, Clone)]
pub struct DockerHealthcheckWaitStrategy {
    startup_timeout: Duration,
    poll_interval: Duration,
}

impl DockerHealthcheckWaitStrategy {
    /// Create a new `DockerHealthcheckWaitStrategy` polling the health status every second.
    pub fn new() -> Self {
        let config = Config::load::<Os>();
        Self {
            startup_timeout: config.startup_timeout(),
            poll_interval: config.poll_interval(Duration::from_secs(1)),
        }
    }

    /// Set the maximum time to wait for the container to become healthy.
    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    /// Set the poll interval for checking the container's health status.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for DockerHealthcheckWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaitStrategy for DockerHealthcheckWaitStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Healthcheck
    }

    fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    fn set_startup_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<(), ConfigurationError> {
        self.startup_timeout = timeout;
        Ok(())
    }

    async fn wait_until_ready(&mut self, target: &dyn WaitTarget) -> Result<()> {
        log::info!(
            "{}: Waiting for {:?} for container to become healthy",
            target.container_id(),
            self.startup_timeout
        );

        let mut poll = PollLoop::start(self.kind(), self.startup_timeout, self.poll_interval);
        loop {
            let detail = match target.is_healthy().await {
                Ok(true) => {
                    log::info!("{}: Container is healthy", target.container_id());
                    return Ok(());
                }
                Ok(false) => "container is not healthy".to_owned(),
                Err(err) if err.is_not_supported() => return Err(err.into()),
                Err(err) => format!("failed to read health status: {err}"),
            };

            poll.retry(detail).await?;
        }
    }
}
