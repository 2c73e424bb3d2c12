use std::time::Duration;

use async_trait::async_trait;

use crate::core::{
    env::{Config, Os},
    error::{ConfigurationError, Result},
    wait::{poll::PollLoop, StrategyKind, WaitStrategy},
    WaitTarget,
};

/// Waits for a shell command executed inside the container to exit with status 0.
///
/// The command is run as `/bin/sh -c <command>`, so the image needs a shell.
#[derive(Debug, Clone)]
pub struct ShellWaitStrategy {
    command: Option<String>,
    startup_timeout: Duration,
    poll_interval: Duration,
}

impl ShellWaitStrategy {
    /// Create a new `ShellWaitStrategy`. A command must be set with [`Self::with_command`]
    /// before waiting.
    pub fn new() -> Self {
        let config = Config::load::<Os>();
        Self {
            command: None,
            startup_timeout: config.startup_timeout(),
            poll_interval: config.poll_interval(Duration::from_millis(500)),
        }
    }

    /// Set the shell command to run, e.g. `pg_isready -U postgres`.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Set the maximum time to wait for the command to succeed.
    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    /// Set the time to wait between two runs of the command.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for ShellWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaitStrategy for ShellWaitStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Shell
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
        let command = self
            .command
            .clone()
            .ok_or(ConfigurationError::MissingCommand)?;
        let cmd = vec!["/bin/sh".to_owned(), "-c".to_owned(), command.clone()];
        log::info!(
            "{}: Waiting for {:?} for command '{command}' to succeed",
            target.container_id(),
            self.startup_timeout
        );

        let mut poll = PollLoop::start(self.kind(), self.startup_timeout, self.poll_interval);
        let mut last_exit_code = None;
        let mut last_error = None;
        loop {
            match target.exec(cmd.clone()).await {
                Ok(result) if result.success() => {
                    log::info!("{}: Command '{command}' succeeded", target.container_id());
                    return Ok(());
                }
                Ok(result) => {
                    log::trace!(
                        "{}: Command '{command}' stdout: {}, stderr: {}",
                        target.container_id(),
                        result.stdout,
                        result.stderr
                    );
                    last_exit_code = Some(result.exit_code);
                }
                Err(err) if err.is_not_supported() => return Err(err.into()),
                Err(err) => last_error = Some(err.to_string()),
            }

            let detail = failure_detail(&command, last_exit_code, last_error.as_deref());
            poll.retry(detail).await?;
        }
    }
}

fn failure_detail(command: &str, exit_code: Option<i64>, error: Option<&str>) -> String {
    match (exit_code, error) {
        (Some(code), Some(err)) => {
            format!("'{command}' last exited with code {code}, last exec error: {err}")
        }
        (Some(code), None) => format!("'{command}' last exited with code {code}"),
        (None, Some(err)) => format!("'{command}' could not be executed: {err}"),
        (None, None) => format!("'{command}' did not run"),
    }
}
