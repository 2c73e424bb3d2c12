use std::time::Duration;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

use crate::core::{
    env::{Config, Os},
    error::{ConfigurationError, Result},
    wait::{poll::PollLoop, StrategyKind, WaitStrategy},
    WaitTarget,
};

/// Waits for a regular expression to match the container's logs a number of times.
///
/// The pattern is matched in "dot matches newline" mode, so a single match may span
/// several log lines.
#[derive(Debug, Clone)]
pub struct LogMessageWaitStrategy {
    regex: Option<String>,
    times: usize,
    startup_timeout: Duration,
    poll_interval: Duration,
}

impl LogMessageWaitStrategy {
    /// Create a new `LogMessageWaitStrategy`. A pattern must be set with [`Self::with_regex`]
    /// before waiting. The pattern is expected to match once by default.
    pub fn new() -> Self {
        let config = Config::load::<Os>();
        Self {
            regex: None,
            times: 1,
            startup_timeout: config.startup_timeout(),
            poll_interval: config.poll_interval(Duration::from_millis(500)),
        }
    }

    /// Set the regular expression to look for.
    pub fn with_regex(mut self, regex: impl Into<String>) -> Self {
        self.regex = Some(regex.into());
        self
    }

    /// Set the number of times the pattern should match.
    pub fn with_times(mut self, times: usize) -> Self {
        self.times = times;
        self
    }

    /// Set the maximum time to wait for the pattern.
    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    /// Set the time to wait between two reads of the logs.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn compile(&self) -> Result<Regex> {
        let pattern = self
            .regex
            .as_deref()
            .ok_or(ConfigurationError::MissingPattern)?;
        let regex = RegexBuilder::new(pattern)
            .dot_matches_new_line(true)
            .build()
            .map_err(ConfigurationError::from)?;
        Ok(regex)
    }
}

impl Default for LogMessageWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaitStrategy for LogMessageWaitStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LogMessage
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
        let mut counter = MatchCounter::new(self.compile()?);
        log::info!(
            "{}: Waiting for {:?} for log output matching '{}' {} time(s)",
            target.container_id(),
            self.startup_timeout,
            counter.regex.as_str(),
            self.times
        );

        let mut poll = PollLoop::start(self.kind(), self.startup_timeout, self.poll_interval);
        loop {
            match target.logs().await {
                Ok(logs) => {
                    if counter.scan(&logs) >= self.times {
                        log::info!(
                            "{}: Log output matched '{}' {} time(s)",
                            target.container_id(),
                            counter.regex.as_str(),
                            counter.matches
                        );
                        return Ok(());
                    }
                }
                Err(err) if err.is_not_supported() => return Err(err.into()),
                Err(err) => log::debug!("{}: Failed to read logs: {err}", target.container_id()),
            }

            poll.retry(format!(
                "found {}/{} matches of '{}'",
                counter.matches,
                self.times,
                counter.regex.as_str()
            ))
            .await?;
        }
    }
}

/// Counts pattern matches in a growing log, scanning each byte of it only once.
#[derive(Debug)]
struct MatchCounter {
    regex: Regex,
    scanned: usize,
    matches: usize,
}

impl MatchCounter {
    fn new(regex: Regex) -> Self {
        Self {
            regex,
            scanned: 0,
            matches: 0,
        }
    }

    /// Adds the matches found in the part of `logs` not seen before and returns the running total.
    ///
    /// Logs that did not grow past the scanned offset (including truncated logs) add nothing.
    fn scan(&mut self, logs: &str) -> usize {
        if logs.len() <= self.scanned {
            return self.matches;
        }

        let mut start = self.scanned;
        while !logs.is_char_boundary(start) {
            start += 1;
        }

        self.matches += self.regex.find_iter(&logs[start..]).count();
        self.scanned = logs.len();
        self.matches
    }
}
