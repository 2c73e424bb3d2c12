use std::{fmt::Display, time::Duration};

use tokio::time::Instant;

use crate::core::{
    error::{Result, WaitError},
    wait::StrategyKind,
};

/// The poll-sleep-timeout loop shared by every strategy.
///
/// Strategies attempt their check, return on success, and hand every miss to
/// [`PollLoop::retry`]. Only the wall clock bounds the loop; there is no retry limit.
#[derive(Debug)]
pub(crate) struct PollLoop {
    kind: StrategyKind,
    started: Instant,
    timeout: Duration,
    interval: Duration,
    attempts: usize,
}

impl PollLoop {
    pub(crate) fn start(kind: StrategyKind, timeout: Duration, interval: Duration) -> Self {
        Self {
            kind,
            started: Instant::now(),
            timeout,
            interval,
            attempts: 0,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Records a missed attempt.
    ///
    /// Fails with [`WaitError::Timeout`] carrying `detail` once the timeout has elapsed,
    /// otherwise sleeps until the next attempt is due.
    pub(crate) async fn retry(&mut self, detail: impl Display) -> Result<()> {
        self.attempts += 1;
        let elapsed = self.elapsed();
        if elapsed >= self.timeout {
            log::debug!(
                "{} wait strategy gave up after {} attempts in {elapsed:?}: {detail}",
                self.kind,
                self.attempts
            );
            return Err(WaitError::timeout(self.kind, elapsed, detail.to_string()));
        }

        log::debug!(
            "{} wait strategy attempt {} not ready yet: {detail}",
            self.kind,
            self.attempts
        );
        // never sleep past the deadline, the final attempt happens right at it
        let pause = self.interval.min(self.timeout - elapsed);
        log::trace!("Sleeping {pause:?} before next attempt");
        tokio::time::sleep(pause).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn retries_until_timeout_then_fails_with_detail() {
        let mut poll = PollLoop::start(
            StrategyKind::Custom,
            Duration::from_secs(2),
            Duration::from_millis(500),
        );

        let mut attempts = 0;
        let err = loop {
            attempts += 1;
            if let Err(err) = poll.retry(format!("attempt {attempts}")).await {
                break err;
            }
        };

        // 0s, 0.5s, 1s, 1.5s, 2s
        assert_eq!(attempts, 5);
        assert!(matches!(
            err,
            WaitError::Timeout { kind: StrategyKind::Custom, ref detail, elapsed, .. }
                if detail == "attempt 5" && elapsed >= Duration::from_secs(2)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn last_sleep_is_clamped_to_the_deadline() {
        let mut poll = PollLoop::start(
            StrategyKind::Custom,
            Duration::from_millis(300),
            Duration::from_secs(1),
        );

        poll.retry("first").await.unwrap();
        let after_sleep = poll.elapsed();
        assert!(after_sleep >= Duration::from_millis(300));
        assert!(after_sleep < Duration::from_secs(1));

        let err = poll.retry("second").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_fails_on_first_miss() {
        let mut poll = PollLoop::start(
            StrategyKind::Custom,
            Duration::ZERO,
            Duration::from_secs(1),
        );

        let err = poll.retry("nope").await.unwrap_err();

        assert!(err.is_timeout());
    }
}
