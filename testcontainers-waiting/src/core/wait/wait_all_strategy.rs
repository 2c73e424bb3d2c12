use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::core::{
    error::{ConfigurationError, Result, WaitError},
    wait::{StrategyKind, WaitStrategy},
    WaitTarget,
};

const DEFAULT_OUTER_TIMEOUT: Duration = Duration::from_secs(30);

/// How a [`WaitAllStrategy`] applies its own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, parse_display::Display)]
#[display(style = "SNAKE_CASE")]
pub enum WaitAllMode {
    /// The outer timeout replaces the timeout of every child.
    #[default]
    WithOuterTimeout,
    /// Every child keeps its own timeout and the composite has none.
    WithIndividualTimeoutsOnly,
    /// Every child keeps its own timeout, and the composite fails once the total time
    /// reaches the outer timeout.
    WithMaximumOuterTimeout,
}

/// Waits for several strategies, one after another in the order they were added.
///
/// ```rust
/// use std::time::Duration;
///
/// use testcontainers_waiting::core::wait::{
///     HostPortWaitStrategy, LogMessageWaitStrategy, WaitAllMode, WaitAllStrategy,
/// };
///
/// let strategy = WaitAllStrategy::new(WaitAllMode::WithOuterTimeout)
///     .with_strategy(LogMessageWaitStrategy::new().with_regex("ready to accept connections"))
///     .with_strategy(HostPortWaitStrategy::new())
///     .with_startup_timeout(Duration::from_secs(60))
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct WaitAllStrategy {
    mode: WaitAllMode,
    strategies: Vec<Box<dyn WaitStrategy>>,
    startup_timeout: Duration,
    /// Set when a child refused the outer timeout, reported when waiting.
    refused: Option<ConfigurationError>,
}

impl WaitAllStrategy {
    /// Create an empty `WaitAllStrategy` with an outer timeout of 30 seconds.
    pub fn new(mode: WaitAllMode) -> Self {
        Self {
            mode,
            strategies: Vec::new(),
            startup_timeout: DEFAULT_OUTER_TIMEOUT,
            refused: None,
        }
    }

    /// Returns how the outer timeout is applied.
    pub fn mode(&self) -> WaitAllMode {
        self.mode
    }

    /// Add a strategy to wait for after the ones already added.
    ///
    /// With [`WaitAllMode::WithOuterTimeout`], the strategy's timeout is replaced by the
    /// outer one.
    pub fn with_strategy(mut self, strategy: impl WaitStrategy + 'static) -> Self {
        let mut strategy: Box<dyn WaitStrategy> = Box::new(strategy);
        if self.mode == WaitAllMode::WithOuterTimeout {
            self.push_timeout(strategy.as_mut());
        }
        self.strategies.push(strategy);
        self
    }

    /// Set the outer timeout.
    ///
    /// Fails with [`ConfigurationError::TimeoutNotSupported`] in
    /// [`WaitAllMode::WithIndividualTimeoutsOnly`].
    pub fn with_startup_timeout(
        mut self,
        startup_timeout: Duration,
    ) -> std::result::Result<Self, ConfigurationError> {
        self.set_startup_timeout(startup_timeout)?;
        Ok(self)
    }

    fn push_timeout(&mut self, strategy: &mut dyn WaitStrategy) {
        if let Err(err) = strategy.set_startup_timeout(self.startup_timeout) {
            log::warn!(
                "{} wait strategy refused the outer timeout: {err}",
                strategy.kind()
            );
            if self.refused.is_none() {
                self.refused = Some(err);
            }
        }
    }
}

impl Default for WaitAllStrategy {
    fn default() -> Self {
        Self::new(WaitAllMode::default())
    }
}

#[async_trait]
impl WaitStrategy for WaitAllStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WaitAll
    }

    fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    fn set_startup_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<(), ConfigurationError> {
        if self.mode == WaitAllMode::WithIndividualTimeoutsOnly {
            return Err(ConfigurationError::TimeoutNotSupported(self.mode));
        }

        self.startup_timeout = timeout;
        if self.mode == WaitAllMode::WithOuterTimeout {
            let mut strategies = std::mem::take(&mut self.strategies);
            for strategy in &mut strategies {
                self.push_timeout(strategy.as_mut());
            }
            self.strategies = strategies;
        }
        Ok(())
    }

    async fn wait_until_ready(&mut self, target: &dyn WaitTarget) -> Result<()> {
        if let Some(err) = &self.refused {
            return Err(err.clone().into());
        }

        let mode = self.mode;
        let ceiling = self.startup_timeout;
        let count = self.strategies.len();
        log::info!(
            "{}: Waiting for {count} strategies ({mode})",
            target.container_id()
        );

        let started = Instant::now();
        for (index, strategy) in self.strategies.iter_mut().enumerate() {
            let kind = strategy.kind();
            log::debug!(
                "{}: Waiting for strategy {} of {count} ({kind})",
                target.container_id(),
                index + 1
            );

            match strategy.wait_until_ready(target).await {
                Ok(()) => {}
                Err(err) if err.is_timeout() && mode != WaitAllMode::WithIndividualTimeoutsOnly => {
                    return Err(WaitError::Timeout {
                        kind: StrategyKind::WaitAll,
                        elapsed: started.elapsed(),
                        detail: format!(
                            "strategy {} of {count} ({kind}) was not ready in time",
                            index + 1
                        ),
                        source: Some(Box::new(err)),
                    });
                }
                Err(err) => return Err(err),
            }

            let elapsed = started.elapsed();
            if mode == WaitAllMode::WithMaximumOuterTimeout && elapsed >= ceiling {
                return Err(WaitError::timeout(
                    StrategyKind::WaitAll,
                    elapsed,
                    format!(
                        "reached the {ceiling:?} limit after strategy {} of {count} ({kind})",
                        index + 1
                    ),
                ));
            }
        }

        log::info!(
            "{}: All {count} strategies are ready",
            target.container_id()
        );
        Ok(())
    }
}
