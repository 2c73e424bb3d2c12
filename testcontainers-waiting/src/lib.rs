#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Readiness wait strategies for containers started from integration tests.
//!
//! A container that has been started is rarely usable right away: a database is still
//! replaying its journal, a web server is still binding its socket. This crate provides
//! the strategies a container launcher uses to block until the container is actually ready.
//!
//! # Usage
//!
//! The launcher implements [`WaitTarget`] for its running container, picks a [`WaitStrategy`]
//! and calls [`WaitStrategy::wait_until_ready`] once the container process has been started.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use testcontainers_waiting::{
//!     core::wait::{HostPortWaitStrategy, LogMessageWaitStrategy, WaitAllStrategy},
//!     WaitError, WaitStrategy, WaitTarget,
//! };
//!
//! async fn wait_for_postgres(target: &dyn WaitTarget) -> Result<(), WaitError> {
//!     let mut strategy = WaitAllStrategy::default()
//!         .with_strategy(
//!             LogMessageWaitStrategy::new()
//!                 .with_regex(".*database system is ready to accept connections.*")
//!                 .with_times(2),
//!         )
//!         .with_strategy(HostPortWaitStrategy::new())
//!         .with_startup_timeout(Duration::from_secs(60))?;
//!
//!     strategy.wait_until_ready(target).await
//! }
//! ```
//!
//! Every strategy polls the target until its condition holds or its startup timeout elapses.
//! Transient failures (connection refused, unexpected status code, non-zero exit code) are
//! retried; configuration errors and unsupported targets fail immediately.
//!
//! # Features
//!
//! - `http_wait` (enabled by default): [`core::wait::HttpWaitStrategy`], backed by `reqwest`.

pub mod core;

pub use crate::core::{
    error::{ConfigurationError, TargetError, WaitError},
    target::{ExecResult, WaitTarget},
    wait::{WaitFor, WaitStrategy},
};
