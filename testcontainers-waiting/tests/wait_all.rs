use std::{error::Error, time::Duration};

use axum::{routing::get, Router};
use testcontainers_waiting::{
    core::{
        wait::{HostPortWaitStrategy, LogMessageWaitStrategy, WaitAllMode, WaitAllStrategy},
        StrategyKind,
    },
    WaitError, WaitFor, WaitStrategy,
};
use tokio::net::TcpListener;

mod common;

use common::{serve, LocalTarget};

#[tokio::test]
async fn composite_waits_for_logs_then_ports() -> anyhow::Result<()> {
    let _ = pretty_env_logger::try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let http_port = serve(Router::new().route("/", get(|| async { "Hello, World!" }))).await?;
    let target = LocalTarget::new()
        .with_port(5432, listener.local_addr()?.port())
        .with_port(8080, http_port);

    let background = target.clone();
    tokio::spawn(async move {
        background.log("database system is starting up");
        tokio::time::sleep(Duration::from_millis(200)).await;
        background.log("database system is ready to accept connections");
        tokio::time::sleep(Duration::from_millis(200)).await;
        background.log("database system is ready to accept connections");
    });

    let mut strategy = WaitFor::all(
        WaitAllStrategy::default()
            .with_strategy(
                LogMessageWaitStrategy::new()
                    .with_regex("ready to accept connections")
                    .with_times(2)
                    .with_poll_interval(Duration::from_millis(50)),
            )
            .with_strategy(
                HostPortWaitStrategy::new().with_poll_interval(Duration::from_millis(50)),
            )
            .with_startup_timeout(Duration::from_secs(5))?,
    );

    strategy.wait_until_ready(&target).await?;

    assert_eq!(strategy.kind(), StrategyKind::WaitAll);
    Ok(())
}

#[cfg(feature = "http_wait")]
#[tokio::test]
async fn composite_with_http_child() -> anyhow::Result<()> {
    use testcontainers_waiting::core::wait::HttpWaitStrategy;

    let http_port = serve(Router::new().route("/", get(|| async { "Hello, World!" }))).await?;
    let target = LocalTarget::new().with_port(8080, http_port);
    target.log("server is ready");

    let mut strategy = WaitAllStrategy::new(WaitAllMode::WithIndividualTimeoutsOnly)
        .with_strategy(WaitFor::log_message("server is ready"))
        .with_strategy(
            HttpWaitStrategy::default()
                .with_response_predicate(|body| body.starts_with("Hello"))
                .with_startup_timeout(Duration::from_secs(5)),
        );

    strategy.wait_until_ready(&target).await?;
    Ok(())
}

#[tokio::test]
async fn outer_timeout_bounds_a_stuck_child() -> anyhow::Result<()> {
    let target = LocalTarget::new();
    target.log("still booting");

    let mut strategy = WaitAllStrategy::new(WaitAllMode::WithOuterTimeout)
        .with_strategy(
            LogMessageWaitStrategy::new()
                .with_regex("ready")
                .with_startup_timeout(Duration::from_secs(60))
                .with_poll_interval(Duration::from_millis(50)),
        )
        .with_startup_timeout(Duration::from_millis(300))?;

    let err = strategy.wait_until_ready(&target).await.unwrap_err();

    match &err {
        WaitError::Timeout { kind, elapsed, .. } => {
            assert_eq!(*kind, StrategyKind::WaitAll);
            assert!(*elapsed < Duration::from_secs(5), "{elapsed:?}");
        }
        other => panic!("unexpected error: {other}"),
    }
    let source = err.source().map(ToString::to_string).unwrap_or_default();
    assert!(
        source.starts_with("log_message wait strategy timed out"),
        "{source}"
    );
    Ok(())
}
