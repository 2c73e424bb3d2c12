use std::collections::BTreeSet;

use async_trait::async_trait;
use url::Host;

use crate::core::error::TargetError;

/// Read-only view of a started container, as seen by wait strategies.
///
/// Implemented by whatever owns the container's lifecycle. Every method returns a fresh
/// snapshot: the container may change state concurrently, so strategies never cache
/// answers across polls.
#[async_trait]
pub trait WaitTarget: Send + Sync {
    /// Returns the id of the container.
    fn container_id(&self) -> &str;

    /// Returns the host that the container may be reached on (may not be the local machine).
    async fn host(&self) -> Result<Host, TargetError>;

    /// Returns `true` while the container's main process is running.
    async fn is_running(&self) -> Result<bool, TargetError>;

    /// Returns `true` once the container's health status is `healthy`.
    ///
    /// Fails with [`TargetError::NotSupported`] if the image declares no healthcheck.
    async fn is_healthy(&self) -> Result<bool, TargetError>;

    /// Returns the container-side ports declared when the container was created.
    async fn exposed_ports(&self) -> Result<BTreeSet<u16>, TargetError>;

    /// Returns the host port that the given container port is mapped to.
    ///
    /// Fails with [`TargetError::PortNotMapped`] if the port is not mapped.
    async fn mapped_port(&self, container_port: u16) -> Result<u16, TargetError>;

    /// Returns stdout and stderr of the container, from the start up to now.
    async fn logs(&self) -> Result<String, TargetError>;

    /// Executes a command inside the container and waits for it to exit.
    ///
    /// Targets without an exec transport keep the default, which reports the
    /// operation as unsupported.
    async fn exec(&self, cmd: Vec<String>) -> Result<ExecResult, TargetError> {
        log::debug!("Cannot execute {cmd:?}: no exec transport");
        Err(TargetError::not_supported(self.container_id(), "exec"))
    }

    /// Returns the host ports of every exposed container port.
    ///
    /// Strategies that were not given an explicit port check these instead.
    async fn liveness_check_ports(&self) -> Result<BTreeSet<u16>, TargetError> {
        let mut host_ports = BTreeSet::new();
        for container_port in self.exposed_ports().await? {
            host_ports.insert(self.mapped_port(container_port).await?);
        }
        Ok(host_ports)
    }
}

/// Outcome of a command executed inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn new(exit_code: i64) -> Self {
        Self {
            exit_code,
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}


#[cfg(test)]
mod tests {
    use super::{mock::MockTarget, *};

    #[tokio::test]
    async fn liveness_check_ports_are_the_mapped_host_ports() {
        let target = MockTarget::new().with_port(80, 32768).with_port(443, 32769);

        let ports = target.liveness_check_ports().await.unwrap();

        assert_eq!(ports, BTreeSet::from([32768, 32769]));
    }

    #[tokio::test]
    async fn liveness_check_ports_fail_for_unmapped_exposed_port() {
        let target = MockTarget::new()
            .with_port(80, 32768)
            .with_unmapped_port(5432);

        let err = target.liveness_check_ports().await.unwrap_err();

        assert!(matches!(err, TargetError::PortNotMapped { port: 5432, .. }));
    }

    #[tokio::test]
    async fn default_exec_is_not_supported() {
        struct NoExec;

        #[async_trait]
        impl WaitTarget for NoExec {
            fn container_id(&self) -> &str {
                "no-exec"
            }
            async fn host(&self) -> Result<Host, TargetError> {
                Ok(Host::Domain("localhost".to_owned()))
            }
            async fn is_running(&self) -> Result<bool, TargetError> {
                Ok(true)
            }
            async fn is_healthy(&self) -> Result<bool, TargetError> {
                Ok(true)
            }
            async fn exposed_ports(&self) -> Result<BTreeSet<u16>, TargetError> {
                Ok(BTreeSet::new())
            }
            async fn mapped_port(&self, port: u16) -> Result<u16, TargetError> {
                Err(TargetError::PortNotMapped {
                    id: "no-exec".to_owned(),
                    port,
                })
            }
            async fn logs(&self) -> Result<String, TargetError> {
                Ok(String::new())
            }
        }

        let err = NoExec.exec(vec!["true".to_owned()]).await.unwrap_err();

        assert!(err.is_not_supported());
    }
}
