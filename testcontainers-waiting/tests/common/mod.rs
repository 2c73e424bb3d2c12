use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use testcontainers_waiting::{TargetError, WaitTarget};
use url::Host;

/// Stands in for a container whose ports are served by the test process itself.
#[derive(Debug, Clone)]
pub struct LocalTarget {
    ports: BTreeMap<u16, u16>,
    logs: Arc<Mutex<String>>,
}

impl LocalTarget {
    pub fn new() -> Self {
        Self {
            ports: BTreeMap::new(),
            logs: Arc::default(),
        }
    }

    pub fn with_port(mut self, container_port: u16, host_port: u16) -> Self {
        self.ports.insert(container_port, host_port);
        self
    }

    pub fn log(&self, line: &str) {
        let mut logs = self.logs.lock().unwrap();
        logs.push_str(line);
        logs.push('\n');
    }
}

#[async_trait]
impl WaitTarget for LocalTarget {
    fn container_id(&self) -> &str {
        "local"
    }

    async fn host(&self) -> Result<Host, TargetError> {
        Ok(Host::Ipv4([127, 0, 0, 1].into()))
    }

    async fn is_running(&self) -> Result<bool, TargetError> {
        Ok(true)
    }

    async fn is_healthy(&self) -> Result<bool, TargetError> {
        Err(TargetError::not_supported("local", "healthcheck"))
    }

    async fn exposed_ports(&self) -> Result<BTreeSet<u16>, TargetError> {
        Ok(self.ports.keys().copied().collect())
    }

    async fn mapped_port(&self, container_port: u16) -> Result<u16, TargetError> {
        self.ports
            .get(&container_port)
            .copied()
            .ok_or_else(|| TargetError::PortNotMapped {
                id: "local".to_owned(),
                port: container_port,
            })
    }

    async fn logs(&self) -> Result<String, TargetError> {
        Ok(self.logs.lock().unwrap().clone())
    }
}

/// Serves `app` on an ephemeral local port and returns that port.
pub async fn serve(app: axum::Router) -> anyhow::Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await
    });
    Ok(port)
}
