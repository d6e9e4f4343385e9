//! In-process target with a fixed service time.
//!
//! Every read and write sleeps for the configured latency on the tokio
//! clock before touching the shared address space, so with paused time the
//! measured responsiveness equals the latency exactly.

use super::{AddressSpace, ClientFactory, NodeId, ProtocolClient};
use crate::identity::RunIdentity;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Factory for simulated clients sharing one address space.
#[derive(Debug, Clone)]
pub struct SimulatedTarget {
    space: Arc<AddressSpace>,
    latency: Duration,
    fail_after: Option<usize>,
    refuse_connections: bool,
}

impl SimulatedTarget {
    pub fn new(nodes: &[NodeId], value_size: usize, latency: Duration) -> Self {
        Self {
            space: Arc::new(AddressSpace::with_nodes(nodes, value_size)),
            latency,
            fail_after: None,
            refuse_connections: false,
        }
    }

    /// Every client fails each request after its first `operations` ones.
    pub fn fail_after(mut self, operations: usize) -> Self {
        self.fail_after = Some(operations);
        self
    }

    pub fn refuse_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    pub fn address_space(&self) -> Arc<AddressSpace> {
        Arc::clone(&self.space)
    }
}

impl ClientFactory for SimulatedTarget {
    fn create(&self, _identity: &RunIdentity) -> Box<dyn ProtocolClient> {
        Box::new(SimulatedClient {
            target: self.clone(),
            connected: false,
            operations: 0,
        })
    }
}

pub struct SimulatedClient {
    target: SimulatedTarget,
    connected: bool,
    operations: usize,
}

impl SimulatedClient {
    async fn service(&mut self) -> Result<()> {
        if !self.connected {
            bail!("not connected");
        }
        tokio::time::sleep(self.target.latency).await;
        self.operations += 1;
        match self.target.fail_after {
            Some(limit) if self.operations > limit => {
                Err(anyhow!("injected failure on operation {}", self.operations))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ProtocolClient for SimulatedClient {
    async fn connect(&mut self) -> Result<()> {
        if self.target.refuse_connections {
            bail!("connection refused");
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn read(&mut self, nodes: &[NodeId]) -> Result<Vec<Vec<u8>>> {
        self.service().await?;
        self.target.space.read(nodes).map_err(|e| anyhow!(e))
    }

    async fn write(&mut self, nodes: &[NodeId], values: &[Vec<u8>]) -> Result<()> {
        self.service().await?;
        self.target.space.write(nodes, values).map_err(|e| anyhow!(e))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RunLayout;

    fn node() -> NodeId {
        NodeId::string(2, "TestDataPoint")
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied_per_request() {
        let target = SimulatedTarget::new(&[node()], 64, Duration::from_millis(10));
        let mut client = target.create(&RunIdentity::new("s", RunLayout::Single));
        client.connect().await.unwrap();

        let start = tokio::time::Instant::now();
        let values = client.read(&[node()]).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(10));
        assert_eq!(values, vec![vec![0u8; 64]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_injection_is_per_client() {
        let target = SimulatedTarget::new(&[node()], 8, Duration::from_millis(1)).fail_after(2);
        let identity = RunIdentity::new("s", RunLayout::Single);

        let mut first = target.create(&identity);
        first.connect().await.unwrap();
        assert!(first.read(&[node()]).await.is_ok());
        assert!(first.write(&[node()], &[vec![1; 8]]).await.is_ok());
        assert!(first.read(&[node()]).await.is_err());

        let mut second = target.create(&identity);
        second.connect().await.unwrap();
        assert_eq!(second.read(&[node()]).await.unwrap(), vec![vec![1; 8]]);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let target = SimulatedTarget::new(&[node()], 8, Duration::ZERO).refuse_connections();
        let mut client = target.create(&RunIdentity::new("s", RunLayout::Single));
        assert!(client.connect().await.is_err());
        assert!(client.read(&[node()]).await.is_err());
    }
}
