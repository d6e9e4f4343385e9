//! # Protocol Capability
//!
//! The harness never speaks a wire protocol itself. Runners drive a
//! [`ProtocolClient`], an async capability exposing `connect`, `disconnect`,
//! bulk `read` and bulk `write`. A [`ClientFactory`] hands every worker its
//! own fresh client; clients are never shared between workers.
//!
//! Two targets ship with the crate:
//!
//! - [`tcp`]/[`server`]: a small framed-TCP protocol (length-prefixed
//!   `bincode` frames) and the matching test server. An industrial stack
//!   plugs in behind the same trait.
//! - [`simulated`]: an in-process target with a fixed latency per request,
//!   used for dry runs and the test-suite.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::identity::RunIdentity;

pub mod server;
pub mod simulated;
pub mod tcp;

pub use server::{ServerConfig, TestServer};
pub use simulated::SimulatedTarget;
pub use tcp::{TcpClient, TcpClientFactory};

/// Namespace used for the addressable data points.
pub const DEFAULT_NAMESPACE: u16 = 2;

/// Largest frame accepted on the wire.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Opaque target address of one data point, e.g. `ns=2;s=TestDataPoint`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// String node id in the given namespace.
    pub fn string(namespace: u16, identifier: &str) -> Self {
        Self(format!("ns={};s={}", namespace, identifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client certificate material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateConfig {
    pub application_uri: String,
    pub public_cert: PathBuf,
    pub private_key: PathBuf,
}

/// Everything a client needs to reach and authenticate against the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub endpoint: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub certificate: Option<CertificateConfig>,
}

impl ClientSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user: None,
            password: None,
            certificate: None,
        }
    }
}

/// Connection to the target owned by exactly one worker.
///
/// Timeouts, if any, are the implementation's business and surface as an
/// ordinary error.
#[async_trait]
pub trait ProtocolClient: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    /// Read all `nodes` in one request; one value per node, in order.
    async fn read(&mut self, nodes: &[NodeId]) -> Result<Vec<Vec<u8>>>;

    /// Write `values[i]` to `nodes[i]`, all in one request.
    async fn write(&mut self, nodes: &[NodeId], values: &[Vec<u8>]) -> Result<()>;

    /// Short name for log messages
    fn name(&self) -> &'static str;
}

/// Builds a fresh, unconnected client per worker.
pub trait ClientFactory: Send + Sync {
    fn create(&self, identity: &RunIdentity) -> Box<dyn ProtocolClient>;
}

/// Requests of the framed-TCP protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Hello {
        user: Option<String>,
        password: Option<String>,
        application_uri: Option<String>,
    },
    Read {
        nodes: Vec<NodeId>,
    },
    Write {
        nodes: Vec<NodeId>,
        values: Vec<Vec<u8>>,
    },
    Goodbye,
}

/// Responses of the framed-TCP protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Welcome { server_name: String },
    Values(Vec<Vec<u8>>),
    Written,
    Failure(String),
}

/// Read one `u32` LE length-prefixed `bincode` frame.
pub(crate) async fn read_frame<T, R>(stream: &mut R) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let frame_len = u32::from_le_bytes(len_bytes) as usize;

    if frame_len > MAX_FRAME_LEN {
        return Err(anyhow!("Frame too large: {} bytes", frame_len));
    }

    let mut frame = vec![0u8; frame_len];
    stream.read_exact(&mut frame).await?;
    Ok(bincode::deserialize(&frame)?)
}

/// Write one length-prefixed `bincode` frame and flush.
pub(crate) async fn write_frame<T, W>(stream: &mut W, value: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let frame = bincode::serialize(value)?;
    let frame_len = u32::try_from(frame.len())?;
    stream.write_all(&frame_len.to_le_bytes()).await?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Values of the data points a target serves. Every node is writable.
#[derive(Debug, Default)]
pub struct AddressSpace {
    values: RwLock<HashMap<NodeId, Vec<u8>>>,
}

impl AddressSpace {
    /// Every node starts as `value_size` zero bytes.
    pub fn with_nodes(nodes: &[NodeId], value_size: usize) -> Self {
        let values = nodes
            .iter()
            .map(|node| (node.clone(), vec![0u8; value_size]))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn read(&self, nodes: &[NodeId]) -> Result<Vec<Vec<u8>>, String> {
        let values = self.values.read();
        nodes
            .iter()
            .map(|node| {
                values
                    .get(node)
                    .cloned()
                    .ok_or_else(|| format!("unknown node {}", node))
            })
            .collect()
    }

    pub fn write(&self, nodes: &[NodeId], new_values: &[Vec<u8>]) -> Result<(), String> {
        if nodes.len() != new_values.len() {
            return Err(format!(
                "{} nodes but {} values in write request",
                nodes.len(),
                new_values.len()
            ));
        }
        let mut values = self.values.write();
        if let Some(unknown) = nodes.iter().find(|node| !values.contains_key(*node)) {
            return Err(format!("unknown node {}", unknown));
        }
        for (node, value) in nodes.iter().zip(new_values) {
            values.insert(node.clone(), value.clone());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_format() {
        assert_eq!(
            NodeId::string(DEFAULT_NAMESPACE, "TestDataPoint").as_str(),
            "ns=2;s=TestDataPoint"
        );
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let request = Request::Write {
            nodes: vec![NodeId::new("ns=2;s=a")],
            values: vec![vec![7u8; 64]],
        };

        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, &request).await.unwrap();
        let decoded: Request = read_frame(&mut server).await.unwrap();
        assert_eq!(decoded, request);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_LEN as u32) + 1).to_le_bytes())
            .await
            .unwrap();
        let result: Result<Response> = read_frame(&mut server).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_address_space_rejects_unknown_nodes_atomically() {
        let known = NodeId::string(2, "known");
        let space = AddressSpace::with_nodes(&[known.clone()], 4);

        let err = space
            .write(
                &[known.clone(), NodeId::string(2, "missing")],
                &[vec![1; 4], vec![2; 4]],
            )
            .unwrap_err();
        assert!(err.contains("missing"));
        assert_eq!(space.read(&[known.clone()]).unwrap(), vec![vec![0; 4]]);

        space.write(&[known.clone()], &[vec![9; 8]]).unwrap();
        assert_eq!(space.read(&[known]).unwrap(), vec![vec![9; 8]]);
    }
}
