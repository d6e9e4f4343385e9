use super::{
    read_frame, write_frame, ClientFactory, ClientSettings, NodeId, ProtocolClient, Request,
    Response,
};
use crate::defaults;
use crate::identity::RunIdentity;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Split `scheme://host:port/path` into host and port.
///
/// The scheme and path are optional; a missing port means the protocol's
/// default port.
pub fn parse_endpoint(endpoint: &str) -> Result<(String, u16)> {
    let rest = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        bail!("endpoint '{}' has no host", endpoint);
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("invalid port in endpoint '{}'", endpoint))?;
            if host.is_empty() {
                bail!("endpoint '{}' has no host", endpoint);
            }
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), defaults::SERVER_PORT)),
    }
}

/// Client of the bundled framed-TCP target.
pub struct TcpClient {
    settings: ClientSettings,
    stream: Option<TcpStream>,
}

impl TcpClient {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            stream: None,
        }
    }

    async fn call(&mut self, request: &Request) -> Result<Response> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("not connected to {}", self.settings.endpoint))?;
        write_frame(stream, request).await?;
        match read_frame(stream).await? {
            Response::Failure(reason) => Err(anyhow!("target refused request: {}", reason)),
            response => Ok(response),
        }
    }
}

#[async_trait]
impl ProtocolClient for TcpClient {
    async fn connect(&mut self) -> Result<()> {
        let (host, port) = parse_endpoint(&self.settings.endpoint)?;
        debug!("Connecting to {}:{}", host, port);

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| anyhow!("timed out connecting to {}", self.settings.endpoint))?
            .with_context(|| format!("could not connect to {}", self.settings.endpoint))?;

        // Requests are small and latency-bound
        socket2::SockRef::from(&stream).set_nodelay(true)?;
        self.stream = Some(stream);

        let hello = Request::Hello {
            user: self.settings.user.clone(),
            password: self.settings.password.clone(),
            application_uri: self
                .settings
                .certificate
                .as_ref()
                .map(|c| c.application_uri.clone()),
        };
        match self.call(&hello).await {
            Ok(Response::Welcome { server_name }) => {
                debug!("Session established with '{}'", server_name);
                Ok(())
            }
            Ok(other) => {
                self.stream = None;
                Err(anyhow!("unexpected handshake response {:?}", other))
            }
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self.stream.take() {
            Some(mut stream) => write_frame(&mut stream, &Request::Goodbye).await,
            None => Ok(()),
        }
    }

    async fn read(&mut self, nodes: &[NodeId]) -> Result<Vec<Vec<u8>>> {
        let request = Request::Read {
            nodes: nodes.to_vec(),
        };
        match self.call(&request).await? {
            Response::Values(values) if values.len() == nodes.len() => Ok(values),
            Response::Values(values) => Err(anyhow!(
                "asked for {} values, got {}",
                nodes.len(),
                values.len()
            )),
            other => Err(anyhow!("unexpected read response {:?}", other)),
        }
    }

    async fn write(&mut self, nodes: &[NodeId], values: &[Vec<u8>]) -> Result<()> {
        let request = Request::Write {
            nodes: nodes.to_vec(),
            values: values.to_vec(),
        };
        match self.call(&request).await? {
            Response::Written => Ok(()),
            other => Err(anyhow!("unexpected write response {:?}", other)),
        }
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// One [`TcpClient`] per worker, all with the same settings.
#[derive(Debug, Clone)]
pub struct TcpClientFactory {
    settings: ClientSettings,
}

impl TcpClientFactory {
    pub fn new(settings: ClientSettings) -> Self {
        Self { settings }
    }
}

impl ClientFactory for TcpClientFactory {
    fn create(&self, identity: &RunIdentity) -> Box<dyn ProtocolClient> {
        debug!("Creating tcp client for {}", identity);
        Box::new(TcpClient::new(self.settings.clone()))
    }
}
