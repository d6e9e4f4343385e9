use super::{read_frame, write_frame, AddressSpace, NodeId, Request, Response};
use anyhow::{bail, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use std::time::Duration;
use tracing::{debug, info, warn};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Settings of the bundled test target.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub nodes: Vec<NodeId>,
    /// Initial size, in zero bytes, of every node value
    pub value_size: usize,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Framed-TCP target serving a writable address space.
///
/// Each connection gets its own task; requests on one connection are served
/// in order.
pub struct TestServer {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    space: Arc<AddressSpace>,
}

impl TestServer {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        if config.nodes.is_empty() {
            bail!("test server needs at least one node");
        }
        if config.user.is_some() != config.password.is_some() {
            bail!("user and password must be given together");
        }

        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let space = Arc::new(AddressSpace::with_nodes(&config.nodes, config.value_size));

        info!(
            "Test server '{}' listening on {} with {} node(s)",
            config.name,
            listener.local_addr()?,
            space.len()
        );

        Ok(Self {
            listener,
            config: Arc::new(config),
            space,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn address_space(&self) -> Arc<AddressSpace> {
        Arc::clone(&self.space)
    }

    /// Accept connections until the task is dropped.
    ///
    /// A failed accept or socket option only costs that one connection.
    pub async fn serve(self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    // out of descriptors and the like; let in-flight sessions drain
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            if let Err(e) = socket2::SockRef::from(&stream).set_nodelay(true) {
                warn!("Dropping connection from {}: {}", peer, e);
                continue;
            }
            debug!("Accepted connection from {}", peer);

            let config = Arc::clone(&self.config);
            let space = Arc::clone(&self.space);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &config, &space).await {
                    debug!("Connection from {} closed: {:#}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    config: &ServerConfig,
    space: &AddressSpace,
) -> Result<()> {
    match read_frame(&mut stream).await? {
        Request::Hello {
            user,
            password,
            application_uri,
        } => {
            if let Some(uri) = application_uri {
                debug!("Client application {}", uri);
            }
            if config.user.is_some() && (user != config.user || password != config.password) {
                warn!("Rejected session: bad credentials");
                let reason = "bad credentials".to_string();
                write_frame(&mut stream, &Response::Failure(reason)).await?;
                return Ok(());
            }
            let welcome = Response::Welcome {
                server_name: config.name.clone(),
            };
            write_frame(&mut stream, &welcome).await?;
        }
        other => {
            let reason = format!("expected Hello, got {:?}", other);
            write_frame(&mut stream, &Response::Failure(reason)).await?;
            return Ok(());
        }
    }

    loop {
        let response = match read_frame(&mut stream).await? {
            Request::Read { nodes } => match space.read(&nodes) {
                Ok(values) => Response::Values(values),
                Err(reason) => Response::Failure(reason),
            },
            Request::Write { nodes, values } => match space.write(&nodes, &values) {
                Ok(()) => Response::Written,
                Err(reason) => Response::Failure(reason),
            },
            Request::Goodbye => return Ok(()),
            Request::Hello { .. } => Response::Failure("session already established".to_string()),
        };
        write_frame(&mut stream, &response).await?;
    }
}
