//! YAML workload configuration.
//!
//! ```yaml
//! server_url: "opc.tcp://localhost:4840/freeopcua/server/"
//! nodes_to_query_ids:
//!   - identifier: TestDataPoint
//! server_user: user          # optional
//! server_password: secret    # optional
//! num_requests: 1000         # optional
//! data_size: 64              # optional
//! ```
//!
//! Everything is checked before any worker starts; a problem surfaces as
//! [`BenchError::Configuration`].

use crate::defaults;
use crate::error::{BenchError, Result};
use crate::protocol::{CertificateConfig, ClientSettings, NodeId, DEFAULT_NAMESPACE};
use crate::sample::OperationKind;
use crate::workload::WorkloadShape;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeEntry {
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BenchConfig {
    pub server_url: Option<String>,
    pub nodes_to_query_ids: Option<Vec<NodeEntry>>,
    pub server_user: Option<String>,
    pub server_password: Option<String>,
    pub server_certificate_application_uri: Option<String>,
    pub server_public_cert: Option<PathBuf>,
    pub server_private_cert: Option<PathBuf>,
    #[serde(default = "default_num_requests")]
    pub num_requests: usize,
    #[serde(default = "default_data_size")]
    pub data_size: usize,
}

fn default_num_requests() -> usize {
    defaults::NUM_REQUESTS
}

fn default_data_size() -> usize {
    defaults::DATA_SIZE
}

impl BenchConfig {
    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_yaml(&content, path)
    }

    /// Parse and validate; `origin` only labels errors.
    pub fn from_yaml(content: &str, origin: &Path) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|source| BenchError::Yaml {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.server_url.as_deref() {
            None => return Err(BenchError::config("missing required field server_url")),
            Some(url) if url.trim().is_empty() => {
                return Err(BenchError::config("server_url is empty"))
            }
            Some(_) => {}
        }
        match &self.nodes_to_query_ids {
            None => {
                return Err(BenchError::config(
                    "missing required field nodes_to_query_ids",
                ))
            }
            Some(nodes) if nodes.is_empty() => {
                return Err(BenchError::config("nodes_to_query_ids is empty"))
            }
            Some(nodes) => {
                if nodes.iter().any(|n| n.identifier.trim().is_empty()) {
                    return Err(BenchError::config("node identifiers must not be empty"));
                }
            }
        }
        if self.num_requests == 0 {
            return Err(BenchError::config("num_requests must be at least 1"));
        }
        if self.data_size == 0 {
            return Err(BenchError::config("data_size must be at least 1"));
        }
        if self.server_user.is_some() != self.server_password.is_some() {
            return Err(BenchError::config(
                "server_user and server_password must be given together",
            ));
        }
        self.certificate()?;
        Ok(())
    }

    /// Namespace-qualified ids of the configured nodes, in file order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes_to_query_ids
            .iter()
            .flatten()
            .map(|n| NodeId::string(DEFAULT_NAMESPACE, &n.identifier))
            .collect()
    }

    fn certificate(&self) -> Result<Option<CertificateConfig>> {
        match (
            &self.server_certificate_application_uri,
            &self.server_public_cert,
            &self.server_private_cert,
        ) {
            (None, None, None) => Ok(None),
            (Some(application_uri), Some(public_cert), Some(private_key)) => {
                Ok(Some(CertificateConfig {
                    application_uri: application_uri.clone(),
                    public_cert: public_cert.clone(),
                    private_key: private_key.clone(),
                }))
            }
            _ => Err(BenchError::config(
                "certificate configuration needs server_certificate_application_uri, \
                 server_public_cert and server_private_cert",
            )),
        }
    }

    pub fn client_settings(&self) -> Result<ClientSettings> {
        let endpoint = self
            .server_url
            .clone()
            .ok_or_else(|| BenchError::config("missing required field server_url"))?;
        Ok(ClientSettings {
            endpoint,
            user: self.server_user.clone(),
            password: self.server_password.clone(),
            certificate: self.certificate()?,
        })
    }

    /// Workload every client runs, optionally capped to the first `max_nodes` nodes.
    pub fn workload_shape(
        &self,
        mode: Option<OperationKind>,
        max_nodes: Option<usize>,
    ) -> Result<WorkloadShape> {
        let mut shape = WorkloadShape {
            num_requests: self.num_requests,
            data_size: self.data_size,
            nodes: self.node_ids(),
            mode,
        };
        if let Some(limit) = max_nodes {
            if limit == 0 {
                return Err(BenchError::config("node cap must be at least 1"));
            }
            shape.cap_nodes(limit);
        }
        shape.validate()?;
        Ok(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
server_url: "opc.tcp://localhost:4840/freeopcua/server/"
nodes_to_query_ids:
  - identifier: A
  - identifier: B
  - identifier: C
"#;

    fn parse(yaml: &str) -> Result<BenchConfig> {
        BenchConfig::from_yaml(yaml, Path::new("test.yaml"))
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.num_requests, defaults::NUM_REQUESTS);
        assert_eq!(config.data_size, defaults::DATA_SIZE);
        assert_eq!(
            config.node_ids(),
            vec![
                NodeId::new("ns=2;s=A"),
                NodeId::new("ns=2;s=B"),
                NodeId::new("ns=2;s=C")
            ]
        );
        let settings = config.client_settings().unwrap();
        assert!(settings.user.is_none());
        assert!(settings.certificate.is_none());
    }

    #[test]
    fn test_missing_required_fields() {
        let err = parse("nodes_to_query_ids:\n  - identifier: A\n").unwrap_err();
        assert!(err.to_string().contains("server_url"));

        let err = parse("server_url: opc.tcp://h:1\n").unwrap_err();
        assert!(err.to_string().contains("nodes_to_query_ids"));

        let err = parse("server_url: opc.tcp://h:1\nnodes_to_query_ids: []\n").unwrap_err();
        assert!(matches!(err, BenchError::Configuration(_)));
    }

    #[test]
    fn test_incomplete_certificate_is_rejected() {
        let yaml = format!("{}server_public_cert: cert.der\n", MINIMAL);
        assert!(matches!(parse(&yaml), Err(BenchError::Configuration(_))));

        let yaml = format!(
            "{}server_certificate_application_uri: urn:bench\nserver_public_cert: cert.der\nserver_private_cert: key.pem\n",
            MINIMAL
        );
        let certificate = parse(&yaml).unwrap().client_settings().unwrap().certificate;
        assert_eq!(certificate.unwrap().application_uri, "urn:bench");
    }

    #[test]
    fn test_node_cap() {
        let config = parse(MINIMAL).unwrap();
        let shape = config.workload_shape(Some(OperationKind::Read), Some(2)).unwrap();
        assert_eq!(shape.nodes.len(), 2);

        let shape = config.workload_shape(None, Some(10)).unwrap();
        assert_eq!(shape.nodes.len(), 3);

        assert!(config.workload_shape(None, Some(0)).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}num_requests: 5\ndata_size: 128\n", MINIMAL).unwrap();

        let config = BenchConfig::load(file.path()).unwrap();
        assert_eq!(config.num_requests, 5);
        assert_eq!(config.data_size, 128);

        assert!(matches!(
            BenchConfig::load("/definitely/not/here.yaml"),
            Err(BenchError::Io { .. })
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            parse("server_url: [unclosed"),
            Err(BenchError::Yaml { .. })
        ));
    }
}
