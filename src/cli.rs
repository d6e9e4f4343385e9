use crate::defaults;
use crate::error::Result;
use crate::experiment::ExperimentKind;
use crate::protocol::{NodeId, ServerConfig, DEFAULT_NAMESPACE};
use crate::sample::OperationKind;
use crate::utils::parse_client_counts;
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// OPC UA server benchmark - responsiveness, jitter, throughput and scalability experiments
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[clap(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also write plain-text logs to this file
    #[clap(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the bundled test server
    Server(ServerArgs),

    /// Run one or more experiments against the configured server
    RunExperiment(RunArgs),

    /// Analyze the data of already-run sessions
    PostProcess(PostProcessArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServerArgs {
    /// Address to listen on
    #[clap(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[clap(long, default_value_t = defaults::SERVER_PORT)]
    pub port: u16,

    /// Name announced to clients
    #[clap(long, default_value = "TestServer")]
    pub name: String,

    /// Identifier of a served node (repeatable)
    #[clap(long = "node", default_values_t = vec![defaults::NODE_IDENTIFIER.to_string()])]
    pub nodes: Vec<String>,

    /// Initial size in bytes of every node value
    #[clap(long, default_value_t = defaults::DATA_SIZE)]
    pub value_size: usize,

    /// Require this user name
    #[clap(long, requires = "password")]
    pub user: Option<String>,

    /// Password for --user
    #[clap(long, requires = "user")]
    pub password: Option<String>,
}

impl From<&ServerArgs> for ServerConfig {
    fn from(args: &ServerArgs) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            name: args.name.clone(),
            nodes: args
                .nodes
                .iter()
                .map(|identifier| NodeId::string(DEFAULT_NAMESPACE, identifier))
                .collect(),
            value_size: args.value_size,
            user: args.user.clone(),
            password: args.password.clone(),
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Experiments to run, in order
    #[clap(value_enum, required = true, num_args = 1..)]
    pub experiments: Vec<ExperimentKind>,

    /// Workload configuration file (YAML)
    #[clap(short = 'c', long, default_value = defaults::CONFIG_PATH)]
    pub config: PathBuf,

    /// Session name; defaults to the current date and time
    #[clap(short = 'n', long)]
    pub name: Option<String>,

    /// Analyze the data right after each experiment
    #[clap(short = 'p', long, default_value_t = false)]
    pub post_process: bool,

    /// Only read or only write (default: read, then write)
    #[clap(short = 'm', long)]
    pub mode: Option<OperationKind>,

    /// Number of concurrent clients for the scalability experiment
    #[clap(long, default_value_t = defaults::N_CLIENTS)]
    pub nclients: usize,

    /// Read at most this many nodes (default: every configured node)
    #[clap(long)]
    pub nnodes: Option<usize>,

    /// Client counts for the scalability evolution experiment, e.g. "1,10,50"
    #[clap(long, default_value = defaults::CLIENT_COUNTS)]
    pub listclients: String,

    /// Directory holding the session directories
    #[clap(long, default_value = defaults::DATA_DIR)]
    pub data_dir: PathBuf,

    /// Run against an in-process simulated server with this latency (e.g. "10ms")
    #[clap(long, value_parser = parse_duration)]
    pub simulate: Option<Duration>,
}

impl RunArgs {
    pub fn client_counts(&self) -> Result<Vec<usize>> {
        parse_client_counts(&self.listclients)
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PostProcessArgs {
    /// Sessions to analyze
    #[clap(required = true, num_args = 1..)]
    pub sessions: Vec<String>,

    /// Directory holding the session directories
    #[clap(long, default_value = defaults::DATA_DIR)]
    pub data_dir: PathBuf,
}

/// Parse duration from string (e.g., "10ms", "1.5s", "5m")
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let seconds = match unit {
        "ms" => num / 1_000.0,
        "s" => num,
        "m" => num * 60.0,
        "h" => num * 3600.0,
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("10ms").unwrap(), Duration::from_millis(10));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("-5ms").is_err());
    }

    #[test]
    fn test_run_experiment_defaults() {
        let args = Args::parse_from([
            "opcua-server-benchmark",
            "run-experiment",
            "scalability_evolution",
            "responsiveness_jitter_throughput",
        ]);
        let Command::RunExperiment(run) = args.command else {
            panic!("expected run-experiment");
        };
        assert_eq!(
            run.experiments,
            vec![ExperimentKind::ScalabilityEvolution, ExperimentKind::SingleRun]
        );
        assert_eq!(run.config, PathBuf::from(defaults::CONFIG_PATH));
        assert_eq!(run.nclients, defaults::N_CLIENTS);
        assert_eq!(run.client_counts().unwrap(), vec![1, 3, 5, 10]);
        assert!(run.name.is_none());
        assert!(run.mode.is_none());
        assert!(!run.post_process);
    }

    #[test]
    fn test_run_experiment_options() {
        let args = Args::parse_from([
            "opcua-server-benchmark",
            "-vv",
            "run-experiment",
            "scalability",
            "-n",
            "bench",
            "-p",
            "-m",
            "write",
            "--nclients",
            "20",
            "--nnodes",
            "4",
            "--listclients",
            "1,10,50",
            "--simulate",
            "10ms",
        ]);
        assert_eq!(args.verbose, 2);
        let Command::RunExperiment(run) = args.command else {
            panic!("expected run-experiment");
        };
        assert_eq!(run.name.as_deref(), Some("bench"));
        assert!(run.post_process);
        assert_eq!(run.mode, Some(OperationKind::Write));
        assert_eq!(run.nclients, 20);
        assert_eq!(run.nnodes, Some(4));
        assert_eq!(run.client_counts().unwrap(), vec![1, 10, 50]);
        assert_eq!(run.simulate, Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_unknown_experiment_is_rejected() {
        assert!(Args::try_parse_from(["opcua-server-benchmark", "run-experiment", "latency"]).is_err());
        assert!(Args::try_parse_from(["opcua-server-benchmark", "run-experiment"]).is_err());
    }

    #[test]
    fn test_server_args() {
        let args = Args::parse_from([
            "opcua-server-benchmark",
            "server",
            "--port",
            "4841",
            "--node",
            "A",
            "--node",
            "B",
        ]);
        let Command::Server(server) = args.command else {
            panic!("expected server");
        };
        let config = ServerConfig::from(&server);
        assert_eq!(config.port, 4841);
        assert_eq!(config.nodes, vec![NodeId::new("ns=2;s=A"), NodeId::new("ns=2;s=B")]);
        assert_eq!(config.value_size, defaults::DATA_SIZE);
        assert!(config.user.is_none());

        assert!(Args::try_parse_from(["opcua-server-benchmark", "server", "--user", "u"]).is_err());
    }

    #[test]
    fn test_post_process_args() {
        let args = Args::parse_from(["opcua-server-benchmark", "post-process", "a", "b"]);
        let Command::PostProcess(post) = args.command else {
            panic!("expected post-process");
        };
        assert_eq!(post.sessions, vec!["a", "b"]);
        assert_eq!(post.data_dir, PathBuf::from(defaults::DATA_DIR));
    }
}
