//! # OPC UA Server Benchmark Library
//!
//! Measures how an OPC UA server behaves under load: how fast it answers one
//! client (responsiveness), how much that varies (jitter), how many bytes per
//! second it moves (throughput), and how all of that degrades as clients are
//! added (scalability).
//!
//! ## Experiments
//!
//! - **responsiveness_jitter_throughput**: one client reads then writes the
//!   configured nodes `num_requests` times each
//! - **scalability**: N clients run the same workload concurrently
//! - **scalability_evolution**: one scalability run per client count of a list
//!
//! Every client writes one CSV file per operation kind into
//! `<data_dir>/<session>/`; analysis turns those into
//! `<data_dir>/<session>/results/<kind>_summary.json`.
//!
//! ## Architecture Overview
//!
//! - `workload`: one client's measurement loop (`WorkloadRunner`)
//! - `fanout`: N concurrent runners on a shared clock
//! - `scalability`: the client-count sweep
//! - `store`: sample artifacts on disk, naming and discovery
//! - `aggregate`: per-group statistics and the JSON summaries
//! - `experiment`: the experiment registry and controller driving all of it
//! - `protocol`: the client abstraction, a TCP client, a bundled test
//!   server and an in-process simulated target
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use opcua_server_benchmark::{
//!     ExperimentController, ExperimentKind, ExperimentRegistry, NodeId, OperationKind,
//!     RunParameters, SimulatedTarget, WorkloadShape,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let nodes = vec![NodeId::string(2, "TestDataPoint")];
//!     let target = SimulatedTarget::new(&nodes, 64, Duration::from_millis(10));
//!     let shape = WorkloadShape {
//!         num_requests: 100,
//!         data_size: 64,
//!         nodes,
//!         mode: Some(OperationKind::Read),
//!     };
//!
//!     let controller = ExperimentController::new(ExperimentRegistry::with_defaults(), "data");
//!     let params = RunParameters { n_clients: 10, client_counts: vec![1, 3, 5] };
//!     let reports = controller
//!         .run_experiments(
//!             &[ExperimentKind::SingleRun],
//!             "demo",
//!             Arc::new(target),
//!             Arc::new(shape),
//!             &params,
//!             true,
//!         )
//!         .await;
//!     for report in reports {
//!         println!("{}: {:?}", report.kind, report.analysis);
//!     }
//! }
//! ```

/// Merging sample sets into per-group statistics and summary files
pub mod aggregate;

/// Command-line interface
///
/// Argument parsing with clap for the `server`, `run-experiment` and
/// `post-process` subcommands.
pub mod cli;

/// YAML workload configuration
pub mod config;

pub mod error;

/// Experiment kinds, their registry and the controller running them
pub mod experiment;

/// Concurrent runners sharing one clock
pub mod fanout;

pub mod identity;

pub mod logging;

/// Summary statistics
///
/// Responsiveness, jitter and throughput of a sample set, mean-of-means across
/// sets, and an HDR-histogram latency profile for log output.
pub mod metrics;

/// Client abstraction and the targets it can talk to
pub mod protocol;

pub mod sample;

/// Client-count sweep
pub mod scalability;

/// Sample artifacts on disk
pub mod store;

pub mod utils;

/// Single client measurement loop
pub mod workload;

pub use aggregate::{Aggregator, Analysis, OrderedSummary};
pub use cli::Args;
pub use config::BenchConfig;
pub use error::{BenchError, Result};
pub use experiment::{
    ExperimentController, ExperimentKind, ExperimentRegistry, ExperimentReport, RunParameters,
};
pub use fanout::{ConcurrentFanout, FanoutReport};
pub use identity::{RunIdentity, RunLayout, SampleSetId};
pub use metrics::{AggregateStat, LatencyProfile, SummaryStat};
pub use protocol::{
    ClientFactory, ClientSettings, NodeId, ProtocolClient, ServerConfig, SimulatedTarget,
    TcpClientFactory, TestServer,
};
pub use sample::{OperationKind, RunClock, Sample, SampleSet};
pub use scalability::ScalabilityDriver;
pub use store::SampleStore;
pub use workload::{WorkloadRunner, WorkloadShape};

/// The current version of the benchmark
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Requests per operation kind when the configuration does not say
    pub const NUM_REQUESTS: usize = 1000;

    /// Bytes written to each node per write request
    pub const DATA_SIZE: usize = 64;

    /// Concurrent clients of the scalability experiment
    pub const N_CLIENTS: usize = 10;

    /// Client counts of the scalability evolution experiment
    pub const CLIENT_COUNTS: &str = "1,3,5,10";

    /// Root of the session directories
    pub const DATA_DIR: &str = "data";

    pub const CONFIG_PATH: &str = "experiments/config.yaml";

    /// Standard OPC UA binary port
    pub const SERVER_PORT: u16 = 4840;

    /// Identifier of the node the bundled server exposes by default
    pub const NODE_IDENTIFIER: &str = "TestDataPoint";
}
