//! # OPC UA Server Benchmark - Main Entry Point
//!
//! Three subcommands:
//! - `server`: start the bundled test server
//! - `run-experiment`: run experiments against the configured server (or a
//!   simulated one) and optionally analyze them right away
//! - `post-process`: analyze sessions that were already run
//!
//! ## Error Handling
//!
//! A malformed or missing configuration aborts `run-experiment` before any
//! client starts. Once experiments are running, a failing experiment is
//! logged and the next requested one still runs.

use anyhow::{Context, Result};
use clap::Parser;
use opcua_server_benchmark::{
    cli::{Args, Command, PostProcessArgs, RunArgs, ServerArgs},
    logging, BenchConfig, ClientFactory, ExperimentController, ExperimentRegistry,
    RunParameters, ServerConfig, SimulatedTarget, TcpClientFactory, TestServer,
};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Keep the guard alive so the file writer flushes on exit.
    let _log_guard = logging::init(args.verbose, args.log_file.as_deref())?;

    info!("OPC UA Server Benchmark v{}", opcua_server_benchmark::VERSION);

    match args.command {
        Command::Server(server) => run_server(&server).await,
        Command::RunExperiment(run) => run_experiments(&run).await,
        Command::PostProcess(post) => post_process(&post),
    }
}

async fn run_server(args: &ServerArgs) -> Result<()> {
    let server = TestServer::bind(ServerConfig::from(args))
        .await
        .context("starting the test server")?;

    tokio::select! {
        result = server.serve() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down test server");
            Ok(())
        }
    }
}

async fn run_experiments(args: &RunArgs) -> Result<()> {
    // Everything user-supplied is checked before a single client starts.
    let config = BenchConfig::load(&args.config)
        .with_context(|| format!("invalid configuration {}", args.config.display()))?;
    let shape = config.workload_shape(args.mode, args.nnodes)?;
    let params = RunParameters {
        n_clients: args.nclients,
        client_counts: args.client_counts()?,
    };

    let factory: Arc<dyn ClientFactory> = match args.simulate {
        Some(latency) => {
            info!("Using a simulated server with {:?} latency", latency);
            Arc::new(SimulatedTarget::new(&shape.nodes, shape.data_size, latency))
        }
        None => Arc::new(TcpClientFactory::new(config.client_settings()?)),
    };

    // The default session name is taken once, here, when the run starts.
    let session = args
        .name
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("%d-%m-%Y_%H-%M-%S").to_string());
    info!(
        "Session '{}': {} request(s) of {} byte(s) over {} node(s)",
        session,
        shape.num_requests,
        shape.data_size,
        shape.nodes.len()
    );

    let controller = ExperimentController::new(ExperimentRegistry::with_defaults(), &args.data_dir);
    let reports = controller
        .run_experiments(
            &args.experiments,
            &session,
            factory,
            Arc::new(shape),
            &params,
            args.post_process,
        )
        .await;

    let mut failed = 0;
    for report in &reports {
        match (&report.outcome, &report.analysis) {
            (Err(_), _) => failed += 1,
            (Ok(_), Some(Ok(path))) => info!("{} summary: {}", report.kind, path.display()),
            (Ok(_), Some(Err(_))) => failed += 1,
            (Ok(_), None) => {}
        }
    }

    if failed > 0 {
        warn!(
            "{} of {} experiment(s) did not complete; data is in {}",
            failed,
            reports.len(),
            controller.store(&session).session_dir().display()
        );
    } else {
        info!(
            "All experiments complete; data is in {}",
            controller.store(&session).session_dir().display()
        );
    }
    Ok(())
}

fn post_process(args: &PostProcessArgs) -> Result<()> {
    let controller = ExperimentController::new(ExperimentRegistry::with_defaults(), &args.data_dir);
    let failures = controller.post_process_sessions(&args.sessions);
    if failures > 0 {
        error!("{} analysis run(s) failed", failures);
    }
    Ok(())
}
