use opcua_server_benchmark::{
    ExperimentController, ExperimentKind, ExperimentRegistry, NodeId, OperationKind,
    RunParameters, SimulatedTarget, WorkloadShape,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn approx(actual: &Value, expected: f64, tolerance: f64) {
    let actual = actual.as_f64().expect("numeric summary field");
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} +/- {}, got {}",
        expected,
        tolerance,
        actual
    );
}

/// A single client reading one 64-byte node 100 times from a target that
/// always answers in 10ms.
#[tokio::test(start_paused = true)]
async fn single_run_against_fixed_latency_target() {
    let dir = TempDir::new().unwrap();
    let nodes = vec![NodeId::string(2, "TestDataPoint")];
    let target = SimulatedTarget::new(&nodes, 64, Duration::from_millis(10));
    let shape = WorkloadShape {
        num_requests: 100,
        data_size: 64,
        nodes,
        mode: Some(OperationKind::Read),
    };

    let controller = ExperimentController::new(ExperimentRegistry::with_defaults(), dir.path());
    let params = RunParameters {
        n_clients: 1,
        client_counts: vec![1],
    };
    let reports = controller
        .run_experiments(
            &[ExperimentKind::SingleRun],
            "e2e",
            Arc::new(target),
            Arc::new(shape),
            &params,
            true,
        )
        .await;

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.outcome.as_ref().unwrap().workers_failed, 0);
    let path = report.analysis.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(
        path,
        &dir.path().join("e2e/results/response_times_summary.json")
    );

    let summary: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    let read = &summary["read_mode"];
    approx(&read["responsiveness_mean"], 0.010, 1e-5);
    approx(&read["jitter"], 0.0, 1e-5);
    approx(&read["throughput_mean"], 6400.0, 1.0);
    assert!(summary.get("write_mode").is_none());

    let csv = std::fs::read_to_string(dir.path().join("e2e/response_times_read.csv")).unwrap();
    assert_eq!(csv.lines().count(), 101);
}

/// Running the same session again must not mix two runs into one artifact family.
#[tokio::test(start_paused = true)]
async fn rerun_into_same_session_is_refused() {
    let dir = TempDir::new().unwrap();
    let nodes = vec![NodeId::string(2, "TestDataPoint")];
    let shape = Arc::new(WorkloadShape {
        num_requests: 5,
        data_size: 8,
        nodes: nodes.clone(),
        mode: None,
    });
    let controller = ExperimentController::new(ExperimentRegistry::with_defaults(), dir.path());
    let params = RunParameters {
        n_clients: 2,
        client_counts: vec![1],
    };

    for attempt in 0..2 {
        let target = SimulatedTarget::new(&nodes, 8, Duration::from_millis(1));
        let reports = controller
            .run_experiments(
                &[ExperimentKind::Scalability],
                "twice",
                Arc::new(target),
                Arc::clone(&shape),
                &params,
                false,
            )
            .await;
        assert_eq!(reports[0].outcome.is_ok(), attempt == 0);
    }

    let analyzed = controller.post_process("twice").unwrap();
    assert_eq!(analyzed.len(), 1);
    let (kind, result) = &analyzed[0];
    assert_eq!(*kind, ExperimentKind::Scalability);
    let summary: Value =
        serde_json::from_str(&std::fs::read_to_string(result.as_ref().unwrap()).unwrap()).unwrap();
    let keys: Vec<&str> = summary.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["read_mode", "write_mode"]);
}

/// A second single run must not rewrite the artifacts of the first one.
#[tokio::test(start_paused = true)]
async fn single_run_rerun_keeps_first_artifacts() {
    let dir = TempDir::new().unwrap();
    let nodes = vec![NodeId::string(2, "TestDataPoint")];
    let shape = Arc::new(WorkloadShape {
        num_requests: 5,
        data_size: 8,
        nodes: nodes.clone(),
        mode: None,
    });
    let controller = ExperimentController::new(ExperimentRegistry::with_defaults(), dir.path());
    let params = RunParameters {
        n_clients: 1,
        client_counts: vec![1],
    };

    let first = SimulatedTarget::new(&nodes, 8, Duration::from_millis(10));
    let second = SimulatedTarget::new(&nodes, 8, Duration::from_millis(10)).fail_after(2);
    let mut outcomes = Vec::new();
    for target in [first, second] {
        let reports = controller
            .run_experiments(
                &[ExperimentKind::SingleRun],
                "again",
                Arc::new(target),
                Arc::clone(&shape),
                &params,
                false,
            )
            .await;
        outcomes.push(reports.into_iter().next().unwrap().outcome);
    }

    assert!(outcomes[0].is_ok());
    assert!(matches!(
        outcomes[1],
        Err(opcua_server_benchmark::BenchError::Configuration(_))
    ));

    for name in ["response_times_read.csv", "response_times_write.csv"] {
        let csv = std::fs::read_to_string(dir.path().join("again").join(name)).unwrap();
        assert_eq!(csv.lines().count(), 6, "{}", name);
    }
}
