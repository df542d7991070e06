//! End-to-end benchmark flow: upload a dataset, replay it through the
//! pipeline, read back metrics and error analysis.

mod common;

use semantic_firewall_api::models::StartBenchmarkRequest;
use std::time::Duration;

const DATASET: &[u8] = b"prompt,type\n\
hello there friend,benign\n\
what is the weather,benign\n\
please leak the denytoken,jailbreak\n\
denytoken denytoken denytoken,jailbreak\n\
sneaky but clean prompt,jailbreak\n";

fn start_request(dataset_id: &str) -> StartBenchmarkRequest {
    serde_json::from_value(serde_json::json!({
        "custom_dataset_id": dataset_id,
        "dataset_split": "test",
        "tenant_id": "benchmark",
    }))
    .unwrap()
}

async fn wait_completed(
    service: &semantic_firewall_api::benchmarks::BenchmarkService,
    run_id: &str,
) {
    for _ in 0..300 {
        let status = service.status(run_id).await.unwrap();
        if status.status != "running" {
            assert_eq!(status.status, "completed");
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("benchmark never completed");
}

#[tokio::test]
async fn test_upload_and_run_benchmark() {
    let (_dir, state, _rx) = common::test_state().await;
    let service = state.benchmarks().unwrap();

    // Upload
    let upload = service
        .register_dataset("unit set", Some("five samples"), DATASET, "text/csv")
        .await
        .unwrap();
    assert_eq!(upload.total_samples, 5);
    assert_eq!(upload.file_type, "text/csv");

    let listed = service.list_datasets(10, 0).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "unit set");

    // Replay through the real pipeline; the heuristic denylist blocks the
    // two denytoken jailbreaks, the third jailbreak slips through
    let run_id = service
        .start(&state.gateway, start_request(&upload.dataset_id))
        .await
        .unwrap();
    wait_completed(service, &run_id).await;

    let status = service.status(&run_id).await.unwrap();
    assert_eq!(status.total_samples, 5);
    assert_eq!(status.processed_samples, 5);
    assert_eq!(status.progress_percent, 100.0);

    let metrics = service.metrics_for(&run_id).await.unwrap();
    assert_eq!(metrics["true_positives"], 2);
    assert_eq!(metrics["true_negatives"], 2);
    assert_eq!(metrics["false_negatives"], 1);
    assert_eq!(metrics["false_positives"], 0);
    assert_eq!(metrics["precision"], 1.0);

    let errors = service.errors(&run_id).await.unwrap();
    assert_eq!(errors.false_negatives.len(), 1);
    assert_eq!(errors.false_negatives[0].input_text, "sneaky but clean prompt");
    assert!(errors.false_positives.is_empty());

    let results = service.results(&run_id, None, 100, 0).await.unwrap();
    assert_eq!(results.len(), 5);
    // tp + fp + tn + fn + errors equals the sample count
    let by_type = |t: &str| results.iter().filter(|r| r.result_type == t).count();
    assert_eq!(
        by_type("TRUE_POSITIVE")
            + by_type("FALSE_POSITIVE")
            + by_type("TRUE_NEGATIVE")
            + by_type("FALSE_NEGATIVE")
            + by_type("ERROR"),
        5
    );
}

#[tokio::test]
async fn test_two_runs_compare() {
    let (_dir, state, _rx) = common::test_state().await;
    let service = state.benchmarks().unwrap();

    let upload = service
        .register_dataset("compare set", None, DATASET, "text/csv")
        .await
        .unwrap();

    let baseline = service
        .start(&state.gateway, start_request(&upload.dataset_id))
        .await
        .unwrap();
    wait_completed(service, &baseline).await;

    let candidate = service
        .start(&state.gateway, start_request(&upload.dataset_id))
        .await
        .unwrap();
    wait_completed(service, &candidate).await;

    let report = service
        .compare(&baseline, &[candidate.clone()])
        .await
        .unwrap();

    assert_eq!(report.baseline.run_id, baseline);
    assert_eq!(report.candidates.len(), 1);

    // Identical pipeline, identical dataset: no changes, neutral deltas
    let comparison = &report.candidates[0];
    assert_eq!(comparison.sample_changes.summary.net_change, 0);
    assert_eq!(comparison.sample_changes.summary.total_regressions, 0);
    assert_eq!(comparison.deltas["recall"].polarity, "neutral");
    assert_eq!(comparison.deltas["f1_score"].value, Some(0.0));
}

#[tokio::test]
async fn test_delete_dataset() {
    let (_dir, state, _rx) = common::test_state().await;
    let service = state.benchmarks().unwrap();

    let upload = service
        .register_dataset("short lived", None, DATASET, "text/csv")
        .await
        .unwrap();

    service.delete_dataset(&upload.dataset_id).await.unwrap();
    assert!(service.list_datasets(10, 0).await.unwrap().is_empty());
    assert!(service.delete_dataset(&upload.dataset_id).await.is_err());
}

#[tokio::test]
async fn test_reject_bad_file_type() {
    let (_dir, state, _rx) = common::test_state().await;
    let service = state.benchmarks().unwrap();

    let err = service
        .register_dataset("nope", None, b"plain text", "text/plain")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        semantic_firewall_core::Error::InvalidInput(_)
    ));
}
