//! E2E tests for free-text references flowing through tool calls.

mod helpers;

use serde_json::json;

use helpers::TestHarness;

#[tokio::test]
async fn e2e_fuzzy_job_name_reaches_executions() {
    let h = TestHarness::with_sample_data();

    let result = h
        .invoke_ok("get_job_executions", json!({"job_name": "the nightly etl job"}))
        .await;

    let executions = result.as_array().unwrap();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0]["job_name"], "nightly-etl");
    assert_eq!(executions[0]["execution_id"], "nightly-etl-x2k9p");
    assert_eq!(executions[0]["status"], "failure");
    assert_eq!(executions[1]["status"], "success");
}

#[tokio::test]
async fn e2e_failed_execution_logs_by_fuzzy_job() {
    let h = TestHarness::with_sample_data();

    let result = h
        .invoke_ok(
            "get_execution_logs",
            json!({"job_name": "nightly etl", "execution_id": "nightly-etl-x2k9p"}),
        )
        .await;

    let entries = result.as_array().unwrap();
    assert_eq!(entries[0]["severity"], "ERROR");
    assert_eq!(entries[0]["message"], "upload failed: quota exceeded");
    assert_eq!(entries[1]["message"], "starting export");
}

#[tokio::test]
async fn e2e_ambiguous_account_is_a_successful_result() {
    let h = TestHarness::with_sample_data();

    let outcome = h
        .invoke(
            "resolve_resource",
            json!({"kind": "service_account", "reference": "client1 account"}),
        )
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.summary.as_deref(), Some("ambiguous reference, 2 candidates"));
    let data = outcome.data.unwrap();
    assert_eq!(data["kind"], "unresolved");
    assert_eq!(data["result"]["outcome"], "ambiguous");
    let candidates = data["result"]["candidates"].as_array().unwrap();
    let ids: Vec<&str> = candidates
        .iter()
        .map(|c| c["resource"]["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![
            "client1@acme-prod.iam.gserviceaccount.com",
            "client1-reports@acme-prod.iam.gserviceaccount.com",
        ]
    );
}

#[tokio::test]
async fn e2e_unknown_job_reference_is_no_match() {
    let h = TestHarness::with_sample_data();

    let outcome = h
        .invoke("get_job_executions", json!({"job_name": "payroll sync"}))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.summary.as_deref(), Some("no matching resource"));
    assert_eq!(outcome.data.unwrap()["result"]["outcome"], "no_match");
}

#[tokio::test]
async fn e2e_listing_seeds_catalog_for_later_calls() {
    let h = TestHarness::with_sample_data();

    let jobs = h.invoke_ok("list_batch_jobs", json!({})).await;
    assert_eq!(jobs, json!(["nightly-etl", "invoice-export-job", "cleanup"]));
    let after_listing = h.backend_calls();

    h.invoke_ok("get_job_executions", json!({"job_name": "invoice export"}))
        .await;

    // One executions call; the job listing came from the catalog.
    assert_eq!(h.backend_calls(), after_listing + 1);
}

#[tokio::test]
async fn e2e_other_project_skips_resolution() {
    let h = TestHarness::with_sample_data();

    let result = h
        .invoke_ok(
            "get_job_executions",
            json!({"project_number": "987654321", "job_name": "nightly-etl"}),
        )
        .await;

    // Passed through verbatim; the mock answers per job name.
    assert_eq!(result.as_array().unwrap().len(), 2);
    assert_eq!(h.backend_calls(), 1);
}

#[tokio::test]
async fn e2e_service_accounts_exclude_platform_managed() {
    let h = TestHarness::with_sample_data();

    let result = h.invoke_ok("list_service_accounts", json!({})).await;

    assert_eq!(
        result,
        json!([
            "etl@acme-prod.iam.gserviceaccount.com",
            "client1@acme-prod.iam.gserviceaccount.com",
            "client1-reports@acme-prod.iam.gserviceaccount.com",
        ])
    );
}
