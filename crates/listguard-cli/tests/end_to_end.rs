//! Runs the bundled plans against the in-memory stub over real HTTP.

use std::path::PathBuf;

use listguard_cli::run::{run_plans, RunArgs};
use listguard_cli::{EXIT_FATAL, EXIT_PASSED};
use listguard_client::{ClientConfig, HttpApi};
use listguard_core::{run_verification, Outcome, Report, VerificationPlan, VerifyError};
use listguard_stub::AppState;

const CHANNELS: &str = include_str!("../../../plans/channels.yaml");
const PRODUCTS: &str = include_str!("../../../plans/products.yaml");

async fn spawn_stub() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listguard_stub::serve(listener, AppState::new()));
    format!("http://{addr}")
}

fn api(base_url: &str) -> HttpApi {
    HttpApi::new(ClientConfig::new(base_url.parse().unwrap())).unwrap()
}

fn plans_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../plans")
}

fn assert_passed(report: &Report, title: &str) {
    let record = report
        .get(title)
        .unwrap_or_else(|| panic!("no record titled {title:?}\n{report}"));
    assert_eq!(record.outcome, Outcome::Passed, "{title}\n{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn channel_plan_passes_against_stub() {
    let base = spawn_stub().await;
    let plan = VerificationPlan::from_yaml(CHANNELS).unwrap();
    let report = run_verification(&api(&base), &plan).await.unwrap();

    assert!(report.is_success(), "{report}");
    assert_passed(&report, "channels: reference query succeeds");
    assert_passed(
        &report,
        r#"channels: filter {"business_status":"normal"} returns exactly 2 records"#,
    );
    assert_passed(
        &report,
        r#"channels: filter {"business_status":"archived"} returns exactly 1 records"#,
    );
    assert_passed(
        &report,
        "channels: filter business_status with an absent value returns no records",
    );
    assert_passed(&report, "channels: limit=1 pages 1 and 2 differ");
    assert_passed(&report, "channels: page walk sums to total records");
    assert_passed(&report, "channels: query as unauthenticated is denied");
    assert_passed(&report, "channels: query as buyer is denied");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn product_plan_respects_tenant_scoping() {
    let base = spawn_stub().await;
    let plan = VerificationPlan::from_yaml(PRODUCTS).unwrap();
    let report = run_verification(&api(&base), &plan).await.unwrap();

    assert!(report.is_success(), "{report}");
    assert_passed(&report, "seller products: sort by price asc is monotonic");
    assert_passed(&report, "seller products: baseline reports at least the known records");
    assert_passed(
        &report,
        r#"seller products: filter {"status":"paused"} returns exactly 0 records"#,
    );
    assert_passed(
        &report,
        r#"rival products: filter {"status":"paused"} returns exactly 1 records"#,
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn independent_runs_share_one_stub() {
    let base = spawn_stub().await;
    let api = api(&base);
    let plan = VerificationPlan::from_yaml(CHANNELS).unwrap();
    let (a, b) = tokio::join!(run_verification(&api, &plan), run_verification(&api, &plan));
    assert!(a.unwrap().is_success());
    assert!(b.unwrap().is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cli_runs_both_plans() {
    let base = spawn_stub().await;
    let args = RunArgs {
        plans: vec![
            plans_dir().join("channels.yaml"),
            plans_dir().join("products.yaml"),
        ],
        base_url: Some(base),
        json: true,
        ..Default::default()
    };
    assert_eq!(run_plans(&args).await.unwrap(), EXIT_PASSED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_api_is_a_fixture_error() {
    // Nothing listens on the discard port.
    let plan = VerificationPlan::from_yaml(CHANNELS).unwrap();
    let err = run_verification(&api("http://127.0.0.1:9"), &plan)
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Fixture(_)), "{err}");

    let args = RunArgs {
        plans: vec![plans_dir().join("channels.yaml")],
        base_url: Some("http://127.0.0.1:9".into()),
        ..Default::default()
    };
    assert_eq!(run_plans(&args).await.unwrap(), EXIT_FATAL);
}
