//! # Run Subcommand
//!
//! Executes verification plans against a live API. Plans run concurrently,
//! each with its own fixtures and session; results are printed in the order
//! the plan files were given.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use listguard_client::{ClientConfig, HttpApi};
use listguard_core::{run_verification, Report};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::{load_plan, EXIT_FAILED, EXIT_FATAL, EXIT_PASSED};

/// Arguments for the run subcommand.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Plan files to execute.
    #[arg(required = true)]
    pub plans: Vec<PathBuf>,

    /// Base URL of the API under test. Overrides LISTGUARD_BASE_URL.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds. Overrides LISTGUARD_TIMEOUT_SECS.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// HTTP verb for listing queries (patch or post). Overrides LISTGUARD_LIST_METHOD.
    #[arg(long)]
    pub list_method: Option<String>,

    /// Print reports as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// What happened to one plan file.
#[derive(Debug, Serialize)]
pub struct PlanOutcome {
    pub path: String,
    pub plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlanOutcome {
    fn exit_code(&self) -> u8 {
        match (&self.report, &self.error) {
            (_, Some(_)) | (None, None) => EXIT_FATAL,
            (Some(report), None) if report.is_success() => EXIT_PASSED,
            (Some(_), None) => EXIT_FAILED,
        }
    }
}

fn client_config(args: &RunArgs) -> Result<ClientConfig> {
    let env = |var: &str| std::env::var(var).ok();
    ClientConfig::from_lookup(|var| match var {
        "LISTGUARD_BASE_URL" => args.base_url.clone().or_else(|| env(var)),
        "LISTGUARD_TIMEOUT_SECS" => args.timeout_secs.map(|s| s.to_string()).or_else(|| env(var)),
        "LISTGUARD_LIST_METHOD" => args.list_method.clone().or_else(|| env(var)),
        _ => env(var),
    })
    .context("invalid client configuration")
}

/// Execute the run subcommand.
///
/// Returns the worst exit code across all plans. Configuration and plan
/// loading problems are returned as `Err` before any call is made.
pub async fn run_plans(args: &RunArgs) -> Result<u8> {
    let mut plans = Vec::with_capacity(args.plans.len());
    for path in &args.plans {
        let plan = load_plan(path)?;
        plan.validate()
            .with_context(|| format!("invalid plan: {}", path.display()))?;
        plans.push((path.display().to_string(), plan));
    }

    let api = HttpApi::new(client_config(args)?).context("failed to build HTTP client")?;
    tracing::info!(base_url = %api.config().base_url, plans = plans.len(), "running plans");

    let mut set = JoinSet::new();
    for (index, (path, plan)) in plans.into_iter().enumerate() {
        let api = api.clone();
        set.spawn(async move {
            let name = plan.display_name().to_string();
            let outcome = match run_verification(&api, &plan).await {
                Ok(report) => PlanOutcome {
                    path,
                    plan: name,
                    report: Some(report),
                    error: None,
                },
                Err(e) => PlanOutcome {
                    path,
                    plan: name,
                    report: None,
                    error: Some(e.to_string()),
                },
            };
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<PlanOutcome>> = std::iter::repeat_with(|| None)
        .take(args.plans.len())
        .collect();
    while let Some(joined) = set.join_next().await {
        let (index, outcome) = joined.context("plan task panicked")?;
        slots[index] = Some(outcome);
    }
    let outcomes: Vec<PlanOutcome> = slots.into_iter().flatten().collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for outcome in &outcomes {
            println!("== {} ({}) ==", outcome.plan, outcome.path);
            match (&outcome.report, &outcome.error) {
                (_, Some(error)) => println!("FATAL: {error}"),
                (Some(report), None) => println!("{report}"),
                (None, None) => {}
            }
            println!();
        }
    }

    let code = outcomes
        .iter()
        .map(PlanOutcome::exit_code)
        .max()
        .unwrap_or(EXIT_PASSED);
    tracing::info!(code, "run finished");
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_environment() {
        let args = RunArgs {
            plans: vec![PathBuf::from("plan.yaml")],
            base_url: Some("http://127.0.0.1:9/api".into()),
            timeout_secs: Some(3),
            list_method: Some("post".into()),
            json: false,
        };
        let config = client_config(&args).unwrap();
        assert_eq!(config.base_url.as_str(), "http://127.0.0.1:9/api/");
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.list_method, listguard_client::ListMethod::Post);
    }

    #[test]
    fn invalid_list_method_is_a_config_error() {
        let args = RunArgs {
            base_url: Some("http://127.0.0.1:9".into()),
            list_method: Some("get".into()),
            ..Default::default()
        };
        assert!(client_config(&args).is_err());
    }

    #[test]
    fn worst_outcome_wins() {
        let fatal = PlanOutcome {
            path: "a".into(),
            plan: "a".into(),
            report: None,
            error: Some("fixture step failed".into()),
        };
        let clean = PlanOutcome {
            path: "b".into(),
            plan: "b".into(),
            report: Some(Report::default()),
            error: None,
        };
        assert_eq!(fatal.exit_code(), EXIT_FATAL);
        assert_eq!(clean.exit_code(), EXIT_PASSED);
    }

    #[tokio::test]
    async fn missing_plan_file_is_an_error() {
        let args = RunArgs {
            plans: vec![PathBuf::from("/nonexistent/plan.yaml")],
            base_url: Some("http://127.0.0.1:9".into()),
            ..Default::default()
        };
        assert!(run_plans(&args).await.is_err());
    }
}
