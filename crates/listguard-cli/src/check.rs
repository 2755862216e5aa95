//! # Check Subcommand
//!
//! Offline plan validation: parse each file and run every structural check
//! the verifier would run before its first call.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::{load_plan, EXIT_FATAL, EXIT_PASSED};

/// Arguments for the check subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Plan files to validate.
    #[arg(required = true)]
    pub plans: Vec<PathBuf>,
}

/// Execute the check subcommand.
pub fn run_check(args: &CheckArgs) -> Result<u8> {
    let mut invalid = 0usize;
    for path in &args.plans {
        let checked = load_plan(path).and_then(|plan| {
            plan.validate()?;
            Ok(plan)
        });
        match checked {
            Ok(plan) => println!(
                "OK: {} ({}): {} actors, {} entity steps, {} targets",
                path.display(),
                plan.display_name(),
                plan.fixtures.actors.len(),
                plan.fixtures.entities.len(),
                plan.targets.len()
            ),
            Err(e) => {
                invalid += 1;
                println!("FAIL: {}: {e:#}", path.display());
            }
        }
    }

    if invalid == 0 {
        Ok(EXIT_PASSED)
    } else {
        tracing::warn!(invalid, total = args.plans.len(), "invalid plans");
        Ok(EXIT_FATAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn plan_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn valid_plan_passes() {
        let file = plan_file(
            r#"
fixtures:
  actors: [{ name: admin, role: admin }]
targets:
  - { name: channels, path: /channels, as: admin }
"#,
        );
        let args = CheckArgs {
            plans: vec![file.path().to_path_buf()],
        };
        assert_eq!(run_check(&args).unwrap(), EXIT_PASSED);
    }

    #[test]
    fn invalid_or_missing_plans_are_fatal() {
        let bad = plan_file(
            r#"
targets:
  - { name: channels, path: /channels, as: ghost }
"#,
        );
        let args = CheckArgs {
            plans: vec![bad.path().to_path_buf(), PathBuf::from("/nonexistent/plan.yaml")],
        };
        assert_eq!(run_check(&args).unwrap(), EXIT_FATAL);
    }
}
