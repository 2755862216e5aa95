//! # listguard-cli -- command-line front end for the verifier
//!
//! ## Subcommands
//!
//! - `listguard run` -- execute plans against a live API and print reports.
//! - `listguard check` -- parse and validate plans without network access.
//!
//! ```bash
//! LISTGUARD_BASE_URL=http://127.0.0.1:8091 listguard run plans/channels.yaml
//! listguard check plans/*.yaml
//! ```
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | every record passed or was skipped |
//! | 1 | at least one failed record |
//! | 2 | fatal: configuration, plan or fixture error |

pub mod check;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use listguard_core::VerificationPlan;

pub const EXIT_PASSED: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
pub const EXIT_FATAL: u8 = 2;

/// Read and parse a plan file. Does not validate it.
pub fn load_plan(path: &Path) -> Result<VerificationPlan> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan: {}", path.display()))?;
    VerificationPlan::from_yaml(&source).with_context(|| format!("in {}", path.display()))
}
