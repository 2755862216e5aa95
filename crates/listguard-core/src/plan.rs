//! Verification plans: the fixture graph plus the listing endpoints to check.
//!
//! Plans are YAML documents:
//!
//! ```yaml
//! name: channels
//! fixtures:
//!   actors:
//!     - { name: admin, role: admin }
//!   entities:
//!     - name: channel
//!       path: /channels
//!       as: admin
//!       repeat: 3
//!       body: { code: "{{string:8}}", name: "{{string:12}}", business_status: normal }
//! targets:
//!   - name: channel listing
//!     path: /channels
//!     as: admin
//!     filters:
//!       - { field: business_status, kind: exact }
//!       - { field: name, kind: substring }
//!     forbidden: [unauthenticated]
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::access::ForbiddenIdentity;
use crate::error::PlanError;
use crate::fixture::{check_references, FixturePlan};
use crate::oracle::{CountExpectation, FilterSpec};
use crate::pagination::PaginationOptions;

/// One listing endpoint to verify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    pub path: String,
    /// Authorized actor the listing is queried as.
    #[serde(rename = "as")]
    pub as_actor: String,
    /// Filters applied to every query of this target. May contain
    /// placeholders resolved against the fixtures.
    #[serde(default)]
    pub base_filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub pagination: PaginationOptions,
    #[serde(default)]
    pub forbidden: Vec<ForbiddenIdentity>,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Page size of the reference query the oracle samples from.
    #[serde(default = "default_reference_limit")]
    pub reference_limit: u32,
    #[serde(default)]
    pub expect: Vec<CountExpectation>,
}

fn default_id_field() -> String {
    "id".into()
}

fn default_reference_limit() -> u32 {
    100
}

/// A complete verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationPlan {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fixtures: FixturePlan,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

impl VerificationPlan {
    pub fn from_yaml(source: &str) -> Result<Self, PlanError> {
        serde_yaml::from_str(source).map_err(|e| PlanError::Parse(e.to_string()))
    }

    /// Display name: the declared name, else the first target's.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.targets.first().map(|t| t.name.as_str()))
            .unwrap_or("unnamed plan")
    }

    /// Check everything that can be checked without calling the API.
    pub fn validate(&self) -> Result<(), PlanError> {
        self.fixtures.validate()?;
        if self.targets.is_empty() {
            return Err(PlanError::NoTargets);
        }

        let actors = self.fixtures.actor_names();
        let produced = self.fixtures.produced();
        let mut names = HashSet::new();
        for target in &self.targets {
            let owner = format!("target \"{}\"", target.name);
            if !names.insert(target.name.as_str()) {
                return Err(PlanError::DuplicateName {
                    kind: "target",
                    name: target.name.clone(),
                });
            }
            if !actors.contains(target.as_actor.as_str()) {
                return Err(PlanError::UnknownActor {
                    owner,
                    actor: target.as_actor.clone(),
                });
            }
            for identity in &target.forbidden {
                if let ForbiddenIdentity::Actor(actor) = identity {
                    if !actors.contains(actor.as_str()) {
                        return Err(PlanError::UnknownActor {
                            owner,
                            actor: actor.clone(),
                        });
                    }
                }
            }
            check_references(&owner, &Value::from(target.path.clone()), &produced, &actors)?;
            check_references(&owner, &to_value(&target.base_filters), &produced, &actors)?;
            for expectation in &target.expect {
                check_references(&owner, &to_value(&expectation.filters), &produced, &actors)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn to_value(filters: &BTreeMap<String, Value>) -> Value {
    Value::Object(filters.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}
