//! # Fixture Builder
//!
//! Creates the minimal graph of actors and parent resources a listing needs
//! before it can be queried.
//!
//! Actors authenticate first, in declared order, then entity steps run in
//! declared order, each as the actor it names. Setup is fail-fast: the first
//! failing call aborts with a [`FixtureError`] naming the step. Nothing is
//! retried and nothing already created is cleaned up.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::Instrument;

use crate::api::ApiUnderTest;
use crate::error::{FixtureError, PlanError};
use crate::session::{ActorSession, Credentials, Role};
use crate::template::{self, Bindings, Placeholder, RenderError};

/// An identity to authenticate before any entity is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSpec {
    pub name: String,
    pub role: Role,
    /// Credentials template. Defaults to a random email and password.
    #[serde(default = "default_credentials")]
    pub credentials: Value,
}

fn default_credentials() -> Value {
    json!({"email": "{{email}}", "password": "{{string:16}}"})
}

/// One resource-creation call, optionally repeated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStep {
    pub name: String,
    /// Collection path; may contain placeholders.
    pub path: String,
    /// Actor the call is made as.
    #[serde(rename = "as")]
    pub as_actor: String,
    #[serde(default = "empty_body")]
    pub body: Value,
    /// Number of records to create from the template.
    #[serde(default = "one")]
    pub repeat: u32,
}

fn empty_body() -> Value {
    json!({})
}

fn one() -> u32 {
    1
}

impl EntityStep {
    /// Binding names this step produces: `name` plus `name#i` per repetition
    /// when repeated.
    fn produces(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        if self.repeat > 1 {
            names.extend((0..self.repeat).map(|i| format!("{}#{i}", self.name)));
        }
        names
    }
}

/// Declarative fixture graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixturePlan {
    #[serde(default)]
    pub actors: Vec<ActorSpec>,
    #[serde(default)]
    pub entities: Vec<EntityStep>,
}

impl FixturePlan {
    /// Reject plans that would fail for structural reasons before any call is
    /// made: duplicate names, undeclared actors, bad placeholders and
    /// references to steps that have not run yet.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut actors = HashSet::new();
        for actor in &self.actors {
            if !actors.insert(actor.name.as_str()) {
                return Err(PlanError::DuplicateName {
                    kind: "actor",
                    name: actor.name.clone(),
                });
            }
            // Credentials render before any step has run.
            check_references(&actor.name, &actor.credentials, &HashSet::new(), &actors)?;
        }

        let mut produced: HashSet<String> = HashSet::new();
        let mut names = HashSet::new();
        for step in &self.entities {
            if !names.insert(step.name.as_str()) {
                return Err(PlanError::DuplicateName {
                    kind: "step",
                    name: step.name.clone(),
                });
            }
            if !actors.contains(step.as_actor.as_str()) {
                return Err(PlanError::UnknownActor {
                    owner: format!("step \"{}\"", step.name),
                    actor: step.as_actor.clone(),
                });
            }
            check_references(&step.name, &Value::from(step.path.clone()), &produced, &actors)?;
            check_references(&step.name, &step.body, &produced, &actors)?;
            produced.extend(step.produces());
        }
        Ok(())
    }

    /// Every binding name the plan's steps produce.
    pub fn produced(&self) -> HashSet<String> {
        self.entities.iter().flat_map(EntityStep::produces).collect()
    }

    pub fn actor_names(&self) -> HashSet<&str> {
        self.actors.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Validate the placeholders of `template` against what is available.
pub(crate) fn check_references(
    owner: &str,
    template: &Value,
    produced: &HashSet<String>,
    actors: &HashSet<&str>,
) -> Result<(), PlanError> {
    for placeholder in template::placeholders(template)? {
        match placeholder {
            Placeholder::StepRef { step, path } if !produced.contains(&step) => {
                let reference = match path {
                    Some(path) => format!("{step}.{path}"),
                    None => step,
                };
                return Err(PlanError::ForwardReference {
                    owner: owner.to_string(),
                    reference,
                });
            }
            Placeholder::ActorRef { actor, .. } if !actors.contains(actor.as_str()) => {
                return Err(PlanError::UnknownActor {
                    owner: owner.to_string(),
                    actor,
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// A record created during setup.
#[derive(Debug, Clone)]
pub struct SeededEntity {
    pub step: String,
    pub path: String,
    /// Actor the record was created as.
    pub actor: String,
    pub record: Value,
}

/// Everything setup produced.
#[derive(Debug, Default)]
pub struct Fixtures {
    bindings: Bindings,
    seeded: Vec<SeededEntity>,
}

impl Fixtures {
    pub fn actor(&self, name: &str) -> Option<&ActorSession> {
        self.bindings.actors.get(name)
    }

    /// Response of an entity step (the last one, for repeated steps).
    pub fn entity(&self, name: &str) -> Option<&Value> {
        self.bindings.steps.get(name)
    }

    /// Created records in creation order.
    pub fn seeded(&self) -> &[SeededEntity] {
        &self.seeded
    }

    /// Number of records seeded under `path`.
    pub fn seeded_count(&self, path: &str) -> u64 {
        self.seeded.iter().filter(|s| s.path == path).count() as u64
    }

    /// Number of records `actor` seeded under `path`.
    pub fn seeded_count_by(&self, path: &str, actor: &str) -> u64 {
        self.seeded
            .iter()
            .filter(|s| s.path == path && s.actor == actor)
            .count() as u64
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

pub(crate) fn render_error(step: &str, err: RenderError) -> FixtureError {
    match err {
        RenderError::Invalid(plan) => FixtureError::Plan(plan),
        RenderError::Unresolved(reference) => FixtureError::Unresolved {
            step: step.to_string(),
            reference,
        },
    }
}

/// Authenticate every actor and create every entity the plan declares.
pub async fn build_fixtures<A: ApiUnderTest>(
    api: &A,
    plan: &FixturePlan,
) -> Result<Fixtures, FixtureError> {
    plan.validate()?;
    let mut fixtures = Fixtures::default();

    for spec in &plan.actors {
        let rendered = template::render(&spec.credentials, &fixtures.bindings)
            .map_err(|e| render_error(&spec.name, e))?;
        let credentials: Credentials =
            serde_json::from_value(rendered).map_err(|e| FixtureError::Malformed {
                step: spec.name.clone(),
                reason: format!("credentials: {e}"),
            })?;
        let auth = api
            .authenticate(spec.role, &credentials)
            .instrument(tracing::info_span!("authenticate", actor = %spec.name, role = %spec.role))
            .await
            .map_err(|source| FixtureError::Step {
                step: spec.name.clone(),
                source,
            })?;
        tracing::info!(actor = %spec.name, role = %spec.role, actor_id = %auth.actor_id, "actor authenticated");
        let session = ActorSession::authenticated(
            spec.name.clone(),
            spec.role,
            auth,
            credentials.tenant.clone(),
        );
        fixtures.bindings.actors.insert(spec.name.clone(), session);
    }

    for step in &plan.entities {
        for i in 0..step.repeat {
            let label = if step.repeat > 1 {
                format!("{}#{i}", step.name)
            } else {
                step.name.clone()
            };
            let path = match template::render(&Value::from(step.path.clone()), &fixtures.bindings)
                .map_err(|e| render_error(&label, e))?
            {
                Value::String(path) => path,
                other => other.to_string(),
            };
            let body =
                template::render(&step.body, &fixtures.bindings).map_err(|e| render_error(&label, e))?;
            let session = fixtures
                .bindings
                .actors
                .get(&step.as_actor)
                .ok_or_else(|| PlanError::UnknownActor {
                    owner: format!("step \"{}\"", step.name),
                    actor: step.as_actor.clone(),
                })?;

            let record = api
                .create_entity(&path, &body, session)
                .instrument(tracing::info_span!("create_entity", step = %label, path = %path))
                .await
                .map_err(|source| FixtureError::Step {
                    step: label.clone(),
                    source,
                })?;
            tracing::debug!(step = %label, path = %path, "entity created");

            if step.repeat > 1 {
                fixtures.bindings.steps.insert(label.clone(), record.clone());
            }
            fixtures.bindings.steps.insert(step.name.clone(), record.clone());
            fixtures.seeded.push(SeededEntity {
                step: label,
                path,
                actor: step.as_actor.clone(),
                record,
            });
        }
    }

    tracing::info!(
        actors = fixtures.bindings.actors.len(),
        entities = fixtures.seeded.len(),
        "fixtures ready"
    );
    Ok(fixtures)
}
