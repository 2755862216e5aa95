//! # Field Templates
//!
//! Fixture bodies and credentials are JSON documents whose string leaves may
//! hold `{{...}}` placeholders. Rendering replaces each placeholder with a
//! random-but-valid value for its semantic type, or with a value produced by
//! an earlier fixture step.
//!
//! | Placeholder | Produces |
//! |-------------|----------|
//! | `{{email}}` | random `@example.com` address |
//! | `{{uuid}}` | random v4 UUID |
//! | `{{amount}}` | whole-cent amount from 1 to 100000 (`12.3`, not `12.30`) |
//! | `{{timestamp}}` | RFC 3339 instant within the last 30 days |
//! | `{{string:N}}` | N random alphanumerics |
//! | `{{int:LO:HI}}` | integer in `LO..=HI` |
//! | `{{ref:STEP.PATH}}` | field of an earlier entity step's response |
//! | `{{actor:NAME.FIELD}}` | `id`, `name`, `role` or `tenant` of an actor |
//!
//! A string consisting of exactly one placeholder becomes a typed JSON value
//! (`{{amount}}` renders as a number). Placeholders embedded in longer text
//! are spliced in as text.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;

use crate::error::PlanError;
use crate::query::field_value;
use crate::session::ActorSession;

/// A parsed `{{...}}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Email,
    Uuid,
    Amount,
    Timestamp,
    Text(usize),
    Int(i64, i64),
    StepRef { step: String, path: Option<String> },
    ActorRef { actor: String, field: ActorField },
}

/// Actor attributes a template can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorField {
    Id,
    Name,
    Role,
    Tenant,
}

impl Placeholder {
    /// Parse the text between `{{` and `}}`.
    pub fn parse(raw: &str) -> Result<Self, PlanError> {
        let raw = raw.trim();
        let invalid = |reason: &str| PlanError::InvalidPlaceholder {
            placeholder: raw.to_string(),
            reason: reason.to_string(),
        };
        let (kind, args) = match raw.split_once(':') {
            Some((kind, args)) => (kind, Some(args)),
            None => (raw, None),
        };
        match (kind, args) {
            ("email", None) => Ok(Self::Email),
            ("uuid", None) => Ok(Self::Uuid),
            ("amount", None) => Ok(Self::Amount),
            ("timestamp", None) => Ok(Self::Timestamp),
            ("string", Some(len)) => {
                let len: usize = len.parse().map_err(|_| invalid("length must be an integer"))?;
                if len == 0 {
                    return Err(invalid("length must be positive"));
                }
                Ok(Self::Text(len))
            }
            ("int", Some(bounds)) => {
                let (lo, hi) = bounds
                    .split_once(':')
                    .ok_or_else(|| invalid("expected int:LO:HI"))?;
                let lo: i64 = lo.parse().map_err(|_| invalid("LO must be an integer"))?;
                let hi: i64 = hi.parse().map_err(|_| invalid("HI must be an integer"))?;
                if lo > hi {
                    return Err(invalid("LO must not exceed HI"));
                }
                Ok(Self::Int(lo, hi))
            }
            ("ref", Some(target)) if !target.is_empty() => {
                let (step, path) = match target.split_once('.') {
                    Some((step, path)) => (step, Some(path.to_string())),
                    None => (target, None),
                };
                Ok(Self::StepRef {
                    step: step.to_string(),
                    path,
                })
            }
            ("actor", Some(target)) => {
                let (actor, field) = target
                    .split_once('.')
                    .ok_or_else(|| invalid("expected actor:NAME.FIELD"))?;
                let field = match field {
                    "id" => ActorField::Id,
                    "name" => ActorField::Name,
                    "role" => ActorField::Role,
                    "tenant" => ActorField::Tenant,
                    _ => return Err(invalid("actor field must be id, name, role or tenant")),
                };
                Ok(Self::ActorRef {
                    actor: actor.to_string(),
                    field,
                })
            }
            _ => Err(invalid("unknown placeholder")),
        }
    }

    fn generate(&self) -> Option<Value> {
        let mut rng = rand::thread_rng();
        let value = match self {
            Self::Email => Value::from(format!("{}@example.com", random_string(12).to_lowercase())),
            Self::Uuid => Value::from(uuid::Uuid::new_v4().to_string()),
            Self::Amount => {
                let cents: u64 = rng.gen_range(100..=10_000_000);
                serde_json::Number::from_f64(cents as f64 / 100.0).map(Value::Number)?
            }
            Self::Timestamp => {
                let back = Duration::seconds(rng.gen_range(0..30 * 24 * 3600));
                Value::from((Utc::now() - back).to_rfc3339())
            }
            Self::Text(len) => Value::from(random_string(*len)),
            Self::Int(lo, hi) => Value::from(rng.gen_range(*lo..=*hi)),
            Self::StepRef { .. } | Self::ActorRef { .. } => return None,
        };
        Some(value)
    }
}

/// `len` random ASCII alphanumerics.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Results available to references while rendering.
#[derive(Debug, Default)]
pub struct Bindings {
    pub steps: BTreeMap<String, Value>,
    pub actors: BTreeMap<String, ActorSession>,
}

impl Bindings {
    fn resolve(&self, placeholder: &Placeholder) -> Option<Value> {
        match placeholder {
            Placeholder::StepRef { step, path } => {
                let result = self.steps.get(step)?;
                match path {
                    Some(path) => field_value(result, path).cloned(),
                    None => Some(result.clone()),
                }
            }
            Placeholder::ActorRef { actor, field } => {
                let session = self.actors.get(actor)?;
                match field {
                    ActorField::Id => session.actor_id().map(Value::from),
                    ActorField::Name => Some(Value::from(session.name())),
                    ActorField::Role => Some(Value::from(session.role().as_str())),
                    ActorField::Tenant => session.tenant().map(Value::from),
                }
            }
            other => other.generate(),
        }
    }
}

/// Why a template failed to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Invalid(PlanError),
    /// A reference produced no value; holds the placeholder text.
    Unresolved(String),
}

impl From<PlanError> for RenderError {
    fn from(err: PlanError) -> Self {
        Self::Invalid(err)
    }
}

/// Every placeholder in a template, in document order.
pub fn placeholders(template: &Value) -> Result<Vec<Placeholder>, PlanError> {
    let mut out = Vec::new();
    collect(template, &mut out)?;
    Ok(out)
}

fn collect(template: &Value, out: &mut Vec<Placeholder>) -> Result<(), PlanError> {
    match template {
        Value::String(s) => {
            for segment in segments(s) {
                if let Segment::Placeholder(raw) = segment {
                    out.push(Placeholder::parse(raw)?);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, out)?;
            }
        }
        Value::Object(map) => {
            for value in map.values() {
                collect(value, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Render a template against `bindings`.
pub fn render(template: &Value, bindings: &Bindings) -> Result<Value, RenderError> {
    match template {
        Value::String(s) => render_string(s, bindings),
        Value::Array(items) => items
            .iter()
            .map(|item| render(item, bindings))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                rendered.insert(key.clone(), render(value, bindings)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

fn render_string(s: &str, bindings: &Bindings) -> Result<Value, RenderError> {
    let parts = segments(s);
    if let [Segment::Placeholder(raw)] = parts.as_slice() {
        let placeholder = Placeholder::parse(raw)?;
        return bindings
            .resolve(&placeholder)
            .ok_or_else(|| RenderError::Unresolved(raw.trim().to_string()));
    }
    let mut text = String::with_capacity(s.len());
    for part in parts {
        match part {
            Segment::Literal(lit) => text.push_str(lit),
            Segment::Placeholder(raw) => {
                let placeholder = Placeholder::parse(raw)?;
                let value = bindings
                    .resolve(&placeholder)
                    .ok_or_else(|| RenderError::Unresolved(raw.trim().to_string()))?;
                match value {
                    Value::String(v) => text.push_str(&v),
                    other => text.push_str(&other.to_string()),
                }
            }
        }
    }
    Ok(Value::String(text))
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn segments(s: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        if start > 0 {
            out.push(Segment::Literal(&rest[..start]));
        }
        out.push(Segment::Placeholder(&rest[start + 2..start + 2 + len]));
        rest = &rest[start + 2 + len + 2..];
    }
    if !rest.is_empty() {
        out.push(Segment::Literal(rest));
    }
    out
}
