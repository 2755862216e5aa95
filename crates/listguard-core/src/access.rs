//! # Access Control Prober
//!
//! Reissues a query that succeeds for the authorized identity under each
//! forbidden identity and expects the collaborator to deny it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::QuerySource;
use crate::error::CallError;
use crate::query::ListQuery;
use crate::report::{Aggregator, AssertionRecord};
use crate::session::{ActorSession, SessionContext};

/// A forbidden identity as named in a plan.
///
/// `unauthenticated` is reserved for the credential-less session. Any other
/// name refers to a declared fixture actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ForbiddenIdentity {
    Unauthenticated,
    Actor(String),
}

impl ForbiddenIdentity {
    pub const UNAUTHENTICATED: &'static str = "unauthenticated";
}

impl From<String> for ForbiddenIdentity {
    fn from(name: String) -> Self {
        if name == Self::UNAUTHENTICATED {
            Self::Unauthenticated
        } else {
            Self::Actor(name)
        }
    }
}

impl From<ForbiddenIdentity> for String {
    fn from(identity: ForbiddenIdentity) -> Self {
        identity.to_string()
    }
}

impl fmt::Display for ForbiddenIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str(Self::UNAUTHENTICATED),
            Self::Actor(name) => f.write_str(name),
        }
    }
}

/// Probe `query` under every session in `forbidden`.
///
/// The context's active session is the authorized one. It is active again
/// when this function returns, whatever the probes observed.
pub async fn probe_access_control<S: QuerySource>(
    source: &S,
    ctx: &mut SessionContext,
    query: &ListQuery,
    forbidden: &[ActorSession],
) -> Vec<AssertionRecord> {
    let mut agg = Aggregator::new();
    if forbidden.is_empty() {
        return agg.into_records();
    }

    let authorized = ctx.active().name().to_string();
    if let Err(e) = source.query(query, ctx.active()).await {
        agg.fail(&format!("authorized query as {authorized} succeeds"), e.to_string());
        agg.skip("access control", "authorized query failed, probes not meaningful");
        return agg.into_records();
    }

    for session in forbidden {
        let title = format!("query as {} is denied", session.name());
        let previous = ctx.activate(session.clone());
        let result = source.query(query, ctx.active()).await;
        ctx.activate(previous);

        match result {
            Err(CallError::AccessDenied { .. }) => agg.predicate(&title, true),
            Err(e) => agg.fail(
                &title,
                format!("expected access_denied, got {}: {e}", e.kind()),
            ),
            Ok(page) => agg.fail(
                &title,
                format!("query succeeded with {} records", page.data.len()),
            ),
        }
    }
    agg.into_records()
}
