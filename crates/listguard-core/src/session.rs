//! # Actor Sessions
//!
//! Identities that issue calls against the API under test. A session is
//! created by the fixture builder when an actor authenticates and lives for
//! the rest of the run.
//!
//! There is no ambient "current user". A [`SessionContext`] is owned by one
//! run, and every collaborator call receives the session to act as as an
//! explicit argument. Concurrent runs therefore never observe each other's
//! identity switches.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Actor role in the commerce platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Seller,
    Buyer,
    Customer,
    Guest,
}

impl Role {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Seller => "seller",
            Self::Buyer => "buyer",
            Self::Customer => "customer",
            Self::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "seller" => Ok(Self::Seller),
            "buyer" => Ok(Self::Buyer),
            "customer" => Ok(Self::Customer),
            "guest" => Ok(Self::Guest),
            other => Err(format!("unknown role \"{other}\"")),
        }
    }
}

/// Credentials presented to the authenticate endpoint.
///
/// `extra` carries any additional fields the API's join body requires; they
/// are flattened next to the named fields on the wire.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            tenant: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Scope the account to a tenant.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("tenant", &self.tenant)
            .field("extra", &RedactedFields(&self.extra))
            .finish()
    }
}

/// Field names only; extra join fields may be secrets too.
struct RedactedFields<'a>(&'a serde_json::Map<String, serde_json::Value>);

impl fmt::Debug for RedactedFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "[REDACTED]")))
            .finish()
    }
}

/// Result of a successful authenticate call.
#[derive(Clone)]
pub struct Authenticated {
    pub actor_id: String,
    pub token: Zeroizing<String>,
}

impl fmt::Debug for Authenticated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticated")
            .field("actor_id", &self.actor_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// One identity that issues calls.
///
/// A session without a token is the unauthenticated identity.
#[derive(Clone)]
pub struct ActorSession {
    name: String,
    role: Role,
    actor_id: Option<String>,
    token: Option<Zeroizing<String>>,
    tenant: Option<String>,
}

impl ActorSession {
    /// Session for an actor that authenticated successfully.
    pub fn authenticated(
        name: impl Into<String>,
        role: Role,
        auth: Authenticated,
        tenant: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            actor_id: Some(auth.actor_id),
            token: Some(auth.token),
            tenant,
        }
    }

    /// The identity that carries no credentials at all.
    pub fn anonymous() -> Self {
        Self {
            name: "unauthenticated".into(),
            role: Role::Guest,
            actor_id: None,
            token: None,
            tenant: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    /// Bearer token to attach to requests, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.as_str())
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.token.is_none()
    }
}

impl fmt::Debug for ActorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSession")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("actor_id", &self.actor_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("tenant", &self.tenant)
            .finish()
    }
}

/// The identity subsequent calls of one run are issued as.
///
/// Owned by exactly one run. Components that switch identity must put the
/// previous session back before they return.
#[derive(Debug, Clone)]
pub struct SessionContext {
    active: ActorSession,
}

impl SessionContext {
    pub fn new(initial: ActorSession) -> Self {
        Self { active: initial }
    }

    pub fn active(&self) -> &ActorSession {
        &self.active
    }

    /// Make `session` the active identity, returning the one it replaces.
    pub fn activate(&mut self, session: ActorSession) -> ActorSession {
        tracing::debug!(from = %self.active.name(), to = %session.name(), "switching session");
        std::mem::replace(&mut self.active, session)
    }
}
