//! # Error Hierarchy
//!
//! Structured error types for the verifier, built with `thiserror`.
//!
//! Only two kinds of error ever leave a verification run: [`FixtureError`]
//! (setup failed, the run is aborted) and [`PlanError`] (the plan itself is
//! malformed). Every other failure is converted into an assertion record by
//! the component that observed it. [`CallError`] is the collaborator-level
//! taxonomy those components classify.

use thiserror::Error;

/// Errors raised by the API under test.
///
/// The verifier treats all variants as an opaque "the call failed", except
/// the access prober which needs to tell [`CallError::AccessDenied`] apart
/// from everything else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The caller is not allowed to perform the operation (401/403).
    #[error("access denied calling {endpoint} (HTTP {status})")]
    AccessDenied {
        /// Method and path of the call.
        endpoint: String,
        /// Status code reported by the API.
        status: u16,
    },

    /// The addressed resource does not exist (404).
    #[error("{endpoint} not found")]
    NotFound {
        /// Method and path of the call.
        endpoint: String,
    },

    /// The API rejected the request body (400/422).
    #[error("{endpoint} rejected the request: {body}")]
    ValidationFailed {
        /// Method and path of the call.
        endpoint: String,
        /// Response body excerpt.
        body: String,
    },

    /// Any other non-success status.
    #[error("{endpoint} returned {status}: {body}")]
    Api {
        /// Method and path of the call.
        endpoint: String,
        /// Status code reported by the API.
        status: u16,
        /// Response body excerpt.
        body: String,
    },

    /// The request never produced a response.
    #[error("transport error calling {endpoint}: {reason}")]
    Transport {
        /// Method and path of the call.
        endpoint: String,
        /// Underlying transport failure.
        reason: String,
    },

    /// The response could not be decoded into the expected shape.
    #[error("failed to decode response from {endpoint}: {reason}")]
    Decode {
        /// Method and path of the call.
        endpoint: String,
        /// Decoder failure.
        reason: String,
    },
}

impl CallError {
    /// Whether this error is an access-control rejection.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Short classification label used in assertion notes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccessDenied { .. } => "access_denied",
            Self::NotFound { .. } => "not_found",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::Api { .. } => "api_error",
            Self::Transport { .. } => "transport",
            Self::Decode { .. } => "decode",
        }
    }
}

/// A verification plan that cannot be executed as written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Two actors, steps, or targets share a name.
    #[error("duplicate {kind} name \"{name}\"")]
    DuplicateName {
        /// "actor", "step" or "target".
        kind: &'static str,
        /// The repeated name.
        name: String,
    },

    /// A step or target runs as an actor the plan never declares.
    #[error("{owner} runs as undeclared actor \"{actor}\"")]
    UnknownActor {
        /// The step or target that refers to the actor.
        owner: String,
        /// The missing actor name.
        actor: String,
    },

    /// A template refers to a step that has not run yet.
    #[error("{owner} references \"{reference}\" which is not produced by an earlier step")]
    ForwardReference {
        /// The step whose template holds the reference.
        owner: String,
        /// The unresolved reference.
        reference: String,
    },

    /// A template placeholder is not recognised.
    #[error("invalid template placeholder \"{placeholder}\": {reason}")]
    InvalidPlaceholder {
        /// The placeholder text between the braces.
        placeholder: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A plan declares nothing to verify.
    #[error("plan declares no targets")]
    NoTargets,

    /// The plan document failed to parse.
    #[error("failed to parse plan: {0}")]
    Parse(String),
}

/// Fixture setup failed. Fatal to the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixtureError {
    /// The plan was rejected before any call was made.
    #[error("fixture plan invalid: {0}")]
    Plan(#[from] PlanError),

    /// A prerequisite call failed.
    #[error("fixture step \"{step}\" failed: {source}")]
    Step {
        /// Name of the actor or entity step that failed.
        step: String,
        /// The collaborator failure.
        source: CallError,
    },

    /// A rendered template does not have the shape the step needs.
    #[error("fixture step \"{step}\" is malformed: {reason}")]
    Malformed {
        /// Name of the step being rendered.
        step: String,
        /// What was wrong with the rendered value.
        reason: String,
    },

    /// A reference resolved against a result that lacks the requested field.
    #[error("fixture step \"{step}\" could not resolve \"{reference}\"")]
    Unresolved {
        /// Name of the step being rendered.
        step: String,
        /// The reference that produced no value.
        reference: String,
    },
}

impl FixtureError {
    /// Name of the step that failed, when the failure happened mid-setup.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Plan(_) => None,
            Self::Step { step, .. }
            | Self::Malformed { step, .. }
            | Self::Unresolved { step, .. } => Some(step),
        }
    }
}

/// Errors that terminate a verification run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The plan is malformed.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Fixture setup failed.
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}
