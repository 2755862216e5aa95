//! # listguard-core -- Contract verifier for paginated listing endpoints
//!
//! Drives an [`ApiUnderTest`] through a declarative [`VerificationPlan`]:
//!
//! - **Fixtures** ([`fixture`]): authenticate actors and seed parent records.
//! - **Filter oracle** ([`oracle`]): derive predicates from sampled records
//!   and check that filtered listings honour them.
//! - **Pagination** ([`pagination`]): metadata consistency, page boundaries,
//!   out-of-range behaviour, sort order, idempotence, full page walks.
//! - **Access control** ([`access`]): the same query under forbidden
//!   identities must be denied.
//! - **Reports** ([`report`]): every check becomes a titled record.
//!
//! ## Errors
//!
//! A run returns `Err` only when the plan is malformed or fixture setup
//! fails. Contract violations are failed records in the [`Report`].
//!
//! ## Sessions
//!
//! There is no ambient "current user". Every collaborator call takes the
//! acting [`ActorSession`]; the identity a run issues calls as lives in a
//! [`SessionContext`] owned by that run, so independent runs can execute
//! concurrently.

pub mod access;
pub mod api;
pub mod error;
pub mod fixture;
pub mod oracle;
pub mod pagination;
pub mod plan;
pub mod query;
pub mod report;
pub mod runner;
pub mod session;
pub mod template;

#[cfg(test)]
mod testing;

pub use access::{probe_access_control, ForbiddenIdentity};
pub use api::{ApiUnderTest, Collection, QuerySource};
pub use error::{CallError, FixtureError, PlanError, VerifyError};
pub use fixture::{build_fixtures, FixturePlan, Fixtures};
pub use oracle::{derive_filters, FilterKind, FilterPredicate, FilterSpec};
pub use pagination::{verify_pagination, OutOfRangePolicy, PaginationOptions, SortOrder, SortSpec};
pub use plan::{TargetSpec, VerificationPlan};
pub use query::{ListQuery, PageResult, Pagination, SortDirection};
pub use report::{Aggregator, AssertionRecord, Outcome, Report};
pub use runner::run_verification;
pub use session::{ActorSession, Authenticated, Credentials, Role, SessionContext};
