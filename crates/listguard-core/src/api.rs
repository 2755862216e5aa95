//! # API Under Test
//!
//! The verifier never talks HTTP itself. It drives an implementation of
//! [`ApiUnderTest`], which `listguard-client` provides over reqwest and the
//! unit tests provide in memory.
//!
//! Every call takes the acting [`ActorSession`] explicitly. Implementations
//! must not remember a "current" identity between calls.

use std::future::Future;

use serde_json::Value;

use crate::error::CallError;
use crate::query::{ListQuery, PageResult};
use crate::session::{ActorSession, Authenticated, Credentials, Role};

/// Operations the verifier needs from the platform being verified.
pub trait ApiUnderTest: Send + Sync {
    /// Join or log in as `role`.
    fn authenticate(
        &self,
        role: Role,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Authenticated, CallError>> + Send;

    /// Create one resource under `path` as `session`.
    fn create_entity(
        &self,
        path: &str,
        body: &Value,
        session: &ActorSession,
    ) -> impl Future<Output = Result<Value, CallError>> + Send;

    /// Issue a paginated, filtered listing of `path` as `session`.
    fn query_collection(
        &self,
        path: &str,
        query: &ListQuery,
        session: &ActorSession,
    ) -> impl Future<Output = Result<PageResult, CallError>> + Send;
}

/// Something that answers listing queries: the unit the pagination verifier,
/// filter checks and access prober work against.
pub trait QuerySource: Send + Sync {
    fn query(
        &self,
        query: &ListQuery,
        session: &ActorSession,
    ) -> impl Future<Output = Result<PageResult, CallError>> + Send;
}

/// One listing endpoint of an [`ApiUnderTest`].
#[derive(Debug)]
pub struct Collection<'a, A> {
    api: &'a A,
    path: &'a str,
}

impl<'a, A: ApiUnderTest> Collection<'a, A> {
    pub fn new(api: &'a A, path: &'a str) -> Self {
        Self { api, path }
    }
}

impl<A: ApiUnderTest> QuerySource for Collection<'_, A> {
    async fn query(
        &self,
        query: &ListQuery,
        session: &ActorSession,
    ) -> Result<PageResult, CallError> {
        self.api.query_collection(self.path, query, session).await
    }
}
