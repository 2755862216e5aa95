//! # listguard-client -- HTTP implementation of the API under test
//!
//! [`HttpApi`] implements [`ApiUnderTest`] over reqwest. Paths handed to it by
//! the verifier (`/channels`, `/products`) are resolved against
//! [`ClientConfig::base_url`]; the acting session's token, if any, is sent as
//! a bearer header on that request only. The client itself never holds an
//! identity.
//!
//! Non-2xx statuses are reported through [`CallError`]: 401/403 become
//! `AccessDenied`, 404 `NotFound`, 400/422 `ValidationFailed`, everything else
//! `Api`.

pub mod config;
pub mod error;
pub(crate) mod resend;

pub use config::{ClientConfig, ListMethod};
pub use error::ClientError;

use std::time::Duration;

use listguard_core::{
    ActorSession, ApiUnderTest, Authenticated, CallError, Credentials, ListQuery, PageResult, Role,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::resend::Resend;

/// The API under test, spoken to over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpApi {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self { http, config })
    }

    /// Build a client from `LISTGUARD_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &Value,
        token: Option<&str>,
        policy: Resend,
    ) -> Result<T, ClientError> {
        let endpoint = format!("{method} /{}", path.trim_start_matches('/'));
        let url = self.config.resolve(path)?;

        let resp = resend::send_with(&endpoint, policy, || {
            let request = self.http.request(method.clone(), url.clone()).json(body);
            match token {
                Some(token) => request.bearer_auth(token).send(),
                None => request.send(),
            }
        })
        .await
        .map_err(|e| ClientError::Http {
            endpoint: endpoint.clone(),
            source: e,
        })?;

        let status = resp.status();
        tracing::debug!(endpoint = %endpoint, status = status.as_u16(), "response received");
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::status(&endpoint, status.as_u16(), &body));
        }

        let bytes = resp.bytes().await.map_err(|e| ClientError::Http {
            endpoint: endpoint.clone(),
            source: e,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Deserialization {
            endpoint,
            reason: e.to_string(),
        })
    }
}

/// Read a string (or number, for numeric ids) at `pointer`.
fn string_at(doc: &Value, pointer: &str) -> Option<String> {
    match doc.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl ApiUnderTest for HttpApi {
    async fn authenticate(
        &self,
        role: Role,
        credentials: &Credentials,
    ) -> Result<Authenticated, CallError> {
        let path = self.config.auth_path(role.as_str());
        let body = serde_json::to_value(credentials).map_err(|e| CallError::Decode {
            endpoint: format!("POST /{path}"),
            reason: e.to_string(),
        })?;
        let doc: Value = self
            .call(reqwest::Method::POST, &path, &body, None, Resend::Never)
            .await?;

        let missing = |pointer: &str| CallError::Decode {
            endpoint: format!("POST /{path}"),
            reason: format!("no string at {pointer} in authenticate response"),
        };
        let token = string_at(&doc, &self.config.token_pointer)
            .ok_or_else(|| missing(&self.config.token_pointer))?;
        let actor_id = string_at(&doc, &self.config.actor_id_pointer)
            .ok_or_else(|| missing(&self.config.actor_id_pointer))?;
        Ok(Authenticated {
            actor_id,
            token: Zeroizing::new(token),
        })
    }

    async fn create_entity(
        &self,
        path: &str,
        body: &Value,
        session: &ActorSession,
    ) -> Result<Value, CallError> {
        Ok(self
            .call(reqwest::Method::POST, path, body, session.token(), Resend::Never)
            .await?)
    }

    async fn query_collection(
        &self,
        path: &str,
        query: &ListQuery,
        session: &ActorSession,
    ) -> Result<PageResult, CallError> {
        let method = self.config.list_method.as_reqwest();
        Ok(self
            .call(method, path, &query.to_body(), session.token(), Resend::OnConnectFailure)
            .await?)
    }
}
