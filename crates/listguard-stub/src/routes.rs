// SPDX-License-Identifier: BUSL-1.1
//! Route definitions for the commerce listing stub.
//!
//! | Method | Path | Who |
//! |--------|------|-----|
//! | POST | `/auth/:role` | anyone (join or login) |
//! | POST | `/channels` | admin |
//! | PATCH | `/channels` | admin |
//! | POST | `/products` | seller |
//! | PATCH | `/products` | admin (all), seller (own tenant) |
//!
//! Requests without a known bearer token get 401, authenticated callers
//! without the right role get 403.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::listing::{Filter, ListRequest, Match, Schema};
use crate::store::{Account, AppState, Kind, LoginRefused, Role};

const CHANNELS: Schema = Schema {
    filters: &[
        Filter { param: "code", field: "code", matching: Match::Exact },
        Filter { param: "business_status", field: "business_status", matching: Match::Exact },
        Filter { param: "tenant", field: "tenant", matching: Match::Exact },
        Filter { param: "name", field: "name", matching: Match::Substring },
        Filter { param: "created_at", field: "created_at", matching: Match::Range },
    ],
    sortable: &["created_at", "code", "name"],
};

const PRODUCTS: Schema = Schema {
    filters: &[
        Filter { param: "status", field: "status", matching: Match::Exact },
        Filter { param: "seller_id", field: "seller.id", matching: Match::Exact },
        Filter { param: "name", field: "name", matching: Match::Substring },
        Filter { param: "price", field: "price", matching: Match::Range },
        Filter { param: "created_at", field: "created_at", matching: Match::Range },
    ],
    sortable: &["created_at", "price", "name"],
};

/// Build the complete router with all stub routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/:role", post(authenticate))
        .route("/channels", post(channel_create).patch(channel_list))
        .route("/products", post(product_create).patch(product_list))
        // Fallback: 501 Not Implemented
        .fallback(not_implemented)
        .with_state(state)
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Resolve the bearer token to an account, or the 401 to send back.
fn caller(state: &AppState, headers: &HeaderMap) -> Result<Account, Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "missing bearer token"))?;
    state
        .account_for_token(token.trim())
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "unknown token"))
}

fn require(account: &Account, allowed: &[Role]) -> Result<(), Response> {
    if allowed.contains(&account.role) {
        Ok(())
    } else {
        Err(error(
            StatusCode::FORBIDDEN,
            format!("{} may not access this resource", account.role),
        ))
    }
}

fn required_str<'a>(body: &'a Value, key: &str) -> Result<&'a str, Response> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| error(StatusCode::UNPROCESSABLE_ENTITY, format!("{key} is required")))
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> StatusCode {
    StatusCode::OK
}

// ── Auth ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JoinBody {
    email: String,
    password: String,
    #[serde(default)]
    tenant: Option<String>,
}

async fn authenticate(
    State(state): State<AppState>,
    Path(role): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Ok(role) = role.parse::<Role>() else {
        return error(StatusCode::NOT_FOUND, format!("unknown role \"{role}\""));
    };
    let body: JoinBody = match serde_json::from_value(body) {
        Ok(body) => body,
        Err(e) => return error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };

    match state.join_or_login(role, &body.email, &body.password, body.tenant.as_deref()) {
        Ok((account, token, created)) => {
            tracing::debug!(email = %account.email, %role, created, "authenticated");
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let session = json!({
                "id": account.id.to_string(),
                "role": account.role,
                "tenant": account.tenant,
                "token": token,
            });
            (status, Json(session)).into_response()
        }
        Err(LoginRefused::WrongPassword) => error(StatusCode::FORBIDDEN, "wrong password"),
        Err(LoginRefused::WrongRole) => {
            error(StatusCode::FORBIDDEN, "account is registered with another role")
        }
    }
}

// ── Channels ────────────────────────────────────────────────────────

async fn channel_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let account = match caller(&state, &headers).and_then(|a| require(&a, &[Role::Admin]).map(|_| a)) {
        Ok(account) => account,
        Err(resp) => return resp,
    };
    let (code, name) = match (required_str(&body, "code"), required_str(&body, "name")) {
        (Ok(code), Ok(name)) => (code, name),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    let id = Uuid::new_v4();
    let channel = json!({
        "id": id.to_string(),
        "code": code,
        "name": name,
        "business_status": body.get("business_status").and_then(Value::as_str).unwrap_or("normal"),
        "created_at": Utc::now().to_rfc3339(),
        "tenant": account.tenant,
    });

    state.insert(Kind::Channels, id, channel.clone());
    (StatusCode::CREATED, Json(channel)).into_response()
}

async fn channel_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    let account = match caller(&state, &headers) {
        Ok(account) => account,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(&account, &[Role::Admin]) {
        return resp;
    }
    list(&state, Kind::Channels, &CHANNELS, body, |_| true)
}

// ── Products ────────────────────────────────────────────────────────

async fn product_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let account = match caller(&state, &headers).and_then(|a| require(&a, &[Role::Seller]).map(|_| a)) {
        Ok(account) => account,
        Err(resp) => return resp,
    };
    let name = match required_str(&body, "name") {
        Ok(name) => name,
        Err(resp) => return resp,
    };
    let Some(price) = body.get("price").and_then(Value::as_f64).filter(|p| *p >= 0.0) else {
        return error(StatusCode::UNPROCESSABLE_ENTITY, "price must be a non-negative number");
    };

    let id = Uuid::new_v4();
    let product = json!({
        "id": id.to_string(),
        "name": name,
        "status": body.get("status").and_then(Value::as_str).unwrap_or("active"),
        "price": price,
        "created_at": Utc::now().to_rfc3339(),
        "seller": { "id": account.id.to_string(), "tenant": account.tenant },
    });

    state.insert(Kind::Products, id, product.clone());
    (StatusCode::CREATED, Json(product)).into_response()
}

async fn product_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    let account = match caller(&state, &headers) {
        Ok(account) => account,
        Err(resp) => return resp,
    };
    if let Err(resp) = require(&account, &[Role::Admin, Role::Seller]) {
        return resp;
    }
    let own_tenant = (account.role == Role::Seller).then(|| account.tenant.clone());
    list(&state, Kind::Products, &PRODUCTS, body, move |record| {
        own_tenant
            .as_deref()
            .map_or(true, |tenant| record.pointer("/seller/tenant") == Some(&json!(tenant)))
    })
}

fn list(
    state: &AppState,
    kind: Kind,
    schema: &Schema,
    body: Option<Json<Value>>,
    visible: impl Fn(&Value) -> bool,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or(Value::Null);
    let request = match ListRequest::parse(&body, schema) {
        Ok(request) => request,
        Err(message) => return error(StatusCode::BAD_REQUEST, message),
    };
    let records = state.records(kind).into_iter().filter(|r| visible(r)).collect();
    Json(request.apply(records)).into_response()
}

// ── Fallback ────────────────────────────────────────────────────────

async fn not_implemented() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}
