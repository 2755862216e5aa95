// SPDX-License-Identifier: BUSL-1.1
//! In-memory storage backend using DashMap.
//!
//! Accounts are keyed by email, issued tokens by token string, and each
//! resource collection by record id. Every stored record carries an
//! insertion sequence number so listings have a stable default order.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Account roles the stub knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Seller,
    Buyer,
    Customer,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "seller" => Ok(Self::Seller),
            "buyer" => Ok(Self::Buyer),
            "customer" => Ok(Self::Customer),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Admin => "admin",
            Self::Seller => "seller",
            Self::Buyer => "buyer",
            Self::Customer => "customer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub tenant: String,
}

/// Why a join-or-login attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRefused {
    WrongPassword,
    WrongRole,
}

/// Resource collections served by the stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Channels,
    Products,
}

/// A stored record and its insertion sequence number.
#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    record: Value,
}

struct Inner {
    accounts: DashMap<String, Account>,
    /// token -> account email
    tokens: DashMap<String, String>,
    channels: DashMap<Uuid, Stored>,
    products: DashMap<Uuid, Stored>,
    seq: AtomicU64,
}

/// Shared application state holding all in-memory stores.
///
/// Cheaply cloneable via `Arc`; all clones share the same data.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                accounts: DashMap::new(),
                tokens: DashMap::new(),
                channels: DashMap::new(),
                products: DashMap::new(),
                seq: AtomicU64::new(0),
            }),
        }
    }

    fn collection(&self, kind: Kind) -> &DashMap<Uuid, Stored> {
        match kind {
            Kind::Channels => &self.inner.channels,
            Kind::Products => &self.inner.products,
        }
    }

    /// Store `record` under `id` after everything stored so far.
    pub fn insert(&self, kind: Kind, id: Uuid, record: Value) {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        self.collection(kind).insert(id, Stored { seq, record });
    }

    /// Records of one collection in insertion order.
    pub fn records(&self, kind: Kind) -> Vec<Value> {
        let mut stored: Vec<Stored> = self
            .collection(kind)
            .iter()
            .map(|e| e.value().clone())
            .collect();
        stored.sort_by_key(|s| s.seq);
        stored.into_iter().map(|s| s.record).collect()
    }

    /// Create the account on first sight of `email`, otherwise log in.
    ///
    /// Returns the account, a fresh token and whether the account was new.
    pub fn join_or_login(
        &self,
        role: Role,
        email: &str,
        password: &str,
        tenant: Option<&str>,
    ) -> Result<(Account, String, bool), LoginRefused> {
        let (account, created) = match self.inner.accounts.entry(email.to_string()) {
            Entry::Occupied(entry) => {
                let account = entry.get();
                if account.password != password {
                    return Err(LoginRefused::WrongPassword);
                }
                if account.role != role {
                    return Err(LoginRefused::WrongRole);
                }
                (account.clone(), false)
            }
            Entry::Vacant(entry) => {
                let id = Uuid::new_v4();
                let account = Account {
                    id,
                    email: email.to_string(),
                    password: password.to_string(),
                    role,
                    tenant: tenant.map_or_else(|| format!("tenant-{}", id.simple()), str::to_string),
                };
                entry.insert(account.clone());
                (account, true)
            }
        };
        let token = Uuid::new_v4().simple().to_string();
        self.inner.tokens.insert(token.clone(), account.email.clone());
        Ok((account, token, created))
    }

    /// The account a bearer token was issued to.
    pub fn account_for_token(&self, token: &str) -> Option<Account> {
        let email = self.inner.tokens.get(token)?.value().clone();
        self.inner.accounts.get(&email).map(|a| a.value().clone())
    }
}
