//! In-memory `ApiUnderTest` used by the unit tests.
//!
//! Implements the listing contract the verifier expects (1-based pages,
//! exact/substring/range filters, `sortBy`/`sortDirection`, role checks) and
//! can be told to misbehave so the verifier's detection can be exercised.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::api::ApiUnderTest;
use crate::error::CallError;
use crate::query::{expected_pages, field_value, ListQuery, PageResult, Pagination, SortDirection};
use crate::session::{ActorSession, Authenticated, Credentials, Role};

/// Deliberate contract violations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    /// Filters are accepted but not applied.
    pub ignore_filters: bool,
    /// Every page returns page 1.
    pub repeat_first_page: bool,
    /// Out-of-range pages fail with 400 instead of returning no data.
    pub out_of_range_errors: bool,
    /// Forbidden callers get 404 instead of 403.
    pub deny_as_not_found: bool,
    /// Anyone, even unauthenticated, may list.
    pub open_listing: bool,
    /// Sorting requests are ignored.
    pub ignore_sort: bool,
    /// An unsorted query comes back rotated one more place each time it is repeated.
    pub unstable_order: bool,
}

#[derive(Debug, Default)]
struct Store {
    collections: BTreeMap<String, Vec<Value>>,
    calls: Vec<String>,
    /// Times each listing body has been served.
    repeats: BTreeMap<String, usize>,
}

#[derive(Debug)]
pub struct FakeApi {
    store: Mutex<Store>,
    substring_params: HashSet<String>,
    list_roles: Vec<Role>,
    create_roles: Vec<Role>,
    default_limit: u64,
    faults: Faults,
    fail_create_on: Option<String>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            substring_params: ["name".to_string()].into_iter().collect(),
            list_roles: vec![Role::Admin],
            create_roles: vec![Role::Admin, Role::Seller],
            default_limit: 10,
            faults: Faults::default(),
            fail_create_on: None,
        }
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    pub fn failing_create_on(mut self, path: &str) -> Self {
        self.fail_create_on = Some(path.to_string());
        self
    }

    pub fn seed(&self, path: &str, records: Vec<Value>) {
        let mut store = self.store.lock().unwrap();
        store
            .collections
            .entry(path.to_string())
            .or_default()
            .extend(records);
    }

    pub fn calls(&self) -> Vec<String> {
        self.store.lock().unwrap().calls.clone()
    }

    fn log(&self, call: String) {
        self.store.lock().unwrap().calls.push(call);
    }

    fn matches(&self, record: &Value, param: &str, wanted: &Value) -> bool {
        let actual = field_value(record, param);
        match wanted {
            Value::Object(range) if range.contains_key("min") || range.contains_key("max") => {
                let Some(actual) = actual else { return false };
                let in_lo = range.get("min").map_or(true, |lo| cmp_json(actual, lo) >= 0);
                let in_hi = range.get("max").map_or(true, |hi| cmp_json(actual, hi) <= 0);
                in_lo && in_hi
            }
            Value::String(s) if self.substring_params.contains(param) => actual
                .and_then(Value::as_str)
                .map_or(false, |a| a.contains(s.as_str())),
            other => actual == Some(other),
        }
    }
}

fn cmp_json(a: &Value, b: &Value) -> i8 {
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or_default()
            .partial_cmp(&y.as_f64().unwrap_or_default()),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    };
    match ordering {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Greater) => 1,
        _ => 0,
    }
}

impl ApiUnderTest for FakeApi {
    async fn authenticate(
        &self,
        role: Role,
        credentials: &Credentials,
    ) -> Result<Authenticated, CallError> {
        self.log(format!("authenticate {role} {}", credentials.email));
        Ok(Authenticated {
            actor_id: format!("{role}-{}", credentials.email),
            token: format!("token-{role}").into(),
        })
    }

    async fn create_entity(
        &self,
        path: &str,
        body: &Value,
        session: &ActorSession,
    ) -> Result<Value, CallError> {
        let endpoint = format!("POST {path}");
        self.log(format!("{endpoint} as {}", session.name()));
        if self.fail_create_on.as_deref() == Some(path) {
            return Err(CallError::ValidationFailed {
                endpoint,
                body: "rejected".into(),
            });
        }
        if session.is_anonymous() || !self.create_roles.contains(&session.role()) {
            return Err(CallError::AccessDenied {
                endpoint,
                status: 403,
            });
        }
        let mut store = self.store.lock().unwrap();
        let collection = store.collections.entry(path.to_string()).or_default();
        let mut record = body.clone();
        if let Value::Object(map) = &mut record {
            map.insert("id".into(), json!(format!("rec-{}", collection.len() + 1)));
        }
        collection.push(record.clone());
        Ok(record)
    }

    async fn query_collection(
        &self,
        path: &str,
        query: &ListQuery,
        session: &ActorSession,
    ) -> Result<PageResult, CallError> {
        let endpoint = format!("PATCH {path}");
        self.log(format!("{endpoint} as {}", session.name()));
        if !self.faults.open_listing
            && (session.is_anonymous() || !self.list_roles.contains(&session.role()))
        {
            return Err(if self.faults.deny_as_not_found {
                CallError::NotFound { endpoint }
            } else {
                CallError::AccessDenied {
                    endpoint,
                    status: if session.is_anonymous() { 401 } else { 403 },
                }
            });
        }

        let mut store = self.store.lock().unwrap();
        let seen = store.repeats.entry(format!("{path} {}", query.to_body())).or_insert(0);
        let repeat = *seen;
        *seen += 1;
        let mut records: Vec<Value> = store.collections.get(path).cloned().unwrap_or_default();
        if self.faults.unstable_order && query.sort_directive().is_none() && !records.is_empty() {
            let len = records.len();
            records.rotate_left(repeat % len);
        }
        if !self.faults.ignore_filters {
            records.retain(|r| {
                query
                    .filters()
                    .iter()
                    .all(|(param, wanted)| self.matches(r, param, wanted))
            });
        }
        if let (Some(sort), false) = (query.sort_directive(), self.faults.ignore_sort) {
            records.sort_by(|a, b| {
                let ord = match (field_value(a, &sort.field), field_value(b, &sort.field)) {
                    (Some(x), Some(y)) => cmp_json(x, y),
                    _ => 0,
                };
                ord.cmp(&0)
            });
            if sort.direction == SortDirection::Desc {
                records.reverse();
            }
        }

        let limit = query.limit_value().map_or(self.default_limit, u64::from);
        let page = query.page_number().map_or(1, u64::from);
        let total = records.len() as u64;
        let pages = expected_pages(total, limit);
        if page > pages.max(1) && self.faults.out_of_range_errors {
            return Err(CallError::ValidationFailed {
                endpoint,
                body: "page out of range".into(),
            });
        }
        let effective = if self.faults.repeat_first_page { 1 } else { page };
        let data = records
            .into_iter()
            .skip(((effective - 1) * limit) as usize)
            .take(limit as usize)
            .collect();
        Ok(PageResult {
            pagination: Pagination {
                current: page,
                limit,
                records: total,
                pages,
            },
            data,
        })
    }
}

/// Admin session as the fake API would issue it.
pub fn admin() -> ActorSession {
    session("admin", Role::Admin)
}

pub fn session(name: &str, role: Role) -> ActorSession {
    ActorSession::authenticated(
        name,
        role,
        Authenticated {
            actor_id: format!("{name}-id"),
            token: format!("token-{role}").into(),
        },
        None,
    )
}

/// The channel scenario: two `normal` channels and one `archived` one.
pub fn channels() -> Vec<Value> {
    vec![
        json!({"id": "c1", "code": "web", "name": "Web Store", "business_status": "normal", "created_at": "2026-01-01T00:00:00Z", "priority": 1}),
        json!({"id": "c2", "code": "app", "name": "Mobile App", "business_status": "normal", "created_at": "2026-02-01T00:00:00Z", "priority": 5}),
        json!({"id": "c3", "code": "pos", "name": "Retail POS", "business_status": "archived", "created_at": "2026-03-01T00:00:00Z", "priority": 3}),
    ]
}
