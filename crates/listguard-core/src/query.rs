//! # List Queries and Page Results
//!
//! [`ListQuery`] is the request side of a paginated listing call and
//! [`PageResult`] the response side. Both mirror the wire shape used by the
//! commerce API's index endpoints:
//!
//! ```json
//! { "business_status": "normal", "page": 2, "limit": 1, "sortBy": "created_at", "sortDirection": "desc" }
//! { "pagination": { "current": 2, "limit": 1, "records": 3, "pages": 3 }, "data": [ ... ] }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sort direction for a sorted listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("asc"),
            Self::Desc => f.write_str("desc"),
        }
    }
}

/// Requested ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDirective {
    pub field: String,
    pub direction: SortDirection,
}

/// One listing request: filters plus optional paging and sort directives.
///
/// Immutable once built; the `with_*` methods consume the query and return a
/// new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    filters: BTreeMap<String, Value>,
    page: Option<u32>,
    limit: Option<u32>,
    sort: Option<SortDirective>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query carrying the given filters and no paging directives.
    pub fn with_filters(filters: BTreeMap<String, Value>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    pub fn filter(mut self, param: impl Into<String>, value: Value) -> Self {
        self.filters.insert(param.into(), value);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(SortDirective {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn filters(&self) -> &BTreeMap<String, Value> {
        &self.filters
    }

    pub fn page_number(&self) -> Option<u32> {
        self.page
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    pub fn sort_directive(&self) -> Option<&SortDirective> {
        self.sort.as_ref()
    }

    /// JSON request body. Absent directives are omitted.
    pub fn to_body(&self) -> Value {
        let mut body: Map<String, Value> = self
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(page) = self.page {
            body.insert("page".into(), Value::from(page));
        }
        if let Some(limit) = self.limit {
            body.insert("limit".into(), Value::from(limit));
        }
        if let Some(sort) = &self.sort {
            body.insert("sortBy".into(), Value::from(sort.field.clone()));
            body.insert("sortDirection".into(), Value::from(sort.direction.to_string()));
        }
        Value::Object(body)
    }
}

/// Page metadata returned alongside every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number this result holds.
    pub current: u64,
    /// Page size the server applied.
    pub limit: u64,
    /// Total matching records across all pages.
    pub records: u64,
    /// Total page count.
    pub pages: u64,
}

impl Pagination {
    /// Page count the metadata should report for its own `records`/`limit`.
    pub fn expected_pages(&self) -> u64 {
        expected_pages(self.records, self.limit)
    }
}

/// `ceil(records / limit)`, with a zero limit yielding zero pages.
pub fn expected_pages(records: u64, limit: u64) -> u64 {
    if limit == 0 {
        0
    } else {
        records.div_ceil(limit)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub pagination: Pagination,
    #[serde(default)]
    pub data: Vec<Value>,
}

impl PageResult {
    /// Ids of the records on this page, in order. Records without an id
    /// contribute `None`.
    pub fn ids(&self, id_field: &str) -> Vec<Option<String>> {
        self.data.iter().map(|r| record_id(r, id_field)).collect()
    }
}

/// Look up a dotted field path (`seller.id`) in a record.
///
/// Explicit JSON nulls are reported as absent.
pub fn field_value<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// Identity of a record as a string, whatever JSON type the id has.
pub fn record_id(record: &Value, id_field: &str) -> Option<String> {
    match field_value(record, id_field)? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
