//! # Filter Oracle
//!
//! Derives expected-match predicates from records sampled out of an
//! unfiltered listing, then checks that the filtered listing honours them.
//!
//! | Kind | Derived from | Sent as | Predicate |
//! |------|--------------|---------|-----------|
//! | `exact` | first sample | the sampled value | `record[field] == value` |
//! | `substring` | first sample | strict substring | `record[field].contains(sub)` |
//! | `range_numeric` | first and last samples | `{"min": lo, "max": hi}` | `lo <= record[field] <= hi` |
//! | `range_date` | first and last samples | `{"min": lo, "max": hi}` | same, on RFC 3339 instants |
//!
//! A null or absent sampled value skips that field. An empty reference
//! collection skips the whole oracle.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::QuerySource;
use crate::query::{field_value, record_id, ListQuery};
use crate::report::{Aggregator, AssertionRecord};
use crate::session::ActorSession;
use crate::template::random_string;

/// Length of the random value used for absent-value probes.
pub const ABSENT_VALUE_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Exact,
    Substring,
    RangeNumeric,
    RangeDate,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exact => "exact",
            Self::Substring => "substring",
            Self::RangeNumeric => "range_numeric",
            Self::RangeDate => "range_date",
        };
        f.write_str(name)
    }
}

/// A filter the endpoint supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Record field the filter applies to (dotted path).
    pub field: String,
    /// Request parameter name; defaults to `field`.
    #[serde(default)]
    pub param: Option<String>,
    pub kind: FilterKind,
    /// Also check that a random value matches nothing. Only meaningful for
    /// `exact` and `substring` filters.
    #[serde(default = "yes")]
    pub probe_absent: bool,
}

fn yes() -> bool {
    true
}

impl FilterSpec {
    pub fn new(field: impl Into<String>, kind: FilterKind) -> Self {
        Self {
            field: field.into(),
            param: None,
            kind,
            probe_absent: true,
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn param(&self) -> &str {
        self.param.as_deref().unwrap_or(&self.field)
    }
}

/// How a record field is tested against a derived filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    Equals(Value),
    Contains(String),
    NumberRange { min: f64, max: f64 },
    DateRange {
        min: DateTime<FixedOffset>,
        max: DateTime<FixedOffset>,
    },
}

impl Matcher {
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Self::Equals(expected) => value == expected,
            Self::Contains(needle) => value.as_str().map_or(false, |s| s.contains(needle.as_str())),
            Self::NumberRange { min, max } => value
                .as_f64()
                .map_or(false, |v| *min <= v && v <= *max),
            Self::DateRange { min, max } => parse_date(value).map_or(false, |v| *min <= v && v <= *max),
        }
    }
}

/// A filter derived from sampled data: what to send and what every returned
/// record must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub field: String,
    pub param: String,
    pub kind: FilterKind,
    pub matcher: Matcher,
    pub query_value: Value,
}

impl FilterPredicate {
    pub fn matches(&self, record: &Value) -> bool {
        self.matcher.matches(field_value(record, &self.field))
    }

    /// `query` with this filter added.
    pub fn apply(&self, query: ListQuery) -> ListQuery {
        query.filter(self.param.clone(), self.query_value.clone())
    }
}

/// Outcome of deriving one field's filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Derived {
    Predicate(FilterPredicate),
    Skipped { field: String, reason: String },
}

/// Outcome of running the oracle over a reference collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    /// The reference collection was empty.
    NoData,
    Derived(Vec<Derived>),
}

impl Derivation {
    pub fn predicates(&self) -> impl Iterator<Item = &FilterPredicate> {
        let items: &[Derived] = match self {
            Self::NoData => &[],
            Self::Derived(items) => items,
        };
        items.iter().filter_map(|d| match d {
            Derived::Predicate(p) => Some(p),
            Derived::Skipped { .. } => None,
        })
    }
}

/// A strict, non-empty substring of `s`: the first half of its characters,
/// at least one. Single-character strings yield themselves.
pub fn strict_substring(s: &str) -> Option<String> {
    let len = s.chars().count();
    if len == 0 {
        return None;
    }
    let take = (len / 2).max(1);
    Some(s.chars().take(take).collect())
}

fn parse_date(value: &Value) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.as_str()?).ok()
}

/// Derive one predicate per spec from `samples`.
pub fn derive_filters(samples: &[Value], specs: &[FilterSpec]) -> Derivation {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Derivation::NoData;
    };
    let derived = specs
        .iter()
        .map(|spec| derive_one(spec, first, last))
        .collect();
    Derivation::Derived(derived)
}

fn derive_one(spec: &FilterSpec, first: &Value, last: &Value) -> Derived {
    let skipped = |reason: &str| Derived::Skipped {
        field: spec.field.clone(),
        reason: reason.to_string(),
    };
    let Some(value) = field_value(first, &spec.field) else {
        return skipped("sampled value is null or absent");
    };
    let predicate = |matcher: Matcher, query_value: Value| {
        Derived::Predicate(FilterPredicate {
            field: spec.field.clone(),
            param: spec.param().to_string(),
            kind: spec.kind,
            matcher,
            query_value,
        })
    };

    match spec.kind {
        FilterKind::Exact => predicate(Matcher::Equals(value.clone()), value.clone()),
        FilterKind::Substring => {
            let Some(sub) = value.as_str().and_then(strict_substring) else {
                return skipped("sampled value is not a non-empty string");
            };
            predicate(Matcher::Contains(sub.clone()), Value::from(sub))
        }
        FilterKind::RangeNumeric => {
            let other = field_value(last, &spec.field).unwrap_or(value);
            let (Some(a), Some(b)) = (value.as_f64(), other.as_f64()) else {
                return skipped("sampled value is not numeric");
            };
            let (lo, hi) = if a <= b { (value, other) } else { (other, value) };
            predicate(
                Matcher::NumberRange {
                    min: a.min(b),
                    max: a.max(b),
                },
                json!({"min": lo, "max": hi}),
            )
        }
        FilterKind::RangeDate => {
            let other = field_value(last, &spec.field).unwrap_or(value);
            let (Some(a), Some(b)) = (parse_date(value), parse_date(other)) else {
                return skipped("sampled value is not an RFC 3339 timestamp");
            };
            let (lo, hi) = if a <= b { (value, other) } else { (other, value) };
            predicate(
                Matcher::DateRange {
                    min: a.min(b),
                    max: a.max(b),
                },
                json!({"min": lo, "max": hi}),
            )
        }
    }
}

/// Knobs for [`verify_filters`].
#[derive(Debug, Clone)]
pub struct FilterOptions {
    /// Page size requested for every filtered query.
    pub limit: u32,
    pub id_field: String,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            id_field: "id".into(),
        }
    }
}

/// Issue one filtered query per derived predicate and check that no
/// returned record violates it, then probe each `exact`/`substring` filter
/// with a value that cannot match.
pub async fn verify_filters<S: QuerySource>(
    source: &S,
    session: &ActorSession,
    base: &ListQuery,
    specs: &[FilterSpec],
    derivation: &Derivation,
    options: &FilterOptions,
) -> Vec<AssertionRecord> {
    let mut agg = Aggregator::new();

    match derivation {
        Derivation::NoData => {
            agg.skip("filters", "no data available for filter validation");
            return agg.into_records();
        }
        Derivation::Derived(items) => {
            for item in items {
                match item {
                    Derived::Skipped { field, reason } => {
                        agg.skip(&format!("filter {field}"), reason.clone());
                    }
                    Derived::Predicate(predicate) => {
                        check_predicate(&mut agg, source, session, base, predicate, options).await;
                    }
                }
            }
        }
    }

    for spec in specs.iter().filter(|s| s.probe_absent) {
        if !matches!(spec.kind, FilterKind::Exact | FilterKind::Substring) {
            continue;
        }
        let title = format!("filter {} with an absent value returns no records", spec.param());
        let query = base
            .clone()
            .limit(options.limit)
            .filter(spec.param(), Value::from(random_string(ABSENT_VALUE_LEN)));
        match source.query(&query, session).await {
            Ok(page) => agg.record(&title, page.data.len(), 0),
            Err(e) => agg.fail(&title, e.to_string()),
        }
    }

    agg.into_records()
}

async fn check_predicate<S: QuerySource>(
    agg: &mut Aggregator,
    source: &S,
    session: &ActorSession,
    base: &ListQuery,
    predicate: &FilterPredicate,
    options: &FilterOptions,
) {
    let title = format!("filter {} ({})", predicate.param, predicate.kind);
    let query = predicate.apply(base.clone().limit(options.limit));
    let page = match source.query(&query, session).await {
        Ok(page) => page,
        Err(e) => {
            agg.fail(&format!("{title} query succeeds"), e.to_string());
            return;
        }
    };

    let violators: Vec<String> = page
        .data
        .iter()
        .filter(|r| !predicate.matches(r))
        .map(|r| record_id(r, &options.id_field).unwrap_or_else(|| "<no id>".into()))
        .collect();
    agg.predicate_with(
        &format!("{title} returns only matching records"),
        violators.is_empty(),
        || format!("records violating {:?}: {}", predicate.matcher, violators.join(", ")),
    );
    // The sampled record satisfies its own predicate.
    agg.predicate_with(
        &format!("{title} matches the sampled record"),
        page.pagination.records >= 1,
        || "filtered listing reports zero records".into(),
    );
}

/// An explicit count expectation for a seeded scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountExpectation {
    /// Filters to apply on top of the target's base filters. May contain
    /// placeholders.
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    /// Exact number of records the filtered listing must report.
    pub records: u64,
}

/// Check each expectation's filtered record count.
pub async fn verify_expected_counts<S: QuerySource>(
    source: &S,
    session: &ActorSession,
    base: &ListQuery,
    expectations: &[(BTreeMap<String, Value>, u64)],
) -> Vec<AssertionRecord> {
    let mut agg = Aggregator::new();
    for (filters, records) in expectations {
        let rendered = serde_json::to_string(filters).unwrap_or_default();
        let title = format!("filter {rendered} returns exactly {records} records");
        let query = filters
            .iter()
            .fold(base.clone(), |q, (k, v)| q.filter(k.clone(), v.clone()));
        match source.query(&query, session).await {
            Ok(page) => agg.record(&title, page.pagination.records, *records),
            Err(e) => agg.fail(&title, e.to_string()),
        }
    }
    agg.into_records()
}
