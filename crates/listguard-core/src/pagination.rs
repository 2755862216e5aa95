//! # Pagination Verifier
//!
//! Exercises the paging contract of one listing endpoint:
//!
//! 1. baseline query (no page/limit): metadata is self-consistent;
//! 2. `limit=1` pages 1 and 2: directives are echoed and the first records
//!    differ;
//! 3. an out-of-range page, judged by the endpoint's [`OutOfRangePolicy`];
//! 4. ascending/descending order for every declared sort capability;
//! 5. the same query twice returns the same ordering;
//! 6. walking every page partitions the records with no duplicates.
//!
//! Each sub-check yields its own record. A failing sub-check never stops the
//! others.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::QuerySource;
use crate::query::{expected_pages, field_value, ListQuery, PageResult, SortDirection};
use crate::report::{Aggregator, AssertionRecord};
use crate::session::ActorSession;

/// What a page past the last one must produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    /// A successful response with no data.
    #[default]
    Empty,
    /// A failed call.
    Error,
    /// Either of the above.
    Either,
}

/// Comparator for sort checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Numeric,
    #[default]
    Text,
    Date,
}

/// A declared sort capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Value sent as `sortBy`.
    pub field: String,
    /// Record path holding the sort key; defaults to `field`.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            key: None,
            order,
        }
    }

    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.field)
    }
}

/// Per-endpoint pagination knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationOptions {
    /// Lower bound on the baseline record count, e.g. the number of seeded
    /// records.
    #[serde(default)]
    pub total_known: Option<u64>,
    #[serde(default)]
    pub out_of_range: OutOfRangePolicy,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    /// Page size used for sort checks.
    #[serde(default = "default_sort_limit")]
    pub sort_limit: u32,
    /// Page size used when walking every page.
    #[serde(default = "default_walk_page_size")]
    pub walk_page_size: u32,
    /// Walk only when the listing holds at most this many records.
    #[serde(default = "default_walk_limit")]
    pub walk_limit_records: u64,
}

fn default_sort_limit() -> u32 {
    100
}

fn default_walk_page_size() -> u32 {
    2
}

fn default_walk_limit() -> u64 {
    200
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            total_known: None,
            out_of_range: OutOfRangePolicy::default(),
            sort: Vec::new(),
            sort_limit: default_sort_limit(),
            walk_page_size: default_walk_page_size(),
            walk_limit_records: default_walk_limit(),
        }
    }
}

/// Run every pagination sub-check against `source`.
pub async fn verify_pagination<S: QuerySource>(
    source: &S,
    session: &ActorSession,
    base: &ListQuery,
    options: &PaginationOptions,
    id_field: &str,
) -> Vec<AssertionRecord> {
    let mut agg = Aggregator::new();

    let baseline = match source.query(base, session).await {
        Ok(page) => page,
        Err(e) => {
            agg.fail("baseline query succeeds", e.to_string());
            agg.skip("pagination", "baseline listing unavailable");
            return agg.into_records();
        }
    };
    check_metadata(&mut agg, "baseline", &baseline);
    agg.record("baseline starts at page 1", baseline.pagination.current, 1);
    if let Some(known) = options.total_known {
        agg.predicate_with(
            "baseline reports at least the known records",
            baseline.pagination.records >= known,
            || format!("records={} known={known}", baseline.pagination.records),
        );
    }

    check_single_record_pages(&mut agg, source, session, base, id_field).await;
    check_out_of_range(&mut agg, source, session, base, &baseline, options.out_of_range).await;
    for spec in &options.sort {
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            check_sort(&mut agg, source, session, base, spec, direction, options.sort_limit).await;
        }
    }
    check_idempotence(&mut agg, source, session, base, &baseline, id_field).await;
    check_walk(&mut agg, source, session, base, &baseline, options, id_field).await;

    agg.into_records()
}

fn check_metadata(agg: &mut Aggregator, label: &str, page: &PageResult) {
    let meta = page.pagination;
    agg.predicate_with(
        &format!("{label} data fits within limit"),
        page.data.len() as u64 <= meta.limit,
        || format!("{} records for limit {}", page.data.len(), meta.limit),
    );
    agg.record(
        &format!("{label} pages equals ceil(records / limit)"),
        meta.pages,
        meta.expected_pages(),
    );
}

async fn check_single_record_pages<S: QuerySource>(
    agg: &mut Aggregator,
    source: &S,
    session: &ActorSession,
    base: &ListQuery,
    id_field: &str,
) {
    let first = match source.query(&base.clone().page(1).limit(1), session).await {
        Ok(page) => page,
        Err(e) => {
            agg.fail("limit=1 page 1 query succeeds", e.to_string());
            return;
        }
    };
    agg.record("limit=1 page 1 echoes current page", first.pagination.current, 1);
    agg.record("limit=1 page 1 echoes limit", first.pagination.limit, 1);
    agg.predicate("limit=1 page 1 yields at most one record", first.data.len() <= 1);
    check_metadata(agg, "limit=1 page 1", &first);

    if first.pagination.pages <= 1 {
        agg.skip("limit=1 pages 1 and 2 differ", "fewer than two records");
        return;
    }

    let second = match source.query(&base.clone().page(2).limit(1), session).await {
        Ok(page) => page,
        Err(e) => {
            agg.fail("limit=1 page 2 query succeeds", e.to_string());
            return;
        }
    };
    agg.record("limit=1 page 2 echoes current page", second.pagination.current, 2);
    agg.record("limit=1 page 2 echoes limit", second.pagination.limit, 1);
    agg.predicate("limit=1 page 2 yields at most one record", second.data.len() <= 1);

    let a = first.ids(id_field).into_iter().next().flatten();
    let b = second.ids(id_field).into_iter().next().flatten();
    match (a, b) {
        (Some(a), Some(b)) => agg.predicate_with("limit=1 pages 1 and 2 differ", a != b, || {
            format!("both pages start with {a}")
        }),
        _ => agg.fail(
            "limit=1 pages 1 and 2 differ",
            format!("page 1 or page 2 has no record with an \"{id_field}\""),
        ),
    }
}

async fn check_out_of_range<S: QuerySource>(
    agg: &mut Aggregator,
    source: &S,
    session: &ActorSession,
    base: &ListQuery,
    baseline: &PageResult,
    policy: OutOfRangePolicy,
) {
    // An empty listing has zero pages, but page 1 is still in range.
    let page = baseline.pagination.pages.max(1).saturating_add(1);
    let Ok(page) = u32::try_from(page) else {
        agg.skip("out-of-range page", "page count exceeds request range");
        return;
    };
    let title = format!("out-of-range page {page} follows {policy:?} policy");
    let result = source.query(&base.clone().page(page), session).await;
    match (policy, result) {
        (OutOfRangePolicy::Empty | OutOfRangePolicy::Either, Ok(p)) => {
            agg.predicate_with(&title, p.data.is_empty(), || {
                format!("returned {} records", p.data.len())
            })
        }
        (OutOfRangePolicy::Error, Ok(p)) => agg.fail(
            &title,
            format!("succeeded with {} records", p.data.len()),
        ),
        (OutOfRangePolicy::Empty, Err(e)) => agg.fail(&title, e.to_string()),
        (OutOfRangePolicy::Error | OutOfRangePolicy::Either, Err(_)) => agg.predicate(&title, true),
    }
}

#[derive(Debug, PartialEq, PartialOrd)]
enum SortKey {
    Num(f64),
    Text(String),
    Date(DateTime<FixedOffset>),
}

fn sort_key(value: &Value, order: SortOrder) -> Option<SortKey> {
    match order {
        SortOrder::Numeric => value.as_f64().map(SortKey::Num),
        SortOrder::Text => Some(SortKey::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        SortOrder::Date => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(SortKey::Date),
    }
}

/// Index of the first adjacent pair out of order, if any.
fn first_inversion(keys: &[SortKey], direction: SortDirection) -> Option<usize> {
    keys.windows(2).position(|w| {
        let ord = w[0].partial_cmp(&w[1]);
        match direction {
            SortDirection::Asc => ord == Some(Ordering::Greater),
            SortDirection::Desc => ord == Some(Ordering::Less),
        }
    })
}

async fn check_sort<S: QuerySource>(
    agg: &mut Aggregator,
    source: &S,
    session: &ActorSession,
    base: &ListQuery,
    spec: &SortSpec,
    direction: SortDirection,
    limit: u32,
) {
    let title = format!("sort by {} {direction} is monotonic", spec.field);
    let query = base.clone().limit(limit).sort(spec.field.clone(), direction);
    let page = match source.query(&query, session).await {
        Ok(page) => page,
        Err(e) => {
            agg.fail(&title, e.to_string());
            return;
        }
    };
    let mut keys = Vec::with_capacity(page.data.len());
    for (i, record) in page.data.iter().enumerate() {
        match field_value(record, spec.key()).and_then(|v| sort_key(v, spec.order)) {
            Some(key) => keys.push(key),
            None => {
                agg.fail(
                    &title,
                    format!("record {i} has no {:?} key at \"{}\"", spec.order, spec.key()),
                );
                return;
            }
        }
    }
    match first_inversion(&keys, direction) {
        None => agg.predicate(&title, true),
        Some(i) => agg.fail(
            &title,
            format!("records {i} and {} out of order: {:?} then {:?}", i + 1, keys[i], keys[i + 1]),
        ),
    }
}

async fn check_idempotence<S: QuerySource>(
    agg: &mut Aggregator,
    source: &S,
    session: &ActorSession,
    base: &ListQuery,
    baseline: &PageResult,
    id_field: &str,
) {
    let title = "identical query twice yields identical ordering";
    match source.query(base, session).await {
        Ok(again) => agg.record(title, again.ids(id_field), baseline.ids(id_field)),
        Err(e) => agg.fail(title, e.to_string()),
    }
}

async fn check_walk<S: QuerySource>(
    agg: &mut Aggregator,
    source: &S,
    session: &ActorSession,
    base: &ListQuery,
    baseline: &PageResult,
    options: &PaginationOptions,
    id_field: &str,
) {
    let records = baseline.pagination.records;
    if records == 0 {
        agg.skip("page walk", "no records to walk");
        return;
    }
    if records > options.walk_limit_records || options.walk_page_size == 0 {
        agg.skip(
            "page walk",
            format!("{records} records exceeds walk limit {}", options.walk_limit_records),
        );
        return;
    }

    let limit = options.walk_page_size;
    let pages = expected_pages(records, u64::from(limit));
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    let mut total = 0u64;
    let mut oversized = Vec::new();
    for page in 1..=pages {
        let Ok(page_no) = u32::try_from(page) else {
            break;
        };
        let result = match source.query(&base.clone().page(page_no).limit(limit), session).await {
            Ok(result) => result,
            Err(e) => {
                agg.fail(&format!("page walk page {page} succeeds"), e.to_string());
                return;
            }
        };
        if result.data.len() as u64 > u64::from(limit) {
            oversized.push(page);
        }
        total += result.data.len() as u64;
        for id in result.ids(id_field).into_iter().flatten() {
            if !seen.insert(id.clone()) {
                duplicates.push(id);
            }
        }
    }

    agg.record("page walk sums to total records", total, records);
    agg.predicate_with("page walk sees no record twice", duplicates.is_empty(), || {
        format!("duplicated ids: {}", duplicates.join(", "))
    });
    agg.predicate_with("page walk pages fit within limit", oversized.is_empty(), || {
        format!("oversized pages: {oversized:?}")
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Collection;
    use crate::report::Outcome;
    use crate::testing::{admin, channels, FakeApi, Faults};
    use serde_json::json;

    fn options() -> PaginationOptions {
        PaginationOptions {
            total_known: Some(3),
            sort: vec![
                SortSpec::new("created_at", SortOrder::Date),
                SortSpec::new("priority", SortOrder::Numeric),
                SortSpec::new("code", SortOrder::Text),
            ],
            ..PaginationOptions::default()
        }
    }

    async fn run(api: &FakeApi, options: &PaginationOptions) -> Vec<AssertionRecord> {
        let collection = Collection::new(api, "/channels");
        verify_pagination(&collection, &admin(), &ListQuery::new(), options, "id").await
    }

    fn outcome(records: &[AssertionRecord], title: &str) -> Outcome {
        records
            .iter()
            .find(|r| r.title == title)
            .unwrap_or_else(|| panic!("no record titled {title}: {records:#?}"))
            .outcome
    }

    #[tokio::test]
    async fn honest_api_passes_all_checks() {
        let api = FakeApi::new();
        api.seed("/channels", channels());
        let records = run(&api, &options()).await;
        let failed: Vec<_> = records.iter().filter(|r| r.failed()).collect();
        assert!(failed.is_empty(), "{failed:#?}");
        assert_eq!(outcome(&records, "limit=1 pages 1 and 2 differ"), Outcome::Passed);
        assert_eq!(outcome(&records, "sort by priority desc is monotonic"), Outcome::Passed);
        assert_eq!(outcome(&records, "page walk sums to total records"), Outcome::Passed);
    }

    #[tokio::test]
    async fn repeated_first_page_is_detected_without_aborting() {
        let api = FakeApi::new().with_faults(Faults {
            repeat_first_page: true,
            ..Faults::default()
        });
        api.seed("/channels", channels());
        let records = run(&api, &options()).await;

        assert_eq!(outcome(&records, "limit=1 pages 1 and 2 differ"), Outcome::Failed);
        assert_eq!(outcome(&records, "page walk sees no record twice"), Outcome::Failed);
        // Independent checks still ran after the failure.
        assert_eq!(outcome(&records, "sort by code asc is monotonic"), Outcome::Passed);
        assert_eq!(
            outcome(&records, "identical query twice yields identical ordering"),
            Outcome::Passed
        );
    }

    #[tokio::test]
    async fn ignored_sort_is_reported() {
        let api = FakeApi::new().with_faults(Faults {
            ignore_sort: true,
            ..Faults::default()
        });
        api.seed("/channels", channels());
        let records = run(&api, &options()).await;
        // Insertion order is ascending by created_at, so only desc fails.
        assert_eq!(outcome(&records, "sort by created_at asc is monotonic"), Outcome::Passed);
        assert_eq!(outcome(&records, "sort by created_at desc is monotonic"), Outcome::Failed);
        assert_eq!(outcome(&records, "sort by priority asc is monotonic"), Outcome::Failed);
    }

    #[tokio::test]
    async fn out_of_range_policy_is_per_endpoint() {
        let erroring = FakeApi::new().with_faults(Faults {
            out_of_range_errors: true,
            ..Faults::default()
        });
        erroring.seed("/channels", channels());
        let title = "out-of-range page 2 follows Empty policy";
        let records = run(&erroring, &PaginationOptions::default()).await;
        assert_eq!(outcome(&records, title), Outcome::Failed);

        let lenient = PaginationOptions {
            out_of_range: OutOfRangePolicy::Either,
            ..PaginationOptions::default()
        };
        let records = run(&erroring, &lenient).await;
        assert_eq!(
            outcome(&records, "out-of-range page 2 follows Either policy"),
            Outcome::Passed
        );

        let honest = FakeApi::new();
        honest.seed("/channels", channels());
        let strict = PaginationOptions {
            out_of_range: OutOfRangePolicy::Error,
            ..PaginationOptions::default()
        };
        let records = run(&honest, &strict).await;
        assert_eq!(
            outcome(&records, "out-of-range page 2 follows Error policy"),
            Outcome::Failed
        );
    }

    #[tokio::test]
    async fn empty_listing_is_probed_past_page_one() {
        let strict = PaginationOptions {
            out_of_range: OutOfRangePolicy::Error,
            ..PaginationOptions::default()
        };

        let erroring = FakeApi::new().with_faults(Faults {
            out_of_range_errors: true,
            ..Faults::default()
        });
        let records = run(&erroring, &strict).await;
        assert_eq!(
            outcome(&records, "out-of-range page 2 follows Error policy"),
            Outcome::Passed
        );

        let honest = FakeApi::new();
        let records = run(&honest, &PaginationOptions::default()).await;
        assert_eq!(
            outcome(&records, "out-of-range page 2 follows Empty policy"),
            Outcome::Passed
        );
        let records = run(&honest, &strict).await;
        assert_eq!(
            outcome(&records, "out-of-range page 2 follows Error policy"),
            Outcome::Failed
        );
    }

    #[tokio::test]
    async fn unstable_default_order_is_reported() {
        let api = FakeApi::new().with_faults(Faults {
            unstable_order: true,
            ..Faults::default()
        });
        api.seed("/channels", channels());
        let records = run(&api, &options()).await;
        assert_eq!(
            outcome(&records, "identical query twice yields identical ordering"),
            Outcome::Failed
        );
        // Explicitly sorted listings are unaffected.
        assert_eq!(outcome(&records, "sort by code asc is monotonic"), Outcome::Passed);
    }

    #[tokio::test]
    async fn single_record_listing_skips_page_two() {
        let api = FakeApi::new();
        api.seed("/channels", channels().into_iter().take(1).collect());
        let records = run(&api, &PaginationOptions::default()).await;
        assert_eq!(outcome(&records, "limit=1 pages 1 and 2 differ"), Outcome::Skipped);
        assert!(records.iter().all(|r| !r.failed()), "{records:#?}");
    }

    #[tokio::test]
    async fn baseline_failure_is_recorded_not_raised() {
        let api = FakeApi::new();
        let collection = Collection::new(&api, "/channels");
        let anon = ActorSession::anonymous();
        let records =
            verify_pagination(&collection, &anon, &ListQuery::new(), &options(), "id").await;
        assert_eq!(outcome(&records, "baseline query succeeds"), Outcome::Failed);
        assert_eq!(outcome(&records, "pagination"), Outcome::Skipped);
    }

    #[tokio::test]
    async fn known_total_above_reported_records_fails() {
        let api = FakeApi::new();
        api.seed("/channels", channels());
        let opts = PaginationOptions {
            total_known: Some(10),
            ..PaginationOptions::default()
        };
        let records = run(&api, &opts).await;
        assert_eq!(
            outcome(&records, "baseline reports at least the known records"),
            Outcome::Failed
        );
    }

    #[test]
    fn inversion_detection_respects_direction() {
        let keys = vec![SortKey::Num(1.0), SortKey::Num(2.0), SortKey::Num(2.0)];
        assert_eq!(first_inversion(&keys, SortDirection::Asc), None);
        assert_eq!(first_inversion(&keys, SortDirection::Desc), Some(0));
    }

    #[test]
    fn sort_keys_follow_comparator() {
        assert_eq!(sort_key(&json!(3), SortOrder::Numeric), Some(SortKey::Num(3.0)));
        assert_eq!(sort_key(&json!("x"), SortOrder::Numeric), None);
        assert!(sort_key(&json!("2026-01-01T00:00:00Z"), SortOrder::Date).is_some());
        assert_eq!(
            sort_key(&json!(12), SortOrder::Text),
            Some(SortKey::Text("12".into()))
        );
    }
}
