// SPDX-License-Identifier: BUSL-1.1
//! Listing semantics shared by every collection.
//!
//! A listing body is a flat JSON object: filter parameters next to `page`,
//! `limit`, `sortBy` and `sortDirection`. Each collection declares which
//! parameters it accepts and how each one matches.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use serde_json::{json, Map, Value};

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 1000;

/// How a filter parameter matches a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    Exact,
    Substring,
    /// `{"min": .., "max": ..}`, either bound optional, inclusive.
    Range,
}

/// One accepted filter parameter.
#[derive(Debug, Clone, Copy)]
pub struct Filter {
    pub param: &'static str,
    /// Dotted record path.
    pub field: &'static str,
    pub matching: Match,
}

/// What a collection's listing endpoint accepts.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub filters: &'static [Filter],
    pub sortable: &'static [&'static str],
}

impl Schema {
    fn filter(&self, param: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.param == param)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Asc,
    Desc,
}

/// A validated listing request.
#[derive(Debug)]
pub struct ListRequest {
    page: u64,
    limit: u64,
    sort: Option<(&'static str, Direction)>,
    filters: Vec<(Filter, Value)>,
}

impl ListRequest {
    /// Validate a listing body against `schema`. The error is a message for
    /// a 400 response.
    pub fn parse(body: &Value, schema: &Schema) -> Result<Self, String> {
        let empty = Map::new();
        let body = match body {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err("listing body must be a JSON object".into()),
        };

        let page = positive(body, "page")?.unwrap_or(1);
        let limit = positive(body, "limit")?.unwrap_or(DEFAULT_LIMIT);
        if limit > MAX_LIMIT {
            return Err(format!("limit must not exceed {MAX_LIMIT}"));
        }

        let direction = match body.get("sortDirection").and_then(Value::as_str) {
            None | Some("asc") => Direction::Asc,
            Some("desc") => Direction::Desc,
            Some(other) => return Err(format!("unknown sortDirection \"{other}\"")),
        };
        let sort = match body.get("sortBy") {
            None | Some(Value::Null) => None,
            Some(Value::String(field)) => {
                let field = schema
                    .sortable
                    .iter()
                    .find(|s| **s == field.as_str())
                    .ok_or_else(|| format!("cannot sort by \"{field}\""))?;
                Some((*field, direction))
            }
            Some(_) => return Err("sortBy must be a string".into()),
        };

        let mut filters = Vec::new();
        for (param, value) in body {
            if matches!(param.as_str(), "page" | "limit" | "sortBy" | "sortDirection") {
                continue;
            }
            let filter = schema
                .filter(param)
                .ok_or_else(|| format!("unsupported filter \"{param}\""))?;
            match (filter.matching, value) {
                (Match::Substring, Value::String(_)) | (Match::Exact, _) => {}
                (Match::Range, Value::Object(bounds))
                    if bounds.keys().all(|k| k == "min" || k == "max") => {}
                (Match::Substring, _) => return Err(format!("{param} expects a string")),
                (Match::Range, _) => return Err(format!("{param} expects {{\"min\", \"max\"}}")),
            }
            filters.push((*filter, value.clone()));
        }

        Ok(Self {
            page,
            limit,
            sort,
            filters,
        })
    }

    /// Filter, sort and paginate `records`, which arrive in insertion order.
    pub fn apply(&self, mut records: Vec<Value>) -> Value {
        records.retain(|r| {
            self.filters
                .iter()
                .all(|(filter, wanted)| matches(filter, lookup(r, filter.field), wanted))
        });
        if let Some((field, direction)) = self.sort {
            // Stable: ties keep insertion order.
            records.sort_by(|a, b| {
                let ord = compare(lookup(a, field), lookup(b, field));
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        let total = records.len() as u64;
        let pages = total.div_ceil(self.limit);
        let skip = (self.page - 1).saturating_mul(self.limit);
        let data: Vec<Value> = records
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(self.limit as usize)
            .collect();

        json!({
            "pagination": {
                "current": self.page,
                "limit": self.limit,
                "records": total,
                "pages": pages,
            },
            "data": data,
        })
    }
}

fn positive(body: &Map<String, Value>, key: &str) -> Result<Option<u64>, String> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if n >= 1 => Ok(Some(n)),
            _ => Err(format!("{key} must be a positive integer")),
        },
    }
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |v, segment| v.get(segment))
        .filter(|v| !v.is_null())
}

fn matches(filter: &Filter, actual: Option<&Value>, wanted: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match filter.matching {
        Match::Exact => actual == wanted,
        Match::Substring => match (actual.as_str(), wanted.as_str()) {
            (Some(a), Some(w)) => a.contains(w),
            _ => false,
        },
        Match::Range => {
            let lo = wanted.get("min").filter(|v| !v.is_null());
            let hi = wanted.get("max").filter(|v| !v.is_null());
            lo.map_or(true, |lo| compare(Some(actual), Some(lo)) != Ordering::Less)
                && hi.map_or(true, |hi| compare(Some(actual), Some(hi)) != Ordering::Greater)
        }
    }
}

fn as_date(v: &Value) -> Option<DateTime<FixedOffset>> {
    v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Numbers numerically, RFC 3339 strings chronologically, other strings
/// lexically. Absent values sort first.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }
            if let (Some(x), Some(y)) = (as_date(a), as_date(b)) {
                return x.cmp(&y);
            }
            match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => a.to_string().cmp(&b.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SCHEMA: Schema = Schema {
        filters: &[
            Filter { param: "status", field: "status", matching: Match::Exact },
            Filter { param: "name", field: "name", matching: Match::Substring },
            Filter { param: "price", field: "price", matching: Match::Range },
            Filter { param: "seller_id", field: "seller.id", matching: Match::Exact },
        ],
        sortable: &["price", "name"],
    };

    fn records() -> Vec<Value> {
        vec![
            json!({"id": 1, "status": "active", "name": "Red Kettle", "price": 30.0, "seller": {"id": "s1"}}),
            json!({"id": 2, "status": "paused", "name": "Blue Kettle", "price": 10.0, "seller": {"id": "s2"}}),
            json!({"id": 3, "status": "active", "name": "Red Mug", "price": 20.0, "seller": {"id": "s1"}}),
        ]
    }

    fn ids(page: &Value) -> Vec<i64> {
        page["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect()
    }

    fn run(body: Value) -> Value {
        ListRequest::parse(&body, &SCHEMA).unwrap().apply(records())
    }

    #[test]
    fn defaults_list_everything_in_insertion_order() {
        let page = run(Value::Null);
        assert_eq!(ids(&page), vec![1, 2, 3]);
        assert_eq!(
            page["pagination"],
            json!({"current": 1, "limit": 100, "records": 3, "pages": 1})
        );
    }

    #[test]
    fn filters_combine() {
        assert_eq!(ids(&run(json!({"status": "active", "name": "Kettle"}))), vec![1]);
        assert_eq!(ids(&run(json!({"price": {"min": 15, "max": 30}}))), vec![1, 3]);
        assert_eq!(ids(&run(json!({"seller_id": "s2"}))), vec![2]);
    }

    #[test]
    fn sorting_and_paging() {
        let page = run(json!({"sortBy": "price", "sortDirection": "desc", "limit": 2, "page": 2}));
        assert_eq!(ids(&page), vec![2]);
        assert_eq!(page["pagination"]["pages"], 2);
        assert_eq!(ids(&run(json!({"page": 9}))), Vec::<i64>::new());
    }

    #[test]
    fn invalid_requests_are_rejected() {
        for body in [
            json!({"page": 0}),
            json!({"limit": 5000}),
            json!({"sortBy": "status"}),
            json!({"sortDirection": "up"}),
            json!({"colour": "red"}),
            json!({"name": 3}),
            json!({"price": 3}),
            json!([1, 2]),
        ] {
            assert!(ListRequest::parse(&body, &SCHEMA).is_err(), "{body}");
        }
    }

    #[test]
    fn dates_compare_chronologically() {
        let a = json!("2026-01-01T10:00:00+02:00");
        let b = json!("2026-01-01T09:00:00Z");
        assert_eq!(compare(Some(&a), Some(&b)), Ordering::Less);
    }

    proptest! {
        #[test]
        fn pages_partition_the_listing(n in 0usize..40, limit in 1u64..10) {
            let all: Vec<Value> = (0..n).map(|i| json!({"id": i})).collect();
            let pages = (n as u64).div_ceil(limit);
            let mut seen = Vec::new();
            for page in 1..=pages.max(1) {
                let req = ListRequest::parse(&json!({"page": page, "limit": limit}), &SCHEMA).unwrap();
                let result = req.apply(all.clone());
                let data = result["data"].as_array().unwrap();
                prop_assert!(data.len() as u64 <= limit);
                prop_assert_eq!(result["pagination"]["pages"].as_u64(), Some(pages));
                seen.extend(data.iter().map(|r| r["id"].as_u64().unwrap()));
            }
            prop_assert_eq!(seen, (0..n as u64).collect::<Vec<_>>());
        }
    }
}
