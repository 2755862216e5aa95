//! # Assertion Aggregator
//!
//! Collects titled checks into an ordered [`Report`]. Recording a failure
//! never halts execution; the caller decides what a failed report means
//! (the CLI exits non-zero).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    /// Not enough data to evaluate. Neither a pass nor a failure.
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("PASS"),
            Self::Failed => f.write_str("FAIL"),
            Self::Skipped => f.write_str("SKIP"),
        }
    }
}

/// One titled check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub title: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AssertionRecord {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    pub fn failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

/// Accumulates assertion records in the order they are made.
#[derive(Debug, Default)]
pub struct Aggregator {
    scope: Option<String>,
    records: Vec<AssertionRecord>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator whose titles are prefixed with `scope: `.
    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            records: Vec::new(),
        }
    }

    fn title(&self, title: &str) -> String {
        match &self.scope {
            Some(scope) => format!("{scope}: {title}"),
            None => title.to_string(),
        }
    }

    fn push(&mut self, record: AssertionRecord) {
        if record.failed() {
            tracing::warn!(title = %record.title, note = ?record.note, "check failed");
        } else {
            tracing::debug!(title = %record.title, outcome = %record.outcome, "check recorded");
        }
        self.records.push(record);
    }

    /// Equality check between two serialisable values.
    pub fn record<T: Serialize>(&mut self, title: &str, actual: T, expected: T) {
        let actual = serde_json::to_value(actual).unwrap_or(Value::Null);
        let expected = serde_json::to_value(expected).unwrap_or(Value::Null);
        let outcome = if actual == expected {
            Outcome::Passed
        } else {
            Outcome::Failed
        };
        let record = AssertionRecord {
            title: self.title(title),
            outcome,
            actual: Some(actual),
            expected: Some(expected),
            note: None,
        };
        self.push(record);
    }

    /// Boolean check.
    pub fn predicate(&mut self, title: &str, cond: bool) {
        let record = AssertionRecord {
            title: self.title(title),
            outcome: if cond { Outcome::Passed } else { Outcome::Failed },
            actual: None,
            expected: None,
            note: None,
        };
        self.push(record);
    }

    /// Boolean check with an explanation kept on failure.
    pub fn predicate_with(&mut self, title: &str, cond: bool, detail: impl FnOnce() -> String) {
        let record = AssertionRecord {
            title: self.title(title),
            outcome: if cond { Outcome::Passed } else { Outcome::Failed },
            actual: None,
            expected: None,
            note: (!cond).then(detail),
        };
        self.push(record);
    }

    /// A check that could not be evaluated.
    pub fn skip(&mut self, title: &str, reason: impl Into<String>) {
        let record = AssertionRecord {
            title: self.title(title),
            outcome: Outcome::Skipped,
            actual: None,
            expected: None,
            note: Some(reason.into()),
        };
        self.push(record);
    }

    /// An unconditional failure, e.g. the call under check errored.
    pub fn fail(&mut self, title: &str, detail: impl Into<String>) {
        let record = AssertionRecord {
            title: self.title(title),
            outcome: Outcome::Failed,
            actual: None,
            expected: None,
            note: Some(detail.into()),
        };
        self.push(record);
    }

    /// Append records produced elsewhere, applying this aggregator's scope.
    pub fn absorb(&mut self, records: Vec<AssertionRecord>) {
        for mut record in records {
            record.title = self.title(&record.title);
            self.records.push(record);
        }
    }

    /// The records collected so far, consuming the aggregator.
    pub fn into_records(self) -> Vec<AssertionRecord> {
        self.records
    }

    pub fn finish(self) -> Report {
        Report {
            records: self.records,
        }
    }
}

/// Every check made during a run, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub records: Vec<AssertionRecord>,
}

impl Report {
    fn count(&self, outcome: Outcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn passed(&self) -> usize {
        self.count(Outcome::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(Outcome::Skipped)
    }

    /// Any failed record means the run failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssertionRecord> {
        self.records.iter().filter(|r| r.failed())
    }

    /// Look up a record by exact title.
    pub fn get(&self, title: &str) -> Option<&AssertionRecord> {
        self.records.iter().find(|r| r.title == title)
    }

    /// Merge another report's records after this one's.
    pub fn merge(&mut self, other: Report) {
        self.records.extend(other.records);
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            write!(f, "[{}] {}", record.outcome, record.title)?;
            if let Some(note) = &record.note {
                write!(f, " ({note})")?;
            }
            writeln!(f)?;
            if record.failed() {
                if let (Some(actual), Some(expected)) = (&record.actual, &record.expected) {
                    writeln!(f, "       expected: {expected}")?;
                    writeln!(f, "       actual:   {actual}")?;
                }
            }
        }
        write!(
            f,
            "{} passed, {} failed, {} skipped",
            self.passed(),
            self.failed(),
            self.skipped()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_compares_actual_and_expected() {
        let mut agg = Aggregator::new();
        agg.record("page echoes", 2u32, 2u32);
        agg.record("limit echoes", 5u32, 1u32);
        let report = agg.finish();
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        let failed = report.failures().next().unwrap();
        assert_eq!(failed.title, "limit echoes");
        assert_eq!(failed.actual, Some(serde_json::json!(5)));
        assert_eq!(failed.expected, Some(serde_json::json!(1)));
    }

    #[test]
    fn failures_do_not_stop_collection() {
        let mut agg = Aggregator::new();
        agg.fail("first", "boom");
        agg.predicate("second", true);
        agg.skip("third", "no data");
        let report = agg.finish();
        assert_eq!(report.records.len(), 3);
        assert!(!report.is_success());
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn skipped_checks_do_not_fail_the_report() {
        let mut agg = Aggregator::new();
        agg.skip("filters", "no data available for filter validation");
        assert!(agg.finish().is_success());
    }

    #[test]
    fn scope_prefixes_titles_including_absorbed_records() {
        let mut inner = Aggregator::new();
        inner.predicate("limit=1 yields at most one record", true);

        let mut outer = Aggregator::scoped("channels");
        outer.predicate("reference query succeeds", true);
        outer.absorb(inner.into_records());

        let report = outer.finish();
        assert!(report.get("channels: reference query succeeds").is_some());
        assert!(report
            .get("channels: limit=1 yields at most one record")
            .is_some());
    }

    #[test]
    fn predicate_with_keeps_detail_only_on_failure() {
        let mut agg = Aggregator::new();
        agg.predicate_with("ok", true, || "unused".into());
        agg.predicate_with("bad", false, || "record r3 violates".into());
        let report = agg.finish();
        assert_eq!(report.get("ok").unwrap().note, None);
        assert_eq!(
            report.get("bad").unwrap().note.as_deref(),
            Some("record r3 violates")
        );
    }

    #[test]
    fn display_summarises_counts() {
        let mut agg = Aggregator::new();
        agg.record("x", 1, 2);
        let text = agg.finish().to_string();
        assert!(text.contains("[FAIL] x"));
        assert!(text.contains("expected: 2"));
        assert!(text.ends_with("0 passed, 1 failed, 0 skipped"));
    }
}
