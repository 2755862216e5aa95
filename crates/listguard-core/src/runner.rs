//! Run driver: fixtures first, then every target in declared order.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::Instrument;

use crate::access::{probe_access_control, ForbiddenIdentity};
use crate::api::{ApiUnderTest, Collection, QuerySource};
use crate::error::{FixtureError, PlanError, VerifyError};
use crate::fixture::{build_fixtures, render_error, Fixtures};
use crate::oracle::{derive_filters, verify_expected_counts, verify_filters, FilterOptions};
use crate::pagination::verify_pagination;
use crate::plan::{to_value, TargetSpec, VerificationPlan};
use crate::query::ListQuery;
use crate::report::{Aggregator, Report};
use crate::session::{ActorSession, SessionContext};
use crate::template;

/// Execute `plan` against `api`.
///
/// Only plan and fixture errors are returned as `Err`. Every check that runs
/// ends up as a record in the report, failed or not.
pub async fn run_verification<A: ApiUnderTest>(
    api: &A,
    plan: &VerificationPlan,
) -> Result<Report, VerifyError> {
    plan.validate()?;
    let span = tracing::info_span!("verification", plan = %plan.display_name());
    async {
        let fixtures = build_fixtures(api, &plan.fixtures).await?;
        let mut report = Report::default();
        for target in &plan.targets {
            report.merge(verify_target(api, &fixtures, target).await?);
        }
        tracing::info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "verification finished"
        );
        Ok::<_, VerifyError>(report)
    }
    .instrument(span)
    .await
}

fn render_filters(
    owner: &str,
    filters: &BTreeMap<String, Value>,
    fixtures: &Fixtures,
) -> Result<BTreeMap<String, Value>, FixtureError> {
    match template::render(&to_value(filters), fixtures.bindings()) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(other) => Err(FixtureError::Malformed {
            step: owner.to_string(),
            reason: format!("filters rendered to {other}"),
        }),
        Err(e) => Err(render_error(owner, e)),
    }
}

fn resolve_forbidden(
    target: &TargetSpec,
    fixtures: &Fixtures,
) -> Result<Vec<ActorSession>, PlanError> {
    target
        .forbidden
        .iter()
        .map(|identity| match identity {
            ForbiddenIdentity::Unauthenticated => Ok(ActorSession::anonymous()),
            ForbiddenIdentity::Actor(name) => {
                fixtures.actor(name).cloned().ok_or_else(|| PlanError::UnknownActor {
                    owner: format!("target \"{}\"", target.name),
                    actor: name.clone(),
                })
            }
        })
        .collect()
}

async fn verify_target<A: ApiUnderTest>(
    api: &A,
    fixtures: &Fixtures,
    target: &TargetSpec,
) -> Result<Report, VerifyError> {
    let path = match template::render(&Value::from(target.path.clone()), fixtures.bindings())
        .map_err(|e| render_error(&target.name, e))?
    {
        Value::String(path) => path,
        other => other.to_string(),
    };
    let base = ListQuery::with_filters(render_filters(&target.name, &target.base_filters, fixtures)?);
    let mut expectations = Vec::with_capacity(target.expect.len());
    for expectation in &target.expect {
        let filters = render_filters(&target.name, &expectation.filters, fixtures)?;
        expectations.push((filters, expectation.records));
    }
    let authorized = fixtures
        .actor(&target.as_actor)
        .cloned()
        .ok_or_else(|| PlanError::UnknownActor {
            owner: format!("target \"{}\"", target.name),
            actor: target.as_actor.clone(),
        })?;
    let forbidden = resolve_forbidden(target, fixtures)?;

    let span = tracing::info_span!("target", target = %target.name, path = %path);
    let report = async {
        let mut ctx = SessionContext::new(authorized);
        let collection = Collection::new(api, &path);
        let mut agg = Aggregator::scoped(&target.name);

        let reference = collection
            .query(&base.clone().limit(target.reference_limit), ctx.active())
            .await;
        let samples = match reference {
            Ok(page) => {
                agg.predicate("reference query succeeds", true);
                page.data
            }
            Err(e) => {
                agg.fail("reference query succeeds", e.to_string());
                Vec::new()
            }
        };

        if !target.filters.is_empty() {
            let derivation = derive_filters(&samples, &target.filters);
            let options = FilterOptions {
                id_field: target.id_field.clone(),
                ..FilterOptions::default()
            };
            agg.absorb(
                verify_filters(&collection, ctx.active(), &base, &target.filters, &derivation, &options)
                    .await,
            );
        }
        if !expectations.is_empty() {
            agg.absorb(verify_expected_counts(&collection, ctx.active(), &base, &expectations).await);
        }

        let mut pagination = target.pagination.clone();
        if pagination.total_known.is_none() && target.base_filters.is_empty() {
            let seeded = fixtures.seeded_count_by(&path, &target.as_actor);
            if seeded > 0 {
                pagination.total_known = Some(seeded);
            }
        }
        agg.absorb(
            verify_pagination(&collection, ctx.active(), &base, &pagination, &target.id_field).await,
        );

        agg.absorb(probe_access_control(&collection, &mut ctx, &base, &forbidden).await);
        agg.finish()
    }
    .instrument(span)
    .await;

    Ok(report)
}
