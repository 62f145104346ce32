use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::identity::Plan;
use crate::models::GenerationKind;

/// Negative limits never deny; usage is still recorded.
pub const UNLIMITED: i64 = -1;

/// The two metered resources. Each generation kind draws on its own
/// resource with its own reset cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    PracticeItems,
    ExamItems,
}

impl Resource {
    pub fn for_kind(kind: GenerationKind) -> Self {
        match kind {
            GenerationKind::Practice => Resource::PracticeItems,
            GenerationKind::Exam => Resource::ExamItems,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::PracticeItems => "practice_items",
            Resource::ExamItems => "exam_items",
        }
    }

    pub fn period(&self) -> Period {
        match self {
            Resource::PracticeItems => Period::Daily,
            Resource::ExamItems => Period::Monthly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Monthly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Monthly => "monthly",
        }
    }
}

/// Key of the usage window containing `now`. Counters are keyed by this
/// string, so a new period starts at zero without any reset job.
pub fn period_start(period: Period, now: DateTime<Utc>) -> String {
    match period {
        Period::Daily => now.format("%Y-%m-%d").to_string(),
        Period::Monthly => now.format("%Y-%m-01").to_string(),
    }
}

/// Per-plan limits are product configuration, not user data.
pub fn limit_for(plan: Plan, resource: Resource) -> i64 {
    match (plan, resource) {
        (Plan::Free, Resource::PracticeItems) => 10,
        (Plan::Free, Resource::ExamItems) => 1,
        (Plan::Plus, Resource::PracticeItems) => 100,
        (Plan::Plus, Resource::ExamItems) => 10,
        (Plan::Pro, _) => UNLIMITED,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaDecision {
    pub permitted: bool,
    pub used: i64,
    pub limit: i64,
}

/// Consume `amount` units of the resource for the current period, or deny
/// without consuming anything. `used` reports the counter after the call.
pub async fn consume(
    pool: &SqlitePool,
    owner_id: Uuid,
    plan: Plan,
    resource: Resource,
    amount: i64,
) -> Result<QuotaDecision, sqlx::Error> {
    let limit = limit_for(plan, resource);
    let period = period_start(resource.period(), Utc::now());

    match db::usage::try_consume(pool, owner_id, resource.as_str(), &period, amount, limit).await? {
        Some(used) => Ok(QuotaDecision {
            permitted: true,
            used,
            limit,
        }),
        None => {
            let used = db::usage::peek(pool, owner_id, resource.as_str(), &period).await?;
            Ok(QuotaDecision {
                permitted: false,
                used,
                limit,
            })
        }
    }
}

/// Read the current window without consuming. `permitted` reports whether
/// one more unit would be allowed.
pub async fn peek(
    pool: &SqlitePool,
    owner_id: Uuid,
    plan: Plan,
    resource: Resource,
) -> Result<QuotaDecision, sqlx::Error> {
    let limit = limit_for(plan, resource);
    let period = period_start(resource.period(), Utc::now());
    let used = db::usage::peek(pool, owner_id, resource.as_str(), &period).await?;

    Ok(QuotaDecision {
        permitted: limit < 0 || used < limit,
        used,
        limit,
    })
}
