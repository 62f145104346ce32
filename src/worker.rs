use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::generation::{parse, prompt, GenerationError};
use crate::identity::Identity;
use crate::models::{BatchStatus, QueueRecord};
use crate::quota::{self, Resource};
use crate::state::SharedState;

/// The record as stored after one unit call, plus whether this call burned
/// an attempt on a failed unit.
#[derive(Debug)]
pub struct AdvanceOutcome {
    pub record: QueueRecord,
    pub item_failed: bool,
}

/// Perform exactly one unit of work for a queue record: spend quota, run
/// the generator once, persist the result, and move the stored counters.
/// Terminal records absorb the call without side effects, so clients can
/// retry freely.
pub async fn advance_unit(
    state: &SharedState,
    identity: Identity,
    record_id: Uuid,
) -> Result<AdvanceOutcome, AppError> {
    let record = load_record(state, identity, record_id).await?;

    if record.status.is_terminal() {
        return Ok(AdvanceOutcome {
            record,
            item_failed: false,
        });
    }

    // Every attempt already accounted for but the status never flipped
    // (e.g. a crash between updates): repair and return.
    if record.produced_count + record.error_count >= record.target_count {
        let record = match db::queue_records::complete_exhausted(
            &state.pool,
            record_id,
            identity.user_id,
            Utc::now(),
        )
        .await?
        {
            Some(updated) => updated,
            None => load_record(state, identity, record_id).await?,
        };
        return Ok(AdvanceOutcome {
            record,
            item_failed: false,
        });
    }

    if record.status == BatchStatus::Pending {
        db::queue_records::mark_processing(&state.pool, record_id, identity.user_id, Utc::now())
            .await?;
    }

    let resource = Resource::for_kind(record.kind);
    let decision =
        quota::consume(&state.pool, identity.user_id, identity.plan, resource, 1).await?;
    if !decision.permitted {
        return Err(AppError::QuotaExceeded {
            used: decision.used,
            limit: decision.limit,
        });
    }

    let attempt_index = record.produced_count + record.error_count;
    let unit_prompt = prompt::build_unit_prompt(record.kind, &record.parameters, attempt_index);

    let generated = match tokio::time::timeout(
        Duration::from_secs(state.config.unit_timeout_secs),
        state.generator.generate(&unit_prompt),
    )
    .await
    {
        Ok(Ok(raw)) => parse::decode_item(record.kind, record.parameters.style, &raw),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(GenerationError::Service(format!(
            "unit timed out after {}s",
            state.config.unit_timeout_secs
        ))),
    };

    let payload = match generated {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(
                queue_record_id = %record_id,
                attempt = attempt_index,
                error = %e,
                "Unit failed, skipping"
            );
            return match db::queue_records::record_failure(
                &state.pool,
                record_id,
                identity.user_id,
                Utc::now(),
            )
            .await?
            {
                Some(record) => Ok(AdvanceOutcome {
                    record,
                    item_failed: true,
                }),
                // The record went terminal while the unit was in flight; the
                // failure is dropped, not counted.
                None => Ok(AdvanceOutcome {
                    record: load_record(state, identity, record_id).await?,
                    item_failed: false,
                }),
            };
        }
    };

    let topic = prompt::rotated_topic(&record.parameters, attempt_index).to_string();
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;

    db::items::insert(
        &mut tx,
        Uuid::now_v7(),
        identity.user_id,
        record.kind,
        &record.parameters.subject,
        &topic,
        record.parameters.difficulty,
        record.parameters.style,
        &payload,
        now,
    )
    .await?;

    db::items::bump_topic_stat(
        &mut tx,
        identity.user_id,
        record.kind,
        &record.parameters.subject,
        &topic,
        now,
    )
    .await?;

    match db::queue_records::record_success(&mut tx, record_id, identity.user_id, now).await? {
        Some(record) => {
            tx.commit().await?;
            tracing::info!(
                queue_record_id = %record_id,
                produced = record.produced_count,
                target = record.target_count,
                "Unit persisted"
            );
            Ok(AdvanceOutcome {
                record,
                item_failed: false,
            })
        }
        None => {
            // A concurrent call attributed the final unit first; drop ours
            // so the item count never exceeds the record's counters.
            tx.rollback().await?;
            Ok(AdvanceOutcome {
                record: load_record(state, identity, record_id).await?,
                item_failed: false,
            })
        }
    }
}

async fn load_record(
    state: &SharedState,
    identity: Identity,
    record_id: Uuid,
) -> Result<QueueRecord, AppError> {
    db::queue_records::find_by_id_scoped(&state.pool, record_id, identity.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch not found".to_string()))
}
