//! Run Repository
//!
//! Handles all database operations for pipeline runs. The pipeline
//! driver is the single writer for a given run; readers may poll from
//! any connection at any time and always observe a consistent,
//! monotonically advancing record.

use ferry_core::domain::config::PipelineConfig;
use ferry_core::domain::run::{
    ErrorDetail, PipelineResult, PipelineRun, PipelineStats, RunStatus, StepRecord,
};
use sqlx::PgPool;
use uuid::Uuid;

/// Persist a freshly created run (status in_progress, all steps idle)
pub async fn create(pool: &PgPool, run: &PipelineRun) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO pipeline_runs (id, owner_id, status, start_time, configuration, steps)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(run.id)
    .bind(&run.owner_id)
    .bind(run.status.as_str())
    .bind(run.start_time)
    .bind(encode(&run.configuration)?)
    .bind(encode(&run.steps)?)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a run by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<PipelineRun>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, owner_id, status, start_time, end_time, duration_ms,
               configuration, steps, result, error_step, error_message
        FROM pipeline_runs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(PipelineRun::try_from).transpose()
}

/// Overwrite the ordered step array for a run.
///
/// The driver mutates its in-memory copy through the domain transition
/// rules and persists the whole array, so a concurrent reader never sees
/// a partially applied transition.
pub async fn update_steps(
    pool: &PgPool,
    id: Uuid,
    steps: &[StepRecord],
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE pipeline_runs SET steps = $1 WHERE id = $2")
        .bind(encode(&steps)?)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Move the run to a new overall status. Terminal statuses stamp
/// end_time and derive duration_ms from the recorded start_time.
pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    status: RunStatus,
    error_detail: Option<&ErrorDetail>,
) -> Result<(), sqlx::Error> {
    if status.is_terminal() {
        sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET status = $1,
                end_time = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - start_time)) * 1000)::BIGINT,
                error_step = $2,
                error_message = $3
            WHERE id = $4
            "#,
        )
        .bind(status.as_str())
        .bind(error_detail.map(|e| e.step.as_str()))
        .bind(error_detail.map(|e| e.message.as_str()))
        .bind(id)
        .execute(pool)
        .await?;
    } else {
        sqlx::query("UPDATE pipeline_runs SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Record the success payload
pub async fn update_result(
    pool: &PgPool,
    id: Uuid,
    result: &PipelineResult,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE pipeline_runs SET result = $1 WHERE id = $2")
        .bind(encode(result)?)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// List an owner's runs, newest first, with the total for pagination
pub async fn list_by_owner(
    pool: &PgPool,
    owner_id: &str,
    page: i64,
    page_size: i64,
) -> Result<(Vec<PipelineRun>, i64), sqlx::Error> {
    let offset = (page - 1).max(0) * page_size;

    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, owner_id, status, start_time, end_time, duration_ms,
               configuration, steps, result, error_step, error_message
        FROM pipeline_runs
        WHERE owner_id = $1
        ORDER BY start_time DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(owner_id)
    .bind(page_size)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pipeline_runs WHERE owner_id = $1")
        .bind(owner_id)
        .fetch_one(pool)
        .await?;

    let runs = rows
        .into_iter()
        .map(PipelineRun::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((runs, total.0))
}

/// Aggregate counters, optionally scoped to one owner
pub async fn aggregate_stats(
    pool: &PgPool,
    owner_id: Option<&str>,
) -> Result<PipelineStats, sqlx::Error> {
    let row: StatsRow = sqlx::query_as(
        r#"
        SELECT COUNT(*) FILTER (WHERE status = 'success') AS success_count,
               COUNT(*) FILTER (WHERE status = 'failed') AS failed_count,
               COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress_count,
               (AVG(duration_ms) FILTER (WHERE duration_ms IS NOT NULL))::FLOAT8 AS average_duration_ms
        FROM pipeline_runs
        WHERE ($1::VARCHAR IS NULL OR owner_id = $1)
        "#,
    )
    .bind(owner_id)
    .fetch_one(pool)
    .await?;

    Ok(PipelineStats {
        success_count: row.success_count,
        failed_count: row.failed_count,
        in_progress_count: row.in_progress_count,
        average_duration_ms: row.average_duration_ms,
    })
}

/// Retention sweep: deletes terminal runs older than the cutoff.
/// In-progress runs are never deleted regardless of age.
pub async fn delete_older_than(pool: &PgPool, days: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM pipeline_runs
        WHERE status <> 'in_progress'
          AND start_time < NOW() - ($1::INT * INTERVAL '1 day')
        "#,
    )
    .bind(days)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, sqlx::Error> {
    serde_json::from_value(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    owner_id: String,
    status: String,
    start_time: chrono::DateTime<chrono::Utc>,
    end_time: Option<chrono::DateTime<chrono::Utc>>,
    duration_ms: Option<i64>,
    configuration: serde_json::Value,
    steps: serde_json::Value,
    result: Option<serde_json::Value>,
    error_step: Option<String>,
    error_message: Option<String>,
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    success_count: i64,
    failed_count: i64,
    in_progress_count: i64,
    average_duration_ms: Option<f64>,
}

impl TryFrom<RunRow> for PipelineRun {
    type Error = sqlx::Error;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status: RunStatus = row
            .status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        let configuration: PipelineConfig = decode(row.configuration)?;
        let steps: Vec<StepRecord> = decode(row.steps)?;
        let result: Option<PipelineResult> = row.result.map(decode).transpose()?;

        let error_detail = match (row.error_step, row.error_message) {
            (Some(step), Some(message)) => Some(ErrorDetail {
                step: step
                    .parse()
                    .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
                message,
            }),
            _ => None,
        };

        Ok(PipelineRun {
            id: row.id,
            owner_id: row.owner_id,
            status,
            start_time: row.start_time,
            end_time: row.end_time,
            duration_ms: row.duration_ms,
            configuration,
            steps,
            result,
            error_detail,
        })
    }
}
