//! Runs a [`crate::planner::Plan`]'s stages against an open transaction,
//! in order, translating store errors into [`QueryError`] and enforcing
//! the closure-loop iteration ceiling (§4.4, §4.5).

use sqlx::{Postgres, Transaction};
use tracing::{debug, warn};

use crate::error::{QueryError, Result};
use crate::planner::{Plan, Stage};
use crate::selector::{bind_all, SqlValue};

/// Per-stage timing and row-count record, useful for diagnosing a slow
/// query without enabling full SQL tracing.
#[derive(Debug, Clone)]
pub struct StageProfile {
    /// Stage label, as surfaced by [`Stage::label`].
    pub label: &'static str,
    /// Rows affected, where the underlying statement reports one.
    pub rows_affected: u64,
    /// Wall-clock time spent executing the stage, in milliseconds.
    pub elapsed_ms: u64,
}

/// Executes every stage of `plan` against `tx`, in order. Returns a profile
/// entry per stage for diagnostics; the caller is expected to log or
/// discard it.
pub async fn run(tx: &mut Transaction<'_, Postgres>, plan: &Plan) -> Result<Vec<StageProfile>> {
    let mut profiles = Vec::with_capacity(plan.stages.len());
    for stage in &plan.stages {
        let profile = run_stage(tx, stage).await?;
        profiles.push(profile);
    }
    Ok(profiles)
}

async fn run_stage(tx: &mut Transaction<'_, Postgres>, stage: &Stage) -> Result<StageProfile> {
    let start = std::time::Instant::now();
    debug!(stage = stage.label(), "executor.stage.start");

    let rows_affected = match stage {
        Stage::TuningHints => {
            exec(tx, stage.label(), "SET LOCAL enable_seqscan = off", &[]).await?;
            exec(tx, stage.label(), "SET LOCAL enable_mergejoin = off", &[]).await?;
            exec(tx, stage.label(), "SET LOCAL enable_hashjoin = off", &[]).await?;
            0
        }
        Stage::Exec { label, sql, params } => exec(tx, label, sql, params).await?,
        Stage::FinalizeScratch { label, table } => finalize_scratch(tx, label, table).await?,
        Stage::ClosureLoop {
            label,
            sql,
            params,
            max_iterations,
        } => run_closure_loop(tx, label, sql, params, *max_iterations).await?,
        Stage::CallProcedure { label, sql } => exec(tx, label, sql, &[]).await?,
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    debug!(
        stage = stage.label(),
        rows = rows_affected,
        elapsed_ms,
        "executor.stage.done"
    );
    Ok(StageProfile {
        label: stage.label(),
        rows_affected,
        elapsed_ms,
    })
}

async fn exec(tx: &mut Transaction<'_, Postgres>, label: &str, sql: &str, params: &[SqlValue]) -> Result<u64> {
    let query = bind_all(sqlx::query(sql), params);
    let result = query
        .execute(&mut **tx)
        .await
        .map_err(|e| QueryError::query_failed(label.to_string(), e))?;
    Ok(result.rows_affected())
}

async fn finalize_scratch(tx: &mut Transaction<'_, Postgres>, label: &str, table: &str) -> Result<u64> {
    let add_pk = format!("ALTER TABLE {table} ADD PRIMARY KEY (id)");
    if let Err(e) = sqlx::query(&add_pk).execute(&mut **tx).await {
        // Some scratch tables (the missing-way-nodes diff) have no
        // natural single-column key; a failed ADD PRIMARY KEY there is
        // expected and not fatal, so long as ANALYZE still runs.
        warn!(stage = label, error = %e, "executor.finalize.pk_skip");
    }
    let analyze = format!("ANALYZE {table}");
    sqlx::query(&analyze)
        .execute(&mut **tx)
        .await
        .map_err(|e| QueryError::query_failed(label.to_string(), e))?;
    Ok(0)
}

async fn run_closure_loop(
    tx: &mut Transaction<'_, Postgres>,
    label: &str,
    sql: &str,
    params: &[SqlValue],
    max_iterations: usize,
) -> Result<u64> {
    let mut total_rows = 0u64;
    for iteration in 0..max_iterations {
        let inserted = exec(tx, label, sql, params).await?;
        total_rows += inserted;
        debug!(stage = label, iteration, inserted, "executor.closure.iteration");
        if inserted == 0 {
            return Ok(total_rows);
        }
    }
    warn!(
        stage = label,
        max_iterations, "executor.closure.ceiling_reached"
    );
    Ok(total_rows)
}
