//! One-shot capability probing (§4.2).
//!
//! The planner's choice of physical strategy for selecting polylines
//! depends on which optional schema features the store exposes. Probing
//! never fails the query: a missing feature simply downgrades the plan.

use sqlx::{Postgres, Transaction};

/// Optional schema features that change the physical plan for polyline
/// selection and complete-ways expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// A cached `linestring` geometry column exists on the polyline table.
    pub has_linestring: bool,
    /// A cached bounding-rectangle column exists on the polyline table.
    pub has_bbox: bool,
    /// A stored procedure that expands a scratch polyline set into its
    /// referenced node ids is available.
    pub has_complete_ways_proc: bool,
}

/// Probes the store's optional features by inspecting schema metadata.
/// Each probe query failing (rather than returning "not found") is treated
/// as "capability absent" — the contract is that probing never aborts a
/// query, only plans more conservatively.
pub async fn probe(tx: &mut Transaction<'_, Postgres>) -> Capabilities {
    Capabilities {
        has_linestring: column_exists(tx, "ways", "linestring").await,
        has_bbox: column_exists(tx, "ways", "bbox").await,
        has_complete_ways_proc: procedure_exists(tx, "complete_ways").await,
    }
}

async fn column_exists(tx: &mut Transaction<'_, Postgres>, table: &str, column: &str) -> bool {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM information_schema.columns
            WHERE table_name = $1 AND column_name = $2
        )",
    )
    .bind(table)
    .bind(column)
    .fetch_one(&mut **tx)
    .await
    .unwrap_or(false)
}

async fn procedure_exists(tx: &mut Transaction<'_, Postgres>, name: &str) -> bool {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM pg_proc WHERE proname = $1)",
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await
    .unwrap_or(false)
}
