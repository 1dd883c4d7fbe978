//! Stage descriptors produced by the [`super::Planner`] and run in order by
//! [`crate::executor`].

use crate::selector::SqlValue;

/// One step of a physical plan. Stages run strictly in the order the
/// planner emitted them (§4.4's ordering rule).
#[derive(Debug, Clone)]
pub enum Stage {
    /// Issues the three `SET LOCAL` planner-tuning hints (§4.3, §6). A
    /// no-op when [`crate::config::SessionConfig::planner_tuning_hints`]
    /// is `false`.
    TuningHints,

    /// Runs a single parameterized statement (a `CREATE TEMP TABLE ... AS
    /// SELECT`, an `INSERT INTO ... SELECT`, or similar) and records its
    /// affected-row count.
    Exec {
        /// Stage name, surfaced in `QueryFailed` and in per-stage
        /// diagnostics.
        label: &'static str,
        /// The statement text, with positional `$N` placeholders.
        sql: String,
        /// Bound parameters, in placeholder order.
        params: Vec<SqlValue>,
    },

    /// Adds a primary key on `id` and runs `ANALYZE` against a
    /// just-materialized scratch table, so subsequent joins have accurate
    /// row-count estimates (§4.4 step 6).
    FinalizeScratch {
        /// Stage name.
        label: &'static str,
        /// The scratch table to finalize.
        table: String,
    },

    /// Repeatedly runs the same statement until it inserts zero rows
    /// (the group-over-group closure loop, §4.4 step 4). Enforces
    /// `max_iterations` as a hard ceiling so a misbehaving store that never
    /// reports zero can't spin forever (§4.5).
    ClosureLoop {
        /// Stage name.
        label: &'static str,
        /// The statement text, re-run verbatim each iteration; its
        /// `WHERE NOT EXISTS` shape means each run only inserts rows not
        /// already present.
        sql: String,
        /// Bound parameters, constant across iterations.
        params: Vec<SqlValue>,
        /// Hard iteration ceiling.
        max_iterations: usize,
    },

    /// Invokes the complete-ways stored procedure (§4.4 step 5, §6).
    CallProcedure {
        /// Stage name.
        label: &'static str,
        /// The `SELECT proc_name(...)` / `CALL proc_name(...)` statement.
        sql: String,
    },
}

impl Stage {
    /// Human-readable name used in error messages and tracing events.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::TuningHints => "tuning_hints",
            Stage::Exec { label, .. } => label,
            Stage::FinalizeScratch { label, .. } => label,
            Stage::ClosureLoop { label, .. } => label,
            Stage::CallProcedure { label, .. } => label,
        }
    }
}
