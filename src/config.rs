//! Session-level tuning knobs.
//!
//! Mirrors the named-preset convention used elsewhere in this lineage
//! (`Config::production()`, `Config::balanced()`, ...): a sensible
//! `Default` plus a couple of presets for callers who want to opt in or out
//! of specific behaviors without hand-assembling the struct.

/// Tuning settings applied once per [`crate::session::Session`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Whether to issue the planner-tuning hints (disable seqscan,
    /// mergejoin, hashjoin) before the first materialization of a query.
    ///
    /// These hints bias the store's planner toward index-driven plans on
    /// the small, highly-selective scratch sets this crate builds. They are
    /// a workaround for statistics issues on some store versions; a modern
    /// store may not need them. See `SPEC_FULL.md` §9.
    pub planner_tuning_hints: bool,

    /// Upper bound on the number of iterations the group-over-group closure
    /// loop may run before it is treated as a planner/store bug rather than
    /// a legitimately large dataset.
    pub max_closure_iterations: usize,

    /// Literal tag embedded in the bounds marker's origin field.
    pub origin_tag: &'static str,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            planner_tuning_hints: true,
            max_closure_iterations: 10_000,
            origin_tag: concat!("Geoslice ", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SessionConfig {
    /// A configuration that leaves the store's own planner heuristics in
    /// place, for stores whose statistics are known to be accurate on the
    /// scratch-table sizes this crate produces.
    pub fn strict() -> Self {
        Self {
            planner_tuning_hints: false,
            ..Self::default()
        }
    }
}
