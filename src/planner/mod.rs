//! Rule-based planner: turns a query kind plus selectors and probed
//! capabilities into an ordered list of [`Stage`]s (§4.4).

mod stage;

pub use stage::Stage;

use crate::capability::Capabilities;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::model::{GroupId, NodeId, PolylineId};
use crate::selector::{AttrSelector, BboxSelector, Fragment, GeometryColumn, ParamCounter, Selectors, SqlValue};

/// Which entity kinds a query requests, determining both which stages run
/// and which cursors the assembler opens (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmitFlags {
    /// Whether nodes are part of the output.
    pub nodes: bool,
    /// Whether polylines are part of the output.
    pub polylines: bool,
    /// Whether groups are part of the output.
    pub groups: bool,
}

/// The query shapes the [`crate::session::Session`] contract exposes.
#[derive(Debug, Clone)]
pub enum QueryKind {
    /// Full dataset stream, no filtering at all.
    All,
    /// The legacy four-float bbox query, always emitting all three kinds.
    Bbox {
        /// West edge.
        left: f64,
        /// East edge.
        right: f64,
        /// North edge.
        top: f64,
        /// South edge.
        bottom: f64,
        /// Whether to expand polylines into their full referenced node set.
        complete_ways: bool,
    },
    /// Typed, nodes only.
    Nodes,
    /// Typed, polylines only.
    Polylines,
    /// Typed, groups only (with group-over-group closure).
    Groups,
    /// Typed, all three kinds (with group closure, no complete-ways
    /// expansion — that's only exposed via [`QueryKind::Bbox`]).
    AllTyped,
    /// Explicit node id list.
    NodesById(Vec<NodeId>),
    /// Explicit polyline id list.
    PolylinesById(Vec<PolylineId>),
    /// Explicit group id list.
    GroupsById(Vec<GroupId>),
}

impl QueryKind {
    /// The [`EmitFlags`] this kind requests.
    pub fn emit_flags(&self) -> EmitFlags {
        match self {
            QueryKind::All | QueryKind::Bbox { .. } | QueryKind::AllTyped => EmitFlags {
                nodes: true,
                polylines: true,
                groups: true,
            },
            QueryKind::Nodes | QueryKind::NodesById(_) => EmitFlags {
                nodes: true,
                ..EmitFlags::default()
            },
            QueryKind::Polylines | QueryKind::PolylinesById(_) => EmitFlags {
                polylines: true,
                ..EmitFlags::default()
            },
            QueryKind::Groups | QueryKind::GroupsById(_) => EmitFlags {
                groups: true,
                ..EmitFlags::default()
            },
        }
    }
}

/// Scratch-table prefix shared by the planner and the cursor assembler's
/// entity-adapter contract. Fixed, not a per-session tunable — the
/// adapters read back from exactly these names (spec.md §6).
pub(crate) const SCRATCH_PREFIX: &str = "bbox_";

const NODES_TABLE: &str = "bbox_nodes";
const WAYS_TABLE: &str = "bbox_ways";
const RELATIONS_TABLE: &str = "bbox_relations";
const WAY_NODES_TABLE: &str = "bbox_way_nodes";
const MISSING_WAY_NODES_TABLE: &str = "bbox_missing_way_nodes";

/// A fully-assembled physical plan: the stages to run, which scratch-table
/// prefix the cursor assembler should read back from, and which kinds are
/// in the output.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Stages to execute in order.
    pub stages: Vec<Stage>,
    /// Prefix the entity adapters should read from once stages complete.
    /// Empty string for [`QueryKind::All`] (full tables, no scratch sets).
    pub scratch_prefix: &'static str,
    /// Which cursors the assembler should open.
    pub emit: EmitFlags,
}

/// Converts a query kind, its selectors, and probed capabilities into a
/// physical plan. Pure and synchronous — no I/O happens during planning.
#[derive(Debug, Default)]
pub struct Planner;

impl Planner {
    /// Creates a new planner. Stateless: all inputs are passed to
    /// [`Self::plan`] explicitly.
    pub fn new() -> Self {
        Self
    }

    /// Builds the stage list for `kind` given `selectors` and `caps`.
    pub fn plan(
        &self,
        kind: &QueryKind,
        selectors: &Selectors,
        caps: Capabilities,
        cfg: &SessionConfig,
    ) -> Result<Plan> {
        selectors.validate()?;
        let emit = kind.emit_flags();

        if matches!(kind, QueryKind::All) {
            return Ok(Plan {
                stages: Vec::new(),
                scratch_prefix: "",
                emit,
            });
        }

        let mut stages = Vec::new();
        stages.push(drop_prior_scratch());
        if cfg.planner_tuning_hints {
            stages.push(Stage::TuningHints);
        }

        match kind {
            QueryKind::NodesById(ids) => {
                let ids: Vec<i64> = ids.iter().map(|id| id.0 as i64).collect();
                push_seed_by_id(&mut stages, "seed_nodes_by_id", "nodes", NODES_TABLE, ids);
                stages.push(finalize("finalize_nodes", NODES_TABLE));
            }
            QueryKind::PolylinesById(ids) => {
                let ids: Vec<i64> = ids.iter().map(|id| id.0 as i64).collect();
                push_seed_by_id(&mut stages, "seed_ways_by_id", "ways", WAYS_TABLE, ids);
                stages.push(finalize("finalize_ways", WAYS_TABLE));
            }
            QueryKind::GroupsById(ids) => {
                let ids: Vec<i64> = ids.iter().map(|id| id.0 as i64).collect();
                push_seed_by_id(&mut stages, "seed_relations_by_id", "relations", RELATIONS_TABLE, ids);
                stages.push(finalize("finalize_relations", RELATIONS_TABLE));
            }
            QueryKind::Bbox {
                left,
                right,
                top,
                bottom,
                complete_ways,
            } => {
                let bbox_selectors = Selectors {
                    bboxes: vec![BboxSelector::new(*left, *right, *bottom, *top)?],
                    attrs: Vec::new(),
                };
                plan_node_set(&mut stages, &bbox_selectors);
                plan_polyline_set(&mut stages, &bbox_selectors, caps);
                plan_group_closure(&mut stages, cfg);
                if *complete_ways {
                    plan_complete_ways(&mut stages);
                }
            }
            QueryKind::Nodes => {
                plan_node_set(&mut stages, selectors);
            }
            QueryKind::Polylines => {
                let need_nodes = !(caps.has_linestring || caps.has_bbox);
                if need_nodes {
                    // The "neither capability" strategy below joins through
                    // bbox_nodes to find ways touching the area, so it needs
                    // the real predicate materialized first.
                    plan_node_set(&mut stages, selectors);
                }
                plan_polyline_set(&mut stages, selectors, caps);
            }
            QueryKind::Groups => {
                plan_node_set(&mut stages, selectors);
                plan_polyline_set(&mut stages, selectors, caps);
                plan_group_closure(&mut stages, cfg);
            }
            QueryKind::AllTyped => {
                plan_node_set(&mut stages, selectors);
                plan_polyline_set(&mut stages, selectors, caps);
                plan_group_closure(&mut stages, cfg);
            }
            QueryKind::All => unreachable!("handled above"),
        }

        Ok(Plan {
            stages,
            scratch_prefix: SCRATCH_PREFIX,
            emit,
        })
    }
}

/// Drops any scratch tables a previous query on this same session's
/// transaction left behind. Scratch tables are `ON COMMIT DROP`, but a
/// `Session` may run several queries against one long-lived transaction
/// before `complete()`, so a later query's `CREATE TEMP TABLE` would
/// otherwise collide with the still-live tables from an earlier one.
fn drop_prior_scratch() -> Stage {
    Stage::Exec {
        label: "drop_prior_scratch",
        sql: format!(
            "DROP TABLE IF EXISTS {NODES_TABLE}, {WAYS_TABLE}, {RELATIONS_TABLE}, {WAY_NODES_TABLE}, {MISSING_WAY_NODES_TABLE}"
        ),
        params: Vec::new(),
    }
}

/// Seeds `scratch_table` from an explicit id list. An empty list
/// short-circuits to `WHERE false` rather than emitting `id IN ()`, which
/// Postgres rejects as a syntax error.
fn push_seed_by_id(stages: &mut Vec<Stage>, label: &'static str, source_table: &str, scratch_table: &str, ids: Vec<i64>) {
    if ids.is_empty() {
        stages.push(Stage::Exec {
            label,
            sql: format!("CREATE TEMP TABLE {scratch_table} ON COMMIT DROP AS SELECT * FROM {source_table} WHERE false"),
            params: Vec::new(),
        });
        return;
    }
    let mut counter = ParamCounter::new();
    let placeholders: Vec<String> = ids.iter().map(|_| counter.next_placeholder()).collect();
    let sql = format!(
        "CREATE TEMP TABLE {scratch_table} ON COMMIT DROP AS SELECT * FROM {source_table} WHERE id IN ({})",
        placeholders.join(", ")
    );
    let params = ids.into_iter().map(SqlValue::I64).collect();
    stages.push(Stage::Exec { label, sql, params });
}

fn finalize(label: &'static str, table: &str) -> Stage {
    Stage::FinalizeScratch {
        label,
        table: table.to_string(),
    }
}

/// Stage 1: `bbox_nodes`, matching the selectors' `(bbox ∧ attrs)` predicate.
/// Every caller needs the real matching set — node-kind output reads it
/// directly, and the group/relation closure and the capability-less polyline
/// strategy both join through it.
fn plan_node_set(stages: &mut Vec<Stage>, selectors: &Selectors) {
    let mut counter = ParamCounter::new();
    let frag = selectors.predicate_fragment(GeometryColumn::NodeGeom, &mut counter);
    let sql = format!(
        "CREATE TEMP TABLE {NODES_TABLE} ON COMMIT DROP AS SELECT * FROM nodes WHERE {}",
        frag.sql
    );
    stages.push(Stage::Exec {
        label: "materialize_nodes",
        sql,
        params: frag.params,
    });
    stages.push(finalize("finalize_nodes", NODES_TABLE));
}

/// Stage 2: `bbox_ways`, physical strategy chosen by capability (§4.4).
fn plan_polyline_set(stages: &mut Vec<Stage>, selectors: &Selectors, caps: Capabilities) {
    let mut counter = ParamCounter::new();
    let (sql, params) = if caps.has_linestring {
        let frag = selectors.predicate_fragment(GeometryColumn::WayLinestring, &mut counter);
        (
            format!(
                "CREATE TEMP TABLE {WAYS_TABLE} ON COMMIT DROP AS SELECT * FROM ways WHERE {}",
                frag.sql
            ),
            frag.params,
        )
    } else if caps.has_bbox {
        let bbox_frag = or_bboxes(&selectors.bboxes, "bbox", &mut counter);
        let attr_frag = or_attrs(&selectors.attrs, &mut counter);
        let linestring_frag = or_bboxes(&selectors.bboxes, "assembled.built_line", &mut counter);
        let sql = format!(
            "CREATE TEMP TABLE {WAYS_TABLE} ON COMMIT DROP AS
             SELECT w.* FROM ways w WHERE w.id IN (
                 SELECT assembled.id FROM (
                     SELECT cand.id, ST_MakeLine(pt.geom ORDER BY wn.sequence_id) AS built_line
                     FROM (SELECT * FROM ways WHERE {bbox} AND ({attrs})) cand
                     JOIN way_nodes wn ON wn.way_id = cand.id
                     JOIN nodes pt ON pt.id = wn.node_id
                     GROUP BY cand.id
                 ) assembled
                 WHERE {linestring_check}
             )",
            bbox = bbox_frag.sql,
            attrs = attr_frag.sql,
            linestring_check = linestring_frag.sql,
        );
        let mut params = bbox_frag.params;
        params.extend(attr_frag.params);
        params.extend(linestring_frag.params);
        (sql, params)
    } else {
        let attr_frag = or_attrs(&selectors.attrs, &mut counter);
        (
            format!(
                "CREATE TEMP TABLE {WAYS_TABLE} ON COMMIT DROP AS
                 SELECT w.* FROM ways w
                 WHERE EXISTS (
                     SELECT 1 FROM way_nodes wn
                     JOIN {NODES_TABLE} bn ON bn.id = wn.node_id
                     WHERE wn.way_id = w.id
                 ) AND ({})",
                attr_frag.sql
            ),
            attr_frag.params,
        )
    };

    stages.push(Stage::Exec {
        label: "materialize_ways",
        sql,
        params,
    });
    stages.push(finalize("finalize_ways", WAYS_TABLE));
}

fn or_bboxes(bboxes: &[BboxSelector], geom_col: &str, counter: &mut ParamCounter) -> Fragment {
    if bboxes.is_empty() {
        return Fragment {
            sql: "1=1".to_string(),
            params: Vec::new(),
        };
    }
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for b in bboxes {
        let frag = b.predicate_fragment(geom_col, counter);
        parts.push(frag.sql);
        params.extend(frag.params);
    }
    Fragment {
        sql: parts.join(" OR "),
        params,
    }
}

fn or_attrs(attrs: &[AttrSelector], counter: &mut ParamCounter) -> Fragment {
    if attrs.is_empty() {
        return Fragment {
            sql: "1=1".to_string(),
            params: Vec::new(),
        };
    }
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for attr in attrs {
        let frag = attr.predicate_fragment(counter);
        parts.push(frag.sql);
        params.extend(frag.params);
    }
    Fragment {
        sql: parts.join(" OR "),
        params,
    }
}

/// Stages 3 and 4: seed `bbox_relations`, then close over group membership
/// until a step inserts zero rows.
fn plan_group_closure(stages: &mut Vec<Stage>, cfg: &SessionConfig) {
    stages.push(Stage::Exec {
        label: "seed_relations",
        sql: format!(
            "CREATE TEMP TABLE {RELATIONS_TABLE} ON COMMIT DROP AS
              SELECT DISTINCT r.* FROM relations r
              JOIN relation_members rm ON rm.relation_id = r.id
              WHERE (rm.member_type = 'N' AND rm.member_id IN (SELECT id FROM {NODES_TABLE}))
                 OR (rm.member_type = 'W' AND rm.member_id IN (SELECT id FROM {WAYS_TABLE}))"
        ),
        params: Vec::new(),
    });
    stages.push(finalize("finalize_relations_seed", RELATIONS_TABLE));
    stages.push(Stage::ClosureLoop {
        label: "close_relations_over_relations",
        sql: format!(
            "INSERT INTO {RELATIONS_TABLE}
              SELECT DISTINCT r.* FROM relations r
              JOIN relation_members rm ON rm.relation_id = r.id AND rm.member_type = 'R'
              WHERE rm.member_id IN (SELECT id FROM {RELATIONS_TABLE})
                AND r.id NOT IN (SELECT id FROM {RELATIONS_TABLE})"
        ),
        params: Vec::new(),
        max_iterations: cfg.max_closure_iterations,
    });
}

/// Stage 5: complete-ways expansion.
fn plan_complete_ways(stages: &mut Vec<Stage>) {
    stages.push(Stage::CallProcedure {
        label: "complete_ways_proc",
        sql: "SELECT complete_ways()".to_string(),
    });
    stages.push(Stage::Exec {
        label: "materialize_missing_way_nodes",
        sql: format!(
            "CREATE TEMP TABLE {MISSING_WAY_NODES_TABLE} ON COMMIT DROP AS
              SELECT DISTINCT node_id AS id FROM {WAY_NODES_TABLE}
              WHERE node_id NOT IN (SELECT id FROM {NODES_TABLE})"
        ),
        params: Vec::new(),
    });
    stages.push(finalize("finalize_missing_way_nodes", MISSING_WAY_NODES_TABLE));
    stages.push(Stage::Exec {
        label: "extend_nodes_with_missing",
        sql: format!(
            "INSERT INTO {NODES_TABLE}
              SELECT * FROM nodes WHERE id IN (SELECT id FROM {MISSING_WAY_NODES_TABLE})"
        ),
        params: Vec::new(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::config::SessionConfig;

    #[test]
    fn all_kind_produces_no_stages() {
        let planner = Planner::new();
        let plan = planner
            .plan(&QueryKind::All, &Selectors::default(), Capabilities::default(), &SessionConfig::default())
            .unwrap();
        assert!(plan.stages.is_empty());
        assert_eq!(plan.scratch_prefix, "");
    }

    #[test]
    fn nodes_by_id_seeds_then_finalizes() {
        let planner = Planner::new();
        let kind = QueryKind::NodesById(vec![NodeId(1), NodeId(2)]);
        let plan = planner
            .plan(&kind, &Selectors::default(), Capabilities::default(), &SessionConfig::default())
            .unwrap();
        let labels: Vec<_> = plan.stages.iter().map(Stage::label).collect();
        assert!(labels.contains(&"seed_nodes_by_id"));
        assert!(labels.contains(&"finalize_nodes"));
    }

    #[test]
    fn polylines_only_skips_node_materialization_when_linestring_present() {
        let planner = Planner::new();
        let caps = Capabilities {
            has_linestring: true,
            ..Capabilities::default()
        };
        let plan = planner
            .plan(&QueryKind::Polylines, &Selectors::default(), caps, &SessionConfig::default())
            .unwrap();
        let labels: Vec<_> = plan.stages.iter().map(Stage::label).collect();
        assert!(!labels.contains(&"materialize_nodes"));
        assert!(labels.contains(&"materialize_ways"));
    }

    #[test]
    fn polylines_only_materializes_nodes_without_any_capability() {
        let planner = Planner::new();
        let plan = planner
            .plan(
                &QueryKind::Polylines,
                &Selectors::default(),
                Capabilities::default(),
                &SessionConfig::default(),
            )
            .unwrap();
        let labels: Vec<_> = plan.stages.iter().map(Stage::label).collect();
        assert!(labels.contains(&"materialize_nodes"));
    }

    #[test]
    fn bbox_kind_with_complete_ways_appends_expansion_stages() {
        let planner = Planner::new();
        let kind = QueryKind::Bbox {
            left: -1.0,
            right: 1.0,
            top: 1.0,
            bottom: -1.0,
            complete_ways: true,
        };
        let plan = planner
            .plan(&kind, &Selectors::default(), Capabilities::default(), &SessionConfig::default())
            .unwrap();
        let labels: Vec<_> = plan.stages.iter().map(Stage::label).collect();
        assert!(labels.contains(&"complete_ways_proc"));
        assert!(labels.contains(&"extend_nodes_with_missing"));
    }
}
