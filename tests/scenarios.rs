//! Planner-level scenario tests (§8). These exercise [`geoslice::planner`]
//! directly — no store is involved, so they run without a live Postgres
//! instance. Store-dependent behavior (actual row materialization,
//! capability probing against real schema) is covered by
//! `tests/integration/postgres_live.rs`, gated behind `live-postgres-tests`.

use geoslice::capability::Capabilities;
use geoslice::config::SessionConfig;
use geoslice::model::{GroupId, NodeId, PolylineId};
use geoslice::planner::{Planner, QueryKind, Stage};
use geoslice::selector::Selectors;

fn labels(stages: &[Stage]) -> Vec<&'static str> {
    stages.iter().map(Stage::label).collect()
}

#[test]
fn all_typed_closes_groups_over_groups_after_node_and_way_materialization() {
    let planner = Planner::new();
    let plan = planner
        .plan(
            &QueryKind::AllTyped,
            &Selectors::default(),
            Capabilities::default(),
            &SessionConfig::default(),
        )
        .unwrap();
    let labels = labels(&plan.stages);

    let nodes_idx = labels.iter().position(|l| *l == "materialize_nodes").unwrap();
    let ways_idx = labels.iter().position(|l| *l == "materialize_ways").unwrap();
    let seed_idx = labels.iter().position(|l| *l == "seed_relations").unwrap();
    let closure_idx = labels.iter().position(|l| *l == "close_relations_over_relations").unwrap();

    assert!(nodes_idx < ways_idx);
    assert!(ways_idx < seed_idx);
    assert!(seed_idx < closure_idx);
}

#[test]
fn polyline_selection_strategy_varies_by_capability_but_always_finalizes() {
    let planner = Planner::new();
    let variants = [
        Capabilities {
            has_linestring: true,
            ..Capabilities::default()
        },
        Capabilities {
            has_bbox: true,
            ..Capabilities::default()
        },
        Capabilities::default(),
    ];

    for caps in variants {
        let plan = planner
            .plan(&QueryKind::Polylines, &Selectors::default(), caps, &SessionConfig::default())
            .unwrap();
        let labels = labels(&plan.stages);
        assert!(labels.contains(&"materialize_ways"));
        assert!(labels.contains(&"finalize_ways"));
    }
}

#[test]
fn bbox_query_with_complete_ways_runs_expansion_after_group_closure() {
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
    let labels = labels(&plan.stages);

    let closure_idx = labels.iter().position(|l| *l == "close_relations_over_relations").unwrap();
    let proc_idx = labels.iter().position(|l| *l == "complete_ways_proc").unwrap();
    assert!(closure_idx < proc_idx);
}

#[test]
fn bbox_query_without_complete_ways_has_no_expansion_stages() {
    let planner = Planner::new();
    let kind = QueryKind::Bbox {
        left: -1.0,
        right: 1.0,
        top: 1.0,
        bottom: -1.0,
        complete_ways: false,
    };
    let plan = planner
        .plan(&kind, &Selectors::default(), Capabilities::default(), &SessionConfig::default())
        .unwrap();
    let labels = labels(&plan.stages);
    assert!(!labels.contains(&"complete_ways_proc"));
}

#[test]
fn id_queries_never_touch_the_closure_or_complete_ways_stages() {
    let planner = Planner::new();
    let cfg = SessionConfig::default();
    let caps = Capabilities::default();

    for kind in [
        QueryKind::NodesById(vec![NodeId(1)]),
        QueryKind::PolylinesById(vec![PolylineId(1)]),
        QueryKind::GroupsById(vec![GroupId(1)]),
    ] {
        let plan = planner.plan(&kind, &Selectors::default(), caps, &cfg).unwrap();
        let labels = labels(&plan.stages);
        assert!(!labels.iter().any(|l| l.starts_with("close_relations")));
        assert!(!labels.contains(&"complete_ways_proc"));
    }
}

#[test]
fn all_kind_is_a_pure_passthrough_with_no_stages() {
    let planner = Planner::new();
    let plan = planner
        .plan(&QueryKind::All, &Selectors::default(), Capabilities::default(), &SessionConfig::default())
        .unwrap();
    assert!(plan.stages.is_empty());
    assert!(plan.emit.nodes && plan.emit.polylines && plan.emit.groups);
}

#[test]
fn degenerate_bbox_selector_is_rejected_before_planning() {
    use geoslice::BboxSelector;
    assert!(BboxSelector::new(1.0, -1.0, 0.0, 1.0).is_err());
}

#[test]
fn an_empty_id_list_plans_without_an_id_in_clause() {
    let planner = Planner::new();
    let cfg = SessionConfig::default();
    let caps = Capabilities::default();

    for kind in [
        QueryKind::NodesById(Vec::new()),
        QueryKind::PolylinesById(Vec::new()),
        QueryKind::GroupsById(Vec::new()),
    ] {
        let plan = planner.plan(&kind, &Selectors::default(), caps, &cfg).unwrap();
        let seed = plan
            .stages
            .iter()
            .find_map(|s| match s {
                Stage::Exec { label, sql, .. } if label.starts_with("seed_") => Some(sql),
                _ => None,
            })
            .expect("by-id plan should carry a seed stage");
        assert!(!seed.contains("IN ("), "empty id list must not emit `id IN (...)`: {seed}");
        assert!(seed.contains("WHERE false"));
    }
}
