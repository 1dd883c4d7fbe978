//! End-to-end tests against a real PostgreSQL + PostGIS instance.
//!
//! Gated behind the `live-postgres-tests` feature so that `cargo test`
//! without a database configured doesn't fail. Run with:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/geoslice_test cargo test --features live-postgres-tests
//! ```
//!
//! The target database is expected to already carry the apidb-style
//! schema (`nodes`, `ways`, `way_nodes`, `relations`, `relation_members`,
//! `schema_migrations`) seeded with fixture rows; this suite does not
//! create or migrate the schema itself.

#![cfg(feature = "live-postgres-tests")]

use futures::StreamExt;
use geoslice::{Session, SessionConfig, StreamItem};
use sqlx::postgres::PgPoolOptions;

async fn test_session() -> Session {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for live-postgres-tests");
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("failed to connect to the live test database");
    Session::new(pool, SessionConfig::default())
}

#[tokio::test]
async fn iterate_all_yields_bounds_then_last_update_before_any_entity() {
    let mut session = test_session().await;
    let mut stream = session.iterate_all().await.expect("iterate_all failed");

    let first = stream.next().await.expect("stream ended early").expect("item error");
    assert!(matches!(first, StreamItem::Bounds(_)));

    let second = stream.next().await.expect("stream ended early").expect("item error");
    assert!(matches!(second, StreamItem::LastUpdate(_)));

    drop(stream);
    session.complete().await.expect("complete failed");
}

#[tokio::test]
async fn dropping_an_undrained_stream_frees_the_session_for_a_later_query() {
    let mut session = test_session().await;
    let stream = session.iterate_all().await.expect("iterate_all failed");
    drop(stream);

    let mut second = session.iterate_all().await.expect("second iterate_all should succeed");
    let first_item = second.next().await.expect("stream ended early").expect("item error");
    assert!(matches!(first_item, StreamItem::Bounds(_)));
}

#[tokio::test]
async fn node_by_id_finds_a_known_fixture_and_rejects_an_unknown_id() {
    let mut session = test_session().await;
    let node = session.node_by_id(geoslice::NodeId(1)).await.expect("fixture node 1 should exist");
    assert_eq!(node.id, geoslice::NodeId(1));

    let missing = session.node_by_id(geoslice::NodeId(u64::MAX)).await;
    assert!(matches!(missing, Err(geoslice::QueryError::NotFound { kind: "node", .. })));
}

#[tokio::test]
async fn bbox_query_only_returns_entities_intersecting_the_box() {
    let mut session = test_session().await;
    let mut stream = session
        .iterate_bbox(-0.001, 0.001, -0.001, 0.001, false)
        .await
        .expect("iterate_bbox failed");

    while let Some(item) = stream.next().await {
        let item = item.expect("item error");
        if let StreamItem::Node(node) = item {
            assert!((-0.001..=0.001).contains(&node.lon));
            assert!((-0.001..=0.001).contains(&node.lat));
        }
    }
}

#[tokio::test]
async fn groups_by_id_round_trips_member_order() {
    let mut session = test_session().await;
    let mut stream = session
        .iterate_groups_by_id(vec![geoslice::GroupId(1)])
        .await
        .expect("iterate_groups_by_id failed");

    let mut saw_group = false;
    while let Some(item) = stream.next().await {
        if let StreamItem::Group(group) = item.expect("item error") {
            saw_group = true;
            assert_eq!(group.id, geoslice::GroupId(1));
        }
    }
    assert!(saw_group, "fixture relation 1 should exist in the test database");
}
