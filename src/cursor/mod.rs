//! Cursor assembler: concatenates the bounds marker, the last-update
//! marker, and the requested entity cursors into the single ordered
//! stream every `iterate_*` method returns (§4.6).
//!
//! Built on [`async_stream::try_stream!`] so that nothing downstream of
//! the first requested kind is queried until the caller actually polls
//! for it — a caller who only drains the first few nodes of a huge
//! dataset never pays for the polyline or group cursors at all.

mod adapter;

use async_stream::try_stream;
use futures::TryStreamExt;
use futures_core::stream::BoxStream;
use sqlx::{Postgres, Transaction};

use crate::capability::Capabilities;
use crate::error::{QueryError, Result};
use crate::model::{BoundsMarker, Group, LastUpdateMarker, Node, Polyline, Rect, StreamItem};
use crate::planner::EmitFlags;

/// Assembles the ordered output stream for a completed plan.
///
/// `prefix` is the scratch-table prefix to read from (e.g. `"bbox_"`), or
/// the empty string when the planner produced no stages and the adapters
/// should read the base `nodes`/`ways`/`relations` tables directly.
pub fn assemble<'c>(
    tx: &'c mut Transaction<'_, Postgres>,
    prefix: &'c str,
    emit: EmitFlags,
    bounds: BoundsMarker,
    last_update: LastUpdateMarker,
    caps: Capabilities,
) -> BoxStream<'c, Result<StreamItem>> {
    Box::pin(try_stream! {
        yield StreamItem::Bounds(bounds);
        yield StreamItem::LastUpdate(last_update);

        if emit.nodes {
            let table = if prefix.is_empty() { "nodes".to_string() } else { format!("{prefix}nodes") };
            let sql = adapter::node_select(&table, "true");
            let mut rows = sqlx::query_as::<_, adapter::NodeRow>(&sql).fetch(&mut **tx);
            while let Some(row) = rows.try_next().await.map_err(QueryError::CursorBroken)? {
                yield StreamItem::Node(row.into());
            }
        }

        if emit.polylines {
            let table = if prefix.is_empty() { "ways".to_string() } else { format!("{prefix}ways") };
            let sql = adapter::polyline_select(&table, caps, "true");
            let mut rows = sqlx::query_as::<_, adapter::PolylineRow>(&sql).fetch(&mut **tx);
            while let Some(row) = rows.try_next().await.map_err(QueryError::CursorBroken)? {
                yield StreamItem::Polyline(row.into());
            }
        }

        if emit.groups {
            let table = if prefix.is_empty() { "relations".to_string() } else { format!("{prefix}relations") };
            let sql = adapter::group_select(&table, "true");
            let mut rows = sqlx::query_as::<_, adapter::GroupRow>(&sql).fetch(&mut **tx);
            while let Some(row) = rows.try_next().await.map_err(QueryError::CursorBroken)? {
                yield StreamItem::Group(row.into());
            }
        }
    })
}

/// Default bounds marker covering the whole planet, used by queries that
/// have no selector-derived rectangle of their own (`iterate_all`, the
/// by-id queries).
pub fn whole_planet_rect() -> Rect {
    Rect {
        left: -180.0,
        right: 180.0,
        bottom: -90.0,
        top: 90.0,
    }
}

/// Point lookup against the base `nodes` table. Returns `None` rather than
/// an error when no row matches; the caller turns that into `NotFound`.
pub async fn fetch_node_by_id(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Option<Node>> {
    let sql = adapter::node_select("nodes", "id = $1");
    sqlx::query_as::<_, adapter::NodeRow>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map(|row| row.map(Node::from))
        .map_err(|e| QueryError::query_failed("node_by_id", e))
}

/// Point lookup against the base `ways` table.
pub async fn fetch_polyline_by_id(
    tx: &mut Transaction<'_, Postgres>,
    caps: Capabilities,
    id: i64,
) -> Result<Option<Polyline>> {
    let sql = adapter::polyline_select("ways", caps, "w.id = $1");
    sqlx::query_as::<_, adapter::PolylineRow>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map(|row| row.map(Polyline::from))
        .map_err(|e| QueryError::query_failed("polyline_by_id", e))
}

/// Point lookup against the base `relations` table.
pub async fn fetch_group_by_id(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Option<Group>> {
    let sql = adapter::group_select("relations", "r.id = $1");
    sqlx::query_as::<_, adapter::GroupRow>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map(|row| row.map(Group::from))
        .map_err(|e| QueryError::query_failed("group_by_id", e))
}
