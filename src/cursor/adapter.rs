//! Wire-row shapes and SQL builders for the three entity kinds. Kept
//! separate from [`super::assemble`] so the query text and the row
//! decoding live next to each other.

use serde::Deserialize;
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::capability::Capabilities;
use crate::model::{Group, GroupId, Member, MemberKind, Node, NodeId, Polyline, PolylineId, Rect, Tags};

#[derive(Debug, FromRow)]
pub(super) struct NodeRow {
    id: i64,
    lon: f64,
    lat: f64,
    version: i32,
    edit_timestamp: OffsetDateTime,
    author_id: i64,
    changeset_id: i64,
    tags_json: Json<Tags>,
}

impl From<NodeRow> for Node {
    fn from(row: NodeRow) -> Self {
        Node {
            id: NodeId(row.id as u64),
            lon: row.lon,
            lat: row.lat,
            version: row.version as u32,
            timestamp: row.edit_timestamp,
            author_id: row.author_id as u64,
            changeset_id: row.changeset_id as u64,
            tags: row.tags_json.0,
        }
    }
}

/// Builds `SELECT ... FROM <table> WHERE <predicate> ORDER BY id` for the
/// node kind. `table` is always a name this crate generated itself (a fixed
/// scratch-table name or the base `nodes` table), never caller-supplied
/// text. `predicate` is `"true"` for a full scan, or `"id = $1"` for the
/// point-lookup path.
pub(super) fn node_select(table: &str, predicate: &str) -> String {
    format!(
        "SELECT id, lon, lat, version, edit_timestamp, author_id, changeset_id,
                hstore_to_json(tags) AS tags_json
         FROM {table}
         WHERE {predicate}
         ORDER BY id"
    )
}

#[derive(Debug, FromRow)]
pub(super) struct PolylineRow {
    id: i64,
    version: i32,
    edit_timestamp: OffsetDateTime,
    author_id: i64,
    changeset_id: i64,
    tags_json: Json<Tags>,
    node_ids: Vec<i64>,
    linestring_wkb: Option<Vec<u8>>,
    bbox_left: Option<f64>,
    bbox_right: Option<f64>,
    bbox_bottom: Option<f64>,
    bbox_top: Option<f64>,
}

impl From<PolylineRow> for Polyline {
    fn from(row: PolylineRow) -> Self {
        let cached_bbox = match (row.bbox_left, row.bbox_right, row.bbox_bottom, row.bbox_top) {
            (Some(left), Some(right), Some(bottom), Some(top)) => Some(Rect { left, right, bottom, top }),
            _ => None,
        };
        Polyline {
            id: PolylineId(row.id as u64),
            version: row.version as u32,
            timestamp: row.edit_timestamp,
            author_id: row.author_id as u64,
            changeset_id: row.changeset_id as u64,
            tags: row.tags_json.0,
            nodes: row.node_ids.into_iter().map(|id| NodeId(id as u64)).collect(),
            cached_linestring: row.linestring_wkb,
            cached_bbox,
        }
    }
}

/// Builds the polyline `SELECT`, including the bbox/linestring columns only
/// when the capability probe found them (§4.2). `predicate` is evaluated
/// against the `w` alias (`"true"` for a full scan, `"w.id = $1"` for the
/// point-lookup path).
pub(super) fn polyline_select(table: &str, caps: Capabilities, predicate: &str) -> String {
    let linestring_col = if caps.has_linestring {
        "ST_AsBinary(w.linestring)"
    } else {
        "NULL"
    };
    let (bbox_left, bbox_right, bbox_bottom, bbox_top) = if caps.has_bbox {
        ("ST_XMin(w.bbox)", "ST_XMax(w.bbox)", "ST_YMin(w.bbox)", "ST_YMax(w.bbox)")
    } else {
        ("NULL", "NULL", "NULL", "NULL")
    };
    format!(
        "SELECT w.id, w.version, w.edit_timestamp, w.author_id, w.changeset_id,
                hstore_to_json(w.tags) AS tags_json,
                COALESCE(
                    (SELECT array_agg(wn.node_id ORDER BY wn.sequence_id) FROM way_nodes wn WHERE wn.way_id = w.id),
                    ARRAY[]::bigint[]
                ) AS node_ids,
                {linestring_col} AS linestring_wkb,
                {bbox_left} AS bbox_left,
                {bbox_right} AS bbox_right,
                {bbox_bottom} AS bbox_bottom,
                {bbox_top} AS bbox_top
         FROM {table} w
         WHERE {predicate}
         ORDER BY w.id"
    )
}

#[derive(Debug, Deserialize)]
struct MemberJson {
    kind: String,
    id: i64,
    role: String,
}

#[derive(Debug, FromRow)]
pub(super) struct GroupRow {
    id: i64,
    version: i32,
    edit_timestamp: OffsetDateTime,
    author_id: i64,
    changeset_id: i64,
    tags_json: Json<Tags>,
    members_json: Json<Vec<MemberJson>>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        let members = row
            .members_json
            .0
            .into_iter()
            .map(|m| Member {
                kind: match m.kind.as_str() {
                    "N" => MemberKind::Node,
                    "W" => MemberKind::Polyline,
                    _ => MemberKind::Group,
                },
                referent_id: m.id as u64,
                role: m.role,
            })
            .collect();
        Group {
            id: GroupId(row.id as u64),
            version: row.version as u32,
            timestamp: row.edit_timestamp,
            author_id: row.author_id as u64,
            changeset_id: row.changeset_id as u64,
            tags: row.tags_json.0,
            members,
        }
    }
}

/// `predicate` is evaluated against the `r` alias (`"true"` for a full scan,
/// `"r.id = $1"` for the point-lookup path).
pub(super) fn group_select(table: &str, predicate: &str) -> String {
    format!(
        "SELECT r.id, r.version, r.edit_timestamp, r.author_id, r.changeset_id,
                hstore_to_json(r.tags) AS tags_json,
                COALESCE(
                    (SELECT json_agg(json_build_object('kind', rm.member_type, 'id', rm.member_id, 'role', rm.role)
                            ORDER BY rm.sequence_id)
                     FROM relation_members rm WHERE rm.relation_id = r.id),
                    '[]'::json
                ) AS members_json
         FROM {table} r
         WHERE {predicate}
         ORDER BY r.id"
    )
}

