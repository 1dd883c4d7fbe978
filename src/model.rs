//! Domain entities returned by queries: nodes, polylines, groups, and the
//! two envelope records that frame every stream.
//!
//! # Key types
//!
//! - [`Node`] — a point with coordinates and tags.
//! - [`Polyline`] — an ordered sequence of node references, with optional
//!   cached geometry.
//! - [`Group`] — an unordered collection of typed member references.
//! - [`BoundsMarker`] / [`LastUpdateMarker`] — singleton envelope records
//!   emitted at the head of every stream.

use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Tag map shared by all three entity kinds. Keys are unique; values are
/// text. A `BTreeMap` is used (rather than a `HashMap`) so that debug
/// output and test assertions are deterministic.
pub type Tags = BTreeMap<String, String>;

macro_rules! entity_id {
    ($name:ident) => {
        #[doc = concat!("Identifier for a [`", stringify!($name), "`].")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(NodeId);
entity_id!(PolylineId);
entity_id!(GroupId);

/// A point entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Identity.
    pub id: NodeId,
    /// Longitude, degrees.
    pub lon: f64,
    /// Latitude, degrees.
    pub lat: f64,
    /// Edit version.
    pub version: u32,
    /// Edit timestamp.
    pub timestamp: OffsetDateTime,
    /// Author's user id.
    pub author_id: u64,
    /// Changeset the edit belongs to.
    pub changeset_id: u64,
    /// Key/value attribute mapping.
    pub tags: Tags,
}

/// An ordered sequence of node references forming a (possibly closed) path.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    /// Identity.
    pub id: PolylineId,
    /// Edit version.
    pub version: u32,
    /// Edit timestamp.
    pub timestamp: OffsetDateTime,
    /// Author's user id.
    pub author_id: u64,
    /// Changeset the edit belongs to.
    pub changeset_id: u64,
    /// Key/value attribute mapping.
    pub tags: Tags,
    /// Ordered node ids this polyline references.
    pub nodes: Vec<NodeId>,
    /// Cached linestring geometry, in the store's native well-known-binary
    /// encoding, when the `polyline-linestring` capability is present.
    pub cached_linestring: Option<Vec<u8>>,
    /// Cached bounding rectangle, when the `polyline-bbox` capability is
    /// present.
    pub cached_bbox: Option<Rect>,
}

/// The kind of entity a group member refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// References a [`Node`].
    Node,
    /// References a [`Polyline`].
    Polyline,
    /// References another [`Group`].
    Group,
}

/// A single typed, ordered member reference within a [`Group`].
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// The kind of entity referenced.
    pub kind: MemberKind,
    /// The referenced entity's id.
    pub referent_id: u64,
    /// Free-form role string (may be empty, never absent).
    pub role: String,
}

/// An unordered collection of typed member references with per-member
/// roles.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Identity.
    pub id: GroupId,
    /// Edit version.
    pub version: u32,
    /// Edit timestamp.
    pub timestamp: OffsetDateTime,
    /// Author's user id.
    pub author_id: u64,
    /// Changeset the edit belongs to.
    pub changeset_id: u64,
    /// Key/value attribute mapping.
    pub tags: Tags,
    /// Ordered member references.
    pub members: Vec<Member>,
}

/// An axis-aligned rectangle in unprojected (lon/lat, degrees) space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// West edge.
    pub left: f64,
    /// East edge.
    pub right: f64,
    /// South edge.
    pub bottom: f64,
    /// North edge.
    pub top: f64,
}

/// Singleton envelope emitted at the head of every stream, exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsMarker {
    /// The rectangle covered by the stream.
    pub rect: Rect,
    /// Free-text origin tag, e.g. `"Geoslice 0.1.0"`. Informational, but
    /// must always be present.
    pub origin: String,
}

/// Singleton envelope recording the dataset's last modification instant.
/// Exactly one per stream. If the store has no modification record, this
/// carries the Unix epoch rather than being omitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastUpdateMarker(pub OffsetDateTime);

/// One item of the single ordered stream every `iterate_*` method returns.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// The stream's leading bounds marker.
    Bounds(BoundsMarker),
    /// The stream's leading last-update marker.
    LastUpdate(LastUpdateMarker),
    /// A node entity.
    Node(Node),
    /// A polyline entity.
    Polyline(Polyline),
    /// A group entity.
    Group(Group),
}
