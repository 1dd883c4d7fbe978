//! # Geoslice
//!
//! Geoslice is a read-only query engine that extracts a filtered slice of a
//! geographic dataset — nodes, polylines, and groups, in the OSM sense —
//! from a PostGIS-backed relational store.
//!
//! ## Quick Start
//!
//! ```no_run
//! use futures::StreamExt;
//! use geoslice::{Session, SessionConfig};
//!
//! # async fn run() -> Result<(), geoslice::QueryError> {
//! let pool = sqlx::postgres::PgPoolOptions::new()
//!     .connect("postgres://localhost/osm")
//!     .await
//!     .map_err(geoslice::QueryError::StoreUnavailable)?;
//!
//! let mut session = Session::new(pool, SessionConfig::default());
//! let mut stream = session.iterate_bbox(-0.2, 0.1, 51.4, 51.6, false).await?;
//! while let Some(item) = stream.next().await {
//!     let _item = item?;
//! }
//! drop(stream);
//! session.complete().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Selector layer** ([`selector`]) — bounding-box and attribute
//!   predicates that compose into SQL fragments, oblivious to which query
//!   they'll end up in.
//! - **Capability probe** ([`capability`]) — one-shot schema introspection
//!   that tells the planner which physical strategies the store supports.
//! - **Planner** ([`planner`]) — turns a query kind, its selectors, and the
//!   probed capabilities into an ordered list of stages.
//! - **Executor** ([`executor`]) — runs those stages against an open
//!   transaction, enforcing the closure-loop iteration ceiling.
//! - **Cursor assembler** ([`cursor`]) — concatenates the bounds marker,
//!   the last-update marker, and the requested entity cursors into the
//!   single ordered stream every query returns.
//! - **Session** ([`session`]) — lazy transaction lifecycle, single-open-
//!   cursor scoping, and the public `iterate_*` surface.

pub mod capability;
pub mod config;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod model;
pub mod planner;
pub mod selector;
pub mod session;

pub use crate::config::SessionConfig;
pub use crate::error::{QueryError, Result, SelectorError};
pub use crate::model::{
    BoundsMarker, Group, GroupId, LastUpdateMarker, Member, MemberKind, Node, NodeId, Polyline, PolylineId, Rect,
    StreamItem, Tags,
};
pub use crate::selector::{AttrSelector, BboxSelector, NumericOp};
pub use crate::session::Session;
