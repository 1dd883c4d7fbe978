//! Session lifecycle: lazy transaction initialization, capability probing,
//! single-open-cursor scoping, and the public `iterate_*` query surface
//! (§4.3, §4.5, §4.7).

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::stream::BoxStream;
use futures_core::Stream;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::capability::{self, Capabilities};
use crate::config::SessionConfig;
use crate::cursor;
use crate::error::{QueryError, Result};
use crate::model::{BoundsMarker, Group, GroupId, LastUpdateMarker, Node, NodeId, Polyline, PolylineId, Rect, StreamItem};
use crate::planner::{Planner, QueryKind};
use crate::selector::{AttrSelector, BboxSelector, Selectors};

/// The oldest schema version this crate's SQL text is known to be
/// compatible with.
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 1;

/// A single read-only query session against a PostGIS-backed store.
///
/// Holds at most one open transaction, lazily started on the first
/// `iterate_*` call. Only one cursor may be open at a time, which the
/// borrow checker enforces directly: every `iterate_*` method returns a
/// stream borrowing `&mut Session`, so a second call can't compile while
/// the first stream is still alive. Dropping a stream early — before it's
/// exhausted — is a normal way to free resources and leaves the session
/// ready for another query. [`QueryError::LifecycleViolation`] is reserved
/// for calls made after `release()`, or after a prior fatal store error
/// poisoned the session.
pub struct Session {
    pool: PgPool,
    cfg: SessionConfig,
    tx: Option<Transaction<'static, Postgres>>,
    caps: Option<Capabilities>,
    poisoned: Option<&'static str>,
    cursor_open: Arc<AtomicBool>,
}

impl Session {
    /// Opens a session against `pool`. Does no I/O; the transaction and
    /// capability probe happen lazily on the first query.
    pub fn new(pool: PgPool, cfg: SessionConfig) -> Self {
        Self {
            pool,
            cfg,
            tx: None,
            caps: None,
            poisoned: None,
            cursor_open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The full dataset, unfiltered.
    #[instrument(skip(self), name = "query", fields(kind = "all"))]
    pub async fn iterate_all(&mut self) -> Result<BoxStream<'_, Result<StreamItem>>> {
        self.run_query(QueryKind::All, Selectors::default(), None).await
    }

    /// The legacy four-float bounding box query, always emitting all three
    /// kinds and optionally expanding polylines to their full referenced
    /// node set.
    #[instrument(skip(self), name = "query", fields(kind = "bbox"))]
    pub async fn iterate_bbox(
        &mut self,
        left: f64,
        right: f64,
        bottom: f64,
        top: f64,
        complete_ways: bool,
    ) -> Result<BoxStream<'_, Result<StreamItem>>> {
        let kind = QueryKind::Bbox {
            left,
            right,
            top,
            bottom,
            complete_ways,
        };
        let rect = Rect { left, right, bottom, top };
        self.run_query(kind, Selectors::default(), Some(rect)).await
    }

    /// Typed, nodes matching `bboxes` and `attrs` (composed per §4.1).
    #[instrument(skip(self, bboxes, attrs), name = "query", fields(kind = "nodes"))]
    pub async fn iterate_selected_nodes(
        &mut self,
        bboxes: Vec<BboxSelector>,
        attrs: Vec<AttrSelector>,
    ) -> Result<BoxStream<'_, Result<StreamItem>>> {
        let selectors = Selectors { bboxes, attrs };
        self.run_query(QueryKind::Nodes, selectors, None).await
    }

    /// Typed, polylines matching `bboxes` and `attrs`.
    #[instrument(skip(self, bboxes, attrs), name = "query", fields(kind = "polylines"))]
    pub async fn iterate_selected_polylines(
        &mut self,
        bboxes: Vec<BboxSelector>,
        attrs: Vec<AttrSelector>,
    ) -> Result<BoxStream<'_, Result<StreamItem>>> {
        let selectors = Selectors { bboxes, attrs };
        self.run_query(QueryKind::Polylines, selectors, None).await
    }

    /// Typed, groups matching `bboxes` and `attrs`, closed transitively over
    /// group-of-group membership.
    #[instrument(skip(self, bboxes, attrs), name = "query", fields(kind = "groups"))]
    pub async fn iterate_selected_groups(
        &mut self,
        bboxes: Vec<BboxSelector>,
        attrs: Vec<AttrSelector>,
    ) -> Result<BoxStream<'_, Result<StreamItem>>> {
        let selectors = Selectors { bboxes, attrs };
        self.run_query(QueryKind::Groups, selectors, None).await
    }

    /// Typed, all three kinds matching `bboxes` and `attrs`, with group
    /// closure but no complete-ways expansion.
    #[instrument(skip(self, bboxes, attrs), name = "query", fields(kind = "all_typed"))]
    pub async fn iterate_selected_all(
        &mut self,
        bboxes: Vec<BboxSelector>,
        attrs: Vec<AttrSelector>,
    ) -> Result<BoxStream<'_, Result<StreamItem>>> {
        let selectors = Selectors { bboxes, attrs };
        self.run_query(QueryKind::AllTyped, selectors, None).await
    }

    /// Explicit node id list.
    #[instrument(skip(self, ids), name = "query", fields(kind = "nodes_by_id"))]
    pub async fn iterate_nodes_by_id(&mut self, ids: Vec<NodeId>) -> Result<BoxStream<'_, Result<StreamItem>>> {
        self.run_query(QueryKind::NodesById(ids), Selectors::default(), None).await
    }

    /// Explicit polyline id list.
    #[instrument(skip(self, ids), name = "query", fields(kind = "polylines_by_id"))]
    pub async fn iterate_polylines_by_id(&mut self, ids: Vec<PolylineId>) -> Result<BoxStream<'_, Result<StreamItem>>> {
        self.run_query(QueryKind::PolylinesById(ids), Selectors::default(), None).await
    }

    /// Explicit group id list.
    #[instrument(skip(self, ids), name = "query", fields(kind = "groups_by_id"))]
    pub async fn iterate_groups_by_id(&mut self, ids: Vec<GroupId>) -> Result<BoxStream<'_, Result<StreamItem>>> {
        self.run_query(QueryKind::GroupsById(ids), Selectors::default(), None).await
    }

    /// Point lookup by id (§4.3). Queries the base `nodes` table directly —
    /// no scratch table, no cursor — and does not touch `cursor_open`.
    #[instrument(skip(self), name = "query", fields(kind = "node_by_id"))]
    pub async fn node_by_id(&mut self, id: NodeId) -> Result<Node> {
        self.ensure_init().await?;
        let tx = self.tx.as_mut().expect("ensure_init opens a transaction");
        cursor::fetch_node_by_id(tx, id.0 as i64)
            .await?
            .ok_or(QueryError::NotFound { kind: "node", id: id.0 })
    }

    /// Point lookup by id (§4.3). Queries the base `ways` table directly.
    #[instrument(skip(self), name = "query", fields(kind = "polyline_by_id"))]
    pub async fn polyline_by_id(&mut self, id: PolylineId) -> Result<Polyline> {
        self.ensure_init().await?;
        let caps = self.caps.expect("ensure_init populates capabilities");
        let tx = self.tx.as_mut().expect("ensure_init opens a transaction");
        cursor::fetch_polyline_by_id(tx, caps, id.0 as i64)
            .await?
            .ok_or(QueryError::NotFound { kind: "polyline", id: id.0 })
    }

    /// Point lookup by id (§4.3). Queries the base `relations` table directly.
    #[instrument(skip(self), name = "query", fields(kind = "group_by_id"))]
    pub async fn group_by_id(&mut self, id: GroupId) -> Result<Group> {
        self.ensure_init().await?;
        let tx = self.tx.as_mut().expect("ensure_init opens a transaction");
        cursor::fetch_group_by_id(tx, id.0 as i64)
            .await?
            .ok_or(QueryError::NotFound { kind: "group", id: id.0 })
    }

    /// Computes the bounding rectangle of the whole dataset by asking the
    /// store for the combined extent of every node's geometry. Used as the
    /// bounds marker for queries with no selector-derived rectangle of
    /// their own (`iterate_all`, the by-id queries, typed queries with an
    /// empty bbox list).
    pub async fn dataset_bounds(&mut self) -> Result<Rect> {
        self.ensure_init().await?;
        let tx = self.tx.as_mut().expect("ensure_init opens a transaction");
        let outcome = sqlx::query_as::<_, (Option<f64>, Option<f64>, Option<f64>, Option<f64>)>(
            "SELECT ST_XMin(ext), ST_XMax(ext), ST_YMin(ext), ST_YMax(ext)
             FROM (SELECT ST_Extent(geom) AS ext FROM nodes) bounds",
        )
        .fetch_one(&mut **tx)
        .await;

        let row = match outcome {
            Ok(row) => row,
            Err(e) => {
                self.poison("a previous stage failed against the store").await;
                return Err(QueryError::query_failed("dataset_bounds", e));
            }
        };

        Ok(match row {
            (Some(left), Some(right), Some(bottom), Some(top)) => Rect { left, right, bottom, top },
            _ => cursor::whole_planet_rect(),
        })
    }

    /// Commits the session's transaction. Returns a lifecycle violation if
    /// a cursor from a previous `iterate_*` call hasn't been fully drained.
    pub async fn complete(&mut self) -> Result<()> {
        if self.cursor_open.load(Ordering::SeqCst) {
            return Err(QueryError::LifecycleViolation(
                "cannot complete a session while a cursor is still open",
            ));
        }
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(QueryError::StoreUnavailable)?;
        }
        self.caps = None;
        Ok(())
    }

    /// Releases the session, discarding any open transaction without
    /// erroring on an undrained cursor. Prefer [`Self::complete`] when the
    /// caller has fully drained its stream; `release` is the best-effort
    /// fallback for shutdown paths.
    pub async fn release(mut self) {
        if let Some(tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "session.release.rollback_failed");
            }
        }
    }

    async fn ensure_init(&mut self) -> Result<()> {
        if let Some(reason) = self.poisoned {
            return Err(QueryError::LifecycleViolation(reason));
        }
        if self.tx.is_some() {
            return Ok(());
        }
        self.check_schema_version().await?;
        let mut tx = self.pool.begin().await.map_err(QueryError::StoreUnavailable)?;
        let caps = capability::probe(&mut tx).await;
        debug!(?caps, "session.capabilities.probed");
        self.tx = Some(tx);
        self.caps = Some(caps);
        Ok(())
    }

    async fn check_schema_version(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(QueryError::StoreUnavailable)?;
        let version: i32 = sqlx::query_scalar("SELECT version FROM schema_migrations ORDER BY version DESC LIMIT 1")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| QueryError::SchemaIncompatible(e.to_string()))?;
        if version < MIN_SUPPORTED_SCHEMA_VERSION {
            return Err(QueryError::SchemaIncompatible(format!(
                "schema version {version} is older than the minimum supported {MIN_SUPPORTED_SCHEMA_VERSION}"
            )));
        }
        Ok(())
    }

    async fn last_update(&mut self) -> Result<LastUpdateMarker> {
        let tx = self.tx.as_mut().expect("ensure_init opens a transaction");
        let outcome: std::result::Result<Option<OffsetDateTime>, sqlx::Error> = sqlx::query_scalar(
            "SELECT MAX(ts) FROM (
                SELECT MAX(edit_timestamp) AS ts FROM nodes
                UNION ALL SELECT MAX(edit_timestamp) FROM ways
                UNION ALL SELECT MAX(edit_timestamp) FROM relations
             ) t",
        )
        .fetch_one(&mut **tx)
        .await;

        let ts = match outcome {
            Ok(ts) => ts,
            Err(e) => {
                self.poison("a previous stage failed against the store").await;
                return Err(QueryError::query_failed("last_update", e));
            }
        };
        Ok(LastUpdateMarker(ts.unwrap_or(OffsetDateTime::UNIX_EPOCH)))
    }

    /// Poisons the session and rolls back the open transaction immediately,
    /// per [`QueryError::QueryFailed`]'s contract that a failed stage leaves
    /// no transaction open behind it. Rollback errors are logged, not
    /// propagated — the session is already being torn down.
    async fn poison(&mut self, reason: &'static str) {
        self.poisoned = Some(reason);
        if let Some(tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "session.poison.rollback_failed");
            }
        }
    }

    fn bounds_rect(&self, explicit: Option<Rect>, selectors: &Selectors) -> Option<Rect> {
        if explicit.is_some() {
            return explicit;
        }
        union_bbox_rect(&selectors.bboxes)
    }

    async fn run_query(
        &mut self,
        kind: QueryKind,
        selectors: Selectors,
        explicit_bounds: Option<Rect>,
    ) -> Result<BoxStream<'_, Result<StreamItem>>> {
        if self.cursor_open.load(Ordering::SeqCst) {
            return Err(QueryError::LifecycleViolation(
                "a previous cursor was not fully drained before this call",
            ));
        }
        self.ensure_init().await?;
        let caps = self.caps.expect("ensure_init populates capabilities");

        let plan = Planner::new().plan(&kind, &selectors, caps, &self.cfg)?;

        let rect = match self.bounds_rect(explicit_bounds, &selectors) {
            Some(rect) => rect,
            None => self.dataset_bounds().await?,
        };
        let bounds = BoundsMarker {
            rect,
            origin: self.cfg.origin_tag.to_string(),
        };
        let last_update = self.last_update().await?;

        let tx = self.tx.as_mut().expect("ensure_init opens a transaction");
        let profiles = match crate::executor::run(tx, &plan).await {
            Ok(profiles) => profiles,
            Err(e) => {
                self.poison("a previous stage failed against the store").await;
                return Err(e);
            }
        };
        for p in &profiles {
            debug!(stage = p.label, rows = p.rows_affected, elapsed_ms = p.elapsed_ms, "session.stage.profile");
        }

        self.cursor_open.store(true, Ordering::SeqCst);
        let tx = self.tx.as_mut().expect("ensure_init opens a transaction");
        let inner = cursor::assemble(tx, plan.scratch_prefix, plan.emit, bounds, last_update, caps);
        Ok(Box::pin(GuardedStream {
            inner,
            flag: self.cursor_open.clone(),
            finished: false,
        }))
    }
}

fn union_bbox_rect(bboxes: &[BboxSelector]) -> Option<Rect> {
    bboxes.iter().fold(None, |acc, b| {
        let rect = Rect {
            left: b.left(),
            right: b.right(),
            bottom: b.bottom(),
            top: b.top(),
        };
        Some(match acc {
            None => rect,
            Some(a) => Rect {
                left: a.left.min(rect.left),
                right: a.right.max(rect.right),
                bottom: a.bottom.min(rect.bottom),
                top: a.top.max(rect.top),
            },
        })
    })
}

/// Wraps the assembled stream so that `flag` is always cleared once the
/// cursor goes away, however that happens. Closing a stream before it's
/// exhausted is a normal, supported way to free resources early (§5); it
/// must free the session for reuse, not poison it — only a cursor that is
/// still alive (and therefore still borrowing `&mut Session`, which the
/// borrow checker already forbids a second `iterate_*` call against) is a
/// lifecycle violation.
struct GuardedStream<'c> {
    inner: BoxStream<'c, Result<StreamItem>>,
    flag: Arc<AtomicBool>,
    finished: bool,
}

impl<'c> Stream for GuardedStream<'c> {
    type Item = Result<StreamItem>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let poll = this.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = poll {
            this.finished = true;
            this.flag.store(false, Ordering::SeqCst);
        }
        poll
    }
}

impl<'c> Drop for GuardedStream<'c> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("session.cursor.closed_before_drain");
        }
        self.flag.store(false, Ordering::SeqCst);
    }
}
