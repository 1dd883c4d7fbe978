//! Bounding-box selector: a rectangle in unprojected (lon/lat) degrees,
//! addressing either the node-geometry or polyline-geometry column.

use super::{validate_bbox, Fragment, ParamCounter, SqlValue};
use crate::error::Result;

/// Four doubles (`left < right`, `bottom < top`, degrees, unprojected)
/// compiled into a single `ST_Intersects` predicate against a
/// store-constructed polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BboxSelector {
    left: f64,
    right: f64,
    bottom: f64,
    top: f64,
}

impl BboxSelector {
    /// Builds a selector, validating the box eagerly so that malformed
    /// input fails before any store interaction (§4.1).
    pub fn new(left: f64, right: f64, bottom: f64, top: f64) -> Result<Self> {
        validate_bbox(left, right, bottom, top)?;
        Ok(Self {
            left,
            right,
            bottom,
            top,
        })
    }

    /// Re-validates the box. Useful when a selector was constructed via
    /// `Clone`/deserialization and the caller wants a fresh check before
    /// using it again.
    pub fn validate(&self) -> Result<()> {
        validate_bbox(self.left, self.right, self.bottom, self.top)
    }

    pub(crate) fn left(&self) -> f64 {
        self.left
    }
    pub(crate) fn right(&self) -> f64 {
        self.right
    }
    pub(crate) fn bottom(&self) -> f64 {
        self.bottom
    }
    pub(crate) fn top(&self) -> f64 {
        self.top
    }

    /// Emits `ST_Intersects(<geom_col>, ST_MakeEnvelope($a,$b,$c,$d,4326))`.
    ///
    /// `geom_col` is a plain function argument, not a textual substitution
    /// into a template string — the structural rewrite from `geom` to
    /// `linestring` that the planner performs (§4.4, §9) is just a matter
    /// of which column name it passes in here.
    pub fn predicate_fragment(&self, geom_col: &str, counter: &mut ParamCounter) -> Fragment {
        let p_left = counter.next_placeholder();
        let p_bottom = counter.next_placeholder();
        let p_right = counter.next_placeholder();
        let p_top = counter.next_placeholder();
        Fragment {
            sql: format!(
                "ST_Intersects({geom_col}, ST_MakeEnvelope({p_left}, {p_bottom}, {p_right}, {p_top}, 4326))"
            ),
            params: vec![
                SqlValue::F64(self.left),
                SqlValue::F64(self.bottom),
                SqlValue::F64(self.right),
                SqlValue::F64(self.top),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_box() {
        assert!(BboxSelector::new(1.0, -1.0, -1.0, 1.0).is_err());
        assert!(BboxSelector::new(-1.0, 1.0, 1.0, -1.0).is_err());
        assert!(BboxSelector::new(0.0, 0.0, -1.0, 1.0).is_err());
    }

    #[test]
    fn fragment_uses_supplied_column_name() {
        let bbox = BboxSelector::new(-1.0, 1.0, -2.0, 2.0).unwrap();
        let mut counter = ParamCounter::new();
        let frag = bbox.predicate_fragment("linestring", &mut counter);
        assert!(frag.sql.contains("linestring"));
        assert!(frag.sql.contains("$1"));
        assert_eq!(frag.params.len(), 4);
    }
}
