//! Selector model: bounding-box and attribute predicates that compose into
//! the `WHERE` clause of a materialization stage.
//!
//! Each selector emits a SQL predicate fragment with positional parameter
//! placeholders (`$1`, `$2`, ...) plus the bound parameter values in the
//! same order. A list of selectors composes by `OR`; a bbox list and an
//! attribute list compose by `AND`. An empty list degenerates to the
//! tautology `(1=1)` and is left for the store's own planner to optimize
//! away.

mod attr;
mod bbox;
mod value;

pub use attr::{AttrSelector, NumericOp};
pub use bbox::BboxSelector;
pub use value::SqlValue;
pub(crate) use value::bind_all;

use crate::error::{Result, SelectorError};

/// Which geometry column a bounding-box predicate should be compiled
/// against. The selector itself stays oblivious to this; the planner picks
/// it based on the query kind it's assembling a stage for (§4.1, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryColumn {
    /// `nodes.geom`.
    NodeGeom,
    /// `ways.linestring`.
    WayLinestring,
}

impl GeometryColumn {
    fn sql_name(self) -> &'static str {
        match self {
            GeometryColumn::NodeGeom => "geom",
            GeometryColumn::WayLinestring => "linestring",
        }
    }
}

/// A fragment of SQL plus the parameter values it binds, threaded through a
/// shared parameter counter so that multiple selectors can be combined into
/// one statement with correctly numbered placeholders.
pub struct Fragment {
    /// The `WHERE`-clause-ready SQL text.
    pub sql: String,
    /// Parameter values in the order their placeholders appear in `sql`.
    pub params: Vec<SqlValue>,
}

/// Running counter used to number `$N` placeholders across a statement
/// assembled from multiple selector fragments.
#[derive(Debug, Default)]
pub struct ParamCounter(usize);

impl ParamCounter {
    /// Starts counting from `$1`.
    pub fn new() -> Self {
        Self(0)
    }

    /// Returns the next placeholder (e.g. `$1`) and advances the counter.
    pub fn next_placeholder(&mut self) -> String {
        self.0 += 1;
        format!("${}", self.0)
    }
}

/// Combined bbox + attribute selector lists for one query.
#[derive(Debug, Clone, Default)]
pub struct Selectors {
    /// Bounding-box selectors, composed with `OR`.
    pub bboxes: Vec<BboxSelector>,
    /// Attribute selectors, composed with `OR`.
    pub attrs: Vec<AttrSelector>,
}

impl Selectors {
    /// Validates every selector in both lists.
    pub fn validate(&self) -> Result<()> {
        for bbox in &self.bboxes {
            bbox.validate()?;
        }
        for attr in &self.attrs {
            attr.validate()?;
        }
        Ok(())
    }

    /// Builds the combined `(bbox-predicate) AND (attr-predicate)` fragment
    /// for the given geometry column, numbering placeholders from `counter`.
    ///
    /// An empty selector list degenerates to `(1=1)`, per §4.1.
    pub fn predicate_fragment(&self, geom: GeometryColumn, counter: &mut ParamCounter) -> Fragment {
        let bbox_frag = or_join(
            self.bboxes
                .iter()
                .map(|b| b.predicate_fragment(geom.sql_name(), counter)),
        );
        let attr_frag = or_join(self.attrs.iter().map(|a| a.predicate_fragment(counter)));

        let mut params = bbox_frag.params;
        params.extend(attr_frag.params);
        Fragment {
            sql: format!("({}) AND ({})", bbox_frag.sql, attr_frag.sql),
            params,
        }
    }
}

fn or_join(fragments: impl Iterator<Item = Fragment>) -> Fragment {
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for frag in fragments {
        parts.push(frag.sql);
        params.extend(frag.params);
    }
    if parts.is_empty() {
        return Fragment {
            sql: "1=1".to_string(),
            params,
        };
    }
    Fragment {
        sql: parts.join(" OR "),
        params,
    }
}

pub(crate) fn validate_bbox(left: f64, right: f64, bottom: f64, top: f64) -> Result<()> {
    if left >= right || bottom >= top {
        return Err(SelectorError::DegenerateBbox {
            left,
            right,
            bottom,
            top,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selectors_degenerate_to_tautology() {
        let selectors = Selectors::default();
        let mut counter = ParamCounter::new();
        let frag = selectors.predicate_fragment(GeometryColumn::NodeGeom, &mut counter);
        assert_eq!(frag.sql, "(1=1) AND (1=1)");
        assert!(frag.params.is_empty());
    }

    #[test]
    fn placeholder_numbering_is_shared_across_lists() {
        let selectors = Selectors {
            bboxes: vec![BboxSelector::new(-1.0, 1.0, -1.0, 1.0).unwrap()],
            attrs: vec![AttrSelector::tag_eq("amenity", "cafe")],
        };
        let mut counter = ParamCounter::new();
        let frag = selectors.predicate_fragment(GeometryColumn::WayLinestring, &mut counter);
        assert!(frag.sql.contains("linestring"));
        assert_eq!(frag.params.len(), 6);
    }
}
