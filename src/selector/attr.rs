//! Attribute selector: equality, presence, numeric comparison, and
//! free-form disjunction over the entity's tag map.

use super::{Fragment, ParamCounter, SqlValue};
use crate::error::{Result, SelectorError};

/// Numeric comparison operators supported by [`AttrSelector::NumericCmp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl NumericOp {
    /// Parses the textual form accepted from configuration/caller input.
    /// Anything else is a malformed operator (§4.1).
    pub fn parse(op: &str) -> Result<Self> {
        match op {
            "<" => Ok(NumericOp::Lt),
            "<=" => Ok(NumericOp::Le),
            ">" => Ok(NumericOp::Gt),
            ">=" => Ok(NumericOp::Ge),
            other => Err(SelectorError::MalformedOperator { op: other.to_string() }.into()),
        }
    }

    fn sql(self) -> &'static str {
        match self {
            NumericOp::Lt => "<",
            NumericOp::Le => "<=",
            NumericOp::Gt => ">",
            NumericOp::Ge => ">=",
        }
    }
}

/// Attribute (tag) predicate variants. Combined with other `AttrSelector`s
/// in a list by `OR`; `Or` itself nests a further disjunction so callers can
/// express "any of these conditions" inline without restructuring the outer
/// list.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrSelector {
    /// `tags[key] = value`.
    Eq {
        /// Tag key.
        key: String,
        /// Tag value to match.
        value: String,
    },
    /// `key` is present in the tag map (value may be anything, including
    /// an empty string).
    Exists {
        /// Tag key.
        key: String,
    },
    /// Numeric comparison against a tag's value, cast to `double precision`.
    NumericCmp {
        /// Tag key.
        key: String,
        /// Comparison operator.
        op: NumericOp,
        /// Right-hand side value.
        value: f64,
    },
    /// Disjunction of nested selectors.
    Or(Vec<AttrSelector>),
}

impl AttrSelector {
    /// Convenience constructor for [`AttrSelector::Eq`].
    pub fn tag_eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        AttrSelector::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Convenience constructor for [`AttrSelector::Exists`].
    pub fn tag_exists(key: impl Into<String>) -> Self {
        AttrSelector::Exists { key: key.into() }
    }

    /// Convenience constructor for [`AttrSelector::NumericCmp`] that parses
    /// the operator, surfacing `InvalidSelector` on a malformed symbol.
    pub fn numeric_cmp(key: impl Into<String>, op: &str, value: f64) -> Result<Self> {
        Ok(AttrSelector::NumericCmp {
            key: key.into(),
            op: NumericOp::parse(op)?,
            value,
        })
    }

    /// Validates that every key referenced is non-empty and, for
    /// [`AttrSelector::NumericCmp`], that the operator parses (it always
    /// does when constructed via [`Self::numeric_cmp`], but a selector
    /// built by hand — e.g. deserialized from an external request — is
    /// re-checked here too).
    pub fn validate(&self) -> Result<()> {
        match self {
            AttrSelector::Eq { key, .. } | AttrSelector::Exists { key } | AttrSelector::NumericCmp { key, .. } => {
                if key.is_empty() {
                    return Err(SelectorError::EmptyKey.into());
                }
                Ok(())
            }
            AttrSelector::Or(children) => {
                for child in children {
                    child.validate()?;
                }
                Ok(())
            }
        }
    }

    /// Emits the predicate fragment for this selector, numbering
    /// placeholders from `counter`.
    pub fn predicate_fragment(&self, counter: &mut ParamCounter) -> Fragment {
        match self {
            AttrSelector::Eq { key, value } => {
                let p_key = counter.next_placeholder();
                let p_value = counter.next_placeholder();
                Fragment {
                    sql: format!("tags -> {p_key} = {p_value}"),
                    params: vec![SqlValue::Text(key.clone()), SqlValue::Text(value.clone())],
                }
            }
            AttrSelector::Exists { key } => {
                let p_key = counter.next_placeholder();
                Fragment {
                    sql: format!("tags ? {p_key}"),
                    params: vec![SqlValue::Text(key.clone())],
                }
            }
            AttrSelector::NumericCmp { key, op, value } => {
                let p_key = counter.next_placeholder();
                let p_value = counter.next_placeholder();
                Fragment {
                    sql: format!("(tags -> {p_key})::double precision {} {p_value}", op.sql()),
                    params: vec![SqlValue::Text(key.clone()), SqlValue::F64(*value)],
                }
            }
            AttrSelector::Or(children) => {
                if children.is_empty() {
                    return Fragment {
                        sql: "1=1".to_string(),
                        params: Vec::new(),
                    };
                }
                let mut parts = Vec::new();
                let mut params = Vec::new();
                for child in children {
                    let frag = child.predicate_fragment(counter);
                    parts.push(frag.sql);
                    params.extend(frag.params);
                }
                Fragment {
                    sql: format!("({})", parts.join(" OR ")),
                    params,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_operator() {
        assert!(AttrSelector::numeric_cmp("width", "<>", 1.0).is_err());
    }

    #[test]
    fn rejects_empty_key() {
        let sel = AttrSelector::tag_eq("", "x");
        assert!(sel.validate().is_err());
    }

    #[test]
    fn eq_fragment_binds_key_then_value() {
        let sel = AttrSelector::tag_eq("amenity", "cafe");
        let mut counter = ParamCounter::new();
        let frag = sel.predicate_fragment(&mut counter);
        assert_eq!(frag.sql, "tags -> $1 = $2");
        assert_eq!(
            frag.params,
            vec![SqlValue::Text("amenity".into()), SqlValue::Text("cafe".into())]
        );
    }
}
