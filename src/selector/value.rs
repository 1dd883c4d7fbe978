//! Typed parameter values bound positionally into generated SQL.

/// A value bound to one `$N` placeholder. Kept as an enum (rather than
/// reaching for `sqlx::query!` macros, which require compile-time-known
/// SQL) because every statement in this crate is assembled dynamically from
/// selector fragments and plan stages.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Text, used for tag keys/values.
    Text(String),
    /// 64-bit float, used for bbox coordinates and numeric tag comparisons.
    F64(f64),
    /// 64-bit signed integer, used for entity ids.
    I64(i64),
}

impl SqlValue {
    /// Binds this value onto a dynamically-built query.
    pub(crate) fn bind<'q>(
        &'q self,
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        match self {
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::F64(f) => query.bind(f),
            SqlValue::I64(i) => query.bind(i),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::F64(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::I64(value)
    }
}

impl From<u64> for SqlValue {
    fn from(value: u64) -> Self {
        SqlValue::I64(value as i64)
    }
}

/// Binds a full parameter list onto a dynamically-built query, in order.
pub(crate) fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &'q [SqlValue],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = param.bind(query);
    }
    query
}
