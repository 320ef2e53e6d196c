//! Structured statements handed to a [`crate::executor::SqlExecutor`].
//!
//! Identifiers (tables, columns) come from the wired entity graph only; values always
//! travel as parameters.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One result row: column name -> JSON value, in select order.
pub type Row = serde_json::Map<String, Value>;

/// Column reference, optionally qualified by table. Unqualified references in
/// predicates resolve against the statement's main table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(column: impl Into<String>) -> Self {
        ColumnRef {
            table: None,
            column: column.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    /// `"table.column"` or `"column"`.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((t, c)) => ColumnRef::qualified(t, c),
            None => ColumnRef::new(s),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(s: &str) -> Self {
        ColumnRef::parse(s)
    }
}

impl From<String> for ColumnRef {
    fn from(s: String) -> Self {
        ColumnRef::parse(&s)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(t) => write!(f, "{}.{}", t, self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// WHERE predicate. `Raw` is passed through verbatim (with `?` placeholders) and is
/// only understood by SQL backends.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Eq(ColumnRef, Value),
    NotEq(ColumnRef, Value),
    In(ColumnRef, Vec<Value>),
    IsNull(ColumnRef),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Raw { sql: String, params: Vec<Value> },
}

impl Predicate {
    pub fn eq(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        Predicate::Eq(column.into(), value.into())
    }

    pub fn not_eq(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        Predicate::NotEq(column.into(), value.into())
    }

    pub fn in_list(column: impl Into<ColumnRef>, values: Vec<Value>) -> Self {
        Predicate::In(column.into(), values)
    }

    pub fn is_null(column: impl Into<ColumnRef>) -> Self {
        Predicate::IsNull(column.into())
    }

    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Predicate::Raw {
            sql: sql.into(),
            params,
        }
    }

    /// Equality on every pair, AND-ed.
    pub fn all_eq<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        Predicate::And(
            pairs
                .into_iter()
                .map(|(c, v)| Predicate::Eq(ColumnRef::new(c), v.clone()))
                .collect(),
        )
    }

    /// AND two predicates, flattening nested conjunctions.
    pub fn and(self, other: Predicate) -> Predicate {
        let mut parts = match self {
            Predicate::And(v) => v,
            p => vec![p],
        };
        match other {
            Predicate::And(v) => parts.extend(v),
            p => parts.push(p),
        }
        Predicate::And(parts)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            other => Err(format!("invalid sort order: {} (expected ASC or DESC)", other)),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        })
    }
}

/// ORDER BY term. An unqualified column names an output column of the select.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub order: SortOrder,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Columns {
    #[default]
    All,
    List(Vec<String>),
}

/// INNER JOIN `table` ON `table.column = to`, selecting `columns` as (column, alias).
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub table: String,
    pub column: String,
    pub to: ColumnRef,
    pub columns: Vec<(String, String)>,
}

/// Casts applied to parameters bound against a column (e.g. `timestamptz`).
pub type Casts = BTreeMap<String, String>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Select {
    pub table: String,
    pub columns: Columns,
    pub joins: Vec<Join>,
    pub filter: Option<Predicate>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub casts: Casts,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Select {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Project only `columns`; an empty list keeps every column.
    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = if columns.is_empty() {
            Columns::All
        } else {
            Columns::List(columns)
        };
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Add a predicate, AND-ed with any existing one.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<ColumnRef>, order: SortOrder) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            order,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn casts(mut self, casts: Casts) -> Self {
        self.casts = casts;
        self
    }

    /// Same statement without ordering or slicing, as counted by a paginator.
    pub fn unsliced(&self) -> Select {
        Select {
            order: Vec::new(),
            limit: None,
            offset: None,
            ..self.clone()
        }
    }
}

/// INSERT; `returning` names the key columns reported back (the last inserted identifier).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Insert {
    pub table: String,
    pub values: Row,
    pub returning: Vec<String>,
    pub casts: Casts,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub table: String,
    pub set: Row,
    pub filter: Predicate,
    pub casts: Casts,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Delete {
    pub table: String,
    pub filter: Predicate,
    pub casts: Casts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_ref_parse() {
        assert_eq!(ColumnRef::parse("muscle.name"), ColumnRef::qualified("muscle", "name"));
        assert_eq!(ColumnRef::parse("name"), ColumnRef::new("name"));
    }

    #[test]
    fn and_flattens() {
        let p = Predicate::eq("a", 1).and(Predicate::eq("b", 2)).and(Predicate::is_null("c"));
        match p {
            Predicate::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn select_filter_combines() {
        let s = Select::from("workout")
            .filter(Predicate::eq("id", 1))
            .filter(Predicate::eq("muscle_id", 2));
        assert_eq!(
            s.filter,
            Some(Predicate::And(vec![
                Predicate::eq("id", 1),
                Predicate::eq("muscle_id", 2)
            ]))
        );
    }

    #[test]
    fn sort_order_parses_case_insensitive() {
        assert_eq!("desc".parse::<SortOrder>(), Ok(SortOrder::Desc));
        assert_eq!(" ASC ".parse::<SortOrder>(), Ok(SortOrder::Asc));
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn unsliced_drops_order_and_limits() {
        let s = Select::from("t").order_by("name", SortOrder::Asc).limit(5).offset(10);
        let u = s.unsliced();
        assert!(u.order.is_empty());
        assert_eq!(u.limit, None);
        assert_eq!(u.offset, None);
        assert_eq!(u.table, "t");
    }
}
