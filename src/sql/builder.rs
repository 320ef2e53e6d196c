//! Renders structured statements as parameterized PostgreSQL.

use crate::sql::query::{Casts, ColumnRef, Columns, Delete, Insert, Predicate, Select, SortOrder, Update};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from the entity graph).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Table name, schema-qualified when a schema is configured.
fn qualified_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(s) => format!("{}.{}", quoted(s), quoted(table)),
        None => quoted(table),
    }
}

fn qualified_column(main_table: &str, c: &ColumnRef) -> String {
    let table = c.table.as_deref().unwrap_or(main_table);
    format!("{}.{}", quoted(table), quoted(&c.column))
}

#[derive(Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a parameter bound against `column`; returns its placeholder (with cast if configured).
    fn placeholder(&mut self, v: Value, column: &str, casts: &Casts) -> String {
        let n = self.push_param(v);
        casts
            .get(column)
            .map(|t| format!("${}::{}", n, t))
            .unwrap_or_else(|| format!("${}", n))
    }
}

fn render_predicate(q: &mut QueryBuf, p: &Predicate, main_table: &str, casts: &Casts) -> String {
    match p {
        Predicate::Eq(c, Value::Null) | Predicate::IsNull(c) => {
            format!("{} IS NULL", qualified_column(main_table, c))
        }
        Predicate::NotEq(c, Value::Null) => format!("{} IS NOT NULL", qualified_column(main_table, c)),
        Predicate::Eq(c, v) => {
            let ph = q.placeholder(v.clone(), &c.column, casts);
            format!("{} = {}", qualified_column(main_table, c), ph)
        }
        Predicate::NotEq(c, v) => {
            let ph = q.placeholder(v.clone(), &c.column, casts);
            format!("{} <> {}", qualified_column(main_table, c), ph)
        }
        Predicate::In(_, values) if values.is_empty() => "1 = 0".to_string(),
        Predicate::In(c, values) => {
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| q.placeholder(v.clone(), &c.column, casts))
                .collect();
            format!("{} IN ({})", qualified_column(main_table, c), placeholders.join(", "))
        }
        Predicate::And(parts) => render_junction(q, parts, " AND ", "1 = 1", main_table, casts),
        Predicate::Or(parts) => render_junction(q, parts, " OR ", "1 = 0", main_table, casts),
        Predicate::Raw { sql, params } => {
            let mut out = String::with_capacity(sql.len());
            let mut params = params.iter();
            for ch in sql.chars() {
                if ch == '?' {
                    if let Some(v) = params.next() {
                        let n = q.push_param(v.clone());
                        out.push_str(&format!("${}", n));
                        continue;
                    }
                }
                out.push(ch);
            }
            format!("({})", out)
        }
    }
}

fn render_junction(
    q: &mut QueryBuf,
    parts: &[Predicate],
    sep: &str,
    empty: &str,
    main_table: &str,
    casts: &Casts,
) -> String {
    match parts {
        [] => empty.to_string(),
        [single] => render_predicate(q, single, main_table, casts),
        many => {
            let rendered: Vec<String> = many
                .iter()
                .map(|p| render_predicate(q, p, main_table, casts))
                .collect();
            format!("({})", rendered.join(sep))
        }
    }
}

/// FROM + JOIN + WHERE, shared by select and count.
fn render_from_where(q: &mut QueryBuf, s: &Select, schema: Option<&str>) -> String {
    let mut sql = format!(" FROM {}", qualified_table(schema, &s.table));
    for j in &s.joins {
        sql.push_str(&format!(
            " INNER JOIN {} ON {}.{} = {}",
            qualified_table(schema, &j.table),
            quoted(&j.table),
            quoted(&j.column),
            qualified_column(&s.table, &j.to)
        ));
    }
    if let Some(filter) = &s.filter {
        let w = render_predicate(q, filter, &s.table, &s.casts);
        sql.push_str(&format!(" WHERE {}", w));
    }
    sql
}

fn select_list(s: &Select) -> String {
    let mut parts = match &s.columns {
        Columns::All => vec![format!("{}.*", quoted(&s.table))],
        Columns::List(cols) => cols
            .iter()
            .map(|c| format!("{}.{}", quoted(&s.table), quoted(c)))
            .collect(),
    };
    for j in &s.joins {
        for (col, alias) in &j.columns {
            parts.push(format!("{}.{} AS {}", quoted(&j.table), quoted(col), quoted(alias)));
        }
    }
    parts.join(", ")
}

/// SELECT with joins, filter, ORDER BY and LIMIT/OFFSET.
pub fn render_select(s: &Select, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let from_where = render_from_where(&mut q, s, schema);
    let order_clause = if s.order.is_empty() {
        String::new()
    } else {
        let terms: Vec<String> = s
            .order
            .iter()
            .map(|o| {
                let col = match &o.column.table {
                    Some(_) => qualified_column(&s.table, &o.column),
                    None => quoted(&o.column.column),
                };
                match o.order {
                    SortOrder::Asc => format!("{} ASC", col),
                    SortOrder::Desc => format!("{} DESC", col),
                }
            })
            .collect();
        format!(" ORDER BY {}", terms.join(", "))
    };
    let limit_clause = s.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = s.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {}{}{}{}{}",
        select_list(s),
        from_where,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// COUNT(*) over the same FROM/JOIN/WHERE, ignoring ordering and slicing.
pub fn render_count(s: &Select, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let from_where = render_from_where(&mut q, s, schema);
    q.sql = format!("SELECT COUNT(*) AS {}{}", quoted("count"), from_where);
    q
}

/// INSERT ... RETURNING the requested key columns (all columns when none requested).
pub fn render_insert(i: &Insert, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &i.table);
    let returning = if i.returning.is_empty() {
        "*".to_string()
    } else {
        i.returning.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(", ")
    };
    if i.values.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning);
        return q;
    }
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (name, v) in &i.values {
        cols.push(quoted(name));
        placeholders.push(q.placeholder(v.clone(), name, &i.casts));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        table,
        cols.join(", "),
        placeholders.join(", "),
        returning
    );
    q
}

/// UPDATE ... SET each column in `set` WHERE filter. Caller ensures `set` is non-empty.
pub fn render_update(u: &Update, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &u.table);
    let sets: Vec<String> = u
        .set
        .iter()
        .map(|(k, v)| {
            let rhs = q.placeholder(v.clone(), k, &u.casts);
            format!("{} = {}", quoted(k), rhs)
        })
        .collect();
    let w = render_predicate(&mut q, &u.filter, &u.table, &u.casts);
    q.sql = format!("UPDATE {} SET {} WHERE {}", table, sets.join(", "), w);
    q
}

pub fn render_delete(d: &Delete, schema: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, &d.table);
    let w = render_predicate(&mut q, &d.filter, &d.table, &d.casts);
    q.sql = format!("DELETE FROM {} WHERE {}", table, w);
    q
}
