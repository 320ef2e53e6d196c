//! In-memory executor for tests and prototyping.
//!
//! Tables are schemaless lists of rows. A table may declare an auto-increment key,
//! required (NOT NULL) columns, unique column sets and restricting foreign keys, which
//! is enough to reproduce the constraint failures a real backend reports.

use crate::error::BackendError;
use crate::executor::SqlExecutor;
use crate::sql::{Columns, ColumnRef, Delete, Insert, Predicate, Row, Select, SortOrder, Update};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Debug, Default)]
struct MemTable {
    key: Option<String>,
    next_id: i64,
    required: Vec<String>,
    unique: Vec<Vec<String>>,
    rows: Vec<Row>,
}

/// `table.column` must match an existing `references.column` row; deleting a referenced row fails.
#[derive(Clone, Debug)]
struct ForeignKey {
    table: String,
    column: String,
    references: String,
    references_column: String,
}

#[derive(Clone, Debug, Default)]
struct Tables {
    tables: HashMap<String, MemTable>,
    foreign_keys: Vec<ForeignKey>,
}

/// Executor over in-process tables guarded by a lock.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    inner: RwLock<Tables>,
}

type Combo<'a> = Vec<(&'a str, &'a Row)>;

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Create (or reset) a table. `key` names an auto-increment column filled on insert when absent.
    pub fn create_table(&self, name: &str, key: Option<&str>) -> &Self {
        self.write().tables.insert(
            name.to_string(),
            MemTable {
                key: key.map(String::from),
                next_id: 1,
                ..Default::default()
            },
        );
        self
    }

    /// Reject inserts/updates that leave `column` null.
    pub fn require(&self, table: &str, column: &str) -> &Self {
        if let Some(t) = self.write().tables.get_mut(table) {
            t.required.push(column.to_string());
        }
        self
    }

    /// Reject rows duplicating another row on all of `columns`.
    pub fn unique(&self, table: &str, columns: &[&str]) -> &Self {
        if let Some(t) = self.write().tables.get_mut(table) {
            t.unique.push(columns.iter().map(|c| c.to_string()).collect());
        }
        self
    }

    /// Restricting foreign key: `table.column` references `references.references_column`.
    pub fn foreign_key(&self, table: &str, column: &str, references: &str, references_column: &str) -> &Self {
        self.write().foreign_keys.push(ForeignKey {
            table: table.to_string(),
            column: column.to_string(),
            references: references.to_string(),
            references_column: references_column.to_string(),
        });
        self
    }

    /// Current rows of `table` (empty if unknown).
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.read()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

fn table<'a>(tables: &'a Tables, name: &str) -> Result<&'a MemTable, BackendError> {
    tables
        .tables
        .get(name)
        .ok_or_else(|| BackendError::UnknownTable(name.to_string()))
}

/// Numbers compare numerically; a numeric string equals the number it spells.
fn values_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        _ => a == b,
    }
}

/// Nulls sort last ascending, like PostgreSQL.
fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(n), Value::Number(m)) => n
            .as_f64()
            .partial_cmp(&m.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(s), Value::String(t)) => s.cmp(t),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn lookup(combo: &Combo<'_>, c: &ColumnRef, main_table: &str) -> Value {
    let table = c.table.as_deref().unwrap_or(main_table);
    combo
        .iter()
        .find(|(t, _)| *t == table)
        .and_then(|(_, row)| row.get(&c.column))
        .cloned()
        .unwrap_or(Value::Null)
}

fn eval(p: &Predicate, combo: &Combo<'_>, main_table: &str) -> Result<bool, BackendError> {
    Ok(match p {
        Predicate::Eq(c, Value::Null) | Predicate::IsNull(c) => lookup(combo, c, main_table).is_null(),
        Predicate::NotEq(c, Value::Null) => !lookup(combo, c, main_table).is_null(),
        Predicate::Eq(c, v) => {
            let got = lookup(combo, c, main_table);
            !got.is_null() && values_eq(&got, v)
        }
        Predicate::NotEq(c, v) => {
            let got = lookup(combo, c, main_table);
            !got.is_null() && !values_eq(&got, v)
        }
        Predicate::In(c, values) => {
            let got = lookup(combo, c, main_table);
            !got.is_null() && values.iter().any(|v| values_eq(&got, v))
        }
        Predicate::And(parts) => {
            for part in parts {
                if !eval(part, combo, main_table)? {
                    return Ok(false);
                }
            }
            true
        }
        Predicate::Or(parts) => {
            for part in parts {
                if eval(part, combo, main_table)? {
                    return Ok(true);
                }
            }
            false
        }
        Predicate::Raw { .. } => return Err(BackendError::Unsupported("raw predicates")),
    })
}

fn matches(filter: Option<&Predicate>, combo: &Combo<'_>, main_table: &str) -> Result<bool, BackendError> {
    match filter {
        Some(p) => eval(p, combo, main_table),
        None => Ok(true),
    }
}

/// Joined and filtered row combinations of a select, before projection.
fn combos<'a>(tables: &'a Tables, s: &'a Select) -> Result<Vec<Combo<'a>>, BackendError> {
    let main = table(tables, &s.table)?;
    let mut combos: Vec<Combo<'a>> = main.rows.iter().map(|r| vec![(s.table.as_str(), r)]).collect();
    for j in &s.joins {
        let joined = table(tables, &j.table)?;
        let mut next = Vec::new();
        for combo in &combos {
            let left = lookup(combo, &j.to, &s.table);
            if left.is_null() {
                continue;
            }
            for r in &joined.rows {
                if r.get(&j.column).is_some_and(|v| values_eq(v, &left)) {
                    let mut c = combo.clone();
                    c.push((j.table.as_str(), r));
                    next.push(c);
                }
            }
        }
        combos = next;
    }
    let mut out = Vec::with_capacity(combos.len());
    for combo in combos {
        if matches(s.filter.as_ref(), &combo, &s.table)? {
            out.push(combo);
        }
    }
    Ok(out)
}

fn project(s: &Select, combo: &Combo<'_>) -> Row {
    let mut row = match &s.columns {
        Columns::All => combo.first().map(|(_, r)| (*r).clone()).unwrap_or_default(),
        Columns::List(cols) => cols
            .iter()
            .map(|c| (c.clone(), lookup(combo, &ColumnRef::new(c.as_str()), &s.table)))
            .collect(),
    };
    for j in &s.joins {
        for (col, alias) in &j.columns {
            let v = lookup(combo, &ColumnRef::qualified(j.table.as_str(), col.as_str()), &s.table);
            row.insert(alias.clone(), v);
        }
    }
    row
}

fn run_select(tables: &Tables, s: &Select) -> Result<Vec<Row>, BackendError> {
    let mut rows: Vec<(Combo<'_>, Row)> = combos(tables, s)?
        .into_iter()
        .map(|c| {
            let projected = project(s, &c);
            (c, projected)
        })
        .collect();
    if !s.order.is_empty() {
        rows.sort_by(|(ca, ra), (cb, rb)| {
            for o in &s.order {
                let (a, b) = match &o.column.table {
                    Some(_) => (lookup(ca, &o.column, &s.table), lookup(cb, &o.column, &s.table)),
                    None => (
                        ra.get(&o.column.column).cloned().unwrap_or(Value::Null),
                        rb.get(&o.column.column).cloned().unwrap_or(Value::Null),
                    ),
                };
                let ord = match o.order {
                    SortOrder::Asc => cmp_values(&a, &b),
                    SortOrder::Desc => cmp_values(&b, &a),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
    let offset = s.offset.unwrap_or(0) as usize;
    let limit = s.limit.map(|n| n as usize).unwrap_or(usize::MAX);
    Ok(rows.into_iter().skip(offset).take(limit).map(|(_, r)| r).collect())
}

fn check_required(t: &MemTable, table_name: &str, row: &Row) -> Result<(), BackendError> {
    for col in &t.required {
        if row.get(col).map_or(true, Value::is_null) {
            return Err(BackendError::Constraint(format!(
                "null value in column \"{}\" of relation \"{}\"",
                col, table_name
            )));
        }
    }
    Ok(())
}

/// `skip` is the index of the row being replaced (updates), if any.
fn check_unique(t: &MemTable, table_name: &str, row: &Row, skip: Option<usize>) -> Result<(), BackendError> {
    let key_set: Option<Vec<String>> = t.key.clone().map(|k| vec![k]);
    for cols in key_set.iter().chain(t.unique.iter()) {
        if cols.iter().any(|c| row.get(c).map_or(true, Value::is_null)) {
            continue;
        }
        let clash = t.rows.iter().enumerate().any(|(i, other)| {
            Some(i) != skip
                && cols
                    .iter()
                    .all(|c| other.get(c).is_some_and(|v| row.get(c).is_some_and(|w| values_eq(v, w))))
        });
        if clash {
            return Err(BackendError::Constraint(format!(
                "duplicate key value violates unique constraint on \"{}\" ({})",
                table_name,
                cols.join(", ")
            )));
        }
    }
    Ok(())
}

fn check_references(tables: &Tables, table_name: &str, row: &Row) -> Result<(), BackendError> {
    for fk in tables.foreign_keys.iter().filter(|fk| fk.table == table_name) {
        let Some(v) = row.get(&fk.column).filter(|v| !v.is_null()) else { continue };
        let parent = table(tables, &fk.references)?;
        let found = parent
            .rows
            .iter()
            .any(|r| r.get(&fk.references_column).is_some_and(|p| values_eq(p, v)));
        if !found {
            return Err(BackendError::Constraint(format!(
                "insert or update on \"{}\" violates foreign key \"{}\" -> \"{}\"",
                table_name, fk.column, fk.references
            )));
        }
    }
    Ok(())
}

fn check_not_referenced(tables: &Tables, table_name: &str, row: &Row) -> Result<(), BackendError> {
    for fk in tables.foreign_keys.iter().filter(|fk| fk.references == table_name) {
        let Some(v) = row.get(&fk.references_column).filter(|v| !v.is_null()) else { continue };
        let referencing = tables.tables.get(&fk.table).is_some_and(|child| {
            child
                .rows
                .iter()
                .any(|r| r.get(&fk.column).is_some_and(|c| values_eq(c, v)))
        });
        if referencing {
            return Err(BackendError::Constraint(format!(
                "delete on \"{}\" violates foreign key \"{}\" on \"{}\"",
                table_name, fk.column, fk.table
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl SqlExecutor for MemoryExecutor {
    async fn select(&self, select: &Select) -> Result<Vec<Row>, BackendError> {
        tracing::debug!(table = %select.table, filter = ?select.filter, "memory select");
        run_select(&self.read(), select)
    }

    async fn count(&self, select: &Select) -> Result<u64, BackendError> {
        let tables = self.read();
        Ok(combos(&tables, select)?.len() as u64)
    }

    async fn insert(&self, insert: &Insert) -> Result<Row, BackendError> {
        tracing::debug!(table = %insert.table, values = ?insert.values, "memory insert");
        let mut guard = self.write();
        let tables = &mut *guard;
        let mut row = insert.values.clone();
        {
            let t = table(tables, &insert.table)?;
            if let Some(key) = &t.key {
                if row.get(key).map_or(true, Value::is_null) {
                    row.insert(key.clone(), Value::Number(t.next_id.into()));
                }
            }
            check_required(t, &insert.table, &row)?;
            check_unique(t, &insert.table, &row, None)?;
        }
        check_references(tables, &insert.table, &row)?;
        let t = tables
            .tables
            .get_mut(&insert.table)
            .ok_or_else(|| BackendError::UnknownTable(insert.table.clone()))?;
        if let Some(id) = t.key.as_ref().and_then(|k| row.get(k)).and_then(Value::as_i64) {
            t.next_id = t.next_id.max(id + 1);
        }
        t.rows.push(row.clone());
        if insert.returning.is_empty() {
            return Ok(row);
        }
        Ok(insert
            .returning
            .iter()
            .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
            .collect())
    }

    async fn update(&self, update: &Update) -> Result<u64, BackendError> {
        tracing::debug!(table = %update.table, set = ?update.set, filter = ?update.filter, "memory update");
        let mut guard = self.write();
        let tables = &mut *guard;
        let mut changed: Vec<(usize, Row)> = Vec::new();
        {
            let t = table(tables, &update.table)?;
            for (i, row) in t.rows.iter().enumerate() {
                let combo: Combo<'_> = vec![(update.table.as_str(), row)];
                if !eval(&update.filter, &combo, &update.table)? {
                    continue;
                }
                let mut next = row.clone();
                for (k, v) in &update.set {
                    next.insert(k.clone(), v.clone());
                }
                check_required(t, &update.table, &next)?;
                check_unique(t, &update.table, &next, Some(i))?;
                check_references(tables, &update.table, &next)?;
                changed.push((i, next));
            }
        }
        let n = changed.len() as u64;
        if let Some(t) = tables.tables.get_mut(&update.table) {
            for (i, row) in changed {
                t.rows[i] = row;
            }
        }
        Ok(n)
    }

    async fn delete(&self, delete: &Delete) -> Result<u64, BackendError> {
        tracing::debug!(table = %delete.table, filter = ?delete.filter, "memory delete");
        let mut guard = self.write();
        let tables = &mut *guard;
        let mut doomed = Vec::new();
        {
            let t = table(tables, &delete.table)?;
            for (i, row) in t.rows.iter().enumerate() {
                let combo: Combo<'_> = vec![(delete.table.as_str(), row)];
                if eval(&delete.filter, &combo, &delete.table)? {
                    check_not_referenced(tables, &delete.table, row)?;
                    doomed.push(i);
                }
            }
        }
        let n = doomed.len() as u64;
        if let Some(t) = tables.tables.get_mut(&delete.table) {
            let mut i = 0;
            t.rows.retain(|_| {
                let keep = !doomed.contains(&i);
                i += 1;
                keep
            });
        }
        Ok(n)
    }

    /// A copy of the current tables; later writes are not visible through it.
    async fn begin_read(&self) -> Result<Option<Box<dyn SqlExecutor>>, BackendError> {
        let snapshot = self.read().clone();
        Ok(Some(Box::new(MemoryExecutor {
            inner: RwLock::new(snapshot),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Join;
    use serde_json::json;

    fn row(v: Value) -> Row {
        match v {
            Value::Object(m) => m,
            _ => Row::new(),
        }
    }

    fn insert(table: &str, v: Value) -> Insert {
        Insert {
            table: table.into(),
            values: row(v),
            returning: vec!["id".into()],
            casts: Default::default(),
        }
    }

    async fn gym() -> MemoryExecutor {
        let db = MemoryExecutor::new();
        db.create_table("muscle", Some("id"));
        db.create_table("workout", Some("id"));
        db.require("workout", "name");
        db.foreign_key("workout", "muscle_id", "muscle", "id");
        db.insert(&insert("muscle", json!({"name": "Chest"}))).await.unwrap();
        db.insert(&insert("muscle", json!({"name": "Back"}))).await.unwrap();
        db.insert(&insert("workout", json!({"name": "Push", "muscle_id": 1}))).await.unwrap();
        db.insert(&insert("workout", json!({"name": "Pull", "muscle_id": 2}))).await.unwrap();
        db.insert(&insert("workout", json!({"name": "Flies", "muscle_id": 1}))).await.unwrap();
        db
    }

    #[tokio::test]
    async fn insert_assigns_increasing_keys() {
        let db = MemoryExecutor::new();
        db.create_table("muscle", Some("id"));
        let a = db.insert(&insert("muscle", json!({"name": "Legs"}))).await.unwrap();
        let b = db.insert(&insert("muscle", json!({"id": 10, "name": "Arms"}))).await.unwrap();
        let c = db.insert(&insert("muscle", json!({"name": "Core"}))).await.unwrap();
        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(10));
        assert_eq!(c["id"], json!(11));
    }

    #[tokio::test]
    async fn select_joins_filters_and_orders() {
        let db = gym().await;
        let s = Select::from("workout")
            .join(Join {
                table: "muscle".into(),
                column: "id".into(),
                to: ColumnRef::new("muscle_id"),
                columns: vec![("name".into(), "muscle_name".into())],
            })
            .filter(Predicate::eq("muscle_id", 1))
            .order_by("name", SortOrder::Asc);
        let rows = db.select(&s).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("Flies"), json!("Push")]);
        assert!(rows.iter().all(|r| r["muscle_name"] == json!("Chest")));
        assert_eq!(db.count(&s).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn limit_and_offset_slice_after_ordering() {
        let db = gym().await;
        let s = Select::from("workout").order_by("name", SortOrder::Desc).limit(1).offset(1);
        let rows = db.select(&s).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Pull"));
    }

    #[tokio::test]
    async fn raw_predicates_are_unsupported() {
        let db = gym().await;
        let s = Select::from("workout").filter(Predicate::raw("name LIKE ?", vec![json!("P%")]));
        assert!(matches!(db.select(&s).await, Err(BackendError::Unsupported(_))));
    }

    #[tokio::test]
    async fn constraints_are_enforced() {
        let db = gym().await;
        let missing = db.insert(&insert("workout", json!({"muscle_id": 1}))).await;
        assert!(matches!(missing, Err(BackendError::Constraint(_))));
        let dangling = db.insert(&insert("workout", json!({"name": "Dips", "muscle_id": 99}))).await;
        assert!(matches!(dangling, Err(BackendError::Constraint(_))));
        let dup = db.insert(&insert("muscle", json!({"id": 1, "name": "Again"}))).await;
        assert!(matches!(dup, Err(BackendError::Constraint(_))));
        let referenced = db
            .delete(&Delete {
                table: "muscle".into(),
                filter: Predicate::eq("id", 1),
                casts: Default::default(),
            })
            .await;
        assert!(matches!(referenced, Err(BackendError::Constraint(_))));
        assert_eq!(db.rows("muscle").len(), 2);
    }

    #[tokio::test]
    async fn update_and_delete_report_counts() {
        let db = gym().await;
        let mut set = Row::new();
        set.insert("name".into(), json!("Bench"));
        let n = db
            .update(&Update {
                table: "workout".into(),
                set,
                filter: Predicate::eq("id", 1),
                casts: Default::default(),
            })
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(db.rows("workout")[0]["name"], json!("Bench"));

        let n = db
            .delete(&Delete {
                table: "workout".into(),
                filter: Predicate::eq("muscle_id", 1),
                casts: Default::default(),
            })
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(db.rows("workout").len(), 1);
    }

    #[tokio::test]
    async fn snapshot_does_not_see_later_writes() {
        let db = gym().await;
        let snap = db.begin_read().await.unwrap().unwrap();
        db.insert(&insert("muscle", json!({"name": "Legs"}))).await.unwrap();
        assert_eq!(snap.count(&Select::from("muscle")).await.unwrap(), 2);
        assert_eq!(db.count(&Select::from("muscle")).await.unwrap(), 3);
    }
}
