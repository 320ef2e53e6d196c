//! PostgreSQL executor on a sqlx pool.

use crate::error::BackendError;
use crate::executor::SqlExecutor;
use crate::settings::Settings;
use crate::sql::{
    render_count, render_delete, render_insert, render_select, render_update, Delete, Insert,
    PgBindValue, QueryBuf, Row, Select, Update,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{ConnectOptions, PgPool, Postgres, Transaction};
use std::str::FromStr;
use tokio::sync::Mutex;

/// Executes statements against a PostgreSQL pool. Tables are qualified with `schema` when set.
#[derive(Clone, Debug)]
pub struct PgExecutor {
    pool: PgPool,
    schema: Option<String>,
}

impl PgExecutor {
    pub fn new(pool: PgPool, schema: Option<String>) -> Self {
        PgExecutor { pool, schema }
    }

    /// Create the database if needed and open a pool sized from settings.
    pub async fn connect(settings: &Settings) -> Result<Self, BackendError> {
        ensure_database_exists(&settings.database_url).await?;
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.database_url)
            .await?;
        tracing::info!(schema = ?settings.schema, "connected to database");
        Ok(PgExecutor::new(pool, settings.schema.clone()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn select(&self, select: &Select) -> Result<Vec<Row>, BackendError> {
        let q = render_select(select, self.schema());
        fetch_rows(&self.pool, &q).await
    }

    async fn count(&self, select: &Select) -> Result<u64, BackendError> {
        let q = render_count(select, self.schema());
        fetch_count(&self.pool, &q).await
    }

    async fn insert(&self, insert: &Insert) -> Result<Row, BackendError> {
        let q = render_insert(insert, self.schema());
        fetch_returning(&self.pool, &q).await
    }

    async fn update(&self, update: &Update) -> Result<u64, BackendError> {
        let q = render_update(update, self.schema());
        execute(&self.pool, &q).await
    }

    async fn delete(&self, delete: &Delete) -> Result<u64, BackendError> {
        let q = render_delete(delete, self.schema());
        execute(&self.pool, &q).await
    }

    /// REPEATABLE READ, READ ONLY transaction; dropped (rolled back) when the read completes.
    async fn begin_read(&self) -> Result<Option<Box<dyn SqlExecutor>>, BackendError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        tracing::debug!("read snapshot opened");
        Ok(Some(Box::new(PgSnapshot {
            tx: Mutex::new(tx),
            schema: self.schema.clone(),
        })))
    }
}

/// Read-only snapshot over one transaction.
struct PgSnapshot {
    tx: Mutex<Transaction<'static, Postgres>>,
    schema: Option<String>,
}

#[async_trait]
impl SqlExecutor for PgSnapshot {
    async fn select(&self, select: &Select) -> Result<Vec<Row>, BackendError> {
        let q = render_select(select, self.schema.as_deref());
        let mut tx = self.tx.lock().await;
        fetch_rows(&mut **tx, &q).await
    }

    async fn count(&self, select: &Select) -> Result<u64, BackendError> {
        let q = render_count(select, self.schema.as_deref());
        let mut tx = self.tx.lock().await;
        fetch_count(&mut **tx, &q).await
    }

    async fn insert(&self, _insert: &Insert) -> Result<Row, BackendError> {
        Err(BackendError::Unsupported("insert inside a read snapshot"))
    }

    async fn update(&self, _update: &Update) -> Result<u64, BackendError> {
        Err(BackendError::Unsupported("update inside a read snapshot"))
    }

    async fn delete(&self, _delete: &Delete) -> Result<u64, BackendError> {
        Err(BackendError::Unsupported("delete inside a read snapshot"))
    }
}

fn bind_all<'q>(q: &'q QueryBuf) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

async fn fetch_rows<'e, E>(exec: E, q: &QueryBuf) -> Result<Vec<Row>, BackendError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let rows = bind_all(q).fetch_all(exec).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

async fn fetch_count<'e, E>(exec: E, q: &QueryBuf) -> Result<u64, BackendError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    use sqlx::Row as _;
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let row = bind_all(q).fetch_one(exec).await?;
    let n: i64 = row.try_get("count")?;
    Ok(n.max(0) as u64)
}

async fn fetch_returning<'e, E>(exec: E, q: &QueryBuf) -> Result<Row, BackendError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let row = bind_all(q).fetch_optional(exec).await?;
    Ok(row.map(|r| row_to_json(&r)).unwrap_or_default())
}

async fn execute<'e, E>(exec: E, q: &QueryBuf) -> Result<u64, BackendError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let done = bind_all(q).execute(exec).await?;
    Ok(done.rows_affected())
}

fn row_to_json(row: &PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = Row::new();
    for col in row.columns() {
        let name = col.name();
        let v = cell_to_value(row, name);
        map.insert(name.to_string(), v);
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), BackendError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), BackendError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| sqlx::Error::Configuration("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
