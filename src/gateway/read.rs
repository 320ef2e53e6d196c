//! fetch, search and find.

use super::EntityGateway;
use crate::config::EntityId;
use crate::error::{GatewayError, GraphError};
use crate::executor::SqlExecutor;
use crate::identifiers::IdentifierStore;
use crate::model::Record;
use crate::pagination::{Page, PageRequest};
use crate::sql::{ColumnRef, Join, Predicate, Row, Select, SortOrder};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Options for [`EntityGateway::fetch`]. Defaults: sorted by `name ASC`, page 1 of 20.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchOptions {
    pub filter: Option<Predicate>,
    pub sort: Option<(String, SortOrder)>,
    pub page: Option<PageRequest>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            filter: None,
            sort: Some(("name".into(), SortOrder::Asc)),
            page: Some(PageRequest::default()),
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a WHERE predicate, AND-ed with any existing one.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// `column` may be qualified (`muscle.name`); unqualified names refer to output columns.
    pub fn sort_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((column.into(), order));
        self
    }

    pub fn unsorted(mut self) -> Self {
        self.sort = None;
        self
    }

    pub fn page(mut self, page: u64, page_size: u64) -> Self {
        self.page = Some(PageRequest::new(page, page_size));
        self
    }

    pub fn unpaginated(mut self) -> Self {
        self.page = None;
        self
    }
}

/// Result of a fetch: every row, or one page of them.
#[derive(Clone, Debug, PartialEq)]
pub enum Fetched {
    Rows(Vec<Row>),
    Page(Page),
}

impl Fetched {
    pub fn rows(&self) -> &[Row] {
        match self {
            Fetched::Rows(rows) => rows,
            Fetched::Page(page) => &page.items,
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Fetched::Rows(rows) => rows,
            Fetched::Page(page) => page.items,
        }
    }

    pub fn page(&self) -> Option<&Page> {
        match self {
            Fetched::Page(page) => Some(page),
            Fetched::Rows(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

impl EntityGateway {
    /// This entity's table joined to every parent (adding `<parent_table>_name`),
    /// child and junction table.
    pub(super) fn base_select(&self) -> Select {
        let schema = self.schema();
        let mut select = Select::from(schema.table.clone()).casts(schema.model.casts());
        for link in &schema.parents {
            let parent = self.graph.entity(link.parent);
            select = select.join(Join {
                table: parent.table.clone(),
                column: link.references.clone(),
                to: ColumnRef::new(link.foreign_key.clone()),
                columns: vec![(link.display.clone(), link.alias.clone())],
            });
        }
        for link in &schema.children {
            select = select.join(Join {
                table: self.graph.entity(link.child).table.clone(),
                column: link.foreign_key.clone(),
                to: ColumnRef::new(link.references.clone()),
                columns: Vec::new(),
            });
        }
        for link in &schema.junctions {
            select = select.join(Join {
                table: self.graph.entity(link.junction).table.clone(),
                column: link.this_key.clone(),
                to: ColumnRef::new(link.references.clone()),
                columns: Vec::new(),
            });
        }
        select
    }

    fn select_for(&self, options: &FetchOptions) -> Select {
        let mut select = self.base_select();
        if let Some(filter) = &options.filter {
            select = select.filter(filter.clone());
        }
        if let Some((column, order)) = &options.sort {
            select = select.order_by(column.as_str(), *order);
        }
        select
    }

    /// List rows with parent display columns joined in. Zero rows is not an error.
    pub async fn fetch(&self, options: FetchOptions) -> Result<Fetched, GatewayError> {
        let select = self.select_for(&options);
        match options.page {
            None => Ok(Fetched::Rows(self.executor.select(&select).await?)),
            Some(request) => {
                // count and slice must see the same rows
                let snapshot = self.executor.begin_read().await?;
                let exec = snapshot.as_deref().unwrap_or(self.executor.as_ref());
                Ok(Fetched::Page(paginate(exec, select, request).await?))
            }
        }
    }

    /// First row matching `filter` (all columns, or only `columns` when non-empty).
    pub async fn search(
        &self,
        columns: Option<&[&str]>,
        filter: Option<Predicate>,
    ) -> Result<Option<Row>, GatewayError> {
        let schema = self.schema();
        let mut select = Select::from(schema.table.clone())
            .casts(schema.model.casts())
            .limit(1);
        if let Some(columns) = columns.filter(|c| !c.is_empty()) {
            select = select.columns(columns.iter().map(|c| c.to_string()).collect());
        }
        if let Some(filter) = filter {
            select = select.filter(filter);
        }
        Ok(self.executor.select(&select).await?.into_iter().next())
    }

    /// Load the row addressed by `ids`, resolving parents recursively (their display
    /// value lands in `<parent_table>_name`) and attaching page 1 of every child and
    /// junction table under `related`. Runs inside one read snapshot.
    pub async fn find(&self, ids: &IdentifierStore) -> Result<Record, GatewayError> {
        let filter = self.identifier_filter(ids)?;
        let snapshot = self.executor.begin_read().await?;
        let exec = snapshot.as_deref().unwrap_or(self.executor.as_ref());
        self.find_on(exec, filter, &[]).await
    }

    /// [`EntityGateway::find`], extracted through the configured hydrator.
    pub async fn find_map(&self, ids: &IdentifierStore) -> Result<Row, GatewayError> {
        let record = self.find(ids).await?;
        Ok(self.hydrator.extract(&record))
    }

    fn find_on<'a>(
        &'a self,
        exec: &'a dyn SqlExecutor,
        filter: Predicate,
        trail: &'a [EntityId],
    ) -> BoxFuture<'a, Result<Record, GatewayError>> {
        Box::pin(async move {
            let schema = self.schema();
            if trail.contains(&self.id) {
                let mut names: Vec<&str> = trail
                    .iter()
                    .map(|id| self.graph.entity(*id).name.as_str())
                    .collect();
                names.push(&schema.name);
                return Err(GraphError::Cycle(names.join(" -> ")).into());
            }
            let mut path = trail.to_vec();
            path.push(self.id);

            let row = self.load_row(exec, filter).await?;
            let mut record = self.record();
            record.merge_from(&row);

            for link in &schema.parents {
                let key = row.get(&link.foreign_key).cloned().unwrap_or(Value::Null);
                if key.is_null() {
                    record.attach(link.alias.clone(), Value::Null);
                    continue;
                }
                let parent = self.related(link.parent);
                let found = parent
                    .find_on(exec, Predicate::Eq(ColumnRef::new(link.references.clone()), key), &path)
                    .await?;
                let display = found.get(&link.display).cloned().unwrap_or(Value::Null);
                record.attach(link.alias.clone(), display);
            }

            for link in &schema.children {
                let key = row.get(&link.references).cloned().unwrap_or(Value::Null);
                let child = self.related(link.child);
                let page = child
                    .related_page(exec, &link.foreign_key, key, link.order_by.as_deref())
                    .await?;
                record.attach_related(child.table().to_string(), page);
            }

            for link in &schema.junctions {
                let key = row.get(&link.references).cloned().unwrap_or(Value::Null);
                let junction = self.related(link.junction);
                let page = junction.related_page(exec, &link.this_key, key, None).await?;
                record.attach_related(junction.table().to_string(), page);
            }

            tracing::debug!(entity = %schema.name, depth = trail.len(), "resolved record");
            Ok(record)
        })
    }

    /// Page 1 of this entity's rows whose `foreign_key` equals `key`.
    async fn related_page(
        &self,
        exec: &dyn SqlExecutor,
        foreign_key: &str,
        key: Value,
        order_by: Option<&str>,
    ) -> Result<Page, GatewayError> {
        let mut options = FetchOptions::default()
            .unsorted()
            .filter(Predicate::Eq(ColumnRef::new(foreign_key), key));
        if let Some(column) = order_by {
            options = options.sort_by(column, SortOrder::Asc);
        }
        let select = self.select_for(&options);
        paginate(exec, select, options.page.unwrap_or_default()).await
    }

    /// The bare row matching `filter`, or `NotFound`.
    pub(super) async fn load_row(&self, exec: &dyn SqlExecutor, filter: Predicate) -> Result<Row, GatewayError> {
        let schema = self.schema();
        let select = Select::from(schema.table.clone())
            .casts(schema.model.casts())
            .filter(filter)
            .limit(1);
        match exec.select(&select).await?.into_iter().next() {
            Some(row) => Ok(row),
            None => {
                tracing::debug!(entity = %schema.name, filter = ?select.filter, "no row matched");
                Err(GatewayError::NotFound {
                    entity: schema.name.clone(),
                })
            }
        }
    }
}

/// Count, clamp the request to the last page, then select that slice.
async fn paginate(exec: &dyn SqlExecutor, select: Select, request: PageRequest) -> Result<Page, GatewayError> {
    let total = exec.count(&select.unsliced()).await?;
    let request = request.resolve(total);
    let items = exec
        .select(&select.limit(request.page_size).offset(request.offset()))
        .await?;
    Ok(Page::new(items, total, request.page, request.page_size))
}
