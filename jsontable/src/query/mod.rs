use crate::clause::{ClauseSet, Direction, Operator};
use crate::collection::RecordCollection;
use crate::entity::EntityDefinition;
use crate::error::{JsonTableError, Result};
use crate::file_store::FileStore;
use crate::record::{values_equal, Record};
use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_PAGE_NAME: &str = "page";

/// A query over one entity. Builder methods consume and return the query, so
/// clauses can never leak from one query into another; the terminal call
/// consumes it for good.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    files: &'a FileStore,
    entity: EntityDefinition,
    default_per_page: usize,
    clauses: ClauseSet,
}

/// Which page to fetch, and how big pages are.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub per_page: Option<usize>,
    pub columns: Vec<String>,
    pub page_name: String,
    pub page: Option<usize>,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            per_page: None,
            columns: Vec::new(),
            page_name: DEFAULT_PAGE_NAME.to_string(),
            page: None,
        }
    }
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn page_name(mut self, name: &str) -> Self {
        self.page_name = name.to_string();
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }
}

/// One page of results plus the totals of the whole filtered set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginator {
    pub items: RecordCollection,
    pub total: usize,
    pub per_page: usize,
    pub current_page: usize,
    pub last_page: usize,
    pub page_name: String,
}

impl<'a> Query<'a> {
    pub(crate) fn new(
        files: &'a FileStore,
        entity: EntityDefinition,
        default_per_page: usize,
    ) -> Self {
        Query {
            files,
            entity,
            default_per_page,
            clauses: ClauseSet::new(),
        }
    }

    pub fn entity(&self) -> &EntityDefinition {
        &self.entity
    }

    pub fn clauses(&self) -> &ClauseSet {
        &self.clauses
    }

    pub fn select(mut self, column: &str) -> Self {
        self.clauses.add_select(column);
        self
    }

    pub fn add_select(self, column: &str) -> Self {
        self.select(column)
    }

    /// `where column = value`
    pub fn where_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.clauses.add_where(column, value);
        self
    }

    pub fn where_op(mut self, column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.clauses.add_where_op(column, operator, value);
        self
    }

    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.clauses.add_where_in(column, values);
        self
    }

    pub fn where_not_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.clauses.add_where_not_in(column, values);
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.clauses.add_order_by(column, direction);
        self
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, Direction::Desc)
    }

    /// Load the entity file and apply every pending clause.
    pub fn get(self) -> Result<RecordCollection> {
        let records = self.files.load(&self.entity)?;
        log::debug!(
            "Querying '{}': {} records, {} where, {} in, {} not in, {} order",
            self.entity.name,
            records.len(),
            self.clauses.wheres.len(),
            self.clauses.where_ins.len(),
            self.clauses.where_not_ins.len(),
            self.clauses.order_bys.len(),
        );
        Ok(records.apply(&self.clauses))
    }

    /// Like `get`, replacing any selected columns unless `columns` is `["*"]`.
    pub fn get_columns(mut self, columns: &[&str]) -> Result<RecordCollection> {
        if !columns.is_empty() && columns != ["*"] {
            self.clauses.set_selects(columns);
        }
        self.get()
    }

    pub fn first(self) -> Result<Option<Record>> {
        Ok(self.get()?.into_first())
    }

    /// `where primary_key = id`, first match.
    pub fn find(self, id: impl Into<Value>) -> Result<Option<Record>> {
        let key = self.primary_key()?;
        self.where_eq(&key, id).first()
    }

    pub fn find_or_fail(self, id: impl Into<Value>) -> Result<Record> {
        let id = id.into();
        let entity = self.entity.name.clone();
        self.find(id.clone())?
            .ok_or_else(|| JsonTableError::not_found(&entity, &id))
    }

    pub fn find_many<I, V>(self, ids: I) -> Result<RecordCollection>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let key = self.primary_key()?;
        self.where_in(&key, ids).get()
    }

    /// Fails unless every distinct id matched a record.
    pub fn find_or_fail_many<I, V>(self, ids: I) -> Result<RecordCollection>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut distinct: Vec<Value> = Vec::new();
        for id in ids.into_iter().map(Into::into) {
            if !distinct.iter().any(|seen| values_equal(seen, &id)) {
                distinct.push(id);
            }
        }

        let key = self.primary_key()?;
        let entity = self.entity.name.clone();
        let found = self.find_many(distinct.clone())?;
        if found.len() == distinct.len() {
            return Ok(found);
        }

        let found_ids = found.pluck(&key);
        let missing = distinct
            .iter()
            .find(|id| !found_ids.iter().any(|f| values_equal(f, id)))
            .cloned()
            .unwrap_or(Value::Array(distinct));
        Err(JsonTableError::not_found(&entity, &missing))
    }

    pub fn count(self) -> Result<usize> {
        Ok(self.get()?.count())
    }

    pub fn min(self, column: &str) -> Result<Option<Value>> {
        self.get()?.min(column)
    }

    pub fn max(self, column: &str) -> Result<Option<Value>> {
        self.get()?.max(column)
    }

    pub fn avg(self, column: &str) -> Result<Option<f64>> {
        self.get()?.avg(column)
    }

    pub fn pluck(self, column: &str) -> Result<Vec<Value>> {
        Ok(self.get()?.pluck(column))
    }

    pub fn pluck_keyed(self, column: &str, key_column: &str) -> Result<Map<String, Value>> {
        Ok(self.get()?.pluck_keyed(column, key_column))
    }

    /// The column's value on the first matching record.
    pub fn value(self, column: &str) -> Result<Option<Value>> {
        Ok(self.pluck(column)?.into_iter().next())
    }

    /// First record for each distinct value of `column`.
    pub fn distinct(self, column: &str) -> Result<RecordCollection> {
        Ok(self.get()?.unique_by(column))
    }

    /// Same reduction as `distinct`: no per-group aggregates are computed.
    pub fn group_by(self, column: &str) -> Result<RecordCollection> {
        self.distinct(column)
    }

    pub fn chunk(self, size: usize) -> Result<Vec<RecordCollection>> {
        Ok(self.get()?.chunk(size))
    }

    pub fn paginate(self, request: PageRequest) -> Result<Paginator> {
        let per_page = request
            .per_page
            .or(self.entity.per_page)
            .unwrap_or(self.default_per_page)
            .max(1);
        let current_page = request.page.filter(|p| *p > 0).unwrap_or(1);

        let columns: Vec<&str> = request.columns.iter().map(String::as_str).collect();
        let records = self.get_columns(&columns)?;
        let total = records.count();
        let items = records.for_page(current_page, per_page);

        Ok(Paginator {
            items,
            total,
            per_page,
            current_page,
            last_page: total.div_ceil(per_page).max(1),
            page_name: request.page_name,
        })
    }

    fn primary_key(&self) -> Result<String> {
        self.entity
            .primary_key_name()
            .map(str::to_string)
            .ok_or_else(|| JsonTableError::MissingPrimaryKey {
                entity: self.entity.name.clone(),
            })
    }
}
