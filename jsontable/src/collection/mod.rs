use crate::clause::{ClauseSet, Direction, InClause, Operator, OrderClause, WhereClause};
use crate::entity::Hydratable;
use crate::error::{JsonTableError, Result};
use crate::record::{self, compare_values, field, partial_compare, values_equal, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// An ordered working set of records. Insertion order is kept until a sort
/// is applied; every operation returns a densely indexed sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordCollection {
    records: Vec<Record>,
}

impl RecordCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        RecordCollection { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn into_first(self) -> Option<Record> {
        self.records.into_iter().next()
    }

    /// Apply a full clause set in the fixed order: where, whereIn,
    /// whereNotIn, orderBy, select.
    pub fn apply(mut self, clauses: &ClauseSet) -> Self {
        for clause in &clauses.wheres {
            self = self.filter_where(clause);
        }
        for clause in &clauses.where_ins {
            self = self.where_in(clause);
        }
        for clause in &clauses.where_not_ins {
            self = self.where_not_in(clause);
        }
        for clause in &clauses.order_bys {
            self = self.sort_by(clause);
        }
        match clauses.projection() {
            Some(columns) => self.select(&columns),
            None => self,
        }
    }

    pub fn filter_where(self, clause: &WhereClause) -> Self {
        self.retain(|record| {
            matches_where(field(record, &clause.column), clause.operator, &clause.value)
        })
    }

    pub fn where_in(self, clause: &InClause) -> Self {
        self.retain(|record| contains(&clause.values, field(record, &clause.column)))
    }

    pub fn where_not_in(self, clause: &InClause) -> Self {
        self.retain(|record| !contains(&clause.values, field(record, &clause.column)))
    }

    /// Stable sort on one column. Records with equal keys keep their
    /// relative order, in both directions.
    pub fn sort_by(mut self, clause: &OrderClause) -> Self {
        let column = clause.column.as_str();
        match clause.direction {
            Direction::Asc => self
                .records
                .sort_by(|a, b| compare_values(field(a, column), field(b, column))),
            Direction::Desc => self
                .records
                .sort_by(|a, b| compare_values(field(b, column), field(a, column))),
        }
        self
    }

    /// Keep only the given columns on each record. Columns a record does not
    /// have are left out rather than filled with null.
    pub fn select(self, columns: &[&str]) -> Self {
        let records = self
            .records
            .into_iter()
            .map(|record| {
                let mut projected = Map::new();
                for (key, value) in record {
                    if columns.contains(&key.as_str()) {
                        projected.insert(key, value);
                    }
                }
                projected
            })
            .collect();
        RecordCollection { records }
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn min(&self, column: &str) -> Result<Option<Value>> {
        Ok(self
            .numeric_values(column)?
            .and_then(|values| values.into_iter().min_by(|a, b| compare_values(a, b)))
            .cloned())
    }

    pub fn max(&self, column: &str) -> Result<Option<Value>> {
        Ok(self
            .numeric_values(column)?
            .and_then(|values| values.into_iter().max_by(|a, b| compare_values(a, b)))
            .cloned())
    }

    pub fn avg(&self, column: &str) -> Result<Option<f64>> {
        Ok(self.numeric_values(column)?.map(|values| {
            let sum: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
            sum / values.len() as f64
        }))
    }

    /// Numeric values of `column`, ignoring records where it is absent or
    /// not a number. `None` for an empty collection.
    fn numeric_values(&self, column: &str) -> Result<Option<Vec<&Value>>> {
        if self.records.is_empty() {
            return Ok(None);
        }
        let values: Vec<&Value> = self
            .records
            .iter()
            .map(|r| field(r, column))
            .filter(|v| v.is_number())
            .collect();
        if values.is_empty() {
            let present = self.records.iter().any(|r| r.contains_key(column));
            return Err(JsonTableError::AggregationType {
                column: column.to_string(),
                reason: if present {
                    "column holds no numeric values".into()
                } else {
                    "column is not present on any record".into()
                },
            });
        }
        Ok(Some(values))
    }

    /// Values of `column` in order; absent fields yield null.
    pub fn pluck(&self, column: &str) -> Vec<Value> {
        self.records
            .iter()
            .map(|r| field(r, column).clone())
            .collect()
    }

    /// Values of `column` keyed by the value of `key_column`. A repeated key
    /// keeps its first position and takes the last value.
    pub fn pluck_keyed(&self, column: &str, key_column: &str) -> Map<String, Value> {
        let mut plucked = Map::new();
        for r in &self.records {
            plucked.insert(
                record::key_string(field(r, key_column)),
                field(r, column).clone(),
            );
        }
        plucked
    }

    /// First-seen record for each distinct value of `column`.
    pub fn unique_by(self, column: &str) -> Self {
        let mut seen: Vec<Value> = Vec::new();
        self.retain(|record| {
            let value = field(record, column);
            if contains(&seen, value) {
                false
            } else {
                seen.push(value.clone());
                true
            }
        })
    }

    /// Slice out page `page` (1-based) of `per_page` records.
    pub fn for_page(&self, page: usize, per_page: usize) -> Self {
        let start = page.saturating_sub(1).saturating_mul(per_page);
        let records = self
            .records
            .iter()
            .skip(start)
            .take(per_page)
            .cloned()
            .collect();
        RecordCollection { records }
    }

    pub fn chunk(self, size: usize) -> Vec<RecordCollection> {
        if size == 0 {
            return Vec::new();
        }
        self.records
            .chunks(size)
            .map(|c| RecordCollection::from_records(c.to_vec()))
            .collect()
    }

    /// Largest numeric value held in `column`, if any.
    pub fn max_number(&self, column: &str) -> Option<&serde_json::Number> {
        self.records
            .iter()
            .map(|r| field(r, column))
            .filter(|v| v.is_number())
            .max_by(|a, b| compare_values(a, b))
            .and_then(Value::as_number)
    }

    /// Drop every record whose `column` equals `value`.
    pub fn remove_where(self, column: &str, value: &Value) -> Self {
        self.retain(|record| !values_equal(field(record, column), value))
    }

    pub fn hydrate<H: Hydratable>(&self) -> Result<Vec<H>> {
        self.records.iter().cloned().map(H::hydrate).collect()
    }

    fn retain(mut self, mut keep: impl FnMut(&Record) -> bool) -> Self {
        self.records.retain(|r| keep(r));
        self
    }
}

fn matches_where(actual: &Value, operator: Operator, expected: &Value) -> bool {
    match operator {
        Operator::Eq => values_equal(actual, expected),
        Operator::Ne => !values_equal(actual, expected),
        Operator::Lt => partial_compare(actual, expected) == Some(Ordering::Less),
        Operator::Le => matches!(
            partial_compare(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => partial_compare(actual, expected) == Some(Ordering::Greater),
        Operator::Ge => matches!(
            partial_compare(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn contains(values: &[Value], needle: &Value) -> bool {
    values.iter().any(|v| values_equal(v, needle))
}

impl IntoIterator for RecordCollection {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordCollection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<Record> for RecordCollection {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        RecordCollection {
            records: iter.into_iter().collect(),
        }
    }
}
