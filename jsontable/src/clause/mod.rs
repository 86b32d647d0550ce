// Pending query clauses, accumulated by the builder and drained by a terminal call

use crate::error::{JsonTableError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a `where` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
}

impl FromStr for Operator {
    type Err = JsonTableError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            other => Err(JsonTableError::InvalidOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction of an `orderBy` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = JsonTableError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(JsonTableError::InvalidOperator(format!(
                "sort direction '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InClause {
    pub column: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderClause {
    pub column: String,
    pub direction: Direction,
}

/// The accumulated, not-yet-applied clauses of one query.
/// Column names are not checked here; unknown columns simply read as null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseSet {
    pub wheres: Vec<WhereClause>,
    pub where_ins: Vec<InClause>,
    pub where_not_ins: Vec<InClause>,
    pub order_bys: Vec<OrderClause>,
    pub selects: Vec<String>,
}

impl ClauseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terse form: `add_where(column, value)` compares with `=`.
    pub fn add_where(&mut self, column: &str, value: impl Into<Value>) {
        self.add_where_op(column, Operator::Eq, value);
    }

    pub fn add_where_op(&mut self, column: &str, operator: Operator, value: impl Into<Value>) {
        self.wheres.push(WhereClause {
            column: column.to_string(),
            operator,
            value: value.into(),
        });
    }

    pub fn add_where_in<I, V>(&mut self, column: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.where_ins.push(InClause {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
    }

    pub fn add_where_not_in<I, V>(&mut self, column: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.where_not_ins.push(InClause {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
    }

    pub fn add_order_by(&mut self, column: &str, direction: Direction) {
        self.order_bys.push(OrderClause {
            column: column.to_string(),
            direction,
        });
    }

    pub fn add_select(&mut self, column: &str) {
        self.selects.push(column.to_string());
    }

    /// Replace the selected columns, as `get(columns)` does.
    pub fn set_selects(&mut self, columns: &[&str]) {
        self.selects = columns.iter().map(|c| c.to_string()).collect();
    }

    /// The de-duplicated projection, or `None` when every column is wanted.
    /// Only a selection of nothing but `*` means every column; a `*` next to
    /// named columns is dropped and the named columns are projected.
    pub fn projection(&self) -> Option<Vec<&str>> {
        let mut columns: Vec<&str> = Vec::new();
        for column in &self.selects {
            if column != "*" && !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
        if columns.is_empty() {
            None
        } else {
            Some(columns)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wheres.is_empty()
            && self.where_ins.is_empty()
            && self.where_not_ins.is_empty()
            && self.order_bys.is_empty()
            && self.selects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terse_where_defaults_to_equality() {
        let mut clauses = ClauseSet::new();
        clauses.add_where("id", 2);
        assert_eq!(
            clauses.wheres,
            vec![WhereClause {
                column: "id".into(),
                operator: Operator::Eq,
                value: json!(2),
            }]
        );
    }

    #[test]
    fn test_selects_accumulate_and_deduplicate() {
        let mut clauses = ClauseSet::new();
        assert_eq!(clauses.projection(), None);

        clauses.add_select("id");
        clauses.add_select("name");
        clauses.add_select("id");
        assert_eq!(clauses.projection(), Some(vec!["id", "name"]));

        clauses.add_select("*");
        assert_eq!(clauses.projection(), Some(vec!["id", "name"]));
    }

    #[test]
    fn test_star_alone_selects_everything() {
        let mut clauses = ClauseSet::new();
        clauses.add_select("*");
        clauses.add_select("*");
        assert_eq!(clauses.projection(), None);
    }

    #[test]
    fn test_set_selects_replaces() {
        let mut clauses = ClauseSet::new();
        clauses.add_select("id");
        clauses.set_selects(&["email"]);
        assert_eq!(clauses.projection(), Some(vec!["email"]));
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!(" >= ".parse::<Operator>().unwrap(), Operator::Ge);
        assert!(matches!(
            "like".parse::<Operator>(),
            Err(JsonTableError::InvalidOperator(_))
        ));
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("DESC".parse::<Direction>().unwrap(), Direction::Desc);
        assert_eq!(Direction::default(), Direction::Asc);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_in_clauses_collect_values() {
        let mut clauses = ClauseSet::new();
        clauses.add_where_in("id", [2, 3]);
        clauses.add_where_not_in("name", ["a"]);
        assert_eq!(clauses.where_ins[0].values, vec![json!(2), json!(3)]);
        assert_eq!(clauses.where_not_ins[0].values, vec![json!("a")]);
        assert!(!clauses.is_empty());
    }
}
