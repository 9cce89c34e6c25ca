//! Parsed select statements.
//!
//! Statements arrive already parsed. Only the parts federation needs are
//! modeled here.
use std::fmt;

use coretypes::scalar::ScalarValue;
use serde::{Deserialize, Serialize};

/// A table in the FROM clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// Name the table is referenced by in the rest of the statement.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// A possibly qualified column reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(column: impl Into<String>) -> Self {
        ColumnRef {
            qualifier: None,
            column: column.into(),
        }
    }

    pub fn qualified(qualifier: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            qualifier: Some(qualifier.into()),
            column: column.into(),
        }
    }

    /// Parse `q.col` or `col`.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((q, col)) => Self::qualified(q, col),
            None => Self::new(s),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{q}.{}", self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// Equality predicate joining two tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPredicate {
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// `column = literal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: ColumnRef,
    pub value: ScalarValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    /// `COUNT(*)`
    CountStar,
    Count,
    Sum,
    Min,
    Max,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CountStar | Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectItem {
    /// `*` or `qualifier.*`
    Wildcard(Option<String>),
    Column {
        column: ColumnRef,
        alias: Option<String>,
    },
    Aggregate {
        func: AggregateFunction,
        /// `None` only for `COUNT(*)`.
        arg: Option<ColumnRef>,
        alias: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByExpr {
    pub column: ColumnRef,
    pub descending: bool,
}

/// A select over one or more tables joined with equality predicates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectStatement {
    pub from: Vec<TableRef>,
    pub joins: Vec<JoinPredicate>,
    pub filters: Vec<Filter>,
    pub projection: Vec<SelectItem>,
    pub group_by: Vec<ColumnRef>,
    pub order_by: Vec<OrderByExpr>,
}

impl SelectStatement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(mut self, table: &str, alias: Option<&str>) -> Self {
        self.from.push(TableRef {
            table: table.to_string(),
            alias: alias.map(|s| s.to_string()),
        });
        self
    }

    /// Join on `left = right`, both given as `q.col` or `col`.
    pub fn join_on(mut self, left: &str, right: &str) -> Self {
        self.joins.push(JoinPredicate {
            left: ColumnRef::parse(left),
            right: ColumnRef::parse(right),
        });
        self
    }

    pub fn filter(mut self, column: &str, value: impl Into<ScalarValue>) -> Self {
        self.filters.push(Filter {
            column: ColumnRef::parse(column),
            value: value.into(),
        });
        self
    }

    /// Project `*` or `q.*`.
    pub fn select_wildcard(mut self, qualifier: Option<&str>) -> Self {
        self.projection
            .push(SelectItem::Wildcard(qualifier.map(|s| s.to_string())));
        self
    }

    pub fn select(mut self, column: &str) -> Self {
        self.projection.push(SelectItem::Column {
            column: ColumnRef::parse(column),
            alias: None,
        });
        self
    }

    pub fn select_as(mut self, column: &str, alias: &str) -> Self {
        self.projection.push(SelectItem::Column {
            column: ColumnRef::parse(column),
            alias: Some(alias.to_string()),
        });
        self
    }

    pub fn select_aggregate(
        mut self,
        func: AggregateFunction,
        arg: Option<&str>,
        alias: Option<&str>,
    ) -> Self {
        self.projection.push(SelectItem::Aggregate {
            func,
            arg: arg.map(ColumnRef::parse),
            alias: alias.map(|s| s.to_string()),
        });
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(ColumnRef::parse(column));
        self
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.order_by.push(OrderByExpr {
            column: ColumnRef::parse(column),
            descending,
        });
        self
    }

    /// Check if the statement aggregates.
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self
                .projection
                .iter()
                .any(|item| matches!(item, SelectItem::Aggregate { .. }))
    }
}
