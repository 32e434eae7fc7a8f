//! Query expressions and data-changing statements.
//!
//! # Responsibility
//! - Hold the clause structure of a `SELECT` (CTEs, joins, grouping, set operations).
//! - Hold `INSERT`/`UPDATE`/`DELETE` shapes with optional `RETURNING`.
//!
//! # Invariants
//! - Shape checks (non-empty select list, insert row arity, ...) run at build time.
//! - Set-operation branches are not checked against each other; column count and
//!   type compatibility are the database's concern.

use crate::expr::{ConstructionError, ConstructionResult, Expr, OrderBy};

/// Table reference with optional schema and alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub(crate) schema: Option<String>,
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            alias: None,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// `FROM`/`JOIN` source.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table(TableRef),
    Subquery { query: Box<Query>, alias: String },
}

impl Source {
    pub fn table(name: impl Into<String>) -> Self {
        Self::Table(TableRef::new(name))
    }

    pub fn subquery(query: Query, alias: impl Into<String>) -> Self {
        Self::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        }
    }
}

impl From<TableRef> for Source {
    fn from(value: TableRef) -> Self {
        Self::Table(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Join {
    On {
        kind: JoinKind,
        source: Source,
        on: Expr,
    },
    Cross {
        source: Source,
    },
}

/// One projected item of a select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Expr { expr: Expr, alias: Option<String> },
    /// `*` or `table.*`.
    Wildcard { table: Option<String> },
}

impl SelectItem {
    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self::Expr {
            expr,
            alias: Some(alias.into()),
        }
    }

    pub fn wildcard() -> Self {
        Self::Wildcard { table: None }
    }

    pub fn table_wildcard(table: impl Into<String>) -> Self {
        Self::Wildcard {
            table: Some(table.into()),
        }
    }
}

impl From<Expr> for SelectItem {
    fn from(expr: Expr) -> Self {
        Self::Expr { expr, alias: None }
    }
}

/// `GROUP BY` specification.
#[derive(Debug, Clone, PartialEq)]
pub enum Grouping {
    Columns(Vec<Expr>),
    Rollup(Vec<Expr>),
    Cube(Vec<Expr>),
    /// Each inner list is one set; an empty inner list renders as `()`.
    Sets(Vec<Vec<Expr>>),
}

impl Grouping {
    pub fn columns(exprs: Vec<Expr>) -> ConstructionResult<Self> {
        non_empty(exprs).map(Self::Columns)
    }

    pub fn rollup(exprs: Vec<Expr>) -> ConstructionResult<Self> {
        non_empty(exprs).map(Self::Rollup)
    }

    pub fn cube(exprs: Vec<Expr>) -> ConstructionResult<Self> {
        non_empty(exprs).map(Self::Cube)
    }

    pub fn sets(sets: Vec<Vec<Expr>>) -> ConstructionResult<Self> {
        non_empty(sets).map(Self::Sets)
    }

    /// Whether this grouping needs the `advanced_grouping` capability.
    pub fn is_advanced(&self) -> bool {
        !matches!(self, Self::Columns(_))
    }
}

fn non_empty<T>(items: Vec<T>) -> ConstructionResult<Vec<T>> {
    if items.is_empty() {
        return Err(ConstructionError::EmptyGrouping);
    }
    Ok(items)
}

/// Common table entry of a `WITH` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub(crate) name: String,
    pub(crate) columns: Vec<String>,
    pub(crate) query: Box<Query>,
    pub(crate) recursive: bool,
}

impl Cte {
    pub fn new(name: impl Into<String>, query: Query) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            query: Box::new(query),
            recursive: false,
        }
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Marks the entry recursive; the clause then renders `WITH RECURSIVE`.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

impl SetOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Union => "UNION",
            Self::Intersect => "INTERSECT",
            Self::Except => "EXCEPT",
        }
    }
}

/// Set operation joining this query with a sibling query.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    pub(crate) op: SetOperator,
    pub(crate) all: bool,
    pub(crate) query: Box<Query>,
}

/// Top-level `SELECT` query expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub(crate) ctes: Vec<Cte>,
    pub(crate) distinct: bool,
    pub(crate) select: Vec<SelectItem>,
    pub(crate) from: Option<Source>,
    pub(crate) joins: Vec<Join>,
    pub(crate) filter: Option<Expr>,
    pub(crate) group_by: Option<Grouping>,
    pub(crate) having: Option<Expr>,
    pub(crate) set_ops: Vec<SetOperation>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
}

impl Query {
    pub fn select(items: Vec<SelectItem>) -> ConstructionResult<Self> {
        if items.is_empty() {
            return Err(ConstructionError::EmptySelectList);
        }
        Ok(Self {
            ctes: Vec::new(),
            distinct: false,
            select: items,
            from: None,
            joins: Vec::new(),
            filter: None,
            group_by: None,
            having: None,
            set_ops: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        })
    }

    /// `SELECT *`.
    pub fn select_all() -> Self {
        Self {
            ctes: Vec::new(),
            distinct: false,
            select: vec![SelectItem::wildcard()],
            from: None,
            joins: Vec::new(),
            filter: None,
            group_by: None,
            having: None,
            set_ops: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn with(mut self, cte: Cte) -> Self {
        self.ctes.push(cte);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn from(mut self, source: impl Into<Source>) -> Self {
        self.from = Some(source.into());
        self
    }

    pub fn from_table(self, name: impl Into<String>) -> Self {
        self.from(Source::table(name))
    }

    pub fn join(mut self, kind: JoinKind, source: impl Into<Source>, on: Expr) -> Self {
        self.joins.push(Join::On {
            kind,
            source: source.into(),
            on,
        });
        self
    }

    pub fn cross_join(mut self, source: impl Into<Source>) -> Self {
        self.joins.push(Join::Cross {
            source: source.into(),
        });
        self
    }

    /// Adds a `WHERE` predicate; repeated calls combine with `AND`.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn group_by(mut self, grouping: Grouping) -> Self {
        self.group_by = Some(grouping);
        self
    }

    /// Adds a `HAVING` predicate; repeated calls combine with `AND`.
    pub fn having(mut self, predicate: Expr) -> Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, term: OrderBy) -> Self {
        self.order_by.push(term);
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

    /// Appends `op` with `query` as its right-hand branch.
    ///
    /// This query's ORDER BY and LIMIT apply to the whole compound result. The
    /// branch keeps its own clauses by compiling as a derived table.
    pub fn set_operation(mut self, op: SetOperator, all: bool, query: Query) -> Self {
        self.set_ops.push(SetOperation {
            op,
            all,
            query: Box::new(query),
        });
        self
    }

    pub fn union(self, query: Query) -> Self {
        self.set_operation(SetOperator::Union, false, query)
    }

    pub fn union_all(self, query: Query) -> Self {
        self.set_operation(SetOperator::Union, true, query)
    }

    pub fn intersect(self, query: Query) -> Self {
        self.set_operation(SetOperator::Intersect, false, query)
    }

    pub fn except(self, query: Query) -> Self {
        self.set_operation(SetOperator::Except, false, query)
    }

    /// Whether this query carries clauses that a bare set-operation branch cannot hold.
    pub(crate) fn is_compound_branch(&self) -> bool {
        !self.ctes.is_empty()
            || !self.set_ops.is_empty()
            || !self.order_by.is_empty()
            || self.limit.is_some()
            || self.offset.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub(crate) table: TableRef,
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<Expr>>,
    pub(crate) returning: Vec<SelectItem>,
}

impl Insert {
    pub fn new(
        table: TableRef,
        columns: Vec<String>,
        rows: Vec<Vec<Expr>>,
    ) -> ConstructionResult<Self> {
        if columns.is_empty() {
            return Err(ConstructionError::EmptyInsertColumns);
        }
        if rows.is_empty() {
            return Err(ConstructionError::EmptyInsertRows);
        }
        if let Some((row, values)) = rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != columns.len())
        {
            return Err(ConstructionError::InsertRowArity {
                row,
                expected: columns.len(),
                found: values.len(),
            });
        }
        Ok(Self {
            table,
            columns,
            rows,
            returning: Vec::new(),
        })
    }

    /// Gated by the `returning` capability.
    pub fn returning(mut self, items: Vec<SelectItem>) -> Self {
        self.returning = items;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub(crate) table: TableRef,
    pub(crate) assignments: Vec<(String, Expr)>,
    pub(crate) filter: Option<Expr>,
    pub(crate) returning: Vec<SelectItem>,
}

impl Update {
    pub fn new(table: TableRef, assignments: Vec<(String, Expr)>) -> ConstructionResult<Self> {
        if assignments.is_empty() {
            return Err(ConstructionError::EmptyAssignments);
        }
        Ok(Self {
            table,
            assignments,
            filter: None,
            returning: Vec::new(),
        })
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn returning(mut self, items: Vec<SelectItem>) -> Self {
        self.returning = items;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub(crate) table: TableRef,
    pub(crate) filter: Option<Expr>,
    pub(crate) returning: Vec<SelectItem>,
}

impl Delete {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            filter: None,
            returning: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn returning(mut self, items: Vec<SelectItem>) -> Self {
        self.returning = items;
        self
    }
}

/// Any compilable top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Query),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert(_))
    }
}

impl From<Query> for Statement {
    fn from(value: Query) -> Self {
        Self::Select(value)
    }
}

impl From<Insert> for Statement {
    fn from(value: Insert) -> Self {
        Self::Insert(value)
    }
}

impl From<Update> for Statement {
    fn from(value: Update) -> Self {
        Self::Update(value)
    }
}

impl From<Delete> for Statement {
    fn from(value: Delete) -> Self {
        Self::Delete(value)
    }
}
