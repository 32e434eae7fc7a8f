//! Immutable SQL expression tree.
//!
//! # Responsibility
//! - Model every expression node kind as one variant of a closed sum type.
//! - Validate node composition when the node is built, not when it is compiled.
//!
//! # Invariants
//! - Nodes never change after construction; builder methods consume and return.
//! - Variant payloads are only constructible through validating builders, so a
//!   compiled tree is always well formed.
//! - User values enter a tree only as `Expr::Literal` (or raw fragment values),
//!   which always compile to placeholders.

use crate::query::Query;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod window;

pub use window::{Frame, FrameBound, FrameKind, NullsOrder, OrderBy, SortDirection, WindowSpec};

static FUNCTION_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("valid function name regex")
});

pub type ConstructionResult<T> = Result<T, ConstructionError>;

/// Malformed node composition, reported at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// `BETWEEN` needs exactly a lower and an upper bound.
    BetweenBounds { found: usize },
    /// `IN (...)` with no candidates.
    EmptyInList,
    /// `CASE` without a `WHEN` branch.
    EmptyCase,
    /// `AND`/`OR` over zero operands.
    EmptyLogical { op: &'static str },
    /// Function names are rendered verbatim and must be plain identifiers.
    InvalidFunctionName(String),
    /// `DISTINCT` aggregate without an argument.
    DistinctWithoutArgument { function: String },
    /// `.filter()` applied to something other than an aggregate call.
    FilterOnNonAggregate,
    /// `.over()` applied to something other than a function or aggregate call.
    WindowOnNonFunction,
    /// Raw fragment `?` markers do not match its bound values.
    RawParameterMismatch { markers: usize, values: usize },
    /// `LIKE ... ESCAPE` character that cannot be used as an escape.
    InvalidLikeEscape(char),
    /// Query or statement shape errors.
    EmptySelectList,
    EmptyGrouping,
    EmptyInsertColumns,
    EmptyInsertRows,
    InsertRowArity {
        row: usize,
        expected: usize,
        found: usize,
    },
    EmptyAssignments,
}

impl Display for ConstructionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BetweenBounds { found } => {
                write!(f, "BETWEEN requires exactly 2 bounds, got {found}")
            }
            Self::EmptyInList => write!(f, "IN list must contain at least one value"),
            Self::EmptyCase => write!(f, "CASE requires at least one WHEN branch"),
            Self::EmptyLogical { op } => write!(f, "{op} requires at least one operand"),
            Self::InvalidFunctionName(name) => write!(f, "invalid function name `{name}`"),
            Self::DistinctWithoutArgument { function } => {
                write!(f, "DISTINCT {function} requires an argument")
            }
            Self::FilterOnNonAggregate => {
                write!(f, "FILTER can only be applied to an aggregate call")
            }
            Self::WindowOnNonFunction => {
                write!(f, "OVER can only be applied to a function or aggregate call")
            }
            Self::RawParameterMismatch { markers, values } => write!(
                f,
                "raw fragment has {markers} placeholder markers but {values} values"
            ),
            Self::InvalidLikeEscape(escape) => write!(f, "invalid LIKE escape character `{escape}`"),
            Self::EmptySelectList => write!(f, "select list must not be empty"),
            Self::EmptyGrouping => write!(f, "grouping specification must not be empty"),
            Self::EmptyInsertColumns => write!(f, "INSERT requires at least one column"),
            Self::EmptyInsertRows => write!(f, "INSERT requires at least one row"),
            Self::InsertRowArity {
                row,
                expected,
                found,
            } => write!(
                f,
                "INSERT row {row} has {found} values, expected {expected}"
            ),
            Self::EmptyAssignments => write!(f, "UPDATE requires at least one assignment"),
        }
    }
}

impl Error for ConstructionError {}

/// Infix operators of a binary predicate or arithmetic node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl BinaryOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl LogicalOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub(crate) table: Option<String>,
    pub(crate) name: String,
}

impl ColumnRef {
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub(crate) name: String,
    pub(crate) args: Vec<Expr>,
}

impl FunctionCall {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Expr] {
        &self.args
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub(crate) name: String,
    pub(crate) args: Vec<Expr>,
    pub(crate) distinct: bool,
    pub(crate) filter: Option<Box<Expr>>,
}

impl AggregateCall {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryPredicate {
    pub(crate) left: Box<Expr>,
    pub(crate) op: BinaryOp,
    pub(crate) right: Box<Expr>,
}

impl BinaryPredicate {
    pub fn op(&self) -> BinaryOp {
        self.op
    }
}

/// `AND`/`OR` over one or more operands, or `NOT` over exactly one.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalPredicate {
    pub(crate) op: LogicalOp,
    pub(crate) operands: Vec<Expr>,
}

impl LogicalPredicate {
    pub fn op(&self) -> LogicalOp {
        self.op
    }

    pub fn operands(&self) -> &[Expr] {
        &self.operands
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LikePredicate {
    pub(crate) expr: Box<Expr>,
    pub(crate) pattern: Box<Expr>,
    pub(crate) negated: bool,
    pub(crate) case_insensitive: bool,
    pub(crate) escape: Option<char>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InList {
    Values(Vec<Expr>),
    Subquery(Box<Query>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InPredicate {
    pub(crate) expr: Box<Expr>,
    pub(crate) list: InList,
    pub(crate) negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetweenPredicate {
    pub(crate) expr: Box<Expr>,
    pub(crate) low: Box<Expr>,
    pub(crate) high: Box<Expr>,
    pub(crate) negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsNullPredicate {
    pub(crate) expr: Box<Expr>,
    pub(crate) negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowCall {
    pub(crate) function: Box<Expr>,
    pub(crate) spec: WindowSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpression {
    pub(crate) operand: Option<Box<Expr>>,
    pub(crate) branches: Vec<(Expr, Expr)>,
    pub(crate) else_result: Option<Box<Expr>>,
}

/// Verbatim SQL text, optionally with values bound through `?` markers.
///
/// Never build the text from user input; user values go through the bound
/// values so they stay out of the SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFragment {
    pub(crate) sql: String,
    pub(crate) values: Vec<Value>,
}

impl RawFragment {
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// One node of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Function(FunctionCall),
    Aggregate(AggregateCall),
    Binary(BinaryPredicate),
    Logical(LogicalPredicate),
    Like(LikePredicate),
    In(InPredicate),
    Between(BetweenPredicate),
    IsNull(IsNullPredicate),
    Window(WindowCall),
    Case(CaseExpression),
    Raw(RawFragment),
}

impl Expr {
    /// Bare column reference.
    pub fn col(name: impl Into<String>) -> Self {
        Self::Column(ColumnRef {
            table: None,
            name: name.into(),
        })
    }

    /// Table-qualified column reference.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Column(ColumnRef {
            table: Some(table.into()),
            name: name.into(),
        })
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Raw SQL without bound values; it must not contain `?` markers.
    pub fn raw(sql: impl Into<String>) -> ConstructionResult<Self> {
        Self::raw_with_values(sql, Vec::new())
    }

    /// Raw SQL whose `?` markers (outside quoted text) bind `values` in order.
    pub fn raw_with_values(sql: impl Into<String>, values: Vec<Value>) -> ConstructionResult<Self> {
        let sql = sql.into();
        let markers = raw_marker_offsets(&sql).len();
        if markers != values.len() {
            return Err(ConstructionError::RawParameterMismatch {
                markers,
                values: values.len(),
            });
        }
        Ok(Self::Raw(RawFragment { sql, values }))
    }

    /// Scalar function call, e.g. `LOWER(name)`.
    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> ConstructionResult<Self> {
        let name = validate_function_name(name.into())?;
        Ok(Self::Function(FunctionCall { name, args }))
    }

    /// Aggregate call, e.g. `SUM(amount)` or `COUNT(DISTINCT id)`.
    pub fn aggregate(
        name: impl Into<String>,
        args: Vec<Expr>,
        distinct: bool,
    ) -> ConstructionResult<Self> {
        let name = validate_function_name(name.into())?;
        if distinct && args.is_empty() {
            return Err(ConstructionError::DistinctWithoutArgument { function: name });
        }
        Ok(Self::Aggregate(AggregateCall {
            name,
            args,
            distinct,
            filter: None,
        }))
    }

    pub fn count_star() -> Self {
        let star = Self::Raw(RawFragment {
            sql: "*".to_string(),
            values: Vec::new(),
        });
        Self::known_aggregate("COUNT", vec![star])
    }

    pub fn count(self) -> Self {
        Self::known_aggregate("COUNT", vec![self])
    }

    pub fn count_distinct(self) -> Self {
        Self::Aggregate(AggregateCall {
            name: "COUNT".to_string(),
            args: vec![self],
            distinct: true,
            filter: None,
        })
    }

    pub fn sum(self) -> Self {
        Self::known_aggregate("SUM", vec![self])
    }

    pub fn avg(self) -> Self {
        Self::known_aggregate("AVG", vec![self])
    }

    pub fn min(self) -> Self {
        Self::known_aggregate("MIN", vec![self])
    }

    pub fn max(self) -> Self {
        Self::known_aggregate("MAX", vec![self])
    }

    pub fn row_number() -> Self {
        Self::known_function("ROW_NUMBER", Vec::new())
    }

    pub fn rank() -> Self {
        Self::known_function("RANK", Vec::new())
    }

    pub fn dense_rank() -> Self {
        Self::known_function("DENSE_RANK", Vec::new())
    }

    fn known_function(name: &str, args: Vec<Expr>) -> Self {
        Self::Function(FunctionCall {
            name: name.to_string(),
            args,
        })
    }

    fn known_aggregate(name: &str, args: Vec<Expr>) -> Self {
        Self::Aggregate(AggregateCall {
            name: name.to_string(),
            args,
            distinct: false,
            filter: None,
        })
    }

    /// Adds `FILTER (WHERE predicate)` to an aggregate call.
    ///
    /// Applying a second filter combines both predicates with `AND`.
    pub fn filter(self, predicate: Expr) -> ConstructionResult<Self> {
        match self {
            Self::Aggregate(mut call) => {
                call.filter = Some(Box::new(match call.filter.take() {
                    Some(existing) => (*existing).and(predicate),
                    None => predicate,
                }));
                Ok(Self::Aggregate(call))
            }
            _ => Err(ConstructionError::FilterOnNonAggregate),
        }
    }

    /// Turns a function or aggregate call into a window call.
    pub fn over(self, spec: WindowSpec) -> ConstructionResult<Self> {
        match self {
            Self::Function(_) | Self::Aggregate(_) => Ok(Self::Window(WindowCall {
                function: Box::new(self),
                spec,
            })),
            _ => Err(ConstructionError::WindowOnNonFunction),
        }
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Self::Binary(BinaryPredicate {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        })
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn not_eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::NotEq, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn lt_eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::LtEq, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn gt_eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::GtEq, other)
    }

    pub fn add(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn mul(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mul, other)
    }

    pub fn div(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Div, other)
    }

    pub fn modulo(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mod, other)
    }

    pub fn concat(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Concat, other)
    }

    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.logical(LogicalOp::And, other.into())
    }

    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.logical(LogicalOp::Or, other.into())
    }

    // Same-operator chains are flattened so `a.and(b).and(c)` renders `a AND b AND c`.
    fn logical(self, op: LogicalOp, other: Expr) -> Self {
        let mut operands = match self {
            Self::Logical(predicate) if predicate.op == op => predicate.operands,
            other_expr => vec![other_expr],
        };
        match other {
            Self::Logical(predicate) if predicate.op == op => operands.extend(predicate.operands),
            other_expr => operands.push(other_expr),
        }
        Self::Logical(LogicalPredicate { op, operands })
    }

    /// `AND` over every operand.
    pub fn all(operands: Vec<Expr>) -> ConstructionResult<Self> {
        Self::combine(LogicalOp::And, operands)
    }

    /// `OR` over every operand.
    pub fn any(operands: Vec<Expr>) -> ConstructionResult<Self> {
        Self::combine(LogicalOp::Or, operands)
    }

    fn combine(op: LogicalOp, operands: Vec<Expr>) -> ConstructionResult<Self> {
        if operands.is_empty() {
            return Err(ConstructionError::EmptyLogical { op: op.as_sql() });
        }
        Ok(Self::Logical(LogicalPredicate { op, operands }))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Logical(LogicalPredicate {
            op: LogicalOp::Not,
            operands: vec![self],
        })
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Self {
        self.like_predicate(pattern.into(), false, false)
    }

    pub fn not_like(self, pattern: impl Into<Expr>) -> Self {
        self.like_predicate(pattern.into(), true, false)
    }

    /// Case-insensitive LIKE. Gated by the `ilike` capability.
    pub fn ilike(self, pattern: impl Into<Expr>) -> Self {
        self.like_predicate(pattern.into(), false, true)
    }

    fn like_predicate(self, pattern: Expr, negated: bool, case_insensitive: bool) -> Self {
        Self::Like(LikePredicate {
            expr: Box::new(self),
            pattern: Box::new(pattern),
            negated,
            case_insensitive,
            escape: None,
        })
    }

    /// Adds `ESCAPE 'c'` to a LIKE predicate.
    pub fn escape(self, escape: char) -> ConstructionResult<Self> {
        if escape == '\'' || escape.is_whitespace() || escape.is_control() {
            return Err(ConstructionError::InvalidLikeEscape(escape));
        }
        match self {
            Self::Like(mut predicate) => {
                predicate.escape = Some(escape);
                Ok(Self::Like(predicate))
            }
            _ => Err(ConstructionError::InvalidLikeEscape(escape)),
        }
    }

    pub fn in_list(self, values: Vec<Expr>) -> ConstructionResult<Self> {
        self.in_predicate(values, false)
    }

    pub fn not_in_list(self, values: Vec<Expr>) -> ConstructionResult<Self> {
        self.in_predicate(values, true)
    }

    fn in_predicate(self, values: Vec<Expr>, negated: bool) -> ConstructionResult<Self> {
        if values.is_empty() {
            return Err(ConstructionError::EmptyInList);
        }
        Ok(Self::In(InPredicate {
            expr: Box::new(self),
            list: InList::Values(values),
            negated,
        }))
    }

    pub fn in_subquery(self, query: Query) -> Self {
        Self::In(InPredicate {
            expr: Box::new(self),
            list: InList::Subquery(Box::new(query)),
            negated: false,
        })
    }

    pub fn not_in_subquery(self, query: Query) -> Self {
        Self::In(InPredicate {
            expr: Box::new(self),
            list: InList::Subquery(Box::new(query)),
            negated: true,
        })
    }

    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Self {
        self.between_predicate(low.into(), high.into(), false)
    }

    pub fn not_between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Self {
        self.between_predicate(low.into(), high.into(), true)
    }

    /// `BETWEEN` from a dynamically sized bound list; exactly two bounds are required.
    pub fn between_bounds(self, bounds: Vec<Expr>) -> ConstructionResult<Self> {
        let found = bounds.len();
        let mut bounds = bounds.into_iter();
        match (bounds.next(), bounds.next(), bounds.next()) {
            (Some(low), Some(high), None) => Ok(self.between_predicate(low, high, false)),
            _ => Err(ConstructionError::BetweenBounds { found }),
        }
    }

    fn between_predicate(self, low: Expr, high: Expr, negated: bool) -> Self {
        Self::Between(BetweenPredicate {
            expr: Box::new(self),
            low: Box::new(low),
            high: Box::new(high),
            negated,
        })
    }

    pub fn is_null(self) -> Self {
        Self::IsNull(IsNullPredicate {
            expr: Box::new(self),
            negated: false,
        })
    }

    pub fn is_not_null(self) -> Self {
        Self::IsNull(IsNullPredicate {
            expr: Box::new(self),
            negated: true,
        })
    }

    pub fn asc(self) -> OrderBy {
        OrderBy::new(self, SortDirection::Asc)
    }

    pub fn desc(self) -> OrderBy {
        OrderBy::new(self, SortDirection::Desc)
    }

    /// Starts a searched `CASE WHEN ... END`.
    pub fn case() -> CaseBuilder {
        CaseBuilder {
            operand: None,
            branches: Vec::new(),
        }
    }

    /// Starts a simple `CASE operand WHEN ... END`.
    pub fn case_of(operand: Expr) -> CaseBuilder {
        CaseBuilder {
            operand: Some(Box::new(operand)),
            branches: Vec::new(),
        }
    }

    /// The node that actually renders, looking through single-operand `AND`/`OR`.
    pub(crate) fn rendered_node(&self) -> &Expr {
        let mut node = self;
        while let Self::Logical(LogicalPredicate {
            op: LogicalOp::And | LogicalOp::Or,
            operands,
        }) = node
        {
            match operands.as_slice() {
                [only] => node = only,
                _ => break,
            }
        }
        node
    }

    /// Whether this node renders as a compound `AND`/`OR`.
    pub(crate) fn is_compound_logical(&self) -> bool {
        matches!(
            self.rendered_node(),
            Self::Logical(LogicalPredicate {
                op: LogicalOp::And | LogicalOp::Or,
                ..
            })
        )
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

macro_rules! literal_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Self::Literal(value.into())
                }
            }
        )*
    };
}

literal_from!(bool, i32, i64, u32, f64, &str, String);

/// Builder for `CASE` expressions.
#[derive(Debug, Clone)]
pub struct CaseBuilder {
    operand: Option<Box<Expr>>,
    branches: Vec<(Expr, Expr)>,
}

impl CaseBuilder {
    pub fn when(mut self, condition: impl Into<Expr>, result: impl Into<Expr>) -> Self {
        self.branches.push((condition.into(), result.into()));
        self
    }

    pub fn otherwise(self, result: impl Into<Expr>) -> ConstructionResult<Expr> {
        self.finish(Some(Box::new(result.into())))
    }

    pub fn end(self) -> ConstructionResult<Expr> {
        self.finish(None)
    }

    fn finish(self, else_result: Option<Box<Expr>>) -> ConstructionResult<Expr> {
        if self.branches.is_empty() {
            return Err(ConstructionError::EmptyCase);
        }
        Ok(Expr::Case(CaseExpression {
            operand: self.operand,
            branches: self.branches,
            else_result,
        }))
    }
}

fn validate_function_name(name: String) -> ConstructionResult<String> {
    if FUNCTION_NAME_RE.is_match(&name) {
        Ok(name)
    } else {
        Err(ConstructionError::InvalidFunctionName(name))
    }
}

/// Byte offsets of `?` markers in raw SQL, skipping quoted text.
pub(crate) fn raw_marker_offsets(sql: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut quote: Option<char> = None;
    for (offset, ch) in sql.char_indices() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '?' => offsets.push(offset),
                _ => {}
            },
        }
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::{raw_marker_offsets, ConstructionError, Expr, LogicalOp};
    use crate::value::Value;

    #[test]
    fn between_bounds_requires_exactly_two() {
        let err = Expr::col("age")
            .between_bounds(vec![Expr::lit(1)])
            .expect_err("one bound must fail");
        assert_eq!(err, ConstructionError::BetweenBounds { found: 1 });

        let err = Expr::col("age")
            .between_bounds(vec![Expr::lit(1), Expr::lit(2), Expr::lit(3)])
            .expect_err("three bounds must fail");
        assert_eq!(err, ConstructionError::BetweenBounds { found: 3 });

        assert!(Expr::col("age")
            .between_bounds(vec![Expr::lit(1), Expr::lit(2)])
            .is_ok());
    }

    #[test]
    fn empty_in_list_and_case_are_rejected() {
        assert_eq!(
            Expr::col("id").in_list(Vec::new()),
            Err(ConstructionError::EmptyInList)
        );
        assert_eq!(Expr::case().end(), Err(ConstructionError::EmptyCase));
        assert_eq!(
            Expr::all(Vec::new()),
            Err(ConstructionError::EmptyLogical { op: "AND" })
        );
    }

    #[test]
    fn function_names_must_be_identifiers() {
        assert!(Expr::function("lower", vec![Expr::col("name")]).is_ok());
        assert!(Expr::function("pg_catalog.lower", vec![]).is_ok());
        let err = Expr::function("lower(1); DROP TABLE x; --", vec![])
            .expect_err("injected name must fail");
        assert!(matches!(err, ConstructionError::InvalidFunctionName(_)));
    }

    #[test]
    fn same_operator_chains_flatten() {
        let expr = Expr::col("a")
            .eq(Expr::lit(1))
            .and(Expr::col("b").eq(Expr::lit(2)))
            .and(Expr::col("c").eq(Expr::lit(3)));
        match expr {
            Expr::Logical(predicate) => {
                assert_eq!(predicate.op(), LogicalOp::And);
                assert_eq!(predicate.operands().len(), 3);
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn repeated_filters_combine_with_and() {
        let expr = Expr::col("amount")
            .sum()
            .filter(Expr::col("paid").eq(Expr::lit(true)))
            .unwrap()
            .filter(Expr::col("region").eq(Expr::lit("eu")))
            .unwrap();
        match expr {
            Expr::Aggregate(call) => match call.filter() {
                Some(Expr::Logical(predicate)) => {
                    assert_eq!(predicate.op(), LogicalOp::And);
                    assert_eq!(predicate.operands().len(), 2);
                }
                other => panic!("unexpected filter: {other:?}"),
            },
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn filter_and_over_require_calls() {
        assert_eq!(
            Expr::col("a").filter(Expr::lit(true)),
            Err(ConstructionError::FilterOnNonAggregate)
        );
        assert_eq!(
            Expr::col("a").over(Default::default()),
            Err(ConstructionError::WindowOnNonFunction)
        );
        assert!(Expr::aggregate("count", Vec::new(), true).is_err());
    }

    #[test]
    fn raw_markers_skip_quoted_text() {
        assert_eq!(raw_marker_offsets("a = ? AND b = '?'"), vec![4]);
        let err = Expr::raw_with_values("x = ? OR y = ?", vec![Value::Integer(1)])
            .expect_err("marker mismatch must fail");
        assert_eq!(
            err,
            ConstructionError::RawParameterMismatch {
                markers: 2,
                values: 1
            }
        );
    }

    #[test]
    fn raw_without_values_rejects_markers() {
        assert!(Expr::raw("CURRENT_TIMESTAMP").is_ok());
        assert!(Expr::raw("'?' = '?'").is_ok());
        assert!(Expr::raw("a = ?").is_err());
    }

    #[test]
    fn escape_requires_like_predicate() {
        assert!(Expr::col("name").like(Expr::lit("a!%")).escape('!').is_ok());
        assert!(Expr::col("name").escape('!').is_err());
        assert!(Expr::col("name").like(Expr::lit("a")).escape('\'').is_err());
    }
}
