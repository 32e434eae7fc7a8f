//! Window specifications and ordering terms.

use super::Expr;

/// Sort direction of one ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Explicit placement of NULLs in an ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

impl NullsOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::First => "NULLS FIRST",
            Self::Last => "NULLS LAST",
        }
    }
}

/// One `ORDER BY` term, used by queries and window specifications.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub(crate) expr: Expr,
    pub(crate) direction: SortDirection,
    pub(crate) nulls: Option<NullsOrder>,
}

impl OrderBy {
    pub fn new(expr: Expr, direction: SortDirection) -> Self {
        Self {
            expr,
            direction,
            nulls: None,
        }
    }

    /// Requests explicit NULL placement. Gated by the `nulls_ordering` capability.
    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

/// Window frame unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Rows,
    Range,
    Groups,
}

impl FrameKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Rows => "ROWS",
            Self::Range => "RANGE",
            Self::Groups => "GROUPS",
        }
    }
}

/// One end of a window frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

impl FrameBound {
    pub fn to_sql(self) -> String {
        match self {
            Self::UnboundedPreceding => "UNBOUNDED PRECEDING".to_string(),
            Self::Preceding(offset) => format!("{offset} PRECEDING"),
            Self::CurrentRow => "CURRENT ROW".to_string(),
            Self::Following(offset) => format!("{offset} FOLLOWING"),
            Self::UnboundedFollowing => "UNBOUNDED FOLLOWING".to_string(),
        }
    }
}

/// Window frame clause.
///
/// Bounds are rendered exactly as given; whether a bound pair is legal for
/// the frame unit is left to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub start: FrameBound,
    pub end: FrameBound,
}

impl Frame {
    pub fn new(kind: FrameKind, start: FrameBound, end: FrameBound) -> Self {
        Self { kind, start, end }
    }
}

/// `OVER (...)` body of a window call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSpec {
    pub(crate) partition_by: Vec<Expr>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) frame: Option<Frame>,
}

impl WindowSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_by(mut self, expr: Expr) -> Self {
        self.partition_by.push(expr);
        self
    }

    pub fn order_by(mut self, term: OrderBy) -> Self {
        self.order_by.push(term);
        self
    }

    pub fn frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }
}
