//! Expression and query compilation into SQL text plus positional parameters.
//!
//! # Responsibility
//! - Walk expression trees and statements in SQL emission order.
//! - Gate feature-specific constructs on the dialect's capabilities.
//! - Delegate every fragment's text to the dialect.
//!
//! # Invariants
//! - Literal values are never inlined; each becomes one placeholder and one
//!   collected parameter, in SQL text order.
//! - Compiling the same tree with the same dialect and a fresh collector yields
//!   identical SQL and parameters.
//! - Unsupported features fail the whole compilation; no partial SQL escapes.
//! - Semantic validity (column counts across set operations, frame bounds, types)
//!   is not checked here.

use crate::dialect::{Dialect, Feature};
use crate::expr::{raw_marker_offsets, Expr, InList, LogicalOp, OrderBy, RawFragment};
use crate::query::{
    Cte, Delete, Grouping, Insert, Join, Query, SelectItem, SetOperator, Source, Statement,
    TableRef, Update,
};
use crate::value::Value;
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod params;

pub use params::ParameterCollector;

pub type CompileResult<T> = Result<T, CompileError>;

const SET_BRANCH_ALIAS: &str = "set_branch";

/// Compilation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The tree uses a feature the dialect does not declare.
    UnsupportedFeature {
        feature: Feature,
        dialect: &'static str,
    },
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedFeature { feature, dialect } => write!(
                f,
                "dialect `{dialect}` does not support {}",
                feature.as_str()
            ),
        }
    }
}

impl Error for CompileError {}

/// Final SQL text and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Compiles one statement with a fresh parameter collector.
pub fn compile(statement: &Statement, dialect: &dyn Dialect) -> CompileResult<CompiledQuery> {
    let mut params = ParameterCollector::new();
    match compile_statement(statement, dialect, &mut params) {
        Ok(sql) => Ok(CompiledQuery {
            sql,
            params: params.into_values(),
        }),
        Err(err) => {
            warn!(
                "event=compile_rejected module=compile status=error dialect={} error={}",
                dialect.name(),
                err
            );
            Err(err)
        }
    }
}

/// Compiles one expression, appending its literal values to `params`.
///
/// On error `params` is left exactly as it was passed in.
pub fn compile_expr(
    expr: &Expr,
    dialect: &dyn Dialect,
    params: &mut ParameterCollector,
) -> CompileResult<String> {
    with_rollback(params, |compiler| compiler.expr(expr), dialect)
}

pub fn compile_query(
    query: &Query,
    dialect: &dyn Dialect,
    params: &mut ParameterCollector,
) -> CompileResult<String> {
    with_rollback(params, |compiler| compiler.query(query), dialect)
}

pub fn compile_statement(
    statement: &Statement,
    dialect: &dyn Dialect,
    params: &mut ParameterCollector,
) -> CompileResult<String> {
    with_rollback(
        params,
        |compiler| match statement {
            Statement::Select(query) => compiler.query(query),
            Statement::Insert(insert) => compiler.insert(insert),
            Statement::Update(update) => compiler.update(update),
            Statement::Delete(delete) => compiler.delete(delete),
        },
        dialect,
    )
}

// Values collected by a rejected walk are dropped again.
fn with_rollback<F>(
    params: &mut ParameterCollector,
    walk: F,
    dialect: &dyn Dialect,
) -> CompileResult<String>
where
    F: FnOnce(&mut Compiler<'_>) -> CompileResult<String>,
{
    let mark = params.len();
    let result = walk(&mut Compiler {
        dialect,
        params: &mut *params,
    });
    if result.is_err() {
        params.truncate(mark);
    }
    result
}

struct Compiler<'a> {
    dialect: &'a dyn Dialect,
    params: &'a mut ParameterCollector,
}

impl Compiler<'_> {
    fn require(&self, feature: Feature) -> CompileResult<()> {
        if self.dialect.supports(feature) {
            return Ok(());
        }
        Err(CompileError::UnsupportedFeature {
            feature,
            dialect: self.dialect.name(),
        })
    }

    fn bind(&mut self, value: &Value) -> String {
        let index = self.params.push(value.clone());
        self.dialect.placeholder(index)
    }

    fn expr(&mut self, expr: &Expr) -> CompileResult<String> {
        let sql = match expr {
            Expr::Column(column) => self
                .dialect
                .render_column(column.table.as_deref(), &column.name),
            Expr::Literal(value) => self.bind(value),
            Expr::Function(call) => {
                let args = self.exprs(&call.args)?;
                self.dialect.render_function(&call.name, &args)
            }
            Expr::Aggregate(call) => {
                let args = self.exprs(&call.args)?;
                let filter = match &call.filter {
                    Some(predicate) => {
                        self.require(Feature::FilterClause)?;
                        Some(self.expr(predicate)?)
                    }
                    None => None,
                };
                self.dialect
                    .render_aggregate(&call.name, &args, call.distinct, filter.as_deref())
            }
            Expr::Binary(predicate) => {
                let left = self.operand(&predicate.left)?;
                let right = self.operand(&predicate.right)?;
                self.dialect.render_binary(predicate.op, &left, &right)
            }
            Expr::Logical(predicate) => {
                if predicate.op != LogicalOp::Not && predicate.operands.len() == 1 {
                    return self.expr(&predicate.operands[0]);
                }
                let mut operands = Vec::with_capacity(predicate.operands.len());
                for operand in &predicate.operands {
                    if predicate.op == LogicalOp::Not {
                        operands.push(self.expr(operand)?);
                    } else {
                        operands.push(self.logical_operand(operand)?);
                    }
                }
                self.dialect.render_logical(predicate.op, &operands)
            }
            Expr::Like(predicate) => {
                if predicate.case_insensitive {
                    self.require(Feature::Ilike)?;
                }
                let subject = self.operand(&predicate.expr)?;
                let pattern = self.operand(&predicate.pattern)?;
                self.dialect.render_like(
                    &subject,
                    &pattern,
                    predicate.negated,
                    predicate.case_insensitive,
                    predicate.escape,
                )
            }
            Expr::In(predicate) => {
                let subject = self.operand(&predicate.expr)?;
                let items = match &predicate.list {
                    InList::Values(values) => self.exprs(values)?.join(", "),
                    InList::Subquery(query) => self.query(query)?,
                };
                self.dialect.render_in(&subject, &items, predicate.negated)
            }
            Expr::Between(predicate) => {
                let subject = self.operand(&predicate.expr)?;
                let low = self.operand(&predicate.low)?;
                let high = self.operand(&predicate.high)?;
                self.dialect
                    .render_between(&subject, &low, &high, predicate.negated)
            }
            Expr::IsNull(predicate) => {
                let subject = self.operand(&predicate.expr)?;
                self.dialect.render_is_null(&subject, predicate.negated)
            }
            Expr::Window(call) => {
                self.require(Feature::WindowFunctions)?;
                let function = self.expr(&call.function)?;
                let partition_by = self.exprs(&call.spec.partition_by)?;
                let order_by = self.order_terms(&call.spec.order_by)?;
                self.dialect.render_window(
                    &function,
                    &partition_by,
                    &order_by,
                    call.spec.frame.as_ref(),
                )
            }
            Expr::Case(case) => {
                let operand = match &case.operand {
                    Some(operand) => Some(self.operand(operand)?),
                    None => None,
                };
                let mut branches = Vec::with_capacity(case.branches.len());
                for (condition, result) in &case.branches {
                    let condition = self.expr(condition)?;
                    let result = self.expr(result)?;
                    branches.push((condition, result));
                }
                let else_result = match &case.else_result {
                    Some(result) => Some(self.expr(result)?),
                    None => None,
                };
                self.dialect
                    .render_case(operand.as_deref(), &branches, else_result.as_deref())
            }
            Expr::Raw(fragment) => self.raw(fragment),
        };
        Ok(sql)
    }

    fn exprs(&mut self, exprs: &[Expr]) -> CompileResult<Vec<String>> {
        exprs.iter().map(|expr| self.expr(expr)).collect()
    }

    /// Compiles a child of an infix/postfix construct, parenthesizing anything
    /// that is not atomic so nesting never changes precedence.
    fn operand(&mut self, expr: &Expr) -> CompileResult<String> {
        let sql = self.expr(expr)?;
        let atomic = matches!(
            expr,
            Expr::Column(_)
                | Expr::Literal(_)
                | Expr::Function(_)
                | Expr::Aggregate(_)
                | Expr::Window(_)
                | Expr::Case(_)
        );
        if atomic {
            Ok(sql)
        } else {
            Ok(format!("({sql})"))
        }
    }

    /// Compiles an `AND`/`OR` operand. Compound logic and opaque raw text are
    /// parenthesized; predicates and `NOT` already bind tighter than `AND`.
    fn logical_operand(&mut self, expr: &Expr) -> CompileResult<String> {
        let sql = self.expr(expr)?;
        let node = expr.rendered_node();
        if matches!(node, Expr::Raw(_)) || node.is_compound_logical() {
            Ok(format!("({sql})"))
        } else {
            Ok(sql)
        }
    }

    fn raw(&mut self, fragment: &RawFragment) -> String {
        if fragment.values.is_empty() {
            return fragment.sql.clone();
        }
        let mut sql = String::with_capacity(fragment.sql.len());
        let mut cursor = 0;
        for (offset, value) in raw_marker_offsets(&fragment.sql)
            .into_iter()
            .zip(&fragment.values)
        {
            sql.push_str(&fragment.sql[cursor..offset]);
            sql.push_str(&self.bind(value));
            cursor = offset + 1;
        }
        sql.push_str(&fragment.sql[cursor..]);
        sql
    }

    fn order_terms(&mut self, terms: &[OrderBy]) -> CompileResult<Vec<String>> {
        let mut rendered = Vec::with_capacity(terms.len());
        for term in terms {
            let mut sql = format!("{} {}", self.expr(&term.expr)?, term.direction.as_sql());
            if let Some(nulls) = term.nulls {
                self.require(Feature::NullsOrdering)?;
                sql.push(' ');
                sql.push_str(nulls.as_sql());
            }
            rendered.push(sql);
        }
        Ok(rendered)
    }

    fn query(&mut self, query: &Query) -> CompileResult<String> {
        let mut clauses = Vec::new();

        if !query.ctes.is_empty() {
            clauses.push(self.with_clause(&query.ctes)?);
        }

        let distinct = if query.distinct { "DISTINCT " } else { "" };
        clauses.push(format!(
            "SELECT {distinct}{}",
            self.select_items(&query.select)?
        ));

        if let Some(source) = &query.from {
            clauses.push(format!("FROM {}", self.source(source)?));
        }
        for join in &query.joins {
            clauses.push(self.join(join)?);
        }
        if let Some(filter) = &query.filter {
            clauses.push(format!("WHERE {}", self.expr(filter)?));
        }
        if let Some(grouping) = &query.group_by {
            clauses.push(format!("GROUP BY {}", self.grouping(grouping)?));
        }
        if let Some(having) = &query.having {
            clauses.push(format!("HAVING {}", self.expr(having)?));
        }

        // Each branch compiles on its own; compatibility is left to the database.
        for set_op in &query.set_ops {
            if set_op.op != SetOperator::Union {
                self.require(Feature::IntersectExcept)?;
            }
            let all = if set_op.all { " ALL" } else { "" };
            let right = self.set_branch(&set_op.query)?;
            clauses.push(format!("{}{all} {right}", set_op.op.as_sql()));
        }

        if !query.order_by.is_empty() {
            clauses.push(format!(
                "ORDER BY {}",
                self.order_terms(&query.order_by)?.join(", ")
            ));
        }

        let limit = query.limit.map(|limit| self.bind(&count_value(limit)));
        let offset = query.offset.map(|offset| self.bind(&count_value(offset)));
        if let Some(tail) = self
            .dialect
            .render_limit_offset(limit.as_deref(), offset.as_deref())
        {
            clauses.push(tail);
        }

        Ok(clauses.join(" "))
    }

    /// Right-hand side of a set operation. A branch with its own WITH, ORDER BY,
    /// LIMIT/OFFSET or set operations is wrapped in a derived table so its clauses
    /// stay scoped to it.
    fn set_branch(&mut self, query: &Query) -> CompileResult<String> {
        let sql = self.query(query)?;
        if !query.is_compound_branch() {
            return Ok(sql);
        }
        Ok(format!(
            "SELECT * FROM ({sql}) AS {}",
            self.dialect.quote_identifier(SET_BRANCH_ALIAS)
        ))
    }

    fn with_clause(&mut self, ctes: &[Cte]) -> CompileResult<String> {
        self.require(Feature::CommonTableExpressions)?;
        let recursive = ctes.iter().any(Cte::is_recursive);
        if recursive {
            self.require(Feature::RecursiveCte)?;
        }

        let mut entries = Vec::with_capacity(ctes.len());
        for cte in ctes {
            let mut entry = self.dialect.quote_identifier(&cte.name);
            if !cte.columns.is_empty() {
                let columns = cte
                    .columns
                    .iter()
                    .map(|column| self.dialect.quote_identifier(column))
                    .collect::<Vec<_>>();
                entry.push_str(&format!(" ({})", columns.join(", ")));
            }
            entry.push_str(&format!(" AS ({})", self.query(&cte.query)?));
            entries.push(entry);
        }

        let keyword = if recursive { "WITH RECURSIVE" } else { "WITH" };
        Ok(format!("{keyword} {}", entries.join(", ")))
    }

    fn select_items(&mut self, items: &[SelectItem]) -> CompileResult<String> {
        let mut rendered = Vec::with_capacity(items.len());
        for item in items {
            match item {
                SelectItem::Expr { expr, alias } => {
                    let sql = self.expr(expr)?;
                    match alias {
                        Some(alias) => rendered.push(format!(
                            "{sql} AS {}",
                            self.dialect.quote_identifier(alias)
                        )),
                        None => rendered.push(sql),
                    }
                }
                SelectItem::Wildcard { table: Some(table) } => {
                    rendered.push(format!("{}.*", self.dialect.quote_identifier(table)));
                }
                SelectItem::Wildcard { table: None } => rendered.push("*".to_string()),
            }
        }
        Ok(rendered.join(", "))
    }

    fn table(&self, table: &TableRef) -> String {
        let mut sql = match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.dialect.quote_identifier(schema),
                self.dialect.quote_identifier(&table.name)
            ),
            None => self.dialect.quote_identifier(&table.name),
        };
        if let Some(alias) = &table.alias {
            sql.push_str(&format!(" AS {}", self.dialect.quote_identifier(alias)));
        }
        sql
    }

    fn source(&mut self, source: &Source) -> CompileResult<String> {
        match source {
            Source::Table(table) => Ok(self.table(table)),
            Source::Subquery { query, alias } => Ok(format!(
                "({}) AS {}",
                self.query(query)?,
                self.dialect.quote_identifier(alias)
            )),
        }
    }

    fn join(&mut self, join: &Join) -> CompileResult<String> {
        match join {
            Join::On { kind, source, on } => {
                let source = self.source(source)?;
                Ok(format!("{} {source} ON {}", kind.as_sql(), self.expr(on)?))
            }
            Join::Cross { source } => Ok(format!("CROSS JOIN {}", self.source(source)?)),
        }
    }

    fn grouping(&mut self, grouping: &Grouping) -> CompileResult<String> {
        if grouping.is_advanced() {
            self.require(Feature::AdvancedGrouping)?;
        }
        let sql = match grouping {
            Grouping::Columns(exprs) => self.exprs(exprs)?.join(", "),
            Grouping::Rollup(exprs) => format!("ROLLUP ({})", self.exprs(exprs)?.join(", ")),
            Grouping::Cube(exprs) => format!("CUBE ({})", self.exprs(exprs)?.join(", ")),
            Grouping::Sets(sets) => {
                let mut rendered = Vec::with_capacity(sets.len());
                for set in sets {
                    rendered.push(format!("({})", self.exprs(set)?.join(", ")));
                }
                format!("GROUPING SETS ({})", rendered.join(", "))
            }
        };
        Ok(sql)
    }

    fn returning(&mut self, items: &[SelectItem]) -> CompileResult<Option<String>> {
        if items.is_empty() {
            return Ok(None);
        }
        self.require(Feature::Returning)?;
        Ok(Some(format!("RETURNING {}", self.select_items(items)?)))
    }

    fn insert(&mut self, insert: &Insert) -> CompileResult<String> {
        let columns = insert
            .columns
            .iter()
            .map(|column| self.dialect.quote_identifier(column))
            .collect::<Vec<_>>();
        let mut rows = Vec::with_capacity(insert.rows.len());
        for row in &insert.rows {
            rows.push(format!("({})", self.exprs(row)?.join(", ")));
        }
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table(&insert.table),
            columns.join(", "),
            rows.join(", ")
        );
        if let Some(returning) = self.returning(&insert.returning)? {
            sql.push(' ');
            sql.push_str(&returning);
        }
        Ok(sql)
    }

    fn update(&mut self, update: &Update) -> CompileResult<String> {
        let mut assignments = Vec::with_capacity(update.assignments.len());
        for (column, value) in &update.assignments {
            assignments.push(format!(
                "{} = {}",
                self.dialect.quote_identifier(column),
                self.expr(value)?
            ));
        }
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.table(&update.table),
            assignments.join(", ")
        );
        if let Some(filter) = &update.filter {
            sql.push_str(&format!(" WHERE {}", self.expr(filter)?));
        }
        if let Some(returning) = self.returning(&update.returning)? {
            sql.push(' ');
            sql.push_str(&returning);
        }
        Ok(sql)
    }

    fn delete(&mut self, delete: &Delete) -> CompileResult<String> {
        let mut sql = format!("DELETE FROM {}", self.table(&delete.table));
        if let Some(filter) = &delete.filter {
            sql.push_str(&format!(" WHERE {}", self.expr(filter)?));
        }
        if let Some(returning) = self.returning(&delete.returning)? {
            sql.push(' ');
            sql.push_str(&returning);
        }
        Ok(sql)
    }
}

fn count_value(count: u64) -> Value {
    Value::Integer(i64::try_from(count).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::{compile, compile_expr, CompileError, ParameterCollector};
    use crate::dialect::{
        Capabilities, Feature, MysqlDialect, PostgresDialect, SqliteDialect, StandardDialect,
    };
    use crate::expr::{Expr, Frame, FrameBound, FrameKind, NullsOrder, WindowSpec};
    use crate::query::{Cte, Grouping, JoinKind, Query, SelectItem, Source, TableRef};
    use crate::value::Value;

    fn expr_sql(expr: &Expr) -> (String, Vec<Value>) {
        let mut params = ParameterCollector::new();
        let sql = compile_expr(expr, &StandardDialect::new(), &mut params).unwrap();
        (sql, params.into_values())
    }

    #[test]
    fn simple_predicate_scenario() {
        let expr = Expr::col("age")
            .gt_eq(Expr::lit(18))
            .and(Expr::col("status").eq(Expr::lit("active")));
        let (sql, params) = expr_sql(&expr);
        assert_eq!(sql, "\"age\" >= ? AND \"status\" = ?");
        assert_eq!(
            params,
            vec![Value::Integer(18), Value::Text("active".to_string())]
        );
    }

    #[test]
    fn nested_logical_operands_are_parenthesized() {
        let expr = Expr::col("a")
            .eq(Expr::lit(1))
            .or(Expr::col("b").eq(Expr::lit(2)))
            .and(Expr::col("c").is_null());
        let (sql, _) = expr_sql(&expr);
        assert_eq!(sql, "(\"a\" = ? OR \"b\" = ?) AND \"c\" IS NULL");

        let (sql, _) = expr_sql(&Expr::col("a").eq(Expr::lit(1)).not());
        assert_eq!(sql, "NOT (\"a\" = ?)");
    }

    #[test]
    fn single_operand_groups_keep_their_parentheses() {
        let either = Expr::any(vec![Expr::col("a")
            .eq(Expr::lit(1))
            .or(Expr::col("b").eq(Expr::lit(2)))])
        .unwrap();
        let (sql, params) = expr_sql(&either.clone().and(Expr::col("c").eq(Expr::lit(3))));
        assert_eq!(sql, "(\"a\" = ? OR \"b\" = ?) AND \"c\" = ?");
        assert_eq!(params.len(), 3);

        let wrapped = Expr::all(vec![either]).unwrap();
        let (sql, _) = expr_sql(&Expr::col("c").is_null().and(wrapped));
        assert_eq!(sql, "\"c\" IS NULL AND (\"a\" = ? OR \"b\" = ?)");

        let single = Expr::all(vec![Expr::col("a").eq(Expr::lit(1))]).unwrap();
        let (sql, _) = expr_sql(&single.or(Expr::col("b").is_null()));
        assert_eq!(sql, "\"a\" = ? OR \"b\" IS NULL");
    }

    #[test]
    fn raw_logical_operands_are_parenthesized() {
        let expr = Expr::raw("a = 1 OR b = 2")
            .unwrap()
            .and(Expr::col("c").eq(Expr::lit(3)));
        assert_eq!(expr_sql(&expr).0, "(a = 1 OR b = 2) AND \"c\" = ?");

        let expr = Expr::col("c")
            .eq(Expr::lit(3))
            .or(Expr::any(vec![Expr::raw("x > 0").unwrap()]).unwrap());
        assert_eq!(expr_sql(&expr).0, "\"c\" = ? OR (x > 0)");

        // A raw predicate on its own is emitted as written.
        assert_eq!(expr_sql(&Expr::raw("x > 0").unwrap()).0, "x > 0");
    }

    #[test]
    fn arithmetic_nesting_keeps_precedence() {
        let expr = Expr::col("a")
            .add(Expr::col("b"))
            .mul(Expr::lit(2))
            .gt(Expr::lit(10));
        let (sql, _) = expr_sql(&expr);
        assert_eq!(sql, "((\"a\" + \"b\") * ?) > ?");
    }

    #[test]
    fn predicates_render_keyword_skeletons() {
        let expr = Expr::col("name")
            .like(Expr::lit("a!%"))
            .escape('!')
            .unwrap();
        assert_eq!(expr_sql(&expr).0, "\"name\" LIKE ? ESCAPE '!'");

        let expr = Expr::col("id")
            .not_in_list(vec![Expr::lit(1), Expr::lit(2)])
            .unwrap();
        assert_eq!(expr_sql(&expr).0, "\"id\" NOT IN (?, ?)");

        let expr = Expr::col("age").between(Expr::lit(1), Expr::lit(9));
        assert_eq!(expr_sql(&expr).0, "\"age\" BETWEEN ? AND ?");

        let expr = Expr::qualified("u", "email").is_not_null();
        assert_eq!(expr_sql(&expr).0, "\"u\".\"email\" IS NOT NULL");
    }

    #[test]
    fn aggregate_distinct_and_filter() {
        let expr = Expr::aggregate("COUNT", vec![Expr::col("id")], true)
            .unwrap()
            .filter(Expr::col("paid").eq(Expr::lit(true)))
            .unwrap()
            .filter(Expr::col("region").eq(Expr::lit("eu")))
            .unwrap();
        let (sql, params) = expr_sql(&expr);
        assert_eq!(
            sql,
            "COUNT(DISTINCT \"id\") FILTER (WHERE \"paid\" = ? AND \"region\" = ?)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn window_call_with_frame() {
        let spec = WindowSpec::new()
            .partition_by(Expr::col("dept"))
            .order_by(Expr::col("salary").desc())
            .frame(Frame::new(
                FrameKind::Rows,
                FrameBound::UnboundedPreceding,
                FrameBound::CurrentRow,
            ));
        let expr = Expr::col("salary").sum().over(spec).unwrap();
        assert_eq!(
            expr_sql(&expr).0,
            "SUM(\"salary\") OVER (PARTITION BY \"dept\" ORDER BY \"salary\" DESC ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW)"
        );
    }

    #[test]
    fn window_rejected_without_capability() {
        let dialect = StandardDialect::with_capabilities(Capabilities::none());
        let query = Query::select(vec![Expr::row_number()
            .over(WindowSpec::new().order_by(Expr::col("id").asc()))
            .unwrap()
            .into()])
        .unwrap()
        .from_table("users");
        let err = compile(&query.into(), &dialect).expect_err("window must be rejected");
        assert_eq!(
            err,
            CompileError::UnsupportedFeature {
                feature: Feature::WindowFunctions,
                dialect: "standard"
            }
        );
    }

    #[test]
    fn case_expression_renders_branches() {
        let expr = Expr::case()
            .when(Expr::col("age").lt(Expr::lit(18)), Expr::lit("minor"))
            .otherwise(Expr::lit("adult"))
            .unwrap();
        let (sql, params) = expr_sql(&expr);
        assert_eq!(sql, "CASE WHEN \"age\" < ? THEN ? ELSE ? END");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn raw_values_use_dialect_placeholders() {
        let expr = Expr::raw_with_values(
            "julianday(?) - julianday(?)",
            vec![Value::from("2024-01-02"), Value::from("2024-01-01")],
        )
        .unwrap();
        let mut params = ParameterCollector::new();
        let sql = compile_expr(&expr, &PostgresDialect::new(), &mut params).unwrap();
        assert_eq!(sql, "julianday($1) - julianday($2)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn full_query_clause_order() {
        let query = Query::select(vec![
            Expr::qualified("u", "dept").into(),
            SelectItem::aliased(Expr::count_star(), "n"),
        ])
        .unwrap()
        .from(TableRef::new("users").alias("u"))
        .join(
            JoinKind::Left,
            TableRef::new("orders").alias("o"),
            Expr::qualified("o", "user_id").eq(Expr::qualified("u", "id")),
        )
        .filter(Expr::qualified("u", "active").eq(Expr::lit(true)))
        .group_by(Grouping::columns(vec![Expr::qualified("u", "dept")]).unwrap())
        .having(Expr::count_star().gt(Expr::lit(5)))
        .order_by(Expr::col("n").desc())
        .limit(10)
        .offset(20);
        let compiled = compile(&query.into(), &StandardDialect::new()).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"u\".\"dept\", COUNT(*) AS \"n\" FROM \"users\" AS \"u\" \
             LEFT JOIN \"orders\" AS \"o\" ON \"o\".\"user_id\" = \"u\".\"id\" \
             WHERE \"u\".\"active\" = ? GROUP BY \"u\".\"dept\" HAVING COUNT(*) > ? \
             ORDER BY \"n\" DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            compiled.params,
            vec![
                Value::Bool(true),
                Value::Integer(5),
                Value::Integer(10),
                Value::Integer(20)
            ]
        );
    }

    #[test]
    fn recursive_cte_params_come_first() {
        let seed = Query::select(vec![Expr::lit(1).into()]).unwrap();
        let step = Query::select(vec![Expr::col("n").add(Expr::lit(1)).into()])
            .unwrap()
            .from_table("counter")
            .filter(Expr::col("n").lt(Expr::lit(5)));
        let cte = Cte::new("counter", seed.union_all(step))
            .columns(vec!["n".to_string()])
            .recursive();
        let query = Query::select_all()
            .with(cte)
            .from_table("counter")
            .filter(Expr::col("n").gt(Expr::lit(2)));
        let compiled = compile(&query.into(), &PostgresDialect::new()).unwrap();
        assert_eq!(
            compiled.sql,
            "WITH RECURSIVE \"counter\" (\"n\") AS (SELECT $1 UNION ALL SELECT \"n\" + $2 FROM \"counter\" WHERE \"n\" < $3) \
             SELECT * FROM \"counter\" WHERE \"n\" > $4"
        );
        assert_eq!(
            compiled.params,
            vec![
                Value::Integer(1),
                Value::Integer(1),
                Value::Integer(5),
                Value::Integer(2)
            ]
        );
    }

    #[test]
    fn advanced_grouping_rendering_and_gating() {
        let query = Query::select(vec![Expr::col("a").into(), Expr::col("b").into()])
            .unwrap()
            .from_table("t")
            .group_by(
                Grouping::sets(vec![
                    vec![Expr::col("a"), Expr::col("b")],
                    vec![Expr::col("a")],
                    Vec::new(),
                ])
                .unwrap(),
            );
        let compiled = compile(&query.clone().into(), &StandardDialect::new()).unwrap();
        assert!(compiled
            .sql
            .ends_with("GROUP BY GROUPING SETS ((\"a\", \"b\"), (\"a\"), ())"));

        let err = compile(&query.into(), &SqliteDialect::new()).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnsupportedFeature {
                feature: Feature::AdvancedGrouping,
                dialect: "sqlite"
            }
        );
    }

    #[test]
    fn sqlite_offset_only_and_nulls_ordering() {
        let query = Query::select_all()
            .from_table("t")
            .order_by(Expr::col("a").asc().nulls(NullsOrder::Last))
            .offset(5);
        let compiled = compile(&query.clone().into(), &SqliteDialect::new()).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM \"t\" ORDER BY \"a\" ASC NULLS LAST LIMIT -1 OFFSET ?"
        );
        assert_eq!(compiled.params, vec![Value::Integer(5)]);

        let err = compile(&query.into(), &MysqlDialect::new()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnsupportedFeature {
                feature: Feature::NullsOrdering,
                ..
            }
        ));
    }

    #[test]
    fn subquery_source_and_in_subquery() {
        let inner = Query::select(vec![Expr::col("user_id").into()])
            .unwrap()
            .from_table("orders")
            .filter(Expr::col("total").gt(Expr::lit(100)));
        let query = Query::select_all()
            .from(Source::subquery(Query::select_all().from_table("users"), "u"))
            .filter(Expr::col("id").in_subquery(inner));
        let compiled = compile(&query.into(), &StandardDialect::new()).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM (SELECT * FROM \"users\") AS \"u\" WHERE \"id\" IN (SELECT \"user_id\" FROM \"orders\" WHERE \"total\" > ?)"
        );
    }

    #[test]
    fn set_branch_with_own_clauses_becomes_derived_table() {
        let recent = Query::select(vec![Expr::col("id").into()])
            .unwrap()
            .from_table("b")
            .order_by(Expr::col("id").desc())
            .limit(3);
        let query = Query::select(vec![Expr::col("id").into()])
            .unwrap()
            .from_table("a")
            .union(recent)
            .order_by(Expr::col("id").asc());
        let compiled = compile(&query.into(), &SqliteDialect::new()).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"id\" FROM \"a\" UNION SELECT * FROM (SELECT \"id\" FROM \"b\" \
             ORDER BY \"id\" DESC LIMIT ?) AS \"set_branch\" ORDER BY \"id\" ASC"
        );
        assert_eq!(compiled.params, vec![Value::Integer(3)]);

        let plain = Query::select(vec![Expr::col("id").into()])
            .unwrap()
            .from_table("a")
            .union_all(Query::select(vec![Expr::col("id").into()]).unwrap().from_table("b"));
        let compiled = compile(&plain.into(), &SqliteDialect::new()).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"id\" FROM \"a\" UNION ALL SELECT \"id\" FROM \"b\""
        );
    }

    #[test]
    fn rejected_walk_leaves_collector_untouched() {
        let mut params = ParameterCollector::new();
        params.push(Value::Integer(7));

        let rejected = Expr::col("name")
            .eq(Expr::lit("x"))
            .and(Expr::col("name").ilike(Expr::lit("a%")));
        let err = compile_expr(&rejected, &SqliteDialect::new(), &mut params)
            .expect_err("sqlite has no ILIKE");
        assert!(matches!(
            err,
            CompileError::UnsupportedFeature {
                feature: Feature::Ilike,
                ..
            }
        ));
        assert_eq!(params.values(), [Value::Integer(7)]);

        let sql = compile_expr(&Expr::col("a").eq(Expr::lit(1)), &PostgresDialect::new(), &mut params)
            .unwrap();
        assert_eq!(sql, "\"a\" = $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn ilike_is_gated_not_degraded() {
        let query = Query::select_all()
            .from_table("users")
            .filter(Expr::col("name").ilike(Expr::lit("a%")));
        assert!(compile(&query.clone().into(), &PostgresDialect::new()).is_ok());
        assert!(compile(&query.into(), &SqliteDialect::new()).is_err());
    }
}
