//! Pointwise arithmetic over other queries' results.
//!
//! Query text is `<operand> <op> <operand>` where an operand is `#RefId` or a
//! number and `op` is one of `+ - * /`, e.g. `#A / #B` or `#A * 2`. Each
//! `#RefId` stands for the first series of that query's result, which must be
//! declared in the query's `depends`.

use std::sync::OnceLock;

use regex::Regex;

use super::{ExecutorError, QueryContext, QueryExecutor};
use crate::models::{DataPoint, Query, QueryResult, TimeSeries};
use crate::scheduler::Batch;

const EXPRESSION: &str = r"^\s*(#\w+|-?\d+(?:\.\d+)?)\s*([-+*/])\s*(#\w+|-?\d+(?:\.\d+)?)\s*$";

fn expression() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(EXPRESSION).expect("expression pattern compiles"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn apply(self, lhs: Option<f64>, rhs: Option<f64>) -> Option<f64> {
        let (l, r) = (lhs?, rhs?);
        match self {
            Self::Add => Some(l + r),
            Self::Sub => Some(l - r),
            Self::Mul => Some(l * r),
            Self::Div if r == 0.0 => None,
            Self::Div => Some(l / r),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Ref(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
struct Expression {
    lhs: Operand,
    op: Op,
    rhs: Operand,
}

impl Expression {
    fn parse(text: &str) -> Result<Self, ExecutorError> {
        let caps = expression()
            .captures(text)
            .ok_or_else(|| ExecutorError::InvalidQuery(format!("cannot parse expression '{}'", text.trim())))?;
        let op = match &caps[2] {
            "+" => Op::Add,
            "-" => Op::Sub,
            "*" => Op::Mul,
            _ => Op::Div,
        };
        let expr = Self {
            lhs: parse_operand(&caps[1])?,
            op,
            rhs: parse_operand(&caps[3])?,
        };
        if matches!((&expr.lhs, &expr.rhs), (Operand::Number(_), Operand::Number(_))) {
            return Err(ExecutorError::InvalidQuery(
                "expression must reference at least one query".into(),
            ));
        }
        Ok(expr)
    }

    /// Referenced RefIds, left to right.
    fn refs(&self) -> impl Iterator<Item = &str> {
        [&self.lhs, &self.rhs].into_iter().filter_map(|o| match o {
            Operand::Ref(ref_id) => Some(ref_id.as_str()),
            Operand::Number(_) => None,
        })
    }
}

/// Only declared dependencies are guaranteed merged before dispatch.
fn check_declared(expr: &Expression, query: &Query) -> Result<(), ExecutorError> {
    match expr.refs().find(|r| !query.depends.iter().any(|d| d == r)) {
        Some(ref_id) => Err(ExecutorError::InvalidQuery(format!("#{ref_id} is not declared in depends"))),
        None => Ok(()),
    }
}

fn parse_operand(token: &str) -> Result<Operand, ExecutorError> {
    match token.strip_prefix('#') {
        Some(ref_id) => Ok(Operand::Ref(ref_id.to_string())),
        None => token
            .parse::<f64>()
            .map(Operand::Number)
            .map_err(|_| ExecutorError::InvalidQuery(format!("bad number '{token}'"))),
    }
}

/// Resolved operand: a series borrowed from the context, or a scalar.
enum Value<'a> {
    Series(&'a TimeSeries),
    Scalar(f64),
}

fn resolve<'a>(operand: &Operand, context: &'a QueryContext) -> Result<Value<'a>, ExecutorError> {
    match operand {
        Operand::Number(n) => Ok(Value::Scalar(*n)),
        Operand::Ref(ref_id) => {
            let result = context.dependency(ref_id)?;
            result
                .series
                .first()
                .map(Value::Series)
                .ok_or_else(|| ExecutorError::InvalidQuery(format!("query {ref_id} returned no series")))
        }
    }
}

fn evaluate(expr: &Expression, context: &QueryContext) -> Result<Vec<DataPoint>, ExecutorError> {
    let lhs = resolve(&expr.lhs, context)?;
    let rhs = resolve(&expr.rhs, context)?;
    let op = expr.op;

    let points = match (lhs, rhs) {
        (Value::Series(l), Value::Series(r)) => l
            .points
            .iter()
            .zip(&r.points)
            .map(|(a, b)| DataPoint::new(a.timestamp_ms, op.apply(a.value, b.value)))
            .collect(),
        (Value::Series(l), Value::Scalar(s)) => l
            .points
            .iter()
            .map(|a| DataPoint::new(a.timestamp_ms, op.apply(a.value, Some(s))))
            .collect(),
        (Value::Scalar(s), Value::Series(r)) => r
            .points
            .iter()
            .map(|b| DataPoint::new(b.timestamp_ms, op.apply(Some(s), b.value)))
            .collect(),
        (Value::Scalar(_), Value::Scalar(_)) => {
            return Err(ExecutorError::InvalidQuery("expression must reference at least one query".into()))
        }
    };
    Ok(points)
}

/// Executor for the `math` data-source type.
#[derive(Debug, Default)]
pub struct MathExecutor;

impl MathExecutor {
    pub const DS_TYPE: &'static str = "math";

    pub fn new() -> Self {
        Self
    }

    fn run_query(&self, query: &Query, context: &QueryContext) -> QueryResult {
        let outcome = Expression::parse(&query.query).and_then(|expr| {
            check_declared(&expr, query)?;
            evaluate(&expr, context)
        });
        match outcome {
            Ok(points) => QueryResult::ok(
                &query.ref_id,
                vec![TimeSeries::with_points(query.query.trim(), points)],
            ),
            Err(e) => QueryResult::failed(&query.ref_id, e),
        }
    }
}

#[async_trait::async_trait]
impl QueryExecutor for MathExecutor {
    async fn execute(&self, batch: &Batch, context: &QueryContext) -> Result<Vec<QueryResult>, ExecutorError> {
        Ok(batch.queries.iter().map(|q| self.run_query(q, context)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataSourceInfo, QueryResult};
    use crate::scheduler::partition;

    fn series(ref_id: &str, values: &[Option<f64>]) -> QueryResult {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| DataPoint::new(i as i64 * 1000, *v))
            .collect();
        QueryResult::ok(ref_id, vec![TimeSeries::with_points(ref_id, points)])
    }

    /// Run `expr` as query X declaring `declared`, over the given results.
    async fn run_declared(expr: &str, declared: &[&str], deps: Vec<QueryResult>) -> QueryResult {
        let query = Query::new("X", expr, DataSourceInfo::new(9, MathExecutor::DS_TYPE));
        let mut batch = partition(std::slice::from_ref(&query)).unwrap().remove(0);
        let query = query.depends_on(declared.iter().copied());
        batch.queries[0] = query.clone();
        let ctx = QueryContext::with_results(vec![query], deps);
        MathExecutor::new().execute(&batch, &ctx).await.unwrap().remove(0)
    }

    /// Declares every RefId the expression mentions.
    async fn run(expr: &str, deps: Vec<QueryResult>) -> QueryResult {
        let declared: Vec<String> = Expression::parse(expr)
            .map(|e| e.refs().map(str::to_string).collect())
            .unwrap_or_default();
        let declared: Vec<&str> = declared.iter().map(String::as_str).collect();
        run_declared(expr, &declared, deps).await
    }

    #[test]
    fn parses_binary_expressions() {
        let e = Expression::parse("#A / #B").unwrap();
        assert_eq!(e.lhs, Operand::Ref("A".into()));
        assert_eq!(e.op, Op::Div);
        assert_eq!(e.rhs, Operand::Ref("B".into()));

        let e = Expression::parse("#A-2.5").unwrap();
        assert_eq!(e.op, Op::Sub);
        assert_eq!(e.rhs, Operand::Number(2.5));

        assert!(Expression::parse("1 + 2").is_err());
        assert!(Expression::parse("#A %").is_err());
        assert!(Expression::parse("").is_err());
    }

    #[tokio::test]
    async fn divides_two_series_pointwise() {
        let out = run(
            "#A / #B",
            vec![
                series("A", &[Some(4.0), Some(9.0), None]),
                series("B", &[Some(2.0), Some(0.0), Some(1.0)]),
            ],
        )
        .await;
        assert!(!out.is_error());
        assert_eq!(out.series[0].name, "#A / #B");
        let values: Vec<Option<f64>> = out.series[0].points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(2.0), None, None]);
    }

    #[tokio::test]
    async fn scalar_on_the_left() {
        let out = run("10 - #A", vec![series("A", &[Some(1.0), Some(2.5)])]).await;
        let values: Vec<Option<f64>> = out.series[0].points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(9.0), Some(7.5)]);
    }

    #[tokio::test]
    async fn failed_dependency_fails_query() {
        let out = run("#A * 2", vec![QueryResult::failed("A", "boom")]).await;
        assert_eq!(out.error.as_deref(), Some("dependency A failed: boom"));
    }

    #[tokio::test]
    async fn missing_dependency_fails_query() {
        let out = run("#Z * 2", Vec::new()).await;
        assert_eq!(out.error.as_deref(), Some("result for Z is not available"));
    }

    #[tokio::test]
    async fn undeclared_reference_is_rejected_even_when_present() {
        let out = run_declared("#A * 2", &["B"], vec![series("A", &[Some(1.0)]), series("B", &[Some(2.0)])]).await;
        assert_eq!(out.error.as_deref(), Some("invalid query: #A is not declared in depends"));

        let out = run_declared("#B + #A", &["B"], vec![series("A", &[Some(1.0)]), series("B", &[Some(2.0)])]).await;
        assert_eq!(out.error.as_deref(), Some("invalid query: #A is not declared in depends"));
    }

    #[test]
    fn refs_skip_numbers() {
        let e = Expression::parse("2 * #Q").unwrap();
        assert_eq!(e.refs().collect::<Vec<_>>(), vec!["Q"]);
    }
}
