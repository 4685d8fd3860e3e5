//! Tabular Executor
//!
//! Interprets a parsed pipeline script against a dataset. The evaluation
//! scope pre-binds exactly two names — the input frame and the output
//! binding (an empty sentinel) — and nothing else. After evaluation the
//! output binding is read back: a well-formed frame is a `Success`, anything
//! else is a `Failure` carrying the error text. The input frame is never
//! mutated; every operation derives a new frame.

use crate::fuzzy_matcher::closest_column;
use crate::script::{parse_script, Arg, Call, CmpOp, Literal, ScriptError, Stmt};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_INPUT_VAR: &str = "df";
pub const DEFAULT_OUTPUT_VAR: &str = "final_df";

/// Result of one execution attempt.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Success(DataFrame),
    Failure(String),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }
}

/// A value bound in the evaluation scope.
#[derive(Debug, Clone)]
enum Value {
    /// Pre-initialized output sentinel; reading it back as the result is a
    /// failure.
    Empty,
    Frame(DataFrame),
    /// A `group_by` waiting for its `agg`.
    Grouped { frame: DataFrame, keys: Vec<String> },
}

pub struct Executor {
    input_var: String,
    output_var: String,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_VAR, DEFAULT_OUTPUT_VAR)
    }
}

impl Executor {
    pub fn new(input_var: impl Into<String>, output_var: impl Into<String>) -> Self {
        Self {
            input_var: input_var.into(),
            output_var: output_var.into(),
        }
    }

    pub fn output_var(&self) -> &str {
        &self.output_var
    }

    /// Parse and run `code` against `df` in an isolated scope.
    pub fn execute(&self, code: &str, df: &DataFrame) -> ExecutionOutcome {
        match self.run(code, df) {
            Ok(frame) => ExecutionOutcome::Success(frame),
            Err(e) => ExecutionOutcome::Failure(e.to_string()),
        }
    }

    fn run(&self, code: &str, df: &DataFrame) -> Result<DataFrame, ScriptError> {
        let script = parse_script(code)?;

        let mut scope: HashMap<String, Value> = HashMap::new();
        scope.insert(self.input_var.clone(), Value::Frame(df.clone()));
        scope.insert(self.output_var.clone(), Value::Empty);

        for stmt in &script.stmts {
            let value = self.eval_stmt(stmt, &scope)?;
            debug!("line {}: bound '{}'", stmt.line, stmt.target);
            scope.insert(stmt.target.clone(), value);
        }

        match scope.remove(&self.output_var) {
            Some(Value::Frame(frame)) => Ok(frame),
            Some(Value::Grouped { .. }) => Err(ScriptError::GroupWithoutAgg),
            Some(Value::Empty) | None => Err(ScriptError::NoResult(self.output_var.clone())),
        }
    }

    fn eval_stmt(&self, stmt: &Stmt, scope: &HashMap<String, Value>) -> Result<Value, ScriptError> {
        let mut value = match scope.get(&stmt.root) {
            Some(Value::Empty) => {
                return Err(ScriptError::Eval(format!(
                    "'{}' has no value yet; assign it before reading it",
                    stmt.root
                )))
            }
            Some(v) => v.clone(),
            None => return Err(ScriptError::UnknownName(stmt.root.clone())),
        };

        for call in &stmt.calls {
            value = self.apply(value, call)?;
        }
        Ok(value)
    }

    fn apply(&self, value: Value, call: &Call) -> Result<Value, ScriptError> {
        match value {
            Value::Empty => Err(ScriptError::Eval(
                "cannot call operations on an empty value".to_string(),
            )),
            Value::Grouped { frame, keys } => {
                if call.name == "agg" {
                    self.apply_agg(frame, keys, call).map(Value::Frame)
                } else {
                    Err(ScriptError::GroupWithoutAgg)
                }
            }
            Value::Frame(frame) => match call.name.as_str() {
                "select" => self.apply_select(frame, call).map(Value::Frame),
                "filter" => self.apply_filter(frame, call).map(Value::Frame),
                "sort" => self.apply_sort(frame, call).map(Value::Frame),
                "group_by" | "groupby" => {
                    let keys = columns_from_args(&call.name, &call.args)?;
                    validate_columns(&frame, &keys)?;
                    Ok(Value::Grouped { frame, keys })
                }
                "agg" => Err(ScriptError::BadArguments {
                    op: "agg".to_string(),
                    message: "agg is only valid directly after group_by".to_string(),
                }),
                "head" => self.apply_head(frame, call).map(Value::Frame),
                "unique" => collect(frame.lazy().unique(None, UniqueKeepStrategy::First))
                    .map(Value::Frame),
                "drop_nulls" => collect(frame.lazy().drop_nulls(None)).map(Value::Frame),
                "count" => {
                    collect(frame.lazy().select([len().alias("count")])).map(Value::Frame)
                }
                other => Err(ScriptError::UnknownOperation(other.to_string())),
            },
        }
    }

    fn apply_select(&self, frame: DataFrame, call: &Call) -> Result<DataFrame, ScriptError> {
        let columns = columns_from_args("select", &call.args)?;
        validate_columns(&frame, &columns)?;
        let exprs: Vec<Expr> = columns.iter().map(|c| col(c)).collect();
        collect(frame.lazy().select(exprs))
    }

    fn apply_filter(&self, frame: DataFrame, call: &Call) -> Result<DataFrame, ScriptError> {
        let (column, op, literal) = match call.args.as_slice() {
            [Arg::Compare { column, op, value }] => (column, *op, value),
            _ => {
                return Err(ScriptError::BadArguments {
                    op: "filter".to_string(),
                    message: "expected a single comparison, e.g. filter(floor > 3)".to_string(),
                })
            }
        };
        validate_columns(&frame, std::slice::from_ref(column))?;

        let lhs = col(column);
        let rhs = literal_expr(literal);
        let expr = match op {
            CmpOp::Eq => lhs.eq(rhs),
            CmpOp::Ne => lhs.neq(rhs),
            CmpOp::Gt => lhs.gt(rhs),
            CmpOp::Ge => lhs.gt_eq(rhs),
            CmpOp::Lt => lhs.lt(rhs),
            CmpOp::Le => lhs.lt_eq(rhs),
        };
        collect(frame.lazy().filter(expr))
    }

    fn apply_sort(&self, frame: DataFrame, call: &Call) -> Result<DataFrame, ScriptError> {
        let mut column: Option<String> = None;
        let mut descending = false;
        for arg in &call.args {
            match arg {
                Arg::Value(Literal::Str(name)) if column.is_none() => {
                    column = Some(name.clone());
                }
                Arg::Named(flag, Literal::Bool(v)) if flag == "descending" => descending = *v,
                Arg::Named(flag, Literal::Bool(v)) if flag == "ascending" => descending = !*v,
                other => {
                    return Err(ScriptError::BadArguments {
                        op: "sort".to_string(),
                        message: format!("unexpected argument {:?}", other),
                    })
                }
            }
        }
        let column = column.ok_or_else(|| ScriptError::BadArguments {
            op: "sort".to_string(),
            message: "expected a column name, e.g. sort(\"floor\", descending=true)".to_string(),
        })?;
        validate_columns(&frame, std::slice::from_ref(&column))?;

        collect(frame.lazy().sort_by_exprs(
            vec![col(&column)],
            SortMultipleOptions::default().with_order_descending(descending),
        ))
    }

    fn apply_head(&self, frame: DataFrame, call: &Call) -> Result<DataFrame, ScriptError> {
        let bad_count = || ScriptError::BadArguments {
            op: "head".to_string(),
            message: "expected a non-negative row count, e.g. head(10)".to_string(),
        };
        let n = match call.args.as_slice() {
            [] => 5,
            [Arg::Value(Literal::Int(n))] => u32::try_from(*n).map_err(|_| bad_count())?,
            _ => return Err(bad_count()),
        };
        collect(frame.lazy().limit(n))
    }

    fn apply_agg(
        &self,
        frame: DataFrame,
        keys: Vec<String>,
        call: &Call,
    ) -> Result<DataFrame, ScriptError> {
        if call.args.is_empty() {
            return Err(ScriptError::BadArguments {
                op: "agg".to_string(),
                message: "expected at least one aggregation, e.g. agg(max(\"floor\"))".to_string(),
            });
        }

        let mut agg_exprs = Vec::new();
        for arg in &call.args {
            let agg_call = match arg {
                Arg::Agg(inner) => inner,
                other => {
                    return Err(ScriptError::BadArguments {
                        op: "agg".to_string(),
                        message: format!("expected an aggregation call, found {:?}", other),
                    })
                }
            };
            agg_exprs.push(self.agg_expr(&frame, agg_call)?);
        }

        let key_exprs: Vec<Expr> = keys.iter().map(|k| col(k)).collect();
        collect(frame.lazy().group_by(key_exprs).agg(agg_exprs))
    }

    fn agg_expr(&self, frame: &DataFrame, call: &Call) -> Result<Expr, ScriptError> {
        if call.name == "count" {
            if !call.args.is_empty() {
                return Err(ScriptError::BadArguments {
                    op: "count".to_string(),
                    message: "count() takes no arguments inside agg".to_string(),
                });
            }
            return Ok(len().alias("count"));
        }

        let column = match call.args.as_slice() {
            [Arg::Value(Literal::Str(name))] => name.clone(),
            _ => {
                return Err(ScriptError::BadArguments {
                    op: call.name.clone(),
                    message: format!("expected a single column name, e.g. {}(\"floor\")", call.name),
                })
            }
        };
        validate_columns(frame, std::slice::from_ref(&column))?;

        let base = col(&column);
        let expr = match call.name.as_str() {
            "sum" => base.sum(),
            "mean" | "avg" => base.mean(),
            "min" => base.min(),
            "max" => base.max(),
            "median" => base.median(),
            "n_unique" => base.n_unique(),
            other => return Err(ScriptError::UnknownOperation(other.to_string())),
        };
        Ok(expr.alias(&column))
    }
}

fn columns_from_args(op: &str, args: &[Arg]) -> Result<Vec<String>, ScriptError> {
    if args.is_empty() {
        return Err(ScriptError::BadArguments {
            op: op.to_string(),
            message: "expected at least one column name".to_string(),
        });
    }
    args.iter()
        .map(|arg| match arg {
            Arg::Value(Literal::Str(name)) => Ok(name.clone()),
            other => Err(ScriptError::BadArguments {
                op: op.to_string(),
                message: format!("expected a column name, found {:?}", other),
            }),
        })
        .collect()
}

fn validate_columns(frame: &DataFrame, columns: &[String]) -> Result<(), ScriptError> {
    let existing: Vec<&str> = frame.get_column_names();
    for column in columns {
        if !existing.iter().any(|c| *c == column.as_str()) {
            return Err(ScriptError::ColumnNotFound {
                name: column.clone(),
                suggestion: closest_column(column, existing.iter().copied()),
            });
        }
    }
    Ok(())
}

fn literal_expr(literal: &Literal) -> Expr {
    match literal {
        Literal::Int(v) => lit(*v),
        Literal::Float(v) => lit(*v),
        Literal::Str(v) => lit(v.clone()),
        Literal::Bool(v) => lit(*v),
    }
}

fn collect(lf: LazyFrame) -> Result<DataFrame, ScriptError> {
    lf.collect().map_err(|e| ScriptError::Eval(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        df![
            "district" => ["A", "B", "C"],
            "floor" => [3i64, 7, 5],
        ]
        .unwrap()
    }

    fn execute(code: &str) -> ExecutionOutcome {
        Executor::default().execute(code, &sample_frame())
    }

    #[test]
    fn sort_descending_returns_full_context() {
        let outcome = execute("final_df = df.sort(\"floor\", descending=true)");
        let frame = match outcome {
            ExecutionOutcome::Success(frame) => frame,
            ExecutionOutcome::Failure(msg) => panic!("unexpected failure: {}", msg),
        };
        assert_eq!(frame.height(), 3);
        let districts: Vec<String> = frame
            .column("district")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(districts, vec!["B", "C", "A"]);
    }

    #[test]
    fn missing_output_binding_is_a_failure() {
        let outcome = execute("view = df.head(2)");
        match outcome {
            ExecutionOutcome::Failure(msg) => assert!(msg.contains("final_df")),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn input_frame_is_not_mutated() {
        let original = sample_frame();
        let executor = Executor::default();
        let _ = executor.execute("final_df = df.filter(floor > 4).sort(\"floor\")", &original);
        assert!(original.equals(&sample_frame()));
    }

    #[test]
    fn misspelled_column_reports_closest_match() {
        let outcome = execute("final_df = df.filter(florr > 3)");
        match outcome {
            ExecutionOutcome::Failure(msg) => {
                assert!(msg.contains("column 'florr' not found"), "msg: {}", msg);
                assert!(msg.contains("'floor'"), "msg: {}", msg);
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn group_by_without_agg_is_a_failure() {
        let outcome = execute("final_df = df.group_by(\"district\")");
        match outcome {
            ExecutionOutcome::Failure(msg) => assert!(msg.contains("agg")),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn group_by_agg_aggregates_per_key() {
        let frame = df![
            "district" => ["A", "A", "B"],
            "floor" => [3i64, 5, 7],
        ]
        .unwrap();
        let outcome = Executor::default()
            .execute("final_df = df.group_by(\"district\").agg(max(\"floor\"))", &frame);
        let result = match outcome {
            ExecutionOutcome::Success(frame) => frame,
            ExecutionOutcome::Failure(msg) => panic!("unexpected failure: {}", msg),
        };
        assert_eq!(result.height(), 2);
        assert!(result.get_column_names().contains(&"floor"));
    }

    #[test]
    fn filter_on_string_equality() {
        let outcome = execute("final_df = df.filter(district == \"B\")");
        let frame = match outcome {
            ExecutionOutcome::Success(frame) => frame,
            ExecutionOutcome::Failure(msg) => panic!("unexpected failure: {}", msg),
        };
        assert_eq!(frame.height(), 1);
    }

    #[test]
    fn head_limits_rows() {
        let outcome = execute("final_df = df.head(2)");
        match outcome {
            ExecutionOutcome::Success(frame) => assert_eq!(frame.height(), 2),
            ExecutionOutcome::Failure(msg) => panic!("unexpected failure: {}", msg),
        }
    }

    #[test]
    fn head_rejects_out_of_range_counts() {
        let outcome = execute("final_df = df.head(99999999999)");
        match outcome {
            ExecutionOutcome::Failure(msg) => assert!(msg.contains("head"), "msg: {}", msg),
            _ => panic!("expected failure"),
        }
        let outcome = execute("final_df = df.head(-1)");
        assert!(!outcome.is_success());
    }

    #[test]
    fn count_yields_single_row() {
        let outcome = execute("final_df = df.count()");
        match outcome {
            ExecutionOutcome::Success(frame) => {
                assert_eq!(frame.height(), 1);
                assert!(frame.get_column_names().contains(&"count"));
            }
            ExecutionOutcome::Failure(msg) => panic!("unexpected failure: {}", msg),
        }
    }

    #[test]
    fn unknown_operation_is_reported() {
        let outcome = execute("final_df = df.pivot(\"district\")");
        match outcome {
            ExecutionOutcome::Failure(msg) => assert!(msg.contains("unknown operation 'pivot'")),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn unknown_name_is_reported() {
        let outcome = execute("final_df = mystery.head(1)");
        match outcome {
            ExecutionOutcome::Failure(msg) => assert!(msg.contains("'mystery' is not defined")),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn intermediate_bindings_chain() {
        let code = "sorted = df.sort(\"floor\", descending=true)\nfinal_df = sorted.head(1)";
        let outcome = execute(code);
        let frame = match outcome {
            ExecutionOutcome::Success(frame) => frame,
            ExecutionOutcome::Failure(msg) => panic!("unexpected failure: {}", msg),
        };
        assert_eq!(frame.height(), 1);
        let floor = frame.column("floor").unwrap().i64().unwrap().get(0).unwrap();
        assert_eq!(floor, 7);
    }
}
