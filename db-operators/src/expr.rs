//! Scalar expression tree shared by selection predicates and arithmetic
//! expressions. Evaluated row-at-a-time against a [`db_storage::RowView`];
//! NULL propagates per SQL three-valued logic.

use db_kernel::error::ExecutionError;
use db_storage::{cast, ColumnType, RowView, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(usize),
    Literal(Value),
    Cast(Box<Expr>, ColumnType),
    Compare(Comparison, Box<Expr>, Box<Expr>),
    Between(Box<Expr>, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Vec<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Arithmetic(ArithmeticOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn column(index: usize) -> Self {
        Expr::Column(index)
    }

    pub fn literal(value: Value) -> Self {
        Expr::Literal(value)
    }

    /// True for a constant subtree (no column reference) — used by
    /// `RemoveFixedValueCast`/`EvaluatePredicate` in the optimizer.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Column(_) => false,
            Expr::Literal(_) => true,
            Expr::Cast(inner, _) | Expr::Not(inner) => inner.is_constant(),
            Expr::Compare(_, l, r) | Expr::Arithmetic(_, l, r) | Expr::And(l, r) | Expr::Or(l, r) => {
                l.is_constant() && r.is_constant()
            }
            Expr::Between(v, lo, hi) => v.is_constant() && lo.is_constant() && hi.is_constant(),
            Expr::In(v, list) => v.is_constant() && list.iter().all(Expr::is_constant),
        }
    }

    /// The single column this expression's comparison is over, if it is a
    /// plain single-attribute comparison/between/in against literals —
    /// `PhysicalOperatorRule::has_only_equal_comparison` and friends walk
    /// trees like this to decide join/predicate eligibility.
    pub fn is_equality_over(&self, column: usize) -> bool {
        matches!(
            self,
            Expr::Compare(Comparison::Eq, l, r)
                if (matches!(l.as_ref(), Expr::Column(c) if *c == column) && r.is_constant())
                    || (matches!(r.as_ref(), Expr::Column(c) if *c == column) && l.is_constant())
        )
    }

    /// True when every leaf comparison in an AND/OR tree is an equality —
    /// the condition hash/radix join variants require (spec §4.7 join
    /// predicate restriction, extended per the original to permit OR of
    /// equalities, §SUPPLEMENTED FEATURES #7).
    pub fn has_only_equal_comparison(&self) -> bool {
        match self {
            Expr::Compare(Comparison::Eq, _, _) => true,
            Expr::And(l, r) | Expr::Or(l, r) => l.has_only_equal_comparison() && r.has_only_equal_comparison(),
            _ => false,
        }
    }
}

/// Evaluates `expr` against an arbitrary column getter rather than a single
/// tile's row view — what a join's nested-loops predicate needs, since its
/// columns are split across a build row and a probe row that don't share a
/// tile.
pub fn eval_with(expr: &Expr, get: &dyn Fn(usize) -> Value) -> Result<Value, ExecutionError> {
    match expr {
        Expr::Column(index) => Ok(get(*index)),
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Cast(inner, target) => cast(&eval_with(inner, get)?, *target),
        Expr::Not(inner) => match eval_with(inner, get)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Null(ty) => Ok(Value::Null(ty)),
            other => Err(ExecutionError::OperationNotAllowed(format!("NOT over {:?}", other))),
        },
        Expr::Compare(op, lhs, rhs) => {
            let l = eval_with(lhs, get)?;
            let r = eval_with(rhs, get)?;
            eval_compare(op, &l, &r)
        }
        Expr::Between(value, lo, hi) => {
            let v = eval_with(value, get)?;
            let lo = eval_with(lo, get)?;
            let hi = eval_with(hi, get)?;
            let ge_lo = eval_compare(&Comparison::Ge, &v, &lo)?;
            let le_hi = eval_compare(&Comparison::Le, &v, &hi)?;
            eval_and(&ge_lo, &le_hi)
        }
        Expr::In(value, list) => {
            let v = eval_with(value, get)?;
            if v.is_null() {
                return Ok(Value::Null(ColumnType::Bool));
            }
            let mut saw_null = false;
            for candidate in list {
                let c = eval_with(candidate, get)?;
                if c.is_null() {
                    saw_null = true;
                    continue;
                }
                if let Value::Bool(true) = eval_compare(&Comparison::Eq, &v, &c)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(if saw_null {
                Value::Null(ColumnType::Bool)
            } else {
                Value::Bool(false)
            })
        }
        Expr::And(l, r) => {
            let l = eval_with(l, get)?;
            let r = eval_with(r, get)?;
            eval_and(&l, &r)
        }
        Expr::Or(l, r) => {
            let l = eval_with(l, get)?;
            let r = eval_with(r, get)?;
            eval_or(&l, &r)
        }
        Expr::Arithmetic(op, lhs, rhs) => {
            let l = eval_with(lhs, get)?;
            let r = eval_with(rhs, get)?;
            eval_arithmetic(op, &l, &r)
        }
    }
}

pub fn eval(expr: &Expr, row: &RowView<'_>) -> Result<Value, ExecutionError> {
    eval_with(expr, &|c| row.get(c))
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int32(v) => Some(*v as i64),
        Value::Int64(v) => Some(*v),
        Value::Decimal(v) => Some(*v),
        Value::Date(d) => Some(d.0 as i64),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn eval_compare(op: &Comparison, lhs: &Value, rhs: &Value) -> Result<Value, ExecutionError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null(ColumnType::Bool));
    }

    let ordering = match (lhs, rhs) {
        (Value::Char(l), Value::Char(r)) => l.cmp(r),
        _ => {
            let l = as_i64(lhs).ok_or_else(|| {
                ExecutionError::OperationNotAllowed(format!("cannot compare {:?}", lhs))
            })?;
            let r = as_i64(rhs).ok_or_else(|| {
                ExecutionError::OperationNotAllowed(format!("cannot compare {:?}", rhs))
            })?;
            l.cmp(&r)
        }
    };

    use std::cmp::Ordering::*;
    let result = match (op, ordering) {
        (Comparison::Eq, Equal) => true,
        (Comparison::Ne, Less) | (Comparison::Ne, Greater) => true,
        (Comparison::Lt, Less) => true,
        (Comparison::Le, Less) | (Comparison::Le, Equal) => true,
        (Comparison::Gt, Greater) => true,
        (Comparison::Ge, Greater) | (Comparison::Ge, Equal) => true,
        _ => false,
    };
    Ok(Value::Bool(result))
}

fn eval_and(l: &Value, r: &Value) -> Result<Value, ExecutionError> {
    Ok(match (l, r) {
        (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(*a && *b),
        _ => Value::Null(ColumnType::Bool),
    })
}

fn eval_or(l: &Value, r: &Value) -> Result<Value, ExecutionError> {
    Ok(match (l, r) {
        (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
        (Value::Bool(a), Value::Bool(b)) => Value::Bool(*a || *b),
        _ => Value::Null(ColumnType::Bool),
    })
}

fn eval_arithmetic(op: &ArithmeticOp, lhs: &Value, rhs: &Value) -> Result<Value, ExecutionError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null(lhs.column_type()));
    }

    let l = as_i64(lhs).ok_or_else(|| ExecutionError::OperationNotAllowed(format!("non-numeric operand {:?}", lhs)))?;
    let r = as_i64(rhs).ok_or_else(|| ExecutionError::OperationNotAllowed(format!("non-numeric operand {:?}", rhs)))?;

    let result = match op {
        ArithmeticOp::Add => l.checked_add(r),
        ArithmeticOp::Sub => l.checked_sub(r),
        ArithmeticOp::Mul => l.checked_mul(r),
        ArithmeticOp::Div => {
            if r == 0 {
                return Err(ExecutionError::OperationNotAllowed("division by zero".into()));
            }
            l.checked_div(r)
        }
    }
    .ok_or_else(|| ExecutionError::Cast {
        from: "i64".into(),
        to: "i64".into(),
    })?;

    Ok(match lhs.column_type() {
        ColumnType::Decimal { .. } => Value::Decimal(result),
        ColumnType::Int64 => Value::Int64(result),
        _ => Value::Int32(result as i32),
    })
}
