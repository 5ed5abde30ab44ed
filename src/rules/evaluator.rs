//! Pure, deterministic evaluation of a compiled rule against a store
//! snapshot. A metric that is absent or empty evaluates to "unavailable"
//! and any comparison built on it is false — never a crash.

use super::ast::{Aggregate, CmpOp, CompiledExpr, CompiledTerm};
use crate::metrics::{MetricStore, MetricValue, Scope};

/// `scope_path` is the store path of the node this rule is bound to; bare
/// metric identifiers resolve relative to it.
pub fn evaluate(expr: &CompiledExpr, store: &MetricStore, scope_path: &str) -> bool {
    match expr {
        CompiledExpr::Or(l, r) => evaluate(l, store, scope_path) || evaluate(r, store, scope_path),
        CompiledExpr::And(l, r) => evaluate(l, store, scope_path) && evaluate(r, store, scope_path),
        CompiledExpr::Not(inner) => !evaluate(inner, store, scope_path),
        CompiledExpr::Cmp(l, op, r) => {
            let lhs = resolve(l, store, scope_path);
            let rhs = resolve(r, store, scope_path);
            compare(lhs, *op, rhs)
        }
        CompiledExpr::Bare(t) => match resolve(t, store, scope_path) {
            Some(v) => v.as_bool().unwrap_or(false),
            None => false,
        },
    }
}

fn resolve(term: &CompiledTerm, store: &MetricStore, scope_path: &str) -> Option<MetricValue> {
    match term {
        CompiledTerm::Literal(v) => Some(v.clone()),
        CompiledTerm::Metric { path, aggregate } => {
            let full_path = format!("{scope_path}/{path}");
            let buf = store.get(Scope::Assurance, &full_path).ok()?;
            if buf.is_empty() {
                return None;
            }
            match aggregate {
                None | Some(Aggregate::Top) => buf.top().cloned(),
                Some(Aggregate::Min) => buf.min().map(MetricValue::Float),
                Some(Aggregate::Max) => buf.max().map(MetricValue::Float),
                Some(Aggregate::Mean) => buf.mean().map(MetricValue::Float),
                Some(Aggregate::Dynamicity) => buf.dynamicity().map(MetricValue::Float),
            }
        }
    }
}

fn compare(lhs: Option<MetricValue>, op: CmpOp, rhs: Option<MetricValue>) -> bool {
    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
        return false;
    };
    match op {
        CmpOp::In => match (lhs.as_str(), rhs.as_str()) {
            (Some(needle), Some(haystack)) => haystack.contains(needle),
            _ => false,
        },
        CmpOp::Eq => numeric_or_string_eq(&lhs, &rhs),
        CmpOp::Ne => !numeric_or_string_eq(&lhs, &rhs),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let (Some(l), Some(r)) = (lhs.as_f64(), rhs.as_f64()) else {
                return false;
            };
            match op {
                CmpOp::Lt => l < r,
                CmpOp::Le => l <= r,
                CmpOp::Gt => l > r,
                CmpOp::Ge => l >= r,
                _ => unreachable!(),
            }
        }
    }
}

fn numeric_or_string_eq(lhs: &MetricValue, rhs: &MetricValue) -> bool {
    match (lhs.as_str(), rhs.as_str()) {
        (Some(l), Some(r)) => l == r,
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(l), Some(r)) => (l - r).abs() < f64::EPSILON,
            _ => false,
        },
    }
}
