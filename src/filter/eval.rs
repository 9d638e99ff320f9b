//! Evaluator for compiled filters.

use super::ast::FilterExpr;
use std::collections::HashMap;

/// Evaluate a filter against a feature's tags.
///
/// Pure function of its inputs. Composite forms short-circuit left to right.
pub fn evaluate_filter(expr: &FilterExpr, tags: &HashMap<String, String>) -> bool {
    match expr {
        FilterExpr::True => true,

        FilterExpr::Has(key) => tags.contains_key(key),

        FilterExpr::NotHas(key) => !tags.contains_key(key),

        FilterExpr::Equals { key, value } => tags.get(key).is_some_and(|actual| actual == value),

        FilterExpr::NotEquals { key, value } => tags.get(key).is_none_or(|actual| actual != value),

        FilterExpr::In { key, values } => tags
            .get(key)
            .is_some_and(|actual| values.iter().any(|v| v == actual)),

        FilterExpr::NotIn { key, values } => tags
            .get(key)
            .is_none_or(|actual| values.iter().all(|v| v != actual)),

        FilterExpr::Not(inner) => !evaluate_filter(inner, tags),

        FilterExpr::All(exprs) => exprs.iter().all(|e| evaluate_filter(e, tags)),

        FilterExpr::Any(exprs) => exprs.iter().any(|e| evaluate_filter(e, tags)),
    }
}
