//! WHERE clause.

use crate::expr::Expr;
use sqlrelate_core::{Dialect, Value};

/// WHERE clause.
#[derive(Debug, Clone)]
pub struct Where {
    expr: Expr,
}

impl Where {
    /// Create a new WHERE clause with the given expression.
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    /// Add an AND condition.
    pub fn and(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.and(expr),
        }
    }

    /// Add an OR condition.
    pub fn or(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.or(expr),
        }
    }

    /// Combine an optional clause with `expr` using AND.
    pub fn and_opt(existing: Option<Where>, expr: Expr) -> Where {
        match existing {
            Some(existing) => existing.and(expr),
            None => Where::new(expr),
        }
    }

    /// Combine an optional clause with `expr` using OR.
    pub fn or_opt(existing: Option<Where>, expr: Expr) -> Where {
        match existing {
            Some(existing) => existing.or(expr),
            None => Where::new(expr),
        }
    }

    /// Render the condition (without the `WHERE` keyword) into `params`.
    pub fn build_into(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        self.expr.build(dialect, params)
    }
}
