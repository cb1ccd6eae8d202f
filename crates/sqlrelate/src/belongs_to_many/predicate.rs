//! Filters on pivot columns.

use sqlrelate_core::Value;
use sqlrelate_query::Expr;

/// How a predicate joins the ones recorded before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

/// A condition on a pivot column, rendered qualified with the pivot table.
#[derive(Debug, Clone, PartialEq)]
pub enum PivotPredicate {
    /// `pivot.column = value`
    Eq { column: String, value: Value },
    /// `pivot.column IN (values)`
    In { column: String, values: Vec<Value> },
    /// Verbatim SQL fragment. The caller is responsible for quoting.
    Raw(String),
}

impl PivotPredicate {
    /// Column the predicate tests, if it names one.
    pub fn column(&self) -> Option<&str> {
        match self {
            PivotPredicate::Eq { column, .. } | PivotPredicate::In { column, .. } => Some(column),
            PivotPredicate::Raw(_) => None,
        }
    }

    /// Expression against `pivot_table`.
    pub fn to_expr(&self, pivot_table: &str) -> Expr {
        match self {
            PivotPredicate::Eq { column, value } => {
                Expr::qualified(pivot_table, column.as_str()).eq(value.clone())
            }
            PivotPredicate::In { column, values } => {
                Expr::qualified(pivot_table, column.as_str()).in_list(values.clone())
            }
            PivotPredicate::Raw(sql) => Expr::raw(sql.as_str()),
        }
    }
}

/// Join predicates with their connectors in call order.
///
/// The chain is emitted flat, so SQL precedence applies and AND binds
/// tighter than OR. The whole chain is parenthesised so an OR cannot escape
/// the parent condition it gets ANDed onto.
pub(crate) fn combine(predicates: &[(Connector, PivotPredicate)], pivot_table: &str) -> Option<Expr> {
    let mut folded: Option<Expr> = None;
    for (connector, predicate) in predicates {
        let expr = predicate.to_expr(pivot_table);
        folded = Some(match (folded, connector) {
            (None, _) => expr,
            (Some(acc), Connector::And) => acc.and(expr),
            (Some(acc), Connector::Or) => acc.or(expr),
        });
    }
    folded.map(Expr::paren)
}
