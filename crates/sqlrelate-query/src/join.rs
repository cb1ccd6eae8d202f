//! JOIN clause types.

use crate::expr::Expr;
use sqlrelate_core::{Dialect, Value};

/// A JOIN clause.
#[derive(Debug, Clone)]
pub struct Join {
    /// Type of join
    pub join_type: JoinType,
    /// Table to join
    pub table: String,
    /// ON condition; `None` until a condition is attached
    pub on: Option<Expr>,
}

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

impl Join {
    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Inner,
            table: table.into(),
            on: Some(on),
        }
    }

    /// Start a join whose ON condition is attached later with [`on`](Self::on).
    pub fn table(join_type: JoinType, table: impl Into<String>) -> Self {
        Self {
            join_type,
            table: table.into(),
            on: None,
        }
    }

    /// AND a condition onto the ON clause.
    pub fn on(&mut self, condition: Expr) -> &mut Self {
        self.on = Some(match self.on.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Render the join (with a leading space) into `params`.
    pub fn build_into(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let mut sql = format!(
            " {} {}",
            self.join_type.as_str(),
            dialect.quote_identifier(&self.table)
        );
        match &self.on {
            Some(on) => {
                sql.push_str(" ON ");
                sql.push_str(&on.build(dialect, params));
            }
            None => sql.push_str(" ON 1 = 1"),
        }
        sql
    }
}
