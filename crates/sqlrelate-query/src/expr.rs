//! SQL expressions for query building.
//!
//! A small expression tree covering what relation queries need: qualified
//! columns, bound literals, comparisons joined with AND/OR, IN lists, raw
//! fragments, `COUNT(*)` and EXISTS subqueries.

use crate::select::Select;
use sqlrelate_core::{Dialect, Value};

/// A SQL expression that can be used in WHERE, ON and SELECT lists.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        /// Optional table name or alias
        table: Option<String>,
        /// Column name
        name: String,
    },

    /// Literal value, rendered as a bound parameter
    Literal(Value),

    /// Binary operation (e.g., a = b, a AND b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// IN expression
    In { expr: Box<Expr>, values: Vec<Expr> },

    /// Raw SQL fragment (escape hatch)
    Raw(String),

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Special aggregate: COUNT(*)
    CountStar,

    /// EXISTS over a subquery
    Exists(Box<Select>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equal (=)
    Eq,
    /// Logical AND
    And,
    /// Logical OR
    Or,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

impl Expr {
    // ==================== Constructors ====================

    /// Create a column reference expression.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Create a qualified column reference (table.column).
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    /// Create a raw SQL expression (escape hatch).
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// `COUNT(*)`
    pub fn count_star() -> Self {
        Expr::CountStar
    }

    /// `EXISTS (subquery)`
    pub fn exists(query: Select) -> Self {
        Expr::Exists(Box::new(query))
    }

    // ==================== Operators ====================

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    /// Equal to (=)
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// IN list of values.
    ///
    /// An empty list can never match and renders as `1 = 0`.
    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        if values.is_empty() {
            return Expr::raw("1 = 0");
        }
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Wrap expression in parentheses.
    pub fn paren(self) -> Self {
        Expr::Paren(Box::new(self))
    }

    // ==================== SQL Generation ====================

    /// Render SQL, appending bound values to `params`.
    ///
    /// Placeholders are numbered by their position in `params`, so several
    /// clauses rendered into the same vector stay consistent.
    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Column { table, name } => match table {
                Some(t) => dialect.quote_qualified(t, name),
                None => dialect.quote_identifier(name),
            },

            Expr::Literal(value) => {
                if matches!(value, Value::Default) {
                    "DEFAULT".to_string()
                } else {
                    params.push(value.clone());
                    dialect.placeholder(params.len())
                }
            }

            Expr::Binary { left, op, right } => {
                let left_sql = left.build(dialect, params);
                let right_sql = right.build(dialect, params);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::In { expr, values } => {
                let expr_sql = expr.build(dialect, params);
                let value_sqls: Vec<_> = values.iter().map(|v| v.build(dialect, params)).collect();
                format!("{expr_sql} IN ({})", value_sqls.join(", "))
            }

            Expr::Raw(sql) => sql.clone(),

            Expr::Paren(expr) => format!("({})", expr.build(dialect, params)),

            Expr::CountStar => "COUNT(*)".to_string(),

            Expr::Exists(query) => format!("EXISTS ({})", query.build_into(dialect, params)),
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&Value> for Expr {
    fn from(v: &Value) -> Self {
        Expr::Literal(v.clone())
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(expr: &Expr) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = expr.build(Dialect::Postgres, &mut params);
        (sql, params)
    }

    #[test]
    fn qualified_equality_binds_literal() {
        let expr = Expr::qualified("post_user", "user_id").eq(1_i64);
        let (sql, params) = render(&expr);
        assert_eq!(sql, "\"post_user\".\"user_id\" = $1");
        assert_eq!(params, vec![Value::BigInt(1)]);
    }

    #[test]
    fn in_list_numbers_placeholders_after_existing_params() {
        let mut params = vec![Value::Text("x".to_string())];
        let expr = Expr::col("id").in_list(vec![Value::BigInt(10), Value::BigInt(20)]);
        let sql = expr.build(Dialect::Postgres, &mut params);
        assert_eq!(sql, "\"id\" IN ($2, $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn empty_in_list_never_matches() {
        let (sql, params) = render(&Expr::col("id").in_list(Vec::<Value>::new()));
        assert_eq!(sql, "1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn column_to_column_comparison_has_no_params() {
        let expr = Expr::qualified("users", "id").eq(Expr::qualified("post_user", "user_id"));
        let (sql, params) = render(&expr);
        assert_eq!(sql, "\"users\".\"id\" = \"post_user\".\"user_id\"");
        assert!(params.is_empty());
    }

    #[test]
    fn and_or_paren() {
        let expr = Expr::col("a")
            .eq(1)
            .and(Expr::col("b").eq(2).or(Expr::col("c").eq(3)).paren());
        let (sql, params) = render(&expr);
        assert_eq!(sql, "\"a\" = $1 AND (\"b\" = $2 OR \"c\" = $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn sqlite_placeholders() {
        let mut params = Vec::new();
        let sql = Expr::col("id").eq(5).build(Dialect::Sqlite, &mut params);
        assert_eq!(sql, "\"id\" = ?1");
    }
}
