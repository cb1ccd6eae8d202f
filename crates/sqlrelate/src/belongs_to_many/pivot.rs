//! Pivot rows.

use super::config::PivotTarget;
use asupersync::{Cx, Outcome};
use sqlrelate_core::{Connection, Error, Model, Result, Row, Value};
use sqlrelate_query::InsertBuilder;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// One row of a pivot table: the link between a parent and a related record
/// plus any extra attributes stored on the link.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    table: String,
    timestamps: bool,
    attributes: Vec<(String, Value)>,
    persisted: bool,
}

impl PivotRow {
    /// A new, unsaved row for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            timestamps: false,
            attributes: Vec::new(),
            persisted: false,
        }
    }

    /// A new row carrying the table and timestamp setting of `target`.
    pub(crate) fn for_target(target: &PivotTarget) -> Self {
        let mut row = Self::new(target.table());
        row.timestamps = target.timestamps();
        row
    }

    /// A row read back from the database.
    pub(crate) fn from_db_row(table: impl Into<String>, row: &Row) -> Self {
        Self {
            table: table.into(),
            timestamps: false,
            attributes: row
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
            persisted: true,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Point an unsaved row at another table.
    pub fn set_table(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = table.into();
        self
    }

    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn set_timestamps(&mut self, enabled: bool) -> &mut Self {
        self.timestamps = enabled;
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Set one attribute, overwriting an existing value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((column, value)),
        }
        self
    }

    /// Set several attributes.
    pub fn fill<I, S>(&mut self, attributes: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        for (column, value) in attributes {
            self.set(column, value);
        }
        self
    }

    pub fn attributes(&self) -> &[(String, Value)] {
        &self.attributes
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn to_row(&self) -> Row {
        Row::from_pairs(self.attributes.iter().cloned())
    }

    /// Decode the attributes as a pivot model.
    #[allow(clippy::result_large_err)]
    pub fn to_model<M: Model>(&self) -> Result<M> {
        M::from_row(&self.to_row())
    }

    /// Stamp `created_at` and `updated_at` unless they were set by the caller.
    fn touch(&mut self) {
        let now = now_micros();
        if self.get(CREATED_AT).is_none() {
            self.set(CREATED_AT, Value::Timestamp(now));
        }
        if self.get(UPDATED_AT).is_none() {
            self.set(UPDATED_AT, Value::Timestamp(now));
        }
    }

    /// Insert the row. Saving an already persisted row does nothing.
    pub async fn save<C: Connection>(&mut self, cx: &Cx, conn: &C) -> Outcome<(), Error> {
        if self.persisted {
            return Outcome::Ok(());
        }
        if self.timestamps {
            self.touch();
        }

        let insert = InsertBuilder::table(self.table.as_str()).values(self.attributes.clone());
        match insert.execute(cx, conn).await {
            Outcome::Ok(_) => {
                self.persisted = true;
                Outcome::Ok(())
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
}
