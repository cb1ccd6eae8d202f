//! Model trait for ORM-style struct mapping.
//!
//! The `Model` trait is the record capability the relation engine relies on:
//! table metadata, row conversion, persistence state and attribute filling.

use crate::Result;
use crate::row::Row;
use crate::value::Value;

/// Trait for types that can be mapped to database tables.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Default)]
/// struct Post {
///     id: Option<i64>,
///     title: String,
/// }
///
/// impl Model for Post {
///     const TABLE_NAME: &'static str = "posts";
///     const PRIMARY_KEY: &'static [&'static str] = &["id"];
///
///     fn to_row(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", self.id.into()), ("title", self.title.clone().into())]
///     }
///
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self { id: row.get_named("id")?, title: row.get_named("title")? })
///     }
///
///     fn primary_key_value(&self) -> Vec<Value> {
///         vec![self.id.into()]
///     }
///
///     fn is_new(&self) -> bool {
///         self.id.is_none()
///     }
/// }
/// ```
pub trait Model: Sized + Send + Sync {
    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// The primary key column name(s).
    const PRIMARY_KEY: &'static [&'static str];

    /// Convert this model instance to a row of values.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct a model instance from a database row.
    ///
    /// Instances built this way are considered clean.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Get the value of the primary key field(s).
    fn primary_key_value(&self) -> Vec<Value>;

    /// Check if this is a new record (primary key is None/default).
    fn is_new(&self) -> bool;

    /// Whether the record has field changes that were not saved yet.
    fn is_dirty(&self) -> bool {
        false
    }

    /// Forget pending changes after a successful save.
    fn mark_clean(&mut self) {}

    /// Set the auto-generated ID after insert.
    ///
    /// Models whose key is assigned by the application keep the default no-op.
    fn set_id(&mut self, _id: i64) {}

    /// Current value of one column, looked up through [`to_row`](Self::to_row).
    fn column_value(&self, column: &str) -> Option<Value> {
        self.to_row()
            .into_iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    /// Overwrite fields from `(column, value)` pairs.
    ///
    /// The default implementation merges the attributes over
    /// [`to_row`](Self::to_row) and rebuilds the record with
    /// [`from_row`](Self::from_row). Attributes naming unknown columns are
    /// ignored by `from_row`.
    #[allow(clippy::result_large_err)]
    fn fill(&mut self, attributes: &[(String, Value)]) -> Result<()> {
        let mut merged: Vec<(String, Value)> = self
            .to_row()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        for (name, value) in attributes {
            match merged.iter_mut().find(|(existing, _)| existing == name) {
                Some(slot) => slot.1 = value.clone(),
                None => merged.push((name.clone(), value.clone())),
            }
        }
        *self = Self::from_row(&Row::from_pairs(merged))?;
        Ok(())
    }
}
