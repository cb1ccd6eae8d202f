//! Per-parent cache of pivot rows.

use super::pivot::PivotRow;
use sqlrelate_core::Value;

/// Pivot rows known for one parent.
///
/// `None` means nothing is known and the next write must load from the
/// database. A loaded cache is authoritative: attach consults it to skip
/// links that already exist.
#[derive(Debug, Clone, Default)]
pub struct PivotCache {
    rows: Option<Vec<PivotRow>>,
}

impl PivotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.rows.is_some()
    }

    /// Cached rows; empty when nothing is loaded.
    pub fn rows(&self) -> &[PivotRow] {
        self.rows.as_deref().unwrap_or(&[])
    }

    pub(crate) fn populate(&mut self, rows: Vec<PivotRow>) {
        self.rows = Some(rows);
    }

    /// Row whose `column` has the same identity as `value`.
    pub fn find(&self, column: &str, value: &Value) -> Option<&PivotRow> {
        self.rows()
            .iter()
            .find(|row| row.get(column).is_some_and(|v| v.same_identity(value)))
    }

    /// Add a freshly saved row. Ignored while nothing is loaded.
    pub(crate) fn push(&mut self, row: PivotRow) {
        if let Some(rows) = self.rows.as_mut() {
            rows.push(row);
        }
    }

    /// Drop rows whose `column` matches one of `values`; returns how many.
    pub(crate) fn evict(&mut self, column: &str, values: &[Value]) -> usize {
        let Some(rows) = self.rows.as_mut() else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|row| {
            !row
                .get(column)
                .is_some_and(|v| values.iter().any(|target| target.same_identity(v)))
        });
        before - rows.len()
    }

    /// Known to hold no rows.
    pub(crate) fn clear(&mut self) {
        self.rows = Some(Vec::new());
    }

    /// Forget everything; the next write reloads.
    pub fn invalidate(&mut self) {
        self.rows = None;
    }
}
