use serde::{Deserialize, Serialize};

use crate::error::{BookError, Result};
use crate::record::{Dataset, Field, RowId};

/// Wire shape of a single cell edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellEdit {
    pub position: usize,
    pub field: String,
    pub value: String,
}

/// Return a copy of `dataset` with one cell changed.
///
/// Fails with `IndexOutOfRange` for a position outside `[0, len)`,
/// `UnknownField` for a name that is not one of the five book fields, and
/// `InvalidValue` for a non-integer `PublishedYear`. Persisting the result
/// is the caller's job.
pub fn apply_edit(dataset: &Dataset, position: usize, field: &str, value: &str) -> Result<Dataset> {
    let field: Field = field.parse()?;
    let mut edited = dataset.clone();
    let len = edited.len();

    let row = edited
        .get_mut(position)
        .ok_or(BookError::IndexOutOfRange { position, len })?;
    row.record.set(field, value)?;

    Ok(edited)
}

/// Same as [`apply_edit`], addressing the row by its stable id.
pub fn apply_edit_by_id(dataset: &Dataset, id: RowId, field: &str, value: &str) -> Result<Dataset> {
    let position = dataset
        .position_of(id)
        .ok_or(BookError::RowNotFound(id.0))?;
    apply_edit(dataset, position, field, value)
}

impl CellEdit {
    pub fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        apply_edit(dataset, self.position, &self.field, &self.value)
    }
}
