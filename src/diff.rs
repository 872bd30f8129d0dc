use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::record::{Dataset, Record, Row, RowId};

/// True iff any of the five fields differ. Exact comparison: case and
/// whitespace count, the year compares numerically.
pub fn is_modified(original: &Record, current: &Record) -> bool {
    original.title != current.title
        || original.author != current.author
        || original.genre != current.genre
        || original.published_year != current.published_year
        || original.isbn != current.isbn
}

/// Rows of `original` indexed by id, for repeated lookups.
pub struct OriginalIndex<'a> {
    by_id: HashMap<RowId, &'a Record>,
}

impl<'a> OriginalIndex<'a> {
    pub fn new(original: &'a Dataset) -> Self {
        OriginalIndex {
            by_id: original
                .iter()
                .map(|row| (row.id, &row.record))
                .collect(),
        }
    }

    pub fn get(&self, id: RowId) -> Option<&'a Record> {
        self.by_id.get(&id).copied()
    }

    /// A row with no original counterpart counts as modified.
    pub fn row_modified(&self, row: &Row) -> bool {
        match self.get(row.id) {
            Some(original) => is_modified(original, &row.record),
            None => true,
        }
    }
}

/// Positions in `current` whose row deviates from the original row with the same id.
pub fn modified_positions(original: &Dataset, current: &Dataset) -> BTreeSet<usize> {
    let index = OriginalIndex::new(original);
    current
        .iter()
        .enumerate()
        .filter(|(_, row)| index.row_modified(row))
        .map(|(position, _)| position)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub modified: Vec<RowId>,
    pub added: Vec<RowId>,
    pub removed: Vec<RowId>,
}

impl DiffReport {
    pub fn is_clean(&self) -> bool {
        self.modified.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

/// Classify every row: changed in place, only in `current`, or only in `original`.
pub fn diff(original: &Dataset, current: &Dataset) -> DiffReport {
    let index = OriginalIndex::new(original);
    let mut report = DiffReport::default();

    for row in current.iter() {
        match index.get(row.id) {
            Some(before) if is_modified(before, &row.record) => report.modified.push(row.id),
            Some(_) => {}
            None => report.added.push(row.id),
        }
    }

    let present: BTreeSet<RowId> = current.iter().map(|row| row.id).collect();
    report.removed = original
        .iter()
        .map(|row| row.id)
        .filter(|id| !present.contains(id))
        .collect();

    report
}
