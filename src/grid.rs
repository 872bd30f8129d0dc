use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use crate::autosave::Debouncer;
use crate::diff::is_modified;
use crate::downloader;
use crate::edit::apply_edit;
use crate::error::Result;
use crate::filter::{self, FilterSpec, Page, SortSpec, View};
use crate::record::{Dataset, RowId};
use crate::session::{SessionId, SessionStore};

/// Client-side working state for one session: the grid a user edits.
///
/// Tracks which rows deviate from the original, what is filtered and
/// sorted for display, and when the working copy should be pushed back
/// to the store.
#[derive(Debug)]
pub struct Grid {
    session_id: SessionId,
    filename: String,
    original: Dataset,
    original_positions: HashMap<RowId, usize>,
    current: Dataset,
    modified: BTreeSet<RowId>,
    filter: FilterSpec,
    sort: Option<SortSpec>,
    autosave: Debouncer,
}

impl Grid {
    pub fn open(store: &dyn SessionStore, session_id: SessionId, autosave: Debouncer) -> Result<Self> {
        let snapshot = store.get(&session_id)?;
        let original = store.original(&session_id)?;
        let original_positions = positions(&original);

        let mut grid = Grid {
            session_id,
            filename: snapshot.filename,
            original,
            original_positions,
            current: snapshot.data,
            modified: BTreeSet::new(),
            filter: FilterSpec::default(),
            sort: None,
            autosave,
        };
        grid.recompute_modified();
        Ok(grid)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn current(&self) -> &Dataset {
        &self.current
    }

    pub fn original(&self) -> &Dataset {
        &self.original
    }

    /// Edit one cell and refresh that row's modified flag, which is returned.
    pub fn edit_cell(&mut self, position: usize, field: &str, value: &str, now: Instant) -> Result<bool> {
        self.current = apply_edit(&self.current, position, field, value)?;
        let modified = self.refresh_row(position);
        self.autosave.mark_dirty(now);
        Ok(modified)
    }

    fn refresh_row(&mut self, position: usize) -> bool {
        let Some(row) = self.current.get(position) else {
            return false;
        };
        let modified = match self.original_positions.get(&row.id).and_then(|p| self.original.get(*p)) {
            Some(before) => is_modified(&before.record, &row.record),
            None => true,
        };
        if modified {
            self.modified.insert(row.id);
        } else {
            self.modified.remove(&row.id);
        }
        modified
    }

    fn recompute_modified(&mut self) {
        self.modified.clear();
        for position in 0..self.current.len() {
            self.refresh_row(position);
        }
    }

    pub fn modified_count(&self) -> usize {
        self.modified.len()
    }

    pub fn is_row_modified(&self, position: usize) -> bool {
        self.current
            .get(position)
            .is_some_and(|row| self.modified.contains(&row.id))
    }

    pub fn modified_positions(&self) -> BTreeSet<usize> {
        self.current
            .iter()
            .enumerate()
            .filter(|(_, row)| self.modified.contains(&row.id))
            .map(|(position, _)| position)
            .collect()
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: FilterSpec) {
        self.filter = filter;
    }

    pub fn clear_filter(&mut self) {
        self.filter = FilterSpec::default();
    }

    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.sort = sort;
    }

    pub fn genres(&self) -> Vec<String> {
        filter::unique_genres(&self.original)
    }

    pub fn view(&self, page: Page) -> View {
        filter::view(&self.current, &self.filter, self.sort, page, |row| {
            self.modified.contains(&row.id)
        })
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.autosave.is_dirty()
    }

    /// Push the full working copy to the store.
    pub fn flush(&mut self, store: &dyn SessionStore) -> Result<()> {
        store.replace(&self.session_id, self.current.clone())?;
        self.autosave.clear();
        log::debug!(
            "session {}: saved changes for {} records",
            self.session_id,
            self.modified.len()
        );
        Ok(())
    }

    /// Flush only when the last burst of edits has gone quiet. Returns whether it flushed.
    pub fn flush_if_due(&mut self, now: Instant, store: &dyn SessionStore) -> Result<bool> {
        if !self.autosave.due(now) {
            return Ok(false);
        }
        self.flush(store)?;
        Ok(true)
    }

    /// Discard all edits, here and in the store.
    pub fn reset(&mut self, store: &dyn SessionStore) -> Result<()> {
        self.current = store.reset(&self.session_id)?;
        self.modified.clear();
        self.autosave.clear();
        Ok(())
    }

    pub fn export_csv(&self) -> String {
        downloader::to_csv(&self.current)
    }

    pub fn export_filename(&self) -> String {
        downloader::export_filename(&self.filename)
    }
}

fn positions(dataset: &Dataset) -> HashMap<RowId, usize> {
    dataset
        .iter()
        .enumerate()
        .map(|(position, row)| (row.id, position))
        .collect()
}
