/*!
# Book Grid

Upload or generate tabular book records, edit them in a browser grid,
filter and sort them, and export the result as CSV.

## Overview

The server keeps a working copy of every dataset in a session keyed by an
opaque identifier. Each session holds the dataset exactly as it was loaded
(the original) next to the copy being edited (the current), so edits can be
diffed against the original or thrown away with a reset.

## Architecture

### Core
- **record**: Book `Record`, the five `Field`s, stable `RowId`s and the ordered `Dataset`
- **loader**: CSV parsing with per-row warnings instead of hard failures
- **downloader**: CSV export and the `edited-<name>` download filename
- **generator**: Synthetic book data from fixed vocabularies
- **session**: The `SessionStore` interface and its in-memory backing
- **diff**: Which rows deviate from the original
- **filter**: Genre / author / year / quick-search predicates, sorting and paging
- **edit**: Single-cell edits that yield a new dataset

### Client layer
- **grid**: The edit/filter/diff state a user works against
- **autosave**: Trailing-edge debounce so a burst of edits is persisted once

### Server (feature `web`)
- **app**: axum routes for create, fetch, update, reset, view, diff and download
- **config**: Environment-driven settings

## REST API Endpoints

- `GET /api/generate-sample?count=N` - New session from generated data
- `POST /api/upload` - New session from an uploaded CSV (`csvFile` field)
- `GET|PUT|DELETE /api/data/{session}` - Fetch, replace or drop the working copy
- `PATCH /api/data/{session}/cell` - Edit a single cell
- `GET /api/view/{session}` - Filtered, sorted, paged rows with modified flags
- `GET /api/diff/{session}` - Modified, added and removed rows
- `POST /api/reset/{session}` - Restore the original
- `GET /api/download/{session}` - Working copy as CSV
*/

pub mod autosave;
pub mod config;
pub mod diff;
pub mod downloader;
pub mod edit;
pub mod error;
pub mod filter;
pub mod generator;
pub mod grid;
pub mod loader;
pub mod record;
pub mod session;

#[cfg(feature = "web")]
pub mod app;

pub use error::{BookError, Result};
pub use grid::Grid;
pub use record::{Dataset, Field, Record, Row, RowId};
pub use session::{MemorySessionStore, SessionId, SessionStore};
