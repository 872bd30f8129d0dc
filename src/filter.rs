use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::record::{Dataset, Field, Record, Row};

/// Display-only predicates. Every set predicate must hold; empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    /// Exact genre match
    #[serde(default)]
    pub genre: Option<String>,
    /// Case-insensitive substring of the author
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "optional_int")]
    pub year_from: Option<i32>,
    #[serde(default, deserialize_with = "optional_int")]
    pub year_to: Option<i32>,
    /// Case-insensitive substring of any field (the grid's quick filter)
    #[serde(default)]
    pub search: Option<String>,
}

fn set(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl FilterSpec {
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(genre) = set(&self.genre) {
            if record.genre != genre {
                return false;
            }
        }
        if let Some(author) = set(&self.author) {
            if !record.author.to_lowercase().contains(&author.to_lowercase()) {
                return false;
            }
        }
        if let Some(from) = self.year_from {
            if record.published_year < from {
                return false;
            }
        }
        if let Some(to) = self.year_to {
            if record.published_year > to {
                return false;
            }
        }
        if let Some(term) = set(&self.search) {
            let term = term.to_lowercase();
            if !Field::ALL
                .iter()
                .any(|field| record.get(*field).to_lowercase().contains(&term))
            {
                return false;
            }
        }
        true
    }

    /// Number of predicates in effect.
    pub fn active_count(&self) -> usize {
        [
            set(&self.genre).is_some(),
            set(&self.author).is_some(),
            self.year_from.is_some(),
            self.year_to.is_some(),
            set(&self.search).is_some(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }
}

/// Subsequence of rows matching `spec`, in their original order. Ids are kept.
pub fn apply_filter(dataset: &Dataset, spec: &FilterSpec) -> Dataset {
    dataset
        .iter()
        .filter(|row| spec.matches(&row.record))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: Field,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ordering = match self.field {
            Field::PublishedYear => a.published_year.cmp(&b.published_year),
            field => a.get(field).cmp(&b.get(field)),
        };
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Stable sort of any row-like items by a record field.
pub fn sort_by<T>(items: &mut [T], spec: SortSpec, record: impl Fn(&T) -> &Record) {
    items.sort_by(|a, b| spec.compare(record(a), record(b)));
}

pub fn sort(dataset: &Dataset, spec: SortSpec) -> Dataset {
    let mut rows: Vec<Row> = dataset.iter().cloned().collect();
    sort_by(&mut rows, spec, |row| &row.record);
    rows.into_iter().collect()
}

pub const PAGE_SIZES: [usize; 4] = [25, 50, 100, 200];
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub index: usize,
    pub size: usize,
}

impl Page {
    /// Unsupported sizes fall back to the default.
    pub fn new(index: usize, size: usize) -> Self {
        let size = if PAGE_SIZES.contains(&size) {
            size
        } else {
            DEFAULT_PAGE_SIZE
        };
        Page { index, size }
    }

    pub fn first(size: usize) -> Self {
        Page::new(0, size)
    }

    pub fn next(self) -> Self {
        Page { index: self.index + 1, ..self }
    }

    pub fn prev(self) -> Self {
        Page { index: self.index.saturating_sub(1), ..self }
    }

    pub fn count(&self, items: usize) -> usize {
        items.div_ceil(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::first(DEFAULT_PAGE_SIZE)
    }
}

/// Slice of `items` on `page`; empty past the end.
pub fn paginate<T>(items: &[T], page: Page) -> &[T] {
    let start = page.index.saturating_mul(page.size).min(items.len());
    let end = start.saturating_add(page.size).min(items.len());
    &items[start..end]
}

/// Distinct non-empty genres, sorted. Feeds the genre picker.
pub fn unique_genres(dataset: &Dataset) -> Vec<String> {
    dataset
        .records()
        .map(|record| record.genre.as_str())
        .filter(|genre| !genre.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRow {
    /// Index into the working copy, which is what edits address
    pub position: usize,
    pub modified: bool,
    #[serde(flatten)]
    pub row: Row,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub rows: Vec<ViewRow>,
    /// Rows in the working copy
    pub total: usize,
    /// Rows passing the filter, across all pages
    pub matched: usize,
    pub page: usize,
    pub page_size: usize,
    pub page_count: usize,
}

/// Filter, then sort, then page the working copy.
pub fn view(
    dataset: &Dataset,
    filter: &FilterSpec,
    sort: Option<SortSpec>,
    page: Page,
    modified: impl Fn(&Row) -> bool,
) -> View {
    let mut matching: Vec<(usize, &Row)> = dataset
        .iter()
        .enumerate()
        .filter(|(_, row)| filter.matches(&row.record))
        .collect();

    if let Some(spec) = sort {
        sort_by(&mut matching, spec, |(_, row)| &row.record);
    }

    let rows = paginate(&matching, page)
        .iter()
        .map(|(position, row)| ViewRow {
            position: *position,
            modified: modified(*row),
            row: (*row).clone(),
        })
        .collect();

    View {
        rows,
        total: dataset.len(),
        matched: matching.len(),
        page: page.index,
        page_size: page.size,
        page_count: page.count(matching.len()),
    }
}

/// Query-string shape of a view request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewQuery {
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "optional_int")]
    pub year_from: Option<i32>,
    #[serde(default, deserialize_with = "optional_int")]
    pub year_to: Option<i32>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: Option<Field>,
    #[serde(default)]
    pub order: Option<SortDirection>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl ViewQuery {
    pub fn filter(&self) -> FilterSpec {
        FilterSpec {
            genre: self.genre.clone(),
            author: self.author.clone(),
            year_from: self.year_from,
            year_to: self.year_to,
            search: self.search.clone(),
        }
    }

    pub fn sort(&self) -> Option<SortSpec> {
        self.sort_by.map(|field| SortSpec {
            field,
            direction: self.order.unwrap_or_default(),
        })
    }

    pub fn page(&self) -> Page {
        Page::new(
            self.page.unwrap_or(0),
            self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

// Forms send "" for a cleared year box; treat it like an absent one.
fn optional_int<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OptionalInt;

    impl<'de> Visitor<'de> for OptionalInt {
        type Value = Option<i32>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an integer, a numeric string, or nothing")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(OptionalInt)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            i32::try_from(v).map(Some).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            i32::try_from(v).map(Some).map_err(E::custom)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let v = v.trim();
            if v.is_empty() {
                return Ok(None);
            }
            v.parse()
                .map(Some)
                .map_err(|_| E::custom(format!("not a number: {v:?}")))
        }
    }

    deserializer.deserialize_option(OptionalInt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RowId, book};

    fn shelf() -> Dataset {
        Dataset::from_records(vec![
            book("Dune", "Frank Herbert", "Fiction", 1965, "1"),
            book("Gone Girl", "Gillian Flynn", "Mystery", 2012, "2"),
            book("Emma", "Jane Austen", "Fiction", 1815, "3"),
        ])
    }

    fn titles(dataset: &Dataset) -> Vec<&str> {
        dataset.records().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn genre_filter_keeps_matching_rows_in_order() {
        let spec = FilterSpec {
            genre: Some("Fiction".into()),
            ..Default::default()
        };
        let filtered = apply_filter(&shelf(), &spec);
        assert_eq!(titles(&filtered), vec!["Dune", "Emma"]);
        let ids: Vec<_> = filtered.iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![RowId(0), RowId(2)]);
    }

    #[test]
    fn author_filter_is_case_insensitive_substring() {
        let spec = FilterSpec {
            author: Some("AUSTEN".into()),
            ..Default::default()
        };
        assert_eq!(titles(&apply_filter(&shelf(), &spec)), vec!["Emma"]);
    }

    #[test]
    fn year_bounds_are_inclusive() {
        let spec = FilterSpec {
            year_from: Some(1965),
            year_to: Some(2012),
            ..Default::default()
        };
        assert_eq!(titles(&apply_filter(&shelf(), &spec)), vec!["Dune", "Gone Girl"]);
    }

    #[test]
    fn empty_predicates_impose_nothing() {
        let spec = FilterSpec {
            genre: Some(String::new()),
            author: Some(String::new()),
            ..Default::default()
        };
        assert!(spec.is_empty());
        assert_eq!(apply_filter(&shelf(), &spec), shelf());
    }

    #[test]
    fn predicates_are_conjunctive_and_idempotent() {
        let spec = FilterSpec {
            genre: Some("Fiction".into()),
            year_from: Some(1900),
            ..Default::default()
        };
        let once = apply_filter(&shelf(), &spec);
        assert_eq!(titles(&once), vec!["Dune"]);
        assert!(once.records().all(|r| spec.matches(r)));
        assert_eq!(apply_filter(&once, &spec), once);
        assert_eq!(spec.active_count(), 2);
    }

    #[test]
    fn search_looks_at_every_field() {
        let spec = FilterSpec {
            search: Some("2012".into()),
            ..Default::default()
        };
        assert_eq!(titles(&apply_filter(&shelf(), &spec)), vec!["Gone Girl"]);
    }

    #[test]
    fn sorting_is_numeric_for_years_and_stable() {
        let by_year = sort(&shelf(), SortSpec { field: Field::PublishedYear, direction: SortDirection::Desc });
        assert_eq!(titles(&by_year), vec!["Gone Girl", "Dune", "Emma"]);

        let by_genre = sort(&shelf(), SortSpec { field: Field::Genre, direction: SortDirection::Asc });
        assert_eq!(titles(&by_genre), vec!["Dune", "Emma", "Gone Girl"]);
    }

    #[test]
    fn pagination_clamps_to_bounds() {
        let items: Vec<usize> = (0..60).collect();
        let page = Page::new(2, 25);
        assert_eq!(paginate(&items, page), &items[50..60]);
        assert!(paginate(&items, Page::new(9, 25)).is_empty());
        assert_eq!(Page::new(0, 33).size, DEFAULT_PAGE_SIZE);
        assert_eq!(page.count(60), 3);
        assert_eq!(Page::new(0, 25).prev().index, 0);
    }

    #[test]
    fn genres_are_distinct_and_sorted() {
        assert_eq!(unique_genres(&shelf()), vec!["Fiction", "Mystery"]);
    }

    #[test]
    fn view_reports_positions_and_counts() {
        let spec = FilterSpec {
            genre: Some("Fiction".into()),
            ..Default::default()
        };
        let sort = Some(SortSpec { field: Field::Title, direction: SortDirection::Desc });
        let view = view(&shelf(), &spec, sort, Page::default(), |row| row.id == RowId(2));

        assert_eq!(view.total, 3);
        assert_eq!(view.matched, 2);
        let positions: Vec<_> = view.rows.iter().map(|r| (r.position, r.modified)).collect();
        assert_eq!(positions, vec![(2, true), (0, false)]);
    }

    #[test]
    fn filter_spec_accepts_blank_and_textual_years() {
        let spec: FilterSpec = serde_json::from_value(serde_json::json!({
            "genre": "Fiction", "yearFrom": "", "yearTo": "1999"
        }))
        .unwrap();
        assert_eq!(spec.year_from, None);
        assert_eq!(spec.year_to, Some(1999));

        let spec: FilterSpec = serde_json::from_value(serde_json::json!({ "yearFrom": 1950 })).unwrap();
        assert_eq!(spec.year_from, Some(1950));
    }
}
