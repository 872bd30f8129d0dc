use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{BookError, Result};

/// One of the five fixed columns of a book record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Title,
    Author,
    Genre,
    PublishedYear,
    #[serde(rename = "ISBN")]
    Isbn,
}

impl Field {
    /// Default column order, used for CSV headers.
    pub const ALL: [Field; 5] = [
        Field::Title,
        Field::Author,
        Field::Genre,
        Field::PublishedYear,
        Field::Isbn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "Title",
            Field::Author => "Author",
            Field::Genre => "Genre",
            Field::PublishedYear => "PublishedYear",
            Field::Isbn => "ISBN",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Field::PublishedYear)
    }
}

impl FromStr for Field {
    type Err = BookError;

    fn from_str(name: &str) -> Result<Self> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str() == name)
            .ok_or_else(|| BookError::UnknownField(name.to_string()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single book row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Author")]
    pub author: String,
    #[serde(rename = "Genre")]
    pub genre: String,
    #[serde(rename = "PublishedYear", deserialize_with = "year_from_number_or_text")]
    pub published_year: i32,
    #[serde(rename = "ISBN")]
    pub isbn: String,
}

impl Record {
    /// Field value rendered as text, the way it appears in a CSV cell.
    pub fn get(&self, field: Field) -> String {
        match field {
            Field::Title => self.title.clone(),
            Field::Author => self.author.clone(),
            Field::Genre => self.genre.clone(),
            Field::PublishedYear => self.published_year.to_string(),
            Field::Isbn => self.isbn.clone(),
        }
    }

    /// Set a field from its textual form. `PublishedYear` must be an integer.
    pub fn set(&mut self, field: Field, value: &str) -> Result<()> {
        match field {
            Field::Title => self.title = value.to_string(),
            Field::Author => self.author = value.to_string(),
            Field::Genre => self.genre = value.to_string(),
            Field::PublishedYear => self.published_year = parse_year(value)?,
            Field::Isbn => self.isbn = value.to_string(),
        }
        Ok(())
    }
}

pub(crate) fn parse_year(value: &str) -> Result<i32> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| BookError::InvalidValue {
            field: Field::PublishedYear.to_string(),
            value: value.to_string(),
        })
}

// Browser clients echo back whatever the CSV gave them, so the year may arrive as "2001".
fn year_from_number_or_text<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    struct YearVisitor;

    impl Visitor<'_> for YearVisitor {
        type Value = i32;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an integer year or a string holding one")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<i32, E> {
            i32::try_from(v).map_err(|_| E::custom(format!("year out of range: {v}")))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<i32, E> {
            i32::try_from(v).map_err(|_| E::custom(format!("year out of range: {v}")))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<i32, E> {
            if v.fract() == 0.0 && v >= i32::MIN as f64 && v <= i32::MAX as f64 {
                Ok(v as i32)
            } else {
                Err(E::custom(format!("year is not a whole number: {v}")))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<i32, E> {
            v.trim()
                .parse()
                .map_err(|_| E::custom(format!("year is not a number: {v:?}")))
        }
    }

    deserializer.deserialize_any(YearVisitor)
}

/// Stable identity of a row, assigned when its dataset is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub id: RowId,
    #[serde(flatten)]
    pub record: Record,
}

/// A row as sent by a client: the id is optional because freshly added
/// rows (or clients that strip ids) have none yet.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingRow {
    #[serde(default)]
    pub id: Option<RowId>,
    #[serde(flatten)]
    pub record: Record,
}

impl From<Record> for IncomingRow {
    fn from(record: Record) -> Self {
        IncomingRow { id: None, record }
    }
}

impl From<Row> for IncomingRow {
    fn from(row: Row) -> Self {
        IncomingRow {
            id: Some(row.id),
            record: row.record,
        }
    }
}

/// Ordered sequence of rows. Order is significant and preserved by every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset from bare records, numbering them `0..n` in order.
    pub fn from_records(records: Vec<Record>) -> Self {
        let rows = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| Row {
                id: RowId(i as u64),
                record,
            })
            .collect();
        Dataset { rows }
    }

    /// Rebuild a dataset from client rows. Rows without an id, and repeats of
    /// an id already seen, get fresh ids starting at `first_free` so they never
    /// collide with known rows. An id with no successor is rejected.
    pub fn from_incoming(incoming: Vec<IncomingRow>, first_free: u64) -> Result<Self> {
        let mut next = first_free;
        for id in incoming.iter().filter_map(|row| row.id) {
            next = next.max(id_after(id.0)?);
        }

        let mut seen = HashSet::with_capacity(incoming.len());
        let mut rows = Vec::with_capacity(incoming.len());
        for row in incoming {
            let id = match row.id {
                Some(id) if seen.insert(id) => id,
                _ => {
                    let id = RowId(next);
                    next = id_after(next)?;
                    seen.insert(id);
                    id
                }
            };
            rows.push(Row {
                id,
                record: row.record,
            });
        }
        Ok(Dataset { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn get(&self, position: usize) -> Option<&Row> {
        self.rows.get(position)
    }

    pub(crate) fn get_mut(&mut self, position: usize) -> Option<&mut Row> {
        self.rows.get_mut(position)
    }

    pub fn position_of(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|row| row.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter().map(|row| &row.record)
    }

    /// Smallest id not used by any row.
    pub fn next_id(&self) -> u64 {
        self.rows
            .iter()
            .map(|row| row.id.0.saturating_add(1))
            .max()
            .unwrap_or(0)
    }
}

fn id_after(id: u64) -> Result<u64> {
    id.checked_add(1).ok_or_else(|| BookError::InvalidValue {
        field: "id".to_string(),
        value: id.to_string(),
    })
}

impl FromIterator<Row> for Dataset {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Dataset {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Dataset {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
pub(crate) fn book(title: &str, author: &str, genre: &str, year: i32, isbn: &str) -> Record {
    Record {
        title: title.to_string(),
        author: author.to_string(),
        genre: genre.to_string(),
        published_year: year,
        isbn: isbn.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_round_trip_through_from_str() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
        assert!(matches!(
            "title".parse::<Field>(),
            Err(BookError::UnknownField(name)) if name == "title"
        ));
    }

    #[test]
    fn set_rejects_non_numeric_year() {
        let mut record = book("A", "B", "Fiction", 2000, "123");
        assert!(record.set(Field::PublishedYear, "soon").is_err());
        record.set(Field::PublishedYear, " 1999 ").unwrap();
        assert_eq!(record.published_year, 1999);
    }

    #[test]
    fn rows_serialize_flat_with_wire_names() {
        let dataset = Dataset::from_records(vec![book("A", "B", "Fiction", 2000, "123")]);
        let json = serde_json::to_value(&dataset).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "id": 0,
                "Title": "A",
                "Author": "B",
                "Genre": "Fiction",
                "PublishedYear": 2000,
                "ISBN": "123"
            }])
        );
    }

    #[test]
    fn incoming_rows_accept_textual_year_and_missing_id() {
        let rows: Vec<IncomingRow> = serde_json::from_value(serde_json::json!([
            { "id": 4, "Title": "A", "Author": "B", "Genre": "G", "PublishedYear": "2001", "ISBN": "1" },
            { "Title": "C", "Author": "D", "Genre": "G", "PublishedYear": 1990, "ISBN": "2" }
        ]))
        .unwrap();

        let dataset = Dataset::from_incoming(rows, 2).unwrap();
        assert_eq!(dataset.get(0).unwrap().id, RowId(4));
        assert_eq!(dataset.get(0).unwrap().record.published_year, 2001);
        assert_eq!(dataset.get(1).unwrap().id, RowId(5));
    }

    fn incoming(id: Option<u64>, title: &str) -> IncomingRow {
        IncomingRow {
            id: id.map(RowId),
            record: book(title, "B", "G", 2000, "1"),
        }
    }

    #[test]
    fn repeated_incoming_ids_are_renumbered() {
        let rows = vec![
            incoming(Some(1), "A"),
            incoming(Some(1), "A copy"),
            incoming(None, "New"),
        ];
        let dataset = Dataset::from_incoming(rows, 0).unwrap();
        let ids: Vec<_> = dataset.iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![RowId(1), RowId(2), RowId(3)]);
    }

    #[test]
    fn incoming_id_at_the_top_of_the_range_is_rejected() {
        let err = Dataset::from_incoming(vec![incoming(Some(u64::MAX), "A")], 0).unwrap_err();
        assert!(matches!(err, BookError::InvalidValue { field, .. } if field == "id"));

        let dataset = Dataset::from_incoming(vec![incoming(Some(u64::MAX - 1), "A")], 0).unwrap();
        assert_eq!(dataset.next_id(), u64::MAX);
        assert!(Dataset::from_incoming(vec![incoming(None, "B")], dataset.next_id()).is_err());
    }

    #[test]
    fn next_id_saturates() {
        let dataset: Dataset = vec![Row {
            id: RowId(u64::MAX),
            record: book("A", "B", "G", 1, "1"),
        }]
        .into_iter()
        .collect();
        assert_eq!(dataset.next_id(), u64::MAX);
    }

    #[test]
    fn next_id_is_past_the_largest() {
        let dataset = Dataset::from_records(vec![
            book("A", "B", "G", 1, "1"),
            book("C", "D", "G", 2, "2"),
        ]);
        assert_eq!(dataset.next_id(), 2);
        assert_eq!(Dataset::default().next_id(), 0);
    }
}
