use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{BookError, Result};
use crate::record::{Dataset, Field, Record, parse_year};

/// A row-level problem found while parsing. The row is skipped, parsing goes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    /// 1-based line number where the offending record starts
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Result of a best-effort parse: the rows that made it, plus what was skipped and why.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    pub dataset: Dataset,
    pub warnings: Vec<ParseWarning>,
}

/// Parse CSV text into a dataset of book records
///
/// The first record is the header. Columns are matched to record fields by
/// name, so any column order works; unknown columns are ignored. Every value
/// is trimmed. Rows with the wrong number of fields, or a `PublishedYear`
/// that is not an integer, are skipped and reported as warnings.
///
/// # Arguments
/// * `text` - Raw CSV content
///
/// # Returns
/// * `Result<Parsed>` - The parsed rows and warnings, or `ParseFailure` when the
///   input is empty or the header lacks one of the five book fields
///
/// # Examples
/// ```
/// use bookgrid::loader::parse;
///
/// let parsed = parse("Title,Author,Genre,PublishedYear,ISBN\nA,B,Fiction,2000,123").unwrap();
/// assert_eq!(parsed.dataset.len(), 1);
/// assert!(parsed.warnings.is_empty());
/// ```
pub fn parse(text: &str) -> Result<Parsed> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Err(BookError::ParseFailure("CSV input is empty".to_string()));
    }

    let (raw, mut warnings) = split_records(text);
    let mut raw = raw.into_iter();
    let header = raw
        .next()
        .ok_or_else(|| BookError::ParseFailure("CSV input has no header".to_string()))?;

    let columns = map_header(&header, &mut warnings)?;
    let width = header.fields.len();

    let mut records = Vec::new();
    for row in raw {
        if row.fields.len() != width {
            warnings.push(ParseWarning {
                line: row.line,
                message: format!(
                    "expected {} fields, found {}",
                    width,
                    row.fields.len()
                ),
            });
            continue;
        }

        let cell = |field: Field| row.fields[columns.index(field)].trim().to_string();
        let published_year = match parse_year(&cell(Field::PublishedYear)) {
            Ok(year) => year,
            Err(_) => {
                warnings.push(ParseWarning {
                    line: row.line,
                    message: format!(
                        "PublishedYear is not a number: {:?}",
                        cell(Field::PublishedYear)
                    ),
                });
                continue;
            }
        };

        records.push(Record {
            title: cell(Field::Title),
            author: cell(Field::Author),
            genre: cell(Field::Genre),
            published_year,
            isbn: cell(Field::Isbn),
        });
    }

    for warning in &warnings {
        log::warn!("CSV parsing warning: {warning}");
    }

    Ok(Parsed {
        dataset: Dataset::from_records(records),
        warnings,
    })
}

/// Parse uploaded bytes, which must be UTF-8.
pub fn parse_bytes(bytes: &[u8]) -> Result<Parsed> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| BookError::ParseFailure(format!("file is not valid UTF-8: {e}")))?;
    parse(text)
}

/// Load a dataset from a CSV file on disk
///
/// # Arguments
/// * `filepath` - Path to the CSV file to load
///
/// # Returns
/// * `Result<Parsed>` - The parsed file, `Io` if it cannot be read, or `ParseFailure`
///
/// # Examples
/// ```no_run
/// use bookgrid::loader::parse_file;
///
/// match parse_file("books.csv") {
///     Ok(parsed) => println!("Successfully parsed {} records", parsed.dataset.len()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn parse_file(filepath: impl AsRef<Path>) -> Result<Parsed> {
    let bytes = fs::read(filepath)?;
    parse_bytes(&bytes)
}

/// Reject uploads that are not CSV before they reach the parser.
///
/// Accepts a `.csv` filename (any case) or a `text/csv` content type.
pub fn check_csv_upload(filename: &str, content_type: Option<&str>) -> Result<()> {
    let by_name = filename.to_lowercase().ends_with(".csv");
    let by_type = content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim() == "text/csv")
        .unwrap_or(false);

    if by_name || by_type {
        Ok(())
    } else {
        Err(BookError::InvalidFileType)
    }
}

struct RawRecord {
    line: usize,
    fields: Vec<String>,
}

impl RawRecord {
    fn is_blank(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].trim().is_empty()
    }
}

struct ColumnMap([Option<usize>; 5]);

impl ColumnMap {
    fn index(&self, field: Field) -> usize {
        // map_header guarantees every slot is filled
        self.0[slot(field)].unwrap_or_default()
    }
}

fn slot(field: Field) -> usize {
    Field::ALL
        .iter()
        .position(|f| *f == field)
        .unwrap_or_default()
}

fn map_header(header: &RawRecord, warnings: &mut Vec<ParseWarning>) -> Result<ColumnMap> {
    let mut columns = [None; 5];

    for (i, name) in header.fields.iter().enumerate() {
        let name = name.trim();
        match name.parse::<Field>() {
            Ok(field) if columns[slot(field)].is_none() => columns[slot(field)] = Some(i),
            Ok(field) => warnings.push(ParseWarning {
                line: header.line,
                message: format!("duplicate column {field}, keeping the first"),
            }),
            Err(_) => warnings.push(ParseWarning {
                line: header.line,
                message: format!("ignoring unknown column {name:?}"),
            }),
        }
    }

    let missing: Vec<&str> = Field::ALL
        .iter()
        .filter(|field| columns[slot(**field)].is_none())
        .map(|field| field.as_str())
        .collect();

    if !missing.is_empty() {
        return Err(BookError::ParseFailure(format!(
            "header is missing column(s): {}",
            missing.join(", ")
        )));
    }

    Ok(ColumnMap(columns))
}

// Split CSV text into records. Quoted fields may contain commas, doubled
// quotes and line breaks; blank lines are dropped.
fn split_records(text: &str) -> (Vec<RawRecord>, Vec<ParseWarning>) {
    let mut records = Vec::new();
    let mut warnings = Vec::new();

    let mut fields = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_start = 1;
    let mut chars = text.chars().peekable();

    let mut finish = |fields: &mut Vec<String>, current: &mut String, start: usize| {
        fields.push(std::mem::take(current));
        let record = RawRecord {
            line: start,
            fields: std::mem::take(fields),
        };
        if !record.is_blank() {
            records.push(record);
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    // Double quote inside quoted field - add a single quote
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            // A quote only opens a quoted field at its start; elsewhere it is literal.
            '"' if current_field.trim().is_empty() => {
                current_field.clear();
                in_quotes = true;
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current_field));
            }
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\r' | '\n' if !in_quotes => {
                finish(&mut fields, &mut current_field, record_start);
                line += 1;
                record_start = line;
            }
            '\n' => {
                current_field.push(c);
                line += 1;
            }
            _ => current_field.push(c),
        }
    }

    if in_quotes {
        warnings.push(ParseWarning {
            line: record_start,
            message: "unterminated quoted field".to_string(),
        });
    } else if !current_field.is_empty() || !fields.is_empty() {
        finish(&mut fields, &mut current_field, record_start);
    }

    (records, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::book;
    use std::io::Write;

    const HEADER: &str = "Title,Author,Genre,PublishedYear,ISBN";

    #[test]
    fn parses_single_upload_row() {
        let parsed = parse("Title,Author,Genre,PublishedYear,ISBN\nA,B,Fiction,2000,123").unwrap();
        let records: Vec<_> = parsed.dataset.records().cloned().collect();
        assert_eq!(records, vec![book("A", "B", "Fiction", 2000, "123")]);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn trims_values_and_skips_blank_lines() {
        let text = format!("{HEADER}\n  A , B ,Fiction, 2000 ,123 \n\n   \nC,D,Mystery,1990,456\n");
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.dataset.len(), 2);
        assert_eq!(parsed.dataset.get(0).unwrap().record, book("A", "B", "Fiction", 2000, "123"));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn wrong_column_count_is_a_warning_not_a_failure() {
        let text = format!("{HEADER}\nA,B,Fiction,2000,123\nbroken,row\nC,D,Mystery,1990,456");
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.dataset.len(), 2);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line, 3);
        assert!(parsed.warnings[0].message.contains("expected 5 fields, found 2"));
    }

    #[test]
    fn non_numeric_year_skips_the_row() {
        let text = format!("{HEADER}\nA,B,Fiction,someday,123");
        let parsed = parse(&text).unwrap();
        assert!(parsed.dataset.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn columns_are_matched_by_name() {
        let text = "ISBN,PublishedYear,Genre,Author,Title,Price\n123,2000,Fiction,B,A,9.99";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.dataset.get(0).unwrap().record, book("A", "B", "Fiction", 2000, "123"));
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].message.contains("Price"));
    }

    #[test]
    fn quoted_fields_keep_commas_quotes_and_newlines() {
        let text = format!("{HEADER}\r\n\"Hello, \"\"World\"\"\",B,Fiction,2000,\"1\n2\"\r\nC,D,Mystery,1990,456");
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.dataset.len(), 2);
        let first = &parsed.dataset.get(0).unwrap().record;
        assert_eq!(first.title, "Hello, \"World\"");
        assert_eq!(first.isbn, "1\n2");
    }

    #[test]
    fn stray_quote_inside_a_field_is_literal() {
        let text = format!(
            "{HEADER}\nA,Pat O\"Brien,Fiction,2000,1\nB,C,Mystery,1990,2\nD,E,Fiction,1980,3\n"
        );
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.dataset.len(), 3);
        assert_eq!(parsed.dataset.get(0).unwrap().record.author, "Pat O\"Brien");
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn unterminated_quote_keeps_the_rows_before_it() {
        let text = format!("{HEADER}\nA,B,Fiction,2000,1\nC,D,Mystery,1990,2\n\"E,F,Fiction,1980,3\n");
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.dataset.len(), 2);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line, 4);
        assert!(parsed.warnings[0].message.contains("unterminated"));
    }

    #[test]
    fn quote_after_leading_space_opens_a_quoted_field() {
        let text = format!("{HEADER}\nA, \"Lee, Ann\",Fiction,2000,1");
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.dataset.get(0).unwrap().record.author, "Lee, Ann");
    }

    #[test]
    fn empty_input_fails() {
        assert!(matches!(parse(""), Err(BookError::ParseFailure(_))));
        assert!(matches!(parse(" \n \n"), Err(BookError::ParseFailure(_))));
    }

    #[test]
    fn header_only_yields_empty_dataset() {
        let parsed = parse(HEADER).unwrap();
        assert!(parsed.dataset.is_empty());
    }

    #[test]
    fn header_missing_a_field_fails() {
        let err = parse("Title,Author\nA,B").unwrap_err();
        assert!(err.to_string().contains("Genre, PublishedYear, ISBN"));
    }

    #[test]
    fn bom_is_ignored() {
        let text = format!("\u{feff}{HEADER}\nA,B,Fiction,2000,123");
        assert_eq!(parse(&text).unwrap().dataset.len(), 1);
    }

    #[test]
    fn invalid_utf8_is_a_parse_failure() {
        assert!(matches!(
            parse_bytes(&[0xff, 0xfe, 0x00]),
            Err(BookError::ParseFailure(_))
        ));
    }

    #[test]
    fn parse_file_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "A,B,Fiction,2000,123").unwrap();

        let parsed = parse_file(file.path()).unwrap();
        assert_eq!(parsed.dataset.len(), 1);
        assert!(matches!(
            parse_file(file.path().with_extension("missing")),
            Err(BookError::Io(_))
        ));
    }

    #[test]
    fn upload_type_check() {
        assert!(check_csv_upload("books.CSV", None).is_ok());
        assert!(check_csv_upload("books", Some("text/csv; charset=utf-8")).is_ok());
        assert!(matches!(
            check_csv_upload("books.xlsx", Some("application/octet-stream")),
            Err(BookError::InvalidFileType)
        ));
    }
}
