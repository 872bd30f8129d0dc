use lazy_static::lazy_static;
use regex::Regex;

use crate::record::{Dataset, Field};

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._ -]").unwrap();
}

/// Convert a dataset to CSV format
///
/// The header lists the five book fields in their default order, followed by
/// one line per row. Values containing commas, quotes or line breaks are
/// quoted, with inner quotes doubled, so `loader::parse` reads them back
/// unchanged.
///
/// # Arguments
/// * `dataset` - Rows to export, in order
///
/// # Returns
/// * `String` - CSV content, newline-terminated
///
/// # Examples
/// ```
/// use bookgrid::downloader::to_csv;
/// use bookgrid::record::Dataset;
///
/// let csv = to_csv(&Dataset::default());
/// assert_eq!(csv, "Title,Author,Genre,PublishedYear,ISBN\n");
/// ```
pub fn to_csv(dataset: &Dataset) -> String {
    let mut csv_content = String::new();

    let header: Vec<&str> = Field::ALL.iter().map(|field| field.as_str()).collect();
    csv_content.push_str(&header.join(","));
    csv_content.push('\n');

    for row in dataset.iter() {
        for (i, field) in Field::ALL.iter().enumerate() {
            if i > 0 {
                csv_content.push(',');
            }
            push_escaped(&mut csv_content, &row.record.get(*field));
        }
        csv_content.push('\n');
    }

    csv_content
}

fn push_escaped(out: &mut String, value: &str) {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        out.push('"');
        out.push_str(&value.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(value);
    }
}

/// Suggested download name for an edited dataset: `edited-<filename>`,
/// with characters that would break a `Content-Disposition` header replaced.
pub fn export_filename(filename: &str) -> String {
    let name = if filename.trim().is_empty() {
        "data.csv"
    } else {
        filename
    };
    format!("edited-{}", UNSAFE_FILENAME_CHARS.replace_all(name, "_"))
}
