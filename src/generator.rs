use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{BookError, Result};
use crate::record::{Dataset, Record};

pub const MIN_COUNT: usize = 1;
pub const MAX_COUNT: usize = 100_000;
pub const DEFAULT_COUNT: usize = 10_000;

const GENRES: [&str; 10] = [
    "Fiction",
    "Non-Fiction",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Fantasy",
    "Biography",
    "History",
    "Science",
    "Philosophy",
];

const FIRST_NAMES: [&str; 20] = [
    "James", "Mary", "John", "Patricia", "Robert", "Jennifer", "Michael", "Linda", "William",
    "Elizabeth", "David", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas", "Sarah",
    "Christopher", "Karen",
];

const LAST_NAMES: [&str; 20] = [
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor",
    "Moore", "Jackson", "Martin",
];

const TITLES: [&str; 20] = [
    "The Great Adventure",
    "Mysteries of Time",
    "Love in the City",
    "The Last Journey",
    "Beyond the Stars",
    "Whispers in the Dark",
    "The Secret Garden",
    "Chronicles of Tomorrow",
    "Dancing with Shadows",
    "The Golden Path",
    "Echoes of the Past",
    "The Silent Storm",
    "Bridges to Nowhere",
    "The Forgotten Kingdom",
    "Tales of Wonder",
    "The Endless Night",
    "Rivers of Dreams",
    "The Burning Sky",
    "Secrets of the Deep",
    "The Crystal Palace",
];

pub const FIRST_YEAR: i32 = 1954;
pub const LAST_YEAR: i32 = 2023;

/// Generate `count` random book records with the thread-local RNG.
pub fn generate(count: usize) -> Result<Dataset> {
    generate_with(count, &mut rand::thread_rng())
}

/// Generate `count` random book records from `rng`.
///
/// Titles may repeat; roughly three in ten get an index suffix, which is
/// cosmetic only.
pub fn generate_with<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Result<Dataset> {
    check_count(count as i64, MAX_COUNT)?;

    let records = (0..count).map(|i| random_book(i, rng)).collect();
    Ok(Dataset::from_records(records))
}

/// Validate a requested record count against `[MIN_COUNT, max]`.
pub fn check_count(requested: i64, max: usize) -> Result<usize> {
    if requested < MIN_COUNT as i64 || requested > max as i64 {
        return Err(BookError::GenerationRangeInvalid {
            requested,
            min: MIN_COUNT,
            max,
        });
    }
    Ok(requested as usize)
}

/// Display filename for a generated dataset.
pub fn sample_filename(count: usize) -> String {
    format!("sample-books-{count}.csv")
}

fn pick<R: Rng + ?Sized>(rng: &mut R, words: &[&'static str]) -> &'static str {
    words.choose(rng).copied().unwrap_or_default()
}

fn random_book<R: Rng + ?Sized>(index: usize, rng: &mut R) -> Record {
    let mut title = pick(rng, &TITLES).to_string();
    if rng.gen_bool(0.3) {
        title.push_str(&format!(" {}", index + 1));
    }

    Record {
        title,
        author: format!("{} {}", pick(rng, &FIRST_NAMES), pick(rng, &LAST_NAMES)),
        genre: pick(rng, &GENRES).to_string(),
        published_year: rng.gen_range(FIRST_YEAR..=LAST_YEAR),
        isbn: random_isbn(rng),
    }
}

fn random_isbn<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "978-{}-{:06}-{:02}-{}",
        rng.gen_range(1..=9),
        rng.gen_range(0..1_000_000),
        rng.gen_range(0..100),
        rng.gen_range(0..10)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use regex::Regex;

    #[test]
    fn records_follow_the_schema() {
        let isbn = Regex::new(r"^978-[1-9]-\d{6}-\d{2}-\d$").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let dataset = generate_with(500, &mut rng).unwrap();

        assert_eq!(dataset.len(), 500);
        for (i, row) in dataset.iter().enumerate() {
            let book = &row.record;
            assert_eq!(row.id.0, i as u64);
            assert!(TITLES.iter().any(|t| book.title.starts_with(t)), "{}", book.title);
            assert!(GENRES.contains(&book.genre.as_str()));
            let (first, last) = book.author.split_once(' ').unwrap();
            assert!(FIRST_NAMES.contains(&first) && LAST_NAMES.contains(&last));
            assert!((FIRST_YEAR..=LAST_YEAR).contains(&book.published_year));
            assert!(isbn.is_match(&book.isbn), "{}", book.isbn);
        }
    }

    #[test]
    fn same_seed_same_output() {
        let a = generate_with(20, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = generate_with(20, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn count_outside_range_is_rejected() {
        assert!(matches!(
            generate(0),
            Err(BookError::GenerationRangeInvalid { requested: 0, .. })
        ));
        assert!(generate(MAX_COUNT + 1).is_err());
        assert_eq!(generate(1).unwrap().len(), 1);
        assert!(check_count(-3, MAX_COUNT).is_err());
        assert_eq!(check_count(50, 100).unwrap(), 50);
    }

    #[test]
    fn filename_mentions_count() {
        assert_eq!(sample_filename(250), "sample-books-250.csv");
    }
}
