#![cfg(not(tarpaulin_include))]

use bookgrid::autosave::Debouncer;
use bookgrid::filter::{FilterSpec, Page, SortDirection, SortSpec};
use bookgrid::{Field, Grid, MemorySessionStore, SessionStore, generator, loader};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::time::Instant;

const PAGE_SIZE: usize = 25;

fn print_help() {
    println!("Commands:");
    println!("  q: Quit");
    println!("  n / p: Next / previous page");
    println!("  edit <row> <Field>=<value>: Change one cell (row as shown in the first column)");
    println!("  filter genre=<g> author=<a> from=<year> to=<year> search=<text>: Filter rows");
    println!("  clear: Remove all filters");
    println!("  sort <Field> [asc|desc]: Sort the display, `sort off` to stop");
    println!("  modified: List modified rows");
    println!("  reset: Discard all edits");
    println!("  save <path>: Write the edited data as CSV");
}

fn display(grid: &Grid, page: Page) {
    let view = grid.view(page);
    println!(
        "{} | {} / {} records | {} modified | page {}/{}",
        grid.filename(),
        view.matched,
        view.total,
        grid.modified_count(),
        view.page + 1,
        view.page_count.max(1)
    );
    println!(
        "{:>6}  {:<32} {:<22} {:<12} {:>5}  {}",
        "#", "Title", "Author", "Genre", "Year", "ISBN"
    );
    for row in &view.rows {
        let book = &row.row.record;
        println!(
            "{:>5}{} {:<32} {:<22} {:<12} {:>5}  {}",
            row.position,
            if row.modified { "*" } else { " " },
            truncate(&book.title, 32),
            truncate(&book.author, 22),
            truncate(&book.genre, 12),
            book.published_year,
            book.isbn
        );
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let cut: String = value.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}~")
    }
}

fn parse_filter(args: &str) -> Result<FilterSpec, String> {
    let mut spec = FilterSpec::default();
    for pair in args.split_whitespace() {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got {pair}"))?;
        let year = || value.parse::<i32>().map_err(|_| format!("not a year: {value}"));
        match key {
            "genre" => spec.genre = Some(value.to_string()),
            "author" => spec.author = Some(value.to_string()),
            "search" => spec.search = Some(value.to_string()),
            "from" => spec.year_from = Some(year()?),
            "to" => spec.year_to = Some(year()?),
            _ => return Err(format!("unknown filter {key}")),
        }
    }
    Ok(spec)
}

fn parse_sort(args: &str) -> Result<Option<SortSpec>, String> {
    let mut parts = args.split_whitespace();
    let field = match parts.next() {
        Some("off") => return Ok(None),
        Some(name) => name.parse::<Field>().map_err(|e| e.to_string())?,
        None => return Err("usage: sort <Field> [asc|desc]".to_string()),
    };
    let direction = match parts.next() {
        None | Some("asc") => SortDirection::Asc,
        Some("desc") => SortDirection::Desc,
        Some(other) => return Err(format!("unknown direction {other}")),
    };
    Ok(Some(SortSpec { field, direction }))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let s = Instant::now();
    let args: Vec<String> = env::args().collect();

    let store = MemorySessionStore::new();
    let session_id = match args.get(1).map(String::as_str) {
        Some("--generate") => {
            let count = args.get(2).and_then(|c| c.parse().ok()).unwrap_or(100);
            let data = generator::generate(count)?;
            store.create(data, &generator::sample_filename(count))
        }
        Some(path) => {
            let parsed = loader::parse_file(path)?;
            for warning in &parsed.warnings {
                eprintln!("warning: {warning}");
            }
            println!("Successfully parsed {} records", parsed.dataset.len());
            let filename = std::path::Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string());
            store.create(parsed.dataset, &filename)
        }
        None => {
            eprintln!("Usage: {} <file.csv> | --generate <count>", args[0]);
            return Ok(());
        }
    };

    let mut grid = Grid::open(&store, session_id, Debouncer::default())?;
    let mut page = Page::first(PAGE_SIZE);
    let mut status = String::from("ok");
    let mut show = true;

    loop {
        if show {
            display(&grid, page);
        }

        print!("({}) > ", status);
        io::stdout().flush()?;

        let mut command = String::new();
        if io::stdin().read_line(&mut command)? == 0 {
            break;
        }
        let command = command.trim();
        let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
        show = true;

        status = match verb {
            "" => "invalid command".to_string(),
            "help" => {
                print_help();
                show = false;
                "ok".to_string()
            }
            "q" => break,
            "n" => {
                if page.next().index < page.count(grid.view(page).matched) {
                    page = page.next();
                }
                "ok".to_string()
            }
            "p" => {
                page = page.prev();
                "ok".to_string()
            }
            "edit" => match rest.split_once(' ').and_then(|(row, cell)| {
                let (field, value) = cell.split_once('=')?;
                Some((row.trim().parse::<usize>().ok()?, field.trim(), value))
            }) {
                Some((position, field, value)) => {
                    match grid.edit_cell(position, field, value, Instant::now()) {
                        Ok(true) => "modified".to_string(),
                        Ok(false) => "matches original".to_string(),
                        Err(e) => e.to_string(),
                    }
                }
                None => "usage: edit <row> <Field>=<value>".to_string(),
            },
            "filter" => match parse_filter(rest) {
                Ok(spec) => {
                    grid.set_filter(spec);
                    page = Page::first(PAGE_SIZE);
                    format!("{} filter(s) active", grid.filter().active_count())
                }
                Err(e) => e,
            },
            "clear" => {
                grid.clear_filter();
                page = Page::first(PAGE_SIZE);
                "ok".to_string()
            }
            "sort" => match parse_sort(rest) {
                Ok(sort) => {
                    grid.set_sort(sort);
                    "ok".to_string()
                }
                Err(e) => e,
            },
            "modified" => {
                let positions: Vec<String> = grid
                    .modified_positions()
                    .iter()
                    .map(|p| p.to_string())
                    .collect();
                println!("modified rows: [{}]", positions.join(", "));
                show = false;
                "ok".to_string()
            }
            "reset" => match grid.reset(&store) {
                Ok(()) => "All changes have been reset".to_string(),
                Err(e) => e.to_string(),
            },
            "save" if !rest.trim().is_empty() => {
                grid.flush(&store)?;
                let path = rest.trim();
                fs::write(path, grid.export_csv())?;
                format!("saved {path}")
            }
            "save" => format!("usage: save <path> (suggested: {})", grid.export_filename()),
            _ => "invalid command".to_string(),
        };

        if grid.flush_if_due(Instant::now(), &store)? {
            log::debug!("autosaved {} modified rows", grid.modified_count());
        }
    }

    if grid.has_unsaved_changes() {
        grid.flush(&store)?;
    }
    log::info!(
        "session {} closed with {} modified rows",
        grid.session_id(),
        grid.modified_count()
    );

    let e = s.elapsed().as_secs_f64();
    println!("Total elapsed time: {:.1} seconds", e);

    Ok(())
}
