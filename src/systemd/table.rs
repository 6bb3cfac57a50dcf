// Reader for the text tables printed by `systemctl list-units` / `list-timers`

use crate::error::{CheckError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// "7 loaded units listed.", "3 timers listed.", possibly followed by a hint
fn count_line_regex() -> &'static Regex {
    static COUNT: OnceLock<Regex> = OnceLock::new();
    COUNT.get_or_init(|| {
        Regex::new(r"^\d+ (?:loaded )?(?:units?|timers?|unit files?) listed\.").expect("count pattern is valid")
    })
}

/// Lines below the table body that carry no unit data
fn is_trailer_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("LOAD ")
        || trimmed.starts_with("ACTIVE ")
        || trimmed.starts_with("SUB ")
        || trimmed.starts_with("Pass --all")
        || trimmed.starts_with("To show all installed unit files")
        || count_line_regex().is_match(trimmed)
}

/// A text table whose columns are located by the start offsets of the
/// header words. Offsets are counted in characters, so multi-byte markers
/// such as `●` in the first column do not shift the following columns.
#[derive(Debug, Clone)]
pub struct Table {
    source: String,
    columns: Vec<String>,
    starts: Vec<usize>,
    body: Vec<String>,
}

/// One body row, keyed by lower-cased column heading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub raw: String,
    cells: HashMap<String, String>,
}

impl TableRow {
    /// Get a cell by column heading; unnamed columns are `column_<index>`
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

impl Table {
    /// Parse the stdout of a systemctl listing. `source` names the command
    /// for error messages.
    pub fn parse(source: &str, stdout: &str) -> Result<Self> {
        let mut lines = stdout.lines().skip_while(|line| line.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| CheckError::parse(source, "the output is empty"))?
            .to_lowercase();

        let starts = column_starts(&header);
        if starts.is_empty() {
            return Err(CheckError::parse(source, "the table header has no columns").into());
        }
        let columns = split_row(&header, &starts)
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                if name.is_empty() {
                    format!("column_{}", index)
                } else {
                    name
                }
            })
            .collect();

        let body = lines
            .take_while(|line| !line.trim().is_empty())
            .filter(|line| !is_trailer_line(line))
            .map(str::to_string)
            .collect();

        Ok(Self {
            source: source.to_string(),
            columns,
            starts,
            body,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fail unless every expected heading is present.
    pub fn require_columns(&self, expected: &[&str]) -> Result<()> {
        for column in expected {
            if !self.columns.iter().any(|c| c == column) {
                return Err(CheckError::parse(
                    &self.source,
                    format!(
                        "the column heading '{}' couldn't be found in the table header, possibly the table layout of systemctl has changed",
                        column
                    ),
                )
                .into());
            }
        }
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.body.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = TableRow> + '_ {
        self.body.iter().map(|line| {
            let cells = self
                .columns
                .iter()
                .cloned()
                .zip(split_row(line, &self.starts))
                .collect();
            TableRow {
                raw: line.clone(),
                cells,
            }
        })
    }
}

/// Character offset at which every header column begins. A leading run of
/// spaces forms a nameless first column (the state marker in list-units).
pub(crate) fn column_starts(header: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut previous_is_space = true;
    for (index, ch) in header.chars().enumerate() {
        let is_space = ch == ' ';
        if index == 0 && is_space {
            starts.push(0);
        }
        if previous_is_space && !is_space {
            starts.push(index);
        }
        previous_is_space = is_space;
    }
    starts
}

/// Cut a row at the given character offsets and trim every cell.
pub(crate) fn split_row(line: &str, starts: &[usize]) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(chars.len()).min(chars.len());
            let start = start.min(end);
            chars[start..end].iter().collect::<String>().trim().to_string()
        })
        .collect()
}
