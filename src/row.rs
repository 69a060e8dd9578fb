//! Input rows
//!
//! Rows arrive as column name to string mappings. Every cell is sanitized
//! before any merge logic sees it.

use std::{io::Read, sync::LazyLock};

use indexmap::IndexMap;

use crate::Error;

static MARKUP: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"<[^>]*>").unwrap());

static LANGUAGE_CODE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-z]{2}$").unwrap());

static AFFIRMATIVE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)^(?:1|y|yes|o|oui)$").unwrap());

/// Strip angle-bracket markup and surrounding whitespace.
pub fn sanitize_cell(raw: &str) -> String {
    MARKUP.replace_all(raw, "").trim().to_owned()
}

pub fn is_language_code(lc: &str) -> bool {
    LANGUAGE_CODE.is_match(lc)
}

pub fn is_affirmative(value: &str) -> bool {
    AFFIRMATIVE.is_match(value.trim())
}

#[derive(Debug, Clone, Default)]
pub struct ImportRow {
    /// 1-based data line, the header not counted.
    pub line: usize,
    columns: IndexMap<String, String>,
}

impl ImportRow {
    pub fn new<K: Into<String>, V: AsRef<str>>(
        line: usize,
        columns: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            line,
            columns: columns
                .into_iter()
                .map(|(name, value)| (name.into(), sanitize_cell(value.as_ref())))
                .collect(),
        }
    }

    /// Non-blank value of a column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .get(column)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl AsRef<str>) {
        self.columns.insert(column.into(), sanitize_cell(value.as_ref()));
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Fill blank or missing cells from configured defaults.
    pub fn apply_defaults(&mut self, defaults: &IndexMap<String, String>) {
        for (column, value) in defaults {
            if self.get(column).is_none() {
                self.set(column.clone(), value);
            }
        }
    }
}

/// Read tab-separated text into the header list and sanitized rows.
pub fn read_rows<R: Read>(reader: R) -> Result<(Vec<String>, Vec<ImportRow>), Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(Error::Input)?
        .iter()
        .map(sanitize_cell)
        .collect::<Vec<_>>();
    let rows = reader
        .records()
        .enumerate()
        .map(|(index, record)| {
            let record = record.map_err(Error::Input)?;
            Ok(ImportRow::new(
                index + 1,
                headers.iter().cloned().zip(record.iter()),
            ))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    Ok((headers, rows))
}
