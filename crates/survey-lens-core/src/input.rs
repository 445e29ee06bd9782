//! Input table model supplied by the upload/merge layer.
//!
//! The pipeline does not read spreadsheets itself. Callers hand it a
//! [`SurveyTable`] where each row carries its source identifier, plus a
//! [`CommentColumns`] predicate deciding which columns hold free text.

use std::collections::BTreeMap;

use aho_corasick::AhoCorasick;
use camino::Utf8Path;
use regex::Regex;

use crate::error::{ConfigError, ConfigResult, SourceNotice};
use crate::normalize::normalize_column_name;

/// Column-name stems that mark a column as comment-like.
pub const DEFAULT_COLUMN_KEYWORDS: &[&str] = &[
    "coment", "observ", "sugest", "respost", "comment", "suggest", "response", "feedback",
];

/// Default markers preceding the source label in upload filenames, tried in
/// order.
pub const DEFAULT_SOURCE_MARKERS: &[&str] = &["pesquisa de clima", "base"];

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// Decoded text.
    Text(String),
    /// Undecoded bytes; decoded as UTF-8 during normalization.
    Bytes(Vec<u8>),
    /// Empty cell.
    Missing,
    /// A value the reader could not interpret, with the reason.
    Malformed(String),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One survey row annotated with the dataset it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyRow {
    /// Source identifier (see [`source_base_from_filename`]).
    pub source_base: String,
    /// Cells in column order. Short rows are padded implicitly with missing cells.
    pub cells: Vec<Cell>,
}

/// A rectangular table of survey rows from one or more uploads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveyTable {
    /// Column headers.
    pub columns: Vec<String>,
    /// Rows in upload order.
    pub rows: Vec<SurveyRow>,
    /// Column indexes each source's upload actually had. A source without an
    /// entry had every column.
    pub source_columns: BTreeMap<String, Vec<usize>>,
    /// Problems with whole sources, such as uploads that could not be read.
    pub notices: Vec<SourceNotice>,
}

impl SurveyTable {
    /// A table whose rows all share the full header.
    pub const fn new(columns: Vec<String>, rows: Vec<SurveyRow>) -> Self {
        Self {
            columns,
            rows,
            source_columns: BTreeMap::new(),
            notices: Vec::new(),
        }
    }

    /// Append another table, aligning its columns by header name.
    ///
    /// Columns missing from `other` are filled with [`Cell::Missing`]; new
    /// columns are appended to the header. Notices are carried over.
    pub fn merge(&mut self, other: Self) {
        let old_width = self.columns.len();
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|name| {
                self.columns.iter().position(|c| c == name).unwrap_or_else(|| {
                    self.columns.push(name.clone());
                    self.columns.len() - 1
                })
            })
            .collect();

        let width = self.columns.len();
        let existing: Vec<String> = self.sources().into_iter().map(str::to_string).collect();
        if width > old_width {
            for source in &existing {
                self.source_columns
                    .entry(source.clone())
                    .or_insert_with(|| (0..old_width).collect());
            }
        }
        for source in other.sources() {
            let mut own: Vec<usize> = match other.source_columns.get(source) {
                Some(indexes) => indexes.iter().map(|&i| mapping[i]).collect(),
                None => mapping.clone(),
            };
            if existing.iter().any(|s| s == source) {
                own.extend(self.columns_of(source));
            }
            own.sort_unstable();
            own.dedup();
            if own.len() == width {
                self.source_columns.remove(source);
            } else {
                self.source_columns.insert(source.to_string(), own);
            }
        }
        self.notices.extend(other.notices);

        for row in &mut self.rows {
            row.cells.resize(width, Cell::Missing);
        }
        for row in other.rows {
            let mut cells = vec![Cell::Missing; width];
            for (cell, &target) in row.cells.into_iter().zip(&mapping) {
                cells[target] = cell;
            }
            self.rows.push(SurveyRow {
                source_base: row.source_base,
                cells,
            });
        }
    }

    /// Distinct source identifiers in first-seen order.
    pub fn sources(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.source_base.as_str()) {
                seen.push(&row.source_base);
            }
        }
        seen
    }

    /// Indexes of the columns `source_base` had in its upload.
    pub fn columns_of(&self, source_base: &str) -> Vec<usize> {
        self.source_columns
            .get(source_base)
            .cloned()
            .unwrap_or_else(|| (0..self.columns.len()).collect())
    }

    /// A table holding only the rows and notices of `source_base`.
    pub fn filter_source(&self, source_base: &str) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| r.source_base == source_base)
                .cloned()
                .collect(),
            source_columns: self
                .source_columns
                .iter()
                .filter(|(s, _)| s.as_str() == source_base)
                .map(|(s, c)| (s.clone(), c.clone()))
                .collect(),
            notices: self
                .notices
                .iter()
                .filter(|n| n.source_base == source_base)
                .cloned()
                .collect(),
        }
    }
}

/// Decides whether a column holds free-text comments.
///
/// Receives the column name already normalized (lower-case, no diacritics,
/// no punctuation).
pub trait CommentColumns {
    /// Returns `true` if the column's cells should be treated as comments.
    fn is_comment_column(&self, normalized_name: &str) -> bool;
}

impl<F> CommentColumns for F
where
    F: Fn(&str) -> bool,
{
    fn is_comment_column(&self, normalized_name: &str) -> bool {
        self(normalized_name)
    }
}

/// Substring match of normalized column names against keyword stems.
#[derive(Debug, Clone)]
pub struct KeywordColumns {
    matcher: AhoCorasick,
}

impl KeywordColumns {
    /// Build a predicate from keyword stems. Stems are normalized the same
    /// way as column names.
    pub fn new<I, S>(keywords: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stems: Vec<String> = keywords
            .into_iter()
            .map(|k| normalize_column_name(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();
        if stems.is_empty() {
            return Err(ConfigError::Invalid {
                field: "columns.keywords",
                reason: "at least one non-empty keyword is required".to_string(),
            });
        }
        let matcher = AhoCorasick::new(&stems).map_err(|e| ConfigError::Invalid {
            field: "columns.keywords",
            reason: e.to_string(),
        })?;
        Ok(Self { matcher })
    }
}

impl Default for KeywordColumns {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMN_KEYWORDS).expect("default keywords are valid")
    }
}

impl CommentColumns for KeywordColumns {
    fn is_comment_column(&self, normalized_name: &str) -> bool {
        self.matcher.is_match(normalized_name)
    }
}

/// Derive a source identifier from an upload filename.
///
/// Captures the free-text label between the first matching marker and a
/// trailing year token, e.g. `PESQUISA DE CLIMA Vendas Sul - 2025.xlsx` or
/// `Base_Vendas_Sul_2023.csv` both yield `Vendas Sul`. Spaces inside a marker
/// also match `_` and `-`. Falls back to the file stem when no marker matches.
pub fn source_base_from_filename<S: AsRef<str>>(filename: &str, markers: &[S]) -> String {
    let path = Utf8Path::new(filename);
    let stem = path.file_stem().unwrap_or(filename);

    markers
        .iter()
        .map(AsRef::as_ref)
        .filter(|marker| !marker.trim().is_empty())
        .find_map(|marker| label_after(stem, marker))
        .unwrap_or_else(|| stem.to_string())
}

fn label_after(stem: &str, marker: &str) -> Option<String> {
    let marker = marker
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[\s_\-]+");
    let pattern = format!(r"(?i){marker}[\s_\-]+(.+?)[\s_\-]+(?:19|20)\d{{2}}(?:[^0-9]|$)");
    let re = Regex::new(&pattern).ok()?;
    let label = re
        .captures(stem)?
        .get(1)?
        .as_str()
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!label.is_empty()).then_some(label)
}
