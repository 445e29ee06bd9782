//! Text normalization and comment splitting.
//!
//! Two levels of cleaning are applied:
//!
//! - [`fold`] lower-cases, strips diacritics and collapses whitespace. The
//!   result is the comment's `normalized_text`, used for sentiment scoring and
//!   embedding.
//! - [`strip_punctuation`] additionally replaces every non-alphanumeric
//!   character with a space. It is only used for keyword extraction.
//!
//! Cells are split on every Unicode line boundary (including a lone `\r`,
//! `U+2028` and `U+2029`); blank lines and the spreadsheet missing-value token
//! (`nan`) are discarded.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::error::{RowParseError, SourceNotice};
use crate::input::{Cell, CommentColumns, SurveyTable};

/// Placeholder written by spreadsheet exports for empty cells.
pub const MISSING_TOKEN: &str = "nan";

/// One discrete comment unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Comment {
    /// Identifier of the originating dataset.
    pub source_base: String,
    /// Zero-based row index in the input table.
    pub row: usize,
    /// The comment as written, trimmed.
    pub raw_text: String,
    /// Folded form of `raw_text`; never empty.
    pub normalized_text: String,
}

/// Lower-case, strip diacritics, and collapse runs of whitespace.
pub fn fold(text: &str) -> String {
    let decomposed: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    decomposed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace punctuation and symbols with spaces, then collapse whitespace.
///
/// Expects already-folded text but works on any input.
pub fn strip_punctuation(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a column header for keyword matching.
pub fn normalize_column_name(name: &str) -> String {
    strip_punctuation(&fold(name))
}

/// Characters that end a line: LF, CR, VT, FF, the file/group/record
/// separators, NEL, and the Unicode line and paragraph separators.
pub const fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\u{0b}'
            | '\u{0c}'
            | '\u{1c}'
            | '\u{1d}'
            | '\u{1e}'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

/// Split a multi-line cell into trimmed, non-placeholder lines.
pub fn split_cell(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(is_line_break)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case(MISSING_TOKEN))
}

/// Build comments from a single cell's text.
pub fn comments_from_text(source_base: &str, row: usize, raw: &str) -> Vec<Comment> {
    split_cell(raw)
        .filter_map(|line| {
            let normalized_text = fold(line);
            (!normalized_text.is_empty()).then(|| Comment {
                source_base: source_base.to_string(),
                row,
                raw_text: line.to_string(),
                normalized_text,
            })
        })
        .collect()
}

/// Result of normalizing a whole table.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    /// Comments in table order (row, then column, then line).
    pub comments: Vec<Comment>,
    /// Cells that could not be read and were dropped.
    pub warnings: Vec<RowParseError>,
    /// Sources that contributed nothing, and why.
    pub notices: Vec<SourceNotice>,
}

/// Extract every comment from the comment-like columns of `table`.
///
/// Unreadable cells are dropped and recorded as warnings; they never abort
/// the batch.
#[tracing::instrument(skip_all, fields(rows = table.rows.len(), columns = table.columns.len()))]
pub fn normalize_table(table: &SurveyTable, columns: &dyn CommentColumns) -> NormalizedBatch {
    let selected: Vec<(usize, &str)> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| columns.is_comment_column(&normalize_column_name(name)))
        .map(|(idx, name)| (idx, name.as_str()))
        .collect();

    tracing::debug!(
        selected = ?selected.iter().map(|(_, n)| *n).collect::<Vec<_>>(),
        "comment columns detected"
    );

    let mut batch = NormalizedBatch::default();
    for (row_idx, row) in table.rows.iter().enumerate() {
        for &(col_idx, col_name) in &selected {
            let Some(cell) = row.cells.get(col_idx) else {
                continue;
            };
            let text = match cell {
                Cell::Missing => continue,
                Cell::Text(text) => text.as_str(),
                Cell::Bytes(bytes) => match std::str::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        batch.warnings.push(RowParseError {
                            source_base: row.source_base.clone(),
                            row: row_idx,
                            column: col_name.to_string(),
                            reason: format!("not valid UTF-8: {e}"),
                        });
                        continue;
                    }
                },
                Cell::Malformed(reason) => {
                    batch.warnings.push(RowParseError {
                        source_base: row.source_base.clone(),
                        row: row_idx,
                        column: col_name.to_string(),
                        reason: reason.clone(),
                    });
                    continue;
                }
            };
            batch
                .comments
                .extend(comments_from_text(&row.source_base, row_idx, text));
        }
    }

    batch.notices = table.notices.clone();
    for source in table.sources() {
        let own = table.columns_of(source);
        if !selected.iter().any(|(idx, _)| own.contains(idx)) {
            batch.notices.push(SourceNotice::no_comment_columns(source));
        } else if !batch.comments.iter().any(|c| c.source_base == source) {
            batch.notices.push(SourceNotice::no_comments(source));
        }
    }

    for warning in &batch.warnings {
        tracing::warn!(%warning, "dropped unreadable cell");
    }
    for notice in &batch.notices {
        tracing::warn!(%notice, "source contributed no comments");
    }
    tracing::info!(
        comments = batch.comments.len(),
        dropped = batch.warnings.len(),
        "normalization complete"
    );
    batch
}
