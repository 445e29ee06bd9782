//! Command implementations.
//!
//! Also holds the thin readers that turn uploaded survey exports into a
//! [`SurveyTable`]. Each file becomes one source, named from its filename.

use anyhow::Context;
use camino::Utf8Path;
use owo_colors::OwoColorize;
use survey_lens_core::SourceNotice;
use survey_lens_core::input::{Cell, SurveyRow, SurveyTable, source_base_from_filename};

pub mod analyze;
pub mod info;
pub mod sentiment;
#[cfg(feature = "mcp")]
pub mod serve;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Read a file and validate its size against the configured limit.
pub fn read_input_file(path: &Utf8Path, max_bytes: Option<usize>) -> anyhow::Result<Vec<u8>> {
    // Preflight: check file size via metadata before reading into memory.
    let metadata =
        std::fs::metadata(path.as_std_path()).with_context(|| format!("failed to read {path}"))?;
    if let Some(max) = max_bytes {
        let size = metadata.len() as usize;
        if size > max {
            anyhow::bail!("input too large: {path} is {size} bytes (limit: {max} bytes)");
        }
    }

    let content =
        std::fs::read(path.as_std_path()).with_context(|| format!("failed to read {path}"))?;
    Ok(content)
}

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// Tab-separated values with a header row.
    Tsv,
    /// A JSON array of flat objects.
    Json,
}

impl InputFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Utf8Path) -> anyhow::Result<Self> {
        match path.extension().map(str::to_ascii_lowercase).as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("tsv" | "tab") => Ok(Self::Tsv),
            Some("json") => Ok(Self::Json),
            _ => anyhow::bail!("unsupported input format: {path} (expected .csv, .tsv or .json)"),
        }
    }
}

/// Load every file into one table, one source per file.
///
/// A file that cannot be read or parsed does not stop the others: it is
/// recorded as a [`SourceNotice`] on the table, keyed by the source its
/// filename names. Fails only when no file could be loaded at all.
pub fn load_table<S: AsRef<str>>(
    paths: &[camino::Utf8PathBuf],
    source_markers: &[S],
    max_bytes: Option<usize>,
) -> anyhow::Result<SurveyTable> {
    let mut table = SurveyTable::default();
    let mut loaded = 0usize;
    for path in paths {
        let file_name = path.file_name().unwrap_or(path.as_str());
        let source_base = source_base_from_filename(file_name, source_markers);
        match load_file(path, &source_base, max_bytes) {
            Ok(parsed) => {
                tracing::debug!(
                    path = %path,
                    source = %source_base,
                    rows = parsed.rows.len(),
                    columns = parsed.columns.len(),
                    "input loaded"
                );
                table.merge(parsed);
                loaded += 1;
            }
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(path = %path, source = %source_base, %reason, "input skipped");
                table
                    .notices
                    .push(SourceNotice::unreadable(source_base, reason));
            }
        }
    }
    if loaded == 0 && !paths.is_empty() {
        let reasons: Vec<String> = table.notices.iter().map(ToString::to_string).collect();
        anyhow::bail!("no input file could be read:\n  {}", reasons.join("\n  "));
    }
    Ok(table)
}

fn load_file(
    path: &Utf8Path,
    source_base: &str,
    max_bytes: Option<usize>,
) -> anyhow::Result<SurveyTable> {
    let format = InputFormat::from_path(path)?;
    let bytes = read_input_file(path, max_bytes)?;
    parse_table(&bytes, format, source_base).with_context(|| format!("failed to parse {path}"))
}

/// Print per-source notices as CLI warnings on stderr.
pub fn print_notices(notices: &[SourceNotice]) {
    for notice in notices {
        eprintln!("{} {notice}", "warning:".yellow().bold());
    }
}

/// Parse one upload in the given format.
pub fn parse_table(
    bytes: &[u8],
    format: InputFormat,
    source_base: &str,
) -> anyhow::Result<SurveyTable> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match format {
        InputFormat::Csv => parse_delimited(bytes, b',', source_base),
        InputFormat::Tsv => parse_delimited(bytes, b'\t', source_base),
        InputFormat::Json => parse_json(bytes, source_base),
    }
}

fn parse_delimited(bytes: &[u8], delimiter: u8, source_base: &str) -> anyhow::Result<SurveyTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .byte_headers()
        .context("missing header row")?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let cells = match record {
            Ok(record) => {
                let mut cells: Vec<Cell> = record.iter().map(cell_from_bytes).collect();
                cells.resize(columns.len(), Cell::Missing);
                cells
            }
            Err(e) => vec![Cell::Malformed(e.to_string()); columns.len()],
        };
        rows.push(SurveyRow {
            source_base: source_base.to_string(),
            cells,
        });
    }
    Ok(SurveyTable::new(columns, rows))
}

fn cell_from_bytes(field: &[u8]) -> Cell {
    if field.iter().all(u8::is_ascii_whitespace) {
        return Cell::Missing;
    }
    match std::str::from_utf8(field) {
        Ok(text) => Cell::Text(text.to_string()),
        Err(_) => Cell::Bytes(field.to_vec()),
    }
}

fn parse_json(bytes: &[u8], source_base: &str) -> anyhow::Result<SurveyTable> {
    let records: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_slice(bytes).context("expected a JSON array of objects")?;

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| SurveyRow {
            source_base: source_base.to_string(),
            cells: columns
                .iter()
                .map(|name| record.get(name).map_or(Cell::Missing, cell_from_json))
                .collect(),
        })
        .collect();
    Ok(SurveyTable::new(columns, rows))
}

fn cell_from_json(value: &serde_json::Value) -> Cell {
    use serde_json::Value;
    match value {
        Value::Null => Cell::Missing,
        Value::String(s) if s.trim().is_empty() => Cell::Missing,
        Value::String(s) => Cell::Text(s.clone()),
        Value::Number(n) => Cell::Text(n.to_string()),
        Value::Bool(b) => Cell::Text(b.to_string()),
        Value::Array(_) | Value::Object(_) => {
            Cell::Malformed("expected a text value, found a nested structure".to_string())
        }
    }
}
