//! CSV loading for training data
//!
//! Parsing goes through polars. The last column is the label. A header line
//! is allowed (detected as a first line that does not parse as numbers),
//! blank lines are skipped and the separator may be `,`, `;` or a tab.
//! Errors name the line and column of a bad cell but never its contents.

use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::Path;

use ndarray::{Array1, Array2};
use polars::prelude::{Column, CsvParseOptions, CsvReadOptions, DataType, SerReader};
use tracing::{debug, info};

use super::{Dataset, DatasetOrigin};
use crate::error::{ModelError, Result};

const SEPARATORS: [u8; 3] = [b',', b';', b'\t'];

/// Load a labeled CSV file
pub fn load_csv(path: &Path) -> Result<Dataset> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ModelError::DatasetInvalid(format!("training data not found: {}", path.display())),
        _ => ModelError::DatasetInvalid(format!("cannot read {}: {}", path.display(), e)),
    })?;

    // (1-based line number, content) of every non-blank line
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    let Some(&(_, first)) = lines.first() else {
        return Err(no_data_rows(path));
    };
    let separator = sniff_separator(first);
    let has_header = !is_numeric_row(first, separator);
    let data_lines = &lines[usize::from(has_header)..];
    if data_lines.is_empty() {
        return Err(no_data_rows(path));
    }
    if has_header {
        debug!(path = %path.display(), "Skipping CSV header");
    }

    let body = lines.iter().map(|(_, line)| *line).collect::<Vec<_>>().join("\n");
    let df = CsvReadOptions::default()
        .with_has_header(has_header)
        .with_infer_schema_length(None)
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .into_reader_with_file_handle(Cursor::new(body.into_bytes()))
        .finish()
        .map_err(|e| {
            debug!(path = %path.display(), error = %e, "CSV parse failed");
            ModelError::DatasetInvalid(format!(
                "{}: malformed CSV, check quoting and that every line has the same number of columns",
                path.display()
            ))
        })?;

    let width = df.width();
    if width < 2 {
        return Err(ModelError::DatasetInvalid(format!(
            "{}: training data must have at least 2 columns (features + label), got {}",
            path.display(),
            width
        )));
    }
    if df.height() != data_lines.len() {
        return Err(ModelError::DatasetInvalid(format!(
            "{}: parsed {} rows from {} data lines",
            path.display(),
            df.height(),
            data_lines.len()
        )));
    }

    let mut columns = df
        .get_columns()
        .iter()
        .enumerate()
        .map(|(index, column)| numeric_column(column, index, data_lines, path))
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let labels = columns.pop().unwrap_or_default();
    let n_rows = labels.len();
    let features = Array2::from_shape_fn((n_rows, width - 1), |(r, c)| columns[c][r]);

    info!(path = %path.display(), n_rows, n_features = width - 1, "Loaded training data");

    Ok(Dataset::new(features, Array1::from_vec(labels)).with_origin(DatasetOrigin::File(path.to_path_buf())))
}

/// Cast a parsed column to f64; a null means the cell was empty, missing or not numeric
fn numeric_column(column: &Column, index: usize, lines: &[(usize, &str)], path: &Path) -> Result<Vec<f64>> {
    let first_line = lines.first().map_or(0, |(line, _)| *line);
    let cast = column
        .cast(&DataType::Float64)
        .map_err(|_| invalid_cell(path, first_line, index))?;
    let values = cast.f64().map_err(|_| invalid_cell(path, first_line, index))?;

    values
        .into_iter()
        .zip(lines)
        .map(|(value, (line, _))| value.ok_or_else(|| invalid_cell(path, *line, index)))
        .collect()
}

fn invalid_cell(path: &Path, line: usize, index: usize) -> ModelError {
    ModelError::DatasetInvalid(format!(
        "{}: line {}, column {}: missing or non-numeric value",
        path.display(),
        line,
        index + 1
    ))
}

fn no_data_rows(path: &Path) -> ModelError {
    ModelError::DatasetInvalid(format!("{}: no data rows", path.display()))
}

/// First of `,` `;` tab that occurs in the line, comma otherwise
fn sniff_separator(line: &str) -> u8 {
    SEPARATORS
        .into_iter()
        .find(|sep| line.as_bytes().contains(sep))
        .unwrap_or(b',')
}

fn is_numeric_row(line: &str, separator: u8) -> bool {
    line.split(char::from(separator))
        .all(|cell| cell.trim().trim_matches('"').parse::<f64>().is_ok())
}
