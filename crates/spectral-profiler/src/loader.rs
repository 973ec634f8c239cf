//! CSV Time-Series Loading

use std::fs;
use std::path::Path;

use crate::error::{ProfilerError, Result};

/// Reads a CSV slice into a single numeric series.
///
/// The first line is a header. The time index column is dropped and every
/// remaining cell is parsed as `f64`; rows are flattened in order, so a file
/// with several value columns yields `rows * columns` samples.
#[derive(Debug, Clone)]
pub struct CsvSeriesReader {
    time_column: String,
}

impl CsvSeriesReader {
    pub fn new(time_column: impl Into<String>) -> Self {
        Self {
            time_column: time_column.into(),
        }
    }

    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    pub fn read(&self, path: &Path) -> Result<Vec<f64>> {
        let text = fs::read_to_string(path).map_err(|e| ProfilerError::io(path, e))?;
        self.parse(&text).map_err(|reason| ProfilerError::DataFormat {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse CSV text; the error is a human-readable reason
    pub fn parse(&self, text: &str) -> std::result::Result<Vec<f64>, String> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')))
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header) = lines.next().ok_or_else(|| "file is empty".to_string())?;
        let columns: Vec<&str> = header
            .trim_start_matches('\u{feff}')
            .split(',')
            .map(clean_cell)
            .collect();
        let time_idx = columns
            .iter()
            .position(|&c| c == self.time_column)
            .ok_or_else(|| format!("missing time column '{}'", self.time_column))?;
        if columns.len() < 2 {
            return Err("no value columns besides the time index".to_string());
        }

        let mut series = Vec::new();
        for (line_no, line) in lines {
            let cells: Vec<&str> = line.split(',').map(clean_cell).collect();
            if cells.len() != columns.len() {
                return Err(format!(
                    "line {}: expected {} fields, found {}",
                    line_no,
                    columns.len(),
                    cells.len()
                ));
            }
            for (idx, cell) in cells.iter().enumerate() {
                if idx == time_idx {
                    continue;
                }
                let value: f64 = cell
                    .parse()
                    .ok()
                    .filter(|v: &f64| v.is_finite())
                    .ok_or_else(|| {
                        format!(
                            "line {}: column '{}': '{}' is not a finite number",
                            line_no, columns[idx], cell
                        )
                    })?;
                series.push(value);
            }
        }

        if series.is_empty() {
            return Err("no data rows".to_string());
        }
        Ok(series)
    }
}

impl Default for CsvSeriesReader {
    fn default() -> Self {
        Self::new("Time")
    }
}

fn clean_cell(cell: &str) -> &str {
    cell.trim().trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_column() {
        let reader = CsvSeriesReader::default();
        let series = reader.parse("Time,Value\n0.0,1.5\n0.1,-2\n0.2,3e2\n").unwrap();
        assert_eq!(series, vec![1.5, -2.0, 300.0]);
    }

    #[test]
    fn test_multiple_columns_flatten_row_major() {
        let reader = CsvSeriesReader::default();
        let series = reader.parse("a,Time,b\n1,0,2\n3,1,4\n").unwrap();
        assert_eq!(series, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_crlf_quotes_and_blank_lines() {
        let reader = CsvSeriesReader::default();
        let series = reader
            .parse("\u{feff}\"Time\",\"V\"\r\n0,\"7\"\r\n\r\n1, 8 \r\n")
            .unwrap();
        assert_eq!(series, vec![7.0, 8.0]);
    }

    #[test]
    fn test_missing_time_column() {
        let reader = CsvSeriesReader::default();
        let err = reader.parse("t,v\n0,1\n").unwrap_err();
        assert!(err.contains("missing time column"));
    }

    #[test]
    fn test_non_numeric_cell() {
        let reader = CsvSeriesReader::default();
        let err = reader.parse("Time,v\n0,1\n1,abc\n").unwrap_err();
        assert!(err.starts_with("line 3"));
        assert!(reader.parse("Time,v\n0,NaN\n").is_err());
    }

    #[test]
    fn test_ragged_row() {
        let reader = CsvSeriesReader::default();
        assert!(reader.parse("Time,v\n0,1,2\n").is_err());
    }

    #[test]
    fn test_header_only() {
        let reader = CsvSeriesReader::default();
        assert_eq!(reader.parse("Time,v\n").unwrap_err(), "no data rows");
        assert!(reader.parse("").is_err());
    }

    #[test]
    fn test_custom_time_column() {
        let reader = CsvSeriesReader::new("timestamp");
        assert_eq!(reader.parse("timestamp,x\n5,9\n").unwrap(), vec![9.0]);
    }

    #[test]
    fn test_read_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "Time,v\n0,x\n").unwrap();
        match CsvSeriesReader::default().read(&path) {
            Err(ProfilerError::DataFormat { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
