//! Minimal string-table used for raw extracts and quarantine artifacts
//!
//! Typed models (`CategoryRecord`, `Entity`, ...) cover the engine's own
//! schemas; `Frame` covers everything whose columns are only known at
//! runtime: IIF exports with placeholder headers, ODBC dumps, and the
//! hygiene/quarantine steps that run before mapping.

use std::io::Read;

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};

use crate::error::Result;

/// Headers plus string rows. Every row is padded to the header width.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Frame {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut frame = Self { headers, rows };
        frame.pad();
        frame
    }

    pub fn empty(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Read a comma-separated frame with a header row
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        Self::from_delimited(reader, b',')
    }

    /// Read a frame with an arbitrary single-byte delimiter
    pub fn from_delimited<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);

        let headers = rdr.headers()?.iter().map(|s| s.to_string()).collect();
        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            rows.push(record.iter().map(|s| s.to_string()).collect());
        }
        Ok(Self::new(headers, rows))
    }

    /// Serialize with every field quoted, matching the flat-file store's
    /// contract (downstream loaders expect quote-all)
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut wtr = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(Vec::new());
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        wtr.into_inner()
            .map_err(|e| crate::error::Error::InvalidData(format!("CSV write failed: {}", e)))
    }

    /// Index of a named column
    pub fn col(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col)).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Keep only the columns at the given indices, in the given order
    pub fn select_columns(&self, indices: &[usize]) -> Frame {
        let headers = indices
            .iter()
            .filter_map(|&i| self.headers.get(i).cloned())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Frame { headers, rows }
    }

    /// A frame with the same headers and the rows at the given indices
    pub fn take_rows(&self, indices: &[usize]) -> Frame {
        Frame {
            headers: self.headers.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Append a column. Values shorter than the row count are padded blank.
    pub fn push_column(&mut self, name: &str, mut values: Vec<String>) {
        values.resize(self.rows.len(), String::new());
        self.headers.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    fn pad(&mut self) {
        let width = self.headers.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_round_trip_quotes_all() {
        let frame = Frame::new(
            vec!["A".into(), "B".into()],
            vec![vec!["1".into(), "x,y".into()]],
        );
        let bytes = frame.to_csv_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("\"A\",\"B\""));

        let parsed = Frame::from_csv(bytes.as_slice()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let frame = Frame::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![vec!["1".into()]],
        );
        assert_eq!(frame.rows[0].len(), 3);
        assert_eq!(frame.get(0, 2), Some(""));
    }

    #[test]
    fn test_select_columns() {
        let frame = Frame::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![vec!["1".into(), "2".into(), "3".into()]],
        );
        let picked = frame.select_columns(&[2, 0]);
        assert_eq!(picked.headers, vec!["C".to_string(), "A".to_string()]);
        assert_eq!(picked.rows[0], vec!["3".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_tab_delimited_parse() {
        let data = "A\tB\n1\t2\n";
        let frame = Frame::from_delimited(data.as_bytes(), b'\t').unwrap();
        assert_eq!(frame.col("B"), Some(1));
        assert_eq!(frame.get(0, 1), Some("2"));
    }
}
