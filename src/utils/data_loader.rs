//! Data loading utilities

use crate::error::{Result, TabforgeError};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// CSV loader
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Field separator
    delimiter: u8,
    /// Rows scanned to infer column types
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            infer_schema_length: 1000,
        }
    }

    /// Set the field separator
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set how many rows are scanned for type inference
    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows;
        self
    }

    /// Load a CSV file with a header row. Empty fields become nulls.
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();
        let file = File::open(path)?;

        let parse_opts = CsvParseOptions::default().with_separator(self.delimiter);

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| TabforgeError::DataError(format!("{}: {}", path.display(), e)))?;

        debug!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            secs = start.elapsed().as_secs_f64(),
            "Loaded CSV"
        );
        Ok(df)
    }

    /// Summarize a CSV file
    pub fn get_file_info(&self, path: impl AsRef<Path>) -> Result<FileInfo> {
        let path = path.as_ref();
        let file_size = std::fs::metadata(path)?.len();
        let df = self.load_csv(path)?;

        let columns = df
            .get_columns()
            .iter()
            .map(|c| ColumnInfo {
                name: c.name().to_string(),
                dtype: c.dtype().to_string(),
                null_count: c.null_count(),
            })
            .collect();

        Ok(FileInfo {
            path: path.display().to_string(),
            file_size,
            n_rows: df.height(),
            n_cols: df.width(),
            columns,
        })
    }
}

/// File information
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: String,
    pub file_size: u64,
    pub n_rows: usize,
    pub n_cols: usize,
    pub columns: Vec<ColumnInfo>,
}

/// Per-column summary
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
}

/// Data saver
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV with a header row
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(|e| TabforgeError::DataError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_csv_round_trip_with_nulls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "age,city\n25,A\n,B\n35,A\n").unwrap();

        let df = DataLoader::new().load_csv(&path).unwrap();
        assert_eq!(df.shape(), (3, 2));
        assert_eq!(df.column("age").unwrap().null_count(), 1);
        assert_eq!(df.column("city").unwrap().dtype(), &DataType::String);

        let out = dir.path().join("out.csv");
        let mut df = df;
        DataSaver::save_csv(&mut df, &out).unwrap();
        let reloaded = DataLoader::new().load_csv(&out).unwrap();
        assert_eq!(reloaded.shape(), (3, 2));
    }

    #[test]
    fn test_semicolon_delimiter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a;b\n1;2\n3;4\n").unwrap();

        let df = DataLoader::new().with_delimiter(b';').load_csv(&path).unwrap();
        assert_eq!(df.width(), 2);
    }

    #[test]
    fn test_file_info() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "x,y\n1,\n2,3\n").unwrap();

        let info = DataLoader::new().get_file_info(&path).unwrap();
        assert_eq!(info.n_rows, 2);
        assert_eq!(info.n_cols, 2);
        assert_eq!(info.columns[1].null_count, 1);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            DataLoader::new().load_csv("does/not/exist.csv"),
            Err(TabforgeError::IoError(_))
        ));
    }
}
