//! # Table Output
//!
//! Writes extracted tables to disk. The format follows the file extension:
//! `.csv`, `.tsv`, `.txt` and `.dat` produce tab-separated text with a header
//! row (the layout plotting scripts expect), anything else produces Parquet.

use crate::error::CfResult;
use log::debug;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Parquet,
    Csv,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") | Some("tsv") | Some("txt") | Some("dat") => TableFormat::Csv,
            _ => TableFormat::Parquet,
        }
    }
}

/// Writes `df` to `output_path` in the format implied by its extension.
pub fn write_dataframe<P: AsRef<Path>>(df: &mut DataFrame, output_path: P) -> CfResult<()> {
    let output_path = output_path.as_ref();
    let format = TableFormat::from_path(output_path);
    debug!("Writing {:?} table to {}", format, output_path.display());
    debug!("DataFrame shape: {:?}", df.shape());
    debug!("DataFrame schema:\n{:?}", df.schema());
    debug!("First few rows:\n{}", df.head(Some(5)));

    let file = File::create(output_path)?;
    match format {
        TableFormat::Parquet => {
            ParquetWriter::new(file).finish(df)?;
        }
        TableFormat::Csv => {
            CsvWriter::new(file)
                .include_header(true)
                .with_separator(b'\t')
                .finish(df)?;
        }
    }
    debug!("Successfully wrote {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table() -> DataFrame {
        DataFrame::new(vec![
            Series::new("time".into(), vec![-2.0, -1.0, 0.0]).into(),
            Series::new("ice_volume".into(), vec![3.1, 2.9, 2.7]).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TableFormat::from_path(Path::new("a.csv")), TableFormat::Csv);
        assert_eq!(TableFormat::from_path(Path::new("a.dat")), TableFormat::Csv);
        assert_eq!(TableFormat::from_path(Path::new("a.parquet")), TableFormat::Parquet);
        assert_eq!(TableFormat::from_path(Path::new("a")), TableFormat::Parquet);
    }

    #[test]
    fn test_write_parquet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.parquet");
        let mut df = table();
        write_dataframe(&mut df, &path).unwrap();

        let file = File::open(&path).unwrap();
        let back = ParquetReader::new(file).finish().unwrap();
        assert_eq!(back.shape(), (3, 2));
        assert!(back.column("time").is_ok());
        assert!(back.column("ice_volume").is_ok());
    }

    #[test]
    fn test_write_tab_separated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.dat");
        let mut df = table();
        write_dataframe(&mut df, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("time\tice_volume"));
        assert_eq!(lines.count(), 3);
    }

    #[test]
    fn test_unwritable_path() {
        let mut df = table();
        assert!(write_dataframe(&mut df, "/nonexistent/dir/out.parquet").is_err());
    }
}
