use std::{fs::File, path::PathBuf};

use crate::{
    pipeline::{Envelope, ItemStream, PipelineError, Source},
    validation::{csv_row::READING_COLUMNS, parse_reading_row, row_map, ScreenedReading},
};

/// Bulk import source for readings from a delimited text file.
///
/// Expected header columns (by name):
/// - meter_id
/// - ts (RFC3339 timestamp)
/// - value (empty for a missing reading)
/// - source_system (optional)
///
/// A bad row is yielded as an error and the file keeps streaming.
pub struct ReadingCsvFileSource {
    path: PathBuf,
    delimiter: u8,
    required_fields: Vec<String>,
    default_source: String,
}

impl ReadingCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        // .dat exports are pipe-delimited
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("dat") => b'|',
            _ => b',',
        };

        Self {
            path,
            delimiter,
            required_fields: vec!["meter_id".to_string(), "ts".to_string()],
            default_source: "csv".to_string(),
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn required_fields(mut self, fields: Vec<String>) -> Self {
        self.required_fields = fields;
        self
    }

    pub fn default_source(mut self, source: impl Into<String>) -> Self {
        self.default_source = source.into();
        self
    }
}

fn row_error(row: usize, msg: impl std::fmt::Display) -> PipelineError {
    metrics::counter!("reading_csv_parse_errors_total").increment(1);
    PipelineError::Source(format!("row {row}: {msg}"))
}

#[async_trait::async_trait]
impl Source<ScreenedReading> for ReadingCsvFileSource {
    async fn stream(&self) -> ItemStream<ScreenedReading> {
        // Blocking CSV reader inside one async task; files are operator-sized.
        let path = self.path.clone();
        let delimiter = self.delimiter;
        let required = self.required_fields.clone();
        let default_source = self.default_source.clone();

        let s = async_stream::stream! {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to open {}: {e}", path.display())));
                    return;
                }
            };
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .flexible(true)
                .from_reader(file);
            let headers = match rdr.headers() {
                Ok(h) => h.clone(),
                Err(e) => {
                    yield Err(PipelineError::Source(format!("failed to read headers: {e}")));
                    return;
                }
            };

            let missing: Vec<&str> = READING_COLUMNS
                .iter()
                .copied()
                .filter(|c| !headers.iter().any(|h| h.trim() == *c))
                .collect();
            if !missing.is_empty() {
                yield Err(PipelineError::Source(format!("header is missing column(s): {}", missing.join(", "))));
                return;
            }

            for (idx, result) in rdr.records().enumerate() {
                let row = idx + 1;
                let record = match result {
                    Ok(r) => r,
                    Err(e) => {
                        yield Err(row_error(row, e));
                        continue;
                    }
                };

                let fields = row_map(&headers, &record);
                match parse_reading_row(&fields, required.as_slice(), &default_source) {
                    Ok(reading) => yield Ok(Envelope::new(ScreenedReading::unscreened(reading))),
                    Err(e) => yield Err(row_error(row, e)),
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    async fn collect(source: ReadingCsvFileSource) -> Vec<Result<ScreenedReading, String>> {
        source
            .stream()
            .await
            .map(|item| item.map(|e| e.payload).map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn reads_rows_and_keeps_going_after_errors() {
        let f = write_file(
            ".csv",
            "meter_id,ts,value\n\
             m-1,2024-01-01T00:00:00Z,10.5\n\
             m-1,not-a-date,11\n\
             ,2024-01-01T02:00:00Z,12\n\
             m-1,2024-01-01T03:00:00Z,\n",
        );

        let items = collect(ReadingCsvFileSource::new(f.path())).await;
        assert_eq!(items.len(), 4);

        let first = items[0].as_ref().unwrap();
        assert_eq!(first.reading.value, Some(10.5));
        assert_eq!(first.reading.source_system.as_deref(), Some("csv"));

        assert!(items[1].as_ref().unwrap_err().starts_with("source error: row 2: invalid ts"));
        assert!(items[2].as_ref().unwrap_err().contains("row 3: missing or empty required field(s): meter_id"));
        assert_eq!(items[3].as_ref().unwrap().reading.value, None);
    }

    #[tokio::test]
    async fn dat_files_are_pipe_delimited() {
        let f = write_file(
            ".dat",
            "ts|meter_id|value|source_system\n2024-01-01T00:00:00Z|m-7|3|pi\n",
        );

        let items = collect(ReadingCsvFileSource::new(f.path())).await;
        let r = &items[0].as_ref().unwrap().reading;
        assert_eq!(r.meter_id, "m-7");
        assert_eq!(r.source_system.as_deref(), Some("pi"));
    }

    #[tokio::test]
    async fn header_without_value_column_is_rejected() {
        let f = write_file(".csv", "meter_id,ts\nm-1,2024-01-01T00:00:00Z\n");
        let items = collect(ReadingCsvFileSource::new(f.path())).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().contains("header is missing column(s): value"));
    }

    #[tokio::test]
    async fn missing_file_yields_one_error() {
        let items = collect(ReadingCsvFileSource::new("/definitely/not/here.csv")).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn configured_required_fields_apply() {
        let f = write_file(".csv", "meter_id,ts,value\nm-1,2024-01-01T00:00:00Z,\n");
        let source = ReadingCsvFileSource::new(f.path())
            .required_fields(vec!["meter_id".into(), "ts".into(), "value".into()])
            .default_source("upload");
        let items = collect(source).await;
        assert!(items[0].as_ref().unwrap_err().contains("value"));
    }
}
