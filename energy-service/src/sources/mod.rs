pub mod http_readings;
pub mod reading_csv_file;
pub mod reading_ndjson_file;

pub use http_readings::HttpReadingSource;
pub use reading_csv_file::ReadingCsvFileSource;
pub use reading_ndjson_file::ReadingNdjsonFileSource;
