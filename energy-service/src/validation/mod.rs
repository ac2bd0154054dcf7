pub mod csv_row;
pub mod history;
pub mod screening;
pub mod thresholds;

pub use csv_row::{parse_reading_row, row_map, validate_csv_row, CsvRow, RowError};
pub use history::{HistoricalSeries, HistoryPoint};
pub use screening::{classify, AnomalyClassification, ScreenedReading, Screening};
pub use thresholds::{
    anomaly_type, check_thresholds, format_percentage, has_issue, is_flat, is_missing, is_out_of_threshold,
    is_spike, percentage_difference, ThresholdCheck,
};
