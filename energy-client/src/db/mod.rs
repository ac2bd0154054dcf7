pub mod anomaly_queries;
pub mod emission_factor_queries;
pub mod meter_queries;
pub mod reading_queries;
