pub mod anomaly;
pub mod emission_factor;
pub mod meter;
pub mod reading;

pub use anomaly::{Anomaly, AnomalyKind, AnomalyStatus, NewAnomaly, ParseKindError};
pub use emission_factor::{EmissionFactor, NewEmissionFactor};
pub use meter::Meter;
pub use reading::{NewReading, Reading, ReadingKey};
