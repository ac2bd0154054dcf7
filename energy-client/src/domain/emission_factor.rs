use serde::Serialize;
use time::OffsetDateTime;

/// kg CO2e emitted per unit of an energy type, valid over `[valid_from, valid_to)`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmissionFactor {
    pub id: i64,
    pub energy_type: String,
    pub kg_co2e_per_unit: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_to: Option<OffsetDateTime>,
}

impl EmissionFactor {
    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |end| at < end)
    }

    pub fn emissions_kg(&self, quantity: f64) -> f64 {
        quantity * self.kg_co2e_per_unit
    }
}

#[derive(Debug, Clone)]
pub struct NewEmissionFactor {
    pub energy_type: String,
    pub kg_co2e_per_unit: f64,
    pub valid_from: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn factor() -> EmissionFactor {
        EmissionFactor {
            id: 1,
            energy_type: "electricity".to_string(),
            kg_co2e_per_unit: 0.233,
            valid_from: datetime!(2024-01-01 00:00:00 UTC),
            valid_to: Some(datetime!(2025-01-01 00:00:00 UTC)),
        }
    }

    #[test]
    fn validity_window_is_half_open() {
        let f = factor();
        assert!(f.is_valid_at(datetime!(2024-01-01 00:00:00 UTC)));
        assert!(f.is_valid_at(datetime!(2024-12-31 23:59:59 UTC)));
        assert!(!f.is_valid_at(datetime!(2025-01-01 00:00:00 UTC)));
        assert!(!f.is_valid_at(datetime!(2023-12-31 23:59:59 UTC)));
    }

    #[test]
    fn open_ended_factor_stays_valid() {
        let f = EmissionFactor { valid_to: None, ..factor() };
        assert!(f.is_valid_at(datetime!(2090-06-01 00:00:00 UTC)));
    }

    #[test]
    fn emissions_scale_with_quantity() {
        let f = factor();
        assert!((f.emissions_kg(1000.0) - 233.0).abs() < 1e-9);
        assert_eq!(f.emissions_kg(0.0), 0.0);
    }
}
