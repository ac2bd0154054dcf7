use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Meter {
    pub meter_id: String,
    pub name: String,
    pub pi_tag: Option<String>,
    pub unit: Option<String>,
}
