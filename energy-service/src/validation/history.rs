use energy_client::domain::Reading;
use time::OffsetDateTime;

use super::thresholds;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub ts: OffsetDateTime,
    pub value: f64,
}

/// Prior values of one meter, ascending by timestamp, at most one per timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalSeries {
    points: Vec<HistoryPoint>,
}

impl HistoricalSeries {
    pub fn new(mut points: Vec<HistoryPoint>) -> Self {
        points.sort_by_key(|p| p.ts);
        points.dedup_by(|later, earlier| later.ts == earlier.ts);
        Self { points }
    }

    /// Stored readings without a value are skipped.
    pub fn from_readings(readings: &[Reading]) -> Self {
        Self::new(
            readings
                .iter()
                .filter_map(|r| r.value.map(|value| HistoryPoint { ts: r.ts, value }))
                .collect(),
        )
    }

    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn timestamps(&self) -> Vec<OffsetDateTime> {
        self.points.iter().map(|p| p.ts).collect()
    }

    pub fn mean(&self) -> Option<f64> {
        thresholds::mean(&self.values())
    }

    /// Union of both series. On a timestamp clash the point from `self` wins.
    pub fn merge(mut self, other: HistoricalSeries) -> Self {
        self.points.extend(other.points);
        Self::new(self.points)
    }

    /// Add one point in timestamp order. An existing point at the same
    /// timestamp is kept. Returns whether the point was added.
    pub fn insert(&mut self, point: HistoryPoint) -> bool {
        match self.points.binary_search_by_key(&point.ts, |p| p.ts) {
            Ok(_) => false,
            Err(idx) => {
                self.points.insert(idx, point);
                true
            }
        }
    }

    /// Drop the oldest points until at most `n` remain.
    pub fn truncate_front(&mut self, n: usize) {
        let excess = self.points.len().saturating_sub(n);
        self.points.drain(..excess);
    }

    /// The newest `n` points strictly before `ts`.
    pub fn window(&self, ts: OffsetDateTime, n: usize) -> Self {
        let end = self.points.partition_point(|p| p.ts < ts);
        let start = end.saturating_sub(n);
        Self {
            points: self.points[start..end].to_vec(),
        }
    }

    /// The newest `n` points.
    pub fn last(&self, n: usize) -> Self {
        let skip = self.points.len().saturating_sub(n);
        Self {
            points: self.points[skip..].to_vec(),
        }
    }
}
