use std::{collections::BTreeMap, sync::Arc};

use energy_client::domain::AnomalyKind;
use futures::StreamExt;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    validation::{format_percentage, ScreenedReading},
};

/// A row that would need attention after import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedRow {
    pub meter_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub value: Option<f64>,
    pub kind: Option<AnomalyKind>,
    pub delta_pct: Option<f64>,
    pub delta: Option<String>,
    pub message: Option<&'static str>,
}

/// What an import would do, without writing anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportPreview {
    pub rows_accepted: usize,
    pub rows_rejected: usize,
    pub errors: Vec<String>,
    pub flagged: Vec<FlaggedRow>,
    pub anomaly_counts: BTreeMap<AnomalyKind, usize>,
    pub out_of_threshold: usize,
}

impl ImportPreview {
    fn record(&mut self, screened: ScreenedReading) {
        self.rows_accepted += 1;

        let Some(screening) = screened.screening else {
            return;
        };

        let kind = screening.classification.kind;
        if let Some(k) = kind {
            *self.anomaly_counts.entry(k).or_default() += 1;
        } else if screening.check.is_out_of_threshold() {
            self.out_of_threshold += 1;
        }

        if screening.needs_attention {
            let delta_pct = screening.classification.delta_pct;
            self.flagged.push(FlaggedRow {
                meter_id: screened.reading.meter_id,
                ts: screened.reading.ts,
                value: screened.reading.value,
                kind,
                delta_pct,
                delta: delta_pct.map(format_percentage),
                message: screening.check.message,
            });
        }
    }

    fn reject(&mut self, error: &PipelineError, max_errors: usize) {
        self.rows_rejected += 1;
        if self.errors.len() < max_errors {
            self.errors.push(error.to_string());
        }
    }
}

/// Collects an [`ImportPreview`] instead of writing to the database.
pub struct ImportPreviewSink {
    preview: Arc<Mutex<ImportPreview>>,
    max_errors: usize,
}

impl ImportPreviewSink {
    /// Keep the messages of at most `max_errors` rejected rows; all are counted.
    pub fn new(max_errors: usize) -> Self {
        Self {
            preview: Arc::default(),
            max_errors,
        }
    }

    /// Shared handle to read the preview once the pipeline has finished.
    pub fn handle(&self) -> Arc<Mutex<ImportPreview>> {
        self.preview.clone()
    }
}

#[async_trait::async_trait]
impl Sink<ScreenedReading> for ImportPreviewSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<ScreenedReading>, PipelineError>> + Send + Unpin + 'static,
    {
        while let Some(item) = input.next().await {
            let mut preview = self.preview.lock().await;
            match item {
                Ok(env) => preview.record(env.payload),
                Err(e) => {
                    tracing::debug!(error = %e, "row rejected during preview");
                    preview.reject(&e, self.max_errors);
                }
            }
        }

        Ok(())
    }
}
