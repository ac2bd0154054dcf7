use std::path::PathBuf;

use async_stream::try_stream;
use energy_client::domain::NewReading;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::{
    pipeline::{Envelope, ItemStream, PipelineError, Source},
    validation::ScreenedReading,
};

/// NDJSON backfill source: one reading object per line.
///
/// Blank lines are skipped. A line that fails to parse ends the stream, since
/// backfill files are machine-generated and a bad line means a bad export.
pub struct ReadingNdjsonFileSource {
    path: PathBuf,
}

#[derive(serde::Deserialize)]
struct BackfillReading {
    meter_id: String,
    #[serde(with = "time::serde::rfc3339")]
    ts: time::OffsetDateTime,
    value: Option<f64>,
    source_system: Option<String>,
}

impl From<BackfillReading> for NewReading {
    fn from(b: BackfillReading) -> Self {
        NewReading::new(b.meter_id, b.ts, b.value).with_source(b.source_system.unwrap_or_else(|| "backfill".to_string()))
    }
}

impl ReadingNdjsonFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<ScreenedReading> for ReadingNdjsonFileSource {
    async fn stream(&self) -> ItemStream<ScreenedReading> {
        let path = self.path.clone();
        let s = try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to open backfill file: {e}"))
            })?;
            let mut lines = BufReader::new(file).lines();
            let mut line_no = 0usize;

            while let Some(line) = lines.next_line().await.map_err(|e| {
                PipelineError::Source(format!("failed to read backfill line: {e}"))
            })? {
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }

                let parsed: BackfillReading = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        metrics::counter!("backfill_reading_parse_errors_total").increment(1);
                        Err(PipelineError::Source(format!(
                            "failed to parse backfill json line {line_no}: {e}"
                        )))?
                    }
                };
                let reading: NewReading = parsed.into();
                yield Envelope::new(ScreenedReading::unscreened(reading));
            }
        };

        Box::pin(s)
    }
}
