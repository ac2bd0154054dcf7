use std::{collections::HashSet, io::Write, sync::Arc};

use energy_client::domain::AnomalyKind;
use energy_service::{
    config::ScreeningConfig,
    pipeline::{Pipeline, PipelineError},
    sinks::ImportPreviewSink,
    sources::ReadingCsvFileSource,
    transform::{self, InMemoryHistory, MeterDirectory},
    validation::ScreenedReading,
};

fn csv_file(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

#[tokio::test]
async fn dry_run_import_screens_rows_against_earlier_rows() {
    let file = csv_file(
        "meter_id,ts,value\n\
         boiler-1,2024-03-01T00:00:00Z,100\n\
         boiler-1,2024-03-01T01:00:00Z,105\n\
         boiler-1,2024-03-01T02:00:00Z,110\n\
         boiler-1,2024-03-01T03:00:00Z,150\n\
         boiler-1,2024-03-01T04:00:00Z,\n\
         chiller-2,2024-03-01T00:00:00Z,40\n\
         chiller-2,2024-03-02T00:00:00Z,40\n\
         chiller-2,2024-03-03T00:00:00Z,40\n\
         chiller-2,2024-03-03T01:00:00Z,-5\n\
         chiller-2,not-a-timestamp,40\n",
    );

    let sink = ImportPreviewSink::new(10);
    let preview = sink.handle();

    let pipeline: Pipeline<_, ScreenedReading, _> = Pipeline {
        source: ReadingCsvFileSource::new(file.path()),
        transforms: transform::reading_transforms(Arc::new(InMemoryHistory::new()), None, &ScreeningConfig::default()),
        sink,
    };
    pipeline.run().await.unwrap();

    let preview = preview.lock().await.clone();

    assert_eq!(preview.rows_accepted, 8);
    assert_eq!(preview.rows_rejected, 2);
    assert!(preview.errors.iter().any(|e| e.contains("non-negative")));
    assert!(preview.errors.iter().any(|e| e.contains("row 10")));

    assert_eq!(preview.anomaly_counts.get(&AnomalyKind::Spike), Some(&1));
    assert_eq!(preview.anomaly_counts.get(&AnomalyKind::Missing), Some(&1));
    assert_eq!(preview.anomaly_counts.get(&AnomalyKind::Flat), Some(&1));

    let kinds: Vec<(String, Option<AnomalyKind>)> = preview
        .flagged
        .iter()
        .map(|r| (r.meter_id.clone(), r.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("boiler-1".to_string(), Some(AnomalyKind::Spike)),
            ("boiler-1".to_string(), Some(AnomalyKind::Missing)),
            ("chiller-2".to_string(), Some(AnomalyKind::Flat)),
        ]
    );
}

#[tokio::test]
async fn preview_serializes_for_operators() {
    let file = csv_file("meter_id,ts,value\nm-1,2024-03-01T00:00:00Z,\n");

    let sink = ImportPreviewSink::new(10);
    let preview = sink.handle();
    let pipeline: Pipeline<_, ScreenedReading, _> = Pipeline {
        source: ReadingCsvFileSource::new(file.path()),
        transforms: transform::reading_transforms(Arc::new(InMemoryHistory::new()), None, &ScreeningConfig::default()),
        sink,
    };
    pipeline.run().await.unwrap();

    let json = serde_json::to_value(&*preview.lock().await).unwrap();
    assert_eq!(json["rows_accepted"], 1);
    assert_eq!(json["anomaly_counts"]["MISSING"], 1);
    assert_eq!(json["flagged"][0]["kind"], "MISSING");
    assert_eq!(json["flagged"][0]["ts"], "2024-03-01T00:00:00Z");
}

struct Registered(HashSet<&'static str>);

#[async_trait::async_trait]
impl MeterDirectory for Registered {
    async fn contains(&self, meter_id: &str) -> Result<bool, PipelineError> {
        Ok(self.0.contains(meter_id))
    }
}

#[tokio::test]
async fn unknown_meter_rejects_only_its_row() {
    let file = csv_file(
        "meter_id,ts,value\n\
         known,2024-03-01T00:00:00Z,100\n\
         typo-meter,2024-03-01T01:00:00Z,100\n\
         known,2024-03-01T02:00:00Z,101\n",
    );

    let sink = ImportPreviewSink::new(10);
    let preview = sink.handle();
    let pipeline: Pipeline<_, ScreenedReading, _> = Pipeline {
        source: ReadingCsvFileSource::new(file.path()),
        transforms: transform::reading_transforms(
            Arc::new(InMemoryHistory::new()),
            Some(Arc::new(Registered(HashSet::from(["known"])))),
            &ScreeningConfig::default(),
        ),
        sink,
    };
    pipeline.run().await.unwrap();

    let preview = preview.lock().await.clone();
    assert_eq!(preview.rows_accepted, 2);
    assert_eq!(preview.rows_rejected, 1);
    assert!(preview.errors[0].contains("unknown meter 'typo-meter'"));
    assert!(preview.flagged.is_empty());
}
