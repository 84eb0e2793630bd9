use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use ifp::{
    build_feature_dataset, log_app_start, CardTxnRecord, DemographicRecord, FeatureBuildConfig,
    LabelRecord, LoggingConfig, RawTables,
};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn tiny_raw_tables() -> RawTables {
    RawTables {
        card_txns: vec![
            CardTxnRecord {
                cc_no: 101,
                pos_dt: date(2018, 1, 3),
                amount: 20.0,
            },
            CardTxnRecord {
                cc_no: 999,
                pos_dt: date(2018, 1, 4),
                amount: 5.0,
            },
        ],
        demographics: vec![DemographicRecord {
            id: 1,
            cc_no: 101,
            gender: "M".to_string(),
            age: 30,
            ocp_cd: Some(9),
        }],
        deposits: Vec::new(),
        labels: vec![LabelRecord {
            id: 1,
            income: 55_000.0,
        }],
        train_label_count: 1,
    }
}

#[test]
fn pipeline_emits_lifecycle_events() {
    let logs = capture_logs(Level::INFO, || {
        build_feature_dataset(&tiny_raw_tables(), &FeatureBuildConfig::default())
            .expect("pipeline should succeed");
    });

    assert!(logs.contains("\"event\":\"features.pipeline.start\""));
    assert!(logs.contains("\"event\":\"features.prepare.finish\""));
    assert!(logs.contains("\"event\":\"features.schema.built\""));
    assert!(logs.contains("\"event\":\"features.pipeline.finish\""));
}

#[test]
fn unmapped_card_transactions_emit_a_warning() {
    let logs = capture_logs(Level::WARN, || {
        build_feature_dataset(&tiny_raw_tables(), &FeatureBuildConfig::default())
            .expect("pipeline should succeed");
    });

    assert!(logs.contains("\"event\":\"features.prepare.unmapped_dropped\""));
    assert!(logs.contains("\"dropped\":1"));
}

#[test]
fn app_start_helper_emits_baseline_event() {
    let logs = capture_logs(Level::INFO, || {
        log_app_start(&LoggingConfig::default());
    });

    assert!(logs.contains("\"event\":\"app.start\""));
}
