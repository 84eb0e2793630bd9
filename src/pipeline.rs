//! End-to-end feature pipeline: prepare, encode, aggregate, assemble.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::aggregate::{self, AggregateTable};
use crate::calendar;
use crate::encoding;
use crate::loader::{self, DatasetConfig, LoadError, RawTables};
use crate::prepare::{self, OwnedCardTxn, PrepareError};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Demographic columns carried directly into the feature matrix, ahead
/// of the encoding and aggregate blocks.
const BASE_COLUMNS: [&str; 4] = ["age", "ocp_cd", "cc_cnt", "has_kp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

/// One numeric row per id, column-aligned with the shared schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub ids: Vec<i64>,
    pub rows: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLabels {
    pub ids: Vec<i64>,
    pub income: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub demographic_rows: u64,
    pub profile_rows: u64,
    pub label_rows: u64,
    pub card_txns_input: u64,
    pub card_txns_resolved: u64,
    pub card_txns_unmapped: u64,
    pub deposit_rows: u64,
    pub train_rows: u64,
    pub test_rows: u64,
    pub feature_columns: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureBuildConfig {
    pub holidays: Vec<NaiveDate>,
    pub schema_version: u32,
}

impl Default for FeatureBuildConfig {
    fn default() -> Self {
        Self {
            holidays: calendar::default_holidays(),
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

/// The three output tables plus schema and run report. Train and test
/// share one schema, so column parity holds by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDataset {
    pub schema: FeatureSchema,
    pub train: FeatureMatrix,
    pub train_labels: TrainingLabels,
    pub test: FeatureMatrix,
    pub report: PipelineReport,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid feature build config: {0}")]
    InvalidConfig(String),
    #[error("input load failed: {0}")]
    Load(#[from] LoadError),
    #[error("join stage failed: {0}")]
    Prepare(#[from] PrepareError),
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

/// Loads the five CSVs from the data directory and builds the dataset.
pub fn build_feature_dataset_from_dir(
    dataset: &DatasetConfig,
    cfg: &FeatureBuildConfig,
) -> Result<FeatureDataset, PipelineError> {
    let raw = loader::load_raw_tables(dataset)?;
    build_feature_dataset(&raw, cfg)
}

pub fn build_feature_dataset(
    raw: &RawTables,
    cfg: &FeatureBuildConfig,
) -> Result<FeatureDataset, PipelineError> {
    validate_config(cfg)?;

    info!(
        component = "pipeline",
        event = "features.pipeline.start",
        demographic_rows = raw.demographics.len(),
        card_txns = raw.card_txns.len(),
        deposit_rows = raw.deposits.len(),
        label_rows = raw.labels.len()
    );

    let prepared = prepare::prepare_tables(raw)?;
    let encodings = encoding::encode_profiles(&prepared.profiles);

    let holidays = &cfg.holidays;
    let aggregates = [
        aggregate::deposit_totals(&raw.deposits),
        aggregate::deposit_monthly_totals(&raw.deposits),
        aggregate::card_totals(&prepared.card_txns),
        aggregate::card_pivot(&prepared.card_txns, |txn: &OwnedCardTxn| {
            calendar::month_tag(txn.pos_dt)
        }),
        aggregate::card_pivot(&prepared.card_txns, |txn: &OwnedCardTxn| {
            calendar::holiday_tag(txn.pos_dt, holidays)
        }),
        aggregate::card_pivot(&prepared.card_txns, |txn: &OwnedCardTxn| {
            calendar::weekend_tag(txn.pos_dt)
        }),
        aggregate::card_pivot(&prepared.card_txns, |txn: &OwnedCardTxn| {
            calendar::quarter_tag(txn.pos_dt)
        }),
    ];

    let schema = build_schema(cfg, &encodings.columns, &aggregates);
    info!(
        component = "pipeline",
        event = "features.schema.built",
        version = schema.version,
        column_count = schema.columns.len(),
        fingerprint = %schema.fingerprint
    );

    let mut train = FeatureMatrix {
        ids: Vec::new(),
        rows: Vec::new(),
    };
    let mut train_labels = TrainingLabels {
        ids: Vec::new(),
        income: Vec::new(),
    };
    let mut test = FeatureMatrix {
        ids: Vec::new(),
        rows: Vec::new(),
    };

    for (profile, encoded) in prepared.profiles.iter().zip(&encodings.rows) {
        let mut row = Vec::with_capacity(schema.columns.len());
        row.push(profile.age as f64);
        row.push(profile.ocp_cd as f64);
        row.push(profile.card_count);
        row.push(profile.has_deposits);
        row.extend_from_slice(encoded);
        for table in &aggregates {
            row.extend(table.values_or_zero(profile.id));
        }
        debug_assert_eq!(row.len(), schema.columns.len());

        if profile.income > 0.0 {
            train.ids.push(profile.id);
            train.rows.push(row);
            train_labels.ids.push(profile.id);
            train_labels.income.push(profile.income);
        } else {
            test.ids.push(profile.id);
            test.rows.push(row);
        }
    }

    let report = PipelineReport {
        demographic_rows: raw.demographics.len() as u64,
        profile_rows: prepared.profiles.len() as u64,
        label_rows: raw.labels.len() as u64,
        card_txns_input: raw.card_txns.len() as u64,
        card_txns_resolved: prepared.card_txns.len() as u64,
        card_txns_unmapped: prepared.unmapped_card_txns,
        deposit_rows: raw.deposits.len() as u64,
        train_rows: train.rows.len() as u64,
        test_rows: test.rows.len() as u64,
        feature_columns: schema.columns.len() as u64,
    };

    info!(
        component = "pipeline",
        event = "features.pipeline.finish",
        train_rows = report.train_rows,
        test_rows = report.test_rows,
        feature_columns = report.feature_columns,
        card_txns_unmapped = report.card_txns_unmapped
    );

    Ok(FeatureDataset {
        schema,
        train,
        train_labels,
        test,
        report,
    })
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), PipelineError> {
    if expected_version != actual.version {
        return Err(PipelineError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }
    if expected_fingerprint != actual.fingerprint {
        return Err(PipelineError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }
    Ok(())
}

fn validate_config(cfg: &FeatureBuildConfig) -> Result<(), PipelineError> {
    if cfg.schema_version != FEATURE_SCHEMA_VERSION {
        return Err(PipelineError::InvalidConfig(format!(
            "schema_version must equal FEATURE_SCHEMA_VERSION ({FEATURE_SCHEMA_VERSION})"
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for holiday in &cfg.holidays {
        if !seen.insert(*holiday) {
            return Err(PipelineError::InvalidConfig(format!(
                "holiday {holiday} listed twice"
            )));
        }
    }

    Ok(())
}

fn build_schema(
    cfg: &FeatureBuildConfig,
    encoding_columns: &[String],
    aggregates: &[AggregateTable],
) -> FeatureSchema {
    let mut columns: Vec<FeatureColumn> = Vec::new();
    for name in BASE_COLUMNS {
        columns.push(FeatureColumn {
            name: name.to_string(),
            dtype: FeatureDType::F64,
        });
    }
    for name in encoding_columns {
        columns.push(FeatureColumn {
            name: name.clone(),
            dtype: FeatureDType::F64,
        });
    }
    for table in aggregates {
        for name in &table.columns {
            columns.push(FeatureColumn {
                name: name.clone(),
                dtype: FeatureDType::F64,
            });
        }
    }

    let fingerprint = schema_fingerprint(cfg, &columns);
    FeatureSchema {
        version: cfg.schema_version,
        fingerprint,
        columns,
    }
}

fn schema_fingerprint(cfg: &FeatureBuildConfig, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{};", cfg.schema_version));
    hasher.update("holidays:");
    for holiday in &cfg.holidays {
        hasher.update(format!("{holiday},"));
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}
