//! CSV ingestion of the raw input tables.
//!
//! Five files are expected under the data directory:
//! - `cc.csv`            — credit-card transactions
//! - `demographics.csv`  — one row per (id, card) pair
//! - `kplus.csv`         — weekly recurring-deposit transactions
//! - `train.csv`         — labeled training ids
//! - `test.csv`          — test ids (income column optional, read as 0)

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardTxnRecord {
    pub cc_no: i64,
    pub pos_dt: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemographicRecord {
    pub id: i64,
    pub cc_no: i64,
    pub gender: String,
    pub age: i64,
    pub ocp_cd: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub id: i64,
    pub sunday: NaiveDate,
    pub txn_count: f64,
    pub txn_amt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub id: i64,
    pub income: f64,
}

/// All raw inputs materialized once at pipeline start. Labels hold the
/// train rows followed by the zero-income test rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTables {
    pub card_txns: Vec<CardTxnRecord>,
    pub demographics: Vec<DemographicRecord>,
    pub deposits: Vec<DepositRecord>,
    pub labels: Vec<LabelRecord>,
    pub train_label_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    pub data_dir: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("required column '{column}' missing in {path}")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("failed to parse field {field} value '{value}' in {path}")]
    ParseField {
        path: PathBuf,
        field: &'static str,
        value: String,
    },
}

/// Reads and types all five input files. Any missing column or
/// unparseable field aborts before the pipeline runs a transformation.
pub fn load_raw_tables(cfg: &DatasetConfig) -> Result<RawTables, LoadError> {
    let card_txns = load_card_txns(&cfg.data_dir.join("cc.csv"))?;
    let demographics = load_demographics(&cfg.data_dir.join("demographics.csv"))?;
    let deposits = load_deposits(&cfg.data_dir.join("kplus.csv"))?;
    let train = load_labels(&cfg.data_dir.join("train.csv"), true)?;
    let test = load_labels(&cfg.data_dir.join("test.csv"), false)?;

    info!(
        component = "loader",
        event = "features.load.finish",
        data_dir = %cfg.data_dir.display(),
        card_txns = card_txns.len(),
        demographic_rows = demographics.len(),
        deposit_rows = deposits.len(),
        train_labels = train.len(),
        test_labels = test.len()
    );

    let train_label_count = train.len();
    let mut labels = train;
    labels.extend(test);

    Ok(RawTables {
        card_txns,
        demographics,
        deposits,
        labels,
        train_label_count,
    })
}

fn load_card_txns(path: &Path) -> Result<Vec<CardTxnRecord>, LoadError> {
    let (header, records) = read_records(path)?;
    let cc_no = column_position(path, &header, "cc_no")?;
    let pos_dt = column_position(path, &header, "pos_dt")?;
    let amount = column_position(path, &header, "cc_txn_amt")?;

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        rows.push(CardTxnRecord {
            cc_no: parse_i64(path, record, cc_no, "cc_no")?,
            pos_dt: parse_date(path, record, pos_dt, "pos_dt")?,
            amount: parse_f64(path, record, amount, "cc_txn_amt")?,
        });
    }
    Ok(rows)
}

fn load_demographics(path: &Path) -> Result<Vec<DemographicRecord>, LoadError> {
    let (header, records) = read_records(path)?;
    let id = column_position(path, &header, "id")?;
    let cc_no = column_position(path, &header, "cc_no")?;
    let gender = column_position(path, &header, "gender")?;
    let age = column_position(path, &header, "age")?;
    let ocp_cd = column_position(path, &header, "ocp_cd")?;

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        rows.push(DemographicRecord {
            id: parse_i64(path, record, id, "id")?,
            cc_no: parse_i64(path, record, cc_no, "cc_no")?,
            gender: record.get(gender).unwrap_or_default().to_string(),
            age: parse_i64(path, record, age, "age")?,
            ocp_cd: parse_opt_i64(path, record, ocp_cd, "ocp_cd")?,
        });
    }
    Ok(rows)
}

fn load_deposits(path: &Path) -> Result<Vec<DepositRecord>, LoadError> {
    let (header, records) = read_records(path)?;
    let id = column_position(path, &header, "id")?;
    let sunday = column_position(path, &header, "sunday")?;
    let txn_count = column_position(path, &header, "kp_txn_count")?;
    let txn_amt = column_position(path, &header, "kp_txn_amt")?;

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        rows.push(DepositRecord {
            id: parse_i64(path, record, id, "id")?,
            sunday: parse_date(path, record, sunday, "sunday")?,
            txn_count: parse_f64(path, record, txn_count, "kp_txn_count")?,
            txn_amt: parse_f64(path, record, txn_amt, "kp_txn_amt")?,
        });
    }
    Ok(rows)
}

fn load_labels(path: &Path, income_required: bool) -> Result<Vec<LabelRecord>, LoadError> {
    let (header, records) = read_records(path)?;
    let id = column_position(path, &header, "id")?;
    let income = if income_required {
        Some(column_position(path, &header, "income")?)
    } else {
        header.iter().position(|name| name == "income")
    };

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        let income = match income {
            Some(idx) => parse_f64(path, record, idx, "income")?,
            // Test ids carry no income; zero-fill so the train/test
            // split predicate behaves identically either way.
            None => 0.0,
        };
        rows.push(LabelRecord {
            id: parse_i64(path, record, id, "id")?,
            income,
        });
    }
    Ok(rows)
}

fn read_records(path: &Path) -> Result<(StringRecord, Vec<StringRecord>), LoadError> {
    let contents = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(contents.as_slice());
    let header = reader
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(record);
    }
    Ok((header, records))
}

fn column_position(
    path: &Path,
    header: &StringRecord,
    column: &'static str,
) -> Result<usize, LoadError> {
    header
        .iter()
        .position(|name| name == column)
        .ok_or(LoadError::MissingColumn {
            path: path.to_path_buf(),
            column,
        })
}

fn parse_i64(
    path: &Path,
    record: &StringRecord,
    idx: usize,
    field: &'static str,
) -> Result<i64, LoadError> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<i64>().map_err(|_| LoadError::ParseField {
        path: path.to_path_buf(),
        field,
        value: raw.to_string(),
    })
}

fn parse_opt_i64(
    path: &Path,
    record: &StringRecord,
    idx: usize,
    field: &'static str,
) -> Result<Option<i64>, LoadError> {
    let raw = record.get(idx).unwrap_or_default();
    if raw.trim().is_empty() {
        return Ok(None);
    }
    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| LoadError::ParseField {
            path: path.to_path_buf(),
            field,
            value: raw.to_string(),
        })
}

fn parse_f64(
    path: &Path,
    record: &StringRecord,
    idx: usize,
    field: &'static str,
) -> Result<f64, LoadError> {
    let raw = record.get(idx).unwrap_or_default();
    // "NaN" and "inf" parse as f64 but would poison every downstream
    // statistic; treat them as wrong-typed fields.
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| LoadError::ParseField {
            path: path.to_path_buf(),
            field,
            value: raw.to_string(),
        })
}

fn parse_date(
    path: &Path,
    record: &StringRecord,
    idx: usize,
    field: &'static str,
) -> Result<NaiveDate, LoadError> {
    let raw = record.get(idx).unwrap_or_default();
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| LoadError::ParseField {
        path: path.to_path_buf(),
        field,
        value: raw.to_string(),
    })
}
