//! IFP core crate: income-prediction feature pipeline.
//!
//! Current implemented scope:
//! - raw CSV ingestion of the card, demographic, deposit, and label tables
//! - card-to-entity resolution and labeled demographic profiles
//! - calendar bucket tags (month, holiday, weekend, quarter)
//! - target-mean and frequency encoding of the categorical features
//! - multi-granularity transaction aggregates and the assembled
//!   train/test feature matrices with a fingerprinted shared schema

mod aggregate;
mod calendar;
mod encoding;
mod loader;
mod observability;
mod pipeline;
mod prepare;

pub use aggregate::{
    card_pivot, card_totals, deposit_monthly_totals, deposit_totals, pivot_column_name,
    AggregateTable, Stat, CARD_PIVOT_STATS,
};
pub use calendar::{
    default_holidays, holiday_tag, month_tag, quarter_tag, tag_date, weekend_tag, CalendarTags,
    DEFAULT_BANK_HOLIDAYS,
};
pub use encoding::{
    encode_profiles, frequency_by_value, target_mean_by_value, EncodingBlock, ENCODED_FEATURES,
};
pub use loader::{
    load_raw_tables, CardTxnRecord, DatasetConfig, DemographicRecord, DepositRecord, LabelRecord,
    LoadError, RawTables,
};
pub use observability::{
    init_logging, log_app_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use pipeline::{
    assert_schema_compatible, build_feature_dataset, build_feature_dataset_from_dir,
    FeatureBuildConfig, FeatureColumn, FeatureDType, FeatureDataset, FeatureMatrix, FeatureSchema,
    PipelineError, PipelineReport, TrainingLabels, FEATURE_SCHEMA_VERSION,
};
pub use prepare::{prepare_tables, DemoProfile, OwnedCardTxn, PrepareError, PreparedTables};
