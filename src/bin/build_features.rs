use std::fs;
use std::path::{Path, PathBuf};

use ifp::{
    build_feature_dataset_from_dir, init_logging, log_app_start, logging_config_from_env,
    DatasetConfig, FeatureBuildConfig, FeatureMatrix, FeatureSchema, TrainingLabels,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;
    log_app_start(&logging);

    let data_dir = std::env::var("IFP_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));
    let out_dir = std::env::var("IFP_OUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("out"));

    let dataset = DatasetConfig {
        data_dir: data_dir.clone(),
    };
    let cfg = FeatureBuildConfig::default();

    println!(
        "Feature build start | data_dir={} out_dir={}",
        data_dir.display(),
        out_dir.display()
    );

    let built = build_feature_dataset_from_dir(&dataset, &cfg)?;

    fs::create_dir_all(&out_dir)?;
    write_features(
        &out_dir.join("train_features.csv"),
        &built.schema,
        &built.train,
    )?;
    write_features(
        &out_dir.join("test_features.csv"),
        &built.schema,
        &built.test,
    )?;
    write_labels(&out_dir.join("train_labels.csv"), &built.train_labels)?;

    println!("{}", serde_json::to_string_pretty(&built.report)?);
    println!(
        "DONE | train={} test={} columns={} schema_fingerprint={}",
        built.report.train_rows,
        built.report.test_rows,
        built.report.feature_columns,
        built.schema.fingerprint
    );

    Ok(())
}

fn write_features(
    path: &Path,
    schema: &FeatureSchema,
    matrix: &FeatureMatrix,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["id".to_string()];
    header.extend(schema.columns.iter().map(|column| column.name.clone()));
    writer.write_record(&header)?;

    for (id, row) in matrix.ids.iter().zip(&matrix.rows) {
        let mut record = vec![id.to_string()];
        record.extend(row.iter().map(|value| value.to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

fn write_labels(path: &Path, labels: &TrainingLabels) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["id", "income"])?;
    for (id, income) in labels.ids.iter().zip(&labels.income) {
        writer.write_record(&[id.to_string(), income.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}
