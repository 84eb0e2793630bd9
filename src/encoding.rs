//! Target-mean and frequency encoding of the categorical features.
//!
//! Both encodings are computed over the entire demographic table, train
//! and test rows together, with test incomes zero-filled. The original
//! model was built this way; the zero placeholders bias every
//! target mean toward zero for categories containing test rows, and
//! that behavior is reproduced here on purpose rather than fixed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::prepare::DemoProfile;

/// Categorical features that receive both encodings, in the order the
/// derived columns are appended.
pub const ENCODED_FEATURES: [&str; 6] =
    ["gender", "ocp_cd", "age_gnd", "gnd_ocp", "age_ocp", "age"];

/// A block of derived numeric columns, row-aligned with the profile
/// slice it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingBlock {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Mean income per distinct feature value, over every row including
/// the row itself.
pub fn target_mean_by_value(values: &[String], incomes: &[f64]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    for (value, income) in values.iter().zip(incomes) {
        let entry = sums.entry(value.clone()).or_insert((0.0, 0));
        entry.0 += income;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(value, (sum, count))| (value, sum / count as f64))
        .collect()
}

/// Row count per distinct feature value.
pub fn frequency_by_value(values: &[String]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, f64> = BTreeMap::new();
    for value in values {
        *counts.entry(value.clone()).or_insert(0.0) += 1.0;
    }
    counts
}

/// Computes `<feature>_targetmean` for every encoded feature, then
/// `<feature>_freq`, broadcasting each group statistic back onto the
/// rows. Returns a new block; the profiles are not touched.
pub fn encode_profiles(profiles: &[DemoProfile]) -> EncodingBlock {
    let incomes: Vec<f64> = profiles.iter().map(|p| p.income).collect();

    let mut columns = Vec::with_capacity(ENCODED_FEATURES.len() * 2);
    let mut column_values: Vec<Vec<f64>> = Vec::with_capacity(ENCODED_FEATURES.len() * 2);

    for feature in ENCODED_FEATURES {
        let values = feature_values(profiles, feature);
        let means = target_mean_by_value(&values, &incomes);
        columns.push(format!("{feature}_targetmean"));
        column_values.push(values.iter().map(|v| means[v]).collect());
    }
    for feature in ENCODED_FEATURES {
        let values = feature_values(profiles, feature);
        let freqs = frequency_by_value(&values);
        columns.push(format!("{feature}_freq"));
        column_values.push(values.iter().map(|v| freqs[v]).collect());
    }

    let rows = (0..profiles.len())
        .map(|row| column_values.iter().map(|col| col[row]).collect())
        .collect();

    EncodingBlock { columns, rows }
}

fn feature_values(profiles: &[DemoProfile], feature: &str) -> Vec<String> {
    profiles
        .iter()
        .map(|p| match feature {
            "gender" => p.gender.clone(),
            "ocp_cd" => p.ocp_cd.to_string(),
            "age_gnd" => p.age_gnd.clone(),
            "gnd_ocp" => p.gnd_ocp.clone(),
            "age_ocp" => p.age_ocp.clone(),
            "age" => p.age.to_string(),
            other => unreachable!("unknown encoded feature: {other}"),
        })
        .collect()
}
