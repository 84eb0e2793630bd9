//! Entity-level aggregate tables over card and deposit transactions.
//!
//! Each table is keyed by id and carries a deterministic generated
//! column list:
//! - deposit totals (`kp_txn_count`, `kp_txn_amt`)
//! - deposit monthly totals (`{metric}_{month}`)
//! - card totals (`cc_txn_amt_count`, `cc_txn_amt_sum`)
//! - card pivots by month/holiday/weekend/quarter bucket, eight
//!   statistics per bucket (`cc_{stat}_{bucket}`)
//!
//! Pivot buckets are sorted lexicographically and statistics keep a
//! fixed order, so the column list is a pure function of the observed
//! bucket values. Variance is the sample convention (ddof = 1; a
//! single-value group yields 0) and percentiles interpolate linearly
//! between the nearest ranks.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::calendar;
use crate::loader::DepositRecord;
use crate::prepare::OwnedCardTxn;

/// Per-bucket statistics of the card pivots, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stat {
    Mean,
    Min,
    Max,
    Sum,
    Count,
    Var,
    Percentile10,
    Percentile90,
}

pub const CARD_PIVOT_STATS: [Stat; 8] = [
    Stat::Mean,
    Stat::Min,
    Stat::Max,
    Stat::Sum,
    Stat::Count,
    Stat::Var,
    Stat::Percentile10,
    Stat::Percentile90,
];

impl Stat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Var => "var",
            Self::Percentile10 => "percentile_10",
            Self::Percentile90 => "percentile_90",
        }
    }

    /// `values` must be sorted ascending and non-empty.
    fn compute(self, values: &[f64]) -> f64 {
        let n = values.len() as f64;
        match self {
            Self::Mean => values.iter().sum::<f64>() / n,
            Self::Min => values[0],
            Self::Max => values[values.len() - 1],
            Self::Sum => values.iter().sum(),
            Self::Count => n,
            Self::Var => sample_variance(values),
            Self::Percentile10 => percentile(values, 10.0),
            Self::Percentile90 => percentile(values, 90.0),
        }
    }
}

/// Shared naming for every card pivot column.
pub fn pivot_column_name(stat: Stat, bucket: &str) -> String {
    format!("cc_{}_{}", stat.as_str(), bucket)
}

/// One aggregate table: deterministic column list plus one dense value
/// row per id. Join keys are unique by construction of the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateTable {
    pub columns: Vec<String>,
    pub rows: BTreeMap<i64, Vec<f64>>,
}

impl AggregateTable {
    /// Left-join accessor: ids absent from the source table resolve to
    /// a zero row.
    pub fn values_or_zero(&self, id: i64) -> Vec<f64> {
        self.rows
            .get(&id)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.columns.len()])
    }
}

/// Sum of deposit count and amount per id.
pub fn deposit_totals(deposits: &[DepositRecord]) -> AggregateTable {
    let mut rows: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for deposit in deposits {
        let entry = rows.entry(deposit.id).or_insert_with(|| vec![0.0, 0.0]);
        entry[0] += deposit.txn_count;
        entry[1] += deposit.txn_amt;
    }
    AggregateTable {
        columns: vec!["kp_txn_count".to_string(), "kp_txn_amt".to_string()],
        rows,
    }
}

/// Sum of deposit count and amount per id per month, pivoted so each
/// (metric, month) pair is one column.
pub fn deposit_monthly_totals(deposits: &[DepositRecord]) -> AggregateTable {
    let mut sums: BTreeMap<(i64, String), (f64, f64)> = BTreeMap::new();
    let mut buckets: BTreeSet<String> = BTreeSet::new();
    for deposit in deposits {
        let month = calendar::month_tag(deposit.sunday);
        buckets.insert(month.clone());
        let entry = sums.entry((deposit.id, month)).or_insert((0.0, 0.0));
        entry.0 += deposit.txn_count;
        entry.1 += deposit.txn_amt;
    }

    let buckets: Vec<String> = buckets.into_iter().collect();
    let metrics = ["kp_txn_count", "kp_txn_amt"];
    let columns: Vec<String> = metrics
        .iter()
        .flat_map(|metric| buckets.iter().map(move |bucket| format!("{metric}_{bucket}")))
        .collect();

    let mut rows: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for ((id, bucket), (count_sum, amt_sum)) in &sums {
        let row = rows
            .entry(*id)
            .or_insert_with(|| vec![0.0; columns.len()]);
        let bucket_idx = buckets
            .iter()
            .position(|b| b == bucket)
            .expect("bucket collected above");
        row[bucket_idx] = *count_sum;
        row[buckets.len() + bucket_idx] = *amt_sum;
    }

    AggregateTable { columns, rows }
}

/// Count and sum of card transaction amounts per id.
pub fn card_totals(txns: &[OwnedCardTxn]) -> AggregateTable {
    let mut rows: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for txn in txns {
        let entry = rows.entry(txn.id).or_insert_with(|| vec![0.0, 0.0]);
        entry[0] += 1.0;
        entry[1] += txn.amount;
    }
    AggregateTable {
        columns: vec![
            "cc_txn_amt_count".to_string(),
            "cc_txn_amt_sum".to_string(),
        ],
        rows,
    }
}

/// Eight statistics of the card transaction amounts per id per bucket,
/// pivoted statistic-major over the lexicographically sorted buckets.
pub fn card_pivot<F>(txns: &[OwnedCardTxn], bucket_of: F) -> AggregateTable
where
    F: Fn(&OwnedCardTxn) -> String,
{
    let mut groups: BTreeMap<(i64, String), Vec<f64>> = BTreeMap::new();
    let mut buckets: BTreeSet<String> = BTreeSet::new();
    for txn in txns {
        let bucket = bucket_of(txn);
        buckets.insert(bucket.clone());
        groups.entry((txn.id, bucket)).or_default().push(txn.amount);
    }

    let buckets: Vec<String> = buckets.into_iter().collect();
    let columns: Vec<String> = CARD_PIVOT_STATS
        .iter()
        .flat_map(|stat| {
            buckets
                .iter()
                .map(move |bucket| pivot_column_name(*stat, bucket))
        })
        .collect();

    let mut rows: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for ((id, bucket), mut values) in groups {
        values.sort_by(f64::total_cmp);
        let row = rows
            .entry(id)
            .or_insert_with(|| vec![0.0; columns.len()]);
        let bucket_idx = buckets
            .iter()
            .position(|b| *b == bucket)
            .expect("bucket collected above");
        for (stat_idx, stat) in CARD_PIVOT_STATS.iter().enumerate() {
            row[stat_idx * buckets.len() + bucket_idx] = stat.compute(&values);
        }
    }

    AggregateTable { columns, rows }
}

/// Sample variance (ddof = 1). A single value has no spread to
/// estimate and resolves to 0 instead of an undefined division.
fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values
        .iter()
        .map(|v| {
            let d = *v - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1.0)
}

/// Linear-interpolation percentile: rank = p/100 * (n-1), interpolated
/// between the two nearest data points. `sorted` must be ascending and
/// non-empty.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn txn(id: i64, m: u32, d: u32, amount: f64) -> OwnedCardTxn {
        OwnedCardTxn {
            id,
            pos_dt: date(2018, m, d),
            amount,
        }
    }

    #[test]
    fn percentiles_interpolate_linearly() {
        let values = [10.0, 20.0, 30.0, 40.0];
        assert!((percentile(&values, 10.0) - 13.0).abs() < 1e-12);
        assert!((percentile(&values, 90.0) - 37.0).abs() < 1e-12);
        assert_eq!(percentile(&[5.0], 10.0), 5.0);
        assert_eq!(percentile(&[5.0], 90.0), 5.0);
    }

    #[test]
    fn variance_uses_sample_convention() {
        assert!((sample_variance(&[1.0, 2.0, 3.0, 4.0]) - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(sample_variance(&[7.0]), 0.0);
        assert_eq!(sample_variance(&[]), 0.0);
    }

    #[test]
    fn deposit_totals_sum_per_id() {
        let deposits = vec![
            DepositRecord {
                id: 1,
                sunday: date(2018, 1, 7),
                txn_count: 2.0,
                txn_amt: 200.0,
            },
            DepositRecord {
                id: 1,
                sunday: date(2018, 2, 4),
                txn_count: 1.0,
                txn_amt: 50.0,
            },
        ];
        let table = deposit_totals(&deposits);
        assert_eq!(table.columns, vec!["kp_txn_count", "kp_txn_amt"]);
        assert_eq!(table.rows[&1], vec![3.0, 250.0]);
    }

    #[test]
    fn deposit_monthly_columns_are_metric_major_lexicographic() {
        let deposits = vec![
            DepositRecord {
                id: 1,
                sunday: date(2018, 1, 7),
                txn_count: 2.0,
                txn_amt: 200.0,
            },
            DepositRecord {
                id: 1,
                sunday: date(2018, 10, 7),
                txn_count: 1.0,
                txn_amt: 30.0,
            },
            DepositRecord {
                id: 1,
                sunday: date(2018, 2, 4),
                txn_count: 4.0,
                txn_amt: 400.0,
            },
        ];
        let table = deposit_monthly_totals(&deposits);
        // month10 sorts before month2 as a string, like the reference.
        assert_eq!(
            table.columns,
            vec![
                "kp_txn_count_month1",
                "kp_txn_count_month10",
                "kp_txn_count_month2",
                "kp_txn_amt_month1",
                "kp_txn_amt_month10",
                "kp_txn_amt_month2",
            ]
        );
        assert_eq!(table.rows[&1], vec![2.0, 1.0, 4.0, 200.0, 30.0, 400.0]);
    }

    #[test]
    fn card_totals_count_and_sum() {
        let txns = vec![txn(1, 1, 3, 10.0), txn(1, 1, 4, 20.0), txn(2, 1, 5, 5.0)];
        let table = card_totals(&txns);
        assert_eq!(table.rows[&1], vec![2.0, 30.0]);
        assert_eq!(table.rows[&2], vec![1.0, 5.0]);
    }

    #[test]
    fn card_pivot_emits_eight_statistics_per_bucket() {
        let txns = vec![
            txn(1, 1, 3, 10.0),
            txn(1, 1, 4, 20.0),
            txn(1, 1, 5, 30.0),
            txn(1, 1, 6, 40.0),
        ];
        let table = card_pivot(&txns, |t| calendar::month_tag(t.pos_dt));
        assert_eq!(table.columns.len(), 8);
        assert_eq!(table.columns[0], "cc_mean_month1");

        let row = &table.rows[&1];
        let col = |name: &str| {
            table
                .columns
                .iter()
                .position(|c| c == name)
                .expect("column must exist")
        };
        assert_eq!(row[col("cc_mean_month1")], 25.0);
        assert_eq!(row[col("cc_min_month1")], 10.0);
        assert_eq!(row[col("cc_max_month1")], 40.0);
        assert_eq!(row[col("cc_sum_month1")], 100.0);
        assert_eq!(row[col("cc_count_month1")], 4.0);
        assert!((row[col("cc_var_month1")] - 500.0 / 3.0).abs() < 1e-12);
        assert!((row[col("cc_percentile_10_month1")] - 13.0).abs() < 1e-12);
        assert!((row[col("cc_percentile_90_month1")] - 37.0).abs() < 1e-12);
    }

    #[test]
    fn card_pivot_missing_bucket_for_an_id_is_zero() {
        let txns = vec![txn(1, 1, 3, 10.0), txn(2, 2, 3, 20.0)];
        let table = card_pivot(&txns, |t| calendar::month_tag(t.pos_dt));
        let col = |name: &str| table.columns.iter().position(|c| c == name).unwrap();
        assert_eq!(table.rows[&1][col("cc_sum_month1")], 10.0);
        assert_eq!(table.rows[&1][col("cc_sum_month2")], 0.0);
        assert_eq!(table.rows[&2][col("cc_sum_month1")], 0.0);
    }

    #[test]
    fn absent_id_resolves_to_a_zero_row_at_join_time() {
        let table = card_totals(&[txn(1, 1, 3, 10.0)]);
        assert_eq!(table.values_or_zero(42), vec![0.0, 0.0]);
    }
}
