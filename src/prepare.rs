//! Join stage: card-to-entity resolution and labeled demographic profiles.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::loader::RawTables;

/// One deduplicated demographic row with its income label, the
/// categorical crosses, and the card/deposit ownership features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoProfile {
    pub id: i64,
    pub gender: String,
    pub age: i64,
    pub ocp_cd: i64,
    pub income: f64,
    pub card_count: f64,
    pub has_deposits: f64,
    pub age_gnd: String,
    pub gnd_ocp: String,
    pub age_ocp: String,
}

/// A card transaction resolved to its owning entity id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OwnedCardTxn {
    pub id: i64,
    pub pos_dt: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTables {
    pub profiles: Vec<DemoProfile>,
    pub card_txns: Vec<OwnedCardTxn>,
    pub unmapped_card_txns: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrepareError {
    #[error("label id {id} matches {matches} demographic rows, expected exactly 1")]
    LabelCardinality { id: i64, matches: usize },
    #[error("duplicate id {0} in the concatenated label table")]
    DuplicateLabel(i64),
}

/// Runs the whole join stage over the raw tables.
pub fn prepare_tables(raw: &RawTables) -> Result<PreparedTables, PrepareError> {
    let mapping = card_mapping(raw);
    let profiles = prepare_demographics(raw, &mapping)?;
    let (card_txns, unmapped_card_txns) = resolve_card_transactions(raw, &mapping);

    info!(
        component = "prepare",
        event = "features.prepare.finish",
        profiles = profiles.len(),
        card_txns_resolved = card_txns.len(),
        card_txns_unmapped = unmapped_card_txns
    );

    Ok(PreparedTables {
        profiles,
        card_txns,
        unmapped_card_txns,
    })
}

/// (id, cc_no) pairs taken from the demographic rows before any
/// deduplication; an entity may own several cards.
fn card_mapping(raw: &RawTables) -> Vec<(i64, i64)> {
    raw.demographics
        .iter()
        .map(|row| (row.id, row.cc_no))
        .collect()
}

fn prepare_demographics(
    raw: &RawTables,
    mapping: &[(i64, i64)],
) -> Result<Vec<DemoProfile>, PrepareError> {
    let incomes = label_incomes(raw)?;

    let mut cards_per_id: HashMap<i64, u64> = HashMap::new();
    for (id, _) in mapping {
        *cards_per_id.entry(*id).or_insert(0) += 1;
    }
    let deposit_ids: HashSet<i64> = raw.deposits.iter().map(|row| row.id).collect();

    // Dedup on all columns that remain after dropping cc_no, keeping
    // first-occurrence order, then inner-merge the labels.
    let mut seen: HashSet<(i64, String, i64, Option<i64>)> = HashSet::new();
    let mut matches_per_label: HashMap<i64, usize> = HashMap::new();
    let mut profiles = Vec::new();

    for row in &raw.demographics {
        let key = (row.id, row.gender.clone(), row.age, row.ocp_cd);
        if !seen.insert(key) {
            continue;
        }

        let Some(&income) = incomes.get(&row.id) else {
            continue;
        };
        *matches_per_label.entry(row.id).or_insert(0) += 1;

        let ocp_cd = row.ocp_cd.unwrap_or(0);
        profiles.push(DemoProfile {
            id: row.id,
            gender: row.gender.clone(),
            age: row.age,
            ocp_cd,
            income,
            card_count: cards_per_id.get(&row.id).copied().unwrap_or(0) as f64,
            has_deposits: f64::from(u8::from(deposit_ids.contains(&row.id))),
            age_gnd: format!("{}{}", row.gender, row.age),
            gnd_ocp: format!("{}{}", row.gender, ocp_cd),
            age_ocp: format!("{}{}", row.age, ocp_cd),
        });
    }

    for label in &raw.labels {
        let matches = matches_per_label.get(&label.id).copied().unwrap_or(0);
        if matches != 1 {
            return Err(PrepareError::LabelCardinality {
                id: label.id,
                matches,
            });
        }
    }

    Ok(profiles)
}

fn label_incomes(raw: &RawTables) -> Result<HashMap<i64, f64>, PrepareError> {
    let mut incomes = HashMap::with_capacity(raw.labels.len());
    for label in &raw.labels {
        if incomes.insert(label.id, label.income).is_some() {
            return Err(PrepareError::DuplicateLabel(label.id));
        }
    }
    Ok(incomes)
}

/// Inner join on cc_no. Transactions whose card has no owner in the
/// mapping are dropped; the count is reported so the loss stays visible.
fn resolve_card_transactions(raw: &RawTables, mapping: &[(i64, i64)]) -> (Vec<OwnedCardTxn>, u64) {
    let mut owners_by_card: HashMap<i64, Vec<i64>> = HashMap::new();
    for (id, cc_no) in mapping {
        owners_by_card.entry(*cc_no).or_default().push(*id);
    }

    let mut resolved = Vec::with_capacity(raw.card_txns.len());
    let mut unmapped = 0u64;
    for txn in &raw.card_txns {
        match owners_by_card.get(&txn.cc_no) {
            Some(owners) => {
                for id in owners {
                    resolved.push(OwnedCardTxn {
                        id: *id,
                        pos_dt: txn.pos_dt,
                        amount: txn.amount,
                    });
                }
            }
            None => unmapped += 1,
        }
    }

    if unmapped > 0 {
        warn!(
            component = "prepare",
            event = "features.prepare.unmapped_dropped",
            dropped = unmapped
        );
    }

    (resolved, unmapped)
}
