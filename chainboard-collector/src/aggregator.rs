//! Rolling-window chain statistics.
//!
//! Runs after a collection pass and recomputes the whole window from the
//! persisted block records every time — no incremental state to drift, at
//! the price of re-reading one day of blocks. The result is a single
//! upserted row per chain.

use std::collections::BTreeSet;

use bigdecimal::{BigDecimal, Zero};
use chainboard::chain::Blockchain;
use chainboard::record::{BlockRecord, ChainAggregate};
use chainboard::units::{self, UnitsError};
use serde_json::json;
use thiserror::Error;

use crate::store::{Filter, Store, StoreError, collections};

/// Width of the rolling aggregation window.
pub const AGGREGATION_WINDOW_SECONDS: u64 = 24 * 60 * 60;

/// A fatal aggregation failure.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The storage gateway failed.
    #[error("storage failure while aggregating: {0}")]
    Store(#[from] StoreError),

    /// A persisted block record no longer parses.
    #[error("stored block record is malformed: {0}")]
    Record(#[from] serde_json::Error),

    /// A persisted amount string no longer parses.
    #[error(transparent)]
    Amount(#[from] UnitsError),
}

/// Recompute the trailing 24h statistics for one chain and upsert them.
///
/// `now` is the window's trailing edge (unix seconds); passing it in keeps
/// the computation deterministic.
///
/// # Errors
///
/// [`AggregateError`] when storage fails or a persisted record is corrupt.
pub async fn aggregate_chain<S: Store>(
    store: &S,
    chain: &Blockchain,
    now: u64,
) -> Result<ChainAggregate, AggregateError> {
    let window_start = now.saturating_sub(AGGREGATION_WINDOW_SECONDS);

    let documents = store
        .query(
            collections::BLOCKS,
            &Filter::new()
                .eq("chain", chain.name.as_str())
                .between("timestamp", window_start, now),
        )
        .await?;

    let mut transactions = 0_u64;
    let mut deployed = 0_u64;
    let mut transfer = BigDecimal::zero();
    let mut from_addresses = BTreeSet::new();
    let mut to_addresses = BTreeSet::new();
    let blocks = documents.len() as u64;

    for document in documents {
        let record: BlockRecord = serde_json::from_value(document)?;

        transactions += record.transactions;
        deployed += record.deployed_contracts.unwrap_or(0);
        transfer += units::parse_decimal(&record.total_coin_transfer)?;

        from_addresses.extend(record.sender_addresses);
        to_addresses.extend(record.recipient_addresses.unwrap_or_default());
    }

    let aggregate = ChainAggregate {
        chain: chain.name.clone(),
        family: chain.family,
        window_end_timestamp: now,
        blocks,
        transactions,
        unique_from_addresses: from_addresses.len() as u64,
        unique_to_addresses: to_addresses.len() as u64,
        total_coin_transfer: units::to_plain_string(&transfer),
        deployed_contracts: deployed,
    };

    store
        .upsert(
            collections::CHAIN_STATS,
            &[("chain", json!(&aggregate.chain))],
            serde_json::to_value(&aggregate)?,
        )
        .await?;

    tracing::info!(
        service = "aggregator",
        chain = %aggregate.chain,
        blocks = aggregate.blocks,
        transactions = aggregate.transactions,
        "updated chain data state"
    );

    Ok(aggregate)
}
