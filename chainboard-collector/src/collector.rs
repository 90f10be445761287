//! Checkpointed incremental block collection.
//!
//! One pass drives a chain adapter through the contiguous range from its
//! resume point to the chain tip, strictly ascending, one block at a time.
//! Each block's record write happens before the checkpoint advance, and the
//! checkpoint advance happens before the next block's fetch: a crash
//! between the two leaves the next run re-fetching that block (harmless,
//! the record upsert is idempotent) instead of silently skipping it. A
//! block that cannot be fetched from any endpoint halts the pass for the
//! same no-gap reason.

use chainboard::record::{BlockRecord, Checkpoint};
use serde_json::json;
use thiserror::Error;

use crate::adapter::{ChainAdapter, FetchError};
use crate::store::{Filter, Store, StoreError, collections};

/// Caller-supplied knobs for one collection pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    /// Collect from this block instead of the checkpoint or descriptor.
    pub from_block: Option<u64>,

    /// Re-fetch and overwrite the whole range without reading or advancing
    /// the checkpoint, so repeated forced runs re-verify the same range.
    pub force: bool,
}

/// What one pass did.
#[derive(Debug, Clone, Copy)]
pub struct CollectSummary {
    /// First block of the attempted range.
    pub from: u64,

    /// Chain tip the range ran to, inclusive.
    pub to: u64,

    /// Blocks fetched and persisted. Zero for an already-caught-up chain.
    pub collected: u64,
}

/// A fatal condition ending a chain's pass.
#[derive(Debug, Error)]
pub enum CollectError {
    /// No endpoint would report the chain height.
    #[error("could not resolve the latest height of {chain} from any rpc")]
    HeightUnavailable {
        /// Chain whose pass failed.
        chain: String,
    },

    /// One block could not be fetched or decoded; collection stops here
    /// rather than skip it and leave a gap.
    #[error("failed to get block data for {chain} block {number}: {source}")]
    Fetch {
        /// Chain whose pass failed.
        chain: String,
        /// Block the pass halted at.
        number: u64,
        /// Why the block was unavailable.
        #[source]
        source: FetchError,
    },

    /// The storage gateway failed.
    #[error("storage failure while collecting {chain}: {source}")]
    Store {
        /// Chain whose pass failed.
        chain: String,
        /// Underlying storage failure.
        #[source]
        source: StoreError,
    },
}

/// Run one collection pass for one chain.
///
/// The starting block is, in order of precedence: the caller's explicit
/// `from_block`; the block after the stored checkpoint (unless `force`);
/// the descriptor's `start_block`. A pass whose start is already past the
/// chain tip is a valid empty pass.
///
/// # Errors
///
/// [`CollectError`] on unresolvable height, an unfetchable block, or a
/// storage failure — all fatal for this chain's pass.
pub async fn collect_chain<A, S>(
    adapter: &A,
    store: &S,
    options: &CollectOptions,
) -> Result<CollectSummary, CollectError>
where
    A: ChainAdapter,
    S: Store,
{
    let chain = adapter.chain();

    let latest = adapter.latest_height().await;
    if latest == 0 {
        return Err(CollectError::HeightUnavailable {
            chain: chain.name.clone(),
        });
    }

    let start = match options.from_block {
        Some(from) => from,
        None if options.force => chain.start_block,
        None => match read_checkpoint(store, &chain.name).await.map_err(|source| {
            CollectError::Store {
                chain: chain.name.clone(),
                source,
            }
        })? {
            Some(checkpoint) => checkpoint.block_number + 1,
            None => chain.start_block,
        },
    };

    tracing::info!(
        service = adapter.service(),
        chain = %chain.name,
        from_block = start,
        to_block = latest,
        "start to update block data"
    );

    let mut collected = 0_u64;
    for number in start..=latest {
        let record = adapter
            .block_data(number)
            .await
            .map_err(|source| CollectError::Fetch {
                chain: chain.name.clone(),
                number,
                source,
            })?;

        persist(store, &record, options.force)
            .await
            .map_err(|source| CollectError::Store {
                chain: chain.name.clone(),
                source,
            })?;
        collected += 1;

        tracing::info!(
            service = adapter.service(),
            chain = %chain.name,
            number,
            transactions = record.transactions,
            "updated block data"
        );
    }

    Ok(CollectSummary {
        from: start,
        to: latest,
        collected,
    })
}

async fn read_checkpoint<S: Store>(store: &S, chain: &str) -> Result<Option<Checkpoint>, StoreError> {
    let document = store
        .find(
            collections::CHECKPOINTS,
            &Filter::new().eq("name", Checkpoint::key(chain)),
        )
        .await?;
    document.map(serde_json::from_value).transpose().map_err(StoreError::from)
}

async fn persist<S: Store>(store: &S, record: &BlockRecord, force: bool) -> Result<(), StoreError> {
    store
        .upsert(
            collections::BLOCKS,
            &[("chain", json!(&record.chain)), ("number", json!(record.number))],
            serde_json::to_value(record)?,
        )
        .await?;

    // The checkpoint may only advance once the record write has committed.
    if !force {
        let checkpoint = Checkpoint {
            name: Checkpoint::key(&record.chain),
            block_number: record.number,
        };
        store
            .upsert(
                collections::CHECKPOINTS,
                &[("name", json!(&checkpoint.name))],
                serde_json::to_value(&checkpoint)?,
            )
            .await?;
    }

    Ok(())
}
