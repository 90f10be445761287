//! Solana chain adapter.
//!
//! Heights are slots at `confirmed` commitment. Native transfer volume is
//! inferred from positive balance deltas between `preBalances` and
//! `postBalances`; there is no direct per-transaction value field.

use std::collections::BTreeSet;

use chainboard::chain::Blockchain;
use chainboard::record::BlockRecord;
use chainboard::units;
use serde::Deserialize;
use serde_json::json;

use crate::adapter::{ChainAdapter, FetchError, decode};
use crate::rpc::{AttemptError, RpcClient, rotate};

/// Compute-unit ceiling a Solana block is filled against.
const BLOCK_COMPUTE_UNITS: u64 = 48_000_000;

/// Lamports per SOL, as a decimal scale.
const LAMPORTS_SCALE: i64 = 9;

/// Adapter for Solana.
#[derive(Debug)]
pub struct SolanaAdapter {
    chain: Blockchain,
    rpc: RpcClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    #[serde(default)]
    block_time: Option<i64>,
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    #[serde(default)]
    meta: Option<RawMeta>,
    transaction: RawMessageHolder,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    fee: u64,
    #[serde(default)]
    compute_units_consumed: Option<u64>,
    #[serde(default)]
    pre_balances: Vec<u64>,
    #[serde(default)]
    post_balances: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct RawMessageHolder {
    message: RawMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    account_keys: Vec<String>,
}

impl SolanaAdapter {
    /// Build an adapter for one Solana chain descriptor.
    ///
    /// # Errors
    ///
    /// Propagates HTTP client construction failures.
    pub fn new(chain: Blockchain) -> Result<Self, reqwest::Error> {
        Ok(Self {
            chain,
            rpc: RpcClient::new()?,
        })
    }
}

impl ChainAdapter for SolanaAdapter {
    fn chain(&self) -> &Blockchain {
        &self.chain
    }

    fn service(&self) -> &'static str {
        "chain.solana"
    }

    async fn latest_height(&self) -> u64 {
        let result = rotate(
            self.service(),
            &self.chain.name,
            &self.chain.node_rpcs,
            async |rpc| {
                let slot = self
                    .rpc
                    .call(rpc, "getSlot", json!([{"commitment": "confirmed"}]))
                    .await?;
                slot.as_u64()
                    .ok_or_else(|| AttemptError::Transport(format!("unexpected slot {slot}")))
            },
        )
        .await;

        result.unwrap_or(0)
    }

    async fn block_data(&self, number: u64) -> Result<BlockRecord, FetchError> {
        let record = rotate(
            self.service(),
            &self.chain.name,
            &self.chain.node_rpcs,
            async |rpc| {
                let params = json!([
                    number,
                    {
                        "encoding": "json",
                        "transactionDetails": "full",
                        "maxSupportedTransactionVersion": 0,
                    },
                ]);
                let block: RawBlock =
                    decode("block", self.rpc.call(rpc, "getBlock", params).await?)?;
                Ok(decode_block(&self.chain, number, &block))
            },
        )
        .await?;

        Ok(record)
    }
}

fn decode_block(chain: &Blockchain, number: u64, block: &RawBlock) -> BlockRecord {
    let mut fees: u128 = 0;
    let mut moved: u128 = 0;
    let mut consumed: u64 = 0;
    let mut senders = BTreeSet::new();

    for transaction in &block.transactions {
        if let Some(meta) = &transaction.meta {
            fees += u128::from(meta.fee);
            consumed += meta.compute_units_consumed.unwrap_or(0);

            for (pre, post) in meta.pre_balances.iter().zip(&meta.post_balances) {
                if post > pre {
                    moved += u128::from(post - pre);
                }
            }
        }

        // The first account key is the fee-paying signer.
        if let Some(signer) = transaction.transaction.message.account_keys.first() {
            senders.insert(signer.clone());
        }
    }

    BlockRecord {
        chain: chain.name.clone(),
        family: chain.family,
        number,
        timestamp: block.block_time.map_or(0, |time| u64::try_from(time).unwrap_or(0)),
        transactions: block.transactions.len() as u64,
        total_coin_transfer: units::to_plain_string(&units::scaled(moved, LAMPORTS_SCALE)),
        total_fees_paid: Some(units::to_plain_string(&units::scaled(fees, LAMPORTS_SCALE))),
        total_coin_burnt: None,
        total_coin_withdrawn: None,
        resource_used: consumed,
        resource_limit: BLOCK_COMPUTE_UNITS,
        sender_addresses: senders.into_iter().collect(),
        recipient_addresses: None,
        deployed_contracts: None,
        contract_logs: None,
    }
}
