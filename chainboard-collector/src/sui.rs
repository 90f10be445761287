//! Sui chain adapter.
//!
//! Blocks are checkpoints: one call resolves the checkpoint, a second
//! batch-fetches its transaction blocks. Both calls run against the same
//! endpoint within one rotation attempt. Transaction fees are
//! `computationCost + storageCost − storageRebate`; native volume is the
//! sum of negative SUI balance changes minus those fees, so gas is not
//! double-counted as transfer.

use std::collections::BTreeSet;

use bigdecimal::BigDecimal;
use chainboard::chain::Blockchain;
use chainboard::record::BlockRecord;
use chainboard::units;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::adapter::{ChainAdapter, FetchError, decode, u64_from_string_or_number};
use crate::rpc::{AttemptError, DecodeError, RpcClient, rotate};

/// Coin type of the native SUI coin in balance changes.
const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

/// Sentinel sender used by system transactions.
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

/// MIST per SUI, as a decimal scale.
const MIST_SCALE: i64 = 9;

/// Adapter for Sui.
#[derive(Debug)]
pub struct SuiAdapter {
    chain: Blockchain,
    rpc: RpcClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCheckpoint {
    #[serde(deserialize_with = "u64_from_string_or_number")]
    timestamp_ms: u64,
    transactions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransactionBlock {
    transaction: RawTransaction,
    #[serde(default)]
    effects: Option<RawEffects>,
    #[serde(default)]
    balance_changes: Option<Vec<RawBalanceChange>>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    data: RawTransactionData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransactionData {
    sender: String,
    gas_data: RawGasData,
}

#[derive(Debug, Deserialize)]
struct RawGasData {
    #[serde(deserialize_with = "u64_from_string_or_number")]
    budget: u64,
    #[serde(deserialize_with = "u64_from_string_or_number")]
    price: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEffects {
    gas_used: RawGasSummary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGasSummary {
    #[serde(deserialize_with = "u64_from_string_or_number")]
    computation_cost: u64,
    #[serde(deserialize_with = "u64_from_string_or_number")]
    storage_cost: u64,
    #[serde(deserialize_with = "u64_from_string_or_number")]
    storage_rebate: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBalanceChange {
    coin_type: String,
    amount: String,
}

impl SuiAdapter {
    /// Build an adapter for one Sui chain descriptor.
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

impl ChainAdapter for SuiAdapter {
    fn chain(&self) -> &Blockchain {
        &self.chain
    }

    fn service(&self) -> &'static str {
        "chain.sui"
    }

    async fn latest_height(&self) -> u64 {
        let result = rotate(
            self.service(),
            &self.chain.name,
            &self.chain.node_rpcs,
            async |rpc| {
                let sequence = self
                    .rpc
                    .call(rpc, "sui_getLatestCheckpointSequenceNumber", json!([]))
                    .await?;
                value_as_u64(&sequence)
                    .ok_or_else(|| AttemptError::Transport(format!("unexpected sequence {sequence}")))
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
                let checkpoint: RawCheckpoint = decode(
                    "checkpoint",
                    self.rpc
                        .call(rpc, "sui_getCheckpoint", json!([number.to_string()]))
                        .await?,
                )?;

                let blocks: Vec<RawTransactionBlock> = if checkpoint.transactions.is_empty() {
                    Vec::new()
                } else {
                    let params = json!([
                        &checkpoint.transactions,
                        {
                            "showInput": true,
                            "showRawInput": true,
                            "showEffects": true,
                            "showBalanceChanges": true,
                        },
                    ]);
                    decode(
                        "transaction blocks",
                        self.rpc.call(rpc, "sui_multiGetTransactionBlocks", params).await?,
                    )?
                };

                Ok(decode_checkpoint(&self.chain, number, &checkpoint, &blocks)?)
            },
        )
        .await?;

        Ok(record)
    }
}

fn value_as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|text| text.parse().ok()))
}

fn decode_checkpoint(
    chain: &Blockchain,
    number: u64,
    checkpoint: &RawCheckpoint,
    blocks: &[RawTransactionBlock],
) -> Result<BlockRecord, DecodeError> {
    let mut fees_mist: i128 = 0;
    let mut outflow_mist: u128 = 0;
    let mut budget: u64 = 0;
    let mut consumed: u64 = 0;
    let mut senders = BTreeSet::new();

    for block in blocks {
        let data = &block.transaction.data;

        let sender = data.sender.to_lowercase();
        if sender != ZERO_ADDRESS {
            senders.insert(sender);
        }

        if let Some(effects) = &block.effects {
            let gas = &effects.gas_used;
            fees_mist += i128::from(gas.computation_cost) + i128::from(gas.storage_cost)
                - i128::from(gas.storage_rebate);

            if data.gas_data.price > 0 {
                consumed += gas.computation_cost / data.gas_data.price;
            }
        }

        budget += data.gas_data.budget;

        for change in block.balance_changes.as_deref().unwrap_or_default() {
            if change.coin_type != SUI_COIN_TYPE {
                continue;
            }
            let amount: i128 = change.amount.parse().map_err(|_| DecodeError {
                what: "balance change",
                message: format!("invalid amount {:?}", change.amount),
            })?;
            if amount < 0 {
                outflow_mist += amount.unsigned_abs();
            }
        }
    }

    let fees: BigDecimal = units::scaled(fees_mist, MIST_SCALE);
    // Outflows include the gas payments collected above; take them back out.
    let transfer = units::scaled(outflow_mist, MIST_SCALE) - fees.clone();

    Ok(BlockRecord {
        chain: chain.name.clone(),
        family: chain.family,
        number,
        timestamp: checkpoint.timestamp_ms / 1_000,
        transactions: checkpoint.transactions.len() as u64,
        total_coin_transfer: units::to_plain_string(&transfer),
        total_fees_paid: Some(units::to_plain_string(&fees)),
        total_coin_burnt: None,
        total_coin_withdrawn: None,
        resource_used: consumed,
        resource_limit: budget,
        sender_addresses: senders.into_iter().collect(),
        recipient_addresses: None,
        deployed_contracts: None,
        contract_logs: None,
    })
}

#[cfg(test)]
mod tests {
    use chainboard::chain::Family;

    use super::*;

    fn sui() -> Blockchain {
        Blockchain {
            name: "sui".to_owned(),
            family: Family::Sui,
            start_block: 0,
            node_rpcs: vec![],
            coin: "SUI".to_owned(),
            eip1559: false,
            decimals: 18,
        }
    }

    fn transaction_block(
        sender: &str,
        budget: &str,
        price: &str,
        gas: (&str, &str, &str),
        changes: Value,
    ) -> Value {
        json!({
            "transaction": {"data": {"sender": sender, "gasData": {"budget": budget, "price": price}}},
            "effects": {"gasUsed": {
                "computationCost": gas.0,
                "storageCost": gas.1,
                "storageRebate": gas.2,
            }},
            "balanceChanges": changes,
        })
    }

    #[test]
    fn decodes_fees_transfers_and_gas() {
        let checkpoint: RawCheckpoint = serde_json::from_value(json!({
            "timestampMs": "1721217131000",
            "transactions": ["9tx1", "9tx2"],
        }))
        .unwrap();

        let blocks: Vec<RawTransactionBlock> = serde_json::from_value(json!([
            transaction_block(
                "0x00ABCDEF00000000000000000000000000000000000000000000000000000001",
                "10000000",
                "1000",
                ("1000000", "2000000", "500000"),
                json!([
                    // 1 SUI sent plus the 0.0025 SUI fee, leaving the sender.
                    {"coinType": SUI_COIN_TYPE, "amount": "-1002500000"},
                    // Inbound side of the transfer: ignored.
                    {"coinType": SUI_COIN_TYPE, "amount": "1000000000"},
                    // Some other coin: ignored.
                    {"coinType": "0xdead::usdc::USDC", "amount": "-999"},
                ]),
            ),
            transaction_block(
                ZERO_ADDRESS,
                "10000000",
                "1000",
                ("2000000", "1000000", "0"),
                json!([
                    // Only gas moved.
                    {"coinType": SUI_COIN_TYPE, "amount": "-3000000"},
                ]),
            ),
        ]))
        .unwrap();

        let record = decode_checkpoint(&sui(), 39_565_698, &checkpoint, &blocks).unwrap();

        assert_eq!(record.number, 39_565_698);
        assert_eq!(record.timestamp, 1_721_217_131);
        assert_eq!(record.transactions, 2, "counted from the checkpoint digest list");
        assert_eq!(record.total_fees_paid.as_deref(), Some("0.0055"));
        assert_eq!(
            record.total_coin_transfer, "1",
            "fees leaving senders are not transfer volume"
        );
        assert_eq!(record.resource_limit, 20_000_000, "summed gas budgets");
        assert_eq!(record.resource_used, 3_000, "computation cost over gas price per transaction");
        assert_eq!(
            record.sender_addresses,
            vec!["0x00abcdef00000000000000000000000000000000000000000000000000000001".to_owned()],
            "zero-address system sender is excluded, the rest lowercased"
        );
    }

    #[test]
    fn empty_checkpoint_decodes_to_zeroes() {
        let checkpoint: RawCheckpoint = serde_json::from_value(json!({
            "timestampMs": 1_721_217_000_000_u64,
            "transactions": [],
        }))
        .unwrap();

        let record = decode_checkpoint(&sui(), 1, &checkpoint, &[]).unwrap();
        assert_eq!(record.transactions, 0);
        assert_eq!(record.total_coin_transfer, "0");
        assert_eq!(record.total_fees_paid.as_deref(), Some("0"));
        assert_eq!(record.resource_limit, 0);
    }

    #[test]
    fn garbage_balance_amount_is_a_decode_error() {
        let checkpoint: RawCheckpoint = serde_json::from_value(json!({
            "timestampMs": "1721217131000",
            "transactions": ["9tx1"],
        }))
        .unwrap();
        let blocks: Vec<RawTransactionBlock> = serde_json::from_value(json!([
            transaction_block(
                "0x00ABCDEF00000000000000000000000000000000000000000000000000000001",
                "100",
                "1",
                ("1", "1", "0"),
                json!([{"coinType": SUI_COIN_TYPE, "amount": "12.5"}]),
            ),
        ]))
        .unwrap();

        assert!(decode_checkpoint(&sui(), 2, &checkpoint, &blocks).is_err());
    }
}
