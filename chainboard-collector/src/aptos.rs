//! Aptos chain adapter.
//!
//! Aptos nodes expose a REST API rather than JSON-RPC: the ledger info at
//! `/v1` carries the current block height, and blocks are fetched by height
//! with their transactions inlined. Utilization is measured against a fixed
//! per-transaction max-gas ceiling times the transaction count.

use std::collections::BTreeSet;

use chainboard::chain::Blockchain;
use chainboard::record::BlockRecord;
use chainboard::units;
use serde::Deserialize;

use crate::adapter::{ChainAdapter, FetchError, decode, opt_u64_from_string_or_number, u64_from_string_or_number};
use crate::rpc::{RpcClient, rotate};

/// Max gas units a single Aptos transaction may consume.
const TRANSACTION_MAX_GAS: u64 = 2_000_000;

/// Fee scale used for stored amounts.
const FEE_SCALE: i64 = 9;

/// Adapter for Aptos.
#[derive(Debug)]
pub struct AptosAdapter {
    chain: Blockchain,
    rpc: RpcClient,
}

#[derive(Debug, Deserialize)]
struct RawLedger {
    #[serde(deserialize_with = "u64_from_string_or_number")]
    block_height: u64,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    /// Block timestamp in microseconds.
    #[serde(deserialize_with = "u64_from_string_or_number")]
    block_timestamp: u64,
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    #[serde(default)]
    sender: Option<String>,
    #[serde(default, deserialize_with = "opt_u64_from_string_or_number")]
    gas_used: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64_from_string_or_number")]
    gas_unit_price: Option<u64>,
}

impl AptosAdapter {
    /// Build an adapter for one Aptos chain descriptor.
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

impl ChainAdapter for AptosAdapter {
    fn chain(&self) -> &Blockchain {
        &self.chain
    }

    fn service(&self) -> &'static str {
        "chain.aptos"
    }

    async fn latest_height(&self) -> u64 {
        let result = rotate(
            self.service(),
            &self.chain.name,
            &self.chain.node_rpcs,
            async |rpc| {
                let ledger = self.rpc.get(&format!("{rpc}/v1")).await?;
                Ok(decode::<RawLedger>("ledger info", ledger)?.block_height)
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
                let url = format!("{rpc}/v1/blocks/by_height/{number}?with_transactions=true");
                let block: RawBlock = decode("block", self.rpc.get(&url).await?)?;
                Ok(decode_block(&self.chain, number, &block))
            },
        )
        .await?;

        Ok(record)
    }
}

fn decode_block(chain: &Blockchain, number: u64, block: &RawBlock) -> BlockRecord {
    let mut fees: u128 = 0;
    let mut gas_used: u64 = 0;
    let mut senders = BTreeSet::new();

    for transaction in &block.transactions {
        if let Some(sender) = &transaction.sender {
            senders.insert(sender.to_lowercase());
        }

        if let (Some(gas), Some(price)) = (transaction.gas_used, transaction.gas_unit_price) {
            fees += u128::from(gas) * u128::from(price);
        }

        gas_used += transaction.gas_used.unwrap_or(0);
    }

    BlockRecord {
        chain: chain.name.clone(),
        family: chain.family,
        number,
        timestamp: block.block_timestamp / 1_000_000,
        transactions: block.transactions.len() as u64,
        total_coin_transfer: "0".to_owned(),
        total_fees_paid: Some(units::to_plain_string(&units::scaled(fees, FEE_SCALE))),
        total_coin_burnt: None,
        total_coin_withdrawn: None,
        resource_used: gas_used,
        resource_limit: TRANSACTION_MAX_GAS * block.transactions.len() as u64,
        sender_addresses: senders.into_iter().collect(),
        recipient_addresses: None,
        deployed_contracts: None,
        contract_logs: None,
    }
}

#[cfg(test)]
mod tests {
    use chainboard::chain::Family;
    use serde_json::json;

    use super::*;

    fn aptos() -> Blockchain {
        Blockchain {
            name: "aptos".to_owned(),
            family: Family::Aptos,
            start_block: 0,
            node_rpcs: vec![],
            coin: "APT".to_owned(),
            eip1559: false,
            decimals: 18,
        }
    }

    #[test]
    fn decodes_fees_gas_and_senders() {
        let block: RawBlock = serde_json::from_value(json!({
            "block_height": "203259724",
            "block_timestamp": "1721316230123456",
            "transactions": [
                // Block metadata transaction: no sender, no gas price.
                {"type": "block_metadata_transaction"},
                {"sender": "0xAB00000000000000000000000000000000000000000000000000000000000001", "gas_used": "10", "gas_unit_price": "100"},
                {"sender": "0xab00000000000000000000000000000000000000000000000000000000000001", "gas_used": "490", "gas_unit_price": "100"},
            ],
        }))
        .unwrap();

        let record = decode_block(&aptos(), 203_259_724, &block);

        assert_eq!(record.number, 203_259_724);
        assert_eq!(record.timestamp, 1_721_316_230, "microseconds truncate to seconds");
        assert_eq!(record.transactions, 3);
        assert_eq!(record.total_fees_paid.as_deref(), Some("0.00005"));
        assert_eq!(record.resource_used, 500);
        assert_eq!(
            record.resource_limit,
            3 * TRANSACTION_MAX_GAS,
            "ceiling is per-transaction max gas times transaction count"
        );
        assert_eq!(
            record.sender_addresses,
            vec!["0xab00000000000000000000000000000000000000000000000000000000000001".to_owned()],
            "senders are lowercased and deduplicated; senderless transactions skipped"
        );
    }

    #[test]
    fn empty_block_is_all_zero() {
        let block: RawBlock = serde_json::from_value(json!({
            "block_timestamp": 0,
            "transactions": [],
        }))
        .unwrap();

        let record = decode_block(&aptos(), 1, &block);
        assert_eq!(record.resource_limit, 0);
        assert_eq!(record.total_fees_paid.as_deref(), Some("0"));
    }
}
