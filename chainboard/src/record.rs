//! Normalized record shapes written to storage.
//!
//! One [`BlockRecord`] exists per `(chain, number)` pair; it is created once
//! and only ever replaced wholesale by an explicit forced re-collection.
//! [`Checkpoint`] rows advance monotonically per chain. All records
//! serialize camelCase — that is the stored document shape.
//!
//! Coin amounts are carried as plain decimal strings produced by
//! [`crate::units`]; they are never floats at any point of their life.

use serde::{Deserialize, Serialize};

use crate::chain::Family;

/// A single decoded block, normalized across chain families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    /// Chain name this block belongs to.
    pub chain: String,

    /// Protocol family the block was decoded with.
    pub family: Family,

    /// Block number (slot for Solana, checkpoint sequence for Sui).
    pub number: u64,

    /// Block unix timestamp in seconds.
    pub timestamp: u64,

    /// Number of transactions in the block.
    pub transactions: u64,

    /// Native coin volume moved, as an exact decimal string.
    pub total_coin_transfer: String,

    /// Total transaction fees paid (Solana, Sui, Aptos).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_fees_paid: Option<String>,

    /// Native coin burnt via base fees (EIP-1559 EVM chains).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_coin_burnt: Option<String>,

    /// Coin withdrawn from ETH2 staking (post-Shanghai EVM blocks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_coin_withdrawn: Option<String>,

    /// Throughput consumed: gas on EVM, compute units on Solana/Sui,
    /// gas units on Aptos.
    pub resource_used: u64,

    /// Throughput ceiling the block was filled against.
    pub resource_limit: u64,

    /// Unique transaction senders, lowercased on hex-address chains.
    pub sender_addresses: Vec<String>,

    /// Unique transaction recipients (EVM only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_addresses: Option<Vec<String>>,

    /// Contracts deployed in this block (EVM only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_contracts: Option<u64>,

    /// Event logs emitted in this block (EVM only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_logs: Option<Vec<ContractLog>>,
}

/// Minimal summary of one emitted event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractLog {
    /// Emitting contract address, lowercased.
    pub address: String,

    /// Topic-0 event signature, empty for anonymous events.
    pub signature: String,
}

/// Durable per-chain sync progress.
///
/// Written only after the corresponding block record write succeeded, so a
/// crash between the two re-fetches that block instead of skipping it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Storage key, `state-<chain>`.
    pub name: String,

    /// Last block whose record write was durably committed.
    pub block_number: u64,
}

impl Checkpoint {
    /// Storage key for a chain's checkpoint row.
    #[must_use]
    pub fn key(chain: &str) -> String {
        format!("state-{chain}")
    }
}

/// Rolling-window statistics for one chain, recomputed from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainAggregate {
    /// Chain name.
    pub chain: String,

    /// Protocol family.
    pub family: Family,

    /// Unix timestamp of the window's trailing edge.
    pub window_end_timestamp: u64,

    /// Blocks observed inside the window.
    pub blocks: u64,

    /// Transactions summed across the window.
    pub transactions: u64,

    /// Distinct sender addresses across the window.
    pub unique_from_addresses: u64,

    /// Distinct recipient addresses across the window.
    pub unique_to_addresses: u64,

    /// Native coin volume moved across the window, exact decimal string.
    pub total_coin_transfer: String,

    /// Contracts deployed across the window.
    pub deployed_contracts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_record() -> BlockRecord {
        BlockRecord {
            chain: "ethereum".to_owned(),
            family: Family::Evm,
            number: 7,
            timestamp: 1_721_202_755,
            transactions: 2,
            total_coin_transfer: "1.5".to_owned(),
            total_fees_paid: None,
            total_coin_burnt: None,
            total_coin_withdrawn: None,
            resource_used: 21_000,
            resource_limit: 30_000_000,
            sender_addresses: vec!["0xaa".to_owned()],
            recipient_addresses: None,
            deployed_contracts: None,
            contract_logs: None,
        }
    }

    #[test]
    fn document_shape_is_camel_case() {
        let doc = serde_json::to_value(minimal_record()).unwrap();
        assert_eq!(doc["totalCoinTransfer"], "1.5");
        assert_eq!(doc["resourceLimit"], 30_000_000);
        assert_eq!(doc["senderAddresses"][0], "0xaa");
    }

    #[test]
    fn absent_family_fields_are_omitted() {
        let doc = serde_json::to_value(minimal_record()).unwrap();
        let object = doc.as_object().unwrap();
        assert!(!object.contains_key("totalCoinBurnt"));
        assert!(!object.contains_key("totalFeesPaid"));
        assert!(!object.contains_key("contractLogs"));
    }

    #[test]
    fn record_round_trips_through_document() {
        let record = minimal_record();
        let doc = serde_json::to_value(&record).unwrap();
        let back: BlockRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn checkpoint_key_is_chain_scoped() {
        assert_eq!(Checkpoint::key("ethereum"), "state-ethereum");
    }
}
