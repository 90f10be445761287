//! Account-based EVM chain adapter.
//!
//! Blocks are fetched with full transaction objects plus that block's event
//! logs. Zero-gas-price transactions (L2 system transactions) are skipped
//! entirely when accumulating volume and address sets. A transaction
//! deploys a contract iff it has no recipient and a non-empty input. On
//! EIP-1559 chains the burnt coin is `baseFeePerGas × gasUsed`.

use std::collections::BTreeSet;

use alloy::primitives::{Address, B256, U64, U256};
use bigdecimal::{BigDecimal, Zero};
use chainboard::chain::Blockchain;
use chainboard::record::{BlockRecord, ContractLog};
use chainboard::units;
use serde::Deserialize;
use serde_json::json;

use crate::adapter::{ChainAdapter, FetchError, decode};
use crate::rpc::{AttemptError, DecodeError, RpcClient, rotate};

/// Adapter for EVM-family chains.
#[derive(Debug)]
pub struct EvmAdapter {
    chain: Blockchain,
    rpc: RpcClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    number: U64,
    timestamp: U64,
    gas_used: U64,
    gas_limit: U64,
    #[serde(default)]
    base_fee_per_gas: Option<U256>,
    transactions: Vec<RawTransaction>,
    #[serde(default)]
    withdrawals: Option<Vec<RawWithdrawal>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    value: U256,
    #[serde(default)]
    gas_price: Option<U256>,
    #[serde(default)]
    input: String,
}

#[derive(Debug, Deserialize)]
struct RawWithdrawal {
    /// Withdrawn amount in gwei.
    amount: U64,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
}

impl EvmAdapter {
    /// Build an adapter for one EVM chain descriptor.
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

impl ChainAdapter for EvmAdapter {
    fn chain(&self) -> &Blockchain {
        &self.chain
    }

    fn service(&self) -> &'static str {
        "chain.evm"
    }

    async fn latest_height(&self) -> u64 {
        let result = rotate(
            self.service(),
            &self.chain.name,
            &self.chain.node_rpcs,
            async |rpc| {
                let height = self.rpc.call(rpc, "eth_blockNumber", json!([])).await?;
                serde_json::from_value::<U64>(height)
                    .map(|quantity| quantity.to::<u64>())
                    .map_err(|error| AttemptError::Transport(error.to_string()))
            },
        )
        .await;

        result.unwrap_or(0)
    }

    async fn block_data(&self, number: u64) -> Result<BlockRecord, FetchError> {
        let tag = format!("0x{number:x}");
        let record = rotate(
            self.service(),
            &self.chain.name,
            &self.chain.node_rpcs,
            async |rpc| {
                let block: RawBlock = decode(
                    "block",
                    self.rpc
                        .call(rpc, "eth_getBlockByNumber", json!([&tag, true]))
                        .await?,
                )?;
                let logs: Vec<RawLog> = decode(
                    "logs",
                    self.rpc
                        .call(rpc, "eth_getLogs", json!([{"fromBlock": &tag, "toBlock": &tag}]))
                        .await?,
                )?;
                Ok(decode_block(&self.chain, &block, &logs)?)
            },
        )
        .await?;

        Ok(record)
    }
}

/// True when a recipient-less transaction actually carries deployment code.
fn is_deploy_input(input: &str) -> bool {
    !(input.is_empty() || input == "0x" || input == "0x0")
}

fn amount(what: &'static str, digits: &str, scale: i64) -> Result<BigDecimal, DecodeError> {
    units::from_base_units(digits, scale).map_err(|error| DecodeError {
        what,
        message: error.to_string(),
    })
}

fn decode_block(
    chain: &Blockchain,
    block: &RawBlock,
    logs: &[RawLog],
) -> Result<BlockRecord, DecodeError> {
    let decimals = i64::from(chain.decimals);

    let mut transfer = BigDecimal::zero();
    let mut senders = BTreeSet::new();
    let mut recipients = BTreeSet::new();
    let mut deployed = 0_u64;

    for transaction in &block.transactions {
        if transaction.gas_price == Some(U256::ZERO) {
            // Layer-2 system transaction.
            continue;
        }

        senders.insert(format!("{:#x}", transaction.from));
        if let Some(to) = transaction.to {
            recipients.insert(format!("{to:#x}"));
        } else if is_deploy_input(&transaction.input) {
            deployed += 1;
        }

        transfer += amount("transaction value", &transaction.value.to_string(), decimals)?;
    }

    let burnt = if chain.eip1559 {
        let wei = block.base_fee_per_gas.map_or(U256::ZERO, |base_fee| {
            base_fee * U256::from(block.gas_used.to::<u64>())
        });
        Some(units::to_plain_string(&amount("base fee", &wei.to_string(), decimals)?))
    } else {
        None
    };

    let withdrawn = match &block.withdrawals {
        Some(withdrawals) => {
            let gwei: u128 = withdrawals
                .iter()
                .map(|withdrawal| u128::from(withdrawal.amount.to::<u64>()))
                .sum();
            Some(units::to_plain_string(&units::scaled(gwei, 9)))
        }
        None => None,
    };

    let contract_logs = logs
        .iter()
        .map(|log| ContractLog {
            address: format!("{:#x}", log.address),
            signature: log.topics.first().map(|topic| format!("{topic:#x}")).unwrap_or_default(),
        })
        .collect();

    Ok(BlockRecord {
        chain: chain.name.clone(),
        family: chain.family,
        number: block.number.to::<u64>(),
        timestamp: block.timestamp.to::<u64>(),
        transactions: block.transactions.len() as u64,
        total_coin_transfer: units::to_plain_string(&transfer),
        total_fees_paid: None,
        total_coin_burnt: burnt,
        total_coin_withdrawn: withdrawn,
        resource_used: block.gas_used.to::<u64>(),
        resource_limit: block.gas_limit.to::<u64>(),
        sender_addresses: senders.into_iter().collect(),
        recipient_addresses: Some(recipients.into_iter().collect()),
        deployed_contracts: Some(deployed),
        contract_logs: Some(contract_logs),
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chainboard::chain::Family;
    use serde_json::Value;

    use super::*;

    fn mainnet() -> Blockchain {
        Blockchain {
            name: "ethereum".to_owned(),
            family: Family::Evm,
            start_block: 0,
            node_rpcs: vec![],
            coin: "ETH".to_owned(),
            eip1559: true,
            decimals: 18,
        }
    }

    fn quantity(value: u128) -> String {
        format!("0x{value:x}")
    }

    fn tx(from: &str, to: Option<&str>, value_wei: &str, gas_price_wei: u64, input: &str) -> Value {
        json!({
            "from": from,
            "to": to,
            "value": format!("{:#x}", U256::from_str(value_wei).unwrap()),
            "gasPrice": quantity(u128::from(gas_price_wei)),
            "input": input,
        })
    }

    fn parse_block(value: Value) -> RawBlock {
        serde_json::from_value(value).unwrap()
    }

    /// Ethereum block 20324875: 173 transactions moving
    /// 118.589464196681790992 ETH, burning 0.121615809895338528 ETH.
    #[test]
    fn decodes_mainnet_block_20324875() {
        let deployer = "0xAAaA000000000000000000000000000000000001";
        let sender = "0x00000000000000000000000000000000000000b2";
        let recipient = "0x00000000000000000000000000000000000000d4";

        // One deployment moving the bulk, 172 one-wei transfers.
        let mut transactions = vec![tx(deployer, None, "118589464196681790820", 7_166_245_168, "0x60806040")];
        for _ in 0..172 {
            transactions.push(tx(sender, Some(recipient), "1", 7_166_245_168, "0x"));
        }

        let block = parse_block(json!({
            "number": quantity(20_324_875),
            "timestamp": quantity(1_721_202_755),
            "gasUsed": quantity(16_970_646),
            "gasLimit": quantity(30_000_000),
            "baseFeePerGas": quantity(7_166_245_168),
            "transactions": transactions,
        }));

        let record = decode_block(&mainnet(), &block, &[]).unwrap();

        assert_eq!(record.chain, "ethereum");
        assert_eq!(record.family, Family::Evm);
        assert_eq!(record.number, 20_324_875);
        assert_eq!(record.timestamp, 1_721_202_755);
        assert_eq!(record.transactions, 173);
        assert_eq!(record.total_coin_transfer, "118.589464196681790992");
        assert_eq!(record.total_coin_burnt.as_deref(), Some("0.121615809895338528"));
        assert_eq!(record.resource_used, 16_970_646);
        assert_eq!(record.resource_limit, 30_000_000);
        assert_eq!(record.deployed_contracts, Some(1));
        assert_eq!(
            record.sender_addresses,
            vec![
                "0x00000000000000000000000000000000000000b2".to_owned(),
                "0xaaaa000000000000000000000000000000000001".to_owned(),
            ],
            "senders are deduplicated and lowercased"
        );
        assert_eq!(
            record.recipient_addresses.as_deref(),
            Some(&["0x00000000000000000000000000000000000000d4".to_owned()][..])
        );
    }

    #[test]
    fn zero_gas_price_transactions_are_skipped() {
        let block = parse_block(json!({
            "number": quantity(5),
            "timestamp": quantity(1_700_000_000),
            "gasUsed": quantity(50_000),
            "gasLimit": quantity(30_000_000),
            "transactions": [
                tx("0x00000000000000000000000000000000000000a1", Some("0x00000000000000000000000000000000000000d4"), "2000000000000000000", 1_000_000_000, "0x"),
                // System transaction: huge value, zero gas price.
                tx("0x00000000000000000000000000000000000000ff", None, "999000000000000000000", 0, "0xdeadbeef"),
            ],
        }));

        let chain = Blockchain { eip1559: false, ..mainnet() };
        let record = decode_block(&chain, &block, &[]).unwrap();

        assert_eq!(record.transactions, 2, "system transactions still count in the total");
        assert_eq!(record.total_coin_transfer, "2", "their value does not");
        assert_eq!(record.sender_addresses.len(), 1, "their sender is not tracked");
        assert_eq!(record.deployed_contracts, Some(0), "their deployments are not tracked");
        assert_eq!(record.total_coin_burnt, None, "non-eip1559 chains burn nothing");
    }

    #[test]
    fn plain_transfers_are_not_deployments() {
        let block = parse_block(json!({
            "number": quantity(6),
            "timestamp": quantity(1_700_000_100),
            "gasUsed": quantity(21_000),
            "gasLimit": quantity(30_000_000),
            "transactions": [
                tx("0x00000000000000000000000000000000000000a1", None, "0", 1_000_000_000, "0x"),
                tx("0x00000000000000000000000000000000000000a1", None, "0", 1_000_000_000, "0x60"),
            ],
        }));

        let record = decode_block(&mainnet(), &block, &[]).unwrap();
        assert_eq!(record.deployed_contracts, Some(1), "empty input is not a deployment");
    }

    #[test]
    fn withdrawals_sum_in_gwei() {
        let block = parse_block(json!({
            "number": quantity(7),
            "timestamp": quantity(1_700_000_200),
            "gasUsed": quantity(0),
            "gasLimit": quantity(30_000_000),
            "transactions": [],
            "withdrawals": [
                {"amount": quantity(1_000_000_000)},
                {"amount": quantity(1)},
            ],
        }));

        let record = decode_block(&mainnet(), &block, &[]).unwrap();
        assert_eq!(record.total_coin_withdrawn.as_deref(), Some("1.000000001"));
        assert_eq!(record.total_coin_burnt.as_deref(), Some("0"), "eip1559 chain without a base fee burns zero");
    }

    #[test]
    fn logs_become_contract_summaries() {
        let block = parse_block(json!({
            "number": quantity(8),
            "timestamp": quantity(1_700_000_300),
            "gasUsed": quantity(0),
            "gasLimit": quantity(30_000_000),
            "transactions": [],
        }));
        let logs: Vec<RawLog> = serde_json::from_value(json!([
            {
                "address": "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
                "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            },
            {"address": "0x00000000000000000000000000000000000000e5", "topics": []},
        ]))
        .unwrap();

        let record = decode_block(&mainnet(), &block, &logs).unwrap();
        let summaries = record.contract_logs.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].address, "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        assert_eq!(
            summaries[0].signature,
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
        assert_eq!(summaries[1].signature, "", "anonymous events have no signature");
    }
}
