//! The chain adapter capability surface and family dispatch.
//!
//! Every family adapter implements [`ChainAdapter`]; the collector loop is
//! written against that trait and composes with any implementation.
//! [`FamilyAdapter`] is the closed set of real variants, one per protocol
//! family.

use chainboard::chain::{Blockchain, Family};
use chainboard::record::BlockRecord;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::aptos::AptosAdapter;
use crate::evm::EvmAdapter;
use crate::rpc::{DecodeError, RotateError};
use crate::solana::SolanaAdapter;
use crate::sui::SuiAdapter;

/// Why a block could not be turned into a record.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every configured endpoint failed for this block.
    #[error("all rpc endpoints failed")]
    EndpointsExhausted,

    /// A node answered with a payload of the wrong shape. This is a defect,
    /// not a transient condition, and is surfaced instead of retried.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<RotateError> for FetchError {
    fn from(error: RotateError) -> Self {
        match error {
            RotateError::Exhausted => Self::EndpointsExhausted,
            RotateError::Decode(decode) => Self::Decode(decode),
        }
    }
}

/// One chain's fetch-and-decode capability.
///
/// Implementations hold no mutable state; their only side effects are
/// outbound node calls.
pub trait ChainAdapter {
    /// The immutable descriptor this adapter collects for.
    fn chain(&self) -> &Blockchain;

    /// Service tag used in structured logs, e.g. `chain.evm`.
    fn service(&self) -> &'static str;

    /// Current chain height from the first answering endpoint.
    ///
    /// Returns `0` as the "unknown" sentinel when every endpoint failed.
    async fn latest_height(&self) -> u64;

    /// Fetch and decode one block into the normalized record shape.
    ///
    /// # Errors
    ///
    /// [`FetchError::EndpointsExhausted`] only when **every** configured
    /// endpoint failed for this block; [`FetchError::Decode`] when a node
    /// answered with a malformed payload.
    async fn block_data(&self, number: u64) -> Result<BlockRecord, FetchError>;
}

/// Closed set of family adapters.
#[derive(Debug)]
pub enum FamilyAdapter {
    /// Account-based EVM chains.
    Evm(EvmAdapter),
    /// Solana.
    Solana(SolanaAdapter),
    /// Sui.
    Sui(SuiAdapter),
    /// Aptos.
    Aptos(AptosAdapter),
}

impl FamilyAdapter {
    /// Construct the adapter variant matching the descriptor's family.
    ///
    /// # Errors
    ///
    /// Propagates HTTP client construction failures.
    pub fn for_chain(chain: Blockchain) -> Result<Self, reqwest::Error> {
        Ok(match chain.family {
            Family::Evm => Self::Evm(EvmAdapter::new(chain)?),
            Family::Solana => Self::Solana(SolanaAdapter::new(chain)?),
            Family::Sui => Self::Sui(SuiAdapter::new(chain)?),
            Family::Aptos => Self::Aptos(AptosAdapter::new(chain)?),
        })
    }
}

impl ChainAdapter for FamilyAdapter {
    fn chain(&self) -> &Blockchain {
        match self {
            Self::Evm(adapter) => adapter.chain(),
            Self::Solana(adapter) => adapter.chain(),
            Self::Sui(adapter) => adapter.chain(),
            Self::Aptos(adapter) => adapter.chain(),
        }
    }

    fn service(&self) -> &'static str {
        match self {
            Self::Evm(adapter) => adapter.service(),
            Self::Solana(adapter) => adapter.service(),
            Self::Sui(adapter) => adapter.service(),
            Self::Aptos(adapter) => adapter.service(),
        }
    }

    async fn latest_height(&self) -> u64 {
        match self {
            Self::Evm(adapter) => adapter.latest_height().await,
            Self::Solana(adapter) => adapter.latest_height().await,
            Self::Sui(adapter) => adapter.latest_height().await,
            Self::Aptos(adapter) => adapter.latest_height().await,
        }
    }

    async fn block_data(&self, number: u64) -> Result<BlockRecord, FetchError> {
        match self {
            Self::Evm(adapter) => adapter.block_data(number).await,
            Self::Solana(adapter) => adapter.block_data(number).await,
            Self::Sui(adapter) => adapter.block_data(number).await,
            Self::Aptos(adapter) => adapter.block_data(number).await,
        }
    }
}

/// Deserialize a `u64` from either a JSON number or a JSON string.
///
/// Sui and Aptos nodes report most counters as decimal strings.
pub(crate) fn u64_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNum {
        Num(u64),
        Str(String),
    }
    match StringOrNum::deserialize(deserializer)? {
        StringOrNum::Num(n) => Ok(n),
        StringOrNum::Str(s) => s.parse::<u64>().map_err(serde::de::Error::custom),
    }
}

/// Optional variant of [`u64_from_string_or_number`].
pub(crate) fn opt_u64_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNum {
        Num(u64),
        Str(String),
    }
    match Option::<StringOrNum>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StringOrNum::Num(n)) => Ok(Some(n)),
        Some(StringOrNum::Str(s)) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Map a serde decode failure into the non-retriable decode error.
pub(crate) fn decode<T>(what: &'static str, value: serde_json::Value) -> Result<T, DecodeError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value).map_err(|error| DecodeError {
        what,
        message: error.to_string(),
    })
}
