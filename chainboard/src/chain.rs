//! Blockchain families and per-chain descriptors.
//!
//! A [`Blockchain`] descriptor is read-only process-wide configuration: it is
//! loaded once at startup and handed by reference to every component that
//! needs it. The [`Family`] tag selects the decode rules a collector applies
//! to that chain's blocks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The protocol category a chain belongs to.
///
/// The family determines which node API is spoken and how a raw block is
/// decoded into a [`crate::record::BlockRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Account-based EVM chains (Ethereum and compatible L1s/L2s).
    Evm,
    /// Solana.
    Solana,
    /// Sui (blocks are checkpoints).
    Sui,
    /// Aptos (REST node API).
    Aptos,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Evm => "evm",
            Self::Solana => "solana",
            Self::Sui => "sui",
            Self::Aptos => "aptos",
        };
        f.pad(name)
    }
}

/// Operational description of a single chain to collect.
///
/// Immutable after configuration load. `node_rpcs` is an ordered endpoint
/// list, best first; the collector rotates through it on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blockchain {
    /// Chain name, e.g. `ethereum`. Filled from the configuration map key.
    #[serde(default)]
    pub name: String,

    /// Protocol family selecting the decode rules.
    pub family: Family,

    /// First block to collect when no checkpoint exists yet.
    pub start_block: u64,

    /// Ordered list of node endpoint URLs (best first).
    pub node_rpcs: Vec<String>,

    /// Native coin symbol, e.g. `ETH`.
    #[serde(default)]
    pub coin: String,

    /// Whether the chain burns base fees per EIP-1559 (EVM only).
    #[serde(default)]
    pub eip1559: bool,

    /// Native coin decimal precision (EVM only, defaults to 18).
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

const fn default_decimals() -> u32 {
    18
}
