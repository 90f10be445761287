//! Runtime configuration.
//!
//! One TOML file describes the storage location and every chain to collect.
//! It is parsed once at startup into an explicit [`Config`] passed by
//! reference into the components that need it; nothing reads configuration
//! ambiently. A broken configuration fails the process before any
//! collection starts.
//!
//! ```toml
//! [storage]
//! path = "chainboard.db"
//!
//! [chains.ethereum]
//! family = "evm"
//! start_block = 20324800
//! node_rpcs = ["https://ethereum-rpc.publicnode.com"]
//! coin = "ETH"
//! eip1559 = true
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chainboard::chain::Blockchain;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Where documents are persisted.
    pub storage: StorageConfig,

    /// Chains to collect, keyed by chain name.
    #[serde(default)]
    pub chains: HashMap<String, Blockchain>,
}

/// Storage location.
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path.
    pub path: PathBuf,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is missing, unparsable, or describes
    /// a chain without endpoints.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse and validate configuration from TOML text.
    ///
    /// Each descriptor's `name` is filled from its map key.
    ///
    /// # Errors
    ///
    /// Returns an error on unparsable TOML or a chain without endpoints.
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(text)?;
        for (name, chain) in &mut config.chains {
            chain.name = name.clone();
            if chain.node_rpcs.is_empty() {
                bail!("chain {name} has no node rpcs configured");
            }
        }
        Ok(config)
    }

    /// Look up one chain descriptor by name.
    #[must_use]
    pub fn chain(&self, name: &str) -> Option<&Blockchain> {
        self.chains.get(name)
    }

    /// All configured chain names, sorted for deterministic rounds.
    #[must_use]
    pub fn chain_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use chainboard::chain::Family;

    use super::*;

    const SAMPLE: &str = r#"
[storage]
path = "chainboard.db"

[chains.ethereum]
family = "evm"
start_block = 20324800
node_rpcs = ["https://ethereum-rpc.publicnode.com", "https://eth.llamarpc.com"]
coin = "ETH"
eip1559 = true

[chains.solana]
family = "solana"
start_block = 279000000
node_rpcs = ["https://api.mainnet-beta.solana.com"]
coin = "SOL"
"#;

    #[test]
    fn parses_and_names_chains() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.chain_names(), vec!["ethereum", "solana"]);

        let ethereum = config.chain("ethereum").unwrap();
        assert_eq!(ethereum.name, "ethereum", "name is injected from the map key");
        assert_eq!(ethereum.family, Family::Evm);
        assert!(ethereum.eip1559);
        assert_eq!(ethereum.node_rpcs.len(), 2);
        assert_eq!(ethereum.decimals, 18);

        let solana = config.chain("solana").unwrap();
        assert_eq!(solana.family, Family::Solana);
        assert!(!solana.eip1559);

        assert!(config.chain("sui").is_none());
    }

    #[test]
    fn rejects_a_chain_without_endpoints() {
        let result = Config::from_toml(
            r#"
[storage]
path = "chainboard.db"

[chains.empty]
family = "evm"
start_block = 1
node_rpcs = []
"#,
        );
        assert!(result.unwrap_err().to_string().contains("no node rpcs"));
    }

    #[test]
    fn rejects_unknown_families_and_missing_storage() {
        assert!(
            Config::from_toml(
                "[storage]\npath = \"x.db\"\n[chains.a]\nfamily = \"near\"\nstart_block = 1\nnode_rpcs = [\"u\"]"
            )
            .is_err(),
            "families form a closed set"
        );
        assert!(
            Config::from_toml("[chains.a]\nfamily = \"evm\"\nstart_block = 1\nnode_rpcs = [\"u\"]").is_err(),
            "the storage section is mandatory"
        );
    }
}
