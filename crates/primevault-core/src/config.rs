use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::aggregator::RouteOrder;
use crate::error::VaultError;
use crate::settlement::SettlementPolicy;
use crate::types::{ChainId, NATIVE_TOKEN};

/// Selects the profile defaults.
pub const ENVIRONMENT_VAR: &str = "PRIMEVAULT_ENV";
/// Optional path to a TOML/JSON/YAML override file.
pub const CONFIG_PATH_VAR: &str = "PRIMEVAULT_CONFIG";
/// Prefix of per-field overrides, e.g. `PRIMEVAULT__MAIN_CHAIN__RPC_URL`.
pub const OVERRIDE_PREFIX: &str = "PRIMEVAULT";

pub const BERACHAIN: ChainId = 80094;
pub const BERACHAIN_BEPOLIA: ChainId = 80069;
pub const LINEA: ChainId = 59144;
pub const ARBITRUM: ChainId = 42161;

const STAKING_LEDGER: Address = address!("c355894d819EADba7C70B3281fD7305198DcD90a");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Unknown or missing values fall back to development.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn from_env() -> Self {
        std::env::var(ENVIRONMENT_VAR)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub name: String,
    pub rpc_url: String,
    pub native_symbol: String,
    #[serde(default)]
    pub explorer_url: Option<String>,
}

impl ChainConfig {
    fn new(chain_id: ChainId, name: &str, rpc_url: &str, native_symbol: &str) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            rpc_url: rpc_url.to_string(),
            native_symbol: native_symbol.to_string(),
            explorer_url: None,
        }
    }

    fn with_explorer(mut self, url: &str) -> Self {
        self.explorer_url = Some(url.to_string());
        self
    }
}

/// Canonical asset of one staking pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolToken {
    pub pool_id: u32,
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeExecutorEntry {
    pub chain_id: ChainId,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub integrator: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub order: RouteOrder,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://li.quest/v1".to_string(),
            integrator: "prime-vault-testnet".to_string(),
            api_key: None,
            order: RouteOrder::Fastest,
            max_steps: default_max_steps(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            deadline_secs: None,
        }
    }
}

impl SettlementConfig {
    pub fn policy(&self) -> SettlementPolicy {
        SettlementPolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_attempts,
            deadline: self.deadline_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub environment: Environment,
    pub main_chain: ChainConfig,
    pub staking_address: Address,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub bridge_executors: Vec<BridgeExecutorEntry>,
    /// Source chains offered for deposits besides the main chain.
    #[serde(default)]
    pub allowed_chains: Vec<ChainConfig>,
    #[serde(default)]
    pub pools: Vec<PoolToken>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

impl VaultConfig {
    /// Built-in defaults for a deployment profile.
    pub fn for_environment(environment: Environment) -> Self {
        let main_chain = match environment {
            Environment::Production => {
                ChainConfig::new(BERACHAIN, "Berachain", "https://rpc.berachain.com/", "BERA")
                    .with_explorer("https://berascan.com")
            }
            Environment::Development | Environment::Staging => ChainConfig::new(
                BERACHAIN_BEPOLIA,
                "Berachain Bepolia",
                "https://bepolia.rpc.berachain.com/",
                "BERA",
            )
            .with_explorer("https://testnet.berascan.com"),
        };

        Self {
            environment,
            main_chain,
            staking_address: STAKING_LEDGER,
            aggregator: AggregatorConfig::default(),
            settlement: SettlementConfig::default(),
            bridge_executors: vec![
                BridgeExecutorEntry {
                    chain_id: LINEA,
                    address: address!("938A8D9F029176FdD92d0451FDbF0F25e0110aA0"),
                },
                BridgeExecutorEntry {
                    chain_id: ARBITRUM,
                    address: address!("9e48cCA2102e083E3471c661e11D35E15abf471E"),
                },
            ],
            allowed_chains: vec![
                ChainConfig::new(LINEA, "Linea", "https://rpc.linea.build", "ETH"),
                ChainConfig::new(ARBITRUM, "Arbitrum One", "https://arb1.arbitrum.io/rpc", "ETH"),
            ],
            pools: default_pools(),
        }
    }

    /// Profile defaults, then the optional file, then `PRIMEVAULT__*` variables.
    pub fn load(environment: Environment, path: Option<&Path>) -> Result<Self, VaultError> {
        let defaults = Self::for_environment(environment);
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults).map_err(config_error)?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(OVERRIDE_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reads `PRIMEVAULT_ENV` and `PRIMEVAULT_CONFIG`, then loads.
    pub fn from_env() -> Result<Self, VaultError> {
        let path = std::env::var(CONFIG_PATH_VAR).ok();
        Self::load(Environment::from_env(), path.as_deref().map(Path::new))
    }

    pub fn validate(&self) -> Result<(), VaultError> {
        if self.main_chain.chain_id == 0 {
            return Err(VaultError::Config("main chain id must be set".to_string()));
        }
        if self.staking_address == Address::ZERO {
            return Err(VaultError::Config(
                "staking ledger address must be set".to_string(),
            ));
        }
        if self.settlement.poll_interval_secs == 0 || self.settlement.max_attempts == 0 {
            return Err(VaultError::Config(
                "settlement polling needs a non-zero interval and attempt count".to_string(),
            ));
        }
        if let Some(entry) = self
            .bridge_executors
            .iter()
            .find(|entry| entry.chain_id == self.main_chain.chain_id)
        {
            return Err(VaultError::Config(format!(
                "bridge executor {} is registered on the main chain",
                entry.address
            )));
        }
        let mut pool_ids: Vec<_> = self.pools.iter().map(|pool| pool.pool_id).collect();
        pool_ids.sort_unstable();
        if pool_ids.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(VaultError::Config("duplicate pool id".to_string()));
        }
        Ok(())
    }

    pub fn main_chain_id(&self) -> ChainId {
        self.main_chain.chain_id
    }

    pub fn pool(&self, pool_id: u32) -> Option<&PoolToken> {
        self.pools.iter().find(|pool| pool.pool_id == pool_id)
    }

    pub fn bridge_executor(&self, chain_id: ChainId) -> Option<Address> {
        self.bridge_executors
            .iter()
            .find(|entry| entry.chain_id == chain_id)
            .map(|entry| entry.address)
    }

    pub fn executors(&self) -> BTreeMap<ChainId, Address> {
        self.bridge_executors
            .iter()
            .map(|entry| (entry.chain_id, entry.address))
            .collect()
    }

    pub fn is_supported_source(&self, chain_id: ChainId) -> bool {
        chain_id == self.main_chain.chain_id
            || self
                .allowed_chains
                .iter()
                .any(|chain| chain.chain_id == chain_id)
    }
}

fn default_pools() -> Vec<PoolToken> {
    let pool = |pool_id, symbol: &str, address, decimals| PoolToken {
        pool_id,
        symbol: symbol.to_string(),
        address,
        decimals,
    };
    vec![
        pool(1, "BERA", NATIVE_TOKEN, 18),
        pool(2, "USDC.e", address!("549943e04f40284185054145c6E4e9568C1D3241"), 6),
        pool(3, "WBTC", address!("0555E30da8f98308EdB960aa94C0Db47230d2B9c"), 8),
        pool(4, "WETH", address!("2f6f07cdcf3588944bf4c42ac74ff24bf56e7590"), 18),
    ]
}

fn config_error(err: config::ConfigError) -> VaultError {
    VaultError::Config(err.to_string())
}

fn default_max_steps() -> usize {
    1
}

fn default_request_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    360
}
