/// Configuration module
///
/// Layered configuration: built-in defaults, then an optional
/// `config.{yaml,toml,json}` file, then environment variables with the
/// `YAM` prefix (double underscore for nesting, e.g.
/// `YAM__CONTRACT__GENESIS_BLOCK=25530394`). Invalid or missing required
/// configuration is fatal at startup.
use crate::error::{Result, YamError};
use crate::events::{YAM_CONTRACT_ADDRESS, YAM_GENESIS_BLOCK};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Filesystem path of the SQLite store
    pub db_path: String,

    /// Ordered RPC endpoints; the pool rotates through them
    pub w3_urls: Vec<String>,

    /// GraphQL endpoint of the hosted YAM subgraph
    pub subgraph_url: String,

    /// The Graph API key (Bearer auth)
    pub the_graph_api_key: String,

    /// RealTokens community catalogue API
    pub realtokens_api_url: String,

    /// Port of the report service (served by a separate process)
    pub api_port: u16,

    /// Contract reference file: symbolic token name → {address, decimals}
    pub tokens_file: String,

    /// The marketplace contract being indexed
    pub contract: ContractConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Contract address (hex string with 0x prefix)
    pub address: String,

    /// Block the contract was deployed in; indexing starts here on a
    /// fresh database
    pub genesis_block: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "./yam.db".to_string(),
            w3_urls: vec![
                "https://rpc.gnosischain.com".to_string(),
                "https://rpc.ankr.com/gnosis".to_string(),
                "https://gnosis-mainnet.public.blastapi.io".to_string(),
            ],
            // Subgraph endpoint and key are deployment-specific; both
            // must be provided via file or environment.
            subgraph_url: String::new(),
            the_graph_api_key: String::new(),
            realtokens_api_url: "https://api.realtoken.community/v1/token".to_string(),
            api_port: 5000,
            tokens_file: "resources/tokens.json".to_string(),
            contract: ContractConfig {
                address: YAM_CONTRACT_ADDRESS.to_string(),
                genesis_block: YAM_GENESIS_BLOCK,
            },
        }
    }
}

impl AppConfig {
    /// Load from the default search path (`./config.*`), overridable by
    /// `YAM`-prefixed environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_optional_file(None)
    }

    /// Load from a specific file (must exist)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_from_optional_file(Some(path.as_ref()))
    }

    fn load_from_optional_file(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&AppConfig::default()).map_err(|e| YamError::Config(e.to_string()))?,
        );

        if let Some(config_path) = path {
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("YAM")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| YamError::Config(e.to_string()))
    }

    /// Validate the configuration; the caller treats an error as fatal
    pub fn validate(&self) -> Result<()> {
        if self.db_path.is_empty() {
            return Err(YamError::Config("db_path cannot be empty".to_string()));
        }

        if self.w3_urls.is_empty() {
            return Err(YamError::Config(
                "At least one RPC endpoint is required in w3_urls".to_string(),
            ));
        }

        for url in &self.w3_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(YamError::Config(format!(
                    "Invalid RPC URL '{url}': must start with http:// or https://"
                )));
            }
        }

        if self.subgraph_url.is_empty() {
            return Err(YamError::Config(
                "subgraph_url must be set (file or YAM__SUBGRAPH_URL)".to_string(),
            ));
        }

        if !self.subgraph_url.starts_with("http://") && !self.subgraph_url.starts_with("https://") {
            return Err(YamError::Config(format!(
                "Invalid subgraph URL '{}': must start with http:// or https://",
                self.subgraph_url
            )));
        }

        validate_address(&self.contract.address)?;

        if self.contract.genesis_block == 0 {
            return Err(YamError::Config(
                "contract.genesis_block must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_address(address: &str) -> Result<()> {
    if !address.starts_with("0x") {
        return Err(YamError::Config(format!(
            "Contract address '{address}' must start with 0x"
        )));
    }

    if address.len() != 42 {
        return Err(YamError::Config(format!(
            "Contract address '{address}' must be 42 characters (0x + 40 hex digits)"
        )));
    }

    if !address[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(YamError::Config(format!(
            "Contract address '{address}' contains non-hex characters"
        )));
    }

    Ok(())
}
