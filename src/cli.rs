use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use crate::{
    catalog::TokenCatalog,
    config::AppConfig,
    indexer::Indexer,
    rpc::RpcPool,
    store::queries::{AcceptedOffer, Role},
    store::EventStore,
    subgraph::SubgraphClient,
    tokens::{self, TokenRegistry},
};
use alloy::primitives::Address;

/// RealToken YAM Marketplace Indexer
///
/// Index YAM marketplace events on Gnosis Chain and query a wallet's
/// historical trading activity
#[derive(Parser, Debug)]
#[command(name = "yam-indexer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML, TOML, or JSON)
    ///
    /// If not provided, uses default configuration with environment variable overrides.
    #[arg(long, short = 'c', env = "YAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the SQLite store (overrides config file)
    #[arg(long, short = 'd', alias = "database", env = "YAM_DB")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose logging (shows every RPC window)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the indexing service
    ///
    /// Resumes from the last indexed block, closes the gap via the
    /// subgraph, then follows the chain head with a small safety lag.
    /// Restarts itself after 30 seconds on a fatal error; ctrl-c exits
    /// cleanly.
    Index,

    /// First-run full synchronisation
    ///
    /// Fetches the complete event history from the subgraph (all four
    /// event kinds from contract genesis), merges it into the store and
    /// seeds the indexing watermark.
    Init,

    /// List accepted offers for a set of wallets
    ///
    /// Looks up every fill where the given addresses acted as buyer or
    /// as seller within the datetime range. Addresses must be supplied
    /// in checksum form.
    Accepted {
        /// Which side of the trades to match
        #[arg(long, value_enum, default_value = "buyer")]
        role: RoleArg,

        /// Wallet addresses (checksummed, 0x-prefixed)
        #[arg(required = true)]
        addresses: Vec<String>,

        /// Start of the range (e.g. 2024-01-01 or 2024-01-01T00:00:00)
        #[arg(long)]
        from: String,

        /// End of the range (inclusive)
        #[arg(long)]
        to: String,

        /// Output format
        #[arg(long, default_value = "table")]
        output: OutputFormat,

        /// Skip the token catalogue lookup and print raw addresses
        /// and unscaled integer amounts
        #[arg(long, default_value = "false")]
        raw: bool,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum RoleArg {
    Buyer,
    Seller,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Buyer => Role::Buyer,
            RoleArg::Seller => Role::Seller,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

impl Cli {
    /// Resolve configuration from multiple sources with proper priority
    ///
    /// Priority: CLI args > Environment vars > Config file > Defaults
    fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = if let Some(config_path) = &self.config {
            AppConfig::load_from_file(config_path)?
        } else {
            AppConfig::load()?
        };

        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.to_string_lossy().to_string();
        }

        Ok(config)
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.resolve_config()?;

        match &self.command {
            Commands::Index => {
                config.validate()?;
                self.execute_index(&config).await
            }
            Commands::Init => {
                config.validate()?;
                self.execute_init(&config).await
            }
            Commands::Accepted {
                role,
                addresses,
                from,
                to,
                output,
                raw,
            } => {
                // Queries only touch the local store; the subgraph
                // settings are not required here.
                self.execute_accepted(&config, (*role).into(), addresses, from, to, *output, *raw)
                    .await
            }
        }
    }

    async fn execute_index(&self, config: &AppConfig) -> Result<()> {
        let store = EventStore::new(&config.db_path).await?;
        let pool = RpcPool::new(config.w3_urls.clone())?;
        let subgraph = SubgraphClient::new(config.subgraph_url.clone(), config.the_graph_api_key.clone());
        let contract = parse_address(&config.contract.address)?;

        let mut indexer = Indexer::new(
            store,
            pool,
            subgraph,
            contract,
            config.contract.genesis_block,
        );

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received ctrl-c, shutting down the indexing service...");
                let _ = shutdown_tx.send(true);
            }
        });

        indexer.run_supervised(shutdown_rx).await?;
        println!("Indexing service stopped");
        Ok(())
    }

    async fn execute_init(&self, config: &AppConfig) -> Result<()> {
        let store = EventStore::new(&config.db_path).await?;
        let subgraph = SubgraphClient::new(config.subgraph_url.clone(), config.the_graph_api_key.clone());
        let genesis = config.contract.genesis_block;

        println!("Fetching the full YAM event history from the subgraph...");
        let events = subgraph.fetch_block_range(genesis, None).await?;

        let highest_block = events.iter().map(|e| e.block_number).max();
        store.commit_batch(None, &events).await?;
        store
            .seed_watermark(genesis, highest_block.unwrap_or(genesis))
            .await?;

        println!(
            "Initialization completed! {} event(s) ingested, DB indexed up to block {}",
            events.len(),
            highest_block.unwrap_or(genesis)
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_accepted(
        &self,
        config: &AppConfig,
        role: Role,
        addresses: &[String],
        from: &str,
        to: &str,
        output: OutputFormat,
        raw: bool,
    ) -> Result<()> {
        let store = EventStore::new(&config.db_path).await?;

        // Callers validate: reject anything that is not checksummed
        let addresses = addresses
            .iter()
            .map(|a| checksummed_address(a))
            .collect::<Result<Vec<_>>>()?;

        let mut offers = store.accepted_offers(role, &addresses, from, to).await?;

        if !raw {
            let registry = match TokenRegistry::load(&config.tokens_file) {
                Ok(registry) => registry,
                Err(e) => {
                    tracing::warn!(
                        "Token reference file '{}' not usable ({e}); decimals default to 18",
                        config.tokens_file
                    );
                    TokenRegistry::empty()
                }
            };
            let catalog = match TokenCatalog::fetch(&config.realtokens_api_url).await {
                Ok(catalog) => catalog,
                Err(e) => {
                    tracing::warn!("Token catalogue unavailable ({e}); showing raw addresses");
                    TokenCatalog::empty()
                }
            };

            for offer in &mut offers {
                annotate(offer, &registry, &catalog);
            }
        }

        match output {
            OutputFormat::Table => {
                use tabled::Table;
                println!("\n## Accepted offers ({} match(es))\n", offers.len());
                println!("{}", Table::new(&offers));
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&offers)?);
            }
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(std::io::stdout());
                for offer in &offers {
                    writer.serialize(offer)?;
                }
                writer.flush()?;
            }
        }

        Ok(())
    }
}

/// Scale amounts by token decimals and swap token addresses for their
/// display names where the catalogue or reference file knows them
fn annotate(offer: &mut AcceptedOffer, registry: &TokenRegistry, catalog: &TokenCatalog) {
    let offer_decimals = registry.decimals_for(&offer.offer_token);
    if let Ok(scaled) = tokens::scale_amount(&offer.amount_bought, offer_decimals) {
        offer.amount_bought = scaled;
    }

    let price_decimals = registry.decimals_for(&offer.buyer_token);
    if let Ok(scaled) = tokens::scale_amount(&offer.price_bought, price_decimals) {
        offer.price_bought = scaled;
    }

    offer.offer_token = token_name(&offer.offer_token, registry, catalog);
    offer.buyer_token = token_name(&offer.buyer_token, registry, catalog);
}

fn token_name(address: &str, registry: &TokenRegistry, catalog: &TokenCatalog) -> String {
    if let Some(token) = catalog.get(address) {
        if !token.short_name.is_empty() {
            return token.short_name.clone();
        }
    }
    if let Some((name, _)) = registry.get(address) {
        return name.to_string();
    }
    address.to_string()
}

fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address).map_err(|e| anyhow::anyhow!("Invalid address '{address}': {e}"))
}

/// Parse an address and require checksum case
fn checksummed_address(address: &str) -> Result<String> {
    let parsed = parse_address(address)?;
    let checksummed = parsed.to_checksum(None);
    if checksummed != address {
        anyhow::bail!("Address '{address}' is not in checksum form (expected '{checksummed}')");
    }
    Ok(checksummed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksummed_address_accepted() {
        let address = "0xe91D153E0b41518A2Ce8Dd3D7944Fa863463a97d";
        assert_eq!(checksummed_address(address).unwrap(), address);
    }

    #[test]
    fn test_lowercase_address_rejected() {
        let result = checksummed_address("0xe91d153e0b41518a2ce8dd3d7944fa863463a97d");
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_address_rejected() {
        assert!(checksummed_address("0x1234").is_err());
    }
}
