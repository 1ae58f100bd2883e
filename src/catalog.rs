/// RealToken catalogue lookup
///
/// Read-through view of the community token API: checksummed Gnosis
/// address → display names. Fetch failures degrade gracefully (the
/// presentation path falls back to raw addresses); the report service
/// owns the periodic refresh.
use crate::error::Result;
use alloy::primitives::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    short_name: Option<String>,
    full_name: Option<String>,
    gnosis_contract: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CatalogToken {
    pub short_name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct TokenCatalog {
    by_address: HashMap<String, CatalogToken>,
}

impl TokenCatalog {
    /// Fetch the catalogue once from the community API
    pub async fn fetch(api_url: &str) -> Result<Self> {
        let entries: Vec<CatalogEntry> = reqwest::Client::new()
            .get(api_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut by_address = HashMap::new();
        for entry in entries {
            let Some(raw_address) = entry.gnosis_contract else {
                continue;
            };
            // Entries without a valid Gnosis deployment are skipped
            let Ok(address) = Address::from_str(&raw_address) else {
                continue;
            };

            let short_name = entry.short_name.unwrap_or_default();
            let full_name = entry.full_name.unwrap_or_else(|| short_name.clone());
            by_address.insert(
                address.to_checksum(None).to_lowercase(),
                CatalogToken {
                    short_name,
                    full_name,
                },
            );
        }

        tracing::info!(
            "RealTokens catalogue fetched - {} token(s) processed",
            by_address.len()
        );
        Ok(Self { by_address })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<&CatalogToken> {
        self.by_address.get(&address.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
