/// Contract reference file
///
/// A small JSON mapping of symbolic token names to `{address, decimals}`
/// used by the presentation path to turn raw integer amounts into
/// human-readable quantities. The core always stores raw integers; only
/// display scales them.
use crate::error::{Result, YamError};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

/// Tokens whose decimals differ from the ERC-20 default of 18
const DECIMALS_OVERRIDES: [(&str, u8); 1] = [
    // RWA holdings token
    ("0x0675e8f4a52ea6c845cb6427af03616a2af42170", 9),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRef {
    pub address: String,
    pub decimals: u8,
}

/// The reference file, indexed by lowercased address
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    by_address: HashMap<String, (String, TokenRef)>,
}

impl TokenRegistry {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let entries: BTreeMap<String, TokenRef> = serde_json::from_str(&raw)?;

        let mut by_address = HashMap::new();
        for (name, token) in entries {
            by_address.insert(token.address.to_lowercase(), (name, token));
        }

        Ok(Self { by_address })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Symbolic name and reference data for an address, if listed
    pub fn get(&self, address: &str) -> Option<(&str, &TokenRef)> {
        self.by_address
            .get(&address.to_lowercase())
            .map(|(name, token)| (name.as_str(), token))
    }

    /// Decimals for an address: reference file first, then the known
    /// overrides, defaulting to 18
    pub fn decimals_for(&self, address: &str) -> u8 {
        if let Some((_, token)) = self.get(address) {
            return token.decimals;
        }
        decimals_override(address).unwrap_or(18)
    }
}

pub fn decimals_override(address: &str) -> Option<u8> {
    let lower = address.to_lowercase();
    DECIMALS_OVERRIDES
        .iter()
        .find(|(addr, _)| *addr == lower)
        .map(|(_, decimals)| *decimals)
}

/// Render an integer token amount at the given decimals
///
/// `"1500000000000000000"` at 18 decimals becomes `"1.5"`; trailing
/// zeros in the fraction are trimmed.
pub fn scale_amount(raw: &str, decimals: u8) -> Result<String> {
    let value = U256::from_str(raw)
        .map_err(|_| YamError::Parse(format!("'{raw}' is not a decimal integer")))?;

    if decimals == 0 {
        return Ok(value.to_string());
    }

    let scale = U256::from(10u8)
        .checked_pow(U256::from(decimals))
        .ok_or_else(|| YamError::Parse(format!("10^{decimals} exceeds 256 bits")))?;

    let integer = value / scale;
    let fraction = value % scale;

    if fraction.is_zero() {
        return Ok(integer.to_string());
    }

    let fraction = fraction.to_string();
    let fraction = format!("{fraction:0>width$}", width = decimals as usize);
    Ok(format!("{integer}.{}", fraction.trim_end_matches('0')))
}
