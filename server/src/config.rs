//! Configuration management

use anyhow::{Context, Result};
use std::env;

use crate::models::{ChainParams, NativeCurrency};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub wallet_rpc_url: Option<String>,
    pub wallet_watch_interval_secs: u64,
    pub chain: ChainParams,
    pub explorer_tx_url: String,
    pub registry_address: String,
    pub api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_flash_model: String,
    pub gemini_pro_model: String,
    pub preserve_history_on_chain_change: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            wallet_rpc_url: None,
            wallet_watch_interval_secs: 4,
            chain: ChainParams::alfajores(),
            explorer_tx_url: "https://celoscan.io/tx/".to_string(),
            registry_address: ZERO_ADDRESS.to_string(),
            api_key: None,
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            gemini_flash_model: "gemini-3-flash-preview".to_string(),
            gemini_pro_model: "gemini-3-pro-preview".to_string(),
            preserve_history_on_chain_change: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        let alfajores = defaults.chain.clone();

        let chain_id = env::var("EXPECTED_CHAIN_ID")
            .map(|raw| normalize_chain_id(&raw))
            .unwrap_or(Ok(alfajores.chain_id))
            .context("Invalid EXPECTED_CHAIN_ID")?;

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .context("Invalid PORT")?,

            wallet_rpc_url: env::var("WALLET_RPC_URL").ok().filter(|u| !u.is_empty()),

            wallet_watch_interval_secs: env::var("WALLET_WATCH_INTERVAL_SECS")
                .unwrap_or_else(|_| defaults.wallet_watch_interval_secs.to_string())
                .parse()
                .context("Invalid WALLET_WATCH_INTERVAL_SECS")?,

            chain: ChainParams {
                chain_id,
                chain_name: env::var("CHAIN_NAME").unwrap_or(alfajores.chain_name),
                native_currency: NativeCurrency {
                    name: "CELO".to_string(),
                    symbol: "CELO".to_string(),
                    decimals: 18,
                },
                rpc_urls: env::var("CHAIN_RPC_URL")
                    .map(|u| vec![u])
                    .unwrap_or(alfajores.rpc_urls),
                block_explorer_urls: env::var("CHAIN_EXPLORER_URL")
                    .map(|u| vec![u])
                    .unwrap_or(alfajores.block_explorer_urls),
            },

            explorer_tx_url: env::var("EXPLORER_TX_URL").unwrap_or(defaults.explorer_tx_url),

            registry_address: env::var("REGISTRY_ADDRESS").unwrap_or(defaults.registry_address),

            api_key: env::var("API_KEY")
                .or_else(|_| env::var("GEMINI_API_KEY"))
                .ok()
                .filter(|k| !k.is_empty()),

            gemini_base_url: env::var("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),

            gemini_flash_model: env::var("GEMINI_FLASH_MODEL")
                .unwrap_or(defaults.gemini_flash_model),

            gemini_pro_model: env::var("GEMINI_PRO_MODEL").unwrap_or(defaults.gemini_pro_model),

            preserve_history_on_chain_change: env::var("PRESERVE_HISTORY_ON_CHAIN_CHANGE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("Invalid PRESERVE_HISTORY_ON_CHAIN_CHANGE")?,
        })
    }

    /// Fee destination: the registry, or the sender itself while the registry
    /// is still the zero placeholder.
    pub fn fee_recipient<'a>(&'a self, sender: &'a str) -> &'a str {
        if self.registry_address.eq_ignore_ascii_case(ZERO_ADDRESS) {
            sender
        } else {
            &self.registry_address
        }
    }
}

/// Accepts `0xef3d` or `44787`, returns lowercase hex with prefix.
fn normalize_chain_id(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let value = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)?,
        None => raw.parse::<u64>()?,
    };
    Ok(format!("{:#x}", value))
}
