//! Wallet connector
//!
//! Mediates every interaction with the user's chain-capable wallet provider:
//! account discovery, balance and chain queries, network switching and fee
//! transaction submission. The provider itself is abstracted behind
//! [`WalletProvider`], an EIP-1193 style request/response seam with an event
//! channel for account and chain changes.

use async_trait::async_trait;
use ethers::types::U256;
use ethers::utils::{format_ether, parse_ether};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{AppError, ProviderError};
use crate::models::ChainParams;

/// Notifications pushed by the provider for the rest of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

pub struct WalletConnector {
    provider: Option<Arc<dyn WalletProvider>>,
    chain: ChainParams,
}

impl WalletConnector {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, chain: ChainParams) -> Self {
        Self { provider, chain }
    }

    pub fn is_present(&self) -> bool {
        self.provider.is_some()
    }

    pub fn expected_chain(&self) -> &ChainParams {
        &self.chain
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        self.provider.as_ref().map(|p| p.subscribe())
    }

    fn provider(&self) -> Result<&Arc<dyn WalletProvider>, AppError> {
        self.provider.as_ref().ok_or(AppError::ProviderMissing)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, AppError> {
        let raw = self.provider()?.request(method, params).await?;
        serde_json::from_value(raw).map_err(|e| {
            AppError::Provider(ProviderError::new(
                ProviderError::INTERNAL_ERROR,
                format!("Unexpected {} response: {}", method, e),
            ))
        })
    }

    /// Already-authorized accounts; never prompts the user.
    pub async fn accounts(&self) -> Result<Vec<String>, AppError> {
        self.call("eth_accounts", json!([])).await
    }

    /// Requests account access; the provider may prompt the user.
    pub async fn request_accounts(&self) -> Result<Vec<String>, AppError> {
        self.call("eth_requestAccounts", json!([])).await
    }

    /// Native balance in display units (18 decimals)
    pub async fn balance(&self, address: &str) -> Result<f64, AppError> {
        let raw: String = self
            .call("eth_getBalance", json!([address, "latest"]))
            .await?;
        wei_hex_to_display(&raw)
    }

    pub async fn chain_id(&self) -> Result<String, AppError> {
        self.call("eth_chainId", json!([])).await
    }

    pub async fn is_expected_chain(&self) -> Result<bool, AppError> {
        let current = self.chain_id().await?;
        Ok(same_chain(&current, &self.chain.chain_id))
    }

    /// Asks the provider to switch to the expected chain, registering the chain
    /// first when the provider does not know it. Failures are logged only.
    pub async fn switch_or_add_network(&self) {
        let provider = match self.provider() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Cannot switch network: {}", e);
                return;
            }
        };

        let switch = provider
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": self.chain.chain_id }]),
            )
            .await;

        match switch {
            Ok(_) => tracing::info!("Requested switch to {}", self.chain.chain_name),
            Err(e) if e.is_unrecognized_chain() => {
                tracing::info!("{} unknown to wallet, registering it", self.chain.chain_name);
                if let Err(add) = provider
                    .request("wallet_addEthereumChain", json!([self.chain]))
                    .await
                {
                    tracing::error!("Failed to add {} network: {}", self.chain.chain_name, add);
                }
            }
            Err(e) => tracing::warn!("Network switch failed: {}", e),
        }
    }

    /// Submits the invocation fee as a plain value transfer and returns the
    /// transaction hash acknowledged by the provider.
    pub async fn send_fee_transaction(
        &self,
        from: &str,
        to: &str,
        fee: f64,
    ) -> Result<String, AppError> {
        let value = fee_to_wei_hex(fee)?;
        tracing::info!("Submitting fee transaction: from={}, to={}, value={}", from, to, value);

        let tx_hash: String = self
            .call(
                "eth_sendTransaction",
                json!([{
                    "from": from,
                    "to": to,
                    "value": value,
                    "data": "0x",
                }]),
            )
            .await?;

        tracing::info!("Fee transaction acknowledged: tx={}", tx_hash);
        Ok(tx_hash)
    }
}

/// Decimal fee to `0x`-prefixed wei quantity
pub fn fee_to_wei_hex(fee: f64) -> Result<String, AppError> {
    if !fee.is_finite() || fee < 0.0 {
        return Err(AppError::BadRequest(format!("Invalid fee amount: {}", fee)));
    }
    let wei = parse_ether(fee)
        .map_err(|e| AppError::BadRequest(format!("Invalid fee amount {}: {}", fee, e)))?;
    Ok(format!("0x{:x}", wei))
}

/// `0x`-prefixed wei quantity to display units
pub fn wei_hex_to_display(raw: &str) -> Result<f64, AppError> {
    let digits = raw.trim_start_matches("0x");
    let wei = U256::from_str_radix(if digits.is_empty() { "0" } else { digits }, 16)
        .map_err(|e| {
            AppError::Provider(ProviderError::new(
                ProviderError::INTERNAL_ERROR,
                format!("Invalid balance quantity {}: {:?}", raw, e),
            ))
        })?;
    format_ether(wei)
        .parse::<f64>()
        .map_err(|e| AppError::Internal(format!("Balance conversion failed: {}", e)))
}

fn same_chain(current: &str, expected: &str) -> bool {
    let parse = |id: &str| u64::from_str_radix(id.trim_start_matches("0x"), 16).ok();
    match (parse(current), parse(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => current.eq_ignore_ascii_case(expected),
    }
}
