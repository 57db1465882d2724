//! Data models shared by the workflow, the JSON API and the views

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Native or stable token an applet fee is quoted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "CELO")]
    Celo,
    #[serde(rename = "cUSD")]
    Cusd,
    #[serde(rename = "cEUR")]
    Ceur,
}

impl Currency {
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Celo => "CELO",
            Currency::Cusd => "cUSD",
            Currency::Ceur => "cEUR",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Issuance,
    Provenance,
    Ownership,
    Compliance,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Issuance,
        Category::Provenance,
        Category::Ownership,
        Category::Compliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Issuance => "Issuance",
            Category::Provenance => "Provenance",
            Category::Ownership => "Ownership",
            Category::Compliance => "Compliance",
        }
    }

    /// Case-insensitive parse; "All" and the empty string mean no filter.
    pub fn parse_filter(raw: &str) -> Result<Option<Category>, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(None);
        }
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed))
            .map(Some)
            .ok_or_else(|| format!("Unknown category: {}", trimmed))
    }
}

/// Catalog entry describing one verification applet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Applet {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub creator: String,
    pub invocation_fee: f64,
    pub currency: Currency,
    pub category: Category,
    pub metadata_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    pub address: Option<String>,
    pub balance: f64,
    pub currency: Currency,
    pub is_connected: bool,
}

impl Default for WalletState {
    fn default() -> Self {
        Self {
            address: None,
            balance: 0.0,
            currency: Currency::Celo,
            is_connected: false,
        }
    }
}

impl WalletState {
    /// `0x1234...abcd` form used by the wallet badge
    pub fn short_address(&self) -> Option<String> {
        self.address.as_deref().map(|a| {
            let chars: Vec<char> = a.chars().collect();
            if chars.len() > 10 {
                let head: String = chars[..6].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{}...{}", head, tail)
            } else {
                a.to_string()
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofStatus {
    Verified,
    Pending,
    Failed,
}

impl ProofStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofStatus::Verified => "Verified",
            ProofStatus::Pending => "Pending",
            ProofStatus::Failed => "Failed",
        }
    }
}

/// Locally recorded result of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationProof {
    pub id: String,
    pub applet_id: String,
    pub user: String,
    /// Unix milliseconds
    pub timestamp: i64,
    pub input_hash: String,
    pub proof_hash: String,
    pub tx_hash: String,
    pub status: ProofStatus,
    pub details: Value,
}

/// Descriptor sent with `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl ChainParams {
    /// Celo Alfajores testnet (44787)
    pub fn alfajores() -> Self {
        Self {
            chain_id: "0xef3d".to_string(),
            chain_name: "Celo Alfajores Testnet".to_string(),
            native_currency: NativeCurrency {
                name: "CELO".to_string(),
                symbol: "CELO".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://alfajores-forno.celo-testnet.org".to_string()],
            block_explorer_urls: vec!["https://alfajores.celoscan.io/".to_string()],
        }
    }
}

/// Invocation request body
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeRequest {
    pub input: String,
    #[serde(default)]
    pub metadata: String,
}

/// Invocation response body
#[derive(Debug, Clone, Serialize)]
pub struct InvokeResponse {
    pub outcome: &'static str,
    pub proof: Option<VerificationProof>,
    pub explorer_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletStatus {
    pub wallet: WalletState,
    pub provider_present: bool,
    pub expected_chain_id: String,
    pub network_warning: Option<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub expected_chain_id: String,
    pub chain_name: String,
    pub provider_present: bool,
    pub applets: usize,
    pub proofs: usize,
    pub version: String,
}
