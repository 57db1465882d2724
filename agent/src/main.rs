//! Command-line client for the VerifyChain dashboard
//!
//! Drives the same flows as the web dashboard over the JSON API:
//! 1. Browse the applet catalog
//! 2. Connect the wallet and move it to the expected chain
//! 3. Pay an applet fee and receive an AI attestation
//! 4. Review the proof history and request an audit record

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "verifychain")]
#[command(about = "VerifyChain dashboard client")]
struct Cli {
    /// VerifyChain server URL
    #[arg(long, default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog applets
    List {
        /// Case-insensitive match on name or description
        #[arg(short, long, default_value = "")]
        search: String,

        /// Issuance, Provenance, Ownership or Compliance
        #[arg(short, long, default_value = "")]
        category: String,
    },

    /// Show wallet status
    Wallet,

    /// Request wallet accounts
    Connect,

    /// Ask the wallet to switch to the expected chain
    SwitchNetwork,

    /// Pay the fee and run an applet
    Invoke {
        /// Applet ID (e.g., app-001)
        #[arg(short, long)]
        applet: String,

        /// Asset data or dataset identifier
        #[arg(short, long)]
        input: String,

        /// Optional metadata passed to the attestation
        #[arg(short, long, default_value = "")]
        metadata: String,
    },

    /// List recorded proofs, most recent first
    History,

    /// Compose a compliance audit record over the history
    Audit,

    /// Follow dashboard state changes
    Watch,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Applet {
    id: String,
    name: String,
    version: String,
    invocation_fee: f64,
    currency: String,
    category: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletState {
    address: Option<String>,
    balance: f64,
    currency: String,
    is_connected: bool,
}

#[derive(Debug, Deserialize)]
struct WalletStatus {
    wallet: WalletState,
    provider_present: bool,
    expected_chain_id: String,
    network_warning: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Proof {
    id: String,
    applet_id: String,
    timestamp: i64,
    input_hash: String,
    proof_hash: String,
    tx_hash: String,
    status: String,
    details: Value,
}

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    input: &'a str,
    metadata: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    outcome: String,
    proof: Option<Proof>,
    explorer_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StateChange {
    revision: u64,
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: u16,
}

struct Agent {
    client: Client,
    server: String,
}

impl Agent {
    fn new(server: &str) -> Self {
        Self {
            client: Client::new(),
            server: server.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    async fn list_applets(&self, search: &str, category: &str) -> Result<Vec<Applet>> {
        let resp = self
            .client
            .get(self.url("/api/v1/applets"))
            .query(&[("q", search), ("category", category)])
            .send()
            .await?;
        decode(resp).await
    }

    async fn wallet(&self) -> Result<WalletStatus> {
        let resp = self.client.get(self.url("/api/v1/wallet")).send().await?;
        decode(resp).await
    }

    async fn connect(&self) -> Result<WalletStatus> {
        let resp = self.client.post(self.url("/api/v1/wallet/connect")).send().await?;
        decode(resp).await
    }

    async fn switch_network(&self) -> Result<WalletStatus> {
        let resp = self.client.post(self.url("/api/v1/network/switch")).send().await?;
        decode(resp).await
    }

    async fn invoke(&self, applet: &str, input: &str, metadata: &str) -> Result<InvokeResponse> {
        let resp = self
            .client
            .post(self.url(&format!("/api/v1/applets/{}/invoke", applet)))
            .json(&InvokeRequest { input, metadata })
            .send()
            .await?;
        decode(resp).await
    }

    async fn history(&self) -> Result<Vec<Proof>> {
        let resp = self.client.get(self.url("/api/v1/proofs")).send().await?;
        decode(resp).await
    }

    async fn audit(&self) -> Result<Value> {
        let resp = self.client.post(self.url("/api/v1/audit")).send().await?;
        decode(resp).await
    }

    /// Reads the server-sent event stream until the server closes it.
    async fn watch(&self) -> Result<()> {
        let resp = self
            .client
            .get(self.url("/api/v1/events"))
            .send()
            .await?
            .error_for_status()?;

        let mut stream = resp.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Event stream interrupted")?;
            buffer.extend_from_slice(&chunk);

            while let Some(frame) = next_frame(&mut buffer) {
                if let Some(change) = parse_frame(&frame) {
                    println!("[{}] revision {:<6} {}", Utc::now().format("%H:%M:%S"), change.revision, change.kind);
                    if change.kind == "wallet" || change.kind == "network" || change.kind == "reset" {
                        let status = self.wallet().await?;
                        print_wallet(&status);
                    }
                }
            }
        }

        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await?;
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => anyhow::bail!("{} (HTTP {})", body.error, body.code),
            Err(_) => anyhow::bail!("Request failed with {}: {}", status, text),
        }
    }
    Ok(resp.json().await?)
}

/// Splits one complete `\n\n`-terminated frame off the buffer. Frames are
/// decoded only once whole so split multi-byte characters survive.
fn next_frame(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let frame: Vec<u8> = buffer.drain(..end + 2).collect();
    Some(String::from_utf8_lossy(&frame).into_owned())
}

fn parse_frame(frame: &str) -> Option<StateChange> {
    let mut event = None;
    let mut data = String::new();
    for line in frame.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = Some(name.trim());
        } else if let Some(payload) = line.strip_prefix("data:") {
            data.push_str(payload.trim());
        }
    }
    match event {
        Some("state") => serde_json::from_str(&data).ok(),
        _ => None,
    }
}

fn short(value: &str, head: usize) -> String {
    if value.chars().count() > head {
        format!("{}...", value.chars().take(head).collect::<String>())
    } else {
        value.to_string()
    }
}

fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn print_wallet(status: &WalletStatus) {
    println!("Wallet Status:");
    println!("  Provider:       {}", if status.provider_present { "present" } else { "missing" });
    println!("  Connected:      {}", status.wallet.is_connected);
    println!("  Address:        {}", status.wallet.address.as_deref().unwrap_or("N/A"));
    println!("  Balance:        {:.4} {}", status.wallet.balance, status.wallet.currency);
    println!("  Expected Chain: {}", status.expected_chain_id);
    if let Some(warning) = &status.network_warning {
        println!("  [!] {}", warning);
    }
}

fn print_proof(proof: &Proof) {
    println!("  ID:          {}", proof.id);
    println!("  Applet:      {}", proof.applet_id);
    println!("  Status:      {}", proof.status);
    println!("  Time:        {}", format_timestamp(proof.timestamp));
    println!("  Input Hash:  {}", proof.input_hash);
    println!("  Proof Hash:  {}", proof.proof_hash);
    println!("  TX Hash:     {}", proof.tx_hash);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let agent = Agent::new(&cli.server);
    tracing::debug!("Using server {}", agent.server);

    match cli.command {
        Commands::List { search, category } => {
            println!("Fetching applets...\n");
            let applets = agent.list_applets(&search, &category).await?;

            println!("{:<10} {:<32} {:<12} {:<8} {:<12}", "ID", "Name", "Category", "Version", "Fee");
            println!("{}", "-".repeat(78));

            for applet in &applets {
                println!(
                    "{:<10} {:<32} {:<12} {:<8} {} {}",
                    applet.id, applet.name, applet.category, applet.version, applet.invocation_fee, applet.currency
                );
            }
            if applets.is_empty() {
                println!("No applets match the current filters.");
            }
        }

        Commands::Wallet => {
            let status = agent.wallet().await?;
            print_wallet(&status);
        }

        Commands::Connect => {
            let status = agent.connect().await?;
            print_wallet(&status);
        }

        Commands::SwitchNetwork => {
            let status = agent.switch_network().await?;
            println!("[*] Network switch requested\n");
            print_wallet(&status);
        }

        Commands::Invoke { applet, input, metadata } => {
            println!("\n[*] Invoking {}", applet);
            let response = agent.invoke(&applet, &input, &metadata).await?;

            match response.proof {
                Some(proof) => {
                    println!("\n[$] PROOF RECORDED");
                    print_proof(&proof);
                    if let Some(url) = response.explorer_url {
                        println!("  Explorer:    {}", url);
                    }
                    println!("\nAttestation:\n{}", serde_json::to_string_pretty(&proof.details)?);
                }
                None => {
                    println!("[!] Not invoked: {}", response.outcome);
                    if response.outcome == "connect_requested" {
                        println!("    Wallet connection was requested, retry once connected.");
                    } else if response.outcome == "network_switch_requested" {
                        println!("    Network switch was requested, retry on the expected chain.");
                    } else if response.outcome == "discarded" {
                        println!("    The wallet changed chain mid-flight, the result was dropped.");
                    }
                }
            }
        }

        Commands::History => {
            let proofs = agent.history().await?;

            println!("{:<20} {:<10} {:<20} {:<14} {:<10}", "ID", "Applet", "Time", "TX", "Status");
            println!("{}", "-".repeat(78));

            for proof in &proofs {
                println!(
                    "{:<20} {:<10} {:<20} {:<14} {:<10}",
                    proof.id,
                    proof.applet_id,
                    format_timestamp(proof.timestamp),
                    short(&proof.tx_hash, 10),
                    proof.status
                );
            }
            println!("\nTotal audits: {}", proofs.len());
        }

        Commands::Audit => {
            println!("Composing audit record...\n");
            let record = agent.audit().await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Commands::Watch => {
            println!("Watching {} (Ctrl-C to stop)\n", agent.server);
            agent.watch().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_frame() {
        let frame = "event: state\ndata: {\"revision\":7,\"kind\":\"wallet\"}\n\n";
        let change = parse_frame(frame).unwrap();
        assert_eq!(change.revision, 7);
        assert_eq!(change.kind, "wallet");
    }

    #[test]
    fn test_keepalive_frame_ignored() {
        assert!(parse_frame(":hb\n\n").is_none());
        assert!(parse_frame("event: other\ndata: {}\n\n").is_none());
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short("0xabcdef0123456789", 10), "0xabcdef01...");
        assert_eq!(short("0xabc", 10), "0xabc");
    }

    #[test]
    fn test_frame_split_inside_multibyte_char() {
        let raw = "event: state\ndata: {\"revision\":3,\"kind\":\"caf\u{e9}\"}\n\n".as_bytes();
        let split = raw.iter().position(|b| *b == 0xc3).unwrap() + 1;

        let mut buffer = raw[..split].to_vec();
        assert!(next_frame(&mut buffer).is_none());
        buffer.extend_from_slice(&raw[split..]);

        let frame = next_frame(&mut buffer).unwrap();
        assert!(buffer.is_empty());
        let change = parse_frame(&frame).unwrap();
        assert_eq!(change.kind, "caf\u{e9}");
    }

    #[test]
    fn test_short_non_ascii() {
        assert_eq!(short("\u{e9}\u{e9}\u{e9}\u{e9}", 2), "\u{e9}\u{e9}...");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1_767_225_600_000), "2026-01-01 00:00:00");
    }

    #[test]
    fn test_error_body_shape() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":"Applet not found: app-999","code":404}"#).unwrap();
        assert_eq!(body.code, 404);
        assert!(body.error.contains("app-999"));
    }
}
