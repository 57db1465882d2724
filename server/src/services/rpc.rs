//! JSON-RPC wallet provider over HTTP
//!
//! Talks to a wallet bridge that exposes the EIP-1193 method set on an HTTP
//! endpoint. HTTP has no push channel, so account and chain changes are
//! picked up by a watcher task and republished as [`ProviderEvent`]s.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::wallet::{ProviderEvent, WalletProvider};
use crate::error::ProviderError;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

pub struct JsonRpcProvider {
    client: Client,
    url: String,
    next_id: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl JsonRpcProvider {
    pub fn new(url: &str) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            client: Client::new(),
            url: url.to_string(),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    /// Polls `eth_accounts` and `eth_chainId` and publishes differences.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            let mut accounts = provider.accounts_snapshot().await;
            let mut chain = provider.chain_snapshot().await;
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let current_accounts = provider.accounts_snapshot().await;
                if current_accounts.is_some() && current_accounts != accounts {
                    tracing::debug!("Wallet accounts changed: {:?}", current_accounts);
                    if let Some(list) = current_accounts.clone() {
                        let _ = provider.events.send(ProviderEvent::AccountsChanged(list));
                    }
                    accounts = current_accounts;
                }

                let current_chain = provider.chain_snapshot().await;
                if current_chain.is_some() && current_chain != chain {
                    tracing::debug!("Wallet chain changed: {:?}", current_chain);
                    if let Some(id) = current_chain.clone() {
                        let _ = provider.events.send(ProviderEvent::ChainChanged(id));
                    }
                    chain = current_chain;
                }
            }
        })
    }

    async fn accounts_snapshot(&self) -> Option<Vec<String>> {
        match self.request("eth_accounts", json!([])).await {
            Ok(value) => serde_json::from_value(value).ok(),
            Err(e) => {
                tracing::debug!("Watcher eth_accounts failed: {}", e);
                None
            }
        }
    }

    async fn chain_snapshot(&self) -> Option<String> {
        match self.request("eth_chainId", json!([])).await {
            Ok(Value::String(id)) => Some(id.to_lowercase()),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Watcher eth_chainId failed: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl WalletProvider for JsonRpcProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        tracing::debug!("wallet rpc -> {}", method);

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        let status = resp.status();
        let body: RpcResponse = resp.json().await.map_err(|e| {
            ProviderError::transport(format!("{} returned unreadable body ({}): {}", method, status, e))
        })?;

        into_result(body)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

fn into_result(body: RpcResponse) -> Result<Value, ProviderError> {
    match (body.error, body.result) {
        (Some(err), _) => Err(ProviderError::new(err.code, err.message)),
        (None, Some(result)) => Ok(result),
        (None, None) => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> RpcResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn request_envelope_shape() {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: 7,
            method: "eth_chainId",
            params: json!([]),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "jsonrpc": "2.0", "id": 7, "method": "eth_chainId", "params": [] })
        );
    }

    #[test]
    fn result_is_unwrapped() {
        let value = into_result(parse(r#"{"jsonrpc":"2.0","id":1,"result":"0xef3d"}"#)).unwrap();
        assert_eq!(value, json!("0xef3d"));
    }

    #[test]
    fn null_result_is_allowed() {
        let value = into_result(parse(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn error_object_keeps_code_and_message() {
        let err = into_result(parse(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":4001,"message":"User rejected the request."}}"#,
        ))
        .unwrap_err();
        assert_eq!(err.code, ProviderError::USER_REJECTED);
        assert_eq!(err.to_string(), "User rejected the request.");
    }

    #[tokio::test]
    async fn unreachable_bridge_is_a_transport_error() {
        let provider = JsonRpcProvider::new("http://127.0.0.1:9");
        let err = provider.request("eth_accounts", json!([])).await.unwrap_err();
        assert_eq!(err.code, ProviderError::INTERNAL_ERROR);
    }
    mod http {
        use super::*;
        use axum::{extract::State, routing::post, Json, Router};
        use std::sync::Mutex;

        const ALICE: &str = "0x742d35cc6634c0532925a3b844bc9e7595f1ab23";
        const BOB: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

        struct Bridge {
            accounts: Mutex<Vec<String>>,
            chain_id: Mutex<String>,
            requests: AtomicU64,
        }

        async fn rpc(State(bridge): State<Arc<Bridge>>, Json(req): Json<Value>) -> Json<Value> {
            bridge.requests.fetch_add(1, Ordering::SeqCst);
            let id = req["id"].clone();
            let body = match req["method"].as_str() {
                Some("eth_accounts") => {
                    json!({ "jsonrpc": "2.0", "id": id, "result": bridge.accounts.lock().unwrap().clone() })
                }
                Some("eth_chainId") => {
                    json!({ "jsonrpc": "2.0", "id": id, "result": bridge.chain_id.lock().unwrap().clone() })
                }
                _ => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": "Method not found" }
                }),
            };
            Json(body)
        }

        async fn bridge() -> (Arc<JsonRpcProvider>, Arc<Bridge>) {
            let bridge = Arc::new(Bridge {
                accounts: Mutex::new(vec![ALICE.to_string()]),
                chain_id: Mutex::new("0xef3d".to_string()),
                requests: AtomicU64::new(0),
            });
            let app = Router::new().route("/", post(rpc)).with_state(bridge.clone());
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (Arc::new(JsonRpcProvider::new(&format!("http://{}/", addr))), bridge)
        }

        #[tokio::test]
        async fn request_round_trips_over_http() {
            let (provider, bridge) = bridge().await;

            let chain = provider.request("eth_chainId", json!([])).await.unwrap();
            assert_eq!(chain, json!("0xef3d"));
            let accounts = provider.request("eth_accounts", json!([])).await.unwrap();
            assert_eq!(accounts, json!([ALICE]));
            assert_eq!(bridge.requests.load(Ordering::SeqCst), 2);

            let err = provider
                .request("wallet_watchAsset", json!([]))
                .await
                .unwrap_err();
            assert_eq!(err.code, -32601);
            assert_eq!(err.message, "Method not found");
        }

        #[tokio::test]
        async fn watcher_publishes_account_and_chain_changes() {
            let (provider, bridge) = bridge().await;
            let mut events = provider.subscribe();
            let watcher = provider.spawn_watcher(Duration::from_millis(20));

            // initial snapshot taken
            tokio::time::timeout(Duration::from_secs(2), async {
                while bridge.requests.load(Ordering::SeqCst) < 2 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("watcher snapshot");

            *bridge.accounts.lock().unwrap() = vec![BOB.to_string()];
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("accounts event")
                .unwrap();
            assert_eq!(event, ProviderEvent::AccountsChanged(vec![BOB.to_string()]));

            *bridge.chain_id.lock().unwrap() = "0xA4EC".to_string();
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("chain event")
                .unwrap();
            assert_eq!(event, ProviderEvent::ChainChanged("0xa4ec".to_string()));

            watcher.abort();
        }
    }
}
