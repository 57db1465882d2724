//! Invocation workflow and application state
//!
//! [`Dashboard`] owns everything the views render: wallet status, the network
//! warning, catalog filters, the invocation form and the proof history. Every
//! mutation goes through one of its operations and bumps a revision on a
//! `watch` channel so renderers can follow along.
//!
//! An invocation is strictly sequential: fee transaction, AI attestation,
//! proof construction, commit. Nothing is committed unless every step
//! succeeds and nothing is retried.

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{AppError, ProviderError};
use crate::models::{Applet, Category, ProofStatus, VerificationProof, WalletState};
use crate::services::verifier::AttestationService;
use crate::services::wallet::{ProviderEvent, WalletConnector};

pub const PROVENANCE_VERSION_HASH: &str = "v1.0-onchain";
pub const ATTESTATION_SOURCE: &str = "VerifyChain Applet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Landing,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Marketplace,
    History,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvocationForm {
    pub input: String,
    pub metadata: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardState {
    pub view: View,
    pub tab: Tab,
    pub wallet: WalletState,
    pub network_warning: Option<String>,
    pub search: String,
    pub category: Option<Category>,
    pub selected_applet: Option<String>,
    pub form: InvocationForm,
    pub invoking: bool,
    /// Most recent first
    pub history: Vec<VerificationProof>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Initial,
    View,
    Wallet,
    Network,
    Catalog,
    Form,
    Invocation,
    History,
    Error,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub revision: u64,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    /// Wallet was not connected; the connect flow ran instead
    ConnectRequested,
    /// Wallet is on the wrong chain; the switch flow ran instead
    NetworkSwitchRequested,
    NoAppletSelected,
    /// The chain changed mid-flight; the result belonged to a discarded session
    Discarded,
    Recorded(VerificationProof),
}

impl InvocationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InvocationOutcome::ConnectRequested => "connect_requested",
            InvocationOutcome::NetworkSwitchRequested => "network_switch_requested",
            InvocationOutcome::NoAppletSelected => "no_applet_selected",
            InvocationOutcome::Discarded => "discarded",
            InvocationOutcome::Recorded(_) => "recorded",
        }
    }
}

pub struct Dashboard {
    config: Config,
    catalog: Catalog,
    connector: WalletConnector,
    verifier: Arc<dyn AttestationService>,
    state: RwLock<DashboardState>,
    /// Bumped on every session reset; only written under the state lock
    session: AtomicU64,
    changes: watch::Sender<StateChange>,
}

impl Dashboard {
    pub fn new(
        config: Config,
        catalog: Catalog,
        connector: WalletConnector,
        verifier: Arc<dyn AttestationService>,
    ) -> Self {
        let (changes, _) = watch::channel(StateChange {
            revision: 0,
            kind: ChangeKind::Initial,
        });
        Self {
            config,
            catalog,
            connector,
            verifier,
            state: RwLock::new(DashboardState::default()),
            session: AtomicU64::new(0),
            changes,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn provider_present(&self) -> bool {
        self.connector.is_present()
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.read().await.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StateChange> {
        self.changes.subscribe()
    }

    pub fn explorer_link(&self, tx_hash: &str) -> String {
        format!("{}{}", self.config.explorer_tx_url, tx_hash)
    }

    fn notify(&self, kind: ChangeKind) {
        self.changes.send_modify(|change| {
            change.revision += 1;
            change.kind = kind;
        });
    }

    pub async fn report_error(&self, err: &AppError) {
        self.state.write().await.last_error = Some(err.to_string());
        self.notify(ChangeKind::Error);
    }

    // --- View state ---

    /// Landing call-to-action
    pub async fn get_started(&self) {
        self.state.write().await.view = View::Dashboard;
        self.notify(ChangeKind::View);
    }

    pub async fn set_tab(&self, tab: Tab) {
        self.state.write().await.tab = tab;
        self.notify(ChangeKind::View);
    }

    pub async fn set_search(&self, query: &str, category: Option<Category>) {
        {
            let mut state = self.state.write().await;
            state.search = query.to_string();
            state.category = category;
        }
        self.notify(ChangeKind::Catalog);
    }

    /// Catalog entries matching the current search and category filter
    pub async fn visible_applets(&self) -> Vec<Applet> {
        let state = self.state.read().await;
        self.catalog
            .search(&state.search, state.category)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Opens the invocation modal for an applet
    pub async fn select_applet(&self, id: &str) -> Result<Applet, AppError> {
        let applet = self
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::AppletNotFound(id.to_string()))?;
        self.state.write().await.selected_applet = Some(applet.id.clone());
        self.notify(ChangeKind::Form);
        Ok(applet)
    }

    pub async fn close_modal(&self) {
        self.state.write().await.selected_applet = None;
        self.notify(ChangeKind::Form);
    }

    /// Fills the invocation form; refused while an invocation holds the modal.
    pub async fn set_form(&self, input: &str, metadata: &str) -> Result<(), AppError> {
        self.stage(None, input, metadata).await
    }

    /// Selects the applet and fills the form under one lock.
    pub async fn stage_invocation(
        &self,
        applet_id: &str,
        input: &str,
        metadata: &str,
    ) -> Result<(), AppError> {
        self.stage(Some(applet_id), input, metadata).await
    }

    async fn stage(
        &self,
        applet_id: Option<&str>,
        input: &str,
        metadata: &str,
    ) -> Result<(), AppError> {
        {
            let mut state = self.state.write().await;
            if state.invoking {
                return Err(AppError::InvocationInProgress);
            }
            if let Some(id) = applet_id {
                let applet = self
                    .catalog
                    .get(id)
                    .ok_or_else(|| AppError::AppletNotFound(id.to_string()))?;
                state.selected_applet = Some(applet.id.clone());
            }
            state.form = InvocationForm {
                input: input.to_string(),
                metadata: metadata.to_string(),
            };
        }
        self.notify(ChangeKind::Form);
        Ok(())
    }

    pub async fn clear_error(&self) {
        self.state.write().await.last_error = None;
        self.notify(ChangeKind::Error);
    }

    // --- Wallet ---

    /// Silent startup check for an already-authorized account.
    pub async fn detect_and_restore(&self) {
        if !self.connector.is_present() {
            tracing::info!("No wallet provider configured");
            return;
        }
        match self.connector.accounts().await {
            Ok(accounts) => match accounts.first() {
                Some(address) => self.update_wallet(address).await,
                None => tracing::info!("No authorized wallet account"),
            },
            Err(e) => tracing::error!("Error checking accounts: {}", e),
        }
    }

    pub async fn connect(&self) -> Result<WalletState, AppError> {
        let accounts = self.connector.request_accounts().await?;
        let address = accounts.first().ok_or_else(|| {
            AppError::Provider(ProviderError::new(
                ProviderError::INTERNAL_ERROR,
                "Wallet returned no accounts",
            ))
        })?;
        self.update_wallet(address).await;
        Ok(self.state.read().await.wallet.clone())
    }

    /// Populates wallet state for `address` and re-checks the network. A failed
    /// balance query leaves the balance at zero.
    pub async fn update_wallet(&self, address: &str) {
        let balance = match self.connector.balance(address).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!("Failed to fetch balance for {}: {}", address, e);
                0.0
            }
        };

        {
            let mut state = self.state.write().await;
            state.wallet = WalletState {
                address: Some(address.to_string()),
                balance,
                is_connected: true,
                ..WalletState::default()
            };
        }
        self.notify(ChangeKind::Wallet);

        if let Err(e) = self.check_network().await {
            tracing::error!("Failed to check network: {}", e);
        }
    }

    pub async fn refresh_balance(&self) -> Result<WalletState, AppError> {
        let address = self
            .state
            .read()
            .await
            .wallet
            .address
            .clone()
            .ok_or_else(|| AppError::BadRequest("Wallet not connected".to_string()))?;
        self.update_wallet(&address).await;
        Ok(self.state.read().await.wallet.clone())
    }

    /// Flags a chain mismatch as a warning; returns whether the chain matches.
    pub async fn check_network(&self) -> Result<bool, AppError> {
        let matches = self.connector.is_expected_chain().await?;
        let warning = (!matches).then(|| {
            format!(
                "Please switch to {}",
                self.connector.expected_chain().chain_name
            )
        });
        if let Some(w) = &warning {
            tracing::warn!("{}", w);
        }
        self.state.write().await.network_warning = warning;
        self.notify(ChangeKind::Network);
        Ok(matches)
    }

    pub async fn switch_network(&self) {
        self.connector.switch_or_add_network().await;
    }

    pub async fn handle_provider_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                Some(address) => self.update_wallet(address).await,
                None => {
                    tracing::info!("Wallet disconnected");
                    self.state.write().await.wallet = WalletState::default();
                    self.notify(ChangeKind::Wallet);
                }
            },
            ProviderEvent::ChainChanged(chain_id) => {
                tracing::info!("Wallet switched to chain {}", chain_id);
                if self.config.preserve_history_on_chain_change {
                    let address = self.state.read().await.wallet.address.clone();
                    match address {
                        Some(address) => self.update_wallet(&address).await,
                        None => {
                            if let Err(e) = self.check_network().await {
                                tracing::error!("Failed to check network: {}", e);
                            }
                        }
                    }
                } else {
                    {
                        let mut state = self.state.write().await;
                        *state = DashboardState::default();
                        self.session.fetch_add(1, Ordering::SeqCst);
                    }
                    self.notify(ChangeKind::Reset);
                    self.detect_and_restore().await;
                }
            }
        }
    }

    /// Consumes provider notifications for the rest of the session.
    pub fn spawn_event_loop(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut events = self.connector.subscribe()?;
        let dashboard = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => dashboard.handle_provider_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Dropped {} wallet events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    // --- Invocation ---

    pub async fn invoke(&self) -> Result<InvocationOutcome, AppError> {
        let (applet, address, form, session) = {
            let mut state = self.state.write().await;
            if state.invoking {
                return Err(AppError::InvocationInProgress);
            }
            if state.selected_applet.is_some() && state.form.input.is_empty() {
                return Err(AppError::BadRequest(
                    "Verification input is required".to_string(),
                ));
            }

            let connected = if state.wallet.is_connected {
                state.wallet.address.clone()
            } else {
                None
            };
            let address = match connected {
                Some(address) => address,
                None => {
                    drop(state);
                    if let Err(e) = self.connect().await {
                        tracing::error!("Connection failed: {}", e);
                        self.report_error(&e).await;
                    }
                    return Ok(InvocationOutcome::ConnectRequested);
                }
            };

            if state.network_warning.is_some() {
                drop(state);
                self.switch_network().await;
                return Ok(InvocationOutcome::NetworkSwitchRequested);
            }

            let applet = match state
                .selected_applet
                .as_deref()
                .and_then(|id| self.catalog.get(id))
            {
                Some(applet) => applet.clone(),
                None => return Ok(InvocationOutcome::NoAppletSelected),
            };

            state.invoking = true;
            (applet, address, state.form.clone(), self.session.load(Ordering::SeqCst))
        };
        self.notify(ChangeKind::Invocation);

        let result = self.run_invocation(&applet, &address, &form).await;

        let mut state = self.state.write().await;
        if self.session.load(Ordering::SeqCst) != session {
            drop(state);
            tracing::warn!("Chain changed during invocation of {}, discarding result", applet.id);
            return result.map(|_| InvocationOutcome::Discarded);
        }
        state.invoking = false;
        match result {
            Ok(proof) => {
                state.history.insert(0, proof.clone());
                state.form = InvocationForm::default();
                state.selected_applet = None;
                state.tab = Tab::History;
                state.last_error = None;
                drop(state);
                self.notify(ChangeKind::History);

                tracing::info!(
                    "Recorded proof {} for applet {} (tx {})",
                    proof.id,
                    proof.applet_id,
                    proof.tx_hash
                );

                self.update_wallet(&address).await;
                Ok(InvocationOutcome::Recorded(proof))
            }
            Err(e) => {
                tracing::error!("Invocation failed: {}", e);
                state.last_error = Some(e.to_string());
                drop(state);
                self.notify(ChangeKind::Error);
                Err(e)
            }
        }
    }

    async fn run_invocation(
        &self,
        applet: &Applet,
        user: &str,
        form: &InvocationForm,
    ) -> Result<VerificationProof, AppError> {
        let recipient = self.config.fee_recipient(user);
        let tx_hash = self
            .connector
            .send_fee_transaction(user, recipient, applet.invocation_fee)
            .await?;

        let details = self.attest(applet, &tx_hash, form).await?;

        Ok(build_proof(
            applet,
            user,
            tx_hash,
            details,
            &form.input,
            Utc::now().timestamp_millis(),
        ))
    }

    async fn attest(&self, applet: &Applet, tx_hash: &str, form: &InvocationForm) -> Result<Value, AppError> {
        match applet.category {
            Category::Issuance => {
                let mut metadata = json!({
                    "txHash": tx_hash,
                    "source": ATTESTATION_SOURCE,
                });
                if !form.metadata.is_empty() {
                    metadata["userMetadata"] = json!(form.metadata);
                }
                self.verifier
                    .generate_integrity_proof(&form.input, &metadata)
                    .await
            }
            Category::Provenance => {
                self.verifier
                    .verify_provenance(&form.input, PROVENANCE_VERSION_HASH)
                    .await
            }
            // No AI verification exists for these categories yet
            Category::Ownership | Category::Compliance => Ok(stub_attestation()),
        }
    }

    /// Consolidated audit record over the current history
    pub async fn compose_audit(&self) -> Result<Value, AppError> {
        let history = self.state.read().await.history.clone();
        self.verifier.compose_audit_record(&history).await
    }
}

pub fn stub_attestation() -> Value {
    json!({ "status": "Success", "detail": "On-chain verification verified by AI." })
}

/// Display-only fingerprint: prefix plus the first ten base64 characters.
pub fn fingerprint(prefix: &str, bytes: &[u8]) -> String {
    let encoded = general_purpose::STANDARD.encode(bytes);
    format!("{}:{}", prefix, &encoded[..encoded.len().min(10)])
}

pub fn build_proof(
    applet: &Applet,
    user: &str,
    tx_hash: String,
    details: Value,
    input: &str,
    timestamp: i64,
) -> VerificationProof {
    VerificationProof {
        id: format!("proof-{}", timestamp),
        applet_id: applet.id.clone(),
        user: user.to_string(),
        timestamp,
        input_hash: fingerprint("sha256", input.as_bytes()),
        proof_hash: fingerprint("gemini-attestation", details.to_string().as_bytes()),
        tx_hash,
        // Not derived from the verdict
        status: ProofStatus::Verified,
        details,
    }
}
