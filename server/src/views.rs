//! Server-rendered landing page and dashboard
//!
//! Plain HTML forms post to `/ui/*`; each action runs the matching
//! [`Dashboard`] operation and redirects back to `/`.

use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
    routing::{get, post},
    Form, Router,
};
use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Deserialize;

use crate::catalog::PLATFORM_FEE_PERCENTAGE;
use crate::handlers::{AppState, SearchQuery};
use crate::models::{Applet, Category, ProofStatus};
use crate::workflow::{Dashboard, DashboardState, Tab, View};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/ui/start", post(start))
        .route("/ui/connect", post(connect))
        .route("/ui/switch-network", post(switch_network))
        .route("/ui/tab", post(tab))
        .route("/ui/select", post(select))
        .route("/ui/close", post(close))
        .route("/ui/invoke", post(invoke))
        .route("/ui/dismiss", post(dismiss))
}

#[derive(Debug, Deserialize)]
pub struct TabForm {
    pub tab: Tab,
}

#[derive(Debug, Deserialize)]
pub struct SelectForm {
    pub applet: String,
}

#[derive(Debug, Deserialize)]
pub struct InvokeForm {
    pub input: String,
    #[serde(default)]
    pub metadata: String,
}

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Html<String> {
    let dashboard = &state.dashboard;

    if query.q.is_some() || query.category.is_some() {
        match Category::parse_filter(query.category.as_deref().unwrap_or_default()) {
            Ok(category) => {
                dashboard
                    .set_search(query.q.as_deref().unwrap_or_default(), category)
                    .await
            }
            Err(e) => tracing::debug!("Ignoring category filter: {}", e),
        }
    }

    let snapshot = dashboard.snapshot().await;
    match snapshot.view {
        View::Landing => Html(render_landing()),
        View::Dashboard => {
            let applets = dashboard.visible_applets().await;
            Html(render_dashboard(dashboard, &snapshot, &applets))
        }
    }
}

async fn start(State(state): State<AppState>) -> Redirect {
    state.dashboard.get_started().await;
    Redirect::to("/")
}

async fn connect(State(state): State<AppState>) -> Redirect {
    if let Err(e) = state.dashboard.connect().await {
        tracing::error!("Connection failed: {}", e);
        state.dashboard.report_error(&e).await;
    }
    Redirect::to("/")
}

async fn switch_network(State(state): State<AppState>) -> Redirect {
    state.dashboard.switch_network().await;
    Redirect::to("/")
}

async fn tab(State(state): State<AppState>, Form(form): Form<TabForm>) -> Redirect {
    state.dashboard.set_tab(form.tab).await;
    Redirect::to("/")
}

async fn select(State(state): State<AppState>, Form(form): Form<SelectForm>) -> Redirect {
    if let Err(e) = state.dashboard.select_applet(&form.applet).await {
        state.dashboard.report_error(&e).await;
    }
    Redirect::to("/")
}

async fn close(State(state): State<AppState>) -> Redirect {
    state.dashboard.close_modal().await;
    Redirect::to("/")
}

async fn invoke(State(state): State<AppState>, Form(form): Form<InvokeForm>) -> Redirect {
    let dashboard = &state.dashboard;
    let result = match dashboard.set_form(&form.input, &form.metadata).await {
        Ok(()) => dashboard.invoke().await.map(|_| ()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        dashboard.report_error(&e).await;
    }
    Redirect::to("/")
}

async fn dismiss(State(state): State<AppState>) -> Redirect {
    state.dashboard.clear_error().await;
    Redirect::to("/")
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        encode_text(title),
        body
    )
}

fn action(path: &str, label: &str) -> String {
    format!(
        "<form method=\"post\" action=\"{}\"><button type=\"submit\">{}</button></form>",
        path, label
    )
}

pub fn render_landing() -> String {
    let body = format!(
        "<header><h1>Verifichain</h1></header>\n\
         <section class=\"hero\">\n\
         <h2>Verifiable AI attestations for real-world assets</h2>\n\
         <p>Pay a small on-chain fee, get an AI-generated integrity or provenance \
         attestation, and keep an auditable proof of every check.</p>\n\
         {}\n\
         </section>",
        action("/ui/start", "Get Started")
    );
    page("Verifichain", &body)
}

pub fn render_dashboard(dashboard: &Dashboard, state: &DashboardState, applets: &[Applet]) -> String {
    let mut body = String::new();

    if let (Some(warning), true) = (&state.network_warning, state.wallet.is_connected) {
        body.push_str(&format!(
            "<div class=\"network-alert\">{} {}</div>\n",
            encode_text(warning),
            action("/ui/switch-network", "Switch to Alfajores")
        ));
    }

    if let Some(error) = &state.last_error {
        body.push_str(&format!(
            "<div class=\"error\" role=\"alert\">{} {}</div>\n",
            encode_text(error),
            action("/ui/dismiss", "Dismiss")
        ));
    }

    body.push_str("<nav>\n<h1>VerifyChain RWA</h1>\n");
    body.push_str(&tab_button(Tab::Marketplace, "Marketplace", state.tab));
    body.push_str(&tab_button(Tab::History, "My Audits", state.tab));
    match state.wallet.short_address() {
        Some(short) if state.wallet.is_connected => body.push_str(&format!(
            "<div class=\"wallet\"><span>{}</span> <span>{:.4} {}</span></div>\n",
            encode_text(&short),
            state.wallet.balance,
            state.wallet.currency
        )),
        _ => body.push_str(&action("/ui/connect", "Connect Wallet")),
    }
    body.push_str("</nav>\n<main>\n");

    let (heading, blurb) = match state.tab {
        Tab::Marketplace => (
            "RWA Verification Marketplace",
            "Discover and integrate verified Government Bond logic on the Celo blockchain.",
        ),
        Tab::History => (
            "On-Chain Proofs",
            "Auditable transaction history and cryptographic proofs of your AI verification workflows.",
        ),
    };
    body.push_str(&format!("<h2>{}</h2>\n<p>{}</p>\n", heading, blurb));
    body.push_str(&format!(
        "<dl class=\"stats\"><dt>Total Applets</dt><dd>{}</dd><dt>Total Audits</dt><dd>{}</dd></dl>\n",
        dashboard.catalog().len(),
        state.history.len()
    ));

    match state.tab {
        Tab::Marketplace => body.push_str(&render_marketplace(state, applets)),
        Tab::History => body.push_str(&render_history(dashboard, state)),
    }
    body.push_str("</main>\n");

    if let Some(applet) = state
        .selected_applet
        .as_deref()
        .and_then(|id| dashboard.catalog().get(id))
    {
        body.push_str(&render_modal(applet, state));
    }

    page("VerifyChain Dashboard", &body)
}

fn tab_button(tab: Tab, label: &str, active: Tab) -> String {
    let value = match tab {
        Tab::Marketplace => "marketplace",
        Tab::History => "history",
    };
    format!(
        "<form method=\"post\" action=\"/ui/tab\"><input type=\"hidden\" name=\"tab\" value=\"{}\">\
         <button type=\"submit\"{}>{}</button></form>\n",
        value,
        if tab == active { " class=\"active\"" } else { "" },
        label
    )
}

fn render_marketplace(state: &DashboardState, applets: &[Applet]) -> String {
    let mut html = String::new();

    html.push_str(&format!(
        "<form method=\"get\" action=\"/\" class=\"search\">\
         <input type=\"text\" name=\"q\" placeholder=\"Search applets...\" value=\"{}\">\n",
        encode_double_quoted_attribute(&state.search)
    ));
    html.push_str("<div class=\"categories\">");
    html.push_str(&category_button("All", state.category.is_none()));
    for category in Category::ALL {
        html.push_str(&category_button(
            category.as_str(),
            state.category == Some(category),
        ));
    }
    html.push_str("</div></form>\n<div class=\"applets\">\n");

    for applet in applets {
        html.push_str(&format!(
            "<article class=\"applet\">\n<span class=\"category\">{}</span> <span class=\"version\">v{}</span>\n\
             <h3>{}</h3>\n<p>{}</p>\n<p class=\"fee\">Invocation Fee <strong>{} {}</strong></p>\n\
             <form method=\"post\" action=\"/ui/select\"><input type=\"hidden\" name=\"applet\" value=\"{}\">\
             <button type=\"submit\">Invoke</button></form>\n</article>\n",
            applet.category.as_str(),
            encode_text(&applet.version),
            encode_text(&applet.name),
            encode_text(&applet.description),
            applet.invocation_fee,
            applet.currency,
            encode_double_quoted_attribute(&applet.id)
        ));
    }
    html.push_str("</div>\n");
    html
}

fn category_button(label: &str, active: bool) -> String {
    format!(
        "<button type=\"submit\" name=\"category\" value=\"{}\"{}>{}</button>",
        label,
        if active { " class=\"active\"" } else { "" },
        label
    )
}

fn render_history(dashboard: &Dashboard, state: &DashboardState) -> String {
    let mut html = String::from(
        "<table class=\"history\">\n<thead><tr><th>Applet / ID</th><th>Status</th>\
         <th>Proof &amp; Inputs</th><th>Tx Hash</th><th>Date</th></tr></thead>\n<tbody>\n",
    );

    if state.history.is_empty() {
        html.push_str(
            "<tr><td colspan=\"5\">No verification history found. \
             Connect your wallet and invoke an applet to begin.</td></tr>\n",
        );
    }

    for proof in &state.history {
        // Unknown applet ids render without a name
        let name = dashboard
            .catalog()
            .get(&proof.applet_id)
            .map(|a| a.name.as_str())
            .unwrap_or("");
        let (date, time) = match DateTime::<Utc>::from_timestamp_millis(proof.timestamp) {
            Some(at) => (
                at.format("%Y-%m-%d").to_string(),
                at.format("%H:%M:%S").to_string(),
            ),
            None => (String::new(), String::new()),
        };
        let short_tx: String = proof.tx_hash.chars().take(10).collect();

        html.push_str(&format!(
            "<tr>\n<td><strong>{}</strong><br><code>{}</code></td>\n\
             <td><span class=\"status status-{}\">{}</span></td>\n\
             <td>Input Hash: <code>{}</code><br>AI Attestation: <code>{}</code></td>\n\
             <td><a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}...</a></td>\n\
             <td>{}<br>{}</td>\n</tr>\n",
            encode_text(name),
            encode_text(&proof.id),
            status_class(proof.status),
            proof.status.as_str(),
            encode_text(&proof.input_hash),
            encode_text(&proof.proof_hash),
            encode_double_quoted_attribute(&dashboard.explorer_link(&proof.tx_hash)),
            encode_text(&short_tx),
            date,
            time
        ));
    }

    html.push_str("</tbody>\n</table>\n");
    html
}

fn status_class(status: ProofStatus) -> &'static str {
    match status {
        ProofStatus::Verified => "verified",
        ProofStatus::Pending => "pending",
        ProofStatus::Failed => "failed",
    }
}

fn render_modal(applet: &Applet, state: &DashboardState) -> String {
    let placeholder = match applet.category {
        Category::Issuance => "Paste Bond CUSIP/ISIN to verify...",
        _ => "Enter asset identifier or hash...",
    };
    let button = if state.invoking {
        "Awaiting Wallet Signature..."
    } else {
        "Sign &amp; Invoke"
    };

    format!(
        "<dialog open class=\"invoke\">\n<h3>Invoke Applet</h3>\n<p>{} v{}</p>\n{}\n\
         <p>This action will trigger a Celo Alfajores transaction. The invocation fee is sent \
         to the applet contract to register the proof.</p>\n\
         <form method=\"post\" action=\"/ui/invoke\">\n\
         <label>Verification Input<textarea name=\"input\" placeholder=\"{}\" required>{}</textarea></label>\n\
         <input type=\"hidden\" name=\"metadata\" value=\"{}\">\n\
         <p>Service Fee <strong>{} {}</strong> (platform share {:.0}%) on <strong>Alfajores</strong></p>\n\
         <button type=\"submit\"{}>{}</button>\n</form>\n</dialog>\n",
        encode_text(&applet.name),
        encode_text(&applet.version),
        action("/ui/close", "Close"),
        placeholder,
        encode_text(&state.form.input),
        encode_double_quoted_attribute(&state.form.metadata),
        applet.invocation_fee,
        applet.currency,
        PLATFORM_FEE_PERCENTAGE * 100.0,
        if state.invoking { " disabled" } else { "" },
        button
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::Config;
    use crate::models::{ChainParams, VerificationProof};
    use crate::services::verifier::mock::RecordingVerifier;
    use crate::services::wallet::WalletConnector;
    use serde_json::json;

    fn dashboard() -> Dashboard {
        Dashboard::new(
            Config::default(),
            Catalog::seeded(),
            WalletConnector::new(None, ChainParams::alfajores()),
            std::sync::Arc::new(RecordingVerifier::new()),
        )
    }

    fn proof(input_hash: &str) -> VerificationProof {
        VerificationProof {
            id: "proof-1767225600000".to_string(),
            applet_id: "app-002".to_string(),
            user: "0x742d35cc6634c0532925a3b844bc9e7595f1ab23".to_string(),
            timestamp: 1_767_225_600_000,
            input_hash: input_hash.to_string(),
            proof_hash: "gemini-attestation:eyJpc0F1dG".to_string(),
            tx_hash: "0x9f2c1a7be4d3c8a6f0b1e2d3c4b5a69788796a5b4c3d2e1f0a9b8c7d6e5f4a3b".to_string(),
            status: ProofStatus::Verified,
            details: json!({ "isAuthentic": true }),
        }
    }

    #[test]
    fn landing_offers_single_call_to_action() {
        let html = render_landing();
        assert!(html.contains("action=\"/ui/start\""));
        assert!(html.contains("Get Started"));
    }

    #[test]
    fn markup_is_escaped() {
        assert_eq!(encode_text("<b>x & y</b>"), "&lt;b&gt;x &amp; y&lt;/b&gt;");
        assert_eq!(
            encode_double_quoted_attribute("say \"hi\" & go"),
            "say &quot;hi&quot; &amp; go"
        );
    }

    #[test]
    fn network_banner_needs_connected_wallet() {
        let dashboard = dashboard();
        let mut state = DashboardState {
            network_warning: Some("Please switch to Celo Alfajores Testnet".to_string()),
            ..DashboardState::default()
        };

        let html = render_dashboard(&dashboard, &state, &[]);
        assert!(!html.contains("network-alert"));
        assert!(html.contains("Connect Wallet"));

        state.wallet.is_connected = true;
        state.wallet.address = Some("0x742d35cc6634c0532925a3b844bc9e7595f1ab23".to_string());
        state.wallet.balance = 2.5;
        let html = render_dashboard(&dashboard, &state, &[]);
        assert!(html.contains("network-alert"));
        assert!(html.contains("/ui/switch-network"));
        assert!(html.contains("0x742d...ab23"));
        assert!(html.contains("2.5000 CELO"));
    }

    #[test]
    fn marketplace_lists_applets_with_fees() {
        let dashboard = dashboard();
        let state = DashboardState::default();
        let applets = dashboard.catalog().all().to_vec();

        let html = render_dashboard(&dashboard, &state, &applets);
        assert!(html.contains("Bond Issuance Integrity"));
        assert!(html.contains("0.05 CELO"));
        assert!(html.contains("5 cEUR"));
        assert!(html.contains("value=\"app-004\""));
        assert!(html.contains("Total Applets</dt><dd>4</dd>"));
    }

    #[test]
    fn history_links_to_explorer() {
        let dashboard = dashboard();
        let state = DashboardState {
            tab: Tab::History,
            history: vec![proof("sha256:<script>")],
            ..DashboardState::default()
        };

        let html = render_dashboard(&dashboard, &state, &[]);
        assert!(html.contains("Asset Provenance Tracker"));
        assert!(html.contains(
            "href=\"https://celoscan.io/tx/0x9f2c1a7be4d3c8a6f0b1e2d3c4b5a69788796a5b4c3d2e1f0a9b8c7d6e5f4a3b\""
        ));
        assert!(html.contains(">0x9f2c1a7b...</a>"));
        assert!(html.contains("2026-01-01"));
        assert!(html.contains("sha256:&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn empty_history_shows_hint() {
        let dashboard = dashboard();
        let state = DashboardState {
            tab: Tab::History,
            ..DashboardState::default()
        };
        let html = render_dashboard(&dashboard, &state, &[]);
        assert!(html.contains("No verification history found."));
    }

    #[test]
    fn modal_reflects_selected_applet() {
        let dashboard = dashboard();
        let state = DashboardState {
            selected_applet: Some("app-001".to_string()),
            ..DashboardState::default()
        };
        let html = render_dashboard(&dashboard, &state, &[]);
        assert!(html.contains("Bond Issuance Integrity v1.0.2"));
        assert!(html.contains("Paste Bond CUSIP/ISIN to verify..."));
        assert!(html.contains("Sign &amp; Invoke"));

        let busy = DashboardState {
            invoking: true,
            form: crate::workflow::InvocationForm {
                input: "US912828XG55".to_string(),
                metadata: String::new(),
            },
            ..state
        };
        let html = render_dashboard(&dashboard, &busy, &[]);
        assert!(html.contains("Awaiting Wallet Signature..."));
        assert!(html.contains(" disabled>"));
    }
}
