//! AI verifier client
//!
//! Each operation sends a natural-language instruction together with a strict
//! response schema to the Generative Language API and parses the returned text
//! as JSON. The schemas below are the contract downstream consumers of
//! `VerificationProof::details` rely on.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::AppError;
use crate::models::VerificationProof;

#[async_trait]
pub trait AttestationService: Send + Sync {
    async fn generate_integrity_proof(&self, input: &str, metadata: &Value) -> Result<Value, AppError>;

    async fn verify_provenance(&self, dataset_id: &str, version_hash: &str) -> Result<Value, AppError>;

    async fn compose_audit_record(&self, proofs: &[VerificationProof]) -> Result<Value, AppError>;
}

pub fn integrity_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "integrityScore": { "type": "NUMBER" },
            "anomaliesDetected": { "type": "ARRAY", "items": { "type": "STRING" } },
            "cryptographicAttestation": { "type": "STRING" },
            "verdict": { "type": "STRING" }
        },
        "required": ["integrityScore", "verdict"]
    })
}

pub fn provenance_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "isAuthentic": { "type": "BOOLEAN" },
            "originConfirmed": { "type": "STRING" },
            "riskLevel": { "type": "STRING" },
            "auditLog": { "type": "STRING" }
        }
    })
}

pub fn audit_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "complianceStatus": { "type": "STRING" },
            "chainIntegrity": { "type": "BOOLEAN" },
            "summary": { "type": "STRING" },
            "auditHash": { "type": "STRING" }
        }
    })
}

fn integrity_prompt(input: &str, metadata: &Value) -> String {
    format!(
        "Perform an integrity audit on the following AI output. Check for hallucinations, internal consistency, and formatting errors.\n\
         Input Data: {}\n\
         Metadata: {}\n\
         Return the verification result as a JSON object.",
        input, metadata
    )
}

fn provenance_prompt(dataset_id: &str, version_hash: &str) -> String {
    format!(
        "Verify the provenance of a dataset with ID {} and Version Hash {}.\n\
         Cross-reference with known dataset distribution patterns and metadata integrity rules.",
        dataset_id, version_hash
    )
}

fn audit_prompt(proofs: &[VerificationProof]) -> Result<String, AppError> {
    let chain = serde_json::to_string(proofs)
        .map_err(|e| AppError::Internal(format!("Cannot serialize proofs: {}", e)))?;
    Ok(format!(
        "Review this chain of verification proofs and generate a consolidated Compliance Audit Record.\n\
         Proofs: {}",
        chain
    ))
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default()
    }
}

/// Parses model output; anything that is not JSON is rejected.
pub fn parse_attestation(text: &str) -> Result<Value, AppError> {
    serde_json::from_str(text).map_err(|e| AppError::MalformedResponse(e.to_string()))
}

pub struct GeminiVerifier {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    flash_model: String,
    pro_model: String,
}

impl GeminiVerifier {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            flash_model: config.gemini_flash_model.clone(),
            pro_model: config.gemini_pro_model.clone(),
        }
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.api_key.as_deref().ok_or_else(|| {
            AppError::Configuration(
                "API Key not found. Please ensure environment is configured.".to_string(),
            )
        })
    }

    fn request_body(prompt: &str, schema: Value) -> Value {
        json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema
            }
        })
    }

    async fn generate(&self, model: &str, prompt: String, schema: Value) -> Result<Value, AppError> {
        let api_key = self.api_key()?;
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        tracing::debug!("Requesting attestation from {}", model);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&Self::request_body(&prompt, schema))
            .send()
            .await
            .map_err(|e| AppError::AiService(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(AppError::AiService(format!("{}: {}", status, error_text)));
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| AppError::AiService(format!("Unreadable response: {}", e)))?;

        parse_attestation(&body.text())
    }
}

#[async_trait]
impl AttestationService for GeminiVerifier {
    async fn generate_integrity_proof(&self, input: &str, metadata: &Value) -> Result<Value, AppError> {
        self.generate(&self.flash_model, integrity_prompt(input, metadata), integrity_schema())
            .await
    }

    async fn verify_provenance(&self, dataset_id: &str, version_hash: &str) -> Result<Value, AppError> {
        self.generate(
            &self.flash_model,
            provenance_prompt(dataset_id, version_hash),
            provenance_schema(),
        )
        .await
    }

    async fn compose_audit_record(&self, proofs: &[VerificationProof]) -> Result<Value, AppError> {
        self.generate(&self.pro_model, audit_prompt(proofs)?, audit_schema())
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn property_names(schema: &Value) -> Vec<String> {
        let mut names: Vec<String> = schema["properties"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    #[test]
    fn integrity_schema_contract() {
        let schema = integrity_schema();
        assert_eq!(
            property_names(&schema),
            vec!["anomaliesDetected", "cryptographicAttestation", "integrityScore", "verdict"]
        );
        assert_eq!(schema["properties"]["integrityScore"]["type"], "NUMBER");
        assert_eq!(schema["properties"]["anomaliesDetected"]["items"]["type"], "STRING");
        assert_eq!(schema["required"], json!(["integrityScore", "verdict"]));
    }

    #[test]
    fn provenance_schema_contract() {
        let schema = provenance_schema();
        assert_eq!(
            property_names(&schema),
            vec!["auditLog", "isAuthentic", "originConfirmed", "riskLevel"]
        );
        assert_eq!(schema["properties"]["isAuthentic"]["type"], "BOOLEAN");
        assert!(schema.get("required").is_none());
    }

    #[test]
    fn audit_schema_contract() {
        let schema = audit_schema();
        assert_eq!(
            property_names(&schema),
            vec!["auditHash", "chainIntegrity", "complianceStatus", "summary"]
        );
        assert_eq!(schema["properties"]["chainIntegrity"]["type"], "BOOLEAN");
    }

    #[test]
    fn request_body_asks_for_json() {
        let body = GeminiVerifier::request_body("hello", provenance_schema());
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"], provenance_schema());
    }

    #[test]
    fn prompts_embed_their_inputs() {
        let prompt = integrity_prompt("US912828XG55", &json!({ "txHash": "0xabc" }));
        assert!(prompt.contains("Input Data: US912828XG55"));
        assert!(prompt.contains(r#"Metadata: {"txHash":"0xabc"}"#));

        let prompt = provenance_prompt("deed-17", "v1.0-onchain");
        assert!(prompt.contains("ID deed-17 and Version Hash v1.0-onchain"));
    }

    #[test]
    fn candidate_text_parts_are_joined() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"verdict\":" }, { "text": "\"ok\"}" }] }
            }]
        }))
        .unwrap();
        assert_eq!(parse_attestation(&body.text()).unwrap(), json!({ "verdict": "ok" }));
    }

    #[test]
    fn non_json_text_is_malformed() {
        assert!(matches!(
            parse_attestation("I think it looks fine"),
            Err(AppError::MalformedResponse(_))
        ));

        let empty: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            parse_attestation(&empty.text()),
            Err(AppError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn missing_credential_is_a_configuration_error() {
        let verifier = GeminiVerifier::new(&Config::default());
        let err = verifier
            .verify_provenance("deed-17", "v1.0-onchain")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert_eq!(
            err.to_string(),
            "API Key not found. Please ensure environment is configured."
        );
    }
    mod http {
        use super::*;
        use axum::{
            extract::{Path, State},
            http::{HeaderMap, StatusCode},
            routing::post,
            Json, Router,
        };
        use std::sync::{Arc, Mutex};

        #[derive(Default)]
        struct Seen {
            calls: Mutex<Vec<(String, Option<String>, Value)>>,
        }

        async fn generate(
            State(seen): State<Arc<Seen>>,
            Path(call): Path<String>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            let key = headers
                .get("x-goog-api-key")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            seen.calls.lock().unwrap().push((call, key, body));
            Json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "{\"isAuthentic\":true,\"riskLevel\":\"Low\"}" }] }
                }]
            }))
        }

        async fn serve(app: Router) -> String {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{}", addr)
        }

        fn verifier(base_url: String) -> GeminiVerifier {
            GeminiVerifier::new(&Config {
                api_key: Some("test-key".to_string()),
                gemini_base_url: base_url,
                gemini_flash_model: "flash-test".to_string(),
                gemini_pro_model: "pro-test".to_string(),
                ..Config::default()
            })
        }

        async fn recording_service() -> (String, Arc<Seen>) {
            let seen = Arc::new(Seen::default());
            let app = Router::new()
                .route("/v1beta/models/:call", post(generate))
                .with_state(seen.clone());
            (serve(app).await, seen)
        }

        #[tokio::test]
        async fn provenance_call_hits_flash_model_with_key() {
            let (base, seen) = recording_service().await;

            let result = verifier(base)
                .verify_provenance("deed-17", "v1.0-onchain")
                .await
                .unwrap();

            assert_eq!(result, json!({ "isAuthentic": true, "riskLevel": "Low" }));
            let calls = seen.calls.lock().unwrap();
            assert_eq!(calls.len(), 1);
            let (call, key, body) = &calls[0];
            assert_eq!(call, "flash-test:generateContent");
            assert_eq!(key.as_deref(), Some("test-key"));
            assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
            assert_eq!(body["generationConfig"]["responseSchema"], provenance_schema());
            assert!(body["contents"][0]["parts"][0]["text"]
                .as_str()
                .unwrap()
                .contains("ID deed-17"));
        }

        #[tokio::test]
        async fn audit_call_uses_pro_model() {
            let (base, seen) = recording_service().await;

            verifier(base).compose_audit_record(&[]).await.unwrap();

            let calls = seen.calls.lock().unwrap();
            assert_eq!(calls[0].0, "pro-test:generateContent");
            assert_eq!(calls[0].2["generationConfig"]["responseSchema"], audit_schema());
        }

        #[tokio::test]
        async fn error_status_is_an_ai_service_error() {
            let app = Router::new().route(
                "/v1beta/models/:call",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exhausted") }),
            );
            let base = serve(app).await;

            let err = verifier(base)
                .generate_integrity_proof("US912828XG55", &json!({}))
                .await
                .unwrap_err();

            match err {
                AppError::AiService(message) => {
                    assert!(message.contains("429"));
                    assert!(message.contains("quota exhausted"));
                }
                other => panic!("unexpected error {:?}", other),
            }
        }

        #[tokio::test]
        async fn unreachable_service_is_an_ai_service_error() {
            let err = verifier("http://127.0.0.1:9".to_string())
                .verify_provenance("deed-17", "v1.0-onchain")
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::AiService(_)));
        }
    }
}
