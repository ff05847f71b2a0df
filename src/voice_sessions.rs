//! Server side minting of short lived voice vendor credentials. API keys never
//! leave this module.

use serde::Serialize;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vendor returned status {0}: {1}")]
    Status(u16, String),

    #[error("Vendor response did not contain a token")]
    MissingToken,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceSettings {
    pub retell_api_key: Option<String>,
    pub retell_agent_id: Option<String>,
    pub retell_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_voice: String,
    pub openai_base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebCall {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeSession {
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub model: String,
}

#[derive(Clone)]
pub struct VoiceSessions {
    client: reqwest::Client,
    settings: Arc<VoiceSettings>,
}

impl VoiceSessions {
    pub fn new(settings: VoiceSettings) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            settings: Arc::new(settings),
        })
    }

    pub async fn create_web_call(&self, agent_id: Option<String>) -> Result<WebCall, SessionError> {
        let api_key = self
            .settings
            .retell_api_key
            .as_deref()
            .ok_or(SessionError::NotConfigured("Voice agent"))?;
        let agent_id = agent_id
            .or_else(|| self.settings.retell_agent_id.clone())
            .ok_or(SessionError::NotConfigured("Voice agent id"))?;

        let url = format!(
            "{}/v2/create-web-call",
            self.settings.retell_base_url.trim_end_matches('/')
        );
        let response = self
            .post_json(&url, api_key, &json!({ "agent_id": agent_id }))
            .await?;

        let access_token = extract_access_token(&response).ok_or(SessionError::MissingToken)?;
        let call_id = response
            .get("call_id")
            .and_then(Value::as_str)
            .map(String::from);
        info!(?call_id, "Created voice agent web call");
        Ok(WebCall {
            access_token,
            call_id,
        })
    }

    pub async fn realtime_session(
        &self,
        model: Option<String>,
        voice: Option<String>,
    ) -> Result<RealtimeSession, SessionError> {
        let api_key = self
            .settings
            .openai_api_key
            .as_deref()
            .ok_or(SessionError::NotConfigured("Realtime voice"))?;
        let model = model.unwrap_or_else(|| self.settings.openai_model.clone());
        let voice = voice.unwrap_or_else(|| self.settings.openai_voice.clone());

        let url = format!(
            "{}/v1/realtime/sessions",
            self.settings.openai_base_url.trim_end_matches('/')
        );
        let response = self
            .post_json(&url, api_key, &json!({ "model": model, "voice": voice }))
            .await?;

        let (client_secret, expires_at) =
            extract_client_secret(&response).ok_or(SessionError::MissingToken)?;
        info!(%model, "Minted realtime voice session");
        Ok(RealtimeSession {
            client_secret,
            expires_at,
            model,
        })
    }

    async fn post_json(&self, url: &str, api_key: &str, body: &Value) -> Result<Value, SessionError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %url, %detail, "Voice vendor request failed");
            return Err(SessionError::Status(status.as_u16(), detail));
        }
        Ok(response.json::<Value>().await?)
    }
}

/// The call platform has returned the token under several names over time.
pub fn extract_access_token(response: &Value) -> Option<String> {
    ["access_token", "accessToken", "token"]
        .iter()
        .find_map(|key| response.get(*key).and_then(Value::as_str))
        .or_else(|| response.pointer("/call/access_token").and_then(Value::as_str))
        .filter(|token| !token.is_empty())
        .map(String::from)
}

pub fn extract_client_secret(response: &Value) -> Option<(String, Option<i64>)> {
    let secret = response
        .pointer("/client_secret/value")
        .and_then(Value::as_str)
        .or_else(|| response.get("client_secret").and_then(Value::as_str))
        .or_else(|| response.get("value").and_then(Value::as_str))
        .filter(|secret| !secret.is_empty())?;
    let expires_at = response
        .pointer("/client_secret/expires_at")
        .and_then(Value::as_i64)
        .or_else(|| response.get("expires_at").and_then(Value::as_i64));
    Some((secret.to_string(), expires_at))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutils::spawn_upstream;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use test_case::test_case;

    #[test_case(json!({"access_token": "a"}), Some("a"); "snake case")]
    #[test_case(json!({"accessToken": "b"}), Some("b"); "camel case")]
    #[test_case(json!({"token": "c"}), Some("c"); "plain token")]
    #[test_case(json!({"call": {"access_token": "d"}}), Some("d"); "nested call")]
    #[test_case(json!({"access_token": ""}), None; "empty")]
    #[test_case(json!({"status": "ok"}), None; "absent")]
    fn test_extract_access_token(response: Value, expected: Option<&str>) {
        assert_eq!(extract_access_token(&response).as_deref(), expected);
    }

    #[test_case(json!({"client_secret": {"value": "s1", "expires_at": 17}}), Some(("s1", Some(17))); "object")]
    #[test_case(json!({"client_secret": "s2"}), Some(("s2", None)); "string")]
    #[test_case(json!({"value": "s3", "expires_at": 9}), Some(("s3", Some(9))); "flat")]
    #[test_case(json!({"id": "sess"}), None; "absent")]
    fn test_extract_client_secret(response: Value, expected: Option<(&str, Option<i64>)>) {
        let extracted = extract_client_secret(&response);
        assert_eq!(
            extracted.as_ref().map(|(secret, expires)| (secret.as_str(), *expires)),
            expected
        );
    }

    fn fake_vendor() -> Router {
        Router::new()
            .route(
                "/v2/create-web-call",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    let authorized = headers
                        .get("authorization")
                        .and_then(|value| value.to_str().ok())
                        == Some("Bearer retell-key");
                    if !authorized {
                        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
                    }
                    (
                        StatusCode::CREATED,
                        Json(json!({
                            "accessToken": format!("token-for-{}", body["agent_id"].as_str().unwrap_or("")),
                            "call_id": "call_1"
                        })),
                    )
                }),
            )
            .route(
                "/v1/realtime/sessions",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "model": body["model"],
                        "client_secret": {"value": "ek_123", "expires_at": 1700000000}
                    }))
                }),
            )
    }

    fn settings(base: &str) -> VoiceSettings {
        VoiceSettings {
            retell_api_key: Some("retell-key".into()),
            retell_agent_id: Some("agent_default".into()),
            retell_base_url: base.into(),
            openai_api_key: Some("openai-key".into()),
            openai_model: "gpt-4o-realtime-preview".into(),
            openai_voice: "alloy".into(),
            openai_base_url: format!("{base}/"),
        }
    }

    #[tokio::test]
    async fn test_create_web_call_normalizes_token() {
        let (server, base) = spawn_upstream(fake_vendor()).await;
        let sessions = VoiceSessions::new(settings(&base)).unwrap();

        let call = sessions.create_web_call(None).await.unwrap();
        assert_eq!(call.access_token, "token-for-agent_default");
        assert_eq!(call.call_id.as_deref(), Some("call_1"));

        let call = sessions.create_web_call(Some("agent_x".into())).await.unwrap();
        assert_eq!(call.access_token, "token-for-agent_x");
        server.abort();
    }

    #[tokio::test]
    async fn test_vendor_rejection_is_status_error() {
        let (server, base) = spawn_upstream(fake_vendor()).await;
        let mut settings = settings(&base);
        settings.retell_api_key = Some("wrong".into());
        let sessions = VoiceSessions::new(settings).unwrap();

        assert!(matches!(
            sessions.create_web_call(None).await,
            Err(SessionError::Status(401, _))
        ));
        server.abort();
    }

    #[tokio::test]
    async fn test_realtime_session() {
        let (server, base) = spawn_upstream(fake_vendor()).await;
        let sessions = VoiceSessions::new(settings(&base)).unwrap();

        let session = sessions.realtime_session(None, None).await.unwrap();
        assert_eq!(session.client_secret, "ek_123");
        assert_eq!(session.expires_at, Some(1700000000));
        assert_eq!(session.model, "gpt-4o-realtime-preview");
        server.abort();
    }

    #[tokio::test]
    async fn test_missing_keys_are_not_configured() {
        let sessions = VoiceSessions::new(VoiceSettings::default()).unwrap();
        assert!(matches!(
            sessions.create_web_call(None).await,
            Err(SessionError::NotConfigured(_))
        ));
        assert!(matches!(
            sessions.realtime_session(None, None).await,
            Err(SessionError::NotConfigured(_))
        ));
    }
}
