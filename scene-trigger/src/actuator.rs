/// Scene actuation
///
/// [`SceneActuator`] is what the monitor calls when the engine fires. The
/// SwitchBot implementation executes a manual scene through the v1.1 cloud
/// API. Every failure is logged here and swallowed: the caller only ever
/// invokes.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://api.switch-bot.com/v1.1";

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("Missing SwitchBot credential: {0}")]
    MissingCredential(&'static str),

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API returned HTTP {0}: {1}")]
    Status(u16, String),
}

/// Something that runs the scene when told to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SceneActuator: Send + Sync {
    /// Fire and forget. Failures are reported through logging only.
    async fn invoke(&self);
}

/// SwitchBot API credentials and target scene
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchBotConfig {
    pub token: Option<String>,
    pub secret: Option<String>,
    pub scene_id: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SwitchBotConfig {
    fn default() -> Self {
        Self {
            token: None,
            secret: None,
            scene_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for SwitchBotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("SwitchBotConfig")
            .field("token", &redact(&self.token))
            .field("secret", &redact(&self.secret))
            .field("scene_id", &self.scene_id)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SwitchBotConfig {
    pub fn is_complete(&self) -> bool {
        self.token.is_some() && self.secret.is_some() && self.scene_id.is_some()
    }
}

/// `sign` header value: base64(HMAC-SHA256(secret, token + t + nonce))
pub fn sign_request(token: &str, secret: &str, t: u128, nonce: &str) -> Result<String, ActuatorError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ActuatorError::Signing(e.to_string()))?;
    mac.update(format!("{}{}{}", token, t, nonce).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub struct SwitchBotActuator {
    config: SwitchBotConfig,
    client: reqwest::Client,
}

impl SwitchBotActuator {
    pub fn new(config: SwitchBotConfig) -> Result<Self, ActuatorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if !config.is_complete() {
            error!("SwitchBot credentials incomplete; scene execution will fail");
        }

        Ok(Self { config, client })
    }

    pub fn scene_url(&self) -> Result<String, ActuatorError> {
        let scene_id = self
            .config
            .scene_id
            .as_deref()
            .ok_or(ActuatorError::MissingCredential("SWITCHBOT_SCENE"))?;

        Ok(format!(
            "{}/scenes/{}/execute",
            self.config.base_url.trim_end_matches('/'),
            scene_id
        ))
    }

    /// Authentication headers for one request, with a fresh timestamp and nonce
    pub fn signed_headers(&self) -> Result<HeaderMap, ActuatorError> {
        let token = self
            .config
            .token
            .as_deref()
            .ok_or(ActuatorError::MissingCredential("SWITCHBOT_TOKEN"))?;
        let secret = self
            .config
            .secret
            .as_deref()
            .ok_or(ActuatorError::MissingCredential("SWITCHBOT_SECRET"))?;

        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ActuatorError::Signing(e.to_string()))?
            .as_millis();
        let nonce = Uuid::new_v4().to_string();
        let sign = sign_request(token, secret, t, &nonce)?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(token)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("charset", HeaderValue::from_static("utf8"));
        headers.insert("t", HeaderValue::from_str(&t.to_string())?);
        headers.insert("sign", HeaderValue::from_str(&sign)?);
        headers.insert("nonce", HeaderValue::from_str(&nonce)?);
        Ok(headers)
    }

    /// Execute the configured scene, returning the API's JSON response
    pub async fn execute_scene(&self) -> Result<serde_json::Value, ActuatorError> {
        let url = self.scene_url()?;
        let headers = self.signed_headers()?;

        debug!("POST {}", url);
        let resp = self.client.post(&url).headers(headers).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ActuatorError::Status(status.as_u16(), body));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl SceneActuator for SwitchBotActuator {
    async fn invoke(&self) {
        match self.execute_scene().await {
            Ok(body) => {
                let pretty = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
                info!("Scene executed, response:\n{}", pretty);
            }
            Err(e) => error!("Scene execution failed: {}", e),
        }
    }
}
