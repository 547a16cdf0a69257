//! Outbound message transport.
//!
//! The forwarder only sees the [`Transport`] trait; the Telegram Bot API
//! implementation lives behind it so tests can swap in a mock. Retry policy
//! follows Telegram's documented behavior: 429 honors the server-supplied
//! `retry_after`, 5xx and network errors back off exponentially (capped),
//! any other non-2xx status is fatal for the attempt.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Structured error types for outbound sends.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by Telegram (retries exhausted, last retry_after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("server error HTTP {status} (retries exhausted)")]
    ServerError { status: u16 },

    #[error("request rejected: HTTP {status}: {description}")]
    Rejected { status: u16, description: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

/// Capability the forwarder uses to deliver a formatted message.
pub trait Transport {
    /// Deliver one message. An `Err` means the record must be retried on a
    /// later run; the implementation has already exhausted its own retries.
    fn send(&self, text: &str) -> Result<(), TransportError>;
}

/// Bot identity returned by `getMe`, used by the verify command.
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    pub first_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    // No serde(default) here: it would put a `T: Default` bound on the
    // derived impl, and a missing Option field already reads as None.
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ApiParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Telegram Bot API transport over blocking HTTP.
pub struct TelegramTransport {
    client: reqwest::blocking::Client,
    bot_token: String,
    chat_id: String,
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl TelegramTransport {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            max_retries: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(15),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Call `getMe` to confirm the token is live. No retry: this is a
    /// diagnostic roundtrip, not a delivery path.
    pub fn verify(&self) -> Result<BotIdentity, TransportError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = resp.status();
        let envelope: ApiEnvelope<BotIdentity> = resp
            .json()
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        if !envelope.ok {
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                description: envelope
                    .description
                    .unwrap_or_else(|| "getMe returned ok=false".into()),
            });
        }
        envelope
            .result
            .ok_or_else(|| TransportError::InvalidResponse("getMe returned no result".into()))
    }

    fn send_with_retry(&self, text: &str) -> Result<(), TransportError> {
        let url = self.api_url("sendMessage");
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let mut backoff = self.base_backoff;

        for attempt in 0..=self.max_retries {
            let result = self.client.post(&url).json(&payload).send();

            let resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(TransportError::Network(e.to_string()));
                    }
                    warn!(attempt, error = %e, "send attempt failed, backing off");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(self.max_backoff);
                    continue;
                }
            };

            let status = resp.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = resp
                    .json::<ApiEnvelope<serde_json::Value>>()
                    .ok()
                    .and_then(|env| env.parameters)
                    .and_then(|p| p.retry_after)
                    .unwrap_or(3);

                if attempt >= self.max_retries {
                    return Err(TransportError::RateLimited {
                        retry_after_secs: retry_after,
                    });
                }
                warn!(attempt, retry_after, "rate limited, honoring retry_after");
                std::thread::sleep(Duration::from_secs(retry_after.max(1)));
                continue;
            }

            if status.is_server_error() {
                if attempt >= self.max_retries {
                    return Err(TransportError::ServerError {
                        status: status.as_u16(),
                    });
                }
                warn!(attempt, status = status.as_u16(), "server error, backing off");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(self.max_backoff);
                continue;
            }

            if !status.is_success() {
                // Client errors (bad token, unknown chat) will not heal on
                // retry.
                let description = resp
                    .json::<ApiEnvelope<serde_json::Value>>()
                    .ok()
                    .and_then(|env| env.description)
                    .unwrap_or_default();
                return Err(TransportError::Rejected {
                    status: status.as_u16(),
                    description,
                });
            }

            return Ok(());
        }

        unreachable!("retry loop always returns")
    }
}

impl Transport for TelegramTransport {
    fn send(&self, text: &str) -> Result<(), TransportError> {
        self.send_with_retry(text)
    }
}
