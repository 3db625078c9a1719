//! Outbound webhook delivery: payload serialization per registered content
//! type, HMAC-SHA256 body signatures, and bounded-retry HTTP dispatch.

pub mod xml;

use std::time::Duration;

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use sous_db::models::{Webhook, WebhookContentType};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 signature of the request body.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Attempts per webhook target; only 5xx responses are retried.
const MAX_SEND_ATTEMPTS: u32 = 3;

/// Errors producing a webhook body signature.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("webhook encryption key is not valid hex: {0}")]
    InvalidKey(#[from] hex::FromHexError),
}

/// Sign a request body with the household's hex-encoded key.
///
/// Returns the lowercase hex HMAC-SHA256 of the body, computed over the raw
/// key bytes obtained by hex-decoding `key_hex`.
pub fn sign_body(key_hex: &str, body: &[u8]) -> Result<String, SignatureError> {
    let key = hex::decode(key_hex)?;
    let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC can take key of any size");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Serialize a data-change payload for the webhook's registered content
/// type.
pub fn serialize_payload(
    content_type: WebhookContentType,
    payload: &serde_json::Value,
) -> Result<Vec<u8>> {
    match content_type {
        WebhookContentType::Json => {
            serde_json::to_vec(payload).context("failed to serialize webhook payload as JSON")
        }
        WebhookContentType::Xml => Ok(xml::render(payload).into_bytes()),
    }
}

/// The terminal result of delivering to one webhook target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The target answered 2xx.
    Delivered { status: u16 },
    /// The target answered non-2xx after the retry budget.
    Rejected { status: u16 },
    /// The request never completed (connect, TLS, or timeout).
    Failed { error: String },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// HTTP client for webhook POSTs, with a per-request deadline.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
}

impl WebhookClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self { http })
    }

    /// Deliver a signed body to one webhook target.
    ///
    /// 5xx responses are retried up to the bounded attempt budget; 4xx
    /// responses and transport errors are terminal. The caller decides what
    /// to do with the outcome; delivery failures never bounce the message
    /// back to the bus.
    pub async fn deliver(
        &self,
        webhook: &Webhook,
        body: Vec<u8>,
        signature: &str,
    ) -> DeliveryOutcome {
        let method = reqwest::Method::from_bytes(webhook.method.as_bytes()).unwrap_or_else(|_| {
            warn!(
                webhook_id = %webhook.id,
                method = %webhook.method,
                "unrecognized webhook method, falling back to POST"
            );
            reqwest::Method::POST
        });

        let mut last_outcome = DeliveryOutcome::Failed {
            error: "no attempt made".to_owned(),
        };

        for attempt in 1..=MAX_SEND_ATTEMPTS {
            let response = self
                .http
                .request(method.clone(), &webhook.url)
                .header(reqwest::header::CONTENT_TYPE, webhook.content_type.to_string())
                .header(SIGNATURE_HEADER, signature)
                .body(body.clone())
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return DeliveryOutcome::Delivered {
                            status: status.as_u16(),
                        };
                    }
                    last_outcome = DeliveryOutcome::Rejected {
                        status: status.as_u16(),
                    };
                    if !status.is_server_error() {
                        return last_outcome;
                    }
                    warn!(
                        webhook_id = %webhook.id,
                        status = status.as_u16(),
                        attempt,
                        "webhook target answered 5xx"
                    );
                }
                Err(err) => {
                    return DeliveryOutcome::Failed {
                        error: format!("{err:#}"),
                    };
                }
            }
        }

        last_outcome
    }
}
