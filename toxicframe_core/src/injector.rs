use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InjectError {
    #[error("Injection request failed: {0}")]
    Transport(String),
    #[error("Injection service rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Injection service sent {sent} of {requested} frames")]
    ShortSend { sent: u32, requested: u32 },
}

/// Control channel of the remote frame-injection service.
pub trait Injector: Send + Sync {
    /// `true` when the service answers its health probe.
    fn health(&self) -> bool;

    /// Transmits `frame` verbatim `count` times and returns how many were sent.
    fn send_raw(&self, frame: &[u8], count: u32) -> Result<u32, InjectError>;
}

#[derive(Serialize)]
struct SendRawRequest<'a> {
    hex: &'a str,
    count: u32,
}

#[derive(Deserialize)]
struct SendRawResponse {
    sent: u32,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// HTTP/JSON client for the packet generator's `/health` and `/send/raw` endpoints.
pub struct HttpInjector {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpInjector {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, InjectError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| InjectError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Injector for HttpInjector {
    fn health(&self) -> bool {
        let response = match self.client.get(format!("{}/health", self.base_url)).send() {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(status = r.status().as_u16(), "health check returned an error status");
                return false;
            }
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                return false;
            }
        };
        response
            .text()
            .ok()
            .and_then(|body| serde_json::from_str::<HealthResponse>(&body).ok())
            .is_some_and(|h| h.status == "ok")
    }

    fn send_raw(&self, frame: &[u8], count: u32) -> Result<u32, InjectError> {
        let hex = hex::encode(frame);
        let response = self
            .client
            .post(format!("{}/send/raw", self.base_url))
            .json(&SendRawRequest { hex: &hex, count })
            .send()
            .map_err(|e| InjectError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InjectError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .map_err(|e| InjectError::Transport(e.to_string()))?;
        let reply: SendRawResponse = serde_json::from_str(&body)
            .map_err(|e| InjectError::Transport(format!("malformed reply {body:?}: {e}")))?;
        if reply.sent < count {
            return Err(InjectError::ShortSend {
                sent: reply.sent,
                requested: count,
            });
        }
        Ok(reply.sent)
    }
}
