//! HTTP and WebSocket client for the Dispatch server

use anyhow::{anyhow, Result};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;
use uuid::Uuid;

use crate::messages::{
    ConsentGrant, ConsentRequest, RevokeRequest, RevokeResult, WorkflowEvent, WorkflowRequest,
    WorkflowResult,
};

/// Client for the Dispatch HTTP API
pub struct DispatchClient {
    http: reqwest::Client,
    base_url: String,
}

impl DispatchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Submit a workflow run
    pub async fn run_workflow(&self, request: &WorkflowRequest) -> Result<WorkflowResult> {
        let response = self
            .http
            .post(format!("{}/workflows", self.base_url))
            .json(request)
            .send()
            .await?;
        parse_response(response).await
    }

    /// Fetch a stored workflow execution as raw JSON
    pub async fn get_workflow(&self, id: Uuid) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}/workflows/{}", self.base_url, id))
            .send()
            .await?;
        parse_response(response).await
    }

    /// Request consent for a delegatee agent
    pub async fn grant_consent(&self, request: &ConsentRequest) -> Result<ConsentGrant> {
        let response = self
            .http
            .post(format!("{}/consents", self.base_url))
            .json(request)
            .send()
            .await?;
        parse_response(response).await
    }

    /// Revoke a consent record
    pub async fn revoke_consent(&self, id: Uuid, requester_id: &str) -> Result<RevokeResult> {
        let response = self
            .http
            .post(format!("{}/consents/{}/revoke", self.base_url, id))
            .json(&RevokeRequest {
                requester_id: requester_id.to_string(),
            })
            .send()
            .await?;
        parse_response(response).await
    }

    /// Connect to the event stream and forward parsed events on a channel
    pub async fn watch_events(&self) -> Result<mpsc::Receiver<WorkflowEvent>> {
        let ws_url = websocket_url(&self.base_url)?;
        tracing::info!("Connecting to {}", ws_url);
        let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
        let (_, mut read) = ws_stream.split();

        let (tx, rx) = mpsc::channel::<WorkflowEvent>(32);
        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<WorkflowEvent>(&text) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Failed to parse event: {} - {}", e, text);
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    Ok(_) => {}
                }
            }
        });

        Ok(rx)
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(anyhow!("server returned {}: {}", status, text));
    }
    Ok(response.json().await?)
}

/// Derive the `/ws` endpoint from the HTTP base URL
fn websocket_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?.join("/ws")?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(anyhow!("unsupported scheme: {}", other)),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("failed to set websocket scheme"))?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_from_http() {
        let url = websocket_url("http://localhost:3000").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3000/ws");
    }

    #[test]
    fn test_websocket_url_from_https() {
        let url = websocket_url("https://dispatch.example.com").unwrap();
        assert_eq!(url.as_str(), "wss://dispatch.example.com/ws");
    }

    #[test]
    fn test_websocket_url_rejects_other_schemes() {
        assert!(websocket_url("ftp://example.com").is_err());
    }
}
