//! alloy-backed [`ChainProvider`].
//!
//! Reads go over HTTP through an alloy provider. The live feed is an
//! `eth_subscribe("logs")` WebSocket session with ping/pong health checks
//! and exponential reconnect backoff.

use std::time::{Duration, Instant};

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::error::ChainError;
use crate::provider::{BlockInfo, ChainProvider, RawLog};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// How a WebSocket session ended.
enum SessionEnd {
    Cancelled,
    SinkClosed,
    Disconnected,
}

/// WebSocket settings for the live feed.
#[derive(Debug, Clone)]
pub struct WsSettings {
    /// `None` disables the live feed
    pub url: Option<String>,
    pub reconnect_max_delay: Duration,
    /// No pong for this long triggers a reconnect
    pub pong_timeout: Duration,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_max_delay: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

/// Derive a WebSocket URL from an HTTP RPC URL.
pub fn derive_ws_url(rpc_url: &str) -> Option<String> {
    if let Some(rest) = rpc_url.strip_prefix("https://") {
        Some(format!("wss://{}", rest))
    } else {
        rpc_url
            .strip_prefix("http://")
            .map(|rest| format!("ws://{}", rest))
    }
}

/// [`ChainProvider`] over any alloy [`Provider`].
pub struct RpcChainProvider<P> {
    provider: P,
    ws: WsSettings,
}

impl<P: Provider> RpcChainProvider<P> {
    pub fn new(provider: P, ws: WsSettings) -> Self {
        Self { provider, ws }
    }

    async fn run_session(
        &self,
        ws_url: &str,
        addresses: &[Address],
        sink: &mpsc::Sender<RawLog>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, ChainError> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (mut write, mut read) = ws_stream.split();
        tracing::info!("🔌 WebSocket connected");

        let addresses: Vec<String> = addresses.iter().map(|a| format!("{:?}", a)).collect();
        let subscribe_msg = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["logs", { "address": addresses }]
        });

        write
            .send(Message::Text(subscribe_msg.to_string().into()))
            .await
            .map_err(|e| ChainError::Subscription(e.to_string()))?;

        let mut ping_interval = interval(PING_INTERVAL);
        let mut pong_check_interval = interval(PONG_CHECK_INTERVAL);
        let mut last_pong = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("🛑 Log subscription cancelled");
                    return Ok(SessionEnd::Cancelled);
                }
                _ = ping_interval.tick() => {
                    if write.send(Message::Ping(vec![].into())).await.is_err() {
                        tracing::warn!("Failed to send ping");
                        return Ok(SessionEnd::Disconnected);
                    }
                    tracing::trace!("Ping sent");
                }
                _ = pong_check_interval.tick() => {
                    let elapsed = last_pong.elapsed();
                    if elapsed > self.ws.pong_timeout {
                        tracing::warn!(
                            "⚠️ No pong received for {}s, triggering reconnect",
                            elapsed.as_secs()
                        );
                        return Ok(SessionEnd::Disconnected);
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(log) = parse_subscription_message(&text) {
                                if sink.send(log).await.is_err() {
                                    return Ok(SessionEnd::SinkClosed);
                                }
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_pong = Instant::now();
                            tracing::trace!("Pong received, connection healthy");
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("WebSocket closed by server");
                            return Ok(SessionEnd::Disconnected);
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Ok(SessionEnd::Disconnected);
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

/// Extract a log from an `eth_subscription` notification.
///
/// Subscription confirmations and anything unparseable yield `None`.
fn parse_subscription_message(text: &str) -> Option<RawLog> {
    let json: serde_json::Value = serde_json::from_str(text).ok()?;

    if let Some(id) = json.get("result").and_then(|r| r.as_str()) {
        tracing::info!("📋 Subscription confirmed: {}", id);
        return None;
    }

    let result = json.get("params")?.get("result")?;
    match serde_json::from_value::<Log>(result.clone()) {
        Ok(log) => Some(log.into()),
        Err(e) => {
            tracing::debug!("Ignoring unparseable log notification: {}", e);
            None
        }
    }
}

#[async_trait]
impl<P> ChainProvider for RpcChainProvider<P>
where
    P: Provider + Send + Sync,
{
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to get chain id: {}", e)))
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to get block number: {}", e)))
    }

    async fn get_logs(
        &self,
        address: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        let filter = Filter::new().address(address).from_block(from).to_block(to);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to get logs: {}", e)))?;
        Ok(logs.into_iter().map(RawLog::from).collect())
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to get block {}: {}", number, e)))?;

        Ok(block.map(|b| BlockInfo {
            number: b.header.inner.number,
            hash: b.header.hash,
            timestamp: b.header.inner.timestamp,
        }))
    }

    async fn watch_logs(
        &self,
        addresses: Vec<Address>,
        sink: mpsc::Sender<RawLog>,
        cancel: CancellationToken,
    ) -> Result<(), ChainError> {
        let Some(ws_url) = self.ws.url.clone() else {
            tracing::info!("📊 No WebSocket URL configured, relying on polling");
            cancel.cancelled().await;
            return Ok(());
        };

        if addresses.is_empty() {
            cancel.cancelled().await;
            return Ok(());
        }

        let mut retry_delay = INITIAL_RECONNECT_DELAY;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() || sink.is_closed() {
                return Ok(());
            }

            tracing::info!("🔌 Connecting to WebSocket: {}", ws_url);
            match self.run_session(&ws_url, &addresses, &sink, &cancel).await {
                Ok(SessionEnd::Cancelled) | Ok(SessionEnd::SinkClosed) => return Ok(()),
                Ok(SessionEnd::Disconnected) => {
                    attempt = 0;
                    retry_delay = INITIAL_RECONNECT_DELAY;
                }
                Err(e) => {
                    attempt += 1;
                    tracing::error!("❌ WebSocket error (attempt {}): {}", attempt, e);
                }
            }

            tracing::info!("⏳ Reconnecting in {:?}...", retry_delay);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = sleep(retry_delay) => {}
            }
            retry_delay = std::cmp::min(retry_delay * 2, self.ws.reconnect_max_delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_ws_url() {
        assert_eq!(
            derive_ws_url("https://polygon-rpc.com").as_deref(),
            Some("wss://polygon-rpc.com")
        );
        assert_eq!(
            derive_ws_url("http://localhost:8545").as_deref(),
            Some("ws://localhost:8545")
        );
        assert_eq!(derive_ws_url("ipc:///tmp/geth.ipc"), None);
    }

    #[test]
    fn test_parse_subscription_confirmation() {
        let msg = r#"{"jsonrpc":"2.0","id":1,"result":"0xcd0c3e8af590364c09d0fa6a1210faf5"}"#;
        assert!(parse_subscription_message(msg).is_none());
    }

    #[test]
    fn test_parse_log_notification() {
        let msg = r#"{
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0xcd0c3e8af590364c09d0fa6a1210faf5",
                "result": {
                    "address": "0x8320fe7702b96808f7bbc0d4a888ed1468216cfd",
                    "blockHash": "0x61cdb2a09ab99abf791d474f20c2ea89bf8de2923a2d42bb49944c8c993cbf04",
                    "blockNumber": "0x29e87",
                    "data": "0x00000000000000000000000000000000000000000000000000000000000003e8",
                    "logIndex": "0x0",
                    "topics": ["0xd78a0cb8bb633d06981248b816e7bd33c2a35a6089241d099fa519e361cab902"],
                    "transactionHash": "0xe044554a0a55067caafd07f8020ab9f2af60bdfe337e395ecd84b4877a3d1ab4",
                    "transactionIndex": "0x0",
                    "removed": false
                }
            }
        }"#;

        let log = parse_subscription_message(msg).unwrap();
        assert_eq!(log.block_number, Some(0x29e87));
        assert_eq!(log.log_index, Some(0));
        assert_eq!(log.topics.len(), 1);
        assert_eq!(log.data.len(), 32);
        assert!(!log.removed);
    }
}
