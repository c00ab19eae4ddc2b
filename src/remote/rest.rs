//! Hosted remote store client.
//!
//! Table operations go over HTTP against a PostgREST-style endpoint
//! (keyed upsert-on-conflict, ordered range query, filtered delete). The
//! change-notification and presence channel is a WebSocket carrying
//! [`ChannelFrame`]s; a background task decodes frames into
//! [`RemoteEvent`]s for subscribers and a second task keeps the channel
//! alive with heartbeats.
//!
//! Calls are at-most-once: there is no retry or backoff anywhere here. A
//! hung call never resolves and its dependent effects simply never fire.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{ChannelFrame, ClimberRecord, PresenceEntry, RemoteError, RemoteEvent, RemoteStore};
use crate::config::RemoteSettings;

/// Heartbeat interval on the notification channel.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Client for a hosted progress table and presence channel.
#[derive(Clone)]
pub struct RestRemoteStore {
    http: reqwest::Client,
    base_url: String,
    channel_url: String,
    api_key: String,
    table: String,
    event_tx: broadcast::Sender<RemoteEvent>,
    channel: Arc<Mutex<Option<WsSink>>>,
}

impl RestRemoteStore {
    /// Create a client from remote settings. Does not open the channel;
    /// call [`RemoteStore::connect`] for that.
    pub fn new(settings: &RemoteSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        let (event_tx, _) = broadcast::channel(256);

        Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            channel_url: settings.channel_url.clone(),
            api_key: settings.api_key.clone(),
            table: settings.table.clone(),
            event_tx,
            channel: Arc::new(Mutex::new(None)),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.base_url, self.table)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send_frame(&self, frame: &ChannelFrame) -> Result<(), RemoteError> {
        let text = serde_json::to_string(frame)
            .map_err(|e| RemoteError::InvalidPayload(e.to_string()))?;

        let mut guard = self.channel.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| RemoteError::ChannelUnavailable("channel not open".to_string()))?;

        if let Err(e) = sink.send(Message::Text(text)).await {
            // A failed write means the channel is gone; drop the sink so
            // later sends report unavailable instead of hanging.
            *guard = None;
            return Err(RemoteError::ChannelUnavailable(e.to_string()));
        }

        Ok(())
    }

    fn spawn_reader(&self, mut stream: WsStream) {
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ChannelFrame>(&text) {
                        Ok(frame) => {
                            if let Some(event) = event_for_frame(frame) {
                                let _ = event_tx.send(event);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Dropping malformed channel frame: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Notification channel read error: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Notification channel closed");
        });
    }

    fn spawn_heartbeat(&self) {
        let channel = Arc::clone(&self.channel);

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
            interval.tick().await;

            loop {
                interval.tick().await;

                let mut guard = channel.lock().await;
                let Some(sink) = guard.as_mut() else {
                    break;
                };

                let text = match serde_json::to_string(&ChannelFrame::Heartbeat) {
                    Ok(text) => text,
                    Err(_) => break,
                };

                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!("Heartbeat failed, dropping channel: {}", e);
                    *guard = None;
                    break;
                }
            }
        });
    }
}

/// Map a decoded wire frame to a subscriber event. Frames that fail
/// payload validation are rejected here, before any subscriber sees them.
fn event_for_frame(frame: ChannelFrame) -> Option<RemoteEvent> {
    match frame {
        ChannelFrame::Insert(record) => match record.validate() {
            Ok(()) => Some(RemoteEvent::RecordInserted(record)),
            Err(e) => {
                tracing::warn!("Rejecting insert notification: {}", e);
                None
            }
        },
        ChannelFrame::Update(record) => match record.validate() {
            Ok(()) => Some(RemoteEvent::RecordUpdated(record)),
            Err(e) => {
                tracing::warn!("Rejecting update notification: {}", e);
                None
            }
        },
        ChannelFrame::PresenceSync { online } => Some(RemoteEvent::PresenceSync { online }),
        _ => None,
    }
}

impl RemoteStore for RestRemoteStore {
    async fn connect(&self) -> Result<(), RemoteError> {
        let (socket, _response) = connect_async(self.channel_url.as_str())
            .await
            .map_err(|e| RemoteError::ChannelUnavailable(e.to_string()))?;

        let (mut sink, stream) = socket.split();

        let subscribe = ChannelFrame::Subscribe {
            table: self.table.clone(),
        };
        let text = serde_json::to_string(&subscribe)
            .map_err(|e| RemoteError::InvalidPayload(e.to_string()))?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| RemoteError::ChannelUnavailable(e.to_string()))?;

        *self.channel.lock().await = Some(sink);

        self.spawn_reader(stream);
        self.spawn_heartbeat();

        tracing::info!("Subscribed to change notifications for '{}'", self.table);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RemoteError> {
        if let Some(mut sink) = self.channel.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
        Ok(())
    }

    async fn upsert_climber(&self, record: ClimberRecord) -> Result<(), RemoteError> {
        record.validate()?;

        let response = self
            .authed(self.http.post(self.table_url()))
            .query(&[("on_conflict", "username")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&[record])
            .send()
            .await
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::RequestFailed(format!(
                "upsert returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn fetch_climbers(&self, limit: Option<usize>) -> Result<Vec<ClimberRecord>, RemoteError> {
        let mut request = self
            .authed(self.http.get(self.table_url()))
            .query(&[("select", "*"), ("order", "total_steps.desc")]);

        if let Some(limit) = limit {
            request = request.query(&[("limit", limit.to_string())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::RequestFailed(format!(
                "fetch returned {}",
                response.status()
            )));
        }

        let mut records: Vec<ClimberRecord> = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidPayload(e.to_string()))?;

        records.retain(|record| match record.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping malformed climber row: {}", e);
                false
            }
        });

        Ok(records)
    }

    async fn fetch_climber(&self, name: &str) -> Result<Option<ClimberRecord>, RemoteError> {
        let filter = format!("eq.{}", name);
        let response = self
            .authed(self.http.get(self.table_url()))
            .query(&[("select", "*"), ("username", filter.as_str()), ("limit", "1")])
            .send()
            .await
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::RequestFailed(format!(
                "fetch returned {}",
                response.status()
            )));
        }

        let mut records: Vec<ClimberRecord> = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidPayload(e.to_string()))?;

        match records.pop() {
            Some(record) => {
                record.validate()?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn delete_climber(&self, name: &str) -> Result<(), RemoteError> {
        let response = self
            .authed(self.http.delete(self.table_url()))
            .query(&[("username", &format!("eq.{}", name))])
            .send()
            .await
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::RequestFailed(format!(
                "delete returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn delete_all_climbers(&self) -> Result<(), RemoteError> {
        // The endpoint refuses an unfiltered bulk delete; every row
        // matches the zero floor.
        let response = self
            .authed(self.http.delete(self.table_url()))
            .query(&[("total_steps", "gte.0")])
            .send()
            .await
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::RequestFailed(format!(
                "delete-all returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn track_presence(&self, entry: PresenceEntry) -> Result<(), RemoteError> {
        self.send_frame(&ChannelFrame::Track(entry)).await
    }

    async fn untrack_presence(&self, name: &str) -> Result<(), RemoteError> {
        self.send_frame(&ChannelFrame::Untrack {
            name: name.to_string(),
        })
        .await
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(name: &str, steps: u64) -> ClimberRecord {
        ClimberRecord {
            name: name.to_string(),
            total_steps: steps,
            station: "Trailhead".to_string(),
            updated_at: Utc.timestamp_millis_opt(1_754_500_000_000).unwrap(),
        }
    }

    #[test]
    fn test_insert_frame_becomes_event() {
        let event = event_for_frame(ChannelFrame::Insert(record("aiko", 100)));
        assert!(matches!(event, Some(RemoteEvent::RecordInserted(_))));
    }

    #[test]
    fn test_invalid_record_frame_is_rejected() {
        let event = event_for_frame(ChannelFrame::Insert(record("", 100)));
        assert!(event.is_none());
    }

    #[test]
    fn test_heartbeat_frame_produces_no_event() {
        assert!(event_for_frame(ChannelFrame::Heartbeat).is_none());
    }

    #[test]
    fn test_presence_sync_frame_carries_count() {
        match event_for_frame(ChannelFrame::PresenceSync { online: 12 }) {
            Some(RemoteEvent::PresenceSync { online }) => assert_eq!(online, 12),
            other => panic!("Wrong event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sends_fail_before_connect() {
        let store = RestRemoteStore::new(&RemoteSettings::default());
        let entry = PresenceEntry {
            name: "aiko".to_string(),
            elevation_m: 0.0,
            updated_at: Utc.timestamp_millis_opt(1_754_500_000_000).unwrap(),
        };

        let result = store.track_presence(entry).await;
        assert!(matches!(result, Err(RemoteError::ChannelUnavailable(_))));
    }
}
