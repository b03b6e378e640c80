use std::sync::Arc;

use tokio::sync::broadcast;

use leadbox_core::ChangeEvent;

use crate::client::ClientRegistry;

/// Subscribes to the store's change feed and forwards every event to the
/// connected WebSocket clients as wire JSON.
pub struct FeedBridge {
    registry: Arc<ClientRegistry>,
}

impl FeedBridge {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Start the bridge. Spawns a task that reads from the broadcast channel
    /// and fans serialized events out to every client.
    pub fn start(&self, mut rx: broadcast::Receiver<ChangeEvent>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(json) = serialize_event(&event) {
                            registry.broadcast(&json);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "feed bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("feed bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Create a feed bridge wired to a broadcast channel.
pub fn create_bridge(
    registry: Arc<ClientRegistry>,
    rx: broadcast::Receiver<ChangeEvent>,
) -> tokio::task::JoinHandle<()> {
    let bridge = FeedBridge::new(registry);
    bridge.start(rx)
}

/// Serialize a change event to its wire JSON.
pub fn serialize_event(event: &ChangeEvent) -> Option<String> {
    serde_json::to_string(event).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leadbox_core::{Inquiry, InquiryId, InquiryStatus};

    fn row(name: &str) -> Inquiry {
        Inquiry {
            id: InquiryId::new(),
            created_at: Utc::now(),
            name: name.into(),
            email: None,
            phone: None,
            selected_types: vec![],
            selected_package: None,
            budget: None,
            message: None,
            source_page: None,
            user_agent: None,
            status: InquiryStatus::New,
            seen_at: None,
        }
    }

    #[test]
    fn serialize_insert_event() {
        let event = ChangeEvent::Insert { row: row("Ada") };
        let json = serialize_event(&event).unwrap();
        assert!(json.contains("\"type\":\"insert\""));
        assert!(json.contains("Ada"));
    }

    #[test]
    fn serialize_delete_event() {
        let event = ChangeEvent::Delete {
            id: InquiryId::from_raw("inq_x"),
            status: Some(InquiryStatus::Lost),
        };
        let json = serialize_event(&event).unwrap();
        assert!(json.contains("\"type\":\"delete\""));
        assert!(json.contains("inq_x"));
    }

    #[tokio::test]
    async fn bridge_fans_events_out_to_clients() {
        let registry = Arc::new(ClientRegistry::new(32));
        let (tx, rx) = broadcast::channel(100);

        let (_client_id, mut client_rx) = registry.register();
        let handle = create_bridge(Arc::clone(&registry), rx);

        tx.send(ChangeEvent::Insert { row: row("Ada") }).unwrap();

        // give the bridge task time to process
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let msg = client_rx.try_recv().unwrap();
        assert!(msg.contains("insert"));

        handle.abort();
    }
}
