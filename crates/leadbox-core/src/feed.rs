use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::ids::InquiryId;
use crate::inquiry::{Inquiry, InquiryStatus};

/// A single change observed on the inquiries dataset.
///
/// `old` on updates and `status` on deletes carry whatever the feed source
/// knew about the prior row; consumers must tolerate their absence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Insert {
        row: Inquiry,
    },
    Update {
        old: Option<Inquiry>,
        new: Inquiry,
    },
    Delete {
        id: InquiryId,
        status: Option<InquiryStatus>,
    },
}

impl ChangeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    /// The id of the affected row.
    pub fn inquiry_id(&self) -> &InquiryId {
        match self {
            Self::Insert { row } => &row.id,
            Self::Update { new, .. } => &new.id,
            Self::Delete { id, .. } => id,
        }
    }
}

/// Messages delivered over one live subscription.
///
/// Delivery is at-least-once and events of different types carry no ordering
/// guarantee relative to each other. `Subscribed` is emitted once the channel
/// is established; `ChannelError` and `TimedOut` end the subscription and the
/// consumer is expected to resubscribe.
#[derive(Clone, Debug)]
pub enum FeedMessage {
    Subscribed,
    Event(ChangeEvent),
    ChannelError(String),
    TimedOut,
}

/// One live connection to the change feed. Dropping the stream releases it.
pub type FeedStream = Pin<Box<dyn Stream<Item = FeedMessage> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row() -> Inquiry {
        Inquiry {
            id: InquiryId::new(),
            created_at: Utc::now(),
            name: "Grace".into(),
            email: Some("grace@example.com".into()),
            phone: None,
            selected_types: vec!["wedding".into()],
            selected_package: None,
            budget: Some(2500),
            message: None,
            source_page: None,
            user_agent: None,
            status: InquiryStatus::New,
            seen_at: None,
        }
    }

    #[test]
    fn event_type_strings() {
        assert_eq!(ChangeEvent::Insert { row: row() }.event_type(), "insert");
        assert_eq!(
            ChangeEvent::Delete {
                id: InquiryId::new(),
                status: None
            }
            .event_type(),
            "delete"
        );
    }

    #[test]
    fn inquiry_id_points_at_affected_row() {
        let r = row();
        let id = r.id.clone();
        let event = ChangeEvent::Update {
            old: None,
            new: r,
        };
        assert_eq!(event.inquiry_id(), &id);
    }

    #[test]
    fn serde_roundtrip_preserves_tag() {
        let events = vec![
            ChangeEvent::Insert { row: row() },
            ChangeEvent::Update {
                old: Some(row()),
                new: row(),
            },
            ChangeEvent::Delete {
                id: InquiryId::new(),
                status: Some(InquiryStatus::Bad),
            },
        ];

        for event in &events {
            let json = serde_json::to_string(event).unwrap();
            assert!(json.contains(&format!("\"type\":\"{}\"", event.event_type())));
            let parsed: ChangeEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed.event_type(), event.event_type());
        }
    }
}
