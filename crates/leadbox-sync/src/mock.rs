//! Scriptable in-memory backend for exercising the synchronizer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use leadbox_core::{
    BackendError, ChangeEvent, DataBackend, FeedMessage, FeedStream, Inquiry, InquiryId,
    InquiryStatus, StatusCounts, StatusFilter,
};

/// In-memory `DataBackend` whose failures and feed traffic are driven by the
/// test. Successful mutations echo change events the way the real store does.
pub struct MockBackend {
    rows: Mutex<Vec<Inquiry>>,
    feed: broadcast::Sender<FeedMessage>,
    fail_pages: AtomicBool,
    fail_next_update: AtomicBool,
    fail_next_mark_seen: AtomicBool,
    fail_subscribes: AtomicBool,
    page_gate: Mutex<Option<oneshot::Receiver<()>>>,
    last_page_filter: Mutex<Option<StatusFilter>>,
    page_calls: AtomicU32,
    count_calls: AtomicU32,
    update_calls: AtomicU32,
    mark_seen_calls: AtomicU32,
    subscribe_calls: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_rows(Vec::new())
    }

    pub fn with_rows(mut rows: Vec<Inquiry>) -> Self {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let (feed, _) = broadcast::channel(256);
        Self {
            rows: Mutex::new(rows),
            feed,
            fail_pages: AtomicBool::new(false),
            fail_next_update: AtomicBool::new(false),
            fail_next_mark_seen: AtomicBool::new(false),
            fail_subscribes: AtomicBool::new(false),
            page_gate: Mutex::new(None),
            last_page_filter: Mutex::new(None),
            page_calls: AtomicU32::new(0),
            count_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
            mark_seen_calls: AtomicU32::new(0),
            subscribe_calls: AtomicU32::new(0),
        }
    }

    /// Push a raw feed message to the current subscriber.
    pub fn push(&self, message: FeedMessage) {
        let _ = self.feed.send(message);
    }

    pub fn push_event(&self, event: ChangeEvent) {
        self.push(FeedMessage::Event(event));
    }

    /// Add a row to the server dataset and announce it on the feed.
    pub fn insert_row(&self, row: Inquiry) {
        {
            let mut rows = self.rows.lock();
            rows.push(row.clone());
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        self.push_event(ChangeEvent::Insert { row });
    }

    /// Server-authoritative counts, for reconvergence assertions.
    pub fn authoritative_counts(&self) -> StatusCounts {
        let rows = self.rows.lock();
        let mut counts = StatusCounts::default();
        for row in rows.iter() {
            counts.record_insert(row.status);
        }
        counts
    }

    pub fn fail_pages(&self, fail: bool) {
        self.fail_pages.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_status_update(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_mark_seen(&self) {
        self.fail_next_mark_seen.store(true, Ordering::SeqCst);
    }

    pub fn fail_subscribes(&self, fail: bool) {
        self.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    /// Park the next `fetch_page` call until the returned sender fires.
    pub fn gate_next_page(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.page_gate.lock() = Some(rx);
        tx
    }

    pub fn page_calls(&self) -> u32 {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> u32 {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn mark_seen_calls(&self) -> u32 {
        self.mark_seen_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> u32 {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn last_page_filter(&self) -> Option<StatusFilter> {
        *self.last_page_filter.lock()
    }

    pub fn row(&self, id: &InquiryId) -> Option<Inquiry> {
        self.rows.lock().iter().find(|r| &r.id == id).cloned()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataBackend for MockBackend {
    async fn fetch_page(
        &self,
        filter: StatusFilter,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Inquiry>, BackendError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_page_filter.lock() = Some(filter);

        let gate = self.page_gate.lock().take();
        if let Some(rx) = gate {
            let _ = rx.await;
        }

        if self.fail_pages.load(Ordering::SeqCst) {
            return Err(BackendError::Query("injected page failure".into()));
        }

        let rows = self.rows.lock();
        Ok(rows
            .iter()
            .filter(|r| filter.matches(r.status))
            .filter(|r| cursor.map_or(true, |c| r.created_at < c))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_counts(&self) -> Result<StatusCounts, BackendError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.authoritative_counts())
    }

    async fn fetch_unseen_count(&self) -> Result<u64, BackendError> {
        let rows = self.rows.lock();
        Ok(rows.iter().filter(|r| r.is_unseen()).count() as u64)
    }

    async fn update_status(
        &self,
        id: &InquiryId,
        status: InquiryStatus,
    ) -> Result<(), BackendError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            return Err(BackendError::Mutation("injected status failure".into()));
        }

        let (old, new) = {
            let mut rows = self.rows.lock();
            let row = rows
                .iter_mut()
                .find(|r| &r.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("inquiry {id}")))?;
            let old = row.clone();
            row.status = status;
            (old, row.clone())
        };
        self.push_event(ChangeEvent::Update {
            old: Some(old),
            new,
        });
        Ok(())
    }

    async fn mark_seen(&self, id: &InquiryId, at: DateTime<Utc>) -> Result<bool, BackendError> {
        self.mark_seen_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_mark_seen.swap(false, Ordering::SeqCst) {
            return Err(BackendError::Mutation("injected mark-seen failure".into()));
        }

        let event = {
            let mut rows = self.rows.lock();
            let row = rows
                .iter_mut()
                .find(|r| &r.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("inquiry {id}")))?;
            if row.seen_at.is_some() {
                return Ok(false);
            }
            let old = row.clone();
            row.seen_at = Some(at);
            ChangeEvent::Update {
                old: Some(old),
                new: row.clone(),
            }
        };
        self.push_event(event);
        Ok(true)
    }

    async fn subscribe(&self) -> Result<FeedStream, BackendError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribes.load(Ordering::SeqCst) {
            return Err(BackendError::Subscribe("injected subscribe failure".into()));
        }

        let rx = self.feed.subscribe();
        let messages = BroadcastStream::new(rx).map(|item| match item {
            Ok(message) => message,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                FeedMessage::ChannelError(format!("feed lagged by {n} events"))
            }
        });
        let stream = futures::stream::once(async { FeedMessage::Subscribed }).chain(messages);
        Ok(Box::pin(stream))
    }
}

/// Test fixture: an inquiry `secs` seconds after a fixed epoch.
pub fn inquiry_at(name: &str, status: InquiryStatus, secs: i64) -> Inquiry {
    Inquiry {
        id: InquiryId::from_raw(format!("inq_{name}")),
        created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        name: name.into(),
        email: None,
        phone: None,
        selected_types: vec![],
        selected_package: None,
        budget: None,
        message: None,
        source_page: None,
        user_agent: None,
        status,
        seen_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn page_fetch_applies_filter_and_cursor() {
        let mock = MockBackend::with_rows(vec![
            inquiry_at("a", InquiryStatus::New, 1),
            inquiry_at("b", InquiryStatus::Won, 2),
            inquiry_at("c", InquiryStatus::New, 3),
        ]);

        let page = mock
            .fetch_page(StatusFilter::Only(InquiryStatus::New), None, 10)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].name, "c");

        let older = mock
            .fetch_page(StatusFilter::All, Some(page[0].created_at), 10)
            .await
            .unwrap();
        assert_eq!(older.len(), 2);
        assert_eq!(older[0].name, "b");
    }

    #[tokio::test]
    async fn mutations_echo_feed_events() {
        let mock = MockBackend::with_rows(vec![inquiry_at("a", InquiryStatus::New, 1)]);
        let id = InquiryId::from_raw("inq_a");
        let mut feed = mock.subscribe().await.unwrap();
        assert!(matches!(feed.next().await, Some(FeedMessage::Subscribed)));

        mock.update_status(&id, InquiryStatus::Won).await.unwrap();
        match feed.next().await {
            Some(FeedMessage::Event(ChangeEvent::Update { new, .. })) => {
                assert_eq!(new.status, InquiryStatus::Won);
            }
            other => panic!("expected update event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let mock = MockBackend::with_rows(vec![inquiry_at("a", InquiryStatus::New, 1)]);
        let id = InquiryId::from_raw("inq_a");

        mock.fail_next_status_update();
        assert!(mock.update_status(&id, InquiryStatus::Won).await.is_err());
        assert!(mock.update_status(&id, InquiryStatus::Won).await.is_ok());
    }
}
