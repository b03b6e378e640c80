use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use leadbox_core::{
    DataBackend, FeedMessage, FeedStream, Inquiry, InquiryId, InquiryStatus, StatusCounts,
    StatusFilter,
};

use crate::config::SyncConfig;
use crate::view::{ConnectionState, ViewCell, ViewSnapshot};

/// Pre-image captured before an optimistic status write, so a failed server
/// write can be reverted exactly.
struct PendingMutation {
    row: Inquiry,
    counts: StatusCounts,
}

/// Keeps a client-side inquiry list consistent with the live, filterable,
/// server-side dataset.
///
/// One instance owns the view state for one inbox screen. It loads the first
/// page on `start`, extends it through `load_more`, patches it continuously
/// from the change feed (reconnecting with capped exponential backoff when
/// the channel drops), and applies operator mutations optimistically. All of
/// it funnels through one state cell, so the rendering layer always reads a
/// complete snapshot.
pub struct InboxSynchronizer<B: DataBackend> {
    shared: Arc<Shared<B>>,
    feed_task: Mutex<Option<JoinHandle<()>>>,
}

/// State the feed task needs to outlive the public handle's borrows.
struct Shared<B> {
    backend: Arc<B>,
    config: SyncConfig,
    view: Arc<ViewCell>,
    cancel: CancellationToken,
    ui_timer: Mutex<Option<JoinHandle<()>>>,
}

impl<B: DataBackend> InboxSynchronizer<B> {
    pub fn new(backend: Arc<B>, config: SyncConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                view: Arc::new(ViewCell::new()),
                cancel: CancellationToken::new(),
                ui_timer: Mutex::new(None),
            }),
            feed_task: Mutex::new(None),
        }
    }

    /// Load the initial page and counts, then keep the view live.
    pub async fn start(&self) {
        self.shared.view.update(|st| st.loading = true);
        self.shared.resync().await;
        self.shared.view.update(|st| st.loading = false);

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move { shared.feed_loop().await });
        *self.feed_task.lock() = Some(handle);
    }

    /// Current view, as one complete snapshot.
    pub fn snapshot(&self) -> ViewSnapshot {
        self.shared.view.snapshot()
    }

    /// Receiver that yields a fresh snapshot after every state transition.
    pub fn watch(&self) -> watch::Receiver<ViewSnapshot> {
        self.shared.view.watch()
    }

    /// Full resynchronization: page 1 for the current filter plus fresh
    /// counts. Wired to pull-to-refresh and to the window becoming visible
    /// again after backgrounding.
    pub async fn refresh(&self) {
        self.shared.resync().await;
    }

    /// Fetch the next (older) page. Silently a no-op while a load is already
    /// in flight, when the dataset is exhausted, or when there is no cursor.
    pub async fn load_more(&self) {
        let shared = &self.shared;
        let Some((filter, cursor, generation)) = shared.view.update(|st| {
            if st.loading || st.loading_more || !st.has_more {
                return None;
            }
            let cursor = st.rows.last()?.created_at;
            st.loading_more = true;
            Some((st.filter, cursor, st.generation))
        }) else {
            return;
        };

        let result = shared
            .backend
            .fetch_page(filter, Some(cursor), shared.config.page_size)
            .await;

        let cancelled = shared.cancel.is_cancelled();
        let page_size = shared.config.page_size;
        shared.view.update(|st| {
            st.loading_more = false;
            // The filter may have moved while the fetch was in flight; a page
            // for the abandoned filter must not be appended.
            if cancelled || st.generation != generation {
                return;
            }
            match result {
                Ok(rows) => st.append_rows(rows, page_size),
                Err(e) => {
                    warn!(error = %e, "load more failed");
                    st.error = Some(e.to_string());
                }
            }
        });
    }

    /// Select a stage filter. Re-selecting the active stage toggles back to
    /// All. Any actual change resets pagination and refetches page 1 rather
    /// than filtering the rows already on hand.
    pub async fn change_filter(&self, selection: StatusFilter) {
        let shared = &self.shared;
        let Some((filter, generation)) = shared.view.update(|st| {
            let next = if selection != StatusFilter::All && selection == st.filter {
                StatusFilter::All
            } else {
                selection
            };
            if next == st.filter {
                return None;
            }
            st.set_filter(next);
            st.loading = true;
            Some((next, st.generation))
        }) else {
            return;
        };

        debug!(filter = %filter, "filter changed, refetching");
        let result = shared
            .backend
            .fetch_page(filter, None, shared.config.page_size)
            .await;

        let cancelled = shared.cancel.is_cancelled();
        let page_size = shared.config.page_size;
        shared.view.update(|st| {
            if cancelled || st.generation != generation {
                return;
            }
            st.loading = false;
            match result {
                Ok(rows) => {
                    st.replace_rows(rows, page_size);
                    st.error = None;
                }
                Err(e) => st.error = Some(e.to_string()),
            }
        });
    }

    /// Move an inquiry to another stage, optimistically. The row and count
    /// pre-images are captured first; a failed server write restores both
    /// exactly and surfaces the error. On success the row leaves the visible
    /// sequence if it no longer matches the active filter.
    pub async fn set_status(&self, id: &InquiryId, status: InquiryStatus) {
        let shared = &self.shared;
        let pending = shared.view.update(|st| {
            let i = st.position(id)?;
            let row = st.rows[i].clone();
            let counts = st.counts.clone();
            st.rows[i].status = status;
            st.counts.record_transition(row.status, status);
            Some(PendingMutation { row, counts })
        });

        match shared.backend.update_status(id, status).await {
            Ok(()) => {
                shared.view.update(|st| {
                    if !st.filter.matches(status) {
                        if let Some(i) = st.position(id) {
                            st.rows.remove(i);
                        }
                    }
                });
            }
            Err(e) => {
                warn!(id = %id, error = %e, "status update failed, rolling back");
                shared.view.update(|st| {
                    if let Some(p) = pending {
                        if let Some(i) = st.position(id) {
                            st.rows[i] = p.row;
                        }
                        st.counts = p.counts;
                    }
                    st.error = Some(e.to_string());
                });
            }
        }
    }

    /// Record that the operator opened an inquiry. Set-once: an already-seen
    /// row is a no-op. A failed write surfaces an error without reverting the
    /// local marker; the conditional server write simply retries later.
    pub async fn mark_seen(&self, id: &InquiryId) {
        let shared = &self.shared;
        let now = Utc::now();
        let already_seen = shared.view.update(|st| match st.position(id) {
            Some(i) if st.rows[i].seen_at.is_none() => {
                st.rows[i].seen_at = Some(now);
                false
            }
            Some(_) => true,
            None => false,
        });
        if already_seen {
            return;
        }

        if let Err(e) = shared.backend.mark_seen(id, now).await {
            warn!(id = %id, error = %e, "mark seen failed");
            shared.view.update(|st| st.error = Some(e.to_string()));
        }
    }

    /// Clear the error banner.
    pub fn dismiss_error(&self) {
        self.shared.view.update(|st| st.error = None);
    }

    /// Tear down the live subscription and every pending timer. Idempotent;
    /// in-flight fetches finish but their results are discarded.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
        self.shared.disarm_reconnect_banner();
        if let Some(task) = self.feed_task.lock().take() {
            task.abort();
        }
    }
}

impl<B: DataBackend> Drop for InboxSynchronizer<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<B: DataBackend> Shared<B> {
    async fn resync(&self) {
        let (filter, generation) = self.view.update(|st| (st.filter, st.generation));

        let page = self
            .backend
            .fetch_page(filter, None, self.config.page_size)
            .await;
        let counts = self.backend.fetch_counts().await;

        if self.cancel.is_cancelled() {
            return;
        }
        let page_size = self.config.page_size;
        self.view.update(|st| {
            if st.generation != generation {
                return;
            }
            match page {
                Ok(rows) => {
                    st.replace_rows(rows, page_size);
                    st.error = None;
                }
                Err(e) => {
                    warn!(error = %e, "page refetch failed");
                    st.error = Some(e.to_string());
                }
            }
            match counts {
                Ok(c) => st.counts = c,
                Err(e) => debug!(error = %e, "count refetch failed"),
            }
        });
    }

    /// Subscription lifecycle: connecting → connected → (error | timeout) →
    /// reconnecting → connected, with the attempt counter resetting only on
    /// a successful (re)subscription.
    async fn feed_loop(&self) {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            self.view.update(|st| {
                st.connection = if attempt == 0 {
                    ConnectionState::Connecting
                } else {
                    ConnectionState::Reconnecting
                };
            });

            match self.backend.subscribe().await {
                Ok(mut feed) => {
                    if self.drive_feed(&mut feed, &mut attempt).await {
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "subscribe failed"),
            }
            if self.cancel.is_cancelled() {
                return;
            }

            // Channel lost. Reveal the banner only if the outage outlives the
            // debounce window, resync eagerly to cover missed events, then
            // back off before resubscribing.
            self.view
                .update(|st| st.connection = ConnectionState::Reconnecting);
            self.arm_reconnect_banner();
            self.resync().await;

            let delay = self.config.reconnect_delay(attempt);
            attempt = (attempt + 1).min(self.config.reconnect_attempt_cap);
            debug!(delay_ms = delay.as_millis() as u64, attempt, "scheduling reconnect");

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Apply feed messages until the channel fails or closes.
    /// Returns true when the loop should stop for teardown.
    async fn drive_feed(&self, feed: &mut FeedStream, attempt: &mut u32) -> bool {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return true,
                message = feed.next() => message,
            };
            match message {
                Some(FeedMessage::Subscribed) => {
                    *attempt = 0;
                    self.disarm_reconnect_banner();
                    self.view.update(|st| {
                        st.connection = ConnectionState::Connected;
                        st.show_reconnect = false;
                    });
                    info!("change feed connected");
                }
                Some(FeedMessage::Event(event)) => {
                    debug!(
                        event_type = event.event_type(),
                        id = %event.inquiry_id(),
                        "applying change event"
                    );
                    self.view.update(|st| st.apply_event(event));
                }
                Some(FeedMessage::ChannelError(reason)) => {
                    warn!(reason = %reason, "change feed channel error");
                    return false;
                }
                Some(FeedMessage::TimedOut) => {
                    warn!("change feed timed out");
                    return false;
                }
                None => {
                    debug!("change feed closed");
                    return false;
                }
            }
        }
    }

    /// Start the debounce timer for the reconnect banner. If the timer fires
    /// while we are still not connected, the banner shows; a reconnection
    /// inside the window disarms it and the UI never flickers.
    fn arm_reconnect_banner(&self) {
        let view = Arc::clone(&self.view);
        let cancel = self.cancel.clone();
        let delay = self.config.reconnect_ui_delay;
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    view.update(|st| {
                        if st.connection != ConnectionState::Connected {
                            st.show_reconnect = true;
                        }
                    });
                }
            }
        });
        if let Some(old) = self.ui_timer.lock().replace(handle) {
            old.abort();
        }
    }

    fn disarm_reconnect_banner(&self) {
        if let Some(timer) = self.ui_timer.lock().take() {
            timer.abort();
        }
    }
}
