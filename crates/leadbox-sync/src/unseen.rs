use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use leadbox_core::{DataBackend, FeedMessage};

/// How long to wait before reopening a dropped badge subscription.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Maintains the count of inquiries that are new and were never opened.
///
/// Backs the app badge, so it lives outside any one screen: it holds its own
/// feed subscription and refetches the exact count on every change event
/// rather than deriving the delta locally. A missed event costs one stale
/// badge until the next event or `refresh`.
pub struct UnseenWatcher<B: DataBackend> {
    shared: Arc<WatcherShared<B>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct WatcherShared<B> {
    backend: Arc<B>,
    tx: watch::Sender<u64>,
    cancel: CancellationToken,
}

impl<B: DataBackend> UnseenWatcher<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(WatcherShared {
                backend,
                tx,
                cancel: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Fetch the initial count and start following the feed.
    pub async fn start(&self) {
        self.shared.refetch().await;

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move { shared.run().await });
        *self.task.lock() = Some(handle);
    }

    pub fn count(&self) -> u64 {
        *self.shared.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.shared.tx.subscribe()
    }

    /// Manual recount, e.g. when the window becomes visible again.
    pub async fn refresh(&self) {
        self.shared.refetch().await;
    }

    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl<B: DataBackend> Drop for UnseenWatcher<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<B: DataBackend> WatcherShared<B> {
    async fn refetch(&self) {
        match self.backend.fetch_unseen_count().await {
            Ok(count) => {
                self.tx.send_replace(count);
            }
            Err(e) => debug!(error = %e, "unseen count fetch failed"),
        }
    }

    async fn run(&self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            match self.backend.subscribe().await {
                Ok(mut feed) => loop {
                    let message = tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        message = feed.next() => message,
                    };
                    match message {
                        Some(FeedMessage::Subscribed) => self.refetch().await,
                        Some(FeedMessage::Event(_)) => self.refetch().await,
                        Some(FeedMessage::ChannelError(_))
                        | Some(FeedMessage::TimedOut)
                        | None => break,
                    }
                },
                Err(e) => debug!(error = %e, "badge subscribe failed"),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }
    }
}
