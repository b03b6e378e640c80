use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::counts::StatusCounts;
use crate::errors::BackendError;
use crate::feed::FeedStream;
use crate::ids::InquiryId;
use crate::inquiry::{Inquiry, InquiryStatus, StatusFilter};

/// The record store and change feed the inbox runs against.
///
/// Implementations must apply the status predicate server-side (a client-side
/// filter would under-fill pages) and must treat `cursor` as a strict
/// `created_at <` bound so pagination stays stable while new rows are
/// prepended at the head.
#[async_trait]
pub trait DataBackend: Send + Sync + 'static {
    /// Fetch up to `limit` rows, newest first, strictly older than `cursor`
    /// when one is given.
    async fn fetch_page(
        &self,
        filter: StatusFilter,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Inquiry>, BackendError>;

    /// Exact per-stage counts plus the unfiltered total, as one logical
    /// snapshot.
    async fn fetch_counts(&self) -> Result<StatusCounts, BackendError>;

    /// Exact count of inquiries that are new and were never opened.
    async fn fetch_unseen_count(&self) -> Result<u64, BackendError>;

    async fn update_status(
        &self,
        id: &InquiryId,
        status: InquiryStatus,
    ) -> Result<(), BackendError>;

    /// Set `seen_at` if and only if it is still unset server-side.
    /// Returns whether the write was applied.
    async fn mark_seen(&self, id: &InquiryId, at: DateTime<Utc>) -> Result<bool, BackendError>;

    /// Open a live subscription to the change feed. The stream yields
    /// `Subscribed` once the channel is established.
    async fn subscribe(&self) -> Result<FeedStream, BackendError>;
}
