use parking_lot::Mutex;
use tokio::sync::watch;

use leadbox_core::{ChangeEvent, Inquiry, InquiryId, StatusCounts, StatusFilter};

/// Connection phase of the live change feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
}

/// Immutable projection handed to the rendering layer.
#[derive(Clone, Debug)]
pub struct ViewSnapshot {
    pub rows: Vec<Inquiry>,
    pub filter: StatusFilter,
    pub counts: StatusCounts,
    pub has_more: bool,
    pub loading: bool,
    pub loading_more: bool,
    pub connection: ConnectionState,
    pub show_reconnect: bool,
    pub error: Option<String>,
}

impl ViewSnapshot {
    /// Whether the end-of-list sentinel should trigger another page load.
    pub fn can_load_more(&self) -> bool {
        !self.loading && !self.loading_more && self.has_more && !self.rows.is_empty()
    }

    /// Whether to swap the list for the soft "reconnecting" treatment.
    pub fn reconnect_banner_visible(&self) -> bool {
        self.connection != ConnectionState::Connected && self.show_reconnect && !self.rows.is_empty()
    }
}

/// The one mutable document every writer goes through.
///
/// Mutations happen only via the named transition methods below, under the
/// cell's lock, and each republishes a whole snapshot; readers can never
/// observe a half-applied update.
pub(crate) struct ViewState {
    pub rows: Vec<Inquiry>,
    pub filter: StatusFilter,
    pub counts: StatusCounts,
    pub has_more: bool,
    pub loading: bool,
    pub loading_more: bool,
    pub connection: ConnectionState,
    pub show_reconnect: bool,
    pub error: Option<String>,
    /// Bumped on every filter change; in-flight fetches compare it before
    /// applying results so a page for an abandoned filter is dropped.
    pub generation: u64,
}

impl ViewState {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            filter: StatusFilter::All,
            counts: StatusCounts::default(),
            has_more: true,
            loading: false,
            loading_more: false,
            connection: ConnectionState::Connecting,
            show_reconnect: false,
            error: None,
            generation: 0,
        }
    }

    pub fn position(&self, id: &InquiryId) -> Option<usize> {
        self.rows.iter().position(|r| &r.id == id)
    }

    /// Switch to a new filter: fresh row sequence, pagination reset.
    pub fn set_filter(&mut self, filter: StatusFilter) {
        self.filter = filter;
        self.rows.clear();
        self.has_more = true;
        self.generation += 1;
    }

    /// Replace the row sequence with a fresh page 1.
    pub fn replace_rows(&mut self, rows: Vec<Inquiry>, page_size: usize) {
        self.has_more = rows.len() == page_size;
        self.rows = rows;
    }

    /// Append an older page, skipping ids already present (a resync that
    /// raced an in-flight event may hand us overlap).
    pub fn append_rows(&mut self, rows: Vec<Inquiry>, page_size: usize) {
        self.has_more = rows.len() == page_size;
        for row in rows {
            if self.position(&row.id).is_none() {
                self.rows.push(row);
            }
        }
    }

    pub fn apply_event(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Insert { row } => self.apply_insert(row),
            ChangeEvent::Update { old, new } => self.apply_update(old, new),
            ChangeEvent::Delete { id, status } => self.apply_delete(&id, status),
        }
    }

    /// A new row appeared. Counts always move; the row itself only enters
    /// the visible sequence when it matches the filter and is not already
    /// there (at-least-once delivery can replay).
    pub fn apply_insert(&mut self, row: Inquiry) {
        self.counts.record_insert(row.status);
        if self.filter.matches(row.status) && self.position(&row.id).is_none() {
            self.rows.insert(0, row);
        }
    }

    /// A row changed. The prior stage is taken from the visible copy when we
    /// have one (it already reflects local optimistic writes, so an echo of
    /// one of those writes cannot move the counts twice) and from the
    /// event's old row otherwise.
    pub fn apply_update(&mut self, old: Option<Inquiry>, new: Inquiry) {
        let prior_status = self
            .position(&new.id)
            .map(|i| self.rows[i].status)
            .or(old.map(|o| o.status));
        if let Some(prior) = prior_status {
            self.counts.record_transition(prior, new.status);
        }

        match (self.position(&new.id), self.filter.matches(new.status)) {
            (Some(i), true) => self.rows[i] = new,
            (Some(i), false) => {
                self.rows.remove(i);
            }
            (None, true) => self.rows.insert(0, new),
            (None, false) => {}
        }
    }

    /// A row went away. The stage bucket to decrement comes from the event
    /// when present, else from the visible copy; with neither, only the
    /// total moves.
    pub fn apply_delete(&mut self, id: &InquiryId, status: Option<leadbox_core::InquiryStatus>) {
        let visible_status = self.position(id).map(|i| self.rows.remove(i).status);
        match status.or(visible_status) {
            Some(stage) => self.counts.record_delete(stage),
            None => self.counts.total = self.counts.total.saturating_sub(1),
        }
    }

    pub fn to_snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            rows: self.rows.clone(),
            filter: self.filter,
            counts: self.counts.clone(),
            has_more: self.has_more,
            loading: self.loading,
            loading_more: self.loading_more,
            connection: self.connection,
            show_reconnect: self.show_reconnect,
            error: self.error.clone(),
        }
    }
}

/// Holds the view state and publishes a snapshot after every transition.
pub(crate) struct ViewCell {
    state: Mutex<ViewState>,
    tx: watch::Sender<ViewSnapshot>,
}

impl ViewCell {
    pub fn new() -> Self {
        let state = ViewState::new();
        let (tx, _) = watch::channel(state.to_snapshot());
        Self {
            state: Mutex::new(state),
            tx,
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ViewSnapshot> {
        self.tx.subscribe()
    }

    /// Run one atomic transition and publish the resulting snapshot.
    pub fn update<T>(&self, f: impl FnOnce(&mut ViewState) -> T) -> T {
        let mut state = self.state.lock();
        let out = f(&mut state);
        self.tx.send_replace(state.to_snapshot());
        out
    }
}
