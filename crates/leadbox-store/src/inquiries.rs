use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::instrument;

use async_trait::async_trait;
use leadbox_core::{
    BackendError, ChangeEvent, DataBackend, FeedMessage, FeedStream, Inquiry, InquiryId,
    InquiryStatus, StatusCounts, StatusFilter,
};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const FEED_CAPACITY: usize = 1024;

const INQUIRY_COLUMNS: &str = "id, created_at, name, email, phone, selected_types, \
     selected_package, budget, message, source_page, user_agent, status, seen_at";

/// Payload for a newly submitted booking inquiry.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct NewInquiry {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub selected_types: Vec<String>,
    pub selected_package: Option<String>,
    pub budget: Option<i64>,
    pub message: Option<String>,
    pub source_page: Option<String>,
    pub user_agent: Option<String>,
}

/// SQLite-backed inquiry store. Every committed write is echoed onto a
/// broadcast feed so live subscribers see the same changes the database does.
pub struct InquiryStore {
    db: Database,
    feed: broadcast::Sender<ChangeEvent>,
}

impl InquiryStore {
    pub fn new(db: Database) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self { db, feed }
    }

    /// Sender half of the change feed, for bridging to other transports.
    pub fn feed_sender(&self) -> broadcast::Sender<ChangeEvent> {
        self.feed.clone()
    }

    /// Insert a new inquiry stamped with the current time.
    pub fn insert(&self, new: NewInquiry) -> Result<Inquiry, StoreError> {
        self.insert_at(new, Utc::now())
    }

    /// Insert a new inquiry with an explicit creation timestamp.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn insert_at(
        &self,
        new: NewInquiry,
        created_at: DateTime<Utc>,
    ) -> Result<Inquiry, StoreError> {
        let row = Inquiry {
            id: InquiryId::new(),
            created_at,
            name: new.name,
            email: new.email,
            phone: new.phone,
            selected_types: new.selected_types,
            selected_package: new.selected_package,
            budget: new.budget,
            message: new.message,
            source_page: new.source_page,
            user_agent: new.user_agent,
            status: InquiryStatus::New,
            seen_at: None,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO inquiries (id, created_at, name, email, phone, selected_types, \
                 selected_package, budget, message, source_page, user_agent, status, seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    row.id.as_str(),
                    row_helpers::fmt_ts(row.created_at),
                    row.name,
                    row.email,
                    row.phone,
                    serde_json::to_string(&row.selected_types)?,
                    row.selected_package,
                    row.budget,
                    row.message,
                    row.source_page,
                    row.user_agent,
                    row.status.as_str(),
                    row.seen_at.map(row_helpers::fmt_ts),
                ],
            )?;
            Ok(())
        })?;

        self.emit(ChangeEvent::Insert { row: row.clone() });
        Ok(row)
    }

    /// Get an inquiry by id.
    pub fn get(&self, id: &InquiryId) -> Result<Inquiry, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INQUIRY_COLUMNS} FROM inquiries WHERE id = ?1"
            ))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_inquiry(row),
                None => Err(StoreError::NotFound(format!("inquiry {id}"))),
            }
        })
    }

    /// List one page, newest first, strictly older than `cursor` when given.
    /// The status predicate is applied in SQL so a page is never under-filled.
    #[instrument(skip(self), fields(filter = %filter))]
    pub fn list_page(
        &self,
        filter: StatusFilter,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Inquiry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut sql = format!("SELECT {INQUIRY_COLUMNS} FROM inquiries");
            let mut clauses: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(status) = filter.as_status() {
                clauses.push(format!("status = ?{}", params.len() + 1));
                params.push(Box::new(status.as_str().to_string()));
            }
            if let Some(cursor) = cursor {
                clauses.push(format!("created_at < ?{}", params.len() + 1));
                params.push(Box::new(row_helpers::fmt_ts(cursor)));
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(&format!(
                " ORDER BY created_at DESC, id DESC LIMIT ?{}",
                params.len() + 1
            ));
            params.push(Box::new(limit as i64));

            let mut stmt = conn.prepare(&sql)?;
            let params_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let mut rows = stmt.query(params_refs.as_slice())?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_inquiry(row)?);
            }
            Ok(results)
        })
    }

    /// Exact per-stage counts plus the unfiltered total.
    pub fn counts(&self) -> Result<StatusCounts, StoreError> {
        self.db.with_conn(|conn| {
            let mut counts = StatusCounts::default();
            for status in InquiryStatus::ALL {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM inquiries WHERE status = ?1",
                    [status.as_str()],
                    |row| row.get(0),
                )?;
                *counts.bucket_mut(status) = n as u64;
            }
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM inquiries", [], |row| row.get(0))?;
            counts.total = total as u64;
            Ok(counts)
        })
    }

    /// Count of new inquiries that were never opened.
    pub fn unseen_count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM inquiries WHERE status = 'new' AND seen_at IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

    /// Move an inquiry to another stage and emit the change.
    #[instrument(skip(self), fields(id = %id, status = %status))]
    pub fn set_status(
        &self,
        id: &InquiryId,
        status: InquiryStatus,
    ) -> Result<Inquiry, StoreError> {
        let old = self.get(id)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE inquiries SET status = ?1 WHERE id = ?2",
                rusqlite::params![status.as_str(), id.as_str()],
            )?;
            Ok(())
        })?;

        let mut new = old.clone();
        new.status = status;
        self.emit(ChangeEvent::Update {
            old: Some(old),
            new: new.clone(),
        });
        Ok(new)
    }

    /// Record when an operator first opened the inquiry. The write is
    /// conditional on `seen_at` still being unset, so it is set-once even
    /// under concurrent callers. Returns whether the write was applied.
    #[instrument(skip(self), fields(id = %id))]
    pub fn mark_seen(&self, id: &InquiryId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let old = self.get(id)?;

        let applied = self.db.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE inquiries SET seen_at = ?1 WHERE id = ?2 AND seen_at IS NULL",
                rusqlite::params![row_helpers::fmt_ts(at), id.as_str()],
            )?;
            Ok(n > 0)
        })?;

        if applied {
            let mut new = old.clone();
            new.seen_at = Some(at);
            self.emit(ChangeEvent::Update {
                old: Some(old),
                new,
            });
        }
        Ok(applied)
    }

    /// Remove an inquiry and emit the deletion.
    #[instrument(skip(self), fields(id = %id))]
    pub fn delete(&self, id: &InquiryId) -> Result<(), StoreError> {
        let old = self.get(id)?;

        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM inquiries WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })?;

        self.emit(ChangeEvent::Delete {
            id: old.id,
            status: Some(old.status),
        });
        Ok(())
    }

    // Send fails only when nobody is subscribed, which is fine.
    fn emit(&self, event: ChangeEvent) {
        let _ = self.feed.send(event);
    }
}

impl Clone for InquiryStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            feed: self.feed.clone(),
        }
    }
}

#[async_trait]
impl DataBackend for InquiryStore {
    async fn fetch_page(
        &self,
        filter: StatusFilter,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Inquiry>, BackendError> {
        self.list_page(filter, cursor, limit)
            .map_err(StoreError::into_query_error)
    }

    async fn fetch_counts(&self) -> Result<StatusCounts, BackendError> {
        self.counts().map_err(StoreError::into_query_error)
    }

    async fn fetch_unseen_count(&self) -> Result<u64, BackendError> {
        self.unseen_count().map_err(StoreError::into_query_error)
    }

    async fn update_status(
        &self,
        id: &InquiryId,
        status: InquiryStatus,
    ) -> Result<(), BackendError> {
        self.set_status(id, status)
            .map(|_| ())
            .map_err(StoreError::into_mutation_error)
    }

    async fn mark_seen(&self, id: &InquiryId, at: DateTime<Utc>) -> Result<bool, BackendError> {
        InquiryStore::mark_seen(self, id, at).map_err(StoreError::into_mutation_error)
    }

    async fn subscribe(&self) -> Result<FeedStream, BackendError> {
        let rx = self.feed.subscribe();
        let events = BroadcastStream::new(rx).map(|item| match item {
            Ok(event) => FeedMessage::Event(event),
            // A lagged receiver has missed events; force a resync upstream.
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                FeedMessage::ChannelError(format!("feed lagged by {n} events"))
            }
        });
        let stream = futures::stream::once(async { FeedMessage::Subscribed }).chain(events);
        Ok(Box::pin(stream))
    }
}

fn row_to_inquiry(row: &rusqlite::Row<'_>) -> Result<Inquiry, StoreError> {
    let id: String = row_helpers::get(row, 0, "inquiries", "id")?;
    let created_at: String = row_helpers::get(row, 1, "inquiries", "created_at")?;
    let selected_types: String = row_helpers::get(row, 5, "inquiries", "selected_types")?;
    let status: String = row_helpers::get(row, 11, "inquiries", "status")?;
    let seen_at: Option<String> = row_helpers::get_opt(row, 12, "inquiries", "seen_at")?;

    Ok(Inquiry {
        id: InquiryId::from_raw(id),
        created_at: row_helpers::parse_ts(&created_at, "inquiries", "created_at")?,
        name: row_helpers::get(row, 2, "inquiries", "name")?,
        email: row_helpers::get_opt(row, 3, "inquiries", "email")?,
        phone: row_helpers::get_opt(row, 4, "inquiries", "phone")?,
        selected_types: row_helpers::parse_tags(&selected_types, "inquiries", "selected_types")?,
        selected_package: row_helpers::get_opt(row, 6, "inquiries", "selected_package")?,
        budget: row_helpers::get_opt(row, 7, "inquiries", "budget")?,
        message: row_helpers::get_opt(row, 8, "inquiries", "message")?,
        source_page: row_helpers::get_opt(row, 9, "inquiries", "source_page")?,
        user_agent: row_helpers::get_opt(row, 10, "inquiries", "user_agent")?,
        status: row_helpers::parse_enum(&status, "inquiries", "status")?,
        seen_at: seen_at
            .map(|raw| row_helpers::parse_ts(&raw, "inquiries", "seen_at"))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::StreamExt;

    fn store() -> InquiryStore {
        InquiryStore::new(Database::in_memory().unwrap())
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn seed(store: &InquiryStore, name: &str, secs: i64) -> Inquiry {
        store
            .insert_at(
                NewInquiry {
                    name: name.into(),
                    email: Some(format!("{name}@example.com")),
                    selected_types: vec!["wedding".into()],
                    budget: Some(1500),
                    ..Default::default()
                },
                ts(secs),
            )
            .unwrap()
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let store = store();
        let created = seed(&store, "ada", 1);
        let fetched = store.get(&created.id).unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.status, InquiryStatus::New);
        assert_eq!(fetched.selected_types, vec!["wedding".to_string()]);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = store();
        let err = store.get(&InquiryId::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn list_page_newest_first() {
        let store = store();
        for i in 1..=3 {
            seed(&store, &format!("person-{i}"), i);
        }
        let page = store.list_page(StatusFilter::All, None, 10).unwrap();
        let names: Vec<&str> = page.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["person-3", "person-2", "person-1"]);
    }

    #[test]
    fn cursor_pages_are_disjoint_and_exhaustive() {
        let store = store();
        for i in 1..=5 {
            seed(&store, &format!("p{i}"), i);
        }

        let first = store.list_page(StatusFilter::All, None, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].name, "p5");

        let second = store
            .list_page(StatusFilter::All, Some(first[1].created_at), 2)
            .unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].name, "p3");

        let third = store
            .list_page(StatusFilter::All, Some(second[1].created_at), 2)
            .unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].name, "p1");
    }

    #[test]
    fn filter_is_applied_in_sql() {
        let store = store();
        let a = seed(&store, "a", 1);
        let _b = seed(&store, "b", 2);
        store.set_status(&a.id, InquiryStatus::Won).unwrap();

        let page = store
            .list_page(StatusFilter::Only(InquiryStatus::Won), None, 10)
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, a.id);
    }

    #[test]
    fn counts_match_rows() {
        let store = store();
        let a = seed(&store, "a", 1);
        seed(&store, "b", 2);
        seed(&store, "c", 3);
        store.set_status(&a.id, InquiryStatus::Contacted).unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.new, 2);
        assert_eq!(counts.contacted, 1);
        assert_eq!(counts.total, 3);
    }

    #[test]
    fn unseen_counts_only_new_unopened() {
        let store = store();
        let a = seed(&store, "a", 1);
        let b = seed(&store, "b", 2);
        seed(&store, "c", 3);

        store.mark_seen(&a.id, ts(10)).unwrap();
        store.set_status(&b.id, InquiryStatus::Contacted).unwrap();

        assert_eq!(store.unseen_count().unwrap(), 1);
    }

    #[test]
    fn mark_seen_is_set_once() {
        let store = store();
        let row = seed(&store, "a", 1);

        assert!(store.mark_seen(&row.id, ts(10)).unwrap());
        assert!(!store.mark_seen(&row.id, ts(20)).unwrap());

        let fetched = store.get(&row.id).unwrap();
        assert_eq!(fetched.seen_at, Some(ts(10)));
    }

    #[test]
    fn set_status_emits_update_event() {
        let store = store();
        let row = seed(&store, "a", 1);
        let mut rx = store.feed_sender().subscribe();

        store.set_status(&row.id, InquiryStatus::Qualified).unwrap();

        match rx.try_recv().unwrap() {
            ChangeEvent::Update { old, new } => {
                assert_eq!(old.unwrap().status, InquiryStatus::New);
                assert_eq!(new.status, InquiryStatus::Qualified);
            }
            other => panic!("expected update event, got {other:?}"),
        }
    }

    #[test]
    fn delete_removes_row_and_emits_event() {
        let store = store();
        let row = seed(&store, "a", 1);
        let mut rx = store.feed_sender().subscribe();

        store.delete(&row.id).unwrap();

        assert!(matches!(
            store.get(&row.id),
            Err(StoreError::NotFound(_))
        ));
        match rx.try_recv().unwrap() {
            ChangeEvent::Delete { id, status } => {
                assert_eq!(id, row.id);
                assert_eq!(status, Some(InquiryStatus::New));
            }
            other => panic!("expected delete event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscribe_yields_subscribed_then_events() {
        let store = store();
        let mut feed = DataBackend::subscribe(&store).await.unwrap();

        assert!(matches!(feed.next().await, Some(FeedMessage::Subscribed)));

        seed(&store, "a", 1);
        match feed.next().await {
            Some(FeedMessage::Event(ChangeEvent::Insert { row })) => {
                assert_eq!(row.name, "a");
            }
            other => panic!("expected insert event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn backend_page_fetch_matches_store() {
        let store = store();
        for i in 1..=3 {
            seed(&store, &format!("p{i}"), i);
        }
        let rows = store.fetch_page(StatusFilter::All, None, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "p3");
    }
}
