//! Process-local newsletter storage.

use chrono::Utc;
use gazette_relay::{ChangeEvent, ChannelNotifier, ChannelSource, Operation};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{NewNewsletter, Newsletter, StoreError};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Newsletter>,
    next_id: i32,
}

/// In-memory store.
///
/// Stands in for the database trigger by notifying the current change source
/// while the write lock is still held, so notifications follow write order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<Table>,
    notifier: Mutex<Option<ChannelNotifier>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, new: &NewNewsletter) -> Result<Newsletter, StoreError> {
        let mut table = self.table.write();
        table.next_id += 1;
        let row = Newsletter {
            id: table.next_id,
            title: new.title.clone(),
            content: new.content.clone(),
            created_at: Utc::now().naive_utc(),
        };
        table.rows.push(row.clone());
        self.notify(Operation::Insert, &row);
        Ok(row)
    }

    pub fn list(&self) -> Vec<Newsletter> {
        let table = self.table.read();
        let mut rows = table.rows.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }

    pub fn update(
        &self,
        id: i32,
        changes: &NewNewsletter,
    ) -> Result<Option<Newsletter>, StoreError> {
        let mut table = self.table.write();
        let Some(row) = table.rows.iter_mut().find(|row| row.id == id) else {
            return Ok(None);
        };
        row.title = changes.title.clone();
        row.content = changes.content.clone();
        let row = row.clone();
        self.notify(Operation::Update, &row);
        Ok(Some(row))
    }

    /// Replace the notifier with a fresh channel and return its source.
    ///
    /// Any previously returned source stops receiving notifications.
    pub fn change_source(&self) -> ChannelSource {
        let (notifier, source) = ChannelSource::pair();
        *self.notifier.lock() = Some(notifier);
        source
    }

    fn notify(&self, operation: Operation, row: &Newsletter) {
        let event = match ChangeEvent::from_row(operation, row) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, id = row.id, "failed to encode change notification");
                return;
            }
        };

        let guard = self.notifier.lock();
        let delivered = match guard.as_ref() {
            Some(notifier) => notifier.notify_event(&event),
            None => Ok(false),
        };
        match delivered {
            Ok(true) => {}
            // NOTIFY with nobody listening is not an error.
            Ok(false) => debug!(id = row.id, %operation, "no change listener attached"),
            Err(e) => warn!(error = %e, id = row.id, "failed to encode change notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazette_relay::ChangeSource;
    use serde_json::json;

    fn body(title: &str, content: &str) -> NewNewsletter {
        NewNewsletter {
            title: title.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_ids_increase() {
        let store = MemoryStore::new();
        let a = store.create(&body("a", "")).unwrap();
        let b = store.create(&body("b", "")).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
    }

    #[test]
    fn test_list_newest_first() {
        let store = MemoryStore::new();
        store.create(&body("first", "")).unwrap();
        store.create(&body("second", "")).unwrap();
        store.create(&body("third", "")).unwrap();

        let titles: Vec<_> = store.list().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_update_keeps_created_at() {
        let store = MemoryStore::new();
        let row = store.create(&body("a", "old")).unwrap();
        let updated = store.update(row.id, &body("b", "new")).unwrap().unwrap();

        assert_eq!(updated.id, row.id);
        assert_eq!(updated.title, "b");
        assert_eq!(updated.content, "new");
        assert_eq!(updated.created_at, row.created_at);
        assert!(store.update(99, &body("x", "y")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writes_notify_source() {
        let store = MemoryStore::new();
        let mut source = store.change_source();
        source.open().await.unwrap();

        let row = store.create(&body("A", "hello")).unwrap();
        store.update(row.id, &body("B", "hello")).unwrap();

        let insert = ChangeEvent::decode(&source.next_payload().await.unwrap()).unwrap();
        assert_eq!(insert.operation, Operation::Insert);
        assert_eq!(insert.field("title"), Some(&json!("A")));
        assert_eq!(insert.field("id"), Some(&json!(row.id)));

        let update = ChangeEvent::decode(&source.next_payload().await.unwrap()).unwrap();
        assert_eq!(update.operation, Operation::Update);
        assert_eq!(update.field("title"), Some(&json!("B")));
    }

    #[tokio::test]
    async fn test_new_source_replaces_old() {
        let store = MemoryStore::new();
        let mut old = store.change_source();
        old.open().await.unwrap();
        let mut current = store.change_source();
        current.open().await.unwrap();

        store.create(&body("A", "")).unwrap();

        assert!(old.next_payload().await.is_err());
        assert!(current.next_payload().await.is_ok());
    }

    #[test]
    fn test_writes_without_listener() {
        let store = MemoryStore::new();
        assert!(store.create(&body("A", "")).is_ok());
    }
}
