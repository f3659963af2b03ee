//! In-memory `ProjectionRepository`, for projection-handler and
//! choreography tests that shouldn't need a running Postgres instance.

use crate::projections::{Page, PaginatedResult, Pagination, ProjectionRepository, ProjectionWriter};
use async_trait::async_trait;
use library_core::error::{LibraryError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

struct Row {
    version: i64,
    deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    document: serde_json::Value,
}

#[derive(Default)]
pub struct InMemoryProjectionRepository {
    rows: Mutex<HashMap<String, Row>>,
}

impl InMemoryProjectionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectionWriter for InMemoryProjectionRepository {
    async fn update_if_newer(&self, id: &str, changes: serde_json::Value, incoming_version: i64) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(id) {
            Some(row) if row.version < incoming_version => {
                merge_json(&mut row.document, changes);
                row.version = incoming_version;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn simple_update(&self, id: &str, changes: serde_json::Value) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(id) {
            Some(row) => {
                merge_json(&mut row.document, changes);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn mark_deleted(&self, id: &str, version: i64, timestamp: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(id) {
            Some(row) if row.version < version => {
                row.deleted_at = Some(timestamp);
                row.version = version;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[async_trait]
impl<T> ProjectionRepository<T> for InMemoryProjectionRepository
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    async fn save(&self, id: &str, version: i64, document: &T) -> Result<()> {
        if id.trim().is_empty() {
            return Err(LibraryError::validation("projection requires a non-empty id"));
        }
        let document = serde_json::to_value(document)
            .map_err(|e| LibraryError::SerializationError { message: e.to_string() })?;
        self.rows.lock().unwrap().insert(
            id.to_string(),
            Row {
                version,
                deleted_at: None,
                document,
            },
        );
        Ok(())
    }

    async fn get_by_id(&self, id: &str, include_deleted: bool) -> Result<Option<T>> {
        let rows = self.rows.lock().unwrap();
        match rows.get(id) {
            Some(row) if include_deleted || row.deleted_at.is_none() => {
                let parsed = serde_json::from_value(row.document.clone())
                    .map_err(|e| LibraryError::SerializationError { message: e.to_string() })?;
                Ok(Some(parsed))
            }
            _ => Ok(None),
        }
    }

    async fn get_all(&self, page: Page, include_deleted: bool) -> Result<PaginatedResult<T>> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<&Row> = rows
            .values()
            .filter(|row| include_deleted || row.deleted_at.is_none())
            .collect();
        matching.sort_by(|a, b| a.document.to_string().cmp(&b.document.to_string()));

        let total = matching.len() as i64;
        let start = page.offset().max(0) as usize;
        let data: Result<Vec<T>> = matching
            .into_iter()
            .skip(start)
            .take(page.limit as usize)
            .map(|row| {
                serde_json::from_value(row.document.clone())
                    .map_err(|e| LibraryError::SerializationError { message: e.to_string() })
            })
            .collect();

        Ok(PaginatedResult {
            data: data?,
            pagination: Pagination::new(total, page),
        })
    }
}

fn merge_json(target: &mut serde_json::Value, changes: serde_json::Value) {
    if let (serde_json::Value::Object(target), serde_json::Value::Object(changes)) = (target, changes) {
        for (key, value) in changes {
            target.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Doc {
        title: String,
    }

    #[tokio::test]
    async fn update_if_newer_ignores_stale_version() {
        let repo = InMemoryProjectionRepository::new();
        let doc = Doc { title: "Dune".to_string() };
        repo.save("book-1", 1, &doc).await.unwrap();

        let matched = repo.update_if_newer("book-1", json!({"title": "Dune Messiah"}), 1).await.unwrap();
        assert_eq!(matched, 0);

        let matched = repo.update_if_newer("book-1", json!({"title": "Dune Messiah"}), 2).await.unwrap();
        assert_eq!(matched, 1);

        let stored: Doc = repo.get_by_id("book-1", false).await.unwrap().unwrap();
        assert_eq!(stored.title, "Dune Messiah");
    }

    #[tokio::test]
    async fn mark_deleted_hides_from_get_by_id_unless_requested() {
        let repo = InMemoryProjectionRepository::new();
        let doc = Doc { title: "Dune".to_string() };
        repo.save("book-1", 1, &doc).await.unwrap();
        repo.mark_deleted("book-1", 2, chrono::Utc::now()).await.unwrap();

        let missing: Option<Doc> = repo.get_by_id("book-1", false).await.unwrap();
        assert!(missing.is_none());
        let present: Option<Doc> = repo.get_by_id("book-1", true).await.unwrap();
        assert!(present.is_some());
    }

    #[tokio::test]
    async fn get_all_paginates_and_excludes_deleted() {
        let repo = InMemoryProjectionRepository::new();
        for i in 0..5 {
            repo.save(&format!("book-{i}"), 1, &Doc { title: format!("Title {i}") })
                .await
                .unwrap();
        }
        repo.mark_deleted("book-0", 2, chrono::Utc::now()).await.unwrap();

        let page: PaginatedResult<Doc> = repo.get_all(Page::new(1, 2), false).await.unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.pagination.total, 4);
        assert!(page.pagination.has_next);
    }
}
