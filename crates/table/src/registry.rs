//! Table registry: the concurrent map of live tables and id allocation.
//!
//! Normal table ids count up from 1; tournament ids are assigned by the
//! authority inside the reserved range starting at
//! [`TOURNAMENT_TABLE_ID_BASE`], with a local counter for tables the hall
//! creates itself. Listings copy summaries out before the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::TableError;
use crate::table::{Table, TableSummary};
use crate::types::{is_tournament_table, TableId, TOURNAMENT_TABLE_ID_BASE};

#[derive(Debug)]
pub struct TableRegistry {
    tables: RwLock<HashMap<TableId, Arc<Table>>>,
    next_normal: AtomicU32,
    next_tournament: AtomicU32,
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_normal: AtomicU32::new(1),
            next_tournament: AtomicU32::new(TOURNAMENT_TABLE_ID_BASE),
        }
    }
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id and register a fresh table.
    pub async fn create(&self, title: &str, stake: u64, host: &str, tournament: bool) -> Arc<Table> {
        let mut tables = self.tables.write().await;
        let counter = if tournament {
            &self.next_tournament
        } else {
            &self.next_normal
        };
        // skip ids the authority already placed
        let id = loop {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            if !tables.contains_key(&id) {
                break id;
            }
        };
        let table = Arc::new(Table::new(id, title, stake, host));
        tables.insert(id, table.clone());
        info!(table_id = id, title, stake, "table created");
        table
    }

    /// Fetch a table, creating an empty one under `id` if absent.
    pub async fn get_or_create(&self, id: TableId, host: &str) -> Arc<Table> {
        if let Some(table) = self.get(id).await {
            return table;
        }
        let mut tables = self.tables.write().await;
        tables
            .entry(id)
            .or_insert_with(|| {
                let title = if is_tournament_table(id) {
                    format!("tournament #{id}")
                } else {
                    format!("table #{id}")
                };
                info!(table_id = id, "table created on demand");
                Arc::new(Table::new(id, title, 0, host))
            })
            .clone()
    }

    /// Register a table built elsewhere. Fails if the id is taken.
    pub async fn insert(&self, table: Arc<Table>) -> Result<(), TableError> {
        let mut tables = self.tables.write().await;
        let id = table.id();
        if tables.contains_key(&id) {
            return Err(TableError::AlreadyExists(id));
        }
        tables.insert(id, table);
        Ok(())
    }

    pub async fn get(&self, id: TableId) -> Option<Arc<Table>> {
        self.tables.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: TableId) -> Option<Arc<Table>> {
        let removed = self.tables.write().await.remove(&id);
        if removed.is_some() {
            info!(table_id = id, "table removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// One page of summaries sorted by id. Pages start at 0.
    pub async fn list(&self, page: usize, per_page: usize) -> Vec<TableSummary> {
        let mut tables: Vec<Arc<Table>> = self.tables.read().await.values().cloned().collect();
        tables.sort_by_key(|t| t.id());
        tables
            .iter()
            .skip(page.saturating_mul(per_page))
            .take(per_page)
            .map(|t| t.summary())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_come_from_separate_ranges() {
        let registry = TableRegistry::new();
        let a = registry.create("a", 0, "h", false).await;
        let b = registry.create("b", 0, "h", false).await;
        let t = registry.create("t", 0, "h", true).await;
        assert_eq!((a.id(), b.id()), (1, 2));
        assert_eq!(t.id(), TOURNAMENT_TABLE_ID_BASE);
        assert!(t.is_tournament());
    }

    #[tokio::test]
    async fn create_skips_ids_placed_by_authority() {
        let registry = TableRegistry::new();
        registry.get_or_create(TOURNAMENT_TABLE_ID_BASE, "h").await;
        let t = registry.create("t", 0, "h", true).await;
        assert_eq!(t.id(), TOURNAMENT_TABLE_ID_BASE + 1);
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let registry = TableRegistry::new();
        let first = registry.get_or_create(42, "h").await;
        let second = registry.get_or_create(42, "h").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn insert_rejects_taken_id() {
        let registry = TableRegistry::new();
        registry.insert(Arc::new(Table::new(5, "x", 0, "h"))).await.unwrap();
        let err = registry
            .insert(Arc::new(Table::new(5, "y", 0, "h")))
            .await
            .unwrap_err();
        assert_eq!(err, TableError::AlreadyExists(5));
    }

    #[tokio::test]
    async fn list_pages_by_id() {
        let registry = TableRegistry::new();
        for title in ["a", "b", "c", "d", "e"] {
            registry.create(title, 1, "h", false).await;
        }
        let page: Vec<_> = registry.list(1, 2).await.into_iter().map(|s| s.id).collect();
        assert_eq!(page, vec![3, 4]);
        assert_eq!(registry.list(2, 2).await.len(), 1);
        assert!(registry.list(3, 2).await.is_empty());

        registry.remove(3).await.unwrap();
        let page: Vec<_> = registry.list(1, 2).await.into_iter().map(|s| s.id).collect();
        assert_eq!(page, vec![4, 5]);
    }
}
