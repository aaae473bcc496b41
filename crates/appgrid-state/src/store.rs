//! StateStore: redb-backed document persistence for appgrid.
//!
//! Documents are stored per collection (one redb table each) and share one
//! generic code path through the [`Document`] trait: insert, upsert, get,
//! selector queries with paging and sort, partial update by selector, and
//! delete. Appsets get an additional version-checked replace.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::selector::{Page, Selector, Sort};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// A JSON document stored in one collection under a string key.
pub trait Document: Serialize + DeserializeOwned {
    /// Collection name used in errors.
    const COLLECTION: &'static str;

    /// Table backing the collection.
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]>;

    /// Primary key of this document within its collection.
    fn key(&self) -> String;
}

impl Document for Appset {
    const COLLECTION: &'static str = "appsets";
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = APPSETS;

    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Document for RepairPolicy {
    const COLLECTION: &'static str = "repair_policies";
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = REPAIR_POLICIES;

    fn key(&self) -> String {
        repair_policy_key(&self.repair_template_id, &self.app_container_id)
    }
}

impl Document for RepairRecord {
    const COLLECTION: &'static str = "repair_records";
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = REPAIR_RECORDS;

    fn key(&self) -> String {
        self.repair_id.clone()
    }
}

/// Build the composite key for the repair policies table.
pub fn repair_policy_key(repair_template_id: &str, app_container_id: &str) -> String {
    format!("{repair_template_id}:{app_container_id}")
}

/// Thread-safe document store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(APPSETS).map_err(map_err!(Table))?;
        txn.open_table(REPAIR_POLICIES).map_err(map_err!(Table))?;
        txn.open_table(REPAIR_RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic documents ──────────────────────────────────────────

    /// Insert a new document. Fails if the key is already taken.
    pub fn insert<D: Document>(&self, doc: &D) -> StateResult<()> {
        let key = doc.key();
        let value = serde_json::to_vec(doc).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists {
                    collection: D::COLLECTION,
                    key,
                });
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "document inserted");
        Ok(())
    }

    /// Insert or overwrite a document.
    pub fn put<D: Document>(&self, doc: &D) -> StateResult<()> {
        let key = doc.key();
        let value = serde_json::to_vec(doc).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "document stored");
        Ok(())
    }

    /// Get a document by key.
    pub fn get<D: Document>(&self, key: &str) -> StateResult<Option<D>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let doc: D =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    /// Query a collection. Returns the total number of matches (before
    /// paging) and the requested page.
    pub fn query_all<D: Document>(
        &self,
        selector: &Selector,
        page: Page,
        sort: Option<&Sort>,
    ) -> StateResult<(usize, Vec<D>)> {
        let mut matched = self.matching_values::<D>(selector)?;
        if let Some(sort) = sort {
            matched.sort_by(|a, b| sort.order(a, b));
        }
        let total = matched.len();
        let window = matched
            .into_iter()
            .skip(page.skip)
            .take(page.limit.unwrap_or(usize::MAX));
        let mut results = Vec::new();
        for value in window {
            results.push(serde_json::from_value(value).map_err(map_err!(Deserialize))?);
        }
        Ok((total, results))
    }

    /// First document matching `selector`, in key order.
    pub fn query_one<D: Document>(&self, selector: &Selector) -> StateResult<Option<D>> {
        let (_, mut found) = self.query_all::<D>(selector, Page::new(0, 1), None)?;
        Ok(found.pop())
    }

    /// Apply `update` to every document matching `selector` in one write
    /// transaction. Returns the number of documents updated.
    ///
    /// The update must not change a document's key.
    pub fn update_where<D: Document>(
        &self,
        selector: &Selector,
        mut update: impl FnMut(&mut D),
    ) -> StateResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut updated = 0;
        {
            let mut table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
            let mut pending = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let json: Value =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if selector.matches(&json) {
                    pending.push((key.value().to_string(), json));
                }
            }
            for (key, json) in pending {
                let mut doc: D = serde_json::from_value(json).map_err(map_err!(Deserialize))?;
                update(&mut doc);
                let value = serde_json::to_vec(&doc).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                updated += 1;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(updated, "documents updated by selector");
        Ok(updated)
    }

    /// Delete a document by key. Returns true if it existed.
    pub fn delete<D: Document>(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "document deleted");
        Ok(existed)
    }

    /// Delete every document matching `selector`. Returns the number deleted.
    pub fn delete_where<D: Document>(&self, selector: &Selector) -> StateResult<usize> {
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let json: Value =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if selector.matches(&json) {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(deleted = keys.len(), "documents deleted by selector");
        Ok(keys.len())
    }

    fn matching_values<D: Document>(&self, selector: &Selector) -> StateResult<Vec<Value>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let json: Value =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if selector.matches(&json) {
                results.push(json);
            }
        }
        Ok(results)
    }

    // ── Appsets ────────────────────────────────────────────────────

    /// Get an appset by name.
    pub fn get_appset(&self, name: &str) -> StateResult<Option<Appset>> {
        self.get::<Appset>(name)
    }

    /// List all appsets in name order.
    pub fn list_appsets(&self) -> StateResult<Vec<Appset>> {
        let (_, appsets) = self.query_all::<Appset>(&Selector::All, Page::default(), None)?;
        Ok(appsets)
    }

    /// Replace an appset wholesale if nobody replaced it since it was read.
    ///
    /// `appset.version` must equal the stored version; on success it is
    /// bumped and `time_update` refreshed in place.
    pub fn replace_appset(&self, appset: &mut Appset) -> StateResult<()> {
        let key = appset.key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(APPSETS).map_err(map_err!(Table))?;
            let stored: Appset = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => {
                    return Err(StateError::NotFound {
                        collection: Appset::COLLECTION,
                        key,
                    });
                }
            };
            if stored.version != appset.version {
                return Err(StateError::VersionConflict {
                    key,
                    expected: appset.version,
                    found: stored.version,
                });
            }
            appset.version += 1;
            appset.time_update = epoch_secs();
            let value = serde_json::to_vec(&*appset).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, version = appset.version, "appset replaced");
        Ok(())
    }

    /// Delete an appset by name. Returns true if it existed.
    pub fn delete_appset(&self, name: &str) -> StateResult<bool> {
        self.delete::<Appset>(name)
    }

    // ── Repair policies ────────────────────────────────────────────

    /// Get the policy for one application under a repair template.
    pub fn get_repair_policy(
        &self,
        repair_template_id: &str,
        app_container_id: &str,
    ) -> StateResult<Option<RepairPolicy>> {
        self.get::<RepairPolicy>(&repair_policy_key(repair_template_id, app_container_id))
    }

    /// Find the policy for an application regardless of template.
    pub fn find_repair_policy(&self, app_container_id: &str) -> StateResult<Option<RepairPolicy>> {
        self.query_one::<RepairPolicy>(&Selector::eq("app_container_id", app_container_id))
    }

    // ── Repair records ─────────────────────────────────────────────

    /// Get a repair record by repair id.
    pub fn get_repair_record(&self, repair_id: &str) -> StateResult<Option<RepairRecord>> {
        self.get::<RepairRecord>(repair_id)
    }
}
