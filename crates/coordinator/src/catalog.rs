//! Catalog seam: index visibility states and region topology.
//!
//! The coordinator never owns schema; it reads the current visibility state,
//! publishes transitions, and asks for partial indexes to be dropped on
//! rollback. [`MemCatalog`] is the in-memory implementation used by the
//! daemon and the test suites.

use std::collections::HashMap;
use std::fs;
use std::sync::RwLock;

use odl_common::{IndexId, OdlError, RegionId, Result, TableId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::job::{DdlJob, IndexState};

/// One region of a table's partition set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDesc {
    /// Region identifier.
    pub region_id: RegionId,
    /// Partition the region belongs to.
    pub partition: i64,
    /// Inclusive lower key bound.
    pub start_key: Vec<u8>,
    /// Exclusive upper key bound.
    pub end_key: Vec<u8>,
}

/// Catalog contract consumed by the controller.
pub trait Catalog: Send + Sync {
    /// Current visibility state of `index_id` on `table_id`.
    fn index_state(&self, table_id: TableId, index_id: IndexId) -> Result<IndexState>;
    /// Publish the job's visibility state (or remove the index when
    /// `job.deleted` is set).
    fn publish_index_state(&self, job: &DdlJob) -> Result<()>;
    /// Drop a partially-built index after rollback.
    fn drop_index(&self, job: &DdlJob) -> Result<()>;
    /// Snapshot of the table's current region set.
    fn regions(&self, table_id: TableId) -> Result<Vec<RegionDesc>>;
    /// Number of regions currently backing the table.
    fn region_count(&self, table_id: TableId) -> Result<usize>;
}

#[derive(Debug, Default)]
struct CatalogInner {
    index_states: HashMap<(TableId, IndexId), IndexState>,
    regions: HashMap<TableId, Vec<RegionDesc>>,
    dropped: Vec<(TableId, IndexId)>,
}

/// In-memory [`Catalog`] implementation.
#[derive(Debug, Default)]
pub struct MemCatalog {
    inner: RwLock<CatalogInner>,
}

#[derive(Serialize, Deserialize)]
struct CatalogFileTable {
    table_id: TableId,
    regions: Vec<RegionDesc>,
}

#[derive(Serialize, Deserialize)]
struct CatalogFileIndex {
    table_id: TableId,
    index_id: IndexId,
    state: IndexState,
}

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    tables: Vec<CatalogFileTable>,
    #[serde(default)]
    index_states: Vec<CatalogFileIndex>,
}

impl MemCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load tables and index states from a JSON snapshot.
    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&s)
            .map_err(|e| OdlError::InvalidConfig(format!("catalog snapshot decode failed: {e}")))?;
        let catalog = Self::new();
        {
            let mut inner = catalog.inner.write().unwrap_or_else(|e| e.into_inner());
            for table in file.tables {
                inner.regions.insert(table.table_id, table.regions);
            }
            for index in file.index_states {
                inner
                    .index_states
                    .insert((index.table_id, index.index_id), index.state);
            }
        }
        Ok(catalog)
    }

    /// Register a table with its region set.
    pub fn add_table(&self, table_id: TableId, regions: Vec<RegionDesc>) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .regions
            .insert(table_id, regions);
    }

    /// Force an index visibility state (test/bootstrap helper).
    pub fn set_index_state(&self, table_id: TableId, index_id: IndexId, state: IndexState) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .index_states
            .insert((table_id, index_id), state);
    }

    /// Indexes dropped through [`Catalog::drop_index`], in drop order.
    pub fn dropped_indexes(&self) -> Vec<(TableId, IndexId)> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .dropped
            .clone()
    }
}

impl Catalog for MemCatalog {
    fn index_state(&self, table_id: TableId, index_id: IndexId) -> Result<IndexState> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .index_states
            .get(&(table_id, index_id))
            .copied()
            .ok_or_else(|| {
                OdlError::Catalog(format!("unknown index {index_id} on table {table_id}"))
            })
    }

    fn publish_index_state(&self, job: &DdlJob) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if job.deleted {
            inner.index_states.remove(&(job.table_id, job.index_id));
        } else {
            inner
                .index_states
                .insert((job.table_id, job.index_id), job.job_state);
        }
        info!(
            table_id = %job.table_id,
            index_id = %job.index_id,
            state = ?job.job_state,
            deleted = job.deleted,
            operator = "CatalogPublish",
            "index state published"
        );
        Ok(())
    }

    fn drop_index(&self, job: &DdlJob) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.index_states.remove(&(job.table_id, job.index_id));
        inner.dropped.push((job.table_id, job.index_id));
        Ok(())
    }

    fn regions(&self, table_id: TableId) -> Result<Vec<RegionDesc>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .regions
            .get(&table_id)
            .cloned()
            .ok_or_else(|| OdlError::Catalog(format!("unknown table {table_id}")))
    }

    fn region_count(&self, table_id: TableId) -> Result<usize> {
        Ok(self.regions(table_id)?.len())
    }
}
