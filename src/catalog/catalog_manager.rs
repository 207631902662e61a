use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::config::{IndexId, PageId, TableId, CATALOG_META_PAGE_ID, CATALOG_METADATA_MAGIC_NUM, PAGE_SIZE};
use crate::common::error::{DbError, DbResult};

use super::index_info::{IndexInfo, IndexMetadata};
use super::table_info::{Schema, TableHeap, TableInfo, TableMetadata};

/// The catalog's own root record: which meta page holds which table's or
/// index's metadata. This is the only thing stored at the well-known
/// `CATALOG_META_PAGE_ID`; everything else hangs off it by page id.
#[derive(Debug, Clone, Default)]
struct CatalogMeta {
    table_meta_pages: HashMap<TableId, PageId>,
    index_meta_pages: HashMap<IndexId, PageId>,
}

impl CatalogMeta {
    fn serialized_size(&self) -> usize {
        4 + 4 + 4 + self.table_meta_pages.len() * 8 + self.index_meta_pages.len() * 8
    }

    fn serialize_into(&self, buf: &mut [u8; PAGE_SIZE]) {
        assert!(
            self.serialized_size() <= PAGE_SIZE,
            "catalog metadata no longer fits in one page"
        );
        let mut off = 0;
        buf[off..off + 4].copy_from_slice(&CATALOG_METADATA_MAGIC_NUM.to_ne_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&(self.table_meta_pages.len() as u32).to_ne_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&(self.index_meta_pages.len() as u32).to_ne_bytes());
        off += 4;
        for (&table_id, &page_id) in &self.table_meta_pages {
            buf[off..off + 4].copy_from_slice(&table_id.to_ne_bytes());
            off += 4;
            buf[off..off + 4].copy_from_slice(&page_id.to_ne_bytes());
            off += 4;
        }
        for (&index_id, &page_id) in &self.index_meta_pages {
            buf[off..off + 4].copy_from_slice(&index_id.to_ne_bytes());
            off += 4;
            buf[off..off + 4].copy_from_slice(&page_id.to_ne_bytes());
            off += 4;
        }
    }

    fn deserialize_from(buf: &[u8; PAGE_SIZE]) -> DbResult<Self> {
        let mut off = 0;
        let magic = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
        if magic != CATALOG_METADATA_MAGIC_NUM {
            return Err(DbError::Generic("catalog meta page has a bad magic number".into()));
        }
        off += 4;
        let n_tables = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        let n_indexes = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;

        let mut table_meta_pages = HashMap::with_capacity(n_tables);
        for _ in 0..n_tables {
            let table_id = TableId::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
            let page_id = PageId::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
            table_meta_pages.insert(table_id, page_id);
        }
        let mut index_meta_pages = HashMap::with_capacity(n_indexes);
        for _ in 0..n_indexes {
            let index_id = IndexId::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
            let page_id = PageId::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
            index_meta_pages.insert(index_id, page_id);
        }
        Ok(Self {
            table_meta_pages,
            index_meta_pages,
        })
    }
}

/// Persistent registry of tables and indexes. Every mutation flushes the
/// catalog meta page before returning success, so a crash after a
/// successful call never loses the schema change; a crash mid-call rolls
/// back whatever pages it had allocated.
pub struct CatalogManager {
    bpm: Arc<BufferPoolManager>,
    meta: CatalogMeta,
    tables: HashMap<TableId, Arc<TableInfo>>,
    table_names: HashMap<String, TableId>,
    indexes: HashMap<IndexId, Arc<IndexInfo>>,
    index_names: HashMap<String, HashMap<String, IndexId>>,
    next_table_id: AtomicU32,
    next_index_id: AtomicU32,
}

impl CatalogManager {
    /// Builds an empty catalog and persists it to the well-known meta
    /// page. Used when opening a fresh database file.
    pub fn init(bpm: Arc<BufferPoolManager>) -> DbResult<Self> {
        let mgr = Self {
            bpm,
            meta: CatalogMeta::default(),
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            index_names: HashMap::new(),
            next_table_id: AtomicU32::new(0),
            next_index_id: AtomicU32::new(0),
        };
        mgr.flush_catalog_meta_page()?;
        Ok(mgr)
    }

    /// Reads the catalog meta page and every registered table/index meta
    /// page, rebuilding in-memory state. Used when reopening an existing
    /// database file.
    pub fn load(bpm: Arc<BufferPoolManager>) -> DbResult<Self> {
        let page = bpm.fetch_page(CATALOG_META_PAGE_ID)?;
        let meta = CatalogMeta::deserialize_from(&page.get_data())?;
        bpm.unpin_page(CATALOG_META_PAGE_ID, false);

        let next_table_id = meta.table_meta_pages.keys().copied().max().map(|id| id + 1).unwrap_or(0);
        let next_index_id = meta.index_meta_pages.keys().copied().max().map(|id| id + 1).unwrap_or(0);

        let mut mgr = Self {
            bpm,
            meta,
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            index_names: HashMap::new(),
            next_table_id: AtomicU32::new(next_table_id),
            next_index_id: AtomicU32::new(next_index_id),
        };

        let table_pages: Vec<(TableId, PageId)> =
            mgr.meta.table_meta_pages.iter().map(|(&k, &v)| (k, v)).collect();
        for (table_id, page_id) in table_pages {
            mgr.load_table(table_id, page_id)?;
        }
        let index_pages: Vec<(IndexId, PageId)> =
            mgr.meta.index_meta_pages.iter().map(|(&k, &v)| (k, v)).collect();
        for (index_id, page_id) in index_pages {
            mgr.load_index(index_id, page_id)?;
        }

        Ok(mgr)
    }

    pub fn flush_catalog_meta_page(&self) -> DbResult<()> {
        let page = self.bpm.fetch_page(CATALOG_META_PAGE_ID)?;
        self.meta.serialize_into(&mut page.get_data_mut());
        drop(page);
        self.bpm.unpin_page(CATALOG_META_PAGE_ID, true);
        self.bpm.flush_page(CATALOG_META_PAGE_ID);
        Ok(())
    }

    fn load_table(&mut self, table_id: TableId, page_id: PageId) -> DbResult<()> {
        let page = self.bpm.fetch_page(page_id)?;
        let table_meta = TableMetadata::deserialize_from(&page.get_data());
        self.bpm.unpin_page(page_id, false);

        let heap = TableHeap::from_first_page_id(table_meta.root_page_id());
        let table_name = table_meta.table_name().to_string();
        let info = Arc::new(TableInfo::new(table_meta, heap));
        self.tables.insert(table_id, info);
        self.table_names.insert(table_name, table_id);
        Ok(())
    }

    fn load_index(&mut self, index_id: IndexId, page_id: PageId) -> DbResult<()> {
        let page = self.bpm.fetch_page(page_id)?;
        let index_meta = IndexMetadata::deserialize_from(&page.get_data());
        self.bpm.unpin_page(page_id, false);

        let table = self
            .tables
            .get(&index_meta.table_id())
            .cloned()
            .ok_or_else(|| DbError::TableNotExist(format!("table id {}", index_meta.table_id())))?;
        let table_name = table.table_name().to_string();
        let index_name = index_meta.index_name().to_string();
        let info = Arc::new(IndexInfo::new(index_meta, table));
        self.indexes.insert(index_id, info);
        self.index_names.entry(table_name).or_default().insert(index_name, index_id);
        Ok(())
    }

    /// Rejects a duplicate name. Mid-flow failure (heap allocation,
    /// metadata page allocation) rolls back whatever pages were already
    /// claimed before returning the error.
    #[tracing::instrument(skip(self, schema))]
    pub fn create_table(&mut self, table_name: &str, schema: Schema) -> DbResult<Arc<TableInfo>> {
        if self.table_names.contains_key(table_name) {
            return Err(DbError::TableAlreadyExists(table_name.to_string()));
        }

        let table_id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        let schema = schema.deep_copy();

        let meta_page = self.bpm.new_page()?;
        let meta_page_id = meta_page.get_page_id().unwrap();
        self.bpm.unpin_page(meta_page_id, false);

        let heap = match TableHeap::create(&self.bpm) {
            Ok(heap) => heap,
            Err(e) => {
                self.bpm.delete_page(meta_page_id);
                return Err(e);
            }
        };

        let table_meta = TableMetadata::new(table_id, table_name.to_string(), heap.first_page_id(), schema);
        let meta_page = self.bpm.fetch_page(meta_page_id)?;
        table_meta.serialize_into(&mut meta_page.get_data_mut());
        drop(meta_page);
        self.bpm.unpin_page(meta_page_id, true);

        let info = Arc::new(TableInfo::new(table_meta, heap));
        self.tables.insert(table_id, info.clone());
        self.table_names.insert(table_name.to_string(), table_id);
        self.meta.table_meta_pages.insert(table_id, meta_page_id);
        self.flush_catalog_meta_page()?;

        Ok(info)
    }

    pub fn get_table(&self, table_name: &str) -> DbResult<Arc<TableInfo>> {
        let table_id = self
            .table_names
            .get(table_name)
            .ok_or_else(|| DbError::TableNotExist(table_name.to_string()))?;
        Ok(self.tables.get(table_id).expect("table_names/tables out of sync").clone())
    }

    pub fn get_table_by_id(&self, table_id: TableId) -> DbResult<Arc<TableInfo>> {
        self.tables
            .get(&table_id)
            .cloned()
            .ok_or_else(|| DbError::TableNotExist(format!("table id {table_id}")))
    }

    pub fn get_tables(&self) -> Vec<Arc<TableInfo>> {
        self.tables.values().cloned().collect()
    }

    /// Rejects an unknown table, a duplicate index name, or a key that
    /// doesn't name an existing column.
    pub fn create_index(&mut self, table_name: &str, index_name: &str, index_keys: &[String]) -> DbResult<Arc<IndexInfo>> {
        let table = self.get_table(table_name)?;
        if self
            .index_names
            .get(table_name)
            .map(|names| names.contains_key(index_name))
            .unwrap_or(false)
        {
            return Err(DbError::IndexAlreadyExists(index_name.to_string()));
        }

        let mut key_map = Vec::with_capacity(index_keys.len());
        for key in index_keys {
            let col_index = table
                .schema()
                .column_index(key)
                .ok_or_else(|| DbError::ColumnNameNotExist(key.clone()))?;
            key_map.push(col_index);
        }

        let index_id = self.next_index_id.fetch_add(1, Ordering::SeqCst);
        let meta_page = self.bpm.new_page()?;
        let meta_page_id = meta_page.get_page_id().unwrap();

        let index_meta = IndexMetadata::new(index_id, index_name.to_string(), table.table_id(), key_map);
        index_meta.serialize_into(&mut meta_page.get_data_mut());
        drop(meta_page);
        self.bpm.unpin_page(meta_page_id, true);

        let info = Arc::new(IndexInfo::new(index_meta, table));
        self.indexes.insert(index_id, info.clone());
        self.index_names
            .entry(table_name.to_string())
            .or_default()
            .insert(index_name.to_string(), index_id);
        self.meta.index_meta_pages.insert(index_id, meta_page_id);
        self.flush_catalog_meta_page()?;

        Ok(info)
    }

    pub fn get_index(&self, table_name: &str, index_name: &str) -> DbResult<Arc<IndexInfo>> {
        let index_id = self
            .index_names
            .get(table_name)
            .ok_or_else(|| DbError::TableNotExist(table_name.to_string()))?
            .get(index_name)
            .ok_or_else(|| DbError::IndexNotFound(index_name.to_string()))?;
        Ok(self.indexes.get(index_id).expect("index_names/indexes out of sync").clone())
    }

    pub fn get_table_indexes(&self, table_name: &str) -> DbResult<Vec<Arc<IndexInfo>>> {
        let names = self
            .index_names
            .get(table_name)
            .ok_or_else(|| DbError::TableNotExist(table_name.to_string()))?;
        Ok(names.values().map(|id| self.indexes[id].clone()).collect())
    }

    /// Drops one index: tears down its meta page, removes it from every
    /// in-memory map, and flushes the catalog.
    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> DbResult<()> {
        let index_id = *self
            .index_names
            .get(table_name)
            .ok_or_else(|| DbError::TableNotExist(table_name.to_string()))?
            .get(index_name)
            .ok_or_else(|| DbError::IndexNotFound(index_name.to_string()))?;

        self.indexes.remove(&index_id);
        self.index_names.get_mut(table_name).unwrap().remove(index_name);
        if let Some(page_id) = self.meta.index_meta_pages.remove(&index_id) {
            self.bpm.delete_page(page_id);
        }
        self.flush_catalog_meta_page()?;
        Ok(())
    }

    /// Drops every index on the table first, then the heap's pages, then
    /// the table's own meta page and in-memory entries.
    #[tracing::instrument(skip(self))]
    pub fn drop_table(&mut self, table_name: &str) -> DbResult<()> {
        let table = self.get_table(table_name)?;
        let table_id = table.table_id();

        let index_names: Vec<String> = self
            .index_names
            .get(table_name)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        for index_name in index_names {
            self.drop_index(table_name, &index_name)?;
        }

        table.heap().free(&self.bpm);

        if let Some(page_id) = self.meta.table_meta_pages.remove(&table_id) {
            self.bpm.delete_page(page_id);
        }
        self.table_names.remove(table_name);
        self.tables.remove(&table_id);
        self.flush_catalog_meta_page()?;
        Ok(())
    }
}
