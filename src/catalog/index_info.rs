use std::sync::Arc;

use crate::common::config::{IndexId, PAGE_SIZE, TableId};

use super::table_info::TableInfo;

/// On-disk record describing one index: its name, owning table, and the
/// column positions it's built over (`key_map`, resolved from column
/// names at creation time).
#[derive(Debug, Clone)]
pub struct IndexMetadata {
    index_id: IndexId,
    index_name: String,
    table_id: TableId,
    key_map: Vec<u32>,
}

impl IndexMetadata {
    pub fn new(index_id: IndexId, index_name: String, table_id: TableId, key_map: Vec<u32>) -> Self {
        Self {
            index_id,
            index_name,
            table_id,
            key_map,
        }
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn key_map(&self) -> &[u32] {
        &self.key_map
    }

    /// `[u32 index_id][u32 table_id][u32 name_len][name bytes][u32 n_keys][u32 key]*`
    pub fn serialize_into(&self, buf: &mut [u8; PAGE_SIZE]) {
        let mut off = 0;
        buf[off..off + 4].copy_from_slice(&self.index_id.to_ne_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.table_id.to_ne_bytes());
        off += 4;
        let name_bytes = self.index_name.as_bytes();
        buf[off..off + 4].copy_from_slice(&(name_bytes.len() as u32).to_ne_bytes());
        off += 4;
        buf[off..off + name_bytes.len()].copy_from_slice(name_bytes);
        off += name_bytes.len();
        buf[off..off + 4].copy_from_slice(&(self.key_map.len() as u32).to_ne_bytes());
        off += 4;
        for key in &self.key_map {
            buf[off..off + 4].copy_from_slice(&key.to_ne_bytes());
            off += 4;
        }
    }

    pub fn deserialize_from(buf: &[u8; PAGE_SIZE]) -> Self {
        let mut off = 0;
        let index_id = IndexId::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let table_id = TableId::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let name_len = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        let index_name = String::from_utf8_lossy(&buf[off..off + name_len]).into_owned();
        off += name_len;
        let n_keys = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        let mut key_map = Vec::with_capacity(n_keys);
        for _ in 0..n_keys {
            key_map.push(u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()));
            off += 4;
        }
        Self {
            index_id,
            index_name,
            table_id,
            key_map,
        }
    }
}

/// In-memory handle grouping an index's metadata with the table it's
/// built over. Building the actual index structure (a B+-tree in a full
/// engine) is an external collaborator's job; this core only tracks the
/// index's existence and persistence.
pub struct IndexInfo {
    meta: IndexMetadata,
    table: Arc<TableInfo>,
}

impl IndexInfo {
    pub fn new(meta: IndexMetadata, table: Arc<TableInfo>) -> Self {
        Self { meta, table }
    }

    pub fn index_id(&self) -> IndexId {
        self.meta.index_id()
    }

    pub fn index_name(&self) -> &str {
        self.meta.index_name()
    }

    pub fn table(&self) -> &Arc<TableInfo> {
        &self.table
    }

    pub fn key_map(&self) -> &[u32] {
        self.meta.key_map()
    }
}
