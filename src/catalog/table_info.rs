use crate::common::config::{PageId, TableId, PAGE_SIZE};

/// A table's column list. Real column typing, defaults, and constraints
/// live with the executor layer; the catalog only needs names so that
/// `CreateIndex` can resolve key names to positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    pub fn column_index(&self, name: &str) -> Option<u32> {
        self.columns.iter().position(|c| c == name).map(|i| i as u32)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Opaque stand-in for the table heap: the core only needs to know where
/// the heap's page chain starts and to be able to tear it down. Row
/// storage and the iterator protocol belong to the table-heap module this
/// crate doesn't own.
#[derive(Debug)]
pub struct TableHeap {
    first_page_id: PageId,
}

impl TableHeap {
    /// Allocates the heap's first page through the pool. Real table heaps
    /// chain further pages as rows are appended; that growth is the
    /// executor's responsibility, not the catalog's.
    pub fn create(bpm: &crate::buffer::BufferPoolManager) -> crate::common::error::DbResult<Self> {
        let page = bpm.new_page()?;
        let first_page_id = page.get_page_id().unwrap();
        bpm.unpin_page(first_page_id, true);
        Ok(Self { first_page_id })
    }

    pub fn from_first_page_id(first_page_id: PageId) -> Self {
        Self { first_page_id }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Frees every page owned by this heap. This stand-in heap has exactly
    /// one page; a real heap would walk its chain.
    pub fn free(&self, bpm: &crate::buffer::BufferPoolManager) {
        bpm.delete_page(self.first_page_id);
    }
}

/// On-disk record describing one table: its name, schema, and the id of
/// its heap's first page.
#[derive(Debug, Clone)]
pub struct TableMetadata {
    table_id: TableId,
    table_name: String,
    root_page_id: PageId,
    schema: Schema,
}

impl TableMetadata {
    pub fn new(table_id: TableId, table_name: String, root_page_id: PageId, schema: Schema) -> Self {
        Self {
            table_id,
            table_name,
            root_page_id,
            schema,
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// `[u32 table_id][u32 root_page_id][u32 name_len][name bytes][u32 n_cols][col_len, col bytes]*`
    pub fn serialize_into(&self, buf: &mut [u8; PAGE_SIZE]) {
        let mut off = 0;
        buf[off..off + 4].copy_from_slice(&self.table_id.to_ne_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.root_page_id.to_ne_bytes());
        off += 4;
        let name_bytes = self.table_name.as_bytes();
        buf[off..off + 4].copy_from_slice(&(name_bytes.len() as u32).to_ne_bytes());
        off += 4;
        buf[off..off + name_bytes.len()].copy_from_slice(name_bytes);
        off += name_bytes.len();
        buf[off..off + 4].copy_from_slice(&(self.schema.columns.len() as u32).to_ne_bytes());
        off += 4;
        for col in &self.schema.columns {
            let col_bytes = col.as_bytes();
            buf[off..off + 4].copy_from_slice(&(col_bytes.len() as u32).to_ne_bytes());
            off += 4;
            buf[off..off + col_bytes.len()].copy_from_slice(col_bytes);
            off += col_bytes.len();
        }
    }

    pub fn deserialize_from(buf: &[u8; PAGE_SIZE]) -> Self {
        let mut off = 0;
        let table_id = TableId::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let root_page_id = PageId::from_ne_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let name_len = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        let table_name = String::from_utf8_lossy(&buf[off..off + name_len]).into_owned();
        off += name_len;
        let n_cols = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        let mut columns = Vec::with_capacity(n_cols);
        for _ in 0..n_cols {
            let col_len = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
            off += 4;
            columns.push(String::from_utf8_lossy(&buf[off..off + col_len]).into_owned());
            off += col_len;
        }
        Self {
            table_id,
            table_name,
            root_page_id,
            schema: Schema::new(columns),
        }
    }
}

/// In-memory handle grouping a table's metadata with its live heap. This
/// is what `CatalogManager::get_table` hands back to callers.
pub struct TableInfo {
    meta: TableMetadata,
    heap: TableHeap,
}

impl TableInfo {
    pub fn new(meta: TableMetadata, heap: TableHeap) -> Self {
        Self { meta, heap }
    }

    pub fn table_id(&self) -> TableId {
        self.meta.table_id()
    }

    pub fn table_name(&self) -> &str {
        self.meta.table_name()
    }

    pub fn schema(&self) -> &Schema {
        self.meta.schema()
    }

    pub fn heap(&self) -> &TableHeap {
        &self.heap
    }
}
