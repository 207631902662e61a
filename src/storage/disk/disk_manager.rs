use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::common::config::{PageId, BITMAP_SIZE, INVALID_PAGE_ID, MAX_EXTENTS, META_PAGE_ID, PAGE_SIZE};
use crate::common::error::DbResult;
use crate::storage::disk::bitmap_page::BitmapPage;

/// In-memory mirror of physical page 0: allocation bookkeeping for every
/// extent. Authoritative while the manager is open, flushed to disk on
/// close and on every allocate/deallocate.
#[derive(Debug, Clone)]
struct DiskFileMeta {
    num_allocated_pages: u32,
    extent_used_page: Vec<u32>,
}

impl DiskFileMeta {
    fn empty() -> Self {
        Self {
            num_allocated_pages: 0,
            extent_used_page: Vec::new(),
        }
    }

    fn num_extents(&self) -> u32 {
        self.extent_used_page.len() as u32
    }

    fn serialize_into(&self, buf: &mut [u8; PAGE_SIZE]) {
        buf[0..4].copy_from_slice(&self.num_allocated_pages.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.num_extents().to_ne_bytes());
        for (i, used) in self.extent_used_page.iter().enumerate() {
            let off = 8 + i * 4;
            buf[off..off + 4].copy_from_slice(&used.to_ne_bytes());
        }
    }

    fn deserialize_from(buf: &[u8; PAGE_SIZE]) -> Self {
        let num_allocated_pages = u32::from_ne_bytes(buf[0..4].try_into().unwrap());
        let num_extents = u32::from_ne_bytes(buf[4..8].try_into().unwrap());
        let mut extent_used_page = Vec::with_capacity(num_extents as usize);
        for i in 0..num_extents as usize {
            let off = 8 + i * 4;
            extent_used_page.push(u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()));
        }
        Self {
            num_allocated_pages,
            extent_used_page,
        }
    }
}

struct Inner {
    file: File,
    meta: DiskFileMeta,
    closed: bool,
}

/// Takes care of allocation and deallocation of pages within a database
/// file, and the translation between logical page ids (dense, used by the
/// buffer pool) and physical page ids (file offsets). A single lock
/// serializes every file access and every bitmap mutation, so
/// allocate/deallocate never re-enter `read_page`/`write_page` through the
/// public API — they call the locked helpers directly instead of recursing
/// through a second lock acquisition.
pub struct DiskManager {
    inner: Mutex<Inner>,
    bitmap_size: usize,
}

impl DiskManager {
    pub fn new(db_file: &str) -> DbResult<Self> {
        Self::with_bitmap_size(db_file, BITMAP_SIZE)
    }

    /// Same as `new`, but with a caller-chosen extent size. Production code
    /// should use `new`; a non-default bitmap size exists so tests can
    /// exercise the allocator boundary at small, easy-to-reason-about sizes.
    pub fn with_bitmap_size(db_file: &str, bitmap_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(db_file)
            .or_else(|_| {
                OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .open(db_file)
            })?;

        let mut inner = Inner {
            file,
            meta: DiskFileMeta::empty(),
            closed: false,
        };
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical_locked(&mut inner.file, META_PAGE_ID, &mut buf)?;
        inner.meta = DiskFileMeta::deserialize_from(&buf);

        Ok(Self {
            inner: Mutex::new(inner),
            bitmap_size,
        })
    }

    pub fn bitmap_size(&self) -> usize {
        self.bitmap_size
    }

    /// `physical = logical + floor(logical / bitmap_size) + 2`: one meta
    /// page, then repeating groups of (one bitmap page + bitmap_size data
    /// pages).
    pub fn map_page_id(&self, logical_id: PageId) -> PageId {
        logical_id + logical_id / self.bitmap_size as u32 + 2
    }

    fn bitmap_physical_id(&self, extent_id: u32) -> PageId {
        1 + extent_id * (self.bitmap_size as u32 + 1)
    }

    fn read_physical_locked(file: &mut File, physical_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> DbResult<()> {
        let offset = physical_id as u64 * PAGE_SIZE as u64;
        let file_len = file.metadata()?.len();
        if offset >= file_len {
            buf.fill(0);
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))?;
        let read = file.read(buf)?;
        if read < PAGE_SIZE {
            debug!("read less than a page at physical id {physical_id}");
            buf[read..].fill(0);
        }
        Ok(())
    }

    fn write_physical_locked(file: &mut File, physical_id: PageId, buf: &[u8; PAGE_SIZE]) -> DbResult<()> {
        let offset = physical_id as u64 * PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }

    pub fn read_page(&self, logical_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> DbResult<()> {
        let physical_id = self.map_page_id(logical_id);
        let mut inner = self.inner.lock();
        Self::read_physical_locked(&mut inner.file, physical_id, buf)
    }

    pub fn write_page(&self, logical_id: PageId, buf: &[u8; PAGE_SIZE]) -> DbResult<()> {
        let physical_id = self.map_page_id(logical_id);
        let mut inner = self.inner.lock();
        Self::write_physical_locked(&mut inner.file, physical_id, buf)
    }

    /// Scans existing extents for free space, appending a new extent if
    /// none has room and the meta page can still address one. Returns
    /// `None` (INVALID_PAGE_ID at the wire level) when the disk is full.
    pub fn allocate_page(&self) -> Option<PageId> {
        let mut inner = self.inner.lock();

        let mut extent_id = None;
        for (i, used) in inner.meta.extent_used_page.iter().enumerate() {
            if (*used as usize) < self.bitmap_size {
                extent_id = Some(i as u32);
                break;
            }
        }
        let extent_id = match extent_id {
            Some(id) => id,
            None => {
                let new_id = inner.meta.num_extents();
                if new_id as usize >= MAX_EXTENTS {
                    return None;
                }
                inner.meta.extent_used_page.push(0);
                new_id
            }
        };

        let bitmap_physical_id = self.bitmap_physical_id(extent_id);
        let mut buf = [0u8; PAGE_SIZE];
        if Self::read_physical_locked(&mut inner.file, bitmap_physical_id, &mut buf).is_err() {
            return None;
        }
        let mut bitmap = BitmapPage::deserialize_from(&buf, self.bitmap_size);
        let offset = bitmap.allocate()?;
        bitmap.serialize_into(&mut buf);
        if Self::write_physical_locked(&mut inner.file, bitmap_physical_id, &buf).is_err() {
            return None;
        }

        inner.meta.num_allocated_pages += 1;
        inner.meta.extent_used_page[extent_id as usize] += 1;

        Some(extent_id * self.bitmap_size as u32 + offset)
    }

    /// No-op if `logical_id` is already free.
    pub fn deallocate_page(&self, logical_id: PageId) {
        if self.is_page_free(logical_id) {
            return;
        }
        let mut inner = self.inner.lock();
        let extent_id = logical_id / self.bitmap_size as u32;
        let offset = logical_id % self.bitmap_size as u32;
        let bitmap_physical_id = self.bitmap_physical_id(extent_id);

        let mut buf = [0u8; PAGE_SIZE];
        if Self::read_physical_locked(&mut inner.file, bitmap_physical_id, &mut buf).is_err() {
            return;
        }
        let mut bitmap = BitmapPage::deserialize_from(&buf, self.bitmap_size);
        if !bitmap.deallocate(offset) {
            warn!("failed to deallocate page {logical_id}: already free");
            return;
        }
        bitmap.serialize_into(&mut buf);
        let _ = Self::write_physical_locked(&mut inner.file, bitmap_physical_id, &buf);

        inner.meta.num_allocated_pages -= 1;
        if let Some(used) = inner.meta.extent_used_page.get_mut(extent_id as usize) {
            *used -= 1;
        }
    }

    pub fn is_page_free(&self, logical_id: PageId) -> bool {
        if logical_id == INVALID_PAGE_ID {
            return false;
        }
        let mut inner = self.inner.lock();
        let extent_id = logical_id / self.bitmap_size as u32;
        let offset = logical_id % self.bitmap_size as u32;
        let bitmap_physical_id = self.bitmap_physical_id(extent_id);

        let mut buf = [0u8; PAGE_SIZE];
        if Self::read_physical_locked(&mut inner.file, bitmap_physical_id, &mut buf).is_err() {
            return false;
        }
        let bitmap = BitmapPage::deserialize_from(&buf, self.bitmap_size);
        bitmap.is_free(offset)
    }

    pub fn num_allocated_pages(&self) -> u32 {
        self.inner.lock().meta.num_allocated_pages
    }

    /// Flushes the in-memory `DiskFileMeta` to physical page 0. Idempotent.
    pub fn close(&self) -> DbResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }
        let mut buf = [0u8; PAGE_SIZE];
        inner.meta.serialize_into(&mut buf);
        Self::write_physical_locked(&mut inner.file, META_PAGE_ID, &buf)?;
        inner.closed = true;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("error flushing disk meta on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn temp_db(name: &str) -> (TempDir, String) {
        let dir = TempDir::new("disk_manager_test").unwrap();
        let path = dir.path().join(name).to_str().unwrap().to_string();
        (dir, path)
    }

    #[test]
    fn read_write_round_trip() {
        let (_dir, path) = temp_db("test.db");
        let dm = DiskManager::new(&path).unwrap();
        let id = dm.allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[..14].copy_from_slice(b"A test string.");
        dm.write_page(id, &data).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(id, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn alloc_then_free_reuses_lowest_id() {
        let (_dir, path) = temp_db("test.db");
        let dm = DiskManager::new(&path).unwrap();
        let id = dm.allocate_page().unwrap();
        dm.deallocate_page(id);
        let id2 = dm.allocate_page().unwrap();
        assert_eq!(id, id2);
    }

    #[test]
    fn allocator_boundary_with_small_extents() {
        // Scenario 3: BITMAP_SIZE = 8, allocate 9 pages.
        let (_dir, path) = temp_db("test.db");
        let dm = DiskManager::with_bitmap_size(&path, 8).unwrap();

        let mut logical_ids = Vec::new();
        for _ in 0..9 {
            logical_ids.push(dm.allocate_page().unwrap());
        }
        assert_eq!(logical_ids, (0..9).collect::<Vec<_>>());

        let expected_physical: Vec<PageId> = vec![2, 3, 4, 5, 6, 7, 8, 9, 11];
        let actual_physical: Vec<PageId> = logical_ids.iter().map(|&id| dm.map_page_id(id)).collect();
        assert_eq!(actual_physical, expected_physical);
    }

    #[test]
    fn is_page_free_reflects_allocation_state() {
        let (_dir, path) = temp_db("test.db");
        let dm = DiskManager::new(&path).unwrap();
        let id = dm.allocate_page().unwrap();
        assert!(!dm.is_page_free(id));
        dm.deallocate_page(id);
        assert!(dm.is_page_free(id));
    }

    #[test]
    fn popcount_matches_num_allocated_pages() {
        let (_dir, path) = temp_db("test.db");
        let dm = DiskManager::with_bitmap_size(&path, 4).unwrap();
        for _ in 0..10 {
            dm.allocate_page().unwrap();
        }
        assert_eq!(dm.num_allocated_pages(), 10);
    }
}
