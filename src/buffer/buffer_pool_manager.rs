use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use super::lru_replacer::LRUReplacer;
use crate::common::config::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::common::error::{DbError, DbResult};
use crate::storage::disk::DiskManager;
use crate::storage::page::Page;

struct Inner {
    frames: Vec<Page>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: LRUReplacer,
}

/// Reads disk pages into, and writes them back out of, a fixed-size pool
/// of in-memory frames. Every successful `fetch_page`/`new_page` hands the
/// caller one outstanding pin; callers must pair it with exactly one
/// `unpin_page`. A single lock serializes the four mutating operations —
/// disk I/O runs with the lock held, a conservative, correctness-first
/// choice over finer-grained per-frame latching.
pub struct BufferPoolManager {
    pool_size: usize,
    disk_manager: DiskManager,
    inner: Mutex<Inner>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            free_list.push_back(i as FrameId);
        }
        let frames = (0..pool_size).map(|_| Page::new()).collect();
        Self {
            pool_size,
            disk_manager,
            inner: Mutex::new(Inner {
                frames,
                page_table: HashMap::new(),
                free_list,
                replacer: LRUReplacer::new(pool_size),
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn disk_manager(&self) -> &DiskManager {
        &self.disk_manager
    }

    fn find_free_frame(inner: &mut Inner) -> Option<FrameId> {
        inner.free_list.pop_front().or_else(|| inner.replacer.victim())
    }

    fn write_back_if_dirty(&self, page: &Page) -> DbResult<()> {
        if page.is_dirty() {
            if let Some(old_id) = page.get_page_id() {
                self.disk_manager.write_page(old_id, &page.get_data())?;
            }
        }
        Ok(())
    }

    /// Returns the requested page, pinning it. Reads through to disk on a
    /// miss, evicting a victim frame (free list first, else the replacer)
    /// and writing it back first if dirty.
    #[tracing::instrument(skip(self))]
    pub fn fetch_page(&self, page_id: PageId) -> DbResult<Page> {
        if page_id == INVALID_PAGE_ID {
            return Err(DbError::Generic(format!("invalid page id {page_id}")));
        }

        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let page = inner.frames[frame_id as usize].clone();
            page.pin();
            inner.replacer.pin(frame_id);
            return Ok(page);
        }

        let frame_id = Self::find_free_frame(&mut inner)
            .ok_or_else(|| DbError::Exhausted("buffer pool has no evictable frame".into()))?;
        let page = inner.frames[frame_id as usize].clone();
        if let Err(e) = self.write_back_if_dirty(&page) {
            // Frame was never claimed for the incoming page; return it as-is.
            inner.free_list.push_back(frame_id);
            return Err(e);
        }

        let old_id = page.get_page_id();
        if let Some(old_id) = old_id {
            inner.page_table.remove(&old_id);
        }

        let mut buf = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_manager.read_page(page_id, &mut buf) {
            // Restore the frame to the state it was in before eviction started.
            if let Some(old_id) = old_id {
                inner.page_table.insert(old_id, frame_id);
            }
            inner.free_list.push_back(frame_id);
            return Err(e);
        }
        *page.get_data_mut() = buf;
        page.set_page_id(page_id);
        page.set_pin_count(1);
        page.set_dirty(false);
        inner.page_table.insert(page_id, frame_id);

        Ok(page)
    }

    /// Allocates a fresh logical page on disk and returns it pinned.
    #[tracing::instrument(skip(self))]
    pub fn new_page(&self) -> DbResult<Page> {
        let mut inner = self.inner.lock();

        let frame_id = Self::find_free_frame(&mut inner)
            .ok_or_else(|| DbError::Exhausted("buffer pool has no evictable frame".into()))?;
        let page = inner.frames[frame_id as usize].clone();
        if let Err(e) = self.write_back_if_dirty(&page) {
            // Frame was never claimed for the new page; return it as-is.
            inner.free_list.push_back(frame_id);
            return Err(e);
        }

        let new_id = match self.disk_manager.allocate_page() {
            Some(id) => id,
            None => {
                // Frame was never claimed for the new page; return it as-is.
                inner.free_list.push_back(frame_id);
                return Err(DbError::Exhausted("disk allocator has no free pages".into()));
            }
        };

        if let Some(old_id) = page.get_page_id() {
            inner.page_table.remove(&old_id);
        }
        page.reset();
        page.set_page_id(new_id);
        page.set_pin_count(1);
        inner.page_table.insert(new_id, frame_id);

        Ok(page)
    }

    /// Decrements the pin count, ORing `dirty_hint` into the sticky dirty
    /// bit. Once the pin count reaches zero, the frame becomes evictable.
    /// Returns false if the page isn't resident or was already unpinned.
    pub fn unpin_page(&self, page_id: PageId, dirty_hint: bool) -> bool {
        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let page = inner.frames[frame_id as usize].clone();
        if page.get_pin_count() <= 0 {
            log::warn!("page {page_id} is already unpinned");
            return false;
        }
        if dirty_hint {
            page.set_dirty(true);
        }
        page.unpin();
        if page.get_pin_count() == 0 {
            inner.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes the frame's buffer to disk regardless of the dirty flag, and
    /// clears it. Does not change pin state.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let page = inner.frames[frame_id as usize].clone();
        if let Err(e) = self.disk_manager.write_page(page_id, &page.get_data()) {
            log::error!("I/O error flushing page {page_id}: {e}");
            return false;
        }
        page.set_dirty(false);
        true
    }

    pub fn flush_all_pages(&self) {
        let inner = self.inner.lock();
        for (&page_id, &frame_id) in inner.page_table.iter() {
            let page = &inner.frames[frame_id as usize];
            if let Err(e) = self.disk_manager.write_page(page_id, &page.get_data()) {
                log::error!("I/O error flushing page {page_id}: {e}");
                continue;
            }
            page.set_dirty(false);
        }
    }

    /// Deallocates and evicts `page_id`. A page with outstanding pins
    /// cannot be deleted. Deleting a page that isn't resident is a no-op
    /// success, matching the "nothing to do in pool" contract.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return true;
        };
        let page = inner.frames[frame_id as usize].clone();
        if page.get_pin_count() > 0 {
            return false;
        }
        self.disk_manager.deallocate_page(page_id);
        inner.page_table.remove(&page_id);
        inner.replacer.pin(frame_id);
        page.reset();
        inner.free_list.push_back(frame_id);
        true
    }

    #[cfg(test)]
    pub fn all_unpinned(&self) -> bool {
        let inner = self.inner.lock();
        inner.frames.iter().all(|p| p.get_pin_count() == 0)
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        self.flush_all_pages();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn temp_bpm(pool_size: usize) -> (TempDir, BufferPoolManager) {
        let dir = TempDir::new("bpm_test").unwrap();
        let path = dir.path().join("test.db").to_str().unwrap().to_string();
        let dm = DiskManager::new(&path).unwrap();
        (dir, BufferPoolManager::new(pool_size, dm))
    }

    #[test]
    fn new_page_then_fetch_round_trips_data() {
        let (_dir, bpm) = temp_bpm(3);
        let page = bpm.new_page().unwrap();
        let id = page.get_page_id().unwrap();
        page.get_data_mut()[0] = b'A';
        bpm.unpin_page(id, true);
        bpm.flush_page(id);

        let fetched = bpm.fetch_page(id).unwrap();
        assert_eq!(fetched.get_data()[0], b'A');
        bpm.unpin_page(id, false);
    }

    #[test]
    fn random_binary_page_round_trips_through_eviction() {
        use rand::distributions::{Distribution, Uniform};

        let (_dir, bpm) = temp_bpm(1);
        let mut rng = rand::thread_rng();
        let byte_dist = Uniform::from(u8::MIN..=u8::MAX);
        let mut data: Vec<u8> = (0..PAGE_SIZE).map(|_| byte_dist.sample(&mut rng)).collect();
        data[PAGE_SIZE / 2] = 0;
        data[PAGE_SIZE - 1] = 0;

        let page = bpm.new_page().unwrap();
        let id = page.get_page_id().unwrap();
        page.get_data_mut().copy_from_slice(&data);
        bpm.unpin_page(id, true);

        // Force the only frame to evict by allocating another page.
        let other = bpm.new_page().unwrap();
        bpm.unpin_page(other.get_page_id().unwrap(), false);

        let fetched = bpm.fetch_page(id).unwrap();
        assert_eq!(&*fetched.get_data(), data.as_slice());
        bpm.unpin_page(id, false);
    }

    #[test]
    fn pool_exhaustion_when_all_pinned() {
        let (_dir, bpm) = temp_bpm(2);
        let _p1 = bpm.new_page().unwrap();
        let _p2 = bpm.new_page().unwrap();
        assert!(bpm.new_page().is_err());
    }

    #[test]
    fn delete_denied_when_pinned() {
        let (_dir, bpm) = temp_bpm(2);
        let page = bpm.new_page().unwrap();
        let id = page.get_page_id().unwrap();
        assert!(!bpm.delete_page(id));
        bpm.unpin_page(id, false);
        assert!(bpm.delete_page(id));
    }

    #[test]
    fn pool_replacement_evicts_one_unpinned_frame() {
        let (_dir, bpm) = temp_bpm(3);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let p = bpm.new_page().unwrap();
            ids.push(p.get_page_id().unwrap());
            bpm.unpin_page(p.get_page_id().unwrap(), false);
        }
        let fourth = bpm.new_page().unwrap();
        let fourth_id = fourth.get_page_id().unwrap();
        bpm.unpin_page(fourth_id, false);

        let resident: Vec<PageId> = {
            let inner = bpm.inner.lock();
            inner.page_table.keys().copied().collect()
        };
        assert_eq!(resident.len(), 3);
        assert!(resident.contains(&fourth_id));
    }

    #[test]
    fn dirty_write_back_on_eviction() {
        let (_dir, bpm) = temp_bpm(1);
        let page = bpm.new_page().unwrap();
        let id = page.get_page_id().unwrap();
        page.get_data_mut()[0] = b'A';
        bpm.unpin_page(id, true);

        let other = bpm.new_page().unwrap();
        bpm.unpin_page(other.get_page_id().unwrap(), false);

        let mut buf = [0u8; PAGE_SIZE];
        bpm.disk_manager().read_page(id, &mut buf).unwrap();
        assert_eq!(buf[0], b'A');
    }

    #[test]
    fn unpin_below_zero_returns_false() {
        let (_dir, bpm) = temp_bpm(2);
        let page = bpm.new_page().unwrap();
        let id = page.get_page_id().unwrap();
        assert!(bpm.unpin_page(id, false));
        assert!(!bpm.unpin_page(id, false));
    }
}
