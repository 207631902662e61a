use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::config::{PageId, PAGE_SIZE};

/// A buffer-pool frame's resident content: the PAGE_SIZE byte buffer plus
/// the book-keeping (page id, pin count, dirty flag) the BufferPoolManager
/// needs to arbitrate access to it. Cloning a `Page` is cheap — it's a
/// handle onto shared, interior-mutable state, not a copy of the data.
#[derive(Debug, Clone)]
pub struct Page(Arc<RwLock<PageInner>>);

#[derive(Debug)]
struct PageInner {
    data: [u8; PAGE_SIZE],
    page_id: Option<PageId>,
    pin_count: i32,
    is_dirty: bool,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Page {
        let inner = PageInner {
            data: [0; PAGE_SIZE],
            page_id: None,
            pin_count: 0,
            is_dirty: false,
        };
        Page(Arc::new(RwLock::new(inner)))
    }

    /// Clears identity and content, as if the frame held no resident page.
    pub fn reset(&self) {
        let mut p = self.0.write();
        p.data.fill(0);
        p.page_id = None;
        p.pin_count = 0;
        p.is_dirty = false;
    }

    pub fn get_data(&self) -> MappedRwLockReadGuard<'_, [u8; PAGE_SIZE]> {
        RwLockReadGuard::map(self.0.read(), |i| &i.data)
    }

    pub fn get_data_mut(&self) -> MappedRwLockWriteGuard<'_, [u8; PAGE_SIZE]> {
        RwLockWriteGuard::map(self.0.write(), |i| &mut i.data)
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.0.write().page_id = Some(page_id);
    }

    pub fn get_page_id(&self) -> Option<PageId> {
        self.0.read().page_id
    }

    pub fn get_pin_count(&self) -> i32 {
        self.0.read().pin_count
    }

    pub fn set_pin_count(&self, count: i32) {
        self.0.write().pin_count = count;
    }

    pub fn pin(&self) {
        self.0.write().pin_count += 1;
    }

    pub fn unpin(&self) {
        self.0.write().pin_count -= 1;
    }

    pub fn is_dirty(&self) -> bool {
        self.0.read().is_dirty
    }

    pub fn set_dirty(&self, is_dirty: bool) {
        self.0.write().is_dirty = is_dirty;
    }
}
