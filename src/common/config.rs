// Size of a single on-disk / in-memory page, in bytes.
pub const PAGE_SIZE: usize = 4096;

// Header of a BitmapPage: u32 page_allocated + u32 next_free_page.
const BITMAP_HEADER_SIZE: usize = 8;

// Number of data pages a single bitmap page can track.
pub const BITMAP_SIZE: usize = (PAGE_SIZE - BITMAP_HEADER_SIZE) * 8;

// Physical page holding the DiskFileMeta.
pub const META_PAGE_ID: PageId = 0;

// Upper bound on the number of extents a DiskFileMeta can record:
// 4 bytes num_allocated_pages + 4 bytes num_extents leaves the rest for
// one u32 per extent.
pub const MAX_EXTENTS: usize = (PAGE_SIZE - 8) / 4;

// Well-known logical page holding serialized CatalogMeta.
pub const CATALOG_META_PAGE_ID: PageId = 0;
pub const CATALOG_METADATA_MAGIC_NUM: u32 = 0x8430_7A1F;

pub type PageId = u32;
pub type FrameId = u32;
pub type TxnId = u32;
pub type Lsn = u32;
pub type TableId = u32;
pub type IndexId = u32;

// Sentinel values, kept for on-disk/wire compatibility with systems that
// encode ids as plain integers. In-memory APIs prefer `Option<PageId>`.
pub const INVALID_PAGE_ID: PageId = PageId::MAX;
pub const INVALID_FRAME_ID: FrameId = FrameId::MAX;
