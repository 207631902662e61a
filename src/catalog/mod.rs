pub mod catalog_manager;
pub mod index_info;
pub mod table_info;

pub use catalog_manager::CatalogManager;
pub use index_info::{IndexInfo, IndexMetadata};
pub use table_info::{Schema, TableHeap, TableInfo, TableMetadata};
