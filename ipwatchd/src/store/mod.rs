pub mod db;
pub mod handle;

pub use db::EntryDb;
pub use handle::StoreHandle;
