pub mod checksum;
pub mod db;
pub mod fs_store;
pub mod vault;

pub use checksum::{spawn_checksum_worker, ChecksumDispatcher};
pub use db::SqliteStore;
pub use fs_store::FsStorage;
pub use vault::KeyVault;
