pub mod error;
pub mod factory;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::BlobError;
pub use factory::{StorageConfig, StorageFactories, StorageOpener};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::{BlobMeta, BlobStore};
