mod backend;
mod file_storage;
mod memory;
mod models;

pub use backend::LayoutStorage;
pub use file_storage::{FileLayoutStorage, StorageError};
pub use memory::MemoryLayoutStorage;
pub use models::*;
