mod buffer_pool;
mod lru_replacer;
mod secondary_storage;

pub use buffer_pool::*;
pub use lru_replacer::*;
pub use secondary_storage::*;
