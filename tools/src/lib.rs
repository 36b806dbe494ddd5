pub mod format;
pub mod fs;
pub mod lru_cache;
pub mod sha;
