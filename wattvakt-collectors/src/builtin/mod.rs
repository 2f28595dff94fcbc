//! Generic collectors that need no vendor integration.

mod file;
mod static_source;

pub use file::FileSource;
pub use static_source::StaticSource;
