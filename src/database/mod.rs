mod config_page;
mod database_file;
mod header;

pub use config_page::*;
pub use database_file::*;
pub use header::*;
