mod host_file;
mod page_manager;
mod validator;

pub use host_file::*;
pub use page_manager::*;
pub use validator::*;
