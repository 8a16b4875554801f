mod cell;
mod slotted_page;

pub use cell::*;
pub use slotted_page::*;
