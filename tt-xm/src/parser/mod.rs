//! XM file parser
//!
//! - `read` - loading XM files through [`tt_shared::XmFileIo`]
//! - `write` - serializing an [`crate::XmModule`] back to XM bytes
//! - `tests` - loader and writer tests

mod read;
mod write;


pub use read::{load_module, load_module_from_bytes};
pub use write::write_module;
