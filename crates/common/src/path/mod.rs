//! Directory hierarchy over a flat, prefix-addressable key space
//!
//! Directories exist in two forms: zero-byte *marker* objects carrying the
//! folder flag in their metadata, and *virtual* directories that are only a
//! common name prefix of other objects. [`DirectoryLister`] merges both so
//! that each logical directory is reported once.

mod lister;
mod virtualizer;

pub use lister::{DirectoryLister, DirectoryPage};
pub use virtualizer::{ancestors, normalize, parent, PathVirtualizer};
