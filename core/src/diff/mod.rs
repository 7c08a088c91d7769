//! Unified diff parsing: new-file line mapping and multi-file splitting.

pub mod parser;

pub use parser::{added_lines, new_file_lines, split_patches, FilePatch, FileStatus};
