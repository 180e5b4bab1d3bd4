//! File formats: JSON documents and template libraries, markdown export.

pub mod json;
pub mod md;

pub use json::{
    StoredContent, content_from_snapshot, parse_content, read_content, snapshot_from_content,
    write_content,
};
pub use md::{markdown_content, write_markdown};
