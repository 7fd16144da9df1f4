//! Scene (de)serialization.
//!
//! The binary format is little-endian throughout and versioned; loading
//! validates magic, marker and exact version before touching any section.
//! The JSON format carries the same logical document through serde and is
//! told apart from binary content by the leading magic bytes.

mod binary;
mod json;
pub(crate) mod wire;

pub use binary::{SCENE_BINARY_FORMAT_VERSION, SCENE_MAGIC, SCENE_MARKER};

/// `true` when the data starts with the binary scene magic. Anything else
/// is treated as a JSON scene document.
#[must_use]
pub fn is_binary_scene_data(data: &[u8]) -> bool {
    data.len() >= 4 && u32::from_le_bytes([data[0], data[1], data[2], data[3]]) == SCENE_MAGIC
}
