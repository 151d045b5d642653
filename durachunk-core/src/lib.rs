pub mod checksum;
pub mod chunker;
pub mod config;
pub mod error;
pub mod ids;
pub mod manifest;
pub mod manifest_xml;
pub mod path_safety;
pub mod stitch;
pub mod store;
pub mod verify;

pub use error::{ChunkError, Result, StoreError};
